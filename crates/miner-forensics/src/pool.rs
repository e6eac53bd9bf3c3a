//! Parallel diff analysis.
//!
//! Each work item (a full diff, or a stats-only restore of a cached commit) is
//! analysed on a blocking worker thread that opens its own repository reader.
//! Concurrency is gated by a semaphore; every item has its own timeout and the
//! whole batch shares a deadline. A failing, panicking
//! or slow item only costs that item: it gets zero-valued fallback features.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use miner_core::{CommitPair, FeatureSource, FeatureSummary, MinerError, WorkersConfig};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio::time::Instant;

use crate::features;
use crate::repo::{ReaderSource, RepositoryReader};

/// Worker count and time limits for a dispatch.
///
/// # Examples
///
/// ```
/// use std::time::Duration;
/// use miner_forensics::pool::PoolLimits;
///
/// let limits = PoolLimits::default();
/// assert_eq!(limits.item_timeout, Duration::from_secs(30));
/// assert!(limits.worker_count() >= 1);
/// ```
#[derive(Debug, Clone)]
pub struct PoolLimits {
    /// 0 means "use available parallelism".
    pub max_workers: usize,
    pub item_timeout: Duration,
    pub deadline: Duration,
}

impl PoolLimits {
    /// Effective number of concurrent workers.
    pub fn worker_count(&self) -> usize {
        if self.max_workers > 0 {
            return self.max_workers;
        }
        std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1)
    }
}

impl Default for PoolLimits {
    fn default() -> Self {
        Self::from(&WorkersConfig::default())
    }
}

impl From<&WorkersConfig> for PoolLimits {
    fn from(config: &WorkersConfig) -> Self {
        Self {
            max_workers: config.max_workers,
            item_timeout: Duration::from_secs(config.item_timeout_secs),
            deadline: Duration::from_secs(config.dispatch_deadline_secs),
        }
    }
}

/// Features for one commit plus the files it touched.
#[derive(Debug, Clone, PartialEq)]
pub struct CommitAnalysis {
    pub features: FeatureSummary,
    pub files: Vec<String>,
    pub source: FeatureSource,
}

impl CommitAnalysis {
    /// Zero-valued analysis for a commit whose diff could not be read.
    pub fn fallback(pair: &CommitPair) -> Self {
        Self {
            features: features::fallback(pair),
            files: Vec::new(),
            source: FeatureSource::Fallback,
        }
    }
}

/// One unit of pool work.
///
/// Commits already in the cache only need their statistics re-read; the
/// comment ratio comes from the cache and no diff is rendered.
#[derive(Debug, Clone, PartialEq)]
pub struct WorkItem {
    pub pair: CommitPair,
    pub cached_ratio: Option<f64>,
}

impl WorkItem {
    /// Full analysis: statistics plus diff text.
    pub fn compute(pair: CommitPair) -> Self {
        Self {
            pair,
            cached_ratio: None,
        }
    }

    /// Statistics only, reusing a cached comment ratio.
    pub fn restore(pair: CommitPair, comment_ratio: f64) -> Self {
        Self {
            pair,
            cached_ratio: Some(comment_ratio),
        }
    }
}

impl From<CommitPair> for WorkItem {
    fn from(pair: CommitPair) -> Self {
        Self::compute(pair)
    }
}

/// Runs feature extraction for a batch of commit pairs in parallel.
pub struct DiffWorkerPool<S: ReaderSource> {
    source: Arc<S>,
    limits: PoolLimits,
}

impl<S: ReaderSource> DiffWorkerPool<S> {
    pub fn new(source: Arc<S>, limits: PoolLimits) -> Self {
        Self { source, limits }
    }

    /// Analyse every item, keyed by the current commit's hash.
    ///
    /// Always returns exactly one entry per input item. Entries for items
    /// that failed, panicked, timed out, or were still pending at the
    /// deadline hold [`CommitAnalysis::fallback`]. Must be called from
    /// within a tokio runtime.
    pub async fn process<I>(&self, items: I) -> HashMap<String, CommitAnalysis>
    where
        I: IntoIterator,
        I::Item: Into<WorkItem>,
    {
        let items: Vec<WorkItem> = items.into_iter().map(Into::into).collect();
        let workers = self.limits.worker_count();
        let item_timeout = self.limits.item_timeout;
        let deadline = Instant::now() + self.limits.deadline;
        tracing::debug!(items = items.len(), workers, "dispatching diff workers");

        let semaphore = Arc::new(Semaphore::new(workers));
        let mut tasks = JoinSet::new();

        for item in &items {
            let item = item.clone();
            let source = Arc::clone(&self.source);
            let semaphore = Arc::clone(&semaphore);

            tasks.spawn(async move {
                let hash = item.pair.current.hash.clone();
                let Ok(permit) = semaphore.acquire_owned().await else {
                    return (hash, Err(MinerError::Worker("worker pool closed".into())));
                };

                // The permit lives on the blocking thread: a timed-out job
                // keeps its worker slot until it actually returns.
                let job = tokio::task::spawn_blocking(move || {
                    let _permit = permit;
                    analyze(source.as_ref(), &item)
                });
                let outcome = match tokio::time::timeout(item_timeout, job).await {
                    Ok(Ok(result)) => result,
                    Ok(Err(join_err)) => {
                        Err(MinerError::Worker(format!("worker panicked: {join_err}")))
                    }
                    Err(_) => Err(MinerError::Worker(format!(
                        "timed out after {}s",
                        item_timeout.as_secs_f64()
                    ))),
                };
                (hash, outcome)
            });
        }

        let mut results: HashMap<String, CommitAnalysis> = HashMap::with_capacity(items.len());
        loop {
            match tokio::time::timeout_at(deadline, tasks.join_next()).await {
                Ok(Some(Ok((hash, Ok(analysis))))) => {
                    results.insert(hash, analysis);
                }
                Ok(Some(Ok((hash, Err(err))))) => {
                    tracing::warn!(commit = %hash, error = %err, "diff analysis failed, using fallback");
                }
                Ok(Some(Err(join_err))) => {
                    tracing::warn!(error = %join_err, "diff task aborted");
                }
                Ok(None) => break,
                Err(_) => {
                    tracing::warn!(
                        pending = tasks.len(),
                        "dispatch deadline reached, abandoning pending diffs"
                    );
                    tasks.abort_all();
                    break;
                }
            }
        }

        for item in &items {
            results
                .entry(item.pair.current.hash.clone())
                .or_insert_with(|| CommitAnalysis::fallback(&item.pair));
        }
        results
    }
}

fn analyze<S: ReaderSource>(source: &S, item: &WorkItem) -> Result<CommitAnalysis, MinerError> {
    let pair = &item.pair;
    let reader = source.open()?;
    let stats = reader.commit_stats(&pair.current.hash)?;

    let (summary, origin) = match item.cached_ratio {
        Some(ratio) => (features::summarize(pair, &stats, ratio), FeatureSource::Cached),
        None => {
            let diff = reader.diff_between(&pair.previous.hash, &pair.current.hash)?;
            (features::extract(pair, &stats, &diff), FeatureSource::Computed)
        }
    };

    Ok(CommitAnalysis {
        features: summary,
        files: stats.paths(),
        source: origin,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{FakeRepo, FakeSource};

    fn limits(item_timeout: Duration, deadline: Duration) -> PoolLimits {
        PoolLimits {
            max_workers: 4,
            item_timeout,
            deadline,
        }
    }

    fn fast_limits() -> PoolLimits {
        limits(Duration::from_secs(10), Duration::from_secs(30))
    }

    fn three_commit_repo() -> FakeRepo {
        FakeRepo::new()
            .commit("c3", "alice", 1_020, &[("c.py", 30)], "+# one\n+x = 1\n")
            .commit("c2", "alice", 1_010, &[("b.py", 20)], "+y = 2\n")
            .commit("c1", "alice", 1_000, &[("a.py", 10)], "+z = 3\n")
    }

    #[tokio::test]
    async fn every_pair_yields_one_entry() {
        let source = FakeSource::new(three_commit_repo());
        let pairs = source.pairs();
        let pool = DiffWorkerPool::new(Arc::new(source.clone()), fast_limits());

        let results = pool.process(pairs).await;
        assert_eq!(results.len(), 2);
        let c3 = &results["c3"];
        assert_eq!(c3.source, FeatureSource::Computed);
        assert_eq!(c3.features.lines_changed, 30);
        assert_eq!(c3.features.comment_ratio, 0.5);
        assert_eq!(c3.files, vec!["c.py".to_string()]);
        assert_eq!(results["c2"].features.elapsed_seconds, 10);
    }

    #[tokio::test]
    async fn each_item_opens_its_own_reader() {
        let source = FakeSource::new(three_commit_repo());
        let pool = DiffWorkerPool::new(Arc::new(source.clone()), fast_limits());

        pool.process(source.pairs()).await;
        assert_eq!(source.opens(), 2);
    }

    #[tokio::test]
    async fn failing_diff_is_isolated() {
        let source = FakeSource::new(three_commit_repo().failing_diff("c3"));
        let pool = DiffWorkerPool::new(Arc::new(source.clone()), fast_limits());

        let results = pool.process(source.pairs()).await;
        assert_eq!(results.len(), 2);

        let failed = &results["c3"];
        assert_eq!(failed.source, FeatureSource::Fallback);
        assert_eq!(failed.features.lines_changed, 0);
        assert_eq!(failed.features.comment_ratio, 0.0);
        assert_eq!(failed.features.density, 0.0);

        assert_eq!(results["c2"].source, FeatureSource::Computed);
        assert_eq!(results["c2"].features.lines_changed, 20);
    }

    #[tokio::test]
    async fn panicking_worker_is_isolated() {
        let source = FakeSource::new(three_commit_repo().panicking_diff("c2"));
        let pool = DiffWorkerPool::new(Arc::new(source.clone()), fast_limits());

        let results = pool.process(source.pairs()).await;
        assert_eq!(results["c2"].source, FeatureSource::Fallback);
        assert_eq!(results["c3"].source, FeatureSource::Computed);
    }

    #[tokio::test]
    async fn slow_item_times_out_without_stalling_batch() {
        let source = FakeSource::new(three_commit_repo().slow_diff("c3", Duration::from_millis(1_500)));
        let pool = DiffWorkerPool::new(
            Arc::new(source.clone()),
            limits(Duration::from_millis(100), Duration::from_secs(30)),
        );

        let started = std::time::Instant::now();
        let results = pool.process(source.pairs()).await;
        assert!(started.elapsed() < Duration::from_millis(1_400));
        assert_eq!(results["c3"].source, FeatureSource::Fallback);
        assert_eq!(results["c2"].source, FeatureSource::Computed);
    }

    #[tokio::test]
    async fn deadline_abandons_pending_items() {
        let repo = three_commit_repo()
            .slow_diff("c3", Duration::from_millis(1_000))
            .slow_diff("c2", Duration::from_millis(1_000));
        let source = FakeSource::new(repo);
        let pool = DiffWorkerPool::new(
            Arc::new(source.clone()),
            limits(Duration::from_secs(10), Duration::from_millis(100)),
        );

        let results = pool.process(source.pairs()).await;
        assert_eq!(results.len(), 2);
        assert!(results
            .values()
            .all(|a| a.source == FeatureSource::Fallback));
    }

    #[tokio::test]
    async fn unopenable_repository_falls_back_for_all() {
        let source = FakeSource::new(three_commit_repo());
        let pairs = source.pairs();
        source.set_unavailable(true);
        let pool = DiffWorkerPool::new(Arc::new(source.clone()), fast_limits());

        let results = pool.process(pairs).await;
        assert_eq!(results.len(), 2);
        assert!(results
            .values()
            .all(|a| a.source == FeatureSource::Fallback));
    }

    #[tokio::test]
    async fn empty_batch_returns_empty_map() {
        let source = FakeSource::new(FakeRepo::new());
        let pool = DiffWorkerPool::new(Arc::new(source), fast_limits());
        assert!(pool.process(Vec::<CommitPair>::new()).await.is_empty());
    }

    #[test]
    fn explicit_worker_cap_wins() {
        let limits = PoolLimits {
            max_workers: 3,
            ..PoolLimits::default()
        };
        assert_eq!(limits.worker_count(), 3);
    }

    #[tokio::test]
    async fn timed_out_jobs_keep_their_worker_slot() {
        let mut repo = FakeRepo::new();
        for i in (0..6).rev() {
            repo = repo.commit(&format!("c{i}"), "alice", 1_000 + i, &[("a.py", 1)], "+x\n");
        }
        for i in 1..6 {
            repo = repo.slow_diff(&format!("c{i}"), Duration::from_millis(200));
        }
        let source = FakeSource::new(repo);
        let pool = DiffWorkerPool::new(
            Arc::new(source.clone()),
            PoolLimits {
                max_workers: 1,
                item_timeout: Duration::from_millis(20),
                deadline: Duration::from_secs(10),
            },
        );

        let results = pool.process(source.pairs()).await;
        assert_eq!(results.len(), 5);
        assert!(results
            .values()
            .all(|a| a.source == FeatureSource::Fallback));
        assert_eq!(source.peak_concurrent_diffs(), 1);
    }

    #[tokio::test]
    async fn restore_items_skip_the_diff() {
        let source = FakeSource::new(three_commit_repo());
        let pairs = source.pairs();
        let pool = DiffWorkerPool::new(Arc::new(source.clone()), fast_limits());

        let items = vec![
            WorkItem::restore(pairs[0].clone(), 0.25),
            WorkItem::compute(pairs[1].clone()),
        ];
        let results = pool.process(items).await;

        let restored = &results["c3"];
        assert_eq!(restored.source, FeatureSource::Cached);
        assert_eq!(restored.features.comment_ratio, 0.25);
        assert_eq!(restored.features.lines_changed, 30);
        assert_eq!(restored.files, vec!["c.py".to_string()]);
        assert_eq!(results["c2"].source, FeatureSource::Computed);
        assert_eq!(source.diff_calls(), 1);
    }

    #[tokio::test]
    async fn slow_stats_on_restore_is_bounded() {
        let source = FakeSource::new(three_commit_repo().slow_stats("c3", Duration::from_millis(800)));
        let pairs = source.pairs();
        let pool = DiffWorkerPool::new(
            Arc::new(source.clone()),
            limits(Duration::from_millis(50), Duration::from_millis(100)),
        );

        let started = std::time::Instant::now();
        let results = pool
            .process(vec![
                WorkItem::restore(pairs[0].clone(), 0.5),
                WorkItem::restore(pairs[1].clone(), 0.0),
            ])
            .await;
        assert!(started.elapsed() < Duration::from_millis(600));
        assert_eq!(results["c3"].source, FeatureSource::Fallback);
        assert_eq!(results["c2"].source, FeatureSource::Cached);
    }
}
