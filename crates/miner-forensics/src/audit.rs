//! Audit orchestration.
//!
//! One [`Auditor::run`] resolves recent history, checks the commit cache,
//! hands every pair to the [`DiffWorkerPool`] (cache hits as stats-only jobs),
//! classifies every commit, persists the results, and returns one
//! [`AuditRecord`] per commit pair. Failures never escape a run: they become an [`AuditOutcome`] variant
//! or per-commit fallback features.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use miner_core::{AuditRecord, CommitPair, FeatureSource, MinerConfig, MinerError};
use serde::Serialize;

use crate::cache::{CachedFeatures, CommitCache};
use crate::classifier::{RuleSet, Verdict};
use crate::pool::{CommitAnalysis, DiffWorkerPool, PoolLimits, WorkItem};
use crate::repo::{ReaderSource, RepositoryReader};

/// Everything a run needs to know besides the repository and the cache.
///
/// # Examples
///
/// ```
/// use miner_core::MinerConfig;
/// use miner_forensics::audit::AuditSettings;
///
/// let settings = AuditSettings::from_config(&MinerConfig::default());
/// assert_eq!(settings.max_commits, 50);
/// assert!(settings.author.is_none());
/// ```
#[derive(Debug, Clone)]
pub struct AuditSettings {
    /// Size of the history window.
    pub max_commits: usize,
    /// Only audit commits by this author.
    pub author: Option<String>,
    pub rules: RuleSet,
    pub limits: PoolLimits,
}

impl AuditSettings {
    pub fn from_config(config: &MinerConfig) -> Self {
        Self {
            max_commits: config.audit.max_commits,
            author: config.audit.author.clone(),
            rules: config.rules.clone().into(),
            limits: PoolLimits::from(&config.workers),
        }
    }
}

impl Default for AuditSettings {
    fn default() -> Self {
        Self::from_config(&MinerConfig::default())
    }
}

/// Counters describing where a run's features came from.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunStats {
    pub pairs: usize,
    pub cache_hits: usize,
    pub computed: usize,
    pub fallbacks: usize,
}

/// How a run ended.
#[derive(Debug, Clone)]
pub enum AuditOutcome {
    /// Every pair was audited; records are newest first.
    Completed {
        records: Vec<AuditRecord>,
        stats: RunStats,
    },
    /// Fewer than two commits, so there is nothing to compare.
    InsufficientHistory { found: usize },
    /// The repository could not be opened or walked.
    RepositoryUnavailable(String),
}

impl AuditOutcome {
    /// Records produced by the run; empty unless it completed.
    pub fn records(&self) -> &[AuditRecord] {
        match self {
            AuditOutcome::Completed { records, .. } => records,
            _ => &[],
        }
    }

    pub fn into_records(self) -> Vec<AuditRecord> {
        match self {
            AuditOutcome::Completed { records, .. } => records,
            _ => Vec::new(),
        }
    }

    pub fn suspicious_count(&self) -> usize {
        self.records().iter().filter(|r| r.is_suspicious).count()
    }

    /// One-line description for the user.
    ///
    /// # Examples
    ///
    /// ```
    /// use miner_forensics::audit::AuditOutcome;
    ///
    /// let outcome = AuditOutcome::InsufficientHistory { found: 1 };
    /// assert!(outcome.message().contains("Not enough commits"));
    /// assert!(outcome.records().is_empty());
    /// ```
    pub fn message(&self) -> String {
        match self {
            AuditOutcome::Completed { records, stats } => format!(
                "Audited {} commits: {} suspicious ({} cached, {} computed, {} unreadable).",
                records.len(),
                self.suspicious_count(),
                stats.cache_hits,
                stats.computed,
                stats.fallbacks,
            ),
            AuditOutcome::InsufficientHistory { found } => format!(
                "Not enough commits to perform delta analysis (found {found}, need at least 2)."
            ),
            AuditOutcome::RepositoryUnavailable(reason) => {
                format!("Repository unavailable: {reason}")
            }
        }
    }
}

struct Plan {
    pairs: Vec<CommitPair>,
    work: Vec<WorkItem>,
}

/// Runs audits against one repository.
///
/// Holds no per-run state: the only thing that survives between runs is what
/// the cache persists.
pub struct Auditor<S: ReaderSource> {
    source: Arc<S>,
    settings: AuditSettings,
    cache: Option<CommitCache>,
}

impl<S: ReaderSource> Auditor<S> {
    pub fn new(source: S, settings: AuditSettings) -> Self {
        Self {
            source: Arc::new(source),
            settings,
            cache: None,
        }
    }

    /// Persist and reuse features through `cache`.
    pub fn with_cache(mut self, cache: CommitCache) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn settings(&self) -> &AuditSettings {
        &self.settings
    }

    pub fn cache(&self) -> Option<&CommitCache> {
        self.cache.as_ref()
    }

    /// Audit the configured history window.
    pub async fn run(&self) -> AuditOutcome {
        let Plan { pairs, work } = match self.plan() {
            Ok(plan) => plan,
            Err(outcome) => return outcome,
        };

        let mut stats = RunStats {
            pairs: pairs.len(),
            ..RunStats::default()
        };

        let pool = DiffWorkerPool::new(Arc::clone(&self.source), self.settings.limits.clone());
        let mut analyses: HashMap<String, CommitAnalysis> = pool.process(work).await;

        let mut records = Vec::with_capacity(pairs.len());
        for pair in &pairs {
            let analysis = analyses
                .remove(&pair.current.hash)
                .unwrap_or_else(|| CommitAnalysis::fallback(pair));
            match analysis.source {
                FeatureSource::Computed => stats.computed += 1,
                FeatureSource::Fallback => stats.fallbacks += 1,
                FeatureSource::Cached => stats.cache_hits += 1,
            }

            let verdict = self.settings.rules.evaluate(&analysis.features);
            if analysis.source != FeatureSource::Fallback {
                self.persist(&verdict);
            }
            records.push(build_record(pair, &analysis, &verdict));
        }

        tracing::info!(
            pairs = stats.pairs,
            cache_hits = stats.cache_hits,
            computed = stats.computed,
            fallbacks = stats.fallbacks,
            "audit complete"
        );
        AuditOutcome::Completed { records, stats }
    }

    /// Resolve and partition. Runs on the calling thread with a single reader.
    fn plan(&self) -> Result<Plan, AuditOutcome> {
        let reader = self.source.open().map_err(unavailable)?;
        let commits = reader
            .list_recent_commits(self.settings.max_commits, self.settings.author.as_deref())
            .map_err(unavailable)?;

        if commits.len() < 2 {
            tracing::info!(found = commits.len(), "not enough history for delta analysis");
            return Err(AuditOutcome::InsufficientHistory {
                found: commits.len(),
            });
        }

        let pairs = CommitPair::from_newest_first(&commits);
        let work: Vec<WorkItem> = pairs
            .iter()
            .map(|pair| match self.lookup(&pair.current.hash) {
                Some(cached) => WorkItem::restore(pair.clone(), cached.score),
                None => WorkItem::compute(pair.clone()),
            })
            .collect();

        let hits = work.iter().filter(|w| w.cached_ratio.is_some()).count();
        tracing::debug!(
            pairs = pairs.len(),
            hits,
            misses = work.len() - hits,
            "partitioned commit pairs"
        );
        Ok(Plan { pairs, work })
    }

    fn lookup(&self, hash: &str) -> Option<CachedFeatures> {
        let cache = self.cache.as_ref()?;
        match cache.lookup(hash) {
            Ok(hit) => hit,
            Err(err) => {
                tracing::warn!(commit = %hash, error = %err, "cache lookup failed, recomputing");
                None
            }
        }
    }

    fn persist(&self, verdict: &Verdict) {
        let Some(cache) = self.cache.as_ref() else {
            return;
        };
        let features = &verdict.features;
        if let Err(err) = cache.store(
            &features.hash,
            features.comment_ratio,
            verdict.is_suspicious,
            features.density,
        ) {
            tracing::warn!(commit = %features.hash, error = %err, "failed to cache commit features");
        }
    }
}

fn unavailable(err: MinerError) -> AuditOutcome {
    tracing::warn!(error = %err, "repository unavailable");
    AuditOutcome::RepositoryUnavailable(err.to_string())
}

fn build_record(pair: &CommitPair, analysis: &CommitAnalysis, verdict: &Verdict) -> AuditRecord {
    let commit = &pair.current;
    let features = &analysis.features;

    AuditRecord {
        hash: commit.hash.clone(),
        short_hash: commit.short_hash().to_string(),
        author: commit.author.clone(),
        timestamp: iso_timestamp(commit.timestamp),
        changes: features.lines_changed,
        files: analysis.files.clone(),
        comment_ratio: round_to(features.comment_ratio, 4),
        density: round_to(features.density, 2),
        velocity: round_to(features.velocity_lines_per_minute, 2),
        elapsed_seconds: features.elapsed_seconds,
        is_suspicious: verdict.is_suspicious,
        triggered_rules: verdict.triggered.clone(),
        source: analysis.source,
    }
}

fn iso_timestamp(seconds: i64) -> String {
    DateTime::<Utc>::from_timestamp(seconds, 0)
        .map(|dt| dt.to_rfc3339())
        .unwrap_or_else(|| seconds.to_string())
}

fn round_to(value: f64, places: i32) -> f64 {
    let factor = 10f64.powi(places);
    (value * factor).round() / factor
}
