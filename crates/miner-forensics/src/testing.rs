//! In-memory repository double for unit tests.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use miner_core::{CommitPair, CommitRef, CommitStats, FileStat, MinerError};

use crate::repo::{ReaderSource, RepositoryReader};

/// Scripted history, newest commit first.
#[derive(Default)]
pub struct FakeRepo {
    commits: Vec<CommitRef>,
    stats: HashMap<String, CommitStats>,
    diffs: HashMap<String, String>,
    failing: HashSet<String>,
    panicking: HashSet<String>,
    slow: HashMap<String, Duration>,
    slow_stats: HashMap<String, Duration>,
}

impl FakeRepo {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a commit older than every commit added so far.
    pub fn commit(
        mut self,
        hash: &str,
        author: &str,
        timestamp: i64,
        files: &[(&str, u64)],
        diff: &str,
    ) -> Self {
        self.commits.push(CommitRef::new(hash, author, timestamp));
        self.stats.insert(
            hash.into(),
            CommitStats {
                files: files
                    .iter()
                    .map(|(path, added)| FileStat {
                        path: (*path).into(),
                        lines_added: *added,
                        lines_deleted: 0,
                    })
                    .collect(),
            },
        );
        self.diffs.insert(hash.into(), diff.into());
        self
    }

    pub fn failing_diff(mut self, hash: &str) -> Self {
        self.failing.insert(hash.into());
        self
    }

    pub fn panicking_diff(mut self, hash: &str) -> Self {
        self.panicking.insert(hash.into());
        self
    }

    pub fn slow_diff(mut self, hash: &str, delay: Duration) -> Self {
        self.slow.insert(hash.into(), delay);
        self
    }

    pub fn slow_stats(mut self, hash: &str, delay: Duration) -> Self {
        self.slow_stats.insert(hash.into(), delay);
        self
    }
}

struct Shared {
    repo: FakeRepo,
    unavailable: AtomicBool,
    opens: AtomicUsize,
    diff_calls: AtomicUsize,
    live_diffs: AtomicUsize,
    peak_diffs: AtomicUsize,
}

/// Reader source over a [`FakeRepo`] that counts how it is used.
#[derive(Clone)]
pub struct FakeSource {
    shared: Arc<Shared>,
}

impl FakeSource {
    pub fn new(repo: FakeRepo) -> Self {
        Self {
            shared: Arc::new(Shared {
                repo,
                unavailable: AtomicBool::new(false),
                opens: AtomicUsize::new(0),
                diff_calls: AtomicUsize::new(0),
                live_diffs: AtomicUsize::new(0),
                peak_diffs: AtomicUsize::new(0),
            }),
        }
    }

    pub fn pairs(&self) -> Vec<CommitPair> {
        CommitPair::from_newest_first(&self.shared.repo.commits)
    }

    pub fn set_unavailable(&self, unavailable: bool) {
        self.shared.unavailable.store(unavailable, Ordering::SeqCst);
    }

    pub fn opens(&self) -> usize {
        self.shared.opens.load(Ordering::SeqCst)
    }

    pub fn diff_calls(&self) -> usize {
        self.shared.diff_calls.load(Ordering::SeqCst)
    }

    /// Most diffs that were ever running at the same time.
    pub fn peak_concurrent_diffs(&self) -> usize {
        self.shared.peak_diffs.load(Ordering::SeqCst)
    }
}

impl ReaderSource for FakeSource {
    type Reader = FakeReader;

    fn open(&self) -> Result<FakeReader, MinerError> {
        if self.shared.unavailable.load(Ordering::SeqCst) {
            return Err(MinerError::Git("failed to open repository: not a git repository".into()));
        }
        self.shared.opens.fetch_add(1, Ordering::SeqCst);
        Ok(FakeReader {
            shared: Arc::clone(&self.shared),
        })
    }
}

pub struct FakeReader {
    shared: Arc<Shared>,
}

impl RepositoryReader for FakeReader {
    fn list_recent_commits(
        &self,
        limit: usize,
        author: Option<&str>,
    ) -> Result<Vec<CommitRef>, MinerError> {
        Ok(self
            .shared
            .repo
            .commits
            .iter()
            .take(limit)
            .filter(|c| author.map_or(true, |a| c.author == a))
            .cloned()
            .collect())
    }

    fn diff_between(&self, _old: &str, new: &str) -> Result<String, MinerError> {
        let shared = &self.shared;
        shared.diff_calls.fetch_add(1, Ordering::SeqCst);
        let live = shared.live_diffs.fetch_add(1, Ordering::SeqCst) + 1;
        shared.peak_diffs.fetch_max(live, Ordering::SeqCst);

        let repo = &shared.repo;
        if let Some(delay) = repo.slow.get(new) {
            std::thread::sleep(*delay);
        }
        shared.live_diffs.fetch_sub(1, Ordering::SeqCst);
        if repo.panicking.contains(new) {
            panic!("diff exploded for {new}");
        }
        if repo.failing.contains(new) {
            return Err(MinerError::Git(format!("binary diff for {new}")));
        }
        repo.diffs
            .get(new)
            .cloned()
            .ok_or_else(|| MinerError::Git(format!("unknown commit {new}")))
    }

    fn commit_stats(&self, hash: &str) -> Result<CommitStats, MinerError> {
        if let Some(delay) = self.shared.repo.slow_stats.get(hash) {
            std::thread::sleep(*delay);
        }
        self.shared
            .repo
            .stats
            .get(hash)
            .cloned()
            .ok_or_else(|| MinerError::Git(format!("unknown commit {hash}")))
    }
}
