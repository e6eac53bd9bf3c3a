//! Repository access via git2.
//!
//! The engine only talks to history through [`RepositoryReader`]. Readers are
//! obtained from a [`ReaderSource`], which diff workers call once per task so
//! that no repository handle is ever shared between threads.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use git2::{DiffDelta, DiffFindOptions, DiffFormat, DiffOptions, Repository, Sort, Tree};
use miner_core::{CommitRef, CommitStats, FileStat, MinerError};

/// Read access to a repository's history.
pub trait RepositoryReader {
    /// Up to `limit` most recent commits reachable from HEAD, newest first.
    ///
    /// When `author` is given, commits by other authors are dropped from
    /// that window (the window is not widened to compensate).
    fn list_recent_commits(
        &self,
        limit: usize,
        author: Option<&str>,
    ) -> Result<Vec<CommitRef>, MinerError>;

    /// Unified diff text from `old` to `new`.
    fn diff_between(&self, old: &str, new: &str) -> Result<String, MinerError>;

    /// Line counts per file for `hash` against its first parent.
    fn commit_stats(&self, hash: &str) -> Result<CommitStats, MinerError>;
}

/// A cheaply re-acquirable way to open a [`RepositoryReader`].
///
/// Shared across worker threads; the readers it produces are not.
pub trait ReaderSource: Send + Sync + 'static {
    type Reader: RepositoryReader;

    fn open(&self) -> Result<Self::Reader, MinerError>;
}

/// Opens [`GitReader`]s for a repository on disk.
///
/// # Examples
///
/// ```
/// use miner_forensics::repo::GitRepoSource;
///
/// let source = GitRepoSource::new("/path/to/repo");
/// assert!(source.path().ends_with("repo"));
/// ```
#[derive(Debug, Clone)]
pub struct GitRepoSource {
    path: PathBuf,
}

impl GitRepoSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl ReaderSource for GitRepoSource {
    type Reader = GitReader;

    fn open(&self) -> Result<GitReader, MinerError> {
        GitReader::open(&self.path)
    }
}

/// A [`RepositoryReader`] backed by a single `git2::Repository` handle.
pub struct GitReader {
    repo: Repository,
}

impl GitReader {
    /// Open the repository at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`MinerError::Git`] if `path` is not a git repository.
    pub fn open(path: &Path) -> Result<Self, MinerError> {
        let repo = Repository::open(path)
            .map_err(|e| MinerError::Git(format!("failed to open repository: {e}")))?;
        Ok(Self { repo })
    }

    fn tree_for(&self, spec: &str) -> Result<Tree<'_>, MinerError> {
        self.repo
            .revparse_single(spec)
            .and_then(|obj| obj.peel_to_tree())
            .map_err(|e| MinerError::Git(format!("failed to resolve tree for '{spec}': {e}")))
    }
}

impl RepositoryReader for GitReader {
    fn list_recent_commits(
        &self,
        limit: usize,
        author: Option<&str>,
    ) -> Result<Vec<CommitRef>, MinerError> {
        let mut revwalk = self
            .repo
            .revwalk()
            .map_err(|e| MinerError::Git(format!("failed to create revwalk: {e}")))?;

        revwalk.set_sorting(Sort::TIME).ok();
        revwalk
            .push_head()
            .map_err(|e| MinerError::Git(format!("failed to push HEAD: {e}")))?;

        let mut commits = Vec::new();
        for oid_result in revwalk.take(limit) {
            let oid = oid_result.map_err(|e| MinerError::Git(format!("revwalk error: {e}")))?;
            let commit = self
                .repo
                .find_commit(oid)
                .map_err(|e| MinerError::Git(format!("failed to find commit: {e}")))?;

            let name = commit.author().name().unwrap_or("unknown").to_string();
            if author.is_some_and(|wanted| wanted != name) {
                continue;
            }

            commits.push(CommitRef {
                hash: oid.to_string(),
                author: name,
                timestamp: commit.time().seconds(),
            });
        }

        Ok(commits)
    }

    fn diff_between(&self, old: &str, new: &str) -> Result<String, MinerError> {
        let old_tree = self.tree_for(old)?;
        let new_tree = self.tree_for(new)?;

        let mut diff_opts = DiffOptions::new();
        let diff = self
            .repo
            .diff_tree_to_tree(Some(&old_tree), Some(&new_tree), Some(&mut diff_opts))
            .map_err(|e| MinerError::Git(format!("failed to compute diff: {e}")))?;

        let mut text = String::new();
        diff.print(DiffFormat::Patch, |_delta, _hunk, line| {
            // Content lines come without their prefix; headers carry their own.
            if matches!(line.origin(), '+' | '-' | ' ') {
                text.push(line.origin());
            }
            text.push_str(&String::from_utf8_lossy(line.content()));
            true
        })
        .map_err(|e| MinerError::Git(format!("failed to render diff: {e}")))?;

        Ok(text)
    }

    fn commit_stats(&self, hash: &str) -> Result<CommitStats, MinerError> {
        let commit = self
            .repo
            .revparse_single(hash)
            .and_then(|obj| obj.peel_to_commit())
            .map_err(|e| MinerError::Git(format!("failed to find commit '{hash}': {e}")))?;

        let commit_tree = commit
            .tree()
            .map_err(|e| MinerError::Git(format!("failed to get commit tree: {e}")))?;

        let parent_tree = if commit.parent_count() > 0 {
            let parent = commit
                .parent(0)
                .map_err(|e| MinerError::Git(format!("failed to get parent: {e}")))?;
            Some(
                parent
                    .tree()
                    .map_err(|e| MinerError::Git(format!("failed to get parent tree: {e}")))?,
            )
        } else {
            None
        };

        let mut diff_opts = DiffOptions::new();
        let mut diff = self
            .repo
            .diff_tree_to_tree(
                parent_tree.as_ref(),
                Some(&commit_tree),
                Some(&mut diff_opts),
            )
            .map_err(|e| MinerError::Git(format!("failed to compute diff: {e}")))?;

        let mut find_opts = DiffFindOptions::new();
        find_opts.renames(true);
        diff.find_similar(Some(&mut find_opts))
            .map_err(|e| MinerError::Git(format!("failed to find renames: {e}")))?;

        let mut files: Vec<FileStat> = diff
            .deltas()
            .map(|delta| FileStat {
                path: delta_path(&delta),
                lines_added: 0,
                lines_deleted: 0,
            })
            .filter(|stat| !stat.path.is_empty())
            .collect();

        let mut line_counts: HashMap<String, (u64, u64)> = HashMap::new();
        diff.foreach(
            &mut |_delta, _progress| true,
            None,
            None,
            Some(&mut |delta, _hunk, line| {
                let entry = line_counts.entry(delta_path(&delta)).or_insert((0, 0));
                match line.origin() {
                    '+' => entry.0 += 1,
                    '-' => entry.1 += 1,
                    _ => {}
                }
                true
            }),
        )
        .map_err(|e| MinerError::Git(format!("failed to iterate diff lines: {e}")))?;

        for file in &mut files {
            if let Some((added, deleted)) = line_counts.get(&file.path) {
                file.lines_added = *added;
                file.lines_deleted = *deleted;
            }
        }

        Ok(CommitStats { files })
    }
}

fn delta_path(delta: &DiffDelta<'_>) -> String {
    delta
        .new_file()
        .path()
        .or_else(|| delta.old_file().path())
        .unwrap_or(Path::new(""))
        .to_string_lossy()
        .to_string()
}
