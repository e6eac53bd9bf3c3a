use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// A commit as reported by the repository reader.
///
/// The engine never constructs these itself outside of tests; they come
/// from the repository reader.
///
/// # Examples
///
/// ```
/// use miner_core::CommitRef;
///
/// let commit = CommitRef::new("9fceb02d0ae598e95dc970b74767f19372d61af8", "alice", 1_700_000_000);
/// assert_eq!(commit.short_hash(), "9fceb02");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommitRef {
    /// Full content-addressed hash.
    pub hash: String,
    /// Author name.
    pub author: String,
    /// Committer timestamp, seconds since the Unix epoch.
    pub timestamp: i64,
}

impl CommitRef {
    pub fn new(hash: impl Into<String>, author: impl Into<String>, timestamp: i64) -> Self {
        Self {
            hash: hash.into(),
            author: author.into(),
            timestamp,
        }
    }

    /// First seven characters of the hash.
    pub fn short_hash(&self) -> &str {
        &self.hash[..self.hash.len().min(7)]
    }
}

/// Two adjacent commits from a newest-first history walk.
///
/// `current.timestamp >= previous.timestamp` does not always hold: rebases
/// and merges produce non-monotonic histories.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitPair {
    /// The older commit of the two.
    pub previous: CommitRef,
    /// The commit being audited.
    pub current: CommitRef,
}

impl CommitPair {
    pub fn new(previous: CommitRef, current: CommitRef) -> Self {
        Self { previous, current }
    }

    /// Build pairs from a newest-first commit list.
    ///
    /// Returns one pair per commit except the oldest, which has no
    /// predecessor, in the same newest-first order.
    ///
    /// # Examples
    ///
    /// ```
    /// use miner_core::{CommitPair, CommitRef};
    ///
    /// let commits = vec![
    ///     CommitRef::new("c3", "bob", 300),
    ///     CommitRef::new("c2", "bob", 200),
    ///     CommitRef::new("c1", "bob", 100),
    /// ];
    /// let pairs = CommitPair::from_newest_first(&commits);
    /// assert_eq!(pairs.len(), 2);
    /// assert_eq!(pairs[0].current.hash, "c3");
    /// assert_eq!(pairs[0].previous.hash, "c2");
    /// ```
    pub fn from_newest_first(commits: &[CommitRef]) -> Vec<Self> {
        commits
            .windows(2)
            .map(|w| Self::new(w[1].clone(), w[0].clone()))
            .collect()
    }

    /// Seconds between the two commits, clamped to at least 1.
    pub fn elapsed_seconds(&self) -> i64 {
        (self.current.timestamp - self.previous.timestamp).max(1)
    }
}

/// Line counts for one file touched by a commit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileStat {
    /// File path relative to the repository root.
    pub path: String,
    pub lines_added: u64,
    pub lines_deleted: u64,
}

/// Per-commit statistics against the commit's first parent.
///
/// # Examples
///
/// ```
/// use miner_core::{CommitStats, FileStat};
///
/// let stats = CommitStats {
///     files: vec![
///         FileStat { path: "a.py".into(), lines_added: 10, lines_deleted: 2 },
///         FileStat { path: "b.py".into(), lines_added: 0, lines_deleted: 4 },
///     ],
/// };
/// assert_eq!(stats.total_lines(), 16);
/// assert_eq!(stats.files_touched(), 2);
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommitStats {
    pub files: Vec<FileStat>,
}

impl CommitStats {
    /// Added plus deleted lines across every file.
    pub fn total_lines(&self) -> u64 {
        self.files
            .iter()
            .map(|f| f.lines_added + f.lines_deleted)
            .sum()
    }

    pub fn files_touched(&self) -> u64 {
        self.files.len() as u64
    }

    pub fn paths(&self) -> Vec<String> {
        self.files.iter().map(|f| f.path.clone()).collect()
    }
}

/// Heuristic features computed for one commit.
///
/// Built once by the feature extractor and never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeatureSummary {
    /// Hash of the commit these features describe.
    pub hash: String,
    /// Added plus deleted lines.
    pub lines_changed: u64,
    pub files_touched: u64,
    /// `lines_changed / files_touched`, or 0 when no files were touched.
    pub density: f64,
    /// Fraction of added lines that look like comments (0.0–1.0).
    pub comment_ratio: f64,
    /// Seconds since the previous commit, at least 1.
    pub elapsed_seconds: i64,
    pub velocity_lines_per_minute: f64,
}

/// Where a commit's features came from during an audit.
///
/// # Examples
///
/// ```
/// use miner_core::FeatureSource;
///
/// assert_eq!(FeatureSource::Cached.to_string(), "cached");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FeatureSource {
    /// Extracted from a fresh diff in this run.
    Computed,
    /// Comment ratio restored from the commit cache.
    Cached,
    /// Diff could not be read; zero-valued features.
    Fallback,
}

impl fmt::Display for FeatureSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FeatureSource::Computed => write!(f, "computed"),
            FeatureSource::Cached => write!(f, "cached"),
            FeatureSource::Fallback => write!(f, "fallback"),
        }
    }
}

/// A heuristic that flags a commit as suspicious.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SuspicionRule {
    /// Large change landed implausibly soon after the previous commit.
    Velocity,
    /// Far more changed lines per file than normal editing produces.
    Density,
    /// Fast change saturated with comment-like lines.
    Robotic,
}

impl fmt::Display for SuspicionRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SuspicionRule::Velocity => write!(f, "velocity"),
            SuspicionRule::Density => write!(f, "density"),
            SuspicionRule::Robotic => write!(f, "robotic"),
        }
    }
}

/// One audited commit, as handed to rendering and export.
///
/// Serializes with camelCase keys.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditRecord {
    pub hash: String,
    pub short_hash: String,
    pub author: String,
    /// Commit time in RFC 3339 (UTC).
    pub timestamp: String,
    /// Added plus deleted lines.
    pub changes: u64,
    pub files: Vec<String>,
    /// Comment ratio rounded to 4 decimal places.
    pub comment_ratio: f64,
    /// Density rounded to 2 decimal places.
    pub density: f64,
    /// Lines per minute rounded to 2 decimal places.
    pub velocity: f64,
    pub elapsed_seconds: i64,
    pub is_suspicious: bool,
    pub triggered_rules: Vec<SuspicionRule>,
    pub source: FeatureSource,
}

/// Output format for CLI subcommands.
///
/// Implements [`FromStr`] so it can be used directly with `clap` argument parsing.
///
/// # Examples
///
/// ```
/// use miner_core::OutputFormat;
///
/// let fmt: OutputFormat = "json".parse().unwrap();
/// assert_eq!(fmt, OutputFormat::Json);
///
/// let fmt: OutputFormat = "md".parse().unwrap();
/// assert_eq!(fmt, OutputFormat::Markdown);
/// ```
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// Human-readable table.
    #[default]
    Text,
    /// Machine-readable JSON with camelCase keys.
    Json,
    /// Markdown-formatted output.
    Markdown,
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OutputFormat::Text => write!(f, "text"),
            OutputFormat::Json => write!(f, "json"),
            OutputFormat::Markdown => write!(f, "markdown"),
        }
    }
}

impl FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "text" => Ok(OutputFormat::Text),
            "json" => Ok(OutputFormat::Json),
            "markdown" | "md" => Ok(OutputFormat::Markdown),
            other => Err(format!("unknown output format: {other}")),
        }
    }
}
