//! Per-commit feature extraction.
//!
//! Everything here is pure: the caller supplies the commit pair, its
//! statistics, and the diff text.

use miner_core::{CommitPair, CommitStats, FeatureSummary};

/// Prefixes that mark an added line as comment-like once trimmed.
pub const COMMENT_PREFIXES: [&str; 6] = ["#", "//", "/*", "*", "\"\"\"", "'''"];

/// Fraction of added diff lines that look like comments.
///
/// Added lines start with `+`; the `+++` file header is not content.
/// Returns 0.0 when the diff adds nothing.
///
/// # Examples
///
/// ```
/// use miner_forensics::features::comment_ratio;
///
/// let diff = "+++ b/app.py\n+# setup\n+x = 1\n-y = 2\n";
/// assert_eq!(comment_ratio(diff), 0.5);
/// assert_eq!(comment_ratio(""), 0.0);
/// ```
pub fn comment_ratio(diff: &str) -> f64 {
    let mut added = 0usize;
    let mut comments = 0usize;

    for line in diff.lines() {
        if line.starts_with("+++") {
            continue;
        }
        let Some(content) = line.strip_prefix('+') else {
            continue;
        };
        added += 1;
        let trimmed = content.trim();
        if COMMENT_PREFIXES.iter().any(|p| trimmed.starts_with(p)) {
            comments += 1;
        }
    }

    if added == 0 {
        return 0.0;
    }
    comments as f64 / added as f64
}

/// `lines / files`, or 0 when no files were touched.
pub fn density(lines_changed: u64, files_touched: u64) -> f64 {
    if files_touched == 0 {
        return 0.0;
    }
    lines_changed as f64 / files_touched as f64
}

/// Changed lines per minute over an elapsed time already clamped to ≥ 1.
pub fn velocity(lines_changed: u64, elapsed_seconds: i64) -> f64 {
    lines_changed as f64 / elapsed_seconds.max(1) as f64 * 60.0
}

/// Build the feature summary for `pair.current`.
///
/// # Examples
///
/// ```
/// use miner_core::{CommitPair, CommitRef, CommitStats, FileStat};
/// use miner_forensics::features::extract;
///
/// let pair = CommitPair::new(
///     CommitRef::new("a1", "alice", 1_000),
///     CommitRef::new("b2", "alice", 1_030),
/// );
/// let stats = CommitStats {
///     files: vec![FileStat { path: "main.rs".into(), lines_added: 20, lines_deleted: 10 }],
/// };
/// let features = extract(&pair, &stats, "+// hi\n+let x = 1;\n");
/// assert_eq!(features.lines_changed, 30);
/// assert_eq!(features.density, 30.0);
/// assert_eq!(features.elapsed_seconds, 30);
/// assert_eq!(features.velocity_lines_per_minute, 60.0);
/// assert_eq!(features.comment_ratio, 0.5);
/// ```
pub fn extract(pair: &CommitPair, stats: &CommitStats, diff: &str) -> FeatureSummary {
    summarize(pair, stats, comment_ratio(diff))
}

/// Build the feature summary from statistics and an already known comment ratio.
///
/// Used when the ratio comes from the commit cache instead of a fresh diff.
pub fn summarize(pair: &CommitPair, stats: &CommitStats, comment_ratio: f64) -> FeatureSummary {
    let lines_changed = stats.total_lines();
    let files_touched = stats.files_touched();
    let elapsed_seconds = pair.elapsed_seconds();

    FeatureSummary {
        hash: pair.current.hash.clone(),
        lines_changed,
        files_touched,
        density: density(lines_changed, files_touched),
        comment_ratio,
        elapsed_seconds,
        velocity_lines_per_minute: velocity(lines_changed, elapsed_seconds),
    }
}

/// Zero-valued features for a commit whose diff could not be read.
///
/// Only the elapsed time survives, since it comes from commit metadata.
pub fn fallback(pair: &CommitPair) -> FeatureSummary {
    summarize(pair, &CommitStats::default(), 0.0)
}
