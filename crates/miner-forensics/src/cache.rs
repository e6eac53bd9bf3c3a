//! SQLite-backed commit cache.
//!
//! Maps a commit hash to the features computed for it in an earlier audit so
//! repeated runs over overlapping history skip re-rendering diffs. Only the
//! single-threaded orchestrator touches the cache; diff workers never do.

use std::path::Path;

use miner_core::MinerError;
use rusqlite::{params, Connection};
use serde::{Deserialize, Serialize};

const LEGACY_COLUMNS: [(&str, &str); 3] = [
    ("comment_ratio", "score"),
    ("entropy", "density"),
    ("timestamp", "inserted_at"),
];

/// The cached subset of a commit's features.
///
/// Under the rule strategy `score` holds the commit's comment ratio.
///
/// # Examples
///
/// ```
/// use miner_forensics::cache::CachedFeatures;
///
/// let cached = CachedFeatures { score: 0.5, is_suspicious: true, density: 80.0 };
/// assert!(cached.is_suspicious);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CachedFeatures {
    pub score: f64,
    pub is_suspicious: bool,
    pub density: f64,
}

/// Cache statistics for the administration surface.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheStats {
    /// Number of cached commits.
    pub entries: usize,
    /// Cached commits classified as suspicious.
    pub suspicious: usize,
    /// Size of the database in bytes.
    pub size_bytes: u64,
}

/// Persistent hash → features store.
///
/// # Examples
///
/// ```
/// use miner_forensics::cache::CommitCache;
///
/// let cache = CommitCache::in_memory().unwrap();
/// cache.store("abc123", 0.25, false, 12.0).unwrap();
/// let hit = cache.lookup("abc123").unwrap().unwrap();
/// assert_eq!(hit.density, 12.0);
/// ```
pub struct CommitCache {
    conn: Connection,
}

impl CommitCache {
    /// Open or create a cache database at the given path.
    ///
    /// Creates the parent directory and the table if they don't exist.
    ///
    /// # Errors
    ///
    /// Returns [`MinerError::Database`] if the database cannot be opened.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use std::path::Path;
    /// use miner_forensics::cache::CommitCache;
    ///
    /// let cache = CommitCache::open(Path::new(".origin-miner/cache.db")).unwrap();
    /// ```
    pub fn open(path: &Path) -> Result<Self, MinerError> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| {
                MinerError::Database(format!("failed to create cache directory: {e}"))
            })?;
        }
        let conn = Connection::open(path)
            .map_err(|e| MinerError::Database(format!("failed to open database: {e}")))?;

        let cache = Self { conn };
        cache.init_schema()?;
        Ok(cache)
    }

    /// Create an in-memory cache (for testing).
    ///
    /// # Errors
    ///
    /// Returns [`MinerError::Database`] if schema creation fails.
    pub fn in_memory() -> Result<Self, MinerError> {
        let conn = Connection::open_in_memory().map_err(|e| {
            MinerError::Database(format!("failed to create in-memory database: {e}"))
        })?;

        let cache = Self { conn };
        cache.init_schema()?;
        Ok(cache)
    }

    fn init_schema(&self) -> Result<(), MinerError> {
        self.conn
            .execute_batch(
                "
                CREATE TABLE IF NOT EXISTS commit_cache (
                    hash TEXT PRIMARY KEY,
                    score REAL,
                    is_suspicious INTEGER,
                    density REAL,
                    inserted_at TEXT
                );
                ",
            )
            .map_err(|e| MinerError::Database(format!("failed to create schema: {e}")))?;
        self.migrate_legacy_columns()
    }

    /// Rename columns of caches written by the 0.x tool (`comment_ratio`,
    /// `entropy`, `timestamp`) to the current names.
    fn migrate_legacy_columns(&self) -> Result<(), MinerError> {
        let columns = self.columns()?;
        for (legacy, current) in LEGACY_COLUMNS {
            let has = |name: &str| columns.iter().any(|c| c.as_str() == name);
            if has(legacy) && !has(current) {
                tracing::info!(from = legacy, to = current, "migrating legacy cache column");
                self.conn
                    .execute_batch(&format!(
                        "ALTER TABLE commit_cache RENAME COLUMN {legacy} TO {current}"
                    ))
                    .map_err(|e| {
                        MinerError::Database(format!("failed to migrate column {legacy}: {e}"))
                    })?;
            }
        }
        Ok(())
    }

    fn columns(&self) -> Result<Vec<String>, MinerError> {
        let mut stmt = self
            .conn
            .prepare("PRAGMA table_info(commit_cache)")
            .map_err(|e| MinerError::Database(format!("failed to inspect schema: {e}")))?;
        let names = stmt
            .query_map([], |row| row.get::<_, String>(1))
            .and_then(|rows| rows.collect::<Result<Vec<_>, _>>())
            .map_err(|e| MinerError::Database(format!("failed to inspect schema: {e}")))?;
        Ok(names)
    }

    /// Features previously stored for `hash`, if any.
    ///
    /// # Errors
    ///
    /// Returns [`MinerError::Database`] on query failure.
    pub fn lookup(&self, hash: &str) -> Result<Option<CachedFeatures>, MinerError> {
        let result = self.conn.query_row(
            "SELECT score, is_suspicious, density FROM commit_cache
             WHERE hash = ?1 ORDER BY rowid DESC LIMIT 1",
            params![hash],
            |row| {
                Ok(CachedFeatures {
                    score: row.get(0)?,
                    is_suspicious: row.get::<_, i64>(1)? != 0,
                    density: row.get(2)?,
                })
            },
        );

        match result {
            Ok(cached) => Ok(Some(cached)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(MinerError::Database(format!(
                "failed to look up commit {hash}: {e}"
            ))),
        }
    }

    /// Insert or replace the entry for `hash`.
    ///
    /// Written as delete-then-insert so stores whose table lacks a working
    /// uniqueness constraint still hold exactly one row per hash.
    ///
    /// # Errors
    ///
    /// Returns [`MinerError::Database`] on write failure.
    pub fn store(
        &self,
        hash: &str,
        score: f64,
        is_suspicious: bool,
        density: f64,
    ) -> Result<(), MinerError> {
        let tx = self
            .conn
            .unchecked_transaction()
            .map_err(|e| MinerError::Database(format!("failed to begin transaction: {e}")))?;

        tx.execute("DELETE FROM commit_cache WHERE hash = ?1", params![hash])
            .map_err(|e| MinerError::Database(format!("failed to replace entry: {e}")))?;
        tx.execute(
            "INSERT INTO commit_cache (hash, score, is_suspicious, density, inserted_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                hash,
                score,
                i64::from(is_suspicious),
                density,
                chrono::Utc::now().to_rfc3339()
            ],
        )
        .map_err(|e| MinerError::Database(format!("failed to store entry: {e}")))?;

        tx.commit()
            .map_err(|e| MinerError::Database(format!("failed to commit entry: {e}")))
    }

    /// Drop every entry. Returns the number of entries removed.
    ///
    /// # Errors
    ///
    /// Returns [`MinerError::Database`] on delete failure.
    pub fn clear(&self) -> Result<usize, MinerError> {
        self.conn
            .execute("DELETE FROM commit_cache", [])
            .map_err(|e| MinerError::Database(format!("failed to clear cache: {e}")))
    }

    /// Number of cached commits.
    ///
    /// # Errors
    ///
    /// Returns [`MinerError::Database`] on query failure.
    pub fn len(&self) -> Result<usize, MinerError> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM commit_cache", [], |row| row.get(0))
            .map_err(|e| MinerError::Database(format!("failed to count entries: {e}")))?;
        Ok(count as usize)
    }

    pub fn is_empty(&self) -> Result<bool, MinerError> {
        Ok(self.len()? == 0)
    }

    /// Cache statistics.
    ///
    /// # Errors
    ///
    /// Returns [`MinerError::Database`] on query failure.
    ///
    /// # Examples
    ///
    /// ```
    /// use miner_forensics::cache::CommitCache;
    ///
    /// let cache = CommitCache::in_memory().unwrap();
    /// cache.store("a", 0.0, true, 200.0).unwrap();
    /// cache.store("b", 0.1, false, 3.0).unwrap();
    /// let stats = cache.stats().unwrap();
    /// assert_eq!(stats.entries, 2);
    /// assert_eq!(stats.suspicious, 1);
    /// ```
    pub fn stats(&self) -> Result<CacheStats, MinerError> {
        let suspicious: i64 = self
            .conn
            .query_row(
                "SELECT COUNT(*) FROM commit_cache WHERE is_suspicious != 0",
                [],
                |row| row.get(0),
            )
            .map_err(|e| MinerError::Database(format!("failed to count entries: {e}")))?;

        let page_count: i64 = self
            .conn
            .query_row("PRAGMA page_count", [], |row| row.get(0))
            .unwrap_or(0);
        let page_size: i64 = self
            .conn
            .query_row("PRAGMA page_size", [], |row| row.get(0))
            .unwrap_or(4096);

        Ok(CacheStats {
            entries: self.len()?,
            suspicious: suspicious as usize,
            size_bytes: (page_count * page_size) as u64,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_miss_returns_none() {
        let cache = CommitCache::in_memory().unwrap();
        assert!(cache.lookup("nope").unwrap().is_none());
        assert!(cache.is_empty().unwrap());
    }

    #[test]
    fn store_then_lookup_returns_same_tuple() {
        let cache = CommitCache::in_memory().unwrap();
        cache.store("h1", 0.42, true, 175.5).unwrap();
        assert_eq!(
            cache.lookup("h1").unwrap(),
            Some(CachedFeatures {
                score: 0.42,
                is_suspicious: true,
                density: 175.5,
            })
        );
    }

    #[test]
    fn second_store_replaces_first() {
        let cache = CommitCache::in_memory().unwrap();
        cache.store("h1", 0.42, true, 175.5).unwrap();
        cache.store("h1", 0.1, false, 3.0).unwrap();

        assert_eq!(
            cache.lookup("h1").unwrap(),
            Some(CachedFeatures {
                score: 0.1,
                is_suspicious: false,
                density: 3.0,
            })
        );
        assert_eq!(cache.len().unwrap(), 1);
    }

    #[test]
    fn clear_drops_everything() {
        let cache = CommitCache::in_memory().unwrap();
        cache.store("a", 0.0, false, 1.0).unwrap();
        cache.store("b", 0.0, false, 1.0).unwrap();

        assert_eq!(cache.clear().unwrap(), 2);
        assert!(cache.lookup("a").unwrap().is_none());
        assert_eq!(cache.len().unwrap(), 0);
    }

    #[test]
    fn entries_persist_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/cache.db");

        {
            let cache = CommitCache::open(&path).unwrap();
            cache.store("persisted", 0.3, false, 9.0).unwrap();
        }

        let cache = CommitCache::open(&path).unwrap();
        let hit = cache.lookup("persisted").unwrap().unwrap();
        assert_eq!(hit.score, 0.3);
        assert!(!hit.is_suspicious);
    }

    #[test]
    fn store_without_unique_key_still_upserts() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("legacy.db");

        {
            let conn = Connection::open(&path).unwrap();
            conn.execute_batch(
                "CREATE TABLE commit_cache (
                    hash TEXT,
                    score REAL,
                    is_suspicious INTEGER,
                    density REAL,
                    inserted_at TEXT
                );
                INSERT INTO commit_cache VALUES ('dup', 0.1, 0, 1.0, 'now');
                INSERT INTO commit_cache VALUES ('dup', 0.2, 0, 2.0, 'now');",
            )
            .unwrap();
        }

        let cache = CommitCache::open(&path).unwrap();
        cache.store("dup", 0.9, true, 300.0).unwrap();
        assert_eq!(cache.len().unwrap(), 1);
        assert_eq!(cache.lookup("dup").unwrap().unwrap().density, 300.0);
    }

    #[test]
    fn legacy_column_names_are_migrated() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("miner_cache.db");

        {
            let conn = Connection::open(&path).unwrap();
            conn.execute_batch(
                "CREATE TABLE commit_cache (
                    hash TEXT PRIMARY_KEY,
                    comment_ratio REAL,
                    is_suspicious INTEGER,
                    entropy REAL,
                    timestamp TEXT
                );
                INSERT INTO commit_cache VALUES ('old', 0.5, 1, 42.0, 'now');
                INSERT INTO commit_cache VALUES ('old', 0.6, 1, 43.0, 'now');",
            )
            .unwrap();
        }

        let cache = CommitCache::open(&path).unwrap();
        let hit = cache.lookup("old").unwrap().unwrap();
        assert_eq!(hit.score, 0.6);
        assert_eq!(hit.density, 43.0);
        assert!(hit.is_suspicious);

        cache.store("old", 0.1, false, 7.0).unwrap();
        cache.store("new", 0.2, false, 8.0).unwrap();
        assert_eq!(cache.len().unwrap(), 2);
        assert_eq!(cache.lookup("old").unwrap().unwrap().density, 7.0);

        drop(cache);
        let reopened = CommitCache::open(&path).unwrap();
        assert_eq!(reopened.lookup("new").unwrap().unwrap().score, 0.2);
    }
}
