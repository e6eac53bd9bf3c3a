use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::MinerError;

/// Top-level configuration loaded from `.origin-miner.toml`.
///
/// Supports layered resolution: CLI flags > config file > defaults.
///
/// # Examples
///
/// ```
/// use miner_core::MinerConfig;
///
/// let config = MinerConfig::default();
/// assert_eq!(config.audit.max_commits, 50);
/// assert!(config.cache.enabled);
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MinerConfig {
    /// History window settings.
    #[serde(default)]
    pub audit: AuditConfig,
    /// Diff worker pool limits.
    #[serde(default)]
    pub workers: WorkersConfig,
    /// Commit cache location.
    #[serde(default)]
    pub cache: CacheConfig,
    /// Classifier thresholds.
    #[serde(default)]
    pub rules: RulesConfig,
}

impl MinerConfig {
    /// Load configuration from a TOML file at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`MinerError::FileNotFound`] if the file does not exist,
    /// [`MinerError::Io`] if it cannot be read, or [`MinerError::Toml`] if
    /// the content is not valid TOML.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use miner_core::MinerConfig;
    /// use std::path::Path;
    ///
    /// let config = MinerConfig::from_file(Path::new(".origin-miner.toml")).unwrap();
    /// ```
    pub fn from_file(path: &Path) -> Result<Self, MinerError> {
        if !path.exists() {
            return Err(MinerError::FileNotFound(path.to_path_buf()));
        }
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    /// Parse configuration from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns [`MinerError::Toml`] if parsing fails.
    ///
    /// # Examples
    ///
    /// ```
    /// use miner_core::MinerConfig;
    ///
    /// let toml = r#"
    /// [audit]
    /// max_commits = 200
    /// "#;
    /// let config = MinerConfig::from_toml(toml).unwrap();
    /// assert_eq!(config.audit.max_commits, 200);
    /// ```
    pub fn from_toml(content: &str) -> Result<Self, MinerError> {
        let config: Self = toml::from_str(content)?;
        Ok(config)
    }
}

/// History window configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditConfig {
    /// Number of most recent commits to resolve (default: 50).
    #[serde(default = "default_max_commits")]
    pub max_commits: usize,
    /// Only keep commits by this author name.
    pub author: Option<String>,
}

fn default_max_commits() -> usize {
    50
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            max_commits: default_max_commits(),
            author: None,
        }
    }
}

/// Diff worker pool configuration.
///
/// # Examples
///
/// ```
/// use miner_core::WorkersConfig;
///
/// let config = WorkersConfig::default();
/// assert_eq!(config.max_workers, 0);
/// assert_eq!(config.item_timeout_secs, 30);
/// assert_eq!(config.dispatch_deadline_secs, 300);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkersConfig {
    /// Upper bound on concurrent workers; 0 uses available parallelism.
    #[serde(default)]
    pub max_workers: usize,
    /// Seconds a single commit's diff may take before it falls back (default: 30).
    #[serde(default = "default_item_timeout_secs")]
    pub item_timeout_secs: u64,
    /// Seconds the whole dispatch phase may take (default: 300).
    #[serde(default = "default_dispatch_deadline_secs")]
    pub dispatch_deadline_secs: u64,
}

fn default_item_timeout_secs() -> u64 {
    30
}

fn default_dispatch_deadline_secs() -> u64 {
    300
}

impl Default for WorkersConfig {
    fn default() -> Self {
        Self {
            max_workers: 0,
            item_timeout_secs: default_item_timeout_secs(),
            dispatch_deadline_secs: default_dispatch_deadline_secs(),
        }
    }
}

/// Commit cache configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Persist features between runs (default: true).
    #[serde(default = "default_cache_enabled")]
    pub enabled: bool,
    /// Database path, relative to the audited repository unless absolute.
    #[serde(default = "default_cache_path")]
    pub path: PathBuf,
}

fn default_cache_enabled() -> bool {
    true
}

fn default_cache_path() -> PathBuf {
    PathBuf::from(".origin-miner/cache.db")
}

impl CacheConfig {
    /// Resolve the cache database location for a repository.
    ///
    /// # Examples
    ///
    /// ```
    /// use std::path::Path;
    /// use miner_core::CacheConfig;
    ///
    /// let config = CacheConfig::default();
    /// let path = config.resolve(Path::new("/repo"));
    /// assert_eq!(path, Path::new("/repo/.origin-miner/cache.db"));
    /// ```
    pub fn resolve(&self, repo_path: &Path) -> PathBuf {
        if self.path.is_absolute() {
            self.path.clone()
        } else {
            repo_path.join(&self.path)
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: default_cache_enabled(),
            path: default_cache_path(),
        }
    }
}

/// Classifier thresholds. All comparisons are exclusive.
///
/// # Examples
///
/// ```
/// use miner_core::RulesConfig;
///
/// let rules = RulesConfig::default();
/// assert_eq!(rules.velocity_max_seconds, 15);
/// assert_eq!(rules.density_max, 150.0);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RulesConfig {
    #[serde(default = "default_velocity_max_seconds")]
    pub velocity_max_seconds: i64,
    #[serde(default = "default_velocity_min_lines")]
    pub velocity_min_lines: u64,
    #[serde(default = "default_density_max")]
    pub density_max: f64,
    #[serde(default = "default_robotic_max_seconds")]
    pub robotic_max_seconds: i64,
    #[serde(default = "default_robotic_min_comment_ratio")]
    pub robotic_min_comment_ratio: f64,
}

fn default_velocity_max_seconds() -> i64 {
    15
}

fn default_velocity_min_lines() -> u64 {
    50
}

fn default_density_max() -> f64 {
    150.0
}

fn default_robotic_max_seconds() -> i64 {
    10
}

fn default_robotic_min_comment_ratio() -> f64 {
    0.40
}

impl Default for RulesConfig {
    fn default() -> Self {
        Self {
            velocity_max_seconds: default_velocity_max_seconds(),
            velocity_min_lines: default_velocity_min_lines(),
            density_max: default_density_max(),
            robotic_max_seconds: default_robotic_max_seconds(),
            robotic_min_comment_ratio: default_robotic_min_comment_ratio(),
        }
    }
}
