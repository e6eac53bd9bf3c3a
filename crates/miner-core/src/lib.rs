//! Core types, configuration, and error handling for origin-miner.
//!
//! This crate provides the shared foundation used by the forensic engine and
//! the command-line shell:
//! - [`MinerError`]: unified error type using `thiserror`
//! - [`MinerConfig`]: configuration loaded from `.origin-miner.toml`
//! - Shared data model: [`CommitRef`], [`CommitPair`], [`CommitStats`],
//!   [`FeatureSummary`], [`AuditRecord`], [`OutputFormat`]
//! - [`telemetry::init_tracing`]: global `tracing` subscriber setup

mod config;
mod error;
pub mod telemetry;
mod types;

pub use config::{AuditConfig, CacheConfig, MinerConfig, RulesConfig, WorkersConfig};
pub use error::MinerError;
pub use types::{
    AuditRecord, CommitPair, CommitRef, CommitStats, FeatureSource, FeatureSummary, FileStat,
    OutputFormat, SuspicionRule,
};

/// A convenience `Result` type for origin-miner operations.
pub type Result<T> = std::result::Result<T, MinerError>;
