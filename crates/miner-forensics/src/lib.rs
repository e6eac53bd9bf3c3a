//! Forensic commit classification engine.
//!
//! Walks recent git history in adjacent pairs, extracts timing, size,
//! density, and comment-composition features from each commit's diff, and
//! flags commits that look machine-written. Computed features are cached in
//! SQLite so overlapping audits skip redundant diff work.

pub mod audit;
pub mod cache;
pub mod classifier;
pub mod features;
pub mod pool;
pub mod repo;

#[cfg(test)]
mod testing;
