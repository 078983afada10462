//! Database layer for ideaflow
//!
//! Local SQLite mirror of the hosted pipeline tables:
//! - Schema migrations
//! - Repository pattern for queries
//! - Cached analytics snapshots

pub mod repo;
pub mod schema;

pub use repo::{Database, MirrorCounts, StoredSnapshot};
