//! # ideaflow-core
//!
//! Core library for ideaflow - the admin side of an innovation pipeline where
//! employee ideas move through approval, PRD authoring and AI prototype
//! generation.
//!
//! This library provides:
//! - Domain types for ideas, PRDs, prototypes and users
//! - Analytics over date ranges (conversion rates, trends, benchmarks)
//! - The generate-then-poll prototype workflow with resumable state
//! - A REST client for the hosted backend and a local SQLite mirror
//! - Configuration management
//! - Logging infrastructure
//!
//! ## Example
//!
//! ```rust,no_run
//! use chrono::Utc;
//! use ideaflow_core::analytics::{compute_analytics, DateRangePreset};
//! use ideaflow_core::{Config, Database};
//!
//! let config = Config::load().expect("failed to load config");
//!
//! let db = Database::open(&Config::database_path()).expect("failed to open database");
//! db.migrate().expect("failed to run migrations");
//!
//! let now = Utc::now();
//! let range = DateRangePreset::Last30Days.resolve();
//! let report = compute_analytics(&db, &range, &config.analytics, now).expect("invalid range");
//! println!("{} ideas", report.data.total_ideas.count);
//! ```

// Re-export commonly used items at the crate root
pub use config::Config;
pub use db::Database;
pub use error::{Error, Result};
pub use types::*;

// Public modules
pub mod analytics;
pub mod backend;
pub mod config;
pub mod db;
pub mod error;
pub mod format;
pub mod generation;
pub mod logging;
pub mod types;
