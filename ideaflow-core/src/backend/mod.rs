//! Hosted backend integration
//!
//! - [`BackendClient`]: REST client for the pipeline tables and the
//!   prototype generation function
//! - [`sync_mirror`]: copy the hosted tables into the local database

pub mod client;
pub mod mirror;

pub use client::BackendClient;
pub use mirror::{sync_mirror, SyncSummary};
