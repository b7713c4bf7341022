//! caravan-core — shared data model for the caravan workspace.
//!
//! Defines the records the scheduler, session, and CLI crates exchange:
//! worker hosts, jobs with their file manifests, job results, and progress
//! snapshots, plus the JSON config layer that produces them.

pub mod config;
pub mod id;
pub mod types;

pub use config::RunConfig;
pub use types::*;
