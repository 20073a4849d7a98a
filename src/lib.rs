//! Easel: Creative Generation Orchestrator
//!
//! Runs batches of image-generation jobs against flaky, rate-limited backends: one job at a
//! time with pacing, classified retries with backoff, a capacity fallback to a backup
//! backend, a stuck-job watchdog, and a per-artifact status and approval state machine.

pub mod artifact;
pub mod backend;
pub mod backoff;
pub mod classifier;
pub mod cli;
pub mod client;
pub mod config;
pub mod error;
pub mod logging;
pub mod persistence;
pub mod queue;
pub mod request;
pub mod session;
pub mod types;
pub mod watchdog;
