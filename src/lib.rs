//! Triage Queue - patient queue ordering and wait-time estimation
//!
//! This crate keeps one ordered queue per facility, ages waiting entries so
//! lower urgencies are not starved, predicts waits from staffing and load, and
//! periodically notifies patients whose turn is near.

pub mod config;
pub mod error;
pub mod metrics;
pub mod notify;
pub mod queue;
pub mod reconcile;
pub mod service;
pub mod types;
pub mod utils;
pub mod wait_time;

// Re-export commonly used types and traits
pub use error::{QueueError, Result};
pub use types::*;

// Re-export key components
pub use notify::NotificationSink;
pub use queue::{PriorityEngine, QueueStore};
pub use reconcile::{ReconciliationWorker, TickReport, WorkerConfig};
pub use wait_time::{DefaultWaitTimePredictor, WaitTimePredictor};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
