//! Background reconciliation of facility queues

pub mod worker;

pub use worker::{ReconciliationWorker, TickReport, WorkerConfig, WorkerStatus};
