//! Metrics and monitoring for the triage queue service
//!
//! This module provides Prometheus metrics collection and the HTTP health,
//! worker status and metrics endpoints.

pub mod collector;
pub mod health;

pub use collector::{MetricsCollector, QueueMetrics, ServiceMetrics, WorkerMetrics};
pub use health::{HealthServer, HealthServerConfig, HealthStatus};
