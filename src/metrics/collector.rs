//! Metrics collection using Prometheus
//!
//! This module provides metrics collection for the triage queue service
//! using Prometheus metrics.

use crate::types::{EntryStatus, UrgencyLevel};
use anyhow::Result;
use prometheus::{
    Encoder, Histogram, HistogramOpts, IntCounter, IntCounterVec, IntGauge, IntGaugeVec, Opts,
    Registry, TextEncoder,
};
use std::sync::Arc;
use std::time::Duration;

/// Main metrics collector for the triage queue service
#[derive(Clone)]
pub struct MetricsCollector {
    /// Prometheus registry
    registry: Arc<Registry>,

    /// Service-level metrics
    service_metrics: ServiceMetrics,

    /// Queue mutation metrics
    queue_metrics: QueueMetrics,

    /// Reconciliation worker and notification metrics
    worker_metrics: WorkerMetrics,
}

/// Service-level metrics
#[derive(Clone)]
pub struct ServiceMetrics {
    /// Service uptime in seconds
    pub uptime_seconds: IntGauge,

    /// Health check status (0=unhealthy, 1=degraded, 2=healthy)
    pub health_status: IntGauge,
}

/// Queue-related metrics
#[derive(Clone)]
pub struct QueueMetrics {
    /// Entries added, by urgency level
    pub entries_added_total: IntCounterVec,

    /// Status transitions, by target status
    pub status_transitions_total: IntCounterVec,

    /// Entries explicitly removed
    pub entries_removed_total: IntCounter,

    /// Active entries per facility
    pub active_entries: IntGaugeVec,

    /// Priority boosts applied by aging
    pub aging_boosts_total: IntCounter,

    /// Distribution of predicted waits
    pub predicted_wait_minutes: Histogram,
}

/// Worker-related metrics
#[derive(Clone)]
pub struct WorkerMetrics {
    /// Completed reconciliation ticks
    pub ticks_total: IntCounter,

    /// Facilities whose processing failed during a tick
    pub facility_failures_total: IntCounter,

    /// Duration of a full tick
    pub tick_duration_seconds: Histogram,

    /// Notification attempts, by result
    pub notifications_total: IntCounterVec,
}

impl MetricsCollector {
    /// Create a new metrics collector with default registry
    pub fn new() -> Result<Self> {
        let registry = Arc::new(Registry::new());
        Self::with_registry(registry)
    }

    /// Create a new metrics collector with custom registry
    pub fn with_registry(registry: Arc<Registry>) -> Result<Self> {
        let service_metrics = ServiceMetrics::new(&registry)?;
        let queue_metrics = QueueMetrics::new(&registry)?;
        let worker_metrics = WorkerMetrics::new(&registry)?;

        Ok(Self {
            registry,
            service_metrics,
            queue_metrics,
            worker_metrics,
        })
    }

    /// Get the Prometheus registry
    pub fn registry(&self) -> Arc<Registry> {
        self.registry.clone()
    }

    pub fn service(&self) -> &ServiceMetrics {
        &self.service_metrics
    }

    pub fn queue(&self) -> &QueueMetrics {
        &self.queue_metrics
    }

    pub fn worker(&self) -> &WorkerMetrics {
        &self.worker_metrics
    }

    /// Record a new entry joining a facility queue
    pub fn record_entry_added(&self, urgency_level: UrgencyLevel) {
        self.queue_metrics
            .entries_added_total
            .with_label_values(&[urgency_level.as_str()])
            .inc();
    }

    pub fn record_status_transition(&self, status: EntryStatus) {
        self.queue_metrics
            .status_transitions_total
            .with_label_values(&[status.as_str()])
            .inc();
    }

    pub fn record_entry_removed(&self) {
        self.queue_metrics.entries_removed_total.inc();
    }

    /// Update the active entry gauge for a facility
    pub fn set_active_entries(&self, facility_id: &str, count: usize) {
        self.queue_metrics
            .active_entries
            .with_label_values(&[facility_id])
            .set(count as i64);
    }

    pub fn record_aging_boosts(&self, count: usize) {
        self.queue_metrics.aging_boosts_total.inc_by(count as u64);
    }

    pub fn record_prediction(&self, estimated_wait_minutes: u32) {
        self.queue_metrics
            .predicted_wait_minutes
            .observe(f64::from(estimated_wait_minutes));
    }

    /// Record a notification attempt
    pub fn record_notification(&self, success: bool) {
        let result = if success { "sent" } else { "failed" };
        self.worker_metrics
            .notifications_total
            .with_label_values(&[result])
            .inc();
    }

    /// Record a completed reconciliation tick
    pub fn record_tick(&self, duration: Duration, failed_facilities: usize) {
        self.worker_metrics.ticks_total.inc();
        self.worker_metrics
            .facility_failures_total
            .inc_by(failed_facilities as u64);
        self.worker_metrics
            .tick_duration_seconds
            .observe(duration.as_secs_f64());
    }

    /// Update health status
    pub fn update_health_status(&self, status: u8) {
        self.service_metrics.health_status.set(status as i64);
    }

    pub fn update_uptime(&self, uptime: Duration) {
        self.service_metrics
            .uptime_seconds
            .set(uptime.as_secs() as i64);
    }

    /// Render every registered metric in the Prometheus text format
    pub fn encode_text(&self) -> Result<String> {
        let metric_families = self.registry.gather();
        TextEncoder::new()
            .encode_to_string(&metric_families)
            .map_err(|e| anyhow::anyhow!("Failed to encode metrics: {}", e))
    }

    /// Content type of [`encode_text`](Self::encode_text) output
    pub fn content_type(&self) -> String {
        TextEncoder::new().format_type().to_string()
    }
}

impl ServiceMetrics {
    fn new(registry: &Registry) -> Result<Self> {
        let uptime_seconds = IntGauge::new("triage_uptime_seconds", "Service uptime in seconds")?;
        registry.register(Box::new(uptime_seconds.clone()))?;

        let health_status = IntGauge::new(
            "triage_health_status",
            "Health status (0=unhealthy, 1=degraded, 2=healthy)",
        )?;
        registry.register(Box::new(health_status.clone()))?;

        Ok(Self {
            uptime_seconds,
            health_status,
        })
    }
}

impl QueueMetrics {
    fn new(registry: &Registry) -> Result<Self> {
        let entries_added_total = IntCounterVec::new(
            Opts::new("triage_entries_added_total", "Total entries added"),
            &["urgency"],
        )?;
        registry.register(Box::new(entries_added_total.clone()))?;

        let status_transitions_total = IntCounterVec::new(
            Opts::new(
                "triage_status_transitions_total",
                "Total entry status transitions",
            ),
            &["status"],
        )?;
        registry.register(Box::new(status_transitions_total.clone()))?;

        let entries_removed_total =
            IntCounter::new("triage_entries_removed_total", "Total entries removed")?;
        registry.register(Box::new(entries_removed_total.clone()))?;

        let active_entries = IntGaugeVec::new(
            Opts::new("triage_active_entries", "Entries currently in the ordering"),
            &["facility"],
        )?;
        registry.register(Box::new(active_entries.clone()))?;

        let aging_boosts_total = IntCounter::new(
            "triage_aging_boosts_total",
            "Total priority boosts applied by aging",
        )?;
        registry.register(Box::new(aging_boosts_total.clone()))?;

        let predicted_wait_minutes = Histogram::with_opts(
            HistogramOpts::new("triage_predicted_wait_minutes", "Predicted wait in minutes")
                .buckets(vec![5.0, 10.0, 15.0, 30.0, 45.0, 60.0, 90.0, 120.0, 240.0]),
        )?;
        registry.register(Box::new(predicted_wait_minutes.clone()))?;

        Ok(Self {
            entries_added_total,
            status_transitions_total,
            entries_removed_total,
            active_entries,
            aging_boosts_total,
            predicted_wait_minutes,
        })
    }
}

impl WorkerMetrics {
    fn new(registry: &Registry) -> Result<Self> {
        let ticks_total = IntCounter::new("triage_worker_ticks_total", "Completed worker ticks")?;
        registry.register(Box::new(ticks_total.clone()))?;

        let facility_failures_total = IntCounter::new(
            "triage_worker_facility_failures_total",
            "Facilities that failed during a tick",
        )?;
        registry.register(Box::new(facility_failures_total.clone()))?;

        let tick_duration_seconds = Histogram::with_opts(
            HistogramOpts::new(
                "triage_worker_tick_duration_seconds",
                "Reconciliation tick duration",
            )
            .buckets(vec![0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0, 5.0]),
        )?;
        registry.register(Box::new(tick_duration_seconds.clone()))?;

        let notifications_total = IntCounterVec::new(
            Opts::new("triage_notifications_total", "Notification attempts"),
            &["result"],
        )?;
        registry.register(Box::new(notifications_total.clone()))?;

        Ok(Self {
            ticks_total,
            facility_failures_total,
            tick_duration_seconds,
            notifications_total,
        })
    }
}
