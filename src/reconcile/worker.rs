//! Periodic reconciliation of every facility queue
//!
//! Each tick ages and reorders every facility, refreshes its estimates,
//! notifies entries nearing their turn and purges old finished entries.
//! Facilities are processed independently: a failure in one is logged and
//! counted but never stops the others.

use crate::error::{QueueError, Result};
use crate::metrics::MetricsCollector;
use crate::notify::NotificationSink;
use crate::queue::facility::NearTurnPolicy;
use crate::queue::store::QueueStore;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, MissedTickBehavior};
use tokio_stream::wrappers::IntervalStream;
use tokio_stream::{Stream, StreamExt};
use tracing::{debug, error, info, warn};

/// Worker schedule and notification thresholds
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerConfig {
    pub tick_interval_seconds: u64,
    /// Entries at or above this position are near their turn
    pub notify_position_threshold: usize,
    /// Entries expecting at most this many minutes are near their turn
    pub notify_wait_threshold_minutes: u32,
    pub renotify_interval_minutes: i64,
    /// How long COMPLETED and CANCELLED entries are kept before purging
    pub completed_retention_minutes: i64,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            tick_interval_seconds: 60,
            notify_position_threshold: 3,
            notify_wait_threshold_minutes: 15,
            renotify_interval_minutes: 30,
            completed_retention_minutes: 240,
        }
    }
}

impl WorkerConfig {
    pub fn validate(&self) -> Result<()> {
        if self.tick_interval_seconds == 0 {
            return Err(QueueError::Configuration {
                message: "tick_interval_seconds must be greater than 0".to_string(),
            }
            .into());
        }

        if self.renotify_interval_minutes <= 0 {
            return Err(QueueError::Configuration {
                message: "renotify_interval_minutes must be positive".to_string(),
            }
            .into());
        }

        if self.completed_retention_minutes < 0 {
            return Err(QueueError::Configuration {
                message: "completed_retention_minutes must be non-negative".to_string(),
            }
            .into());
        }

        Ok(())
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_secs(self.tick_interval_seconds)
    }

    pub fn near_turn_policy(&self) -> NearTurnPolicy {
        NearTurnPolicy {
            position_threshold: self.notify_position_threshold,
            wait_threshold_minutes: self.notify_wait_threshold_minutes,
            renotify_interval: chrono::Duration::minutes(self.renotify_interval_minutes),
        }
    }

    pub fn retention(&self) -> chrono::Duration {
        chrono::Duration::minutes(self.completed_retention_minutes)
    }
}

/// What one tick did
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TickReport {
    pub started_at: DateTime<Utc>,
    pub facilities_processed: usize,
    pub facilities_failed: usize,
    pub position_changes: usize,
    pub notifications_sent: usize,
    pub notifications_failed: usize,
    pub entries_purged: usize,
    pub duration_ms: u64,
}

impl TickReport {
    fn new(started_at: DateTime<Utc>) -> Self {
        Self {
            started_at,
            facilities_processed: 0,
            facilities_failed: 0,
            position_changes: 0,
            notifications_sent: 0,
            notifications_failed: 0,
            entries_purged: 0,
            duration_ms: 0,
        }
    }
}

/// Externally visible worker state
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WorkerStatus {
    pub running: bool,
    pub last_tick_at: Option<DateTime<Utc>>,
    pub ticks_completed: u64,
    pub last_tick_report: Option<TickReport>,
}

struct Runner {
    shutdown_tx: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

impl Runner {
    /// The loop drops its shutdown receiver as soon as it leaves
    fn loop_exited(&self) -> bool {
        self.shutdown_tx.is_closed()
    }
}

/// Drives reconciliation ticks from a timer or any other tick source
pub struct ReconciliationWorker {
    store: QueueStore,
    sink: Arc<dyn NotificationSink>,
    config: WorkerConfig,
    metrics_collector: Option<Arc<MetricsCollector>>,
    status: Mutex<WorkerStatus>,
    runner: tokio::sync::Mutex<Option<Runner>>,
    /// Serializes ticks from the loop and from direct `tick()` callers
    tick_guard: tokio::sync::Mutex<()>,
}

impl ReconciliationWorker {
    pub fn new(
        store: QueueStore,
        sink: Arc<dyn NotificationSink>,
        config: WorkerConfig,
    ) -> Result<Self> {
        config.validate()?;

        Ok(Self {
            store,
            sink,
            config,
            metrics_collector: None,
            status: Mutex::new(WorkerStatus::default()),
            runner: tokio::sync::Mutex::new(None),
            tick_guard: tokio::sync::Mutex::new(()),
        })
    }

    pub fn with_metrics(mut self, metrics_collector: Arc<MetricsCollector>) -> Self {
        self.metrics_collector = Some(metrics_collector);
        self
    }

    pub fn config(&self) -> &WorkerConfig {
        &self.config
    }

    /// Start ticking every configured interval. No-op if already running.
    pub async fn start(self: &Arc<Self>) -> Result<()> {
        let period = self.config.tick_interval();
        let mut ticker = interval_at(tokio::time::Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        self.start_with_ticks(IntervalStream::new(ticker)).await
    }

    /// Start ticking once per item of `ticks`. No-op if already running.
    /// The loop ends on [`stop`](Self::stop) or when the stream is exhausted.
    pub async fn start_with_ticks<S>(self: &Arc<Self>, ticks: S) -> Result<()>
    where
        S: Stream + Send + 'static,
        S::Item: Send,
    {
        let mut runner = self.runner.lock().await;
        if let Some(existing) = runner.take() {
            if !existing.loop_exited() {
                *runner = Some(existing);
                debug!("Reconciliation worker already running");
                return Ok(());
            }

            // Let the finished loop clear its status before replacing it
            if let Err(e) = existing.handle.await {
                error!("Reconciliation worker task failed: {}", e);
            }
        }

        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
        let worker = Arc::clone(self);
        self.set_running(true)?;

        let handle = tokio::spawn(async move {
            let mut ticks = Box::pin(ticks);
            loop {
                tokio::select! {
                    biased;
                    _ = shutdown_rx.changed() => break,
                    next = ticks.next() => match next {
                        Some(_) => {
                            worker.tick().await;
                        }
                        None => {
                            debug!("Tick source exhausted");
                            break;
                        }
                    },
                }
            }
            drop(shutdown_rx);

            if let Err(e) = worker.set_running(false) {
                error!("Failed to update worker status: {}", e);
            }
        });

        *runner = Some(Runner {
            shutdown_tx,
            handle,
        });
        info!(
            "Reconciliation worker started (interval {}s)",
            self.config.tick_interval_seconds
        );
        Ok(())
    }

    /// Stop scheduling ticks. Returns once any in-flight tick has finished.
    pub async fn stop(&self) -> Result<()> {
        let Some(runner) = self.runner.lock().await.take() else {
            debug!("Reconciliation worker not running");
            return Ok(());
        };

        // The loop may already be gone if its tick source ended
        let _ = runner.shutdown_tx.send(true);
        if let Err(e) = runner.handle.await {
            error!("Reconciliation worker task failed: {}", e);
        }
        self.set_running(false)?;

        info!("Reconciliation worker stopped");
        Ok(())
    }

    pub fn status(&self) -> Result<WorkerStatus> {
        Ok(self
            .status
            .lock()
            .map_err(|_| QueueError::lock_poisoned("worker status"))?
            .clone())
    }

    pub fn is_running(&self) -> bool {
        self.status().map(|status| status.running).unwrap_or(false)
    }

    fn set_running(&self, running: bool) -> Result<()> {
        self.status
            .lock()
            .map_err(|_| QueueError::lock_poisoned("worker status"))?
            .running = running;
        Ok(())
    }

    /// Run one reconciliation pass over every known facility
    pub async fn tick(&self) -> TickReport {
        let _guard = self.tick_guard.lock().await;
        let timer = Instant::now();
        let mut report = TickReport::new(self.store.clock().now());

        let facility_ids = match self.store.facility_ids() {
            Ok(ids) => ids,
            Err(e) => {
                error!("Failed to list facilities: {}", e);
                Vec::new()
            }
        };

        for facility_id in &facility_ids {
            match self.reconcile_facility(facility_id, &mut report).await {
                Ok(()) => report.facilities_processed += 1,
                Err(e) => {
                    report.facilities_failed += 1;
                    error!("Reconciliation of facility {} failed: {}", facility_id, e);
                }
            }
        }

        let elapsed = timer.elapsed();
        report.duration_ms = elapsed.as_millis() as u64;

        if let Some(metrics) = &self.metrics_collector {
            metrics.record_tick(elapsed, report.facilities_failed);
        }

        match self.status.lock() {
            Ok(mut status) => {
                status.last_tick_at = Some(report.started_at);
                status.ticks_completed += 1;
                status.last_tick_report = Some(report.clone());
            }
            Err(_) => error!("Failed to record tick: worker status lock poisoned"),
        }

        debug!(
            "Tick finished: {} facilities ok, {} failed, {} notified in {}ms",
            report.facilities_processed,
            report.facilities_failed,
            report.notifications_sent,
            report.duration_ms
        );
        report
    }

    async fn reconcile_facility(&self, facility_id: &str, report: &mut TickReport) -> Result<()> {
        let aged = self.store.age_entries(facility_id)?;
        let reordered = self.store.reorder(facility_id)?;
        report.position_changes += aged.len() + reordered.len();

        self.store.refresh_estimates(facility_id)?;

        let candidates = self
            .store
            .near_turn_candidates(facility_id, &self.config.near_turn_policy())?;
        let attempted = candidates.len();
        let mut failed = 0;

        // Outside any facility lock; mutations proceed while we deliver
        for event in candidates {
            let delivered = self.sink.notify(&event).await;
            if let Some(metrics) = &self.metrics_collector {
                metrics.record_notification(delivered.is_ok());
            }

            match delivered {
                Ok(()) => {
                    if self
                        .store
                        .mark_notified(facility_id, &event.entry_id, event.created_at)?
                    {
                        report.notifications_sent += 1;
                    }
                }
                Err(e) => {
                    failed += 1;
                    report.notifications_failed += 1;
                    warn!(
                        "Failed to notify entry {} in facility {}: {}",
                        event.entry_id, facility_id, e
                    );
                }
            }
        }

        report.entries_purged += self
            .store
            .purge_inactive(facility_id, self.config.retention())?;

        if failed > 0 {
            return Err(QueueError::Notifier {
                message: format!("{} of {} notifications failed", failed, attempted),
            }
            .into());
        }
        Ok(())
    }
}
