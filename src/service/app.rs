//! Main application state and service coordination
//!
//! This module contains the production AppState that wires the queue store,
//! the reconciliation worker, notification delivery and the health server
//! together, and owns their background tasks.

use crate::config::{AppConfig, SinkKind};
use crate::metrics::health::HealthServerConfig;
use crate::metrics::{HealthServer, MetricsCollector};
use crate::notify::{
    AmqpConfig, AmqpConnection, AmqpNotificationSink, LoggingNotificationSink, NotificationSink,
};
use crate::queue::{PriorityEngine, QueueStore};
use crate::reconcile::ReconciliationWorker;
use crate::utils::{Clock, SystemClock};
use crate::wait_time::{DefaultWaitTimePredictor, InMemoryStatisticsTracker};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tokio::time::Duration;
use tracing::{debug, error, info, warn};

/// Samples kept per facility and urgency level
const STATISTICS_WINDOW: usize = 10_000;

/// Service-level errors
#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("Configuration error: {message}")]
    Configuration { message: String },

    #[error("AMQP connection error: {message}")]
    AmqpConnection { message: String },

    #[error("Service initialization error: {message}")]
    Initialization { message: String },

    #[error("Background task error: {message}")]
    BackgroundTask { message: String },
}

/// Main application state containing all service components
pub struct AppState {
    /// Application configuration
    config: AppConfig,

    /// Facility queues
    store: QueueStore,

    /// Periodic aging, estimate refresh and notification
    worker: Arc<ReconciliationWorker>,

    metrics_collector: Arc<MetricsCollector>,

    health_server: Arc<HealthServer>,

    /// Broker connection, present when the amqp sink is configured
    amqp_connection: Option<AmqpConnection>,

    /// Background task handles
    background_tasks: Vec<JoinHandle<()>>,

    /// Service status
    is_running: Arc<RwLock<bool>>,

    started_at: DateTime<Utc>,
}

impl AppState {
    /// Initialize the application, connecting to the broker if the amqp sink
    /// is configured
    pub async fn new(config: AppConfig) -> Result<Self, ServiceError> {
        info!("Initializing {} service", config.service.name);
        info!(
            "Configuration: service={}, sink={:?}, tick_interval={}s",
            config.service.name, config.notifications.sink, config.worker.tick_interval_seconds
        );

        let (sink, amqp_connection) = Self::initialize_sink(&config).await?;

        let mut state = Self::with_components(config, sink, Arc::new(SystemClock))?;
        state.amqp_connection = amqp_connection;
        Ok(state)
    }

    /// Build the service around an existing sink and clock, without touching
    /// the network
    pub fn with_components(
        config: AppConfig,
        sink: Arc<dyn NotificationSink>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, ServiceError> {
        let metrics_collector =
            Arc::new(
                MetricsCollector::new().map_err(|e| ServiceError::Initialization {
                    message: format!("Failed to create metrics collector: {}", e),
                })?,
            );

        let store = Self::initialize_store(&config, clock, metrics_collector.clone())?;

        let worker = Arc::new(
            ReconciliationWorker::new(store.clone(), sink, config.worker_config())
                .map_err(|e| ServiceError::Configuration {
                    message: format!("Invalid worker configuration: {}", e),
                })?
                .with_metrics(metrics_collector.clone()),
        );

        let health_config = HealthServerConfig {
            port: config.service.health_port,
            host: "0.0.0.0".to_string(),
        };
        let health_server = Arc::new(
            HealthServer::new(health_config, metrics_collector.clone()).with_worker(worker.clone()),
        );

        Ok(Self {
            config,
            store,
            worker,
            metrics_collector,
            health_server,
            amqp_connection: None,
            background_tasks: Vec::new(),
            is_running: Arc::new(RwLock::new(false)),
            started_at: Utc::now(),
        })
    }

    /// Start the health server, the reconciliation worker and maintenance
    /// tasks
    pub async fn start(&mut self) -> Result<(), ServiceError> {
        info!("Starting {} service", self.config.service.name);

        *self.is_running.write().await = true;
        self.started_at = Utc::now();

        self.start_health_server().await?;

        self.worker
            .start()
            .await
            .map_err(|e| ServiceError::BackgroundTask {
                message: format!("Failed to start reconciliation worker: {}", e),
            })?;

        self.start_background_tasks();

        info!("✅ {} service started successfully", self.config.service.name);
        Ok(())
    }

    /// Perform graceful shutdown. An in-flight tick is allowed to finish.
    pub async fn shutdown(&mut self) -> Result<(), ServiceError> {
        info!("Starting graceful shutdown of {}", self.config.service.name);

        *self.is_running.write().await = false;

        let timeout = self.config.shutdown_timeout();
        match tokio::time::timeout(timeout, self.worker.stop()).await {
            Ok(Ok(())) => info!("✅ Reconciliation worker stopped"),
            Ok(Err(e)) => warn!("Reconciliation worker stopped with error: {}", e),
            Err(_) => warn!(
                "Reconciliation worker did not stop within {}s",
                timeout.as_secs()
            ),
        }

        self.stop_background_tasks().await;

        info!("Stopping health server...");
        if let Err(e) = self.health_server.stop().await {
            warn!("Failed to stop health server: {}", e);
        }

        if let Some(connection) = self.amqp_connection.take() {
            if let Err(e) = connection.close().await {
                warn!("Failed to close AMQP connection: {}", e);
            } else {
                info!("✅ AMQP connection closed");
            }
        }

        match self.worker.status() {
            Ok(status) => info!(
                "Final worker status: ticks_completed={}, last_tick_at={:?}",
                status.ticks_completed, status.last_tick_at
            ),
            Err(e) => warn!("Failed to read final worker status: {}", e),
        }

        info!("✅ {} shutdown completed", self.config.service.name);
        Ok(())
    }

    /// Get service configuration
    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// Check if service is running
    pub async fn is_running(&self) -> bool {
        *self.is_running.read().await
    }

    /// Queue store handle for intake and staff operations
    pub fn store(&self) -> QueueStore {
        self.store.clone()
    }

    pub fn worker(&self) -> Arc<ReconciliationWorker> {
        self.worker.clone()
    }

    pub fn metrics_collector(&self) -> Arc<MetricsCollector> {
        self.metrics_collector.clone()
    }

    pub fn health_server(&self) -> Arc<HealthServer> {
        self.health_server.clone()
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    fn initialize_store(
        config: &AppConfig,
        clock: Arc<dyn Clock>,
        metrics_collector: Arc<MetricsCollector>,
    ) -> Result<QueueStore, ServiceError> {
        let engine =
            PriorityEngine::new(config.aging_config()).map_err(|e| ServiceError::Configuration {
                message: format!("Invalid aging configuration: {}", e),
            })?;
        let predictor = DefaultWaitTimePredictor::new(config.predictor.clone()).map_err(|e| {
            ServiceError::Configuration {
                message: format!("Invalid predictor configuration: {}", e),
            }
        })?;
        let capacity_provider =
            config
                .capacity_provider()
                .map_err(|e| ServiceError::Configuration {
                    message: format!("Invalid capacity configuration: {}", e),
                })?;

        Ok(QueueStore::new(
            engine,
            Arc::new(predictor),
            Arc::new(capacity_provider),
            clock,
        )
        .with_metrics(metrics_collector)
        .with_statistics(Arc::new(InMemoryStatisticsTracker::new(STATISTICS_WINDOW))))
    }

    /// Build the configured notification sink
    async fn initialize_sink(
        config: &AppConfig,
    ) -> Result<(Arc<dyn NotificationSink>, Option<AmqpConnection>), ServiceError> {
        match config.notifications.sink {
            SinkKind::Log => {
                info!("Notifications will be written to the log");
                Ok((Arc::new(LoggingNotificationSink::new()), None))
            }
            SinkKind::Amqp => {
                let connection = Self::initialize_amqp(config).await?;
                let channel =
                    connection
                        .open_channel()
                        .await
                        .map_err(|e| ServiceError::AmqpConnection {
                            message: format!("Failed to open AMQP channel: {}", e),
                        })?;

                let sink = AmqpNotificationSink::new(
                    channel,
                    config.notifications.exchange.clone(),
                    config.notifications.max_retries,
                    config.notification_retry_delay(),
                )
                .await
                .map_err(|e| ServiceError::Initialization {
                    message: format!("Failed to initialize notification sink: {}", e),
                })?;

                info!(
                    "Notifications will be published to exchange '{}'",
                    config.notifications.exchange
                );
                Ok((Arc::new(sink), Some(connection)))
            }
        }
    }

    /// Initialize AMQP connection with retry logic
    async fn initialize_amqp(config: &AppConfig) -> Result<AmqpConnection, ServiceError> {
        let amqp_config = AmqpConfig::from_url(&config.notifications.amqp_url).map_err(|e| {
            ServiceError::Configuration {
                message: format!("Failed to parse AMQP URL: {}", e),
            }
        })?;
        info!(
            "Connecting to AMQP broker at {}:{}",
            amqp_config.host, amqp_config.port
        );

        AmqpConnection::new(&amqp_config)
            .await
            .map_err(|e| ServiceError::AmqpConnection {
                message: format!("Failed to connect to AMQP: {}", e),
            })
    }

    async fn start_health_server(&mut self) -> Result<(), ServiceError> {
        info!("Starting health and metrics endpoints");

        let health_server = self.health_server.clone();
        let port = self.config.service.health_port;

        let handle = tokio::spawn(async move {
            if let Err(e) = health_server.start().await {
                error!("Health server failed: {}", e);
            } else {
                info!("Health server task completed");
            }
        });
        self.background_tasks.push(handle);

        // Give the server a moment to bind
        tokio::time::sleep(Duration::from_millis(100)).await;

        info!("✅ Health server started on port {}", port);
        Ok(())
    }

    /// Start the service metrics task
    fn start_background_tasks(&mut self) {
        info!("Starting health metrics task (60s interval)...");
        let metrics_collector = self.metrics_collector.clone();
        let worker = self.worker.clone();
        let is_running = self.is_running.clone();

        let health_metrics_task = tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_secs(60));
            let start_time = tokio::time::Instant::now();
            info!("Health metrics task started");

            while *is_running.read().await {
                interval.tick().await;

                let uptime = start_time.elapsed();
                metrics_collector.update_uptime(uptime);
                metrics_collector.update_health_status(if worker.is_running() { 2 } else { 0 });

                debug!(
                    "Updated service health metrics - uptime: {}s",
                    uptime.as_secs()
                );
            }

            info!("Health metrics task stopped");
        });

        self.background_tasks.push(health_metrics_task);
    }

    /// Stop all background tasks
    async fn stop_background_tasks(&mut self) {
        let task_count = self.background_tasks.len();
        if task_count == 0 {
            debug!("No background tasks to stop");
            return;
        }

        info!("Stopping {} background tasks...", task_count);

        for (i, task) in self.background_tasks.drain(..).enumerate() {
            debug!("Aborting background task {}/{}", i + 1, task_count);
            task.abort();
        }

        info!("✅ All {} background tasks stopped", task_count);
    }
}
