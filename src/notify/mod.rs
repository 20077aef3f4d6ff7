//! Outbound notifications for entries nearing their turn
//!
//! The queue core never delivers anything itself. It hands
//! [`NotificationEvent`]s to a [`NotificationSink`]; whatever sits behind the
//! sink (SMS gateway, push service, message broker) is someone else's
//! concern.

pub mod amqp;

use crate::error::{QueueError, Result};
use crate::types::NotificationEvent;
use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::Mutex;
use tracing::info;

pub use amqp::{AmqpConfig, AmqpConnection, AmqpNotificationSink, NotificationEnvelope};

/// Receiver of near-turn notifications
#[async_trait]
pub trait NotificationSink: Send + Sync {
    /// Deliver one notification. An error leaves the entry eligible for
    /// another attempt on the next tick.
    async fn notify(&self, event: &NotificationEvent) -> Result<()>;
}

/// Sink that writes every notification to the log
#[derive(Debug, Default)]
pub struct LoggingNotificationSink;

impl LoggingNotificationSink {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl NotificationSink for LoggingNotificationSink {
    async fn notify(&self, event: &NotificationEvent) -> Result<()> {
        info!(
            facility_id = %event.facility_id,
            entry_id = %event.entry_id,
            position = event.position,
            "{}",
            event.message
        );
        Ok(())
    }
}

/// In-memory sink that keeps every delivered event, for tests and dry runs.
/// Delivery can be made to fail per facility.
#[derive(Debug, Default)]
pub struct RecordingNotificationSink {
    delivered: Mutex<Vec<NotificationEvent>>,
    failing_facilities: Mutex<HashSet<String>>,
}

impl RecordingNotificationSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every delivery for `facility_id` fail until [`recover`](Self::recover)
    pub fn fail_for(&self, facility_id: &str) {
        if let Ok(mut failing) = self.failing_facilities.lock() {
            failing.insert(facility_id.to_string());
        }
    }

    pub fn recover(&self, facility_id: &str) {
        if let Ok(mut failing) = self.failing_facilities.lock() {
            failing.remove(facility_id);
        }
    }

    /// Every event delivered so far, in delivery order
    pub fn events(&self) -> Vec<NotificationEvent> {
        self.delivered
            .lock()
            .map(|events| events.clone())
            .unwrap_or_default()
    }

    /// Delivered events for one entry
    pub fn events_for(&self, entry_id: &str) -> Vec<NotificationEvent> {
        self.events()
            .into_iter()
            .filter(|event| event.entry_id == entry_id)
            .collect()
    }

    pub fn clear(&self) {
        if let Ok(mut events) = self.delivered.lock() {
            events.clear();
        }
    }
}

#[async_trait]
impl NotificationSink for RecordingNotificationSink {
    async fn notify(&self, event: &NotificationEvent) -> Result<()> {
        let failing = self
            .failing_facilities
            .lock()
            .map_err(|_| QueueError::lock_poisoned("failing facilities"))?
            .contains(&event.facility_id);
        if failing {
            return Err(QueueError::Notifier {
                message: format!("delivery to facility {} unavailable", event.facility_id),
            }
            .into());
        }

        self.delivered
            .lock()
            .map_err(|_| QueueError::lock_poisoned("delivered events"))?
            .push(event.clone());
        Ok(())
    }
}
