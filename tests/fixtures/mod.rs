//! Test fixtures shared by the integration test binaries

#![allow(dead_code)]

use chrono::{DateTime, TimeZone, Utc};
use std::sync::Arc;
use triage_queue::notify::RecordingNotificationSink;
use triage_queue::queue::{
    AgingConfig, CapacityProvider, PriorityEngine, QueueStore, StaticCapacityProvider,
};
use triage_queue::reconcile::{ReconciliationWorker, WorkerConfig};
use triage_queue::types::{NewEntry, QueueSnapshot, UrgencyLevel};
use triage_queue::utils::{Clock, ManualClock};
use triage_queue::wait_time::{DefaultWaitTimePredictor, PredictorConfig};

/// Monday morning, 09:00 UTC
pub fn start_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, 4, 9, 0, 0).unwrap()
}

/// A complete queue core driven by a manual clock and a recording sink
pub struct TestSystem {
    pub clock: Arc<ManualClock>,
    pub store: QueueStore,
    pub sink: Arc<RecordingNotificationSink>,
    pub worker: Arc<ReconciliationWorker>,
}

impl TestSystem {
    /// Add an entry that arrives at the current clock time
    pub fn admit(&self, facility_id: &str, id: &str, urgency_level: UrgencyLevel) -> usize {
        self.store
            .add_entry(facility_id, new_entry(id, urgency_level, self.clock_now()))
            .unwrap()
            .position
    }

    pub fn clock_now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    pub fn advance_minutes(&self, minutes: i64) {
        self.clock.advance(chrono::Duration::minutes(minutes));
    }

    /// Entry IDs in position order
    pub fn order(&self, facility_id: &str) -> Vec<String> {
        self.store
            .snapshot(facility_id)
            .unwrap()
            .entries
            .into_iter()
            .map(|entry| entry.id)
            .collect()
    }
}

/// Worker settings that notify the first two positions only
pub fn position_only_config() -> WorkerConfig {
    WorkerConfig {
        notify_position_threshold: 2,
        notify_wait_threshold_minutes: 0,
        ..WorkerConfig::default()
    }
}

pub fn create_test_system() -> TestSystem {
    create_test_system_with(WorkerConfig::default(), Arc::new(StaticCapacityProvider::new()))
}

pub fn create_test_system_with(
    worker_config: WorkerConfig,
    capacity_provider: Arc<dyn CapacityProvider>,
) -> TestSystem {
    let clock = Arc::new(ManualClock::new(start_time()));
    let store = QueueStore::new(
        PriorityEngine::new(AgingConfig::default()).unwrap(),
        Arc::new(DefaultWaitTimePredictor::new(PredictorConfig::default()).unwrap()),
        capacity_provider,
        clock.clone(),
    );
    let sink = Arc::new(RecordingNotificationSink::new());
    let worker = Arc::new(
        ReconciliationWorker::new(store.clone(), sink.clone(), worker_config).unwrap(),
    );

    TestSystem {
        clock,
        store,
        sink,
        worker,
    }
}

pub fn new_entry(id: &str, urgency_level: UrgencyLevel, arrival_time: DateTime<Utc>) -> NewEntry {
    NewEntry {
        id: id.to_string(),
        name: format!("Patient {}", id),
        urgency_level,
        arrival_time,
    }
}

/// Active positions must be exactly 1..N in snapshot order
pub fn assert_contiguous(snapshot: &QueueSnapshot) {
    let positions: Vec<usize> = snapshot
        .entries
        .iter()
        .map(|entry| entry.current_position)
        .collect();
    let expected: Vec<usize> = (1..=snapshot.active_count).collect();
    assert_eq!(
        positions, expected,
        "positions in facility {} are not contiguous",
        snapshot.facility_id
    );
}
