//! Facility registry and the public queue operations
//!
//! [`QueueStore`] owns one [`FacilityQueue`] per facility behind its own
//! lock. All mutations of a facility, including aging and reordering, run
//! while holding that facility's write lock, so readers never observe a
//! half-applied change. Different facilities never contend with each other
//! beyond the short registry lookup.

use crate::error::{QueueError, Result};
use crate::metrics::MetricsCollector;
use crate::queue::capacity::CapacityProvider;
use crate::queue::facility::{FacilityQueue, NearTurnPolicy, PredictionContext};
use crate::queue::priority::PriorityEngine;
use crate::types::{
    AddedEntry, EntryId, EntryStatus, FacilityId, NewEntry, NotificationEvent, PositionChange,
    QueueEntry, QueueSnapshot, UrgencyLevel,
};
use crate::utils::Clock;
use crate::wait_time::predictor::{Prediction, WaitTimePredictor};
use crate::wait_time::statistics::{
    InMemoryStatisticsTracker, StatisticsTracker, StatsKey, WaitTimeStats,
};
use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use tracing::{debug, info, warn};

type SharedFacility = Arc<RwLock<FacilityQueue>>;

/// Owns every facility queue and exposes the operations callers use
#[derive(Clone)]
pub struct QueueStore {
    /// Facility queues by ID, created on first add
    facilities: Arc<RwLock<HashMap<FacilityId, SharedFacility>>>,
    /// Ordering and aging rules
    engine: PriorityEngine,
    /// Source of every wait estimate
    predictor: Arc<dyn WaitTimePredictor>,
    /// Per-facility staffing figures
    capacity_provider: Arc<dyn CapacityProvider>,
    clock: Arc<dyn Clock>,
    /// Observed waits, fed when entries are called in
    statistics: Arc<dyn StatisticsTracker>,
    metrics_collector: Option<Arc<MetricsCollector>>,
}

impl QueueStore {
    /// Create a store with in-memory statistics and no metrics
    pub fn new(
        engine: PriorityEngine,
        predictor: Arc<dyn WaitTimePredictor>,
        capacity_provider: Arc<dyn CapacityProvider>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            facilities: Arc::new(RwLock::new(HashMap::new())),
            engine,
            predictor,
            capacity_provider,
            clock,
            statistics: Arc::new(InMemoryStatisticsTracker::default()),
            metrics_collector: None,
        }
    }

    /// Record queue activity into the given collector
    pub fn with_metrics(mut self, metrics_collector: Arc<MetricsCollector>) -> Self {
        self.metrics_collector = Some(metrics_collector);
        self
    }

    /// Use a custom tracker for observed waits
    pub fn with_statistics(mut self, statistics: Arc<dyn StatisticsTracker>) -> Self {
        self.statistics = statistics;
        self
    }

    pub fn clock(&self) -> Arc<dyn Clock> {
        self.clock.clone()
    }

    pub fn engine(&self) -> &PriorityEngine {
        &self.engine
    }

    /// Add a patient to a facility queue, creating the facility on first use
    pub fn add_entry(&self, facility_id: &str, new_entry: NewEntry) -> Result<AddedEntry> {
        let now = self.clock.now();
        validate_new_entry(facility_id, &new_entry, now)?;
        let context = self.prediction_context(facility_id, now)?;

        let facility = self.facility_or_create(facility_id)?;
        let (entry, estimate, active_count) = {
            let mut queue = facility
                .write()
                .map_err(|_| QueueError::lock_poisoned("facility"))?;

            queue.insert(new_entry.clone(), now)?;
            queue.reorder();
            let predictions = queue.refresh_estimates(self.predictor.as_ref(), &context);

            let entry = queue.get(&new_entry.id).cloned().ok_or_else(|| {
                QueueError::Internal {
                    message: format!("entry {} vanished after insert", new_entry.id),
                }
            })?;
            let estimate = predictions
                .into_iter()
                .find(|(id, _)| *id == entry.id)
                .map(|(_, prediction)| prediction)
                .ok_or_else(|| QueueError::Internal {
                    message: format!("no estimate produced for entry {}", entry.id),
                })?;

            (entry, estimate, queue.active_count())
        };

        if let Some(metrics) = &self.metrics_collector {
            metrics.record_entry_added(entry.urgency_level);
            metrics.set_active_entries(facility_id, active_count);
            metrics.record_prediction(estimate.estimated_wait_minutes);
        }

        info!(
            "Added {} entry {} to facility {} at position {} (~{} min)",
            entry.urgency_level,
            entry.id,
            facility_id,
            entry.current_position,
            estimate.estimated_wait_minutes
        );

        Ok(AddedEntry {
            position: entry.current_position,
            entry,
            estimate,
        })
    }

    /// Move an entry to a new status and reorder the facility
    pub fn update_status(&self, facility_id: &str, entry_id: &str, status: EntryStatus) -> Result<()> {
        let facility = self
            .facility(facility_id)?
            .ok_or_else(|| entry_not_found(facility_id, entry_id))?;
        let now = self.clock.now();
        let context = self.prediction_context(facility_id, now)?;

        let (change, active_count) = {
            let mut queue = facility
                .write()
                .map_err(|_| QueueError::lock_poisoned("facility"))?;

            let change = queue.set_status(entry_id, status, now)?;
            if change.is_some() {
                queue.reorder();
                queue.refresh_estimates(self.predictor.as_ref(), &context);
            }
            (change, queue.active_count())
        };

        let Some(change) = change else {
            debug!(
                "Entry {} in facility {} already {}",
                entry_id, facility_id, status
            );
            return Ok(());
        };

        if change.current == EntryStatus::InProgress && change.previous.is_active() {
            let key = StatsKey::new(facility_id, change.urgency_level);
            if let Err(e) = self
                .statistics
                .record_wait(key, change.waited_minutes as f64, now)
            {
                warn!("Failed to record wait for entry {}: {}", entry_id, e);
            }
        }

        if let Some(metrics) = &self.metrics_collector {
            metrics.record_status_transition(change.current);
            metrics.set_active_entries(facility_id, active_count);
        }

        info!(
            "Entry {} in facility {} moved from {} to {}",
            entry_id, facility_id, change.previous, change.current
        );
        Ok(())
    }

    /// Delete an entry outright and reorder the facility
    pub fn remove_entry(&self, facility_id: &str, entry_id: &str) -> Result<QueueEntry> {
        let facility = self
            .facility(facility_id)?
            .ok_or_else(|| entry_not_found(facility_id, entry_id))?;
        let now = self.clock.now();
        let context = self.prediction_context(facility_id, now)?;

        let (removed, active_count) = {
            let mut queue = facility
                .write()
                .map_err(|_| QueueError::lock_poisoned("facility"))?;

            let removed = queue.remove(entry_id)?;
            queue.reorder();
            queue.refresh_estimates(self.predictor.as_ref(), &context);
            (removed, queue.active_count())
        };

        if let Some(metrics) = &self.metrics_collector {
            metrics.record_entry_removed();
            metrics.set_active_entries(facility_id, active_count);
        }

        info!("Removed entry {} from facility {}", entry_id, facility_id);
        Ok(removed)
    }

    /// Ordered view of the facility's active entries
    pub fn snapshot(&self, facility_id: &str) -> Result<QueueSnapshot> {
        let facility = self.existing_facility(facility_id)?;
        let queue = facility
            .read()
            .map_err(|_| QueueError::lock_poisoned("facility"))?;

        let entries = queue.active_entries();
        Ok(QueueSnapshot {
            facility_id: facility_id.to_string(),
            active_count: entries.len(),
            entries,
            taken_at: self.clock.now(),
        })
    }

    /// Look up any stored entry, including ones no longer in the ordering
    pub fn get_entry(&self, facility_id: &str, entry_id: &str) -> Result<QueueEntry> {
        let facility = self
            .facility(facility_id)?
            .ok_or_else(|| entry_not_found(facility_id, entry_id))?;
        let queue = facility
            .read()
            .map_err(|_| QueueError::lock_poisoned("facility"))?;

        queue
            .get(entry_id)
            .cloned()
            .ok_or_else(|| entry_not_found(facility_id, entry_id))
    }

    /// Apply aging to every waiting entry, then reorder. Returns the entries
    /// whose position moved.
    pub fn age_entries(&self, facility_id: &str) -> Result<Vec<PositionChange>> {
        let facility = self.existing_facility(facility_id)?;
        let now = self.clock.now();
        let context = self.prediction_context(facility_id, now)?;

        let (boosted, changes) = {
            let mut queue = facility
                .write()
                .map_err(|_| QueueError::lock_poisoned("facility"))?;

            let boosted = queue.age(&self.engine, now);
            let changes = queue.reorder();
            if boosted > 0 {
                queue.refresh_estimates(self.predictor.as_ref(), &context);
            }
            (boosted, changes)
        };

        if boosted > 0 {
            if let Some(metrics) = &self.metrics_collector {
                metrics.record_aging_boosts(boosted);
            }
            debug!(
                "Aged {} entries in facility {}, {} positions moved",
                boosted,
                facility_id,
                changes.len()
            );
        }

        Ok(changes)
    }

    /// Reassign positions from the current scores
    pub fn reorder(&self, facility_id: &str) -> Result<Vec<PositionChange>> {
        let facility = self.existing_facility(facility_id)?;
        let mut queue = facility
            .write()
            .map_err(|_| QueueError::lock_poisoned("facility"))?;

        Ok(queue.reorder())
    }

    /// Recompute the estimate of every active entry
    pub fn refresh_estimates(&self, facility_id: &str) -> Result<Vec<(EntryId, Prediction)>> {
        let facility = self.existing_facility(facility_id)?;
        let context = self.prediction_context(facility_id, self.clock.now())?;

        let (predictions, active_count) = {
            let mut queue = facility
                .write()
                .map_err(|_| QueueError::lock_poisoned("facility"))?;

            let predictions = queue.refresh_estimates(self.predictor.as_ref(), &context);
            (predictions, queue.active_count())
        };

        if let Some(metrics) = &self.metrics_collector {
            metrics.set_active_entries(facility_id, active_count);
            for (_, prediction) in &predictions {
                metrics.record_prediction(prediction.estimated_wait_minutes);
            }
        }

        Ok(predictions)
    }

    /// Notifications due for entries near their turn, as of now
    pub fn near_turn_candidates(
        &self,
        facility_id: &str,
        policy: &NearTurnPolicy,
    ) -> Result<Vec<NotificationEvent>> {
        let facility = self.existing_facility(facility_id)?;
        let queue = facility
            .read()
            .map_err(|_| QueueError::lock_poisoned("facility"))?;

        Ok(queue.near_turn_candidates(policy, self.clock.now()))
    }

    /// Record a delivered notification; false if the entry no longer exists
    pub fn mark_notified(&self, facility_id: &str, entry_id: &str, at: DateTime<Utc>) -> Result<bool> {
        let facility = self.existing_facility(facility_id)?;
        let mut queue = facility
            .write()
            .map_err(|_| QueueError::lock_poisoned("facility"))?;

        Ok(queue.mark_notified(entry_id, at))
    }

    /// Delete terminal entries whose status changed longer than `retention` ago
    pub fn purge_inactive(&self, facility_id: &str, retention: Duration) -> Result<usize> {
        let facility = self.existing_facility(facility_id)?;
        let now = self.clock.now();
        let purged = facility
            .write()
            .map_err(|_| QueueError::lock_poisoned("facility"))?
            .purge_inactive(retention, now);

        if purged > 0 {
            debug!(
                "Purged {} finished entries from facility {}",
                purged, facility_id
            );
        }
        Ok(purged)
    }

    /// Every facility seen so far, sorted
    pub fn facility_ids(&self) -> Result<Vec<FacilityId>> {
        let facilities = self
            .facilities
            .read()
            .map_err(|_| QueueError::lock_poisoned("facilities"))?;

        let mut ids: Vec<FacilityId> = facilities.keys().cloned().collect();
        ids.sort();
        Ok(ids)
    }

    /// Observed waits at a facility by urgency, most urgent first
    pub fn wait_statistics(&self, facility_id: &str) -> Result<Vec<(UrgencyLevel, WaitTimeStats)>> {
        self.statistics.facility_stats(facility_id)
    }

    fn facility(&self, facility_id: &str) -> Result<Option<SharedFacility>> {
        let facilities = self
            .facilities
            .read()
            .map_err(|_| QueueError::lock_poisoned("facilities"))?;

        Ok(facilities.get(facility_id).cloned())
    }

    fn existing_facility(&self, facility_id: &str) -> Result<SharedFacility> {
        self.facility(facility_id)?.ok_or_else(|| {
            QueueError::FacilityNotFound {
                facility_id: facility_id.to_string(),
            }
            .into()
        })
    }

    fn facility_or_create(&self, facility_id: &str) -> Result<SharedFacility> {
        if let Some(existing) = self.facility(facility_id)? {
            return Ok(existing);
        }

        let mut facilities = self
            .facilities
            .write()
            .map_err(|_| QueueError::lock_poisoned("facilities"))?;

        let facility = facilities
            .entry(facility_id.to_string())
            .or_insert_with(|| {
                info!("Creating queue for facility {}", facility_id);
                Arc::new(RwLock::new(FacilityQueue::new(facility_id)))
            })
            .clone();
        Ok(facility)
    }

    /// Capacity and local calendar for predictions; pulled before locking
    fn prediction_context(&self, facility_id: &str, now: DateTime<Utc>) -> Result<PredictionContext> {
        let capacity = self.capacity_provider.capacity_for(facility_id)?;
        let local_time = capacity.local_time(now);
        let is_holiday = self
            .capacity_provider
            .is_holiday(facility_id, local_time.date_naive());

        Ok(PredictionContext {
            capacity,
            local_time,
            is_holiday,
        })
    }
}

fn entry_not_found(facility_id: &str, entry_id: &str) -> anyhow::Error {
    QueueError::EntryNotFound {
        facility_id: facility_id.to_string(),
        entry_id: entry_id.to_string(),
    }
    .into()
}

fn validate_new_entry(facility_id: &str, entry: &NewEntry, now: DateTime<Utc>) -> Result<()> {
    if facility_id.trim().is_empty() {
        return Err(QueueError::validation("facility id is required").into());
    }
    if entry.id.trim().is_empty() {
        return Err(QueueError::validation("entry id is required").into());
    }
    if entry.name.trim().is_empty() {
        return Err(QueueError::validation("entry name is required").into());
    }
    if entry.arrival_time > now {
        return Err(QueueError::validation(format!(
            "arrival time {} is in the future",
            entry.arrival_time
        ))
        .into());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queue::capacity::StaticCapacityProvider;
    use crate::queue::priority::AgingConfig;
    use crate::utils::ManualClock;
    use crate::wait_time::predictor::{DefaultWaitTimePredictor, PredictorConfig};
    use chrono::TimeZone;
    use proptest::prelude::*;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 13, 0, 0).unwrap()
    }

    fn store_with_clock() -> (QueueStore, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(t0()));
        let store = QueueStore::new(
            PriorityEngine::new(AgingConfig::default()).unwrap(),
            Arc::new(DefaultWaitTimePredictor::new(PredictorConfig::default()).unwrap()),
            Arc::new(StaticCapacityProvider::new()),
            clock.clone(),
        );
        (store, clock)
    }

    fn new_entry(id: &str, urgency_level: UrgencyLevel, arrival_time: DateTime<Utc>) -> NewEntry {
        NewEntry {
            id: id.to_string(),
            name: format!("Patient {}", id),
            urgency_level,
            arrival_time,
        }
    }

    fn kind(err: &anyhow::Error) -> QueueError {
        QueueError::kind_of(err).cloned().expect("queue error")
    }

    #[test]
    fn test_emergency_into_empty_facility() {
        let (store, _) = store_with_clock();

        let added = store
            .add_entry("north", new_entry("e1", UrgencyLevel::Emergency, t0()))
            .unwrap();

        assert_eq!(added.position, 1);
        assert_eq!(added.entry.current_position, 1);
        assert!(added.entry.estimated_wait_minutes <= 5);
        assert_eq!(added.estimate.estimated_wait_minutes, added.entry.estimated_wait_minutes);
    }

    #[test]
    fn test_order_follows_urgency() {
        let (store, _) = store_with_clock();
        for (offset, (id, urgency)) in [
            ("low", UrgencyLevel::Low),
            ("high", UrgencyLevel::High),
            ("normal", UrgencyLevel::Normal),
        ]
        .into_iter()
        .enumerate()
        {
            let arrival = t0() - Duration::minutes(10 - offset as i64);
            store.add_entry("north", new_entry(id, urgency, arrival)).unwrap();
        }

        let snapshot = store.snapshot("north").unwrap();
        let order: Vec<_> = snapshot.entries.iter().map(|e| e.id.as_str()).collect();
        assert_eq!(order, vec!["high", "normal", "low"]);
        assert_eq!(snapshot.active_count, 3);
    }

    #[test]
    fn test_completed_entry_leaves_ordering() {
        let (store, _) = store_with_clock();
        store
            .add_entry("north", new_entry("a", UrgencyLevel::High, t0()))
            .unwrap();
        store
            .add_entry("north", new_entry("b", UrgencyLevel::Normal, t0()))
            .unwrap();

        store
            .update_status("north", "a", EntryStatus::Completed)
            .unwrap();

        let snapshot = store.snapshot("north").unwrap();
        assert_eq!(snapshot.active_count, 1);
        assert_eq!(snapshot.entries[0].id, "b");
        assert_eq!(snapshot.entries[0].current_position, 1);

        let completed = store.get_entry("north", "a").unwrap();
        assert_eq!(completed.current_position, 0);
        assert_eq!(completed.status, EntryStatus::Completed);
    }

    #[test]
    fn test_duplicate_add_leaves_queue_unchanged() {
        let (store, _) = store_with_clock();
        store
            .add_entry("north", new_entry("a", UrgencyLevel::Normal, t0()))
            .unwrap();
        let before = store.snapshot("north").unwrap().entries;

        let err = store
            .add_entry("north", new_entry("a", UrgencyLevel::Emergency, t0()))
            .unwrap_err();

        assert!(matches!(kind(&err), QueueError::DuplicateEntry { .. }));
        assert_eq!(store.snapshot("north").unwrap().entries, before);
    }

    #[test]
    fn test_validation_rejects_before_mutation() {
        let (store, _) = store_with_clock();

        let mut blank_name = new_entry("a", UrgencyLevel::Low, t0());
        blank_name.name = "  ".to_string();
        let err = store.add_entry("north", blank_name).unwrap_err();
        assert!(matches!(kind(&err), QueueError::Validation { .. }));

        let future = new_entry("b", UrgencyLevel::Low, t0() + Duration::minutes(1));
        assert!(store.add_entry("north", future).is_err());

        let err = store
            .add_entry("", new_entry("c", UrgencyLevel::Low, t0()))
            .unwrap_err();
        assert!(matches!(kind(&err), QueueError::Validation { .. }));

        assert!(store.facility_ids().unwrap().is_empty());
    }

    #[test]
    fn test_not_found_errors() {
        let (store, _) = store_with_clock();

        let err = store.snapshot("nowhere").unwrap_err();
        assert!(matches!(kind(&err), QueueError::FacilityNotFound { .. }));

        let err = store
            .update_status("nowhere", "a", EntryStatus::Ready)
            .unwrap_err();
        assert!(matches!(kind(&err), QueueError::EntryNotFound { .. }));

        store
            .add_entry("north", new_entry("a", UrgencyLevel::Low, t0()))
            .unwrap();
        let err = store.remove_entry("north", "zzz").unwrap_err();
        assert!(matches!(kind(&err), QueueError::EntryNotFound { .. }));
    }

    #[test]
    fn test_aging_moves_starving_entry() {
        let (store, clock) = store_with_clock();
        store
            .add_entry("north", new_entry("normal", UrgencyLevel::Normal, t0()))
            .unwrap();
        store
            .add_entry("north", new_entry("boosted", UrgencyLevel::Normal, t0()))
            .unwrap();

        // Later arrival at the same tier stays behind until aging
        clock.advance(Duration::minutes(20));
        store
            .add_entry("north", new_entry("late", UrgencyLevel::Normal, clock.now()))
            .unwrap();

        clock.advance(Duration::minutes(15));
        let changes = store.age_entries("north").unwrap();
        assert!(changes.is_empty());

        let normal = store.get_entry("north", "normal").unwrap();
        assert_eq!(normal.priority_score, 45.0);
        let late = store.get_entry("north", "late").unwrap();
        assert_eq!(late.priority_score, 40.0);

        // Second pass inside the window changes nothing
        clock.advance(Duration::minutes(5));
        store.age_entries("north").unwrap();
        assert_eq!(store.get_entry("north", "normal").unwrap().priority_score, 45.0);
    }

    #[test]
    fn test_in_progress_records_wait_statistics() {
        let (store, clock) = store_with_clock();
        store
            .add_entry("north", new_entry("a", UrgencyLevel::High, t0()))
            .unwrap();
        clock.advance(Duration::minutes(25));

        store
            .update_status("north", "a", EntryStatus::InProgress)
            .unwrap();

        let stats = store.wait_statistics("north").unwrap();
        assert_eq!(stats.len(), 1);
        assert_eq!(stats[0].0, UrgencyLevel::High);
        assert_eq!(stats[0].1.sample_count, 1);
        assert_eq!(stats[0].1.mean(), 25.0);
    }

    #[test]
    fn test_metrics_follow_mutations() {
        let (store, _) = store_with_clock();
        let metrics = Arc::new(MetricsCollector::new().unwrap());
        let store = store.with_metrics(metrics.clone());

        store
            .add_entry("north", new_entry("a", UrgencyLevel::Low, t0()))
            .unwrap();
        store
            .add_entry("north", new_entry("b", UrgencyLevel::Low, t0()))
            .unwrap();
        store.remove_entry("north", "a").unwrap();

        assert_eq!(
            metrics
                .queue()
                .entries_added_total
                .with_label_values(&["low"])
                .get(),
            2
        );
        assert_eq!(metrics.queue().entries_removed_total.get(), 1);
        assert_eq!(
            metrics
                .queue()
                .active_entries
                .with_label_values(&["north"])
                .get(),
            1
        );
    }

    #[test]
    fn test_facilities_are_independent() {
        let (store, _) = store_with_clock();
        store
            .add_entry("south", new_entry("a", UrgencyLevel::Low, t0()))
            .unwrap();
        store
            .add_entry("north", new_entry("a", UrgencyLevel::High, t0()))
            .unwrap();

        assert_eq!(store.facility_ids().unwrap(), vec!["north", "south"]);
        assert_eq!(
            store.get_entry("south", "a").unwrap().urgency_level,
            UrgencyLevel::Low
        );
    }

    #[derive(Debug, Clone)]
    enum Op {
        Add(UrgencyLevel, i64),
        Status(usize, EntryStatus),
        Remove(usize),
        Age(i64),
    }

    fn op_strategy() -> impl Strategy<Value = Op> {
        let urgency = prop::sample::select(UrgencyLevel::ALL.to_vec());
        let status = prop::sample::select(vec![
            EntryStatus::Waiting,
            EntryStatus::Ready,
            EntryStatus::InProgress,
            EntryStatus::Completed,
            EntryStatus::Cancelled,
        ]);
        prop_oneof![
            3 => (urgency, 0..120i64).prop_map(|(u, m)| Op::Add(u, m)),
            2 => (0..16usize, status).prop_map(|(i, s)| Op::Status(i, s)),
            1 => (0..16usize).prop_map(Op::Remove),
            2 => (1..40i64).prop_map(Op::Age),
        ]
    }

    proptest! {
        #[test]
        fn prop_positions_stay_contiguous(ops in prop::collection::vec(op_strategy(), 1..40)) {
            let (store, clock) = store_with_clock();
            let mut ids: Vec<String> = Vec::new();

            for op in ops {
                match op {
                    Op::Add(urgency, minutes_ago) => {
                        let id = format!("p{}", ids.len());
                        let arrival = clock.now() - Duration::minutes(minutes_ago);
                        store.add_entry("f", new_entry(&id, urgency, arrival)).unwrap();
                        ids.push(id);
                    }
                    Op::Status(index, status) => {
                        if let Some(id) = ids.get(index) {
                            let _ = store.update_status("f", id, status);
                        }
                    }
                    Op::Remove(index) => {
                        if let Some(id) = ids.get(index) {
                            let _ = store.remove_entry("f", id);
                        }
                    }
                    Op::Age(minutes) => {
                        clock.advance(Duration::minutes(minutes));
                        if let Ok(before) = store.snapshot("f") {
                            store.age_entries("f").unwrap();
                            for entry in before.entries.iter().filter(|e| e.status == EntryStatus::Waiting) {
                                let after = store.get_entry("f", &entry.id).unwrap();
                                prop_assert!(after.priority_score >= entry.priority_score);
                            }
                        }
                    }
                }

                if let Ok(snapshot) = store.snapshot("f") {
                    let positions: Vec<usize> =
                        snapshot.entries.iter().map(|e| e.current_position).collect();
                    let expected: Vec<usize> = (1..=snapshot.active_count).collect();
                    prop_assert_eq!(positions, expected);

                    for pair in snapshot.entries.windows(2) {
                        prop_assert!(
                            PriorityEngine::compare(&pair[0], &pair[1]) != std::cmp::Ordering::Greater
                        );
                    }
                }
                for id in &ids {
                    if let Ok(entry) = store.get_entry("f", id) {
                        if !entry.is_active() {
                            prop_assert_eq!(entry.current_position, 0);
                        }
                    }
                }
            }
        }
    }
}
