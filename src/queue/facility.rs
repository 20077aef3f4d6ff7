//! Queue state for a single facility
//!
//! A [`FacilityQueue`] owns every entry of one facility. It is never shared
//! between facilities and is only touched while its owner holds the
//! facility lock, so each method may assume exclusive access.

use crate::error::{QueueError, Result};
use crate::queue::capacity::FacilityCapacity;
use crate::queue::priority::PriorityEngine;
use crate::types::{
    EntryId, EntryStatus, FacilityId, NewEntry, NotificationEvent, PositionChange, QueueEntry,
    UrgencyLevel,
};
use crate::utils::minutes_between;
use crate::wait_time::predictor::{Prediction, PredictionInput, WaitTimePredictor};
use chrono::{DateTime, Datelike, Duration, FixedOffset, Timelike, Utc};

/// When an entry counts as "near its turn" and how often it may be told so
#[derive(Debug, Clone, PartialEq)]
pub struct NearTurnPolicy {
    /// Entries at or above this position qualify
    pub position_threshold: usize,
    /// Entries expecting to wait at most this long qualify
    pub wait_threshold_minutes: u32,
    /// Minimum spacing between two notifications to the same entry
    pub renotify_interval: Duration,
}

/// Facility-wide inputs for one round of predictions
#[derive(Debug, Clone)]
pub struct PredictionContext {
    pub capacity: FacilityCapacity,
    pub local_time: DateTime<FixedOffset>,
    pub is_holiday: bool,
}

/// Outcome of a status update that actually changed something
#[derive(Debug, Clone, PartialEq)]
pub struct StatusChange {
    pub entry_id: EntryId,
    pub urgency_level: UrgencyLevel,
    pub previous: EntryStatus,
    pub current: EntryStatus,
    /// Minutes from arrival to the change
    pub waited_minutes: i64,
}

/// Ordered collection of entries for one facility
#[derive(Debug, Clone)]
pub struct FacilityQueue {
    facility_id: FacilityId,
    /// Insertion order; the reorder sort is stable over it
    entries: Vec<QueueEntry>,
}

impl FacilityQueue {
    pub fn new(facility_id: impl Into<FacilityId>) -> Self {
        Self {
            facility_id: facility_id.into(),
            entries: Vec::new(),
        }
    }

    pub fn facility_id(&self) -> &str {
        &self.facility_id
    }

    /// Number of stored entries, active or not
    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn active_count(&self) -> usize {
        self.entries.iter().filter(|entry| entry.is_active()).count()
    }

    pub fn get(&self, entry_id: &str) -> Option<&QueueEntry> {
        self.entries.iter().find(|entry| entry.id == entry_id)
    }

    fn index_of(&self, entry_id: &str) -> Result<usize> {
        self.entries
            .iter()
            .position(|entry| entry.id == entry_id)
            .ok_or_else(|| {
                QueueError::EntryNotFound {
                    facility_id: self.facility_id.clone(),
                    entry_id: entry_id.to_string(),
                }
                .into()
            })
    }

    /// Store a new WAITING entry at its urgency baseline. Positions are not
    /// assigned until the next reorder.
    pub fn insert(&mut self, new_entry: NewEntry, now: DateTime<Utc>) -> Result<()> {
        if self.get(&new_entry.id).is_some() {
            return Err(QueueError::DuplicateEntry {
                facility_id: self.facility_id.clone(),
                entry_id: new_entry.id,
            }
            .into());
        }

        self.entries.push(QueueEntry {
            id: new_entry.id,
            name: new_entry.name,
            urgency_level: new_entry.urgency_level,
            arrival_time: new_entry.arrival_time,
            status: EntryStatus::Waiting,
            priority_score: PriorityEngine::baseline(new_entry.urgency_level),
            current_position: 0,
            estimated_wait_minutes: 0,
            last_boost_at: None,
            last_notified_at: None,
            status_changed_at: now,
        });

        Ok(())
    }

    /// Apply a status transition. Returns `None` when the entry already had
    /// the requested status.
    pub fn set_status(
        &mut self,
        entry_id: &str,
        status: EntryStatus,
        now: DateTime<Utc>,
    ) -> Result<Option<StatusChange>> {
        let index = self.index_of(entry_id)?;
        let entry = &mut self.entries[index];
        let previous = entry.status;

        if previous == status {
            return Ok(None);
        }

        if !previous.can_transition_to(status) {
            return Err(QueueError::validation(format!(
                "cannot move entry {} from {} to {}",
                entry_id, previous, status
            ))
            .into());
        }

        entry.status = status;
        entry.status_changed_at = now;
        if !status.is_active() {
            entry.current_position = 0;
            entry.estimated_wait_minutes = 0;
        }

        Ok(Some(StatusChange {
            entry_id: entry.id.clone(),
            urgency_level: entry.urgency_level,
            previous,
            current: status,
            waited_minutes: minutes_between(entry.arrival_time, now),
        }))
    }

    /// Delete an entry from storage entirely
    pub fn remove(&mut self, entry_id: &str) -> Result<QueueEntry> {
        let index = self.index_of(entry_id)?;
        Ok(self.entries.remove(index))
    }

    pub fn reorder(&mut self) -> Vec<PositionChange> {
        PriorityEngine::reorder(&mut self.entries)
    }

    /// Age every waiting entry; returns how many were boosted
    pub fn age(&mut self, engine: &PriorityEngine, now: DateTime<Utc>) -> usize {
        self.entries
            .iter_mut()
            .map(|entry| engine.apply_aging(entry, now))
            .filter(|boosted| *boosted)
            .count()
    }

    /// Active entries, ordered by position
    pub fn active_entries(&self) -> Vec<QueueEntry> {
        let mut active: Vec<QueueEntry> = self
            .entries
            .iter()
            .filter(|entry| entry.is_active())
            .cloned()
            .collect();
        active.sort_by_key(|entry| entry.current_position);
        active
    }

    fn active_indices_by_position(&self) -> Vec<usize> {
        let mut indices: Vec<usize> = self
            .entries
            .iter()
            .enumerate()
            .filter(|(_, entry)| entry.is_active())
            .map(|(index, _)| index)
            .collect();
        indices.sort_by_key(|&index| self.entries[index].current_position);
        indices
    }

    /// Recompute every active entry's estimate. Expects positions to be
    /// current, i.e. a reorder has run since the last mutation.
    pub fn refresh_estimates(
        &mut self,
        predictor: &dyn WaitTimePredictor,
        context: &PredictionContext,
    ) -> Vec<(EntryId, Prediction)> {
        let order = self.active_indices_by_position();
        let current_load = context.capacity.current_load(order.len());

        let mut emergency_cases_ahead = 0;
        let mut predictions = Vec::with_capacity(order.len());

        for index in order {
            let entry = &mut self.entries[index];
            let input = PredictionInput {
                position: entry.current_position,
                urgency_level: entry.urgency_level,
                patient_count_ahead: entry.current_position.saturating_sub(1),
                current_load,
                average_service_time_minutes: context.capacity.average_service_time_minutes,
                staff_count: context.capacity.staff_count,
                time_of_day: context.local_time.hour(),
                day_of_week: context.local_time.weekday(),
                is_holiday: context.is_holiday,
                emergency_cases_ahead,
            };

            let prediction = predictor.predict(&input);
            entry.estimated_wait_minutes = prediction.estimated_wait_minutes;

            if entry.urgency_level == UrgencyLevel::Emergency {
                emergency_cases_ahead += 1;
            }
            predictions.push((entry.id.clone(), prediction));
        }

        predictions
    }

    /// Build notifications for active entries near their turn that have not
    /// been notified within the re-notify interval
    pub fn near_turn_candidates(
        &self,
        policy: &NearTurnPolicy,
        now: DateTime<Utc>,
    ) -> Vec<NotificationEvent> {
        self.active_indices_by_position()
            .into_iter()
            .map(|index| &self.entries[index])
            .filter(|entry| {
                entry.current_position <= policy.position_threshold
                    || entry.estimated_wait_minutes <= policy.wait_threshold_minutes
            })
            .filter(|entry| match entry.last_notified_at {
                Some(last) => now - last >= policy.renotify_interval,
                None => true,
            })
            .map(|entry| NotificationEvent {
                facility_id: self.facility_id.clone(),
                entry_id: entry.id.clone(),
                name: entry.name.clone(),
                position: entry.current_position,
                estimated_wait_minutes: entry.estimated_wait_minutes,
                message: near_turn_message(entry),
                created_at: now,
            })
            .collect()
    }

    /// Record a delivered notification. Returns false if the entry is gone.
    pub fn mark_notified(&mut self, entry_id: &str, at: DateTime<Utc>) -> bool {
        match self.entries.iter_mut().find(|entry| entry.id == entry_id) {
            Some(entry) => {
                entry.last_notified_at = Some(at);
                true
            }
            None => false,
        }
    }

    /// Delete COMPLETED and CANCELLED entries older than `retention`
    pub fn purge_inactive(&mut self, retention: Duration, now: DateTime<Utc>) -> usize {
        let before = self.entries.len();
        self.entries.retain(|entry| {
            !(entry.status.is_terminal() && now - entry.status_changed_at >= retention)
        });
        before - self.entries.len()
    }
}

fn near_turn_message(entry: &QueueEntry) -> String {
    if entry.current_position == 1 {
        format!("{}, you are next in line. Please be ready.", entry.name)
    } else {
        format!(
            "{}, you are number {} in line. Estimated wait: about {} minutes.",
            entry.name, entry.current_position, entry.estimated_wait_minutes
        )
    }
}
