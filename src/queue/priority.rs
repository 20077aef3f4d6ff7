//! Ordering and priority aging for facility queues
//!
//! Active entries are ordered by descending priority score with ties broken
//! by arrival time. Waiting NORMAL and LOW entries slowly gain priority so
//! they cannot starve behind a steady stream of more urgent arrivals, but
//! never enough to overtake the next urgency tier's baseline.

use crate::error::{QueueError, Result};
use crate::types::{EntryStatus, PositionChange, QueueEntry, UrgencyLevel};
use crate::utils::minutes_between;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// Configuration for priority aging
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgingConfig {
    /// Score added per boost
    pub boost_step: f64,
    /// Minimum minutes between two boosts of the same entry
    pub boost_window_minutes: i64,
    /// NORMAL entries start aging after waiting longer than this
    pub normal_threshold_minutes: i64,
    /// LOW entries start aging after waiting longer than this
    pub low_threshold_minutes: i64,
}

impl Default for AgingConfig {
    fn default() -> Self {
        Self {
            boost_step: 5.0,
            boost_window_minutes: 15,
            normal_threshold_minutes: 30,
            low_threshold_minutes: 45,
        }
    }
}

impl AgingConfig {
    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        if self.boost_step.is_nan() || self.boost_step <= 0.0 {
            return Err(QueueError::Configuration {
                message: "boost_step must be positive".to_string(),
            }
            .into());
        }

        if self.boost_window_minutes <= 0 {
            return Err(QueueError::Configuration {
                message: "boost_window_minutes must be positive".to_string(),
            }
            .into());
        }

        if self.normal_threshold_minutes < 0 || self.low_threshold_minutes < 0 {
            return Err(QueueError::Configuration {
                message: "aging thresholds must be non-negative".to_string(),
            }
            .into());
        }

        Ok(())
    }
}

/// Computes ordering and applies time-based priority aging
#[derive(Debug, Clone)]
pub struct PriorityEngine {
    config: AgingConfig,
}

impl PriorityEngine {
    pub fn new(config: AgingConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &AgingConfig {
        &self.config
    }

    /// Starting score for a new entry
    pub fn baseline(urgency_level: UrgencyLevel) -> f64 {
        urgency_level.baseline_score()
    }

    /// Highest score aging may reach: one below the next tier's baseline.
    /// HIGH and EMERGENCY are not aged.
    pub fn aging_cap(urgency_level: UrgencyLevel) -> Option<f64> {
        match urgency_level {
            UrgencyLevel::Low | UrgencyLevel::Normal => urgency_level
                .next_tier()
                .map(|tier| tier.baseline_score() - 1.0),
            UrgencyLevel::High | UrgencyLevel::Emergency => None,
        }
    }

    fn aging_threshold(&self, urgency_level: UrgencyLevel) -> Option<i64> {
        match urgency_level {
            UrgencyLevel::Normal => Some(self.config.normal_threshold_minutes),
            UrgencyLevel::Low => Some(self.config.low_threshold_minutes),
            UrgencyLevel::High | UrgencyLevel::Emergency => None,
        }
    }

    /// Position order: higher score first, then earlier arrival
    pub fn compare(a: &QueueEntry, b: &QueueEntry) -> Ordering {
        b.priority_score
            .total_cmp(&a.priority_score)
            .then_with(|| a.arrival_time.cmp(&b.arrival_time))
    }

    /// Boost a single entry if it qualifies; returns whether the score moved
    pub fn apply_aging(&self, entry: &mut QueueEntry, now: DateTime<Utc>) -> bool {
        if entry.status != EntryStatus::Waiting {
            return false;
        }

        let (Some(threshold), Some(cap)) = (
            self.aging_threshold(entry.urgency_level),
            Self::aging_cap(entry.urgency_level),
        ) else {
            return false;
        };

        if minutes_between(entry.arrival_time, now) <= threshold {
            return false;
        }

        if let Some(last_boost) = entry.last_boost_at {
            if minutes_between(last_boost, now) < self.config.boost_window_minutes {
                return false;
            }
        }

        if entry.priority_score >= cap {
            return false;
        }

        entry.priority_score = (entry.priority_score + self.config.boost_step).min(cap);
        entry.last_boost_at = Some(now);
        true
    }

    /// Assign positions 1..N to active entries and 0 to everything else.
    ///
    /// `entries` is expected in insertion order; the sort is stable so fully
    /// tied entries keep that order. Returns every entry whose position moved.
    pub fn reorder(entries: &mut [QueueEntry]) -> Vec<PositionChange> {
        let mut active: Vec<usize> = entries
            .iter()
            .enumerate()
            .filter(|(_, entry)| entry.is_active())
            .map(|(index, _)| index)
            .collect();
        active.sort_by(|&a, &b| Self::compare(&entries[a], &entries[b]));

        let mut changes = Vec::new();
        let mut assign = |entry: &mut QueueEntry, position: usize| {
            if entry.current_position != position {
                changes.push(PositionChange {
                    entry_id: entry.id.clone(),
                    old_position: entry.current_position,
                    new_position: position,
                });
                entry.current_position = position;
            }
        };

        for (rank, &index) in active.iter().enumerate() {
            assign(&mut entries[index], rank + 1);
        }
        for entry in entries.iter_mut().filter(|entry| !entry.is_active()) {
            assign(entry, 0);
        }

        changes
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use proptest::prelude::*;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 8, 0, 0).unwrap()
    }

    fn entry(id: &str, urgency_level: UrgencyLevel, arrived_minutes: i64) -> QueueEntry {
        QueueEntry {
            id: id.to_string(),
            name: format!("Patient {}", id),
            urgency_level,
            arrival_time: t0() + Duration::minutes(arrived_minutes),
            status: EntryStatus::Waiting,
            priority_score: urgency_level.baseline_score(),
            current_position: 0,
            estimated_wait_minutes: 0,
            last_boost_at: None,
            last_notified_at: None,
            status_changed_at: t0(),
        }
    }

    fn engine() -> PriorityEngine {
        PriorityEngine::new(AgingConfig::default()).unwrap()
    }

    #[test]
    fn test_aging_config_validation() {
        assert!(AgingConfig::default().validate().is_ok());

        let mut config = AgingConfig::default();
        config.boost_step = 0.0;
        assert!(config.validate().is_err());

        config = AgingConfig::default();
        config.boost_window_minutes = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_aging_caps() {
        assert_eq!(PriorityEngine::aging_cap(UrgencyLevel::Low), Some(39.0));
        assert_eq!(PriorityEngine::aging_cap(UrgencyLevel::Normal), Some(69.0));
        assert_eq!(PriorityEngine::aging_cap(UrgencyLevel::High), None);
        assert_eq!(PriorityEngine::aging_cap(UrgencyLevel::Emergency), None);
    }

    #[test]
    fn test_reorder_by_score_then_arrival() {
        let mut entries = vec![
            entry("low", UrgencyLevel::Low, 0),
            entry("high", UrgencyLevel::High, 1),
            entry("normal-late", UrgencyLevel::Normal, 5),
            entry("normal-early", UrgencyLevel::Normal, 2),
        ];
        entries[3].status = EntryStatus::Ready;

        let changes = PriorityEngine::reorder(&mut entries);
        assert_eq!(changes.len(), 4);

        let positions: Vec<_> = entries
            .iter()
            .map(|e| (e.id.as_str(), e.current_position))
            .collect();
        assert_eq!(
            positions,
            vec![
                ("low", 4),
                ("high", 1),
                ("normal-late", 3),
                ("normal-early", 2)
            ]
        );
    }

    #[test]
    fn test_reorder_excludes_inactive_and_is_idempotent() {
        let mut entries = vec![
            entry("a", UrgencyLevel::Normal, 0),
            entry("b", UrgencyLevel::Normal, 1),
        ];
        PriorityEngine::reorder(&mut entries);
        entries[0].status = EntryStatus::InProgress;

        let changes = PriorityEngine::reorder(&mut entries);
        assert_eq!(entries[0].current_position, 0);
        assert_eq!(entries[1].current_position, 1);
        assert_eq!(changes.len(), 2);

        assert!(PriorityEngine::reorder(&mut entries).is_empty());
    }

    #[test]
    fn test_normal_entry_boosted_once_per_window() {
        let engine = engine();
        let mut normal = entry("n", UrgencyLevel::Normal, 0);

        // Not yet past the threshold
        assert!(!engine.apply_aging(&mut normal, t0() + Duration::minutes(30)));
        assert_eq!(normal.priority_score, 40.0);

        let first = t0() + Duration::minutes(35);
        assert!(engine.apply_aging(&mut normal, first));
        assert_eq!(normal.priority_score, 45.0);
        assert_eq!(normal.last_boost_at, Some(first));

        assert!(!engine.apply_aging(&mut normal, first + Duration::minutes(14)));
        assert_eq!(normal.priority_score, 45.0);

        assert!(engine.apply_aging(&mut normal, first + Duration::minutes(15)));
        assert_eq!(normal.priority_score, 50.0);
    }

    #[test]
    fn test_low_entry_capped_below_normal() {
        let engine = engine();
        let mut low = entry("l", UrgencyLevel::Low, 0);

        let mut now = t0() + Duration::minutes(46);
        for _ in 0..20 {
            engine.apply_aging(&mut low, now);
            now += Duration::minutes(15);
        }
        assert_eq!(low.priority_score, 39.0);
        assert!(low.priority_score < UrgencyLevel::Normal.baseline_score());
    }

    #[test]
    fn test_high_ready_and_emergency_not_aged() {
        let engine = engine();
        let later = t0() + Duration::hours(3);

        let mut high = entry("h", UrgencyLevel::High, 0);
        let mut emergency = entry("e", UrgencyLevel::Emergency, 0);
        let mut ready = entry("r", UrgencyLevel::Normal, 0);
        ready.status = EntryStatus::Ready;

        assert!(!engine.apply_aging(&mut high, later));
        assert!(!engine.apply_aging(&mut emergency, later));
        assert!(!engine.apply_aging(&mut ready, later));
        assert_eq!(high.priority_score, 70.0);
        assert_eq!(ready.priority_score, 40.0);
    }

    fn urgency_strategy() -> impl Strategy<Value = UrgencyLevel> {
        prop::sample::select(UrgencyLevel::ALL.to_vec())
    }

    proptest! {
        #[test]
        fn prop_aging_never_lowers_score(
            urgency_level in urgency_strategy(),
            steps in prop::collection::vec(0i64..40, 1..30),
        ) {
            let engine = engine();
            let mut waiting = entry("w", urgency_level, 0);
            let cap = PriorityEngine::aging_cap(urgency_level)
                .unwrap_or_else(|| urgency_level.baseline_score());

            let mut now = t0();
            let mut previous = waiting.priority_score;
            for step in steps {
                now += Duration::minutes(step);
                engine.apply_aging(&mut waiting, now);

                prop_assert!(waiting.priority_score >= previous);
                prop_assert!(waiting.priority_score <= cap);
                previous = waiting.priority_score;
            }
        }
    }
}
