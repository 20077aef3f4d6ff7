//! Observed wait time statistics
//!
//! Actual waits are recorded when an entry is called in for treatment, so
//! operators can compare predictions against reality per facility and
//! urgency level. Nothing here feeds back into prediction.

use crate::error::{QueueError, Result};
use crate::types::{FacilityId, UrgencyLevel};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::RwLock;

/// Running statistics for one category of observed waits, in minutes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WaitTimeStats {
    pub sample_count: u64,
    mean_minutes: f64,
    /// Sum of squared deviations from the mean (Welford)
    m2: f64,
    pub min_minutes: f64,
    pub max_minutes: f64,
    pub last_updated: DateTime<Utc>,
}

impl WaitTimeStats {
    pub fn new(at: DateTime<Utc>) -> Self {
        Self {
            sample_count: 0,
            mean_minutes: 0.0,
            m2: 0.0,
            min_minutes: f64::INFINITY,
            max_minutes: 0.0,
            last_updated: at,
        }
    }

    /// Add a new sample
    pub fn add_sample(&mut self, minutes: f64, at: DateTime<Utc>) {
        let minutes = minutes.max(0.0);
        self.sample_count += 1;
        let delta = minutes - self.mean_minutes;
        self.mean_minutes += delta / self.sample_count as f64;
        self.m2 += delta * (minutes - self.mean_minutes);
        self.min_minutes = self.min_minutes.min(minutes);
        self.max_minutes = self.max_minutes.max(minutes);
        self.last_updated = at;
    }

    pub fn mean(&self) -> f64 {
        self.mean_minutes
    }

    /// Sample standard deviation; zero with fewer than two samples
    pub fn standard_deviation(&self) -> f64 {
        if self.sample_count < 2 {
            return 0.0;
        }
        (self.m2 / (self.sample_count - 1) as f64).max(0.0).sqrt()
    }

    pub fn min(&self) -> f64 {
        if self.sample_count == 0 {
            0.0
        } else {
            self.min_minutes
        }
    }

    pub fn max(&self) -> f64 {
        self.max_minutes
    }
}

/// Key for identifying different wait time categories
#[derive(Debug, Clone, Hash, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatsKey {
    pub facility_id: FacilityId,
    pub urgency_level: UrgencyLevel,
}

impl StatsKey {
    pub fn new(facility_id: impl Into<FacilityId>, urgency_level: UrgencyLevel) -> Self {
        Self {
            facility_id: facility_id.into(),
            urgency_level,
        }
    }
}

/// Trait for tracking observed wait statistics
pub trait StatisticsTracker: Send + Sync {
    /// Record an observed wait
    fn record_wait(&self, key: StatsKey, minutes: f64, at: DateTime<Utc>) -> Result<()>;

    /// Statistics for every urgency level seen at a facility
    fn facility_stats(&self, facility_id: &str) -> Result<Vec<(UrgencyLevel, WaitTimeStats)>>;
}

/// In-memory statistics tracker, bounded in the number of categories kept
#[derive(Debug)]
pub struct InMemoryStatisticsTracker {
    stats: RwLock<HashMap<StatsKey, WaitTimeStats>>,
    max_entries: usize,
}

impl InMemoryStatisticsTracker {
    pub fn new(max_entries: usize) -> Self {
        Self {
            stats: RwLock::new(HashMap::new()),
            max_entries: max_entries.max(1),
        }
    }

    /// Drop the least recently updated categories beyond `max_entries`
    fn evict_stale(stats: &mut HashMap<StatsKey, WaitTimeStats>, max_entries: usize) {
        if stats.len() <= max_entries {
            return;
        }

        let mut by_age: Vec<_> = stats
            .iter()
            .map(|(key, value)| (key.clone(), value.last_updated))
            .collect();
        by_age.sort_by_key(|(_, updated)| *updated);

        let excess = stats.len() - max_entries;
        for (key, _) in by_age.into_iter().take(excess) {
            stats.remove(&key);
        }
    }
}

impl Default for InMemoryStatisticsTracker {
    fn default() -> Self {
        Self::new(1000)
    }
}

impl StatisticsTracker for InMemoryStatisticsTracker {
    fn record_wait(&self, key: StatsKey, minutes: f64, at: DateTime<Utc>) -> Result<()> {
        let mut stats = self
            .stats
            .write()
            .map_err(|_| QueueError::lock_poisoned("statistics"))?;

        stats
            .entry(key)
            .or_insert_with(|| WaitTimeStats::new(at))
            .add_sample(minutes, at);
        Self::evict_stale(&mut stats, self.max_entries);

        Ok(())
    }

    fn facility_stats(&self, facility_id: &str) -> Result<Vec<(UrgencyLevel, WaitTimeStats)>> {
        let stats = self
            .stats
            .read()
            .map_err(|_| QueueError::lock_poisoned("statistics"))?;

        let mut found: Vec<_> = stats
            .iter()
            .filter(|(key, _)| key.facility_id == facility_id)
            .map(|(key, value)| (key.urgency_level, value.clone()))
            .collect();
        found.sort_by_key(|(urgency, _)| std::cmp::Reverse(*urgency));

        Ok(found)
    }
}
