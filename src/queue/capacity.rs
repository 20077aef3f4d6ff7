//! Facility capacity and staffing source
//!
//! The predictor needs per-facility service time, staffing and capacity.
//! These are owned by an external collaborator; this module defines the
//! read-only interface the queue pulls them through, along with a static
//! implementation driven by configuration.

use crate::error::{QueueError, Result};
use crate::types::FacilityId;
use chrono::{DateTime, FixedOffset, NaiveDate, Offset, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

/// Staffing and throughput figures for one facility
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FacilityCapacity {
    /// Average minutes one patient occupies one staff member
    pub average_service_time_minutes: f64,
    /// Staff currently seeing patients
    pub staff_count: u32,
    /// Active entries the facility is sized for
    pub capacity: usize,
    /// Offset of the facility's local time from UTC, in minutes
    pub utc_offset_minutes: i32,
}

impl Default for FacilityCapacity {
    fn default() -> Self {
        Self {
            average_service_time_minutes: 15.0,
            staff_count: 3,
            capacity: 50,
            utc_offset_minutes: 0,
        }
    }
}

impl FacilityCapacity {
    pub fn validate(&self) -> Result<()> {
        if self.average_service_time_minutes.is_nan() || self.average_service_time_minutes < 0.0 {
            return Err(QueueError::Configuration {
                message: "average_service_time_minutes must be non-negative".to_string(),
            }
            .into());
        }

        if self.capacity == 0 {
            return Err(QueueError::Configuration {
                message: "capacity must be greater than 0".to_string(),
            }
            .into());
        }

        if self.utc_offset_minutes.abs() >= 24 * 60 {
            return Err(QueueError::Configuration {
                message: "utc_offset_minutes must be within one day".to_string(),
            }
            .into());
        }

        Ok(())
    }

    /// Ratio of active entries to capacity
    pub fn current_load(&self, active_count: usize) -> f64 {
        active_count as f64 / self.capacity.max(1) as f64
    }

    /// Convert an instant to the facility's local time
    pub fn local_time(&self, at: DateTime<Utc>) -> DateTime<FixedOffset> {
        let offset = FixedOffset::east_opt(self.utc_offset_minutes * 60).unwrap_or(Utc.fix());
        at.with_timezone(&offset)
    }
}

/// Trait for providing facility capacity figures
pub trait CapacityProvider: Send + Sync {
    /// Get the capacity figures for a facility
    fn capacity_for(&self, facility_id: &str) -> Result<FacilityCapacity>;

    /// Whether the given local date is a holiday at the facility
    fn is_holiday(&self, facility_id: &str, date: NaiveDate) -> bool;
}

/// Capacity provider backed by fixed configuration
#[derive(Debug, Clone, Default)]
pub struct StaticCapacityProvider {
    default_capacity: FacilityCapacity,
    overrides: HashMap<FacilityId, FacilityCapacity>,
    holidays: HashSet<NaiveDate>,
}

impl StaticCapacityProvider {
    /// Create a provider that answers every facility with the defaults
    pub fn new() -> Self {
        Self::default()
    }

    /// Create with custom default figures
    pub fn with_default(default_capacity: FacilityCapacity) -> Result<Self> {
        default_capacity.validate()?;
        Ok(Self {
            default_capacity,
            ..Self::default()
        })
    }

    /// Register figures for a specific facility
    pub fn with_override(
        mut self,
        facility_id: impl Into<FacilityId>,
        capacity: FacilityCapacity,
    ) -> Result<Self> {
        capacity.validate()?;
        self.overrides.insert(facility_id.into(), capacity);
        Ok(self)
    }

    /// Register holiday dates shared by all facilities
    pub fn with_holidays(mut self, holidays: impl IntoIterator<Item = NaiveDate>) -> Self {
        self.holidays.extend(holidays);
        self
    }
}

impl CapacityProvider for StaticCapacityProvider {
    fn capacity_for(&self, facility_id: &str) -> Result<FacilityCapacity> {
        Ok(self
            .overrides
            .get(facility_id)
            .unwrap_or(&self.default_capacity)
            .clone())
    }

    fn is_holiday(&self, _facility_id: &str, date: NaiveDate) -> bool {
        self.holidays.contains(&date)
    }
}
