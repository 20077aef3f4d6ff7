//! Wait time prediction from a queue snapshot
//!
//! Prediction is a pure function of its input and configuration: the same
//! [`PredictionInput`] always yields the same [`Prediction`], with no clock
//! or randomness involved.

use crate::error::{QueueError, Result};
use crate::types::UrgencyLevel;
use chrono::Weekday;
use serde::{Deserialize, Serialize};

const LOAD_CONFIDENCE_WEIGHT: f64 = 0.4;
const EMERGENCY_CONFIDENCE_WEIGHT: f64 = 0.1;

/// Hours of the day (start inclusive, end exclusive) with typically heavy intake
const PEAK_HOURS: [(u32, u32); 2] = [(8, 11), (17, 20)];

/// Configuration for wait time prediction
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PredictorConfig {
    /// How strongly facility load inflates the estimate
    pub load_factor: f64,
    /// Upper bound on an emergency entry's estimate, in minutes
    pub emergency_floor_minutes: f64,
    /// Multiplier applied to HIGH urgency estimates
    pub high_urgency_factor: f64,
    /// Fraction of the estimate used as the +/- range
    pub variance_fraction: f64,
    /// Load above which "High patient volume" is reported
    pub high_load_threshold: f64,
    /// Staff count below which "Limited staff availability" is reported
    pub limited_staff_threshold: u32,
}

impl Default for PredictorConfig {
    fn default() -> Self {
        Self {
            load_factor: 0.5,
            emergency_floor_minutes: 5.0,
            high_urgency_factor: 0.6,
            variance_fraction: 0.25,
            high_load_threshold: 0.8,
            limited_staff_threshold: 3,
        }
    }
}

impl PredictorConfig {
    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        if self.load_factor.is_nan() || self.load_factor < 0.0 {
            return Err(QueueError::Configuration {
                message: "load_factor must be non-negative".to_string(),
            }
            .into());
        }

        if self.emergency_floor_minutes.is_nan() || self.emergency_floor_minutes < 0.0 {
            return Err(QueueError::Configuration {
                message: "emergency_floor_minutes must be non-negative".to_string(),
            }
            .into());
        }

        if !(self.high_urgency_factor > 0.0 && self.high_urgency_factor <= 1.0) {
            return Err(QueueError::Configuration {
                message: "high_urgency_factor must be within (0, 1]".to_string(),
            }
            .into());
        }

        if !(0.0..=1.0).contains(&self.variance_fraction) {
            return Err(QueueError::Configuration {
                message: "variance_fraction must be within [0, 1]".to_string(),
            }
            .into());
        }

        if self.high_load_threshold.is_nan() || self.high_load_threshold < 0.0 {
            return Err(QueueError::Configuration {
                message: "high_load_threshold must be non-negative".to_string(),
            }
            .into());
        }

        Ok(())
    }
}

/// Everything the predictor needs to know about one entry's situation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionInput {
    pub position: usize,
    pub urgency_level: UrgencyLevel,
    pub patient_count_ahead: usize,
    /// Active entries divided by facility capacity; may exceed 1
    pub current_load: f64,
    pub average_service_time_minutes: f64,
    pub staff_count: u32,
    /// Hour of day, 0-23
    pub time_of_day: u32,
    pub day_of_week: Weekday,
    pub is_holiday: bool,
    pub emergency_cases_ahead: usize,
}

/// Estimated wait with its range, confidence and contributing factors
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Prediction {
    pub estimated_wait_minutes: u32,
    /// `estimate - variance`, floored to whole minutes
    pub min_wait_minutes: u32,
    /// `estimate + variance`, ceiled to whole minutes, so the range never
    /// undershoots the fractional one
    pub max_wait_minutes: u32,
    /// 1.0 is fully confident, 0.0 is a guess
    pub confidence_score: f64,
    pub factors: Vec<String>,
}

/// Trait for predicting wait times
pub trait WaitTimePredictor: Send + Sync {
    /// Predict the wait for a single entry
    fn predict(&self, input: &PredictionInput) -> Prediction;

    /// Get the current configuration
    fn config(&self) -> &PredictorConfig;
}

/// Load- and urgency-aware predictor
#[derive(Debug, Clone)]
pub struct DefaultWaitTimePredictor {
    config: PredictorConfig,
}

impl DefaultWaitTimePredictor {
    pub fn new(config: PredictorConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    /// Queue-only wait: entries ahead served in parallel by the available staff
    fn base_minutes(input: &PredictionInput) -> f64 {
        let staff = input.staff_count.max(1) as f64;
        input.position as f64 * input.average_service_time_minutes.max(0.0) / staff
    }

    fn confidence(load: f64, emergency_cases_ahead: usize) -> f64 {
        let penalty = LOAD_CONFIDENCE_WEIGHT * load
            + EMERGENCY_CONFIDENCE_WEIGHT * emergency_cases_ahead as f64;
        (1.0 - penalty.min(1.0)).clamp(0.0, 1.0)
    }

    fn factors(&self, input: &PredictionInput, load: f64) -> Vec<String> {
        let mut factors = Vec::new();

        if load > self.config.high_load_threshold {
            factors.push("High patient volume".to_string());
        }
        if input.emergency_cases_ahead > 0 {
            factors.push("Emergency cases ahead".to_string());
        }
        if input.staff_count < self.config.limited_staff_threshold {
            factors.push("Limited staff availability".to_string());
        }
        if PEAK_HOURS
            .iter()
            .any(|(start, end)| (*start..*end).contains(&input.time_of_day))
        {
            factors.push("Peak hours".to_string());
        }
        if matches!(input.day_of_week, Weekday::Sat | Weekday::Sun) {
            factors.push("Weekend schedule".to_string());
        }
        if input.is_holiday {
            factors.push("Holiday schedule".to_string());
        }

        factors
    }
}

impl WaitTimePredictor for DefaultWaitTimePredictor {
    fn predict(&self, input: &PredictionInput) -> Prediction {
        // f64::max discards NaN, so a malformed load degrades to "no load"
        let load = input.current_load.max(0.0);
        let base = Self::base_minutes(input);
        let load_multiplier = 1.0 + load * self.config.load_factor;

        let raw = match input.urgency_level {
            UrgencyLevel::Emergency => base.min(self.config.emergency_floor_minutes),
            UrgencyLevel::High => base * load_multiplier * self.config.high_urgency_factor,
            UrgencyLevel::Normal | UrgencyLevel::Low => base * load_multiplier,
        };

        let estimate = raw.round().max(0.0);
        let variance = estimate * self.config.variance_fraction;

        Prediction {
            estimated_wait_minutes: estimate as u32,
            min_wait_minutes: (estimate - variance).max(0.0).floor() as u32,
            max_wait_minutes: (estimate + variance).ceil() as u32,
            confidence_score: Self::confidence(load, input.emergency_cases_ahead),
            factors: self.factors(input, load),
        }
    }

    fn config(&self) -> &PredictorConfig {
        &self.config
    }
}
