//! Wait time estimation
//!
//! This module holds the stateless predictor used for every estimate the
//! queue hands out, plus tracking of the waits patients actually experienced.

pub mod predictor;
pub mod statistics;

// Re-export commonly used types
pub use predictor::{
    DefaultWaitTimePredictor, Prediction, PredictionInput, PredictorConfig, WaitTimePredictor,
};
pub use statistics::{InMemoryStatisticsTracker, StatisticsTracker, StatsKey, WaitTimeStats};
