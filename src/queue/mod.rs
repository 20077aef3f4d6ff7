//! Facility queues: storage, ordering, aging and capacity
//!
//! The [`QueueStore`] is the entry point for callers; it delegates ordering
//! and aging to the [`PriorityEngine`] and estimates to a wait time predictor.

pub mod capacity;
pub mod facility;
pub mod priority;
pub mod store;

// Re-export commonly used types
pub use capacity::{CapacityProvider, FacilityCapacity, StaticCapacityProvider};
pub use facility::{FacilityQueue, NearTurnPolicy, PredictionContext, StatusChange};
pub use priority::{AgingConfig, PriorityEngine};
pub use store::QueueStore;
