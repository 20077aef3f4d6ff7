//! Common types used throughout the triage queue service

use crate::wait_time::predictor::Prediction;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Unique identifier for a facility (hospital or clinic)
pub type FacilityId = String;

/// Unique identifier for a queue entry within a facility
pub type EntryId = String;

/// Coarse clinical priority assigned when an entry is created
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum UrgencyLevel {
    Low,
    Normal,
    High,
    Emergency,
}

impl UrgencyLevel {
    pub const ALL: [UrgencyLevel; 4] = [
        UrgencyLevel::Low,
        UrgencyLevel::Normal,
        UrgencyLevel::High,
        UrgencyLevel::Emergency,
    ];

    /// Starting priority score for a freshly added entry
    pub fn baseline_score(self) -> f64 {
        match self {
            UrgencyLevel::Emergency => 100.0,
            UrgencyLevel::High => 70.0,
            UrgencyLevel::Normal => 40.0,
            UrgencyLevel::Low => 10.0,
        }
    }

    /// The tier directly above this one, if any
    pub fn next_tier(self) -> Option<UrgencyLevel> {
        match self {
            UrgencyLevel::Low => Some(UrgencyLevel::Normal),
            UrgencyLevel::Normal => Some(UrgencyLevel::High),
            UrgencyLevel::High => Some(UrgencyLevel::Emergency),
            UrgencyLevel::Emergency => None,
        }
    }

    /// Lowercase label used in logs and metrics
    pub fn as_str(self) -> &'static str {
        match self {
            UrgencyLevel::Low => "low",
            UrgencyLevel::Normal => "normal",
            UrgencyLevel::High => "high",
            UrgencyLevel::Emergency => "emergency",
        }
    }
}

impl std::fmt::Display for UrgencyLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            UrgencyLevel::Low => write!(f, "LOW"),
            UrgencyLevel::Normal => write!(f, "NORMAL"),
            UrgencyLevel::High => write!(f, "HIGH"),
            UrgencyLevel::Emergency => write!(f, "EMERGENCY"),
        }
    }
}

/// Lifecycle status of a queue entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EntryStatus {
    Waiting,
    Ready,
    InProgress,
    Completed,
    Cancelled,
}

impl EntryStatus {
    /// Whether entries in this status take part in the ordering
    pub fn is_active(self) -> bool {
        matches!(self, EntryStatus::Waiting | EntryStatus::Ready)
    }

    /// Whether no further transitions are possible
    pub fn is_terminal(self) -> bool {
        matches!(self, EntryStatus::Completed | EntryStatus::Cancelled)
    }

    /// Check if moving from this status to `next` is allowed
    pub fn can_transition_to(self, next: EntryStatus) -> bool {
        use EntryStatus::*;
        match (self, next) {
            (current, next) if current == next => true,
            (Waiting, Ready | InProgress | Completed | Cancelled) => true,
            (Ready, Waiting | InProgress | Completed | Cancelled) => true,
            (InProgress, Completed | Cancelled) => true,
            _ => false,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            EntryStatus::Waiting => "waiting",
            EntryStatus::Ready => "ready",
            EntryStatus::InProgress => "in_progress",
            EntryStatus::Completed => "completed",
            EntryStatus::Cancelled => "cancelled",
        }
    }
}

impl std::fmt::Display for EntryStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single patient waiting (or formerly waiting) at a facility
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueueEntry {
    pub id: EntryId,
    pub name: String,
    pub urgency_level: UrgencyLevel,
    pub arrival_time: DateTime<Utc>,
    pub status: EntryStatus,
    /// Higher sorts first; never decreases while the entry is waiting
    pub priority_score: f64,
    /// 1-based position among active entries, 0 when not in the ordering
    pub current_position: usize,
    pub estimated_wait_minutes: u32,
    pub last_boost_at: Option<DateTime<Utc>>,
    pub last_notified_at: Option<DateTime<Utc>>,
    pub status_changed_at: DateTime<Utc>,
}

impl QueueEntry {
    pub fn is_active(&self) -> bool {
        self.status.is_active()
    }
}

/// Request to add a patient to a facility queue
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewEntry {
    pub id: EntryId,
    pub name: String,
    pub urgency_level: UrgencyLevel,
    pub arrival_time: DateTime<Utc>,
}

/// Result of adding an entry: the stored entry, its position and wait estimate
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AddedEntry {
    pub entry: QueueEntry,
    pub position: usize,
    pub estimate: Prediction,
}

/// Read-only ordered view of a facility's active entries
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueSnapshot {
    pub facility_id: FacilityId,
    /// Active entries sorted by position
    pub entries: Vec<QueueEntry>,
    pub active_count: usize,
    pub taken_at: DateTime<Utc>,
}

/// Position movement of a single entry after a reorder
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PositionChange {
    pub entry_id: EntryId,
    pub old_position: usize,
    pub new_position: usize,
}

/// Event handed to the notification sink when an entry nears its turn
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotificationEvent {
    pub facility_id: FacilityId,
    pub entry_id: EntryId,
    pub name: String,
    pub position: usize,
    pub estimated_wait_minutes: u32,
    pub message: String,
    pub created_at: DateTime<Utc>,
}
