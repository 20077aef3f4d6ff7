//! Error types for the triage queue service
//!
//! Domain failures are expressed as [`QueueError`] and carried through the
//! crate-wide anyhow `Result`, so callers can classify them with
//! `downcast_ref::<QueueError>()`.

/// Result type alias for convenience
pub type Result<T> = anyhow::Result<T>;

/// Custom error types for specific queueing scenarios
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum QueueError {
    #[error("Validation failed: {reason}")]
    Validation { reason: String },

    #[error("Entry {entry_id} not found in facility {facility_id}")]
    EntryNotFound {
        facility_id: String,
        entry_id: String,
    },

    #[error("Facility not found: {facility_id}")]
    FacilityNotFound { facility_id: String },

    #[error("Entry {entry_id} already exists in facility {facility_id}")]
    DuplicateEntry {
        facility_id: String,
        entry_id: String,
    },

    /// Reserved for optimistic updates; facility mutations are serialized today.
    #[error("Concurrent modification of facility {facility_id}")]
    ConcurrencyConflict { facility_id: String },

    #[error("Notification delivery failed: {message}")]
    Notifier { message: String },

    #[error("Configuration error: {message}")]
    Configuration { message: String },

    #[error("Internal service error: {message}")]
    Internal { message: String },
}

impl QueueError {
    /// Extract the queue error carried by an anyhow error, if any
    pub fn kind_of(error: &anyhow::Error) -> Option<&QueueError> {
        error.downcast_ref::<QueueError>()
    }

    pub(crate) fn validation(reason: impl Into<String>) -> Self {
        QueueError::Validation {
            reason: reason.into(),
        }
    }

    pub(crate) fn lock_poisoned(what: &str) -> Self {
        QueueError::Internal {
            message: format!("Failed to acquire {} lock", what),
        }
    }
}
