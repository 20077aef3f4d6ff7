//! Service layer for the triage queue service
//!
//! This module contains the main application state, service coordination,
//! and background task management for the production service.

pub mod app;

pub use app::{AppState, ServiceError};
