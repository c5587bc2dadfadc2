//! Custom error types for precision-clicker.
//!
//! This module provides structured error types using `thiserror` for better
//! error handling and more informative error messages. Configuration and
//! scheduling errors are returned synchronously before a session starts;
//! per-click injection failures are accumulated into session statistics
//! instead (see `stats`) and surface through the final session snapshot
//! rather than as a returned error.

use std::io;
use std::time::Duration;
use thiserror::Error;

/// Main error type for precision-clicker operations.
#[derive(Error, Debug)]
pub enum ClickError {
    /// Click interval must be at least one millisecond.
    #[error("invalid interval {ms}ms: must be >= 1ms")]
    InvalidInterval { ms: i64 },

    /// Duration policy parameters are out of range.
    #[error("invalid duration policy: {reason}")]
    InvalidDurationPolicy { reason: String },

    /// Jitter parameters are out of range.
    #[error("invalid jitter configuration: {reason}")]
    InvalidJitter { reason: String },

    /// An operation was requested in a state that does not permit it.
    #[error("cannot {action} while {state}")]
    InvalidTransition { state: String, action: String },

    /// A scheduled start was requested for an instant that is not in the future.
    #[error("scheduled start is not in the future (lead time {lead:?})")]
    ScheduleNotInFuture { lead: Duration },

    /// The click-injection dependency reported a failure for one attempt.
    #[error("click injection failed: {reason}")]
    InjectionFailed { reason: String },

    /// The click-injection dependency did not return within the allowed budget.
    #[error("click injection timed out after {timeout:?}")]
    InjectionTimeout { timeout: Duration },

    /// Process was not found by name.
    #[error("process '{name}' not found")]
    ProcessNotFound { name: String },

    /// Error reading or parsing a profile file.
    #[error("failed to load profile from '{path}': {reason}")]
    ProfileLoad { path: String, reason: String },

    /// Error writing a profile file.
    #[error("failed to save profile to '{path}': {reason}")]
    ProfileSave { path: String, reason: String },

    /// Error parsing a duration string.
    #[error("invalid duration '{value}': {reason}")]
    InvalidDuration { value: String, reason: String },

    /// Error registering or handling the emergency hotkey.
    #[error("hotkey error: {0}")]
    Hotkey(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type alias for precision-clicker operations.
pub type Result<T> = std::result::Result<T, ClickError>;

impl ClickError {
    /// Create a new InvalidInterval error.
    pub fn invalid_interval(ms: i64) -> Self {
        Self::InvalidInterval { ms }
    }

    /// Create a new InvalidDurationPolicy error.
    pub fn invalid_duration_policy(reason: impl Into<String>) -> Self {
        Self::InvalidDurationPolicy {
            reason: reason.into(),
        }
    }

    /// Create a new InvalidJitter error.
    pub fn invalid_jitter(reason: impl Into<String>) -> Self {
        Self::InvalidJitter {
            reason: reason.into(),
        }
    }

    /// Create a new InvalidTransition error.
    pub fn invalid_transition(state: impl Into<String>, action: impl Into<String>) -> Self {
        Self::InvalidTransition {
            state: state.into(),
            action: action.into(),
        }
    }

    /// Create a new InjectionFailed error.
    pub fn injection_failed(reason: impl Into<String>) -> Self {
        Self::InjectionFailed {
            reason: reason.into(),
        }
    }

    /// Create a new ProcessNotFound error.
    pub fn process_not_found(name: impl Into<String>) -> Self {
        Self::ProcessNotFound { name: name.into() }
    }

    /// Create a new ProfileLoad error.
    pub fn profile_load(path: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::ProfileLoad {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// Create a new ProfileSave error.
    pub fn profile_save(path: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::ProfileSave {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// Create a new InvalidDuration error.
    pub fn invalid_duration(value: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidDuration {
            value: value.into(),
            reason: reason.into(),
        }
    }

    /// Create a new Hotkey error.
    pub fn hotkey(message: impl Into<String>) -> Self {
        Self::Hotkey(message.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = ClickError::invalid_interval(0);
        assert_eq!(err.to_string(), "invalid interval 0ms: must be >= 1ms");

        let err = ClickError::invalid_duration_policy("click count must be >= 1");
        assert_eq!(
            err.to_string(),
            "invalid duration policy: click count must be >= 1"
        );

        let err = ClickError::invalid_transition("Running", "start");
        assert_eq!(err.to_string(), "cannot start while Running");

        let err = ClickError::injection_failed("permission denied");
        assert_eq!(err.to_string(), "click injection failed: permission denied");
    }

    #[test]
    fn test_error_from_io() {
        let io_err = io::Error::new(io::ErrorKind::NotFound, "file not found");
        let click_err: ClickError = io_err.into();
        assert!(matches!(click_err, ClickError::Io(_)));
    }
}
