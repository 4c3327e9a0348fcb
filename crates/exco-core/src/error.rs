//! # Domain Error Hierarchy
//!
//! One enum, one variant per failure class. Layers above (persistence,
//! engine) wrap or convert into these kinds at their boundary; the
//! transport layer maps them onto its own status codes.

use chrono::NaiveDate;
use thiserror::Error;

/// Domain-level error for the coordination core.
#[derive(Error, Debug)]
pub enum Error {
    /// The referenced entity does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// A field failed validation.
    #[error("invalid {field}: {message}")]
    InvalidInput {
        /// The offending field.
        field: String,
        /// What was wrong with it.
        message: String,
    },

    /// The requested lifecycle transition is not in the state machine.
    #[error("invalid transition from {from} to {to}")]
    InvalidTransition {
        /// Current state name.
        from: String,
        /// Attempted target state name.
        to: String,
    },

    /// A moratorium validity window exceeds the statutory maximum.
    #[error("moratorium duration exceeded: {valid_from}..{valid_to} is past the {max_valid_to} limit")]
    DurationExceeded {
        /// Start of the requested window.
        valid_from: NaiveDate,
        /// End of the requested window.
        valid_to: NaiveDate,
        /// Latest permitted end (start plus five years).
        max_valid_to: NaiveDate,
    },

    /// The actor's role or territory does not permit the operation.
    #[error("forbidden: {0}")]
    Forbidden(String),

    /// The spatial store failed while classifying conflicts.
    #[error("conflict detection failed: {0}")]
    ConflictDetection(String),

    /// Unexpected internal failure.
    #[error("internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Not-found error for an entity kind and id.
    pub fn not_found(entity: &str, id: impl std::fmt::Display) -> Self {
        Self::NotFound(format!("{entity} {id}"))
    }

    /// Field-level validation error.
    pub fn invalid_input(field: &str, message: impl Into<String>) -> Self {
        Self::InvalidInput {
            field: field.to_string(),
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_carries_context() {
        let err = Error::not_found("project", "42");
        assert_eq!(err.to_string(), "not found: project 42");

        let err = Error::invalid_input("name", "must not be empty");
        assert_eq!(err.to_string(), "invalid name: must not be empty");
    }

    #[test]
    fn transition_error_names_both_states() {
        let err = Error::InvalidTransition {
            from: "draft".into(),
            to: "completed".into(),
        };
        let msg = err.to_string();
        assert!(msg.contains("draft"));
        assert!(msg.contains("completed"));
    }

    #[test]
    fn duration_error_names_the_limit() {
        let d = |s: &str| NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap();
        let err = Error::DurationExceeded {
            valid_from: d("2024-01-01"),
            valid_to: d("2030-01-01"),
            max_valid_to: d("2029-01-01"),
        };
        assert!(err.to_string().contains("2029-01-01"));
    }
}
