//! Unified error types for `StatusDesk`.
//!
//! Interactive operations surface these verbatim to the caller. Automated passes
//! only return an error when the store itself cannot be read; per-row failures are
//! logged and counted instead.

use thiserror::Error;

/// All errors produced by the crate.
#[derive(Debug, Error)]
pub enum Error {
    /// Bad input: missing title, end not after start, unknown status value.
    #[error("Validation error: {message}")]
    Validation {
        /// Human-readable description of the rejected input
        message: String,
    },

    /// Active-schedule exclusivity would be violated.
    #[error(
        "System {system_id} already has an active maintenance schedule '{title}' (id {schedule_id})"
    )]
    Conflict {
        /// System that already owns an active schedule
        system_id: i64,
        /// Identity of the conflicting schedule
        schedule_id: i64,
        /// Title of the conflicting schedule
        title: String,
    },

    /// A concurrent writer changed the row between read and conditional write.
    #[error("{entity} {id} was modified concurrently")]
    StaleWrite {
        /// Kind of record ("system", "schedule")
        entity: &'static str,
        /// Primary key of the record
        id: i64,
    },

    /// The referenced record never existed.
    #[error("{entity} {id} not found")]
    NotFound {
        /// Kind of record ("system", "schedule", "status log entry")
        entity: &'static str,
        /// Primary key that was looked up
        id: i64,
    },

    /// The endpoint string cannot be turned into a probe URL.
    #[error("Invalid endpoint '{endpoint}': {reason}")]
    InvalidEndpoint {
        /// Endpoint as given
        endpoint: String,
        /// Why it was rejected
        reason: String,
    },

    /// The task checking a system's endpoint ended without a result.
    #[error("Health check task for system {system_id} failed: {reason}")]
    CheckAborted {
        /// System whose check was lost
        system_id: i64,
        /// Panic or cancellation text from the runtime
        reason: String,
    },

    /// Configuration could not be loaded or parsed.
    #[error("Configuration error: {message}")]
    Config {
        /// Description of the failure
        message: String,
    },

    /// Store failure.
    #[error("Database error: {0}")]
    Database(#[from] sea_orm::DbErr),

    /// HTTP client construction failure.
    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),
}

impl Error {
    /// Shorthand for a [`Error::Validation`] with the given message.
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }
}

/// Convenience `Result` type
pub type Result<T> = std::result::Result<T, Error>;
