//! Error types for entitlements.
//!
//! Every failure the entitlement service can produce is a variant of
//! [`Error`]. Read paths recover from storage problems on their own, so in
//! practice callers see these from mutating operations, name lookups, and
//! configuration loading.

use std::path::PathBuf;
use thiserror::Error;

/// The main error type for entitlement operations.
#[derive(Error, Debug)]
pub enum Error {
    // === Storage Errors ===
    /// Failed to open or create the database.
    #[error("failed to open database at {path}: {source}")]
    DatabaseOpen {
        /// Path to the database file.
        path: PathBuf,
        /// The underlying error.
        #[source]
        source: rusqlite::Error,
    },

    /// A database query failed.
    #[error("database query failed: {0}")]
    DatabaseQuery(#[from] rusqlite::Error),

    /// Failed to run database migrations.
    #[error("database migration failed: {message}")]
    DatabaseMigration {
        /// Description of what went wrong.
        message: String,
    },

    /// The record store could not be written.
    #[error("failed to persist subscription for user '{user_id}': {message}")]
    Persist {
        /// User whose record was being written.
        user_id: String,
        /// Description of what went wrong.
        message: String,
    },

    // === Configuration Errors ===
    /// Failed to load configuration.
    #[error("failed to load configuration: {0}")]
    ConfigLoad(Box<figment::Error>),

    /// Configuration validation failed.
    #[error("invalid configuration: {message}")]
    ConfigValidation {
        /// Description of the validation failure.
        message: String,
    },

    // === Payment Provider Errors ===
    /// The payment provider rejected or failed the request.
    #[error("payment provider error: {message}")]
    Payment {
        /// Human-readable message from the provider.
        message: String,
    },

    /// An operation timed out.
    #[error("operation timed out: {operation}")]
    Timeout {
        /// Description of the operation that timed out.
        operation: String,
    },

    // === Subscription Errors ===
    /// A premium period would end past the last representable date.
    #[error("subscription period of {days} days runs past the supported date range")]
    PeriodOutOfRange {
        /// Requested period length in days.
        days: i64,
    },

    // === Lookup Errors ===
    /// A feature name outside the known vocabulary was requested.
    #[error("unknown feature: {name}")]
    UnknownFeature {
        /// The name that was requested.
        name: String,
    },

    /// A limit name outside the known vocabulary was requested.
    #[error("unknown limit: {name}")]
    UnknownLimit {
        /// The name that was requested.
        name: String,
    },

    /// A user identifier was empty or malformed.
    #[error("invalid user id: {0:?}")]
    InvalidUserId(String),

    // === I/O Errors ===
    /// File system operation failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Failed to create a required directory.
    #[error("failed to create directory {path}: {source}")]
    DirectoryCreate {
        /// Path that couldn't be created.
        path: PathBuf,
        /// The underlying error.
        #[source]
        source: std::io::Error,
    },

    // === Serialization Errors ===
    /// JSON serialization/deserialization failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    // === Generic Errors ===
    /// An internal error occurred (bug).
    #[error("internal error: {0}")]
    Internal(String),
}

/// A specialized Result type for entitlement operations.
pub type Result<T> = std::result::Result<T, Error>;

impl From<figment::Error> for Error {
    fn from(err: figment::Error) -> Self {
        Self::ConfigLoad(Box::new(err))
    }
}

impl Error {
    /// Create a new payment provider error.
    #[must_use]
    pub fn payment(message: impl Into<String>) -> Self {
        Self::Payment {
            message: message.into(),
        }
    }

    /// Create a new timeout error.
    #[must_use]
    pub fn timeout(operation: impl Into<String>) -> Self {
        Self::Timeout {
            operation: operation.into(),
        }
    }

    /// Create a new internal error.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    /// Create a persistence error for the given user.
    #[must_use]
    pub fn persist(user_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Persist {
            user_id: user_id.into(),
            message: message.into(),
        }
    }

    /// Check if retrying the same operation may succeed.
    ///
    /// Timeouts never change the stored record, so they are always safe to retry.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }

    /// Check if this error is an unknown feature or limit name.
    #[must_use]
    pub fn is_lookup_error(&self) -> bool {
        matches!(self, Self::UnknownFeature { .. } | Self::UnknownLimit { .. })
    }
}
