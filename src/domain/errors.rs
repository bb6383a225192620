//! Domain-specific error types

use thiserror::Error;

/// Domain-level errors for catalog entries and repository identities
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DomainError {
    #[error("Invalid repository identity: {reason}")]
    InvalidIdentity { reason: String },

    #[error("Invalid date for field {field}: {value}")]
    InvalidDate { field: String, value: String },

    #[error("Invalid catalog entry {entry}: {message}")]
    InvalidEntry { entry: String, message: String },
}
