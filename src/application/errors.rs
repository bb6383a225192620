//! Application layer error types

use std::path::PathBuf;
use thiserror::Error;

use crate::domain::DomainError;
use crate::infrastructure::repository_source::RepositorySourceError;

/// Application-level errors
#[derive(Error, Debug)]
pub enum ApplicationError {
    #[error("Domain error: {0}")]
    Domain(#[from] DomainError),

    #[error("Repository source error: {0}")]
    Source(#[from] RepositorySourceError),

    #[error("Catalog directory not found: {}", path.display())]
    CatalogNotFound { path: PathBuf },

    #[error("Invalid catalog entry {}: {message}", path.display())]
    InvalidEntry { path: PathBuf, message: String },

    #[error("Configuration error: {message}")]
    Configuration { message: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

impl ApplicationError {
    /// Get the error type as a string for logs and reports
    pub fn error_type(&self) -> &'static str {
        match self {
            ApplicationError::Domain(_) => "domain_error",
            ApplicationError::Source(_) => "source_error",
            ApplicationError::CatalogNotFound { .. } => "catalog_not_found",
            ApplicationError::InvalidEntry { .. } => "invalid_entry",
            ApplicationError::Configuration { .. } => "configuration_error",
            ApplicationError::Io(_) => "io_error",
            ApplicationError::Json(_) => "json_error",
        }
    }
}
