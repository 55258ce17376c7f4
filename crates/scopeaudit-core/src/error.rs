//! Error types for audit scopes and data providers

use crate::provider::EventReference;
use thiserror::Error;

/// Errors raised by a data provider implementation.
#[derive(Debug, Error)]
pub enum ProviderError {
    /// The reference passed to a replace is unknown to the store.
    #[error("Audit event not found: {0}")]
    NotFound(EventReference),

    /// Serialization of the event failed.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Any other storage backend failure.
    #[error("Backend error: {0}")]
    Backend(String),
}

/// Errors surfaced by the audit scope lifecycle.
#[derive(Debug, Error)]
pub enum AuditError {
    /// Missing or invalid data provider, policy or configuration value.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// An insert or replace against the data provider failed.
    #[error("Failed to persist audit event: {0}")]
    Persistence(#[source] ProviderError),

    /// A replace targeted a reference the provider does not know.
    #[error("Audit event not found: {0}")]
    NotFound(EventReference),
}

impl From<ProviderError> for AuditError {
    fn from(err: ProviderError) -> Self {
        match err {
            ProviderError::NotFound(reference) => AuditError::NotFound(reference),
            other => AuditError::Persistence(other),
        }
    }
}

/// Result type for provider operations.
pub type ProviderResult<T> = std::result::Result<T, ProviderError>;

/// Result type for audit scope operations.
pub type Result<T> = std::result::Result<T, AuditError>;
