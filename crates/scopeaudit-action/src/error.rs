use scopeaudit_core::AuditError;
use thiserror::Error;

/// Errors raised by the action audit filter.
#[derive(Debug, Error)]
pub enum ActionAuditError {
    /// Error from the audit scope lifecycle.
    #[error(transparent)]
    Audit(#[from] AuditError),

    /// No scope is attached for the request.
    #[error("No audit scope attached for request: {0}")]
    ScopeNotFound(String),

    /// The action section could not be read or written.
    #[error("Action section serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type for action audit operations.
pub type Result<T> = std::result::Result<T, ActionAuditError>;
