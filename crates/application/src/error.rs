//! Application error types

use apixt_domain::{DomainError, EntityError, ProtocolError};
use thiserror::Error;

/// Application-level errors.
#[derive(Debug, Error)]
pub enum ApplicationError {
    /// A domain validation error occurred.
    #[error("domain error: {0}")]
    Domain(#[from] DomainError),

    /// An HTTP request failed.
    #[error("HTTP error: {0}")]
    Http(String),

    /// The backend answered with a status outside the expected set.
    #[error("Unexpected HTTP response code {0} from API")]
    UnexpectedStatus(u16),

    /// A storage operation failed.
    #[error("storage error: {0}")]
    Storage(String),

    /// The requested resource was not found.
    #[error("not found: {0}")]
    NotFound(String),

    /// An internal error occurred.
    #[error("internal error: {0}")]
    Internal(String),

    /// The operation timed out.
    #[error("operation timed out")]
    Timeout,

    /// The operation was cancelled.
    #[error("operation cancelled")]
    Cancelled,
}

impl From<EntityError> for ApplicationError {
    fn from(error: EntityError) -> Self {
        Self::Domain(error.into())
    }
}

impl From<ProtocolError> for ApplicationError {
    fn from(error: ProtocolError) -> Self {
        Self::Domain(error.into())
    }
}

/// Result type alias for application operations.
pub type ApplicationResult<T> = Result<T, ApplicationError>;
