//! Domain error types

use thiserror::Error;

use crate::entity::EntityError;
use crate::tree::ProtocolError;

/// Domain-level errors raised by entity indices and the stream protocol.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// An entity index rejected a mutation.
    #[error(transparent)]
    Entity(#[from] EntityError),

    /// A response stream violated the command protocol.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
}

/// Result type alias for domain operations.
pub type DomainResult<T> = Result<T, DomainError>;
