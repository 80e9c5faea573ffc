//! Incremental response trees.
//!
//! The backend streams a tree as newline-delimited JSON [`Command`]s.
//! [`LineFramer`] cuts the byte stream into lines and [`TreeBuilder`] folds
//! the commands into [`Node`]s, publishing a render projection after every
//! structural change.

mod builder;
mod command;
mod framing;
mod node;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use builder::{TreeBuilder, TreeSetter};
pub use command::{CMD_FIELD, Cmd, Command};
pub use framing::LineFramer;
pub use node::{CodeBlock, DumpBlock, Halt, Node, Section, SectionGroup};

/// Lifecycle of a [`TreeBuilder`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TreeState {
    /// Nothing requested yet.
    #[default]
    Waiting,
    /// Commands are being received.
    Streaming,
    /// The stream ended after an `END` command.
    Finished,
    /// The stream was aborted before its end.
    Canceled,
    /// The stream violated the protocol or could not be read.
    Errored,
}

impl TreeState {
    /// Whether no further transition happens without a reset.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Finished | Self::Canceled | Self::Errored)
    }
}

/// Protocol violations. Each one ends the current stream.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    /// The line is not valid JSON.
    #[error("malformed command line: {0}")]
    MalformedJson(String),

    /// The line is valid JSON but not an object.
    #[error("Expected object but got \"{0}\"")]
    NotAnObject(String),

    /// The object has no `cmd` field.
    #[error("command object has no \"cmd\" field")]
    MissingCommand,

    /// The `cmd` field is not a known tag.
    #[error("Unknown command \"{0}\" given!")]
    UnknownCommand(String),

    /// A close command does not match the innermost open container.
    #[error("Type mismatch while adding: expected \"{expected}\" but got \"{found}\"")]
    MismatchedClose {
        /// Type the close command closes.
        expected: &'static str,
        /// Type of the innermost open container.
        found: &'static str,
    },

    /// A close command arrived with no open container.
    #[error("Cannot close \"{0}\": no container is open")]
    UnbalancedClose(&'static str),

    /// The parent of a node cannot hold children.
    #[error("The parent node is of type \"{parent}\" and cannot have {child} as child")]
    NotAContainer {
        /// Type of the parent.
        parent: &'static str,
        /// Type of the rejected child.
        child: &'static str,
    },

    /// The command fields do not fit the node it creates.
    #[error("invalid \"{kind}\" payload: {message}")]
    InvalidPayload {
        /// Type of the node being created.
        kind: &'static str,
        /// Decoder message.
        message: String,
    },
}
