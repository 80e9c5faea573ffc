//! Wire commands of the response stream.
//!
//! Every line of the stream is a JSON object `{"cmd": <int>, ...fields}`.
//! The integer tags are part of the wire format and never change.

use serde_json::{Map, Value};

use super::ProtocolError;

/// Name of the tag field of a command object.
pub const CMD_FIELD: &str = "cmd";

/// Command tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Cmd {
    /// The stream is complete.
    End = 0,
    /// Opens a `section` container.
    OpenSection = 1,
    /// Closes the innermost `section`.
    CloseSection = 2,
    /// Opens a `section-group` container.
    OpenSectionDetails = 3,
    /// Closes the innermost `section-group`.
    CloseSectionDetails = 4,
    /// Adds a `dump-block` leaf.
    AddDump = 5,
    /// Adds a `code-block` leaf.
    AddCodeBlock = 6,
    /// Adds a `halt` leaf.
    Halt = 7,
}

impl Cmd {
    /// All commands, ordered by tag.
    pub const ALL: [Self; 8] = [
        Self::End,
        Self::OpenSection,
        Self::CloseSection,
        Self::OpenSectionDetails,
        Self::CloseSectionDetails,
        Self::AddDump,
        Self::AddCodeBlock,
        Self::Halt,
    ];

    /// The wire tag.
    #[must_use]
    pub const fn code(self) -> u8 {
        self as u8
    }

    /// Resolves a wire tag.
    #[must_use]
    pub fn from_code(code: i64) -> Option<Self> {
        Self::ALL.into_iter().find(|cmd| i64::from(cmd.code()) == code)
    }
}

/// A decoded command: its tag plus every other field of the line.
#[derive(Debug, Clone, PartialEq)]
pub struct Command {
    /// The tag.
    pub cmd: Cmd,
    /// Remaining fields, copied onto the node the command creates.
    pub fields: Map<String, Value>,
}

impl Command {
    /// Creates a command without fields.
    #[must_use]
    pub fn new(cmd: Cmd) -> Self {
        Self {
            cmd,
            fields: Map::new(),
        }
    }

    /// Adds a field.
    #[must_use]
    pub fn field(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields.insert(name.into(), value.into());
        self
    }

    /// Decodes one stream line.
    ///
    /// # Errors
    ///
    /// Fails on malformed JSON, non-object payloads and missing or unknown
    /// tags.
    pub fn parse(line: &str) -> Result<Self, ProtocolError> {
        let value: Value =
            serde_json::from_str(line).map_err(|e| ProtocolError::MalformedJson(e.to_string()))?;
        Self::from_value(value)
    }

    /// Decodes an already parsed stream line.
    ///
    /// # Errors
    ///
    /// Fails on non-object payloads and missing or unknown tags.
    pub fn from_value(value: Value) -> Result<Self, ProtocolError> {
        let Value::Object(mut fields) = value else {
            return Err(ProtocolError::NotAnObject(value.to_string()));
        };
        let tag = fields.remove(CMD_FIELD).ok_or(ProtocolError::MissingCommand)?;
        let cmd = tag
            .as_i64()
            .and_then(Cmd::from_code)
            .ok_or_else(|| ProtocolError::UnknownCommand(tag.to_string()))?;
        Ok(Self { cmd, fields })
    }

    /// Encodes the command as a JSON object.
    #[must_use]
    pub fn to_value(&self) -> Value {
        let mut object = Map::with_capacity(self.fields.len() + 1);
        object.insert(CMD_FIELD.to_string(), Value::from(self.cmd.code()));
        object.extend(self.fields.iter().map(|(k, v)| (k.clone(), v.clone())));
        Value::Object(object)
    }

    /// Encodes the command as a newline-terminated stream line.
    #[must_use]
    pub fn to_line(&self) -> String {
        let mut line = self.to_value().to_string();
        line.push('\n');
        line
    }
}
