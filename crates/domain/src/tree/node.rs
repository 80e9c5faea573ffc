//! Nodes of the response tree.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A titled container.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Section {
    /// Title.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Children in stream order.
    #[serde(default)]
    pub nodes: Vec<Node>,
    /// Fields not interpreted by the builder.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// A container grouping the details of a section.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SectionGroup {
    /// Children in stream order.
    #[serde(default)]
    pub nodes: Vec<Node>,
    /// Fields not interpreted by the builder.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Rendered source, a request or response body for instance.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CodeBlock {
    /// Title.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Pre-rendered markup.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub html: Option<String>,
    /// Raw text.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    /// Media type of the content.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mime: Option<String>,
    /// Trailing annotation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub footer: Option<Value>,
    /// Whether the block reports a failure.
    #[serde(default, rename = "isError", skip_serializing_if = "std::ops::Not::not")]
    pub is_error: bool,
    /// Fields not interpreted by the builder.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl CodeBlock {
    /// The displayable text: markup if present, raw content otherwise.
    #[must_use]
    pub fn text(&self) -> Option<&str> {
        self.html.as_deref().or(self.content.as_deref())
    }
}

/// A dump of variables.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DumpBlock {
    /// Title.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Dumped values.
    #[serde(default)]
    pub vars: Vec<Value>,
    /// Fields not interpreted by the builder.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// A breakpoint reported by the backend.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Halt {
    /// Continuation handle, absent when the halt is final.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next: Option<Value>,
    /// Fields not interpreted by the builder.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// A node of the response tree, tagged by `type` when serialized.
///
/// `Root`, `Status`, `Error` and `Loading` only appear in render
/// projections; the builder never stores them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum Node {
    /// The projection root.
    Root {
        /// Top-level nodes.
        nodes: Vec<Node>,
    },
    /// See [`Section`].
    Section(Section),
    /// See [`SectionGroup`].
    SectionGroup(SectionGroup),
    /// See [`CodeBlock`].
    CodeBlock(CodeBlock),
    /// See [`DumpBlock`].
    DumpBlock(DumpBlock),
    /// See [`Halt`].
    Halt(Halt),
    /// Trailing status of a canceled stream.
    Status {
        /// Always `aborted`.
        status: String,
    },
    /// Trailing error of a failed stream.
    Error {
        /// Always `error`.
        status: String,
        /// The captured message.
        msg: Option<String>,
    },
    /// Trailing marker of a running stream.
    Loading,
}

impl Node {
    /// The `type` tag.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Root { .. } => "root",
            Self::Section(_) => "section",
            Self::SectionGroup(_) => "section-group",
            Self::CodeBlock(_) => "code-block",
            Self::DumpBlock(_) => "dump-block",
            Self::Halt(_) => "halt",
            Self::Status { .. } => "status",
            Self::Error { .. } => "error",
            Self::Loading => "loading",
        }
    }

    /// Children of a container, `None` for leaves.
    #[must_use]
    pub fn children(&self) -> Option<&[Node]> {
        match self {
            Self::Root { nodes }
            | Self::Section(Section { nodes, .. })
            | Self::SectionGroup(SectionGroup { nodes, .. }) => Some(nodes),
            _ => None,
        }
    }

    /// Mutable children of a container, `None` for leaves.
    pub fn children_mut(&mut self) -> Option<&mut Vec<Node>> {
        match self {
            Self::Root { nodes }
            | Self::Section(Section { nodes, .. })
            | Self::SectionGroup(SectionGroup { nodes, .. }) => Some(nodes),
            _ => None,
        }
    }

    /// Whether the node can hold children.
    #[must_use]
    pub fn is_container(&self) -> bool {
        self.children().is_some()
    }

    /// Number of nodes in this subtree, including itself.
    #[must_use]
    pub fn count(&self) -> usize {
        1 + self
            .children()
            .map_or(0, |nodes| nodes.iter().map(Self::count).sum())
    }
}
