//! Stack-based tree construction.

use std::fmt;

use serde::de::DeserializeOwned;
use serde_json::{Map, Value};

use super::{Cmd, Command, Node, ProtocolError, TreeState};

/// Callback receiving the render projection; `None` while waiting.
pub type TreeSetter = Box<dyn FnMut(Option<&Node>) + Send>;

/// Folds stream commands into a tree.
///
/// Containers opened by `OPEN_*` commands live on a stack until their
/// matching `CLOSE_*` attaches them to their parent. Only nodes attached at
/// the top level are part of the render projection, so a renderer sees a
/// section once it is complete.
///
/// Errors never escape a stream: [`fail`](Self::fail) records them and the
/// caller inspects [`state`](Self::state) and [`error`](Self::error).
#[derive(Default)]
pub struct TreeBuilder {
    state: TreeState,
    nodes: Vec<Node>,
    stack: Vec<Node>,
    ended: bool,
    error: Option<String>,
    commands: usize,
    setter: Option<TreeSetter>,
}

impl TreeBuilder {
    /// Creates a builder in the waiting state.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers the renderer and hands it the current projection.
    pub fn set_tree_setter<F>(&mut self, setter: F)
    where
        F: FnMut(Option<&Node>) + Send + 'static,
    {
        self.setter = Some(Box::new(setter));
        self.update_renderer();
    }

    /// Drops everything received and returns to the waiting state.
    pub fn reset(&mut self) {
        self.clear();
        self.state = TreeState::Waiting;
        self.update_renderer();
    }

    fn clear(&mut self) {
        self.nodes.clear();
        self.stack.clear();
        self.ended = false;
        self.error = None;
        self.commands = 0;
    }

    /// Current lifecycle state.
    #[must_use]
    pub const fn state(&self) -> TreeState {
        self.state
    }

    /// Message of the failure that ended the stream.
    #[must_use]
    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    /// Whether an `END` command was received.
    #[must_use]
    pub const fn is_ended(&self) -> bool {
        self.ended
    }

    /// Completed top-level nodes.
    #[must_use]
    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    /// Number of containers opened but not closed yet.
    #[must_use]
    pub fn open_containers(&self) -> usize {
        self.stack.len()
    }

    /// Number of commands processed since the last reset.
    #[must_use]
    pub const fn commands(&self) -> usize {
        self.commands
    }

    /// Enters the streaming state, discarding a previous stream's nodes.
    pub fn start(&mut self) {
        if self.state != TreeState::Waiting {
            self.clear();
        }
        self.set_state(TreeState::Streaming);
    }

    /// Decodes and processes one stream line.
    ///
    /// # Errors
    ///
    /// Returns the protocol violation; the caller ends the stream with
    /// [`fail`](Self::fail).
    pub fn process_line(&mut self, line: &str) -> Result<(), ProtocolError> {
        self.process_command(Command::parse(line)?)
    }

    /// Processes one command.
    ///
    /// # Errors
    ///
    /// Returns the protocol violation; the caller ends the stream with
    /// [`fail`](Self::fail).
    pub fn process_command(&mut self, command: Command) -> Result<(), ProtocolError> {
        self.commands += 1;
        let Command { cmd, fields } = command;
        match cmd {
            Cmd::OpenSection => self.stack.push(Node::Section(decode("section", fields)?)),
            Cmd::OpenSectionDetails => self
                .stack
                .push(Node::SectionGroup(decode("section-group", fields)?)),
            Cmd::CloseSection => self.close("section")?,
            Cmd::CloseSectionDetails => self.close("section-group")?,
            Cmd::AddDump => self.attach(Node::DumpBlock(decode("dump-block", fields)?))?,
            Cmd::AddCodeBlock => self.attach(Node::CodeBlock(decode("code-block", fields)?))?,
            Cmd::Halt => self.attach(Node::Halt(decode("halt", fields)?))?,
            Cmd::End => self.ended = true,
        }
        Ok(())
    }

    fn close(&mut self, expected: &'static str) -> Result<(), ProtocolError> {
        let node = self.stack.pop().ok_or(ProtocolError::UnbalancedClose(expected))?;
        if node.kind() != expected {
            return Err(ProtocolError::MismatchedClose {
                expected,
                found: node.kind(),
            });
        }
        self.attach(node)
    }

    fn attach(&mut self, node: Node) -> Result<(), ProtocolError> {
        let Some(parent) = self.stack.last_mut() else {
            self.nodes.push(node);
            self.update_renderer();
            return Ok(());
        };
        let parent_kind = parent.kind();
        let children = parent.children_mut().ok_or(ProtocolError::NotAContainer {
            parent: parent_kind,
            child: node.kind(),
        })?;
        children.push(node);
        Ok(())
    }

    /// Handles the end of the byte stream: finished if `END` was seen.
    pub fn finish(&mut self) {
        if self.ended && self.state == TreeState::Streaming {
            self.set_state(TreeState::Finished);
        }
    }

    /// Ends the stream with an error.
    pub fn fail(&mut self, message: impl Into<String>) {
        self.error = Some(message.into());
        self.set_state(TreeState::Errored);
    }

    /// Cancels the stream. No-op once `END` was received or the stream is
    /// already over; returns whether the state changed.
    pub fn abort(&mut self) -> bool {
        if self.ended || self.state.is_terminal() {
            return false;
        }
        self.set_state(TreeState::Canceled);
        true
    }

    fn set_state(&mut self, state: TreeState) {
        self.state = state;
        self.update_renderer();
    }

    /// The render projection: completed nodes plus a trailing marker for the
    /// current state. `None` while waiting.
    #[must_use]
    pub fn tree(&self) -> Option<Node> {
        let mut nodes = self.nodes.clone();
        match self.state {
            TreeState::Waiting => return None,
            TreeState::Streaming => nodes.push(Node::Loading),
            TreeState::Canceled => nodes.push(Node::Status {
                status: "aborted".to_string(),
            }),
            TreeState::Errored => nodes.push(Node::Error {
                status: "error".to_string(),
                msg: self.error.clone(),
            }),
            TreeState::Finished => {}
        }
        Some(Node::Root { nodes })
    }

    fn update_renderer(&mut self) {
        if self.setter.is_none() {
            return;
        }
        let tree = self.tree();
        if let Some(setter) = self.setter.as_mut() {
            setter(tree.as_ref());
        }
    }
}

impl fmt::Debug for TreeBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TreeBuilder")
            .field("state", &self.state)
            .field("nodes", &self.nodes)
            .field("stack", &self.stack)
            .field("ended", &self.ended)
            .field("error", &self.error)
            .field("commands", &self.commands)
            .finish_non_exhaustive()
    }
}

/// Builds a node from command fields. `type` and `nodes` are owned by the
/// builder and never taken from the wire.
fn decode<T: DeserializeOwned>(kind: &'static str, mut fields: Map<String, Value>) -> Result<T, ProtocolError> {
    fields.remove("type");
    fields.remove("nodes");
    serde_json::from_value(Value::Object(fields)).map_err(|e| ProtocolError::InvalidPayload {
        kind,
        message: e.to_string(),
    })
}
