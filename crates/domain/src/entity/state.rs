//! Shared state of every entity index.

use std::cell::OnceCell;
use std::fmt;

use serde::Serialize;
use serde_json::Value;

/// Callback receiving the update log of one notification cycle.
pub type Listener = Box<dyn FnMut(&[Update]) + Send>;

/// Handle returned by listener registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

/// Kind of a logged change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum UpdateKind {
    /// A value or property was written.
    Update,
    /// An entity was deleted.
    Delete,
}

/// One entry of the change log passed to listeners.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Update {
    /// What happened.
    #[serde(rename = "type")]
    pub kind: UpdateKind,
    /// Position at the time of the change.
    pub index: usize,
    /// Value at the time of the change.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<Value>,
}

impl Update {
    /// A write at `index`.
    #[must_use]
    pub const fn update(index: usize, value: Option<Value>) -> Self {
        Self {
            kind: UpdateKind::Update,
            index,
            value,
        }
    }

    /// A deletion of `value` at `index`.
    #[must_use]
    pub const fn delete(index: usize, value: Value) -> Self {
        Self {
            kind: UpdateKind::Delete,
            index,
            value: Some(value),
        }
    }
}

/// Items, listeners, the pending update log and the revision counter.
///
/// The index is single-owner: nothing here is synchronized.
#[derive(Default)]
pub struct IndexState {
    items: Vec<Value>,
    listeners: Vec<(ListenerId, Listener)>,
    next_listener: u64,
    updates: Vec<Update>,
    last_modified: u64,
    suspended: bool,
    all_indices: OnceCell<Vec<usize>>,
}

impl IndexState {
    /// Creates state holding `items`.
    #[must_use]
    pub fn new(items: Vec<Value>) -> Self {
        Self {
            items,
            ..Self::default()
        }
    }

    /// The ordered items.
    #[must_use]
    pub fn items(&self) -> &[Value] {
        &self.items
    }

    /// Mutable access to the items; the caller must [`notify`](Self::notify).
    pub fn items_mut(&mut self) -> &mut Vec<Value> {
        &mut self.items
    }

    /// Replaces all items and drops the index cache.
    pub fn replace_items(&mut self, items: Vec<Value>) {
        self.items = items;
        self.all_indices.take();
    }

    /// `[0, len)`, computed once per notification cycle.
    #[must_use]
    pub fn all_indices(&self) -> &[usize] {
        self.all_indices
            .get_or_init(|| (0..self.items.len()).collect())
    }

    /// Revision counter.
    #[must_use]
    pub const fn last_modified(&self) -> u64 {
        self.last_modified
    }

    /// Whether notifications are currently batched.
    #[must_use]
    pub const fn is_suspended(&self) -> bool {
        self.suspended
    }

    /// Starts batching notifications.
    pub fn suspend(&mut self) {
        self.suspended = true;
    }

    /// Stops batching notifications; the caller fires the final notify.
    pub fn resume(&mut self) {
        self.suspended = false;
    }

    /// Appends an entry to the pending update log.
    pub fn push_update(&mut self, update: Update) {
        self.updates.push(update);
    }

    /// The pending update log.
    #[must_use]
    pub fn pending_updates(&self) -> &[Update] {
        &self.updates
    }

    pub(crate) fn add_listener(&mut self, listener: Listener) -> ListenerId {
        let id = ListenerId(self.next_listener);
        self.next_listener += 1;
        self.listeners.push((id, listener));
        id
    }

    pub(crate) fn remove_listener(&mut self, id: ListenerId) -> bool {
        let before = self.listeners.len();
        self.listeners.retain(|(registered, _)| *registered != id);
        before != self.listeners.len()
    }

    /// Bumps the revision, drops the index cache and, unless suspended,
    /// hands the update log to every listener in registration order.
    pub fn notify(&mut self) {
        self.last_modified += 1;
        self.all_indices.take();
        if self.suspended {
            return;
        }
        let updates = std::mem::take(&mut self.updates);
        for (_, listener) in &mut self.listeners {
            listener(&updates);
        }
    }
}

impl fmt::Debug for IndexState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IndexState")
            .field("items", &self.items)
            .field("listeners", &self.listeners.len())
            .field("updates", &self.updates)
            .field("last_modified", &self.last_modified)
            .field("suspended", &self.suspended)
            .finish_non_exhaustive()
    }
}
