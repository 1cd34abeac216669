//! A document snapshot with change tracking.

use crate::state::{Differ, State, StateDiff, Value};

/// Key holding the document id.
pub const KEY_ID: &str = "id";
/// Key holding the parent document id.
pub const KEY_PARENT_ID: &str = "parentId";
/// Key holding the ids of all ancestors, root first.
pub const KEY_ANCESTOR_IDS: &str = "ancestorIds";
/// Key holding the document name within its parent.
pub const KEY_NAME: &str = "name";
/// Key holding the document type.
pub const KEY_PRIMARY_TYPE: &str = "primaryType";

/// Current state of a document plus the state it was loaded from.
///
/// Writes go to the current state; [`DocumentState::state_change`] reports the
/// diff to persist. The original is an O(1) copy, so tracking costs nothing
/// until fields are written.
#[derive(Clone, Debug, Default)]
pub struct DocumentState {
    original: State,
    state: State,
    dirty: bool,
}

impl DocumentState {
    /// Empty document, for creation.
    pub fn new() -> Self {
        Self::default()
    }

    /// Track changes against `state`.
    pub fn from_state(state: State) -> Self {
        Self {
            original: state.deep_copy(),
            state,
            dirty: false,
        }
    }

    pub fn id(&self) -> Option<&str> {
        self.state.get(KEY_ID).and_then(Value::as_str)
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.state.get(key)
    }

    /// Write a field. Null removes it.
    pub fn put(&mut self, key: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        self.dirty = true;
        self.state.put(key, value)
    }

    /// Mutable access to a field, marking the document dirty.
    pub fn get_mut(&mut self, key: &str) -> Option<&mut Value> {
        self.dirty = true;
        self.state.get_mut(key)
    }

    pub fn state(&self) -> &State {
        &self.state
    }

    pub fn original(&self) -> &State {
        &self.original
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Diff from the original to the current state, if anything changed.
    pub fn state_change(&self) -> Option<StateDiff> {
        self.state_change_with(&Differ::default())
    }

    pub fn state_change_with(&self, differ: &Differ) -> Option<StateDiff> {
        if !self.dirty {
            return None;
        }
        differ.diff_states(&self.original, &self.state)
    }

    /// Accept the current state as the new baseline.
    pub fn set_not_dirty(&mut self) {
        self.original = self.state.deep_copy();
        self.dirty = false;
    }
}
