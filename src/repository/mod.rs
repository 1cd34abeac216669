//! Backing stores for document states.

mod memory;

pub use memory::MemRepository;

use crate::config::DiffConfig;
use crate::error::Result;
use crate::state::{Scalar, State, StateDiff, Value};
use std::collections::HashSet;

/// Storage of document states keyed by id.
///
/// Updates arrive as diffs against the last stored state; implementations
/// decide how to encode them (apply in place, translate to path updates, ...).
pub trait Repository: Send + Sync {
    /// A fresh, unused document id.
    fn generate_new_id(&self) -> String;

    fn read_state(&self, id: &str) -> Result<Option<State>>;

    /// States for the ids that exist, in request order.
    fn read_states(&self, ids: &[String]) -> Result<Vec<State>>;

    fn create_state(&self, state: State) -> Result<()>;

    fn update_state(&self, id: &str, diff: &StateDiff) -> Result<()>;

    fn delete_states(&self, ids: &[String]) -> Result<()>;

    /// The child of `parent_id` called `name`, skipping ids in `ignored`.
    fn read_child_state(
        &self,
        parent_id: &str,
        name: &str,
        ignored: &HashSet<String>,
    ) -> Result<Option<State>>;

    fn has_child(&self, parent_id: &str, name: &str, ignored: &HashSet<String>) -> Result<bool> {
        Ok(self.read_child_state(parent_id, name, ignored)?.is_some())
    }

    /// States whose string field `key` is `value`, skipping ids in
    /// `ignored`, ordered by id.
    fn query_key_value(
        &self,
        key: &str,
        value: &str,
        ignored: &HashSet<String>,
    ) -> Result<Vec<State>>;

    fn query_key_value_presence(
        &self,
        key: &str,
        value: &str,
        ignored: &HashSet<String>,
    ) -> Result<bool> {
        Ok(!self.query_key_value(key, value, ignored)?.is_empty())
    }

    /// Ids of states whose array field `key` holds `value`, skipping ids in
    /// `ignored`, ordered by id.
    fn query_key_value_array(
        &self,
        key: &str,
        value: &str,
        ignored: &HashSet<String>,
    ) -> Result<Vec<String>>;

    /// Diff settings for sessions writing to this repository.
    fn diff_config(&self) -> DiffConfig {
        DiffConfig::default()
    }
}

/// Whether string field `key` of `state` is `value`.
pub(crate) fn field_is(state: &State, key: &str, value: &str) -> bool {
    state.get(key).and_then(Value::as_str) == Some(value)
}

/// Whether array field `key` of `state` holds the string `value`.
pub(crate) fn array_holds(state: &State, key: &str, value: &str) -> bool {
    state
        .get(key)
        .and_then(Value::as_array)
        .is_some_and(|items| {
            items
                .iter()
                .any(|item| matches!(item, Scalar::String(s) if s == value))
        })
}
