//! Structural diff between two values.

use super::equality::equals;
use super::value::{State, Value, NULL};
use crate::config::DiffConfig;
use serde::{Deserialize, Serialize};
use std::collections::btree_map::{self, BTreeMap};

/// Change to a single value.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum Patch {
    /// Unchanged.
    Nop,
    /// Full replacement. `Replace(Value::Null)` clears.
    Replace(Value),
    /// Key-wise change to a nested state.
    State(StateDiff),
    /// Change to a list or array.
    List(ListDiff),
}

impl Patch {
    pub fn is_nop(&self) -> bool {
        matches!(self, Patch::Nop)
    }
}

/// Key-wise patch of a state. Only changed keys are present.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StateDiff {
    entries: BTreeMap<String, Patch>,
}

impl StateDiff {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: impl Into<String>, patch: Patch) -> Option<Patch> {
        self.entries.insert(key.into(), patch)
    }

    /// Builder form of [`StateDiff::insert`].
    pub fn with(mut self, key: impl Into<String>, patch: Patch) -> Self {
        self.insert(key, patch);
        self
    }

    pub fn get(&self, key: &str) -> Option<&Patch> {
        self.entries.get(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn keys(&self) -> btree_map::Keys<'_, String, Patch> {
        self.entries.keys()
    }

    pub fn iter(&self) -> btree_map::Iter<'_, String, Patch> {
        self.entries.iter()
    }
}

impl<'a> IntoIterator for &'a StateDiff {
    type Item = (&'a String, &'a Patch);
    type IntoIter = btree_map::Iter<'a, String, Patch>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}

/// Patch of an ordered sequence.
///
/// Applied in order: positional edits, then `rpush`, then `rpop`.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ListDiff {
    /// Whether the target is a fixed array rather than a list.
    pub is_array: bool,
    /// Elementwise patches over the overlapping prefix, if any slot changed.
    pub diff: Option<Vec<Patch>>,
    /// Elements appended at the end.
    pub rpush: Option<Vec<Value>>,
    /// Drop the last element.
    pub rpop: bool,
}

impl ListDiff {
    /// Whether applying this diff would change nothing.
    pub fn is_empty(&self) -> bool {
        self.diff.as_ref().map_or(true, Vec::is_empty)
            && self.rpush.as_ref().map_or(true, Vec::is_empty)
            && !self.rpop
    }
}

impl PartialEq for ListDiff {
    fn eq(&self, other: &Self) -> bool {
        fn slice<T>(v: &Option<Vec<T>>) -> &[T] {
            v.as_deref().unwrap_or(&[])
        }
        self.is_array == other.is_array
            && slice(&self.diff) == slice(&other.diff)
            && slice(&self.rpush) == slice(&other.rpush)
            && self.rpop == other.rpop
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum ListMode {
    SameSize,
    RightPush,
    RightPop,
}

/// Computes diffs under a given [`DiffConfig`].
#[derive(Clone, Debug, Default)]
pub struct Differ {
    config: DiffConfig,
}

impl Differ {
    pub fn new(config: DiffConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &DiffConfig {
        &self.config
    }

    /// Patch turning `a` into `b`.
    pub fn diff(&self, a: &Value, b: &Value) -> Patch {
        if equals(a, b) {
            return Patch::Nop;
        }
        match (a, b) {
            (Value::Array(x), Value::Array(y)) => {
                let x: Vec<Value> = x.iter().cloned().map(Value::Scalar).collect();
                let y: Vec<Value> = y.iter().cloned().map(Value::Scalar).collect();
                self.diff_list(&x, &y, true, b)
            }
            (Value::List(x), Value::List(y)) => self.diff_list(x.as_slice(), y.as_slice(), false, b),
            (Value::State(x), Value::State(y)) => Patch::State(self.diff_state_keys(x, y)),
            _ => Patch::Replace(b.clone()),
        }
    }

    /// Patch turning state `a` into state `b`, or `None` if they are equal.
    pub fn diff_states(&self, a: &State, b: &State) -> Option<StateDiff> {
        let diff = self.diff_state_keys(a, b);
        if diff.is_empty() {
            None
        } else {
            Some(diff)
        }
    }

    fn diff_state_keys(&self, a: &State, b: &State) -> StateDiff {
        let mut diff = StateDiff::new();
        if a.ptr_eq(b) {
            return diff;
        }
        for (key, va) in a {
            let vb = b.get(key).unwrap_or(&NULL);
            match self.diff(va, vb) {
                Patch::Nop => {}
                patch => {
                    diff.insert(key.clone(), patch);
                }
            }
        }
        for (key, vb) in b {
            if a.contains_key(key) || vb.is_null_equivalent() {
                continue;
            }
            diff.insert(key.clone(), Patch::Replace(vb.clone()));
        }
        diff
    }

    fn diff_list(&self, a: &[Value], b: &[Value], is_array: bool, whole_b: &Value) -> Patch {
        let (a_len, b_len) = (a.len(), b.len());
        let mode = if a_len == b_len {
            ListMode::SameSize
        } else if a_len > 0 && a_len < b_len {
            ListMode::RightPush
        } else if b_len + 1 == a_len {
            ListMode::RightPop
        } else {
            tracing::trace!(a_len, b_len, "list sizes not diffable, replacing");
            return Patch::Replace(whole_b.clone());
        };

        let overlap = a_len.min(b_len);
        let mut slots = Vec::with_capacity(overlap);
        let mut nops = 0;
        let mut nested = 0;
        for (va, vb) in a.iter().zip(b.iter()) {
            let patch = self.diff(va, vb);
            match patch {
                Patch::Nop => nops += 1,
                Patch::State(_) => nested += 1,
                _ => {}
            }
            slots.push(patch);
        }

        let diff = if nops == overlap {
            None
        } else if nested < self.config.min_nested_diffs {
            tracing::trace!(overlap, nops, nested, "flat list changes, replacing");
            return Patch::Replace(whole_b.clone());
        } else {
            Some(slots)
        };

        let list_diff = ListDiff {
            is_array,
            diff,
            rpush: (mode == ListMode::RightPush).then(|| b[a_len..].to_vec()),
            rpop: mode == ListMode::RightPop,
        };
        if list_diff.is_empty() {
            Patch::Nop
        } else {
            Patch::List(list_diff)
        }
    }
}

/// Patch turning `a` into `b` under the default configuration.
pub fn diff(a: &Value, b: &Value) -> Patch {
    Differ::default().diff(a, b)
}

/// Patch turning state `a` into state `b` under the default configuration.
pub fn diff_states(a: &State, b: &State) -> Option<StateDiff> {
    Differ::default().diff_states(a, b)
}
