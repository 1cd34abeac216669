//! Dotted-path update operations derived from a [`StateDiff`].
//!
//! Document stores that address nested fields by path (`dc.title`,
//! `files.0.name`) cannot take a tree-shaped diff directly. [`Updates`]
//! flattens a diff into `set` / `unset` / `push` / `pop` operations and
//! [`Updates::into_batches`] splits them so that no batch touches a path
//! together with one of its prefixes, which such stores reject.
//!
//! Field names must not contain `.`.

use crate::error::{Result, StateError};
use crate::state::{ListDiff, Patch, Scalar, State, StateDiff, Value};
use std::collections::{BTreeMap, BTreeSet, HashSet};

/// A single path operation.
#[derive(Clone, Debug, PartialEq)]
pub enum UpdateOp {
    /// Store a value at the path.
    Set(Value),
    /// Remove the field at the path.
    Unset,
    /// Append values to the list or array at the path.
    Push(Vec<Value>),
    /// Remove the last element of the list or array at the path.
    Pop,
}

/// Flattened operations, grouped by kind.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Updates {
    pub set: BTreeMap<String, Value>,
    pub unset: BTreeSet<String>,
    pub push: BTreeMap<String, Vec<Value>>,
    pub pop: BTreeSet<String>,
}

impl Updates {
    /// Flatten a state diff into path operations.
    pub fn from_diff(diff: &StateDiff) -> Self {
        let mut updates = Updates::default();
        updates.add_state_diff(diff, None);
        updates
    }

    pub fn len(&self) -> usize {
        self.set.len() + self.unset.len() + self.push.len() + self.pop.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn add_state_diff(&mut self, diff: &StateDiff, prefix: Option<&str>) {
        for (key, patch) in diff {
            let path = join(prefix, key);
            match patch {
                Patch::Nop => {}
                Patch::State(nested) => self.add_state_diff(nested, Some(&path)),
                Patch::List(list_diff) => self.add_list_diff(list_diff, &path),
                // Absent rather than null, so the stored document stays minimal.
                Patch::Replace(Value::Null) => {
                    self.unset.insert(path);
                }
                Patch::Replace(value) => {
                    self.set.insert(path, value.clone());
                }
            }
        }
    }

    fn add_list_diff(&mut self, diff: &ListDiff, path: &str) {
        if let Some(slots) = &diff.diff {
            for (i, slot) in slots.iter().enumerate() {
                let elem_path = join(Some(path), &i.to_string());
                match slot {
                    Patch::Nop => {}
                    Patch::State(nested) => self.add_state_diff(nested, Some(&elem_path)),
                    Patch::List(nested) => self.add_list_diff(nested, &elem_path),
                    Patch::Replace(value) => {
                        self.set.insert(elem_path, value.clone());
                    }
                }
            }
        }
        if let Some(values) = &diff.rpush {
            self.push.insert(path.to_string(), values.clone());
        }
        if diff.rpop {
            self.pop.insert(path.to_string());
        }
    }

    /// Split into batches, in order set, unset, push, pop, such that no
    /// batch holds two paths where one equals or prefixes the other.
    pub fn into_batches(self) -> Vec<UpdateBatch> {
        let mut builder = BatchBuilder::new();
        for (path, value) in self.set {
            builder.add(path, UpdateOp::Set(value));
        }
        for path in self.unset {
            builder.add(path, UpdateOp::Unset);
        }
        for (path, values) in self.push {
            builder.add(path, UpdateOp::Push(values));
        }
        for path in self.pop {
            builder.add(path, UpdateOp::Pop);
        }
        builder.finish()
    }
}

fn join(prefix: Option<&str>, key: &str) -> String {
    match prefix {
        Some(prefix) => format!("{prefix}.{key}"),
        None => key.to_string(),
    }
}

/// `a.0.b` -> `[a, a.0, a.0.b]`
fn prefix_paths(path: &str) -> Vec<&str> {
    let mut prefixes: Vec<&str> = path
        .match_indices('.')
        .map(|(i, _)| &path[..i])
        .collect();
    prefixes.push(path);
    prefixes
}

struct BatchBuilder {
    batches: Vec<UpdateBatch>,
    current: UpdateBatch,
    /// Every path and every prefix of a path in the current batch.
    prefixes: HashSet<String>,
    /// Full paths in the current batch.
    paths: HashSet<String>,
}

impl BatchBuilder {
    fn new() -> Self {
        Self {
            batches: Vec::new(),
            current: UpdateBatch::default(),
            prefixes: HashSet::new(),
            paths: HashSet::new(),
        }
    }

    fn add(&mut self, path: String, op: UpdateOp) {
        let own_prefixes = prefix_paths(&path);
        let conflicts = self.prefixes.contains(path.as_str())
            || own_prefixes.iter().any(|p| self.paths.contains(*p));
        if conflicts {
            self.start_batch();
        }
        self.prefixes
            .extend(own_prefixes.iter().map(|p| p.to_string()));
        self.paths.insert(path.clone());
        self.current.ops.push((path, op));
    }

    fn start_batch(&mut self) {
        let done = std::mem::take(&mut self.current);
        self.batches.push(done);
        self.prefixes.clear();
        self.paths.clear();
    }

    fn finish(mut self) -> Vec<UpdateBatch> {
        if !self.current.ops.is_empty() {
            self.batches.push(self.current);
        }
        self.batches
    }
}

/// Conflict-free group of path operations.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct UpdateBatch {
    ops: Vec<(String, UpdateOp)>,
}

impl UpdateBatch {
    pub fn ops(&self) -> &[(String, UpdateOp)] {
        &self.ops
    }

    pub fn len(&self) -> usize {
        self.ops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    /// Apply every operation of this batch to `state`.
    pub fn apply_to(&self, state: &mut State) -> Result<()> {
        for (path, op) in &self.ops {
            apply_op(state, path, op)?;
        }
        Ok(())
    }
}

/// Apply batches in order.
pub fn apply_batches(state: &mut State, batches: &[UpdateBatch]) -> Result<()> {
    for batch in batches {
        batch.apply_to(state)?;
    }
    Ok(())
}

fn invalid(path: &str, reason: &str) -> StateError {
    StateError::InvalidPath(format!("{path}: {reason}"))
}

fn parse_index(segment: &str, path: &str) -> Result<usize> {
    segment
        .parse()
        .map_err(|_| invalid(path, "expected list index"))
}

fn resolve_mut<'a>(state: &'a mut State, path: &str, segments: &[&str]) -> Result<&'a mut Value> {
    let (first, rest) = segments
        .split_first()
        .ok_or_else(|| invalid(path, "empty path"))?;
    let mut current = state
        .get_mut(first)
        .ok_or_else(|| invalid(path, "missing field"))?;
    for segment in rest {
        current = match current {
            Value::State(s) => s
                .get_mut(segment)
                .ok_or_else(|| invalid(path, "missing field"))?,
            Value::List(l) => {
                let i = parse_index(segment, path)?;
                l.get_mut(i)
                    .ok_or_else(|| invalid(path, "index out of range"))?
            }
            _ => return Err(invalid(path, "not a container")),
        };
    }
    Ok(current)
}

fn to_scalar(value: &Value, path: &str) -> Result<Scalar> {
    value
        .as_scalar()
        .cloned()
        .ok_or_else(|| invalid(path, "arrays hold scalars only"))
}

fn apply_op(state: &mut State, path: &str, op: &UpdateOp) -> Result<()> {
    let segments: Vec<&str> = path.split('.').collect();
    match op {
        UpdateOp::Set(_) | UpdateOp::Unset => {
            let (last, parents) = segments
                .split_last()
                .ok_or_else(|| invalid(path, "empty path"))?;
            let value = match op {
                UpdateOp::Set(value) => value.clone(),
                _ => Value::Null,
            };
            if parents.is_empty() {
                state.put(*last, value);
                return Ok(());
            }
            match resolve_mut(state, path, parents)? {
                Value::State(s) => {
                    s.put(*last, value);
                }
                Value::List(l) => {
                    let i = parse_index(last, path)?;
                    l.set(i, value)
                        .ok_or_else(|| invalid(path, "index out of range"))?;
                }
                Value::Array(a) => {
                    let i = parse_index(last, path)?;
                    let slot = a
                        .get_mut(i)
                        .ok_or_else(|| invalid(path, "index out of range"))?;
                    *slot = to_scalar(&value, path)?;
                }
                _ => return Err(invalid(path, "not a container")),
            }
            Ok(())
        }
        UpdateOp::Push(values) => match resolve_mut(state, path, &segments)? {
            Value::List(l) => {
                l.extend(values.iter().cloned());
                Ok(())
            }
            Value::Array(a) => {
                for value in values {
                    a.push(to_scalar(value, path)?);
                }
                Ok(())
            }
            _ => Err(invalid(path, "push onto non-list")),
        },
        UpdateOp::Pop => {
            let popped = match resolve_mut(state, path, &segments)? {
                Value::List(l) => l.pop().is_some(),
                Value::Array(a) => a.pop().is_some(),
                _ => return Err(invalid(path, "pop from non-list")),
            };
            if popped {
                Ok(())
            } else {
                Err(invalid(path, "pop from empty list"))
            }
        }
    }
}
