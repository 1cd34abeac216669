//! In-place application of diffs.

use super::diff::{ListDiff, Patch, StateDiff};
use super::value::{Scalar, State, Value};
use crate::error::{Result, StateError};

/// Apply `diff` to `state` in place.
///
/// The diff must have been computed from a snapshot of the same shape as
/// `state`. A diff that does not fit its base (a state diff over a scalar, a
/// list diff over a non-list, positional edits past the end) is a caller bug
/// and fails with [`StateError::Unsupported`]; `state` may then be partially
/// patched.
pub fn apply_diff(state: &mut State, diff: &StateDiff) -> Result<()> {
    apply_state_diff(state, diff, "")
}

fn child_path(path: &str, key: &str) -> String {
    if path.is_empty() {
        key.to_string()
    } else {
        format!("{path}.{key}")
    }
}

fn apply_state_diff(state: &mut State, diff: &StateDiff, path: &str) -> Result<()> {
    for (key, patch) in diff {
        match patch {
            Patch::Nop => {}
            Patch::Replace(value) => {
                state.put(key.clone(), value.clone());
            }
            Patch::State(nested) => match state.get_mut(key) {
                Some(Value::State(target)) => {
                    apply_state_diff(target, nested, &child_path(path, key))?;
                }
                Some(slot) if slot.is_null() => {
                    let mut target = State::new();
                    apply_state_diff(&mut target, nested, &child_path(path, key))?;
                    *slot = Value::State(target);
                }
                Some(other) => {
                    return Err(StateError::Unsupported(format!(
                        "cannot apply state diff to {} at '{}'",
                        other.kind(),
                        child_path(path, key)
                    )));
                }
                None => {
                    let mut target = State::new();
                    apply_state_diff(&mut target, nested, &child_path(path, key))?;
                    state.put(key.clone(), target);
                }
            },
            Patch::List(list_diff) => match state.get_mut(key) {
                Some(target) => apply_list_diff(target, list_diff, &child_path(path, key))?,
                None => {
                    return Err(StateError::Unsupported(format!(
                        "cannot apply list diff to missing value at '{}'",
                        child_path(path, key)
                    )));
                }
            },
        }
    }
    Ok(())
}

fn apply_list_diff(target: &mut Value, diff: &ListDiff, path: &str) -> Result<()> {
    match target {
        Value::List(list) => {
            if let Some(slots) = &diff.diff {
                if slots.len() > list.len() {
                    return Err(StateError::Unsupported(format!(
                        "list diff has {} slots but list at '{}' has {} elements",
                        slots.len(),
                        path,
                        list.len()
                    )));
                }
                for (i, slot) in slots.iter().enumerate() {
                    if slot.is_nop() {
                        continue;
                    }
                    // Bounds checked above.
                    if let Some(element) = list.get_mut(i) {
                        apply_element_patch(element, slot, &child_path(path, &i.to_string()))?;
                    }
                }
            }
            if let Some(values) = &diff.rpush {
                list.extend(values.iter().cloned());
            }
            if diff.rpop && list.pop().is_none() {
                return Err(StateError::Unsupported(format!(
                    "cannot pop from empty list at '{path}'"
                )));
            }
            Ok(())
        }
        Value::Array(array) => {
            if let Some(slots) = &diff.diff {
                if slots.len() > array.len() {
                    return Err(StateError::Unsupported(format!(
                        "array diff has {} slots but array at '{}' has {} elements",
                        slots.len(),
                        path,
                        array.len()
                    )));
                }
                for (i, slot) in slots.iter().enumerate() {
                    match slot {
                        Patch::Nop => {}
                        Patch::Replace(value) => {
                            array[i] = to_scalar(value, path)?;
                        }
                        Patch::State(_) | Patch::List(_) => {
                            return Err(StateError::Unsupported(format!(
                                "structured patch on array element at '{path}.{i}'"
                            )));
                        }
                    }
                }
            }
            if let Some(values) = &diff.rpush {
                for value in values {
                    array.push(to_scalar(value, path)?);
                }
            }
            if diff.rpop && array.pop().is_none() {
                return Err(StateError::Unsupported(format!(
                    "cannot pop from empty array at '{path}'"
                )));
            }
            Ok(())
        }
        other => Err(StateError::Unsupported(format!(
            "cannot apply list diff to {} at '{}'",
            other.kind(),
            path
        ))),
    }
}

fn apply_element_patch(element: &mut Value, patch: &Patch, path: &str) -> Result<()> {
    match patch {
        Patch::Nop => Ok(()),
        Patch::Replace(value) => {
            *element = value.clone();
            Ok(())
        }
        Patch::State(nested) => match element {
            Value::State(target) => apply_state_diff(target, nested, path),
            Value::Null => {
                let mut target = State::new();
                apply_state_diff(&mut target, nested, path)?;
                *element = Value::State(target);
                Ok(())
            }
            other => Err(StateError::Unsupported(format!(
                "cannot apply state diff to {} at '{}'",
                other.kind(),
                path
            ))),
        },
        Patch::List(list_diff) => apply_list_diff(element, list_diff, path),
    }
}

fn to_scalar(value: &Value, path: &str) -> Result<Scalar> {
    value.as_scalar().cloned().ok_or_else(|| {
        StateError::Unsupported(format!(
            "cannot store {} in array at '{}'",
            value.kind(),
            path
        ))
    })
}
