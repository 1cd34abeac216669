//! Value model for document states.

use crate::cow::{CowList, CowMap};
use crate::types::{BinaryRef, Timestamp};
use serde::{Deserialize, Serialize};
use std::collections::btree_map;
use std::fmt;

/// A leaf value.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub enum Scalar {
    String(String),
    Boolean(bool),
    Long(i64),
    Double(f64),
    Timestamp(Timestamp),
    Binary(BinaryRef),
}

impl PartialEq for Scalar {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Scalar::String(a), Scalar::String(b)) => a == b,
            (Scalar::Boolean(a), Scalar::Boolean(b)) => a == b,
            (Scalar::Long(a), Scalar::Long(b)) => a == b,
            // Bitwise, so NaN equals itself and every value is reflexive.
            (Scalar::Double(a), Scalar::Double(b)) => a.to_bits() == b.to_bits(),
            (Scalar::Timestamp(a), Scalar::Timestamp(b)) => a == b,
            (Scalar::Binary(a), Scalar::Binary(b)) => a == b,
            _ => false,
        }
    }
}

/// Any value that can be stored in a [`State`].
///
/// Equality is null-coalescing: `Null`, empty lists, empty arrays and states
/// holding only such values all compare equal.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub enum Value {
    #[default]
    Null,
    Scalar(Scalar),
    /// Fixed-size array of scalars.
    Array(Vec<Scalar>),
    /// Growable list of arbitrary values.
    List(CowList<Value>),
    State(State),
}

impl Value {
    /// Build a list value.
    pub fn list<I, V>(values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        Value::List(values.into_iter().map(Into::into).collect())
    }

    /// Build an array value.
    pub fn array<I, S>(values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<Scalar>,
    {
        Value::Array(values.into_iter().map(Into::into).collect())
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Whether this value is indistinguishable from an absent one.
    pub fn is_null_equivalent(&self) -> bool {
        match self {
            Value::Null => true,
            Value::Scalar(_) => false,
            Value::Array(values) => values.is_empty(),
            Value::List(values) => values.is_empty(),
            Value::State(state) => state.values().all(Value::is_null_equivalent),
        }
    }

    /// Short name of the variant, for error messages.
    pub fn kind(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Scalar(_) => "scalar",
            Value::Array(_) => "array",
            Value::List(_) => "list",
            Value::State(_) => "state",
        }
    }

    pub fn as_scalar(&self) -> Option<&Scalar> {
        match self {
            Value::Scalar(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Scalar(Scalar::String(s)) => Some(s),
            _ => None,
        }
    }

    pub fn as_long(&self) -> Option<i64> {
        match self {
            Value::Scalar(Scalar::Long(n)) => Some(*n),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Scalar(Scalar::Boolean(b)) => Some(*b),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&[Scalar]> {
        match self {
            Value::Array(values) => Some(values),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&CowList<Value>> {
        match self {
            Value::List(values) => Some(values),
            _ => None,
        }
    }

    pub fn as_state(&self) -> Option<&State> {
        match self {
            Value::State(state) => Some(state),
            _ => None,
        }
    }

    pub fn as_state_mut(&mut self) -> Option<&mut State> {
        match self {
            Value::State(state) => Some(state),
            _ => None,
        }
    }

    /// Convert into a scalar, for storage in an array.
    pub fn into_scalar(self) -> Option<Scalar> {
        match self {
            Value::Scalar(s) => Some(s),
            _ => None,
        }
    }
}

/// Shared null, for lookups that need a `&Value` for an absent key.
pub(crate) static NULL: Value = Value::Null;

/// Copy a value. Lists and states share storage with the source until either
/// side is written, so this is O(1) and the copy is still fully independent.
pub fn deep_copy(value: &Value) -> Value {
    value.clone()
}

impl From<Scalar> for Value {
    fn from(s: Scalar) -> Self {
        Value::Scalar(s)
    }
}

impl From<State> for Value {
    fn from(state: State) -> Self {
        Value::State(state)
    }
}

impl From<CowList<Value>> for Value {
    fn from(values: CowList<Value>) -> Self {
        Value::List(values)
    }
}

impl From<Vec<Value>> for Value {
    fn from(values: Vec<Value>) -> Self {
        Value::List(values.into())
    }
}

impl From<Vec<Scalar>> for Value {
    fn from(values: Vec<Scalar>) -> Self {
        Value::Array(values)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(value: Option<T>) -> Self {
        value.map_or(Value::Null, Into::into)
    }
}

macro_rules! scalar_from {
    ($($ty:ty => $variant:ident),* $(,)?) => {
        $(
            impl From<$ty> for Scalar {
                fn from(v: $ty) -> Self {
                    Scalar::$variant(v.into())
                }
            }

            impl From<$ty> for Value {
                fn from(v: $ty) -> Self {
                    Value::Scalar(Scalar::$variant(v.into()))
                }
            }
        )*
    };
}

scalar_from! {
    String => String,
    &str => String,
    bool => Boolean,
    i64 => Long,
    i32 => Long,
    f64 => Double,
    Timestamp => Timestamp,
    BinaryRef => Binary,
}

/// One snapshot of a document's property tree.
///
/// Keys map to values; storing [`Value::Null`] removes the key. Copies share
/// storage until written.
#[derive(Clone, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct State {
    fields: CowMap<String, Value>,
}

impl State {
    pub fn new() -> Self {
        Self::default()
    }

    /// O(1) copy; see [`deep_copy`].
    pub fn deep_copy(&self) -> Self {
        self.clone()
    }

    /// Whether both states alias the same storage.
    pub fn ptr_eq(&self, other: &Self) -> bool {
        self.fields.ptr_eq(&other.fields)
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }

    pub fn get_mut(&mut self, key: &str) -> Option<&mut Value> {
        self.fields.get_mut(key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.fields.contains_key(key)
    }

    /// Store a value, returning the previous one. Null removes the key.
    pub fn put(&mut self, key: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        let key = key.into();
        match value.into() {
            Value::Null => self.fields.remove(&key),
            value => self.fields.insert(key, value),
        }
    }

    /// Builder form of [`State::put`].
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.put(key, value);
        self
    }

    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.fields.remove(key)
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn keys(&self) -> btree_map::Keys<'_, String, Value> {
        self.fields.keys()
    }

    pub fn values(&self) -> btree_map::Values<'_, String, Value> {
        self.fields.values()
    }

    pub fn iter(&self) -> btree_map::Iter<'_, String, Value> {
        self.fields.iter()
    }
}

impl fmt::Debug for State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&self.fields, f)
    }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for State {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut state = State::new();
        for (k, v) in iter {
            state.put(k, v);
        }
        state
    }
}

impl<'a> IntoIterator for &'a State {
    type Item = (&'a String, &'a Value);
    type IntoIter = btree_map::Iter<'a, String, Value>;

    fn into_iter(self) -> Self::IntoIter {
        self.fields.iter()
    }
}
