//! Null-coalescing structural equality.

use super::value::{State, Value};

/// Compare two values, treating null and empty collections as absent.
pub fn equals(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Scalar(x), Value::Scalar(y)) => x == y,
        (Value::Array(x), Value::Array(y)) => x == y,
        (Value::List(x), Value::List(y)) => {
            x.ptr_eq(y) || (x.len() == y.len() && x.iter().zip(y.iter()).all(|(x, y)| equals(x, y)))
        }
        (Value::State(x), Value::State(y)) => states_equal(x, y),
        _ => a.is_null_equivalent() && b.is_null_equivalent(),
    }
}

/// Compare two states key by key; a missing key equals a null-equivalent value.
pub fn states_equal(a: &State, b: &State) -> bool {
    if a.ptr_eq(b) {
        return true;
    }
    let a_matches = a.iter().all(|(key, va)| match b.get(key) {
        Some(vb) => equals(va, vb),
        None => va.is_null_equivalent(),
    });
    a_matches
        && b.iter()
            .filter(|(key, _)| !a.contains_key(key))
            .all(|(_, vb)| vb.is_null_equivalent())
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        equals(self, other)
    }
}

impl PartialEq for State {
    fn eq(&self, other: &Self) -> bool {
        states_equal(self, other)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::Scalar;

    #[test]
    fn test_null_equals_empty_state() {
        assert!(equals(&Value::Null, &Value::State(State::new())));
        assert!(equals(&Value::State(State::new()), &Value::Null));
    }

    #[test]
    fn test_empty_collections_are_interchangeable() {
        let empty_list = Value::list(Vec::<Value>::new());
        let empty_array = Value::Array(vec![]);
        assert!(equals(&empty_list, &Value::Null));
        assert!(equals(&empty_list, &empty_array));
        assert!(equals(&empty_array, &Value::State(State::new())));
    }

    #[test]
    fn test_missing_key_equals_empty_value() {
        let a = State::new().with("title", "x");
        let b = State::new()
            .with("title", "x")
            .with("tags", Value::list(Vec::<Value>::new()))
            .with("meta", State::new());
        assert!(states_equal(&a, &b));
        assert!(states_equal(&b, &a));
    }

    #[test]
    fn test_scalars_compare_natively() {
        assert!(equals(&Value::from("a"), &Value::from("a")));
        assert!(!equals(&Value::from("a"), &Value::from("b")));
        assert!(!equals(&Value::from(1i64), &Value::from(1.0)));
        assert!(!equals(&Value::from(""), &Value::Null));
    }

    #[test]
    fn test_arrays_are_positional() {
        let a = Value::array(["x", "y"]);
        let b = Value::array(["y", "x"]);
        assert!(!equals(&a, &b));
        assert!(equals(&a, &Value::Array(vec![Scalar::from("x"), Scalar::from("y")])));
    }

    #[test]
    fn test_list_and_array_with_content_differ() {
        let list = Value::list(["x"]);
        let array = Value::array(["x"]);
        assert!(!equals(&list, &array));
    }

    #[test]
    fn test_nested_lists_normalize_elements() {
        let a = Value::list([Value::Null, Value::from(1i64)]);
        let b = Value::list([Value::State(State::new()), Value::from(1i64)]);
        assert!(equals(&a, &b));

        let c = Value::list([Value::from(1i64)]);
        assert!(!equals(&a, &c));
    }

    #[test]
    fn test_nested_states() {
        let a = State::new().with("dc", State::new().with("title", "t").with("n", 1i64));
        let b = State::new().with("dc", State::new().with("n", 1i64).with("title", "t"));
        let c = State::new().with("dc", State::new().with("n", 2i64).with("title", "t"));
        assert_eq!(a, b);
        assert_ne!(a, c);
    }
}
