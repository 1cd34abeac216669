//! Property tests for equality, diff and apply.

use docstate::{
    apply_batches, apply_diff, deep_copy, diff, diff_states, equals, DiffConfig, Differ, Patch,
    Scalar, State, Updates, Value,
};
use proptest::collection::{btree_map, vec};
use proptest::prelude::*;

fn key() -> impl Strategy<Value = String> {
    prop::sample::select(vec!["a", "b", "c", "d"]).prop_map(String::from)
}

fn scalar() -> impl Strategy<Value = Scalar> {
    prop_oneof![
        "[a-c]{0,2}".prop_map(Scalar::String),
        any::<bool>().prop_map(Scalar::Boolean),
        (-3i64..3).prop_map(Scalar::Long),
        prop_oneof![Just(0.0), Just(-0.0), Just(1.5), Just(f64::NAN)].prop_map(Scalar::Double),
    ]
}

fn value() -> impl Strategy<Value = Value> {
    let leaf = prop_oneof![
        Just(Value::Null),
        scalar().prop_map(Value::Scalar),
        vec(scalar(), 0..4).prop_map(Value::Array),
    ];
    leaf.prop_recursive(3, 32, 4, |inner| {
        prop_oneof![
            vec(inner.clone(), 0..4).prop_map(Value::from),
            btree_map(key(), inner, 0..4)
                .prop_map(|fields| Value::State(fields.into_iter().collect())),
        ]
    })
}

fn state() -> impl Strategy<Value = State> {
    btree_map(key(), value(), 0..5).prop_map(|fields| fields.into_iter().collect())
}

/// A state and an edited version of it, so diffs hit list push/pop and
/// nested paths more often than two unrelated states would.
fn state_and_edit() -> impl Strategy<Value = (State, State)> {
    (state(), state(), key(), value()).prop_map(|(a, other, k, v)| {
        let mut b = a.deep_copy();
        for (key, value) in &other {
            if key.as_str() < "c" {
                b.put(key.clone(), value.clone());
            }
        }
        let edited_list = match b.get_mut(&k) {
            Some(Value::List(list)) => {
                if !list.is_empty() && v.is_null() {
                    list.pop();
                } else {
                    list.push(v.clone());
                }
                true
            }
            _ => false,
        };
        if !edited_list {
            b.put(k, v);
        }
        (a, b)
    })
}

proptest! {
    #[test]
    fn prop_diff_of_equal_is_nop(a in value()) {
        prop_assert_eq!(diff(&a, &a), Patch::Nop);
        prop_assert_eq!(diff(&a, &deep_copy(&a)), Patch::Nop);
    }

    #[test]
    fn prop_deep_copy_is_equal(a in state()) {
        let copy = a.deep_copy();
        prop_assert!(equals(&Value::State(a.clone()), &Value::State(copy)));
    }

    #[test]
    fn prop_equality_is_symmetric(a in value(), b in value()) {
        prop_assert_eq!(equals(&a, &b), equals(&b, &a));
    }

    #[test]
    fn prop_apply_reproduces_target((a, b) in state_and_edit()) {
        let mut patched = a.deep_copy();
        if let Some(d) = diff_states(&a, &b) {
            apply_diff(&mut patched, &d).unwrap();
        }
        prop_assert_eq!(&patched, &b);
    }

    #[test]
    fn prop_apply_unrelated_states(a in state(), b in state()) {
        let mut patched = a.deep_copy();
        if let Some(d) = diff_states(&a, &b) {
            apply_diff(&mut patched, &d).unwrap();
        }
        prop_assert_eq!(&patched, &b);
    }

    #[test]
    fn prop_apply_with_flat_list_edits((a, b) in state_and_edit()) {
        let differ = Differ::new(DiffConfig { min_nested_diffs: 0 });
        let mut patched = a.deep_copy();
        if let Some(d) = differ.diff_states(&a, &b) {
            apply_diff(&mut patched, &d).unwrap();
        }
        prop_assert_eq!(&patched, &b);
    }

    #[test]
    fn prop_apply_leaves_source_untouched((a, b) in state_and_edit()) {
        let before = a.deep_copy();
        let mut patched = a.clone();
        if let Some(d) = diff_states(&a, &b) {
            apply_diff(&mut patched, &d).unwrap();
        }
        prop_assert_eq!(&a, &before);
        prop_assert!(a.ptr_eq(&before));
    }

    #[test]
    fn prop_update_batches_reproduce_target((a, b) in state_and_edit()) {
        let differ = Differ::new(DiffConfig { min_nested_diffs: 0 });
        let mut patched = a.deep_copy();
        if let Some(d) = differ.diff_states(&a, &b) {
            let batches = Updates::from_diff(&d).into_batches();
            apply_batches(&mut patched, &batches).unwrap();
        }
        prop_assert_eq!(&patched, &b);
    }
}
