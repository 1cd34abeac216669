//! Wire encodings for states and diffs.
//!
//! MessagePack for replication between repositories, JSON for interchange.

use crate::error::{Result, StateError};
use crate::state::{Scalar, State, StateDiff, Value};
use serde_json::{Map, Number, Value as Json};

/// Encode a state as MessagePack.
pub fn encode_state(state: &State) -> Result<Vec<u8>> {
    Ok(rmp_serde::to_vec_named(state)?)
}

pub fn decode_state(bytes: &[u8]) -> Result<State> {
    Ok(rmp_serde::from_slice(bytes)?)
}

/// Encode a diff as MessagePack.
pub fn encode_diff(diff: &StateDiff) -> Result<Vec<u8>> {
    Ok(rmp_serde::to_vec_named(diff)?)
}

pub fn decode_diff(bytes: &[u8]) -> Result<StateDiff> {
    Ok(rmp_serde::from_slice(bytes)?)
}

/// Build a state from a JSON object.
///
/// Arrays become lists, integers that fit `i64` become longs and every other
/// number becomes a double. JSON nulls are dropped.
pub fn from_json(json: &Json) -> Result<State> {
    match json {
        Json::Object(map) => Ok(state_from_map(map)),
        other => Err(StateError::InvalidFormat(format!(
            "expected a JSON object, got {}",
            json_kind(other)
        ))),
    }
}

/// Parse JSON text into a state.
pub fn from_json_str(text: &str) -> Result<State> {
    let json: Json = serde_json::from_str(text)?;
    from_json(&json)
}

pub fn value_from_json(json: &Json) -> Value {
    match json {
        Json::Null => Value::Null,
        Json::Bool(b) => Value::from(*b),
        Json::Number(n) => match n.as_i64() {
            Some(long) => Value::from(long),
            None => Value::from(n.as_f64().unwrap_or(f64::NAN)),
        },
        Json::String(s) => Value::from(s.as_str()),
        Json::Array(items) => Value::list(items.iter().map(value_from_json)),
        Json::Object(map) => Value::State(state_from_map(map)),
    }
}

fn state_from_map(map: &Map<String, Json>) -> State {
    map.iter()
        .map(|(key, value)| (key.as_str(), value_from_json(value)))
        .collect()
}

/// Render a state as a JSON object.
pub fn to_json(state: &State) -> Json {
    Json::Object(
        state
            .iter()
            .map(|(key, value)| (key.clone(), value_to_json(value)))
            .collect(),
    )
}

/// Render a value as JSON.
///
/// Timestamps become microsecond numbers and binaries become
/// `{"digest": <hex>, "length": <n>}`. Non-finite doubles become null.
pub fn value_to_json(value: &Value) -> Json {
    match value {
        Value::Null => Json::Null,
        Value::Scalar(scalar) => scalar_to_json(scalar),
        Value::Array(items) => Json::Array(items.iter().map(scalar_to_json).collect()),
        Value::List(items) => Json::Array(items.iter().map(value_to_json).collect()),
        Value::State(state) => to_json(state),
    }
}

fn scalar_to_json(scalar: &Scalar) -> Json {
    match scalar {
        Scalar::String(s) => Json::String(s.clone()),
        Scalar::Boolean(b) => Json::Bool(*b),
        Scalar::Long(n) => Json::Number((*n).into()),
        Scalar::Double(d) => Number::from_f64(*d).map_or(Json::Null, Json::Number),
        Scalar::Timestamp(ts) => Json::Number(ts.0.into()),
        Scalar::Binary(blob) => {
            let mut map = Map::new();
            map.insert("digest".into(), Json::String(blob.digest.to_hex()));
            map.insert("length".into(), Json::Number(blob.length.into()));
            Json::Object(map)
        }
    }
}

fn json_kind(json: &Json) -> &'static str {
    match json {
        Json::Null => "null",
        Json::Bool(_) => "boolean",
        Json::Number(_) => "number",
        Json::String(_) => "string",
        Json::Array(_) => "array",
        Json::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::{diff_states, ListDiff, Patch};
    use crate::types::{BinaryRef, Timestamp};
    use serde_json::json;

    fn sample() -> State {
        State::new()
            .with("title", "doc")
            .with("size", 42i64)
            .with("ratio", 0.5)
            .with("created", Timestamp(1_700_000_000_000_000))
            .with("content", BinaryRef::for_content(b"payload"))
            .with("ids", Value::array(["a", "b"]))
            .with(
                "files",
                Value::list([State::new().with("name", "f1"), State::new().with("name", "f2")]),
            )
    }

    #[test]
    fn test_messagepack_state() {
        let state = sample();
        let bytes = encode_state(&state).unwrap();
        let decoded = decode_state(&bytes).unwrap();
        assert_eq!(decoded, state);
    }

    #[test]
    fn test_messagepack_diff() {
        let a = State::new().with("b", Value::list([1i64, 2, 3]));
        let b = State::new().with("b", Value::list([1i64, 2, 3, 4]));
        let diff = diff_states(&a, &b).unwrap();

        let decoded = decode_diff(&encode_diff(&diff).unwrap()).unwrap();
        assert_eq!(
            decoded.get("b"),
            Some(&Patch::List(ListDiff {
                rpush: Some(vec![Value::from(4i64)]),
                ..Default::default()
            }))
        );
    }

    #[test]
    fn test_decode_garbage() {
        assert!(matches!(
            decode_state(&[0xc1, 0x00, 0xff]),
            Err(StateError::Deserialization(_))
        ));
    }

    #[test]
    fn test_from_json() {
        let state = from_json(&json!({
            "title": "doc",
            "count": 3,
            "ratio": 1.5,
            "big": 18446744073709551615u64,
            "tags": ["a", "b"],
            "dc": {"creator": "me"},
            "gone": null
        }))
        .unwrap();

        assert_eq!(state.get("count"), Some(&Value::from(3i64)));
        assert_eq!(state.get("ratio"), Some(&Value::from(1.5)));
        assert!(matches!(
            state.get("big"),
            Some(Value::Scalar(Scalar::Double(_)))
        ));
        assert_eq!(state.get("tags"), Some(&Value::list(["a", "b"])));
        assert_eq!(
            state
                .get("dc")
                .and_then(Value::as_state)
                .and_then(|dc| dc.get("creator")),
            Some(&Value::from("me"))
        );
        assert!(!state.contains_key("gone"));
    }

    #[test]
    fn test_from_json_requires_object() {
        assert!(matches!(
            from_json(&json!([1, 2])),
            Err(StateError::InvalidFormat(_))
        ));
        assert!(matches!(
            from_json_str("{not json"),
            Err(StateError::Serialization(_))
        ));
    }

    #[test]
    fn test_to_json() {
        let json = to_json(&sample());
        assert_eq!(json["title"], json!("doc"));
        assert_eq!(json["size"], json!(42));
        assert_eq!(json["created"], json!(1_700_000_000_000_000i64));
        assert_eq!(json["content"]["length"], json!(7));
        assert_eq!(json["ids"], json!(["a", "b"]));
        assert_eq!(json["files"][1]["name"], json!("f2"));
    }

    #[test]
    fn test_non_finite_double_to_null() {
        let json = to_json(&State::new().with("x", f64::INFINITY));
        assert_eq!(json["x"], Json::Null);
    }
}
