use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::DispatchError;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct KeyValuePair {
    pub key: String,
    #[serde(default = "empty_value")]
    pub value: Value,
}

fn empty_value() -> Value {
    Value::String(String::new())
}

impl KeyValuePair {
    pub fn new(key: impl Into<String>, value: impl Into<Value>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}

/// Folds pairs into a map in order; a repeated key keeps its last value.
pub fn reduce_pairs(pairs: &[KeyValuePair]) -> Map<String, Value> {
    let mut out = Map::new();
    for pair in pairs {
        out.insert(pair.key.clone(), pair.value.clone());
    }
    out
}

/// Decodes a `[{ key, value }, ...]` list. Null means no pairs.
pub fn parse_pairs(
    value: &Value,
    name: &str,
    target: &str,
) -> Result<Vec<KeyValuePair>, DispatchError> {
    match value {
        Value::Null => Ok(Vec::new()),
        Value::Array(items) => items
            .iter()
            .enumerate()
            .map(|(position, item)| {
                serde_json::from_value::<KeyValuePair>(item.clone()).map_err(|err| {
                    DispatchError::invalid(name, target, format!("entry {position}: {err}"))
                })
            })
            .collect(),
        _ => Err(DispatchError::invalid(
            name,
            target,
            "expected a list of key/value entries",
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn empty_sequence_reduces_to_empty_map() {
        assert!(reduce_pairs(&[]).is_empty());
    }

    #[test]
    fn last_duplicate_wins_and_all_keys_survive() {
        let pairs = vec![
            KeyValuePair::new("plan", "free"),
            KeyValuePair::new("seats", "3"),
            KeyValuePair::new("plan", "pro"),
        ];
        let map = reduce_pairs(&pairs);
        assert_eq!(map.len(), 2);
        assert_eq!(map["plan"], json!("pro"));
        assert_eq!(map["seats"], json!("3"));
    }

    #[test]
    fn parse_defaults_missing_value_and_rejects_missing_key() {
        let pairs = parse_pairs(
            &json!([{ "key": "browser" }, { "key": "os", "value": "linux" }]),
            "propertyValues",
            "event/create",
        )
        .unwrap();
        assert_eq!(pairs[0].value, json!(""));
        assert_eq!(pairs[1], KeyValuePair::new("os", "linux"));

        let err = parse_pairs(&json!([{ "value": 1 }]), "propertyValues", "event/create")
            .unwrap_err();
        assert!(matches!(err, DispatchError::InvalidParameter { .. }));
        assert!(parse_pairs(&json!("x"), "contextValues", "track/page").is_err());
        assert!(parse_pairs(&Value::Null, "contextValues", "track/page")
            .unwrap()
            .is_empty());
    }
}
