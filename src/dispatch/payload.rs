//! Open key-value payload carried by dispatched events.
//!
//! No schema is enforced: reading a missing or mistyped key yields `None`.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Event payload (a JSON object).
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Payload(Map<String, Value>);

impl Payload {
    /// Creates an empty payload.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a key (builder style).
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.0.insert(key.into(), value.into());
        self
    }

    /// Inserts or replaces a key.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.0.insert(key.into(), value.into());
    }

    /// Raw value for `key`.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    /// String value for `key`.
    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.0.get(key).and_then(Value::as_str)
    }

    /// Integer value for `key`.
    pub fn get_i64(&self, key: &str) -> Option<i64> {
        self.0.get(key).and_then(Value::as_i64)
    }

    /// Boolean value for `key`.
    pub fn get_bool(&self, key: &str) -> Option<bool> {
        self.0.get(key).and_then(Value::as_bool)
    }

    /// Returns the payload as a JSON value.
    pub fn to_value(&self) -> Value {
        Value::Object(self.0.clone())
    }
}

impl From<Value> for Payload {
    /// Non-object values produce an empty payload.
    fn from(v: Value) -> Self {
        match v {
            Value::Object(m) => Payload(m),
            _ => Payload::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn missing_or_mistyped_keys_read_as_none() {
        let p = Payload::from(json!({"name": "x", "n": 3}));
        assert_eq!(p.get_str("name"), Some("x"));
        assert_eq!(p.get_i64("n"), Some(3));
        assert_eq!(p.get_str("n"), None);
        assert_eq!(p.get_bool("nope"), None);
        assert_eq!(Payload::from(json!([1, 2])), Payload::new());
    }
}
