//! # Dot-path addressable settings tree.
//!
//! [`HierarchicalStore`] wraps a JSON object and addresses nested values with
//! dot-separated paths (`"basic.refresh"`). Writes create intermediate maps on
//! demand; a write that would have to descend *through* a scalar fails with
//! [`UnitError::PathType`].
//!
//! ## Merge semantics
//! [`deep_merge`] recurses into maps present on both sides; for every other
//! combination (scalars, arrays, map vs scalar) the overlay wins.
//! ```text
//! base    {"a": {"x": 1, "y": 2}, "list": [1, 2]}
//! overlay {"a": {"y": 3},         "list": [9]}
//! result  {"a": {"x": 1, "y": 3}, "list": [9]}
//! ```

use serde_json::{Map, Value};

use crate::error::UnitError;

/// Recursively merges `overlay` into `base`. Maps merge key-by-key, anything
/// else is replaced by the overlay value.
pub fn deep_merge(base: &mut Value, overlay: &Value) {
    match (base, overlay) {
        (Value::Object(dst), Value::Object(src)) => {
            for (k, v) in src {
                match dst.get_mut(k) {
                    Some(slot) => deep_merge(slot, v),
                    None => {
                        dst.insert(k.clone(), v.clone());
                    }
                }
            }
        }
        (dst, src) => *dst = src.clone(),
    }
}

/// Returns `base` deep-merged with `overlay` without touching either input.
pub fn merged(base: &Value, overlay: &Value) -> Value {
    let mut out = base.clone();
    deep_merge(&mut out, overlay);
    out
}

/// Splits a dot path into its non-empty segments.
fn segments(path: &str) -> impl Iterator<Item = &str> {
    path.split('.').filter(|s| !s.is_empty())
}

/// Key-path addressable map with deep-merge writes.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct HierarchicalStore {
    root: Map<String, Value>,
}

impl HierarchicalStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a store from a JSON value; non-object values yield an empty store.
    pub fn from_value(value: Value) -> Self {
        match value {
            Value::Object(root) => Self { root },
            _ => Self::default(),
        }
    }

    /// Returns the whole tree as a JSON object.
    pub fn to_value(&self) -> Value {
        Value::Object(self.root.clone())
    }

    /// Returns the value at `path`; `None` for missing keys and the empty path.
    pub fn get(&self, path: &str) -> Option<&Value> {
        let mut parts = segments(path);
        let mut cur = self.root.get(parts.next()?)?;
        for part in parts {
            cur = cur.as_object()?.get(part)?;
        }
        Some(cur)
    }

    /// Returns the value at `path`, or `default` when missing.
    pub fn get_or(&self, path: &str, default: Value) -> Value {
        self.get(path).cloned().unwrap_or(default)
    }

    /// Returns `true` if a value exists at `path`.
    pub fn contains(&self, path: &str) -> bool {
        self.get(path).is_some()
    }

    /// Top-level keys in insertion order.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.root.keys().map(String::as_str)
    }

    /// Replaces the value at `path`, creating intermediate maps.
    pub fn set(&mut self, path: &str, value: Value) -> Result<(), UnitError> {
        let slot = self.slot(path)?;
        *slot = value;
        Ok(())
    }

    /// Deep-merges `value` into whatever lives at `path`.
    ///
    /// The empty path merges into the root (non-object values are rejected).
    pub fn merge(&mut self, path: &str, value: &Value) -> Result<(), UnitError> {
        if segments(path).next().is_none() {
            return match value {
                Value::Object(_) => {
                    let mut root = Value::Object(std::mem::take(&mut self.root));
                    deep_merge(&mut root, value);
                    if let Value::Object(m) = root {
                        self.root = m;
                    }
                    Ok(())
                }
                _ => Err(UnitError::PathType {
                    path: String::new(),
                    at: String::new(),
                }),
            };
        }
        let slot = self.slot(path)?;
        deep_merge(slot, value);
        Ok(())
    }

    /// Removes and returns the value at `path`.
    pub fn remove(&mut self, path: &str) -> Option<Value> {
        let parts: Vec<&str> = segments(path).collect();
        let (last, parents) = parts.split_last()?;
        let mut map = &mut self.root;
        for part in parents {
            match map.get_mut(*part) {
                Some(Value::Object(m)) => map = m,
                _ => return None,
            }
        }
        map.remove(*last)
    }

    /// Walks to the slot addressed by `path`, creating maps on the way.
    fn slot(&mut self, path: &str) -> Result<&mut Value, UnitError> {
        let parts: Vec<&str> = segments(path).collect();
        let Some((last, parents)) = parts.split_last() else {
            return Err(UnitError::PathType {
                path: path.to_string(),
                at: String::new(),
            });
        };

        let mut map = &mut self.root;
        for (i, part) in parents.iter().enumerate() {
            let entry = map
                .entry((*part).to_string())
                .or_insert_with(|| Value::Object(Map::new()));
            match entry {
                Value::Object(m) => map = m,
                _ => {
                    return Err(UnitError::PathType {
                        path: path.to_string(),
                        at: parts[..=i].join("."),
                    })
                }
            }
        }
        Ok(map.entry((*last).to_string()).or_insert(Value::Null))
    }
}
