//! # Parent-linked settings store.
//!
//! [`ChainableStore`] layers a local [`HierarchicalStore`] over an optional
//! parent chain. It backs every unit's `setting` namespace; the parent is the
//! runtime-wide global settings store.
//!
//! ## Read rules
//! ```text
//! key in local and parent  → deep_merge(parent, local)   (local wins on scalars)
//! key only in local        → local value, unmodified
//! key only in parent chain → parent value, unmodified
//! key nowhere              → None / caller default
//! ```
//!
//! ## Write rules
//! - [`ChainableStore::set`] / [`ChainableStore::merge`] only touch the local layer.
//! - [`ChainableStore::set_through`] writes the local layer **and** the parent,
//!   so siblings sharing the parent observe the value too.
//!
//! Locks are held only for the duration of a single read or write.

use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use serde_json::Value;

use crate::error::UnitError;
use crate::store::tree::{merged, HierarchicalStore};

/// Settings store with deep-merge read fallback to a parent store.
#[derive(Debug, Default)]
pub struct ChainableStore {
    local: RwLock<HierarchicalStore>,
    parent: Option<Arc<ChainableStore>>,
}

impl ChainableStore {
    /// Creates a root store (no parent).
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a root store seeded with `value`.
    pub fn from_value(value: Value) -> Self {
        Self {
            local: RwLock::new(HierarchicalStore::from_value(value)),
            parent: None,
        }
    }

    /// Creates an empty store chained to `parent`.
    pub fn with_parent(parent: Arc<ChainableStore>) -> Self {
        Self {
            local: RwLock::new(HierarchicalStore::new()),
            parent: Some(parent),
        }
    }

    /// Returns the parent store, if any.
    pub fn parent(&self) -> Option<&Arc<ChainableStore>> {
        self.parent.as_ref()
    }

    /// Reads `path` following the chain (see module docs for the merge rule).
    pub fn get(&self, path: &str) -> Option<Value> {
        let local = self.read().get(path).cloned();
        let inherited = self.parent.as_ref().and_then(|p| p.get(path));
        match (inherited, local) {
            (Some(p), Some(l)) => Some(merged(&p, &l)),
            (p, l) => l.or(p),
        }
    }

    /// Reads `path`, returning `default` when no layer defines it.
    pub fn get_or(&self, path: &str, default: Value) -> Value {
        self.get(path).unwrap_or(default)
    }

    /// Reads a boolean flag. JSON booleans are taken as-is; strings `"false"`,
    /// `"0"`, `"no"` and `""` are false; any other present value is true.
    pub fn flag(&self, path: &str, default: bool) -> bool {
        match self.get(path) {
            None | Some(Value::Null) => default,
            Some(Value::Bool(b)) => b,
            Some(Value::String(s)) => !matches!(s.as_str(), "" | "false" | "0" | "no"),
            Some(Value::Number(n)) => n.as_f64() != Some(0.0),
            Some(_) => true,
        }
    }

    /// Returns `true` if any layer defines `path`.
    pub fn contains(&self, path: &str) -> bool {
        self.read().contains(path) || self.parent.as_ref().is_some_and(|p| p.contains(path))
    }

    /// Replaces `path` in the local layer.
    pub fn set(&self, path: &str, value: Value) -> Result<(), UnitError> {
        self.write().set(path, value)
    }

    /// Replaces `path` in the local layer and in the parent (when present).
    pub fn set_through(&self, path: &str, value: Value) -> Result<(), UnitError> {
        if let Some(parent) = &self.parent {
            parent.set(path, value.clone())?;
        }
        self.set(path, value)
    }

    /// Deep-merges `value` into the local layer at `path` (`""` = root).
    pub fn merge(&self, path: &str, value: &Value) -> Result<(), UnitError> {
        self.write().merge(path, value)
    }

    /// Removes `path` from the local layer.
    pub fn remove(&self, path: &str) -> Option<Value> {
        self.write().remove(path)
    }

    /// Replaces the whole local layer.
    pub fn replace_local(&self, store: HierarchicalStore) {
        *self.write() = store;
    }

    /// Returns the local layer only.
    pub fn local(&self) -> Value {
        self.read().to_value()
    }

    /// Top-level keys defined by the local layer.
    pub fn local_keys(&self) -> Vec<String> {
        self.read().keys().map(str::to_string).collect()
    }

    /// Returns the effective tree: parent chain deep-merged with the local layer.
    pub fn snapshot(&self) -> Value {
        let local = self.local();
        match &self.parent {
            Some(p) => merged(&p.snapshot(), &local),
            None => local,
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, HierarchicalStore> {
        self.local.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, HierarchicalStore> {
        self.local.write().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn chained(parent: Value, local: Value) -> ChainableStore {
        let store = ChainableStore::with_parent(Arc::new(ChainableStore::from_value(parent)));
        store.merge("", &local).unwrap();
        store
    }

    #[test]
    fn both_sides_deep_merge_with_local_precedence() {
        let store = chained(
            json!({"basic": {"refresh": true, "fetch": true}}),
            json!({"basic": {"fetch": false}}),
        );
        assert_eq!(
            store.get("basic"),
            Some(json!({"refresh": true, "fetch": false}))
        );
    }

    #[test]
    fn single_side_value_is_returned_unmodified() {
        let store = chained(json!({"a": {"x": 1}}), json!({"b": [1, 2]}));
        assert_eq!(store.get("a"), Some(json!({"x": 1})));
        assert_eq!(store.get("b"), Some(json!([1, 2])));
        assert_eq!(store.get("c"), None);
        assert_eq!(store.get_or("c", json!("dflt")), json!("dflt"));
    }

    #[test]
    fn scalar_conflict_takes_local() {
        let store = chained(json!({"status": {"timeout": 10}}), json!({"status": {"timeout": 99}}));
        assert_eq!(store.get("status.timeout"), Some(json!(99)));
    }

    #[test]
    fn grandparent_values_are_visible() {
        let root = Arc::new(ChainableStore::from_value(json!({"g": {"a": 1}})));
        let mid = Arc::new(ChainableStore::with_parent(root));
        mid.set("g.b", json!(2)).unwrap();
        let leaf = ChainableStore::with_parent(mid);
        leaf.set("g.c", json!(3)).unwrap();
        assert_eq!(leaf.get("g"), Some(json!({"a": 1, "b": 2, "c": 3})));
    }

    #[test]
    fn set_through_reaches_parent() {
        let parent = Arc::new(ChainableStore::new());
        let a = ChainableStore::with_parent(parent.clone());
        let b = ChainableStore::with_parent(parent.clone());
        a.set_through("shared.x", json!(1)).unwrap();
        assert_eq!(b.get("shared.x"), Some(json!(1)));

        a.set("private", json!(true)).unwrap();
        assert_eq!(b.get("private"), None);
    }

    #[test]
    fn flag_reads_loose_booleans() {
        let store = ChainableStore::from_value(json!({
            "a": false, "b": "false", "c": "yes", "d": 0, "e": 1
        }));
        assert!(!store.flag("a", true));
        assert!(!store.flag("b", true));
        assert!(store.flag("c", false));
        assert!(!store.flag("d", true));
        assert!(store.flag("e", false));
        assert!(store.flag("missing", true));
    }

    #[test]
    fn snapshot_merges_chain() {
        let store = chained(json!({"a": 1, "m": {"x": 1}}), json!({"m": {"y": 2}}));
        assert_eq!(store.snapshot(), json!({"a": 1, "m": {"x": 1, "y": 2}}));
    }
}
