//! # Unit classes.
//!
//! A [`UnitClass`] names a kind of unit and carries its default settings. Classes
//! form an explicit single-inheritance chain: [`UnitClass::lineage`] walks it from
//! the most-base class to the most-derived one, which is the order in which the
//! settings layer merges defaults.
//!
//! ## Example
//! ```rust
//! use std::sync::Arc;
//! use serde_json::json;
//! use unitvisor::UnitClass;
//!
//! let base = Arc::new(UnitClass::new("base").with_defaults(json!({"basic": {"fetch": false}})));
//! let card = UnitClass::new("card")
//!     .extends(base)
//!     .with_defaults(json!({"basic": {"fill": false}}));
//!
//! assert_eq!(card.default_settings(), json!({"basic": {"fetch": false, "fill": false}}));
//! ```

use std::sync::Arc;

use serde_json::{json, Value};

use crate::store::deep_merge;

/// Named unit kind with inheritable default settings.
#[derive(Debug, Clone)]
pub struct UnitClass {
    name: String,
    parent: Option<Arc<UnitClass>>,
    defaults: Value,
}

impl UnitClass {
    /// Creates a root class with empty defaults.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            parent: None,
            defaults: json!({}),
        }
    }

    /// Sets the parent class.
    pub fn extends(mut self, parent: Arc<UnitClass>) -> Self {
        self.parent = Some(parent);
        self
    }

    /// Sets this class's own default settings.
    pub fn with_defaults(mut self, defaults: Value) -> Self {
        self.defaults = defaults;
        self
    }

    /// Class name (used by the class index).
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Parent class, if any.
    pub fn parent(&self) -> Option<&Arc<UnitClass>> {
        self.parent.as_ref()
    }

    /// This class's own defaults, without inherited ones.
    pub fn own_defaults(&self) -> &Value {
        &self.defaults
    }

    /// Classes from the most-base to `self`.
    pub fn lineage(&self) -> Vec<&UnitClass> {
        let mut chain = vec![self];
        let mut cur = self.parent.as_deref();
        while let Some(c) = cur {
            chain.push(c);
            cur = c.parent.as_deref();
        }
        chain.reverse();
        chain
    }

    /// Returns `true` if `self` is `name` or inherits from it.
    pub fn is_a(&self, name: &str) -> bool {
        self.lineage().iter().any(|c| c.name == name)
    }

    /// Defaults of the whole lineage merged base-to-derived.
    pub fn default_settings(&self) -> Value {
        let mut out = json!({});
        for class in self.lineage() {
            deep_merge(&mut out, &class.defaults);
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lineage_is_base_first() {
        let a = Arc::new(UnitClass::new("a"));
        let b = Arc::new(UnitClass::new("b").extends(a));
        let c = UnitClass::new("c").extends(b);
        let names: Vec<&str> = c.lineage().iter().map(|k| k.name()).collect();
        assert_eq!(names, ["a", "b", "c"]);
        assert!(c.is_a("a"));
        assert!(!c.is_a("z"));
    }

    #[test]
    fn derived_defaults_override_base() {
        let a = Arc::new(UnitClass::new("a").with_defaults(json!({"x": 1, "m": {"p": 1}})));
        let b = UnitClass::new("b")
            .extends(a)
            .with_defaults(json!({"x": 2, "m": {"q": 2}}));
        assert_eq!(b.default_settings(), json!({"x": 2, "m": {"p": 1, "q": 2}}));
    }
}
