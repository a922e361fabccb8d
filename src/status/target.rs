//! # Wait targets and expectations.
//!
//! A [`Target`] selects units (by id, name, tag, direct reference or predicate);
//! an [`Expectation`] pairs a target with the status it must reach.
//!
//! ## Selector semantics
//! - `Id` / `Unit` address exactly one unit.
//! - `Name`, `Tag` and `Query` may match several units: at least one must match
//!   and **every** match must satisfy the expected status.
//! - A target that matches nothing is unsatisfied (the unit may not exist yet).

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;

use crate::error::UnitError;
use crate::units::{Status, Unit, UnitIndex, UnitRef};

type Predicate = dyn Fn(&Unit) -> bool + Send + Sync;

/// Unit selector.
#[derive(Clone)]
pub enum Target {
    /// Unit with this id.
    Id(String),
    /// Units with this name.
    Name(String),
    /// Units with this tag.
    Tag(String),
    /// This exact unit.
    Unit(UnitRef),
    /// Units matching a predicate; the label is used in diagnostics.
    Query(Arc<str>, Arc<Predicate>),
}

impl Target {
    /// Predicate target.
    pub fn query<F>(label: impl Into<Arc<str>>, f: F) -> Self
    where
        F: Fn(&Unit) -> bool + Send + Sync + 'static,
    {
        Target::Query(label.into(), Arc::new(f))
    }

    /// Units currently selected.
    pub fn resolve(&self, index: &UnitIndex) -> Vec<UnitRef> {
        match self {
            Target::Id(id) => index.get(id).into_iter().collect(),
            Target::Name(name) => index.by_name(name),
            Target::Tag(tag) => index.by_tag(tag),
            Target::Unit(u) => vec![u.clone()],
            Target::Query(_, f) => index.all().into_iter().filter(|u| f(u)).collect(),
        }
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Target::Id(id) => write!(f, "id={id}"),
            Target::Name(n) => write!(f, "name={n}"),
            Target::Tag(t) => write!(f, "tag={t}"),
            Target::Unit(u) => write!(f, "unit={}", u.id()),
            Target::Query(label, _) => write!(f, "query={label}"),
        }
    }
}

impl fmt::Debug for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

/// Target plus expected status (default `ready`).
#[derive(Clone, Debug)]
pub struct Expectation {
    /// Units the expectation applies to.
    pub target: Target,
    /// Milestone the targets must have reached.
    pub status: Status,
}

impl Expectation {
    /// Expects `target` to be `ready`.
    pub fn new(target: Target) -> Self {
        Self {
            target,
            status: Status::READY,
        }
    }

    /// Shorthand for an id target.
    pub fn id(id: impl Into<String>) -> Self {
        Self::new(Target::Id(id.into()))
    }

    /// Overrides the expected status.
    pub fn with_status(mut self, status: impl Into<Status>) -> Self {
        self.status = status.into();
        self
    }

    /// Parses the declarative form used in settings:
    /// `{"id"|"name"|"tag": "...", "status": "..."}` or a bare id string.
    pub fn from_value(value: &Value) -> Result<Self, UnitError> {
        let invalid = || UnitError::InvalidSetting {
            path: "status.waitFor".into(),
            reason: format!("expected an id string or {{id|name|tag, status}} object, got {value}"),
        };
        match value {
            Value::String(id) => Ok(Self::id(id.clone())),
            Value::Object(m) => {
                let text = |k: &str| m.get(k).and_then(Value::as_str).map(str::to_string);
                let target = if let Some(id) = text("id") {
                    Target::Id(id)
                } else if let Some(name) = text("name") {
                    Target::Name(name)
                } else if let Some(tag) = text("tag") {
                    Target::Tag(tag)
                } else {
                    return Err(invalid());
                };
                let status = text("status").map_or(Status::READY, Status::from);
                Ok(Self { target, status })
            }
            _ => Err(invalid()),
        }
    }

    /// Returns `true` when every selected unit satisfies the status and at
    /// least one unit is selected.
    pub fn is_satisfied(&self, index: &UnitIndex) -> bool {
        let units = self.target.resolve(index);
        !units.is_empty() && units.iter().all(|u| u.status().satisfies(&self.status))
    }

    /// Diagnostic line naming the target, the expectation and what was found.
    pub fn describe(&self, index: &UnitIndex) -> String {
        let units = self.target.resolve(index);
        let actual = if units.is_empty() {
            "missing".to_string()
        } else {
            units
                .iter()
                .map(|u| format!("{}:{}", u.id(), u.status()))
                .collect::<Vec<_>>()
                .join("|")
        };
        format!("{} expected={} actual={actual}", self.target, self.status)
    }
}

impl From<Target> for Expectation {
    fn from(target: Target) -> Self {
        Expectation::new(target)
    }
}

/// Per-call wait options.
#[derive(Clone, Copy, Debug, Default)]
pub struct WaitOptions {
    /// Overrides the waiter's/runtime's default timeout.
    pub timeout: Option<Duration>,
}

impl WaitOptions {
    /// Options with an explicit timeout.
    pub fn timeout(timeout: Duration) -> Self {
        Self {
            timeout: Some(timeout),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_declarative_expectations() {
        let e = Expectation::from_value(&json!("obj1")).unwrap();
        assert_eq!(e.target.to_string(), "id=obj1");
        assert_eq!(e.status, Status::READY);

        let e = Expectation::from_value(&json!({"tag": "x-db", "status": "started"})).unwrap();
        assert_eq!(e.target.to_string(), "tag=x-db");
        assert_eq!(e.status, Status::STARTED);

        assert!(Expectation::from_value(&json!({"status": "ready"})).is_err());
        assert!(Expectation::from_value(&json!(5)).is_err());
    }

    #[test]
    fn missing_target_is_unsatisfied() {
        let index = UnitIndex::new();
        let e = Expectation::id("ghost");
        assert!(!e.is_satisfied(&index));
        assert_eq!(e.describe(&index), "id=ghost expected=ready actual=missing");
    }
}
