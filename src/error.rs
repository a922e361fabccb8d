//! Error types used by the unitvisor runtime.
//!
//! Everything fallible in the runtime returns [`UnitError`]. Most variants are
//! fatal by contract (illegal transitions, unresolvable references, dependency
//! cycles); only [`UnitError::WaitTimeout`] and [`UnitError::Load`] are meant to
//! be handled by callers (retry, abort or propagate).
//!
//! Like the rest of the crate, the enum provides `as_label` for logs and a
//! classification helper [`UnitError::is_recoverable`].

use std::time::Duration;
use thiserror::Error;

/// # Errors produced by the runtime, its perks and event handlers.
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq)]
pub enum UnitError {
    /// A status change violated the busy-state completion rule.
    #[error("illegal transition for unit {unit}: {from} -> {to} (expected {expected})")]
    IllegalTransition {
        /// Unit id.
        unit: String,
        /// Current (busy) status.
        from: String,
        /// Requested status.
        to: String,
        /// The only status accepted from `from`.
        expected: String,
    },

    /// A named perk, section, handler, class or unit could not be resolved.
    #[error("{kind} not found: {name}")]
    NotFound {
        /// What was looked up (`perk`, `section`, `handler`, `class`, `unit`).
        kind: &'static str,
        /// The name that failed to resolve.
        name: String,
    },

    /// A settings path crosses a value that is not a map.
    #[error("settings path {path:?} crosses a non-map value at {at:?}")]
    PathType {
        /// Full dot path being written.
        path: String,
        /// Prefix where the scalar was found.
        at: String,
    },

    /// A settings value has the wrong shape for the perk reading it.
    #[error("invalid setting {path}: {reason}")]
    InvalidSetting {
        /// Dot path of the offending value.
        path: String,
        /// What was expected.
        reason: String,
    },

    /// A perk claimed a section that another perk already owns.
    #[error("section {section:?} claimed by {existing} and {perk}")]
    SectionConflict {
        /// Contested section name.
        section: String,
        /// Perk that owns the section.
        existing: String,
        /// Perk that tried to claim it.
        perk: String,
    },

    /// A perk with the same name is already registered.
    #[error("perk {name:?} already registered")]
    DuplicatePerk {
        /// Perk name.
        name: String,
    },

    /// Another connected unit already holds this id.
    #[error("unit id {id:?} already in use")]
    DuplicateUnit {
        /// Contested unit id.
        id: String,
    },

    /// Perk dependencies form a cycle.
    #[error("perk dependency cycle: {}", path.join(" -> "))]
    DependencyCycle {
        /// Perk names along the cycle, first name repeated at the end.
        path: Vec<String>,
    },

    /// A status wait was not satisfied in time.
    #[error("wait by {waiter} timed out after {timeout:?}; unsatisfied: {}", unsatisfied.join(", "))]
    WaitTimeout {
        /// Waiting unit id (or `-` for anonymous waits).
        waiter: String,
        /// Configured timeout.
        timeout: Duration,
        /// Human-readable dump of each unsatisfied expectation.
        unsatisfied: Vec<String>,
    },

    /// An external resource (settings, skin, data) failed to load.
    #[error("failed to load {resource}: {reason}")]
    Load {
        /// Resource location.
        resource: String,
        /// Underlying failure.
        reason: String,
    },

    /// An event handler, spell or perk initializer failed.
    #[error("handler {handler} failed: {reason}")]
    Handler {
        /// Handler, spell or perk name.
        handler: String,
        /// Failure message.
        reason: String,
    },
}

impl UnitError {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    ///
    /// # Example
    /// ```
    /// use unitvisor::UnitError;
    ///
    /// let err = UnitError::NotFound { kind: "perk", name: "x".into() };
    /// assert_eq!(err.as_label(), "unit_not_found");
    /// ```
    pub fn as_label(&self) -> &'static str {
        match self {
            UnitError::IllegalTransition { .. } => "unit_illegal_transition",
            UnitError::NotFound { .. } => "unit_not_found",
            UnitError::PathType { .. } => "unit_path_type",
            UnitError::InvalidSetting { .. } => "unit_invalid_setting",
            UnitError::SectionConflict { .. } => "unit_section_conflict",
            UnitError::DuplicatePerk { .. } => "unit_duplicate_perk",
            UnitError::DuplicateUnit { .. } => "unit_duplicate_id",
            UnitError::DependencyCycle { .. } => "unit_dependency_cycle",
            UnitError::WaitTimeout { .. } => "unit_wait_timeout",
            UnitError::Load { .. } => "unit_load_failed",
            UnitError::Handler { .. } => "unit_handler_failed",
        }
    }

    /// Shorthand for a [`UnitError::Handler`] failure.
    pub fn handler(handler: impl Into<String>, reason: impl Into<String>) -> Self {
        UnitError::Handler {
            handler: handler.into(),
            reason: reason.into(),
        }
    }

    /// Shorthand for a [`UnitError::NotFound`] failure.
    pub fn not_found(kind: &'static str, name: impl Into<String>) -> Self {
        UnitError::NotFound {
            kind,
            name: name.into(),
        }
    }

    /// Indicates whether callers are expected to handle the error.
    ///
    /// Returns `true` for [`UnitError::WaitTimeout`] and [`UnitError::Load`],
    /// `false` for everything that signals a programming or configuration error.
    ///
    /// # Example
    /// ```
    /// use std::time::Duration;
    /// use unitvisor::UnitError;
    ///
    /// let timeout = UnitError::WaitTimeout {
    ///     waiter: "a".into(),
    ///     timeout: Duration::from_millis(100),
    ///     unsatisfied: vec![],
    /// };
    /// assert!(timeout.is_recoverable());
    ///
    /// let cycle = UnitError::DependencyCycle { path: vec!["x".into(), "x".into()] };
    /// assert!(!cycle.is_recoverable());
    /// ```
    pub fn is_recoverable(&self) -> bool {
        matches!(self, UnitError::WaitTimeout { .. } | UnitError::Load { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wait_timeout_message_lists_targets() {
        let err = UnitError::WaitTimeout {
            waiter: "w".into(),
            timeout: Duration::from_millis(100),
            unsatisfied: vec!["id=obj1 expected=ready actual=started".into()],
        };
        let msg = err.to_string();
        assert!(msg.contains("obj1"));
        assert!(msg.contains("100ms"));
    }

    #[test]
    fn cycle_message_joins_path() {
        let err = UnitError::DependencyCycle {
            path: vec!["a".into(), "b".into(), "a".into()],
        };
        assert_eq!(err.to_string(), "perk dependency cycle: a -> b -> a");
    }
}
