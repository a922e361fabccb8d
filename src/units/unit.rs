//! # Managed units.
//!
//! A [`Unit`] is one lifecycle-managed entity. Its identity (id, tag, class,
//! name) is fixed at creation; everything else, including the composing parent,
//! lives behind a short-lived mutex and is reached through accessors:
//!
//! | Namespace   | Accessors                                  | Contents                          |
//! |-------------|--------------------------------------------|-----------------------------------|
//! | `inventory` | [`Unit::inventory`], [`Unit::stash`]        | free-form JSON values             |
//! | `skill`     | [`Unit::add_skill`], [`Unit::skill`]        | synchronous named handlers        |
//! | `spell`     | [`Unit::add_spell`], [`Unit::spell`]        | async handlers / spell overrides  |
//! | `setting`   | [`Unit::settings`]                          | the unit's [`ChainableStore`]     |
//! | `perk`      | [`Unit::perks`], [`Unit::has_perk`]         | attached perk names, in order     |
//!
//! Status changes go through [`StatusSync`](crate::StatusSync) so that waiters
//! are re-evaluated; the unit itself only stores the current value.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde_json::{Map, Value};

use crate::dispatch::{Element, Handler};
use crate::store::ChainableStore;
use crate::units::class::UnitClass;
use crate::units::status::Status;

/// Shared handle to a unit.
pub type UnitRef = Arc<Unit>;

/// Creation parameters supplied by the host.
///
/// ## Example
/// ```rust
/// use unitvisor::UnitSpec;
///
/// let spec = UnitSpec::new("x-card")
///     .with_id("card-1")
///     .with_attribute("basic.fetch", "false");
/// assert_eq!(spec.tag, "x-card");
/// ```
#[derive(Clone, Debug, Default)]
pub struct UnitSpec {
    /// Host tag; selects the class registered with `Runtime::define`.
    pub tag: String,
    /// User-supplied identifier; a random one is generated when absent.
    /// Whitespace is reserved for sub-element keys, so `connected` rejects
    /// ids containing it.
    pub id: Option<String>,
    /// Optional name (indexed).
    pub name: Option<String>,
    /// Host attributes (attribute-derived settings).
    pub attributes: BTreeMap<String, String>,
    /// Id of the composing parent unit.
    pub parent: Option<String>,
}

impl UnitSpec {
    /// Spec for a unit of `tag`.
    pub fn new(tag: impl Into<String>) -> Self {
        Self {
            tag: tag.into(),
            ..Self::default()
        }
    }

    /// Sets the user-supplied id.
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    /// Sets the name.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Adds a host attribute.
    pub fn with_attribute(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(name.into(), value.into());
        self
    }

    /// Sets the composing parent.
    pub fn with_parent(mut self, parent: impl Into<String>) -> Self {
        self.parent = Some(parent.into());
        self
    }
}

#[derive(Default)]
struct UnitState {
    status: Status,
    initialized: bool,
    parent: Option<String>,
    attributes: BTreeMap<String, String>,
    inventory: Map<String, Value>,
    skills: HashMap<String, Handler>,
    spells: HashMap<String, Handler>,
    perks: Vec<String>,
}

/// One lifecycle-managed entity.
pub struct Unit {
    id: Arc<str>,
    tag: String,
    class: Arc<UnitClass>,
    name: Option<String>,
    settings: Arc<ChainableStore>,
    state: Mutex<UnitState>,
}

impl Unit {
    pub(crate) fn new(
        spec: UnitSpec,
        class: Arc<UnitClass>,
        global: Arc<ChainableStore>,
    ) -> UnitRef {
        let id: Arc<str> = match spec.id {
            Some(id) => id.into(),
            None => uuid::Uuid::new_v4().to_string().into(),
        };
        Arc::new(Self {
            id,
            tag: spec.tag,
            class,
            name: spec.name,
            settings: Arc::new(ChainableStore::with_parent(global)),
            state: Mutex::new(UnitState {
                attributes: spec.attributes,
                parent: spec.parent,
                ..UnitState::default()
            }),
        })
    }

    /// Unique id.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Host tag.
    pub fn tag(&self) -> &str {
        &self.tag
    }

    /// Resolved class.
    pub fn class(&self) -> &Arc<UnitClass> {
        &self.class
    }

    /// Optional name.
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// Id of the composing parent.
    pub fn parent(&self) -> Option<String> {
        self.state().parent.clone()
    }

    /// Re-parents the unit; returns the previous parent.
    pub(crate) fn set_parent(&self, parent: Option<String>) -> Option<String> {
        std::mem::replace(&mut self.state().parent, parent)
    }

    /// The unit's own host element.
    pub fn element(&self) -> Element {
        Element::new(self.id.clone())
    }

    /// The `setting` namespace.
    pub fn settings(&self) -> &Arc<ChainableStore> {
        &self.settings
    }

    /// Current status.
    pub fn status(&self) -> Status {
        self.state().status.clone()
    }

    /// Applies the busy rule and stores `next` atomically.
    ///
    /// Returns the previous status, or `(current, expected completion)`.
    pub(crate) fn transition(&self, next: Status) -> Result<Status, (Status, Status)> {
        let mut st = self.state();
        match st.status.check_transition(&next) {
            Ok(()) => Ok(std::mem::replace(&mut st.status, next)),
            Err(expected) => Err((st.status.clone(), expected)),
        }
    }

    /// Returns `true` between the first attach notification and detach.
    pub fn is_initialized(&self) -> bool {
        self.state().initialized
    }

    /// Sets the initialized flag, returning the previous value.
    pub(crate) fn set_initialized(&self, on: bool) -> bool {
        std::mem::replace(&mut self.state().initialized, on)
    }

    /// Current host attributes.
    pub fn attributes(&self) -> BTreeMap<String, String> {
        self.state().attributes.clone()
    }

    /// Sets (`Some`) or removes (`None`) a host attribute; returns the old value.
    pub(crate) fn set_attribute(&self, name: &str, value: Option<String>) -> Option<String> {
        let mut st = self.state();
        match value {
            Some(v) => st.attributes.insert(name.to_string(), v),
            None => st.attributes.remove(name),
        }
    }

    /// Reads an inventory value.
    pub fn inventory(&self, key: &str) -> Option<Value> {
        self.state().inventory.get(key).cloned()
    }

    /// Stores an inventory value.
    pub fn stash(&self, key: impl Into<String>, value: Value) {
        self.state().inventory.insert(key.into(), value);
    }

    /// Removes an inventory value.
    pub fn unstash(&self, key: &str) -> Option<Value> {
        self.state().inventory.remove(key)
    }

    /// Registers a skill (synchronous named handler), keyed by the handler name.
    pub fn add_skill(&self, handler: Handler) {
        self.state()
            .skills
            .insert(handler.name().to_string(), handler);
    }

    /// Looks up a skill.
    pub fn skill(&self, name: &str) -> Option<Handler> {
        self.state().skills.get(name).cloned()
    }

    /// Registers a spell (async named handler), keyed by the handler name.
    ///
    /// A spell named like a lifecycle spell (`fetch`, `fill`, ...) replaces that
    /// spell's default delegated action.
    pub fn add_spell(&self, handler: Handler) {
        self.state()
            .spells
            .insert(handler.name().to_string(), handler);
    }

    /// Looks up a spell.
    pub fn spell(&self, name: &str) -> Option<Handler> {
        self.state().spells.get(name).cloned()
    }

    /// Resolves a handler name against skills first, then spells.
    pub fn handler(&self, name: &str) -> Option<Handler> {
        let st = self.state();
        st.skills
            .get(name)
            .or_else(|| st.spells.get(name))
            .cloned()
    }

    /// Attached perk names, in attachment order.
    pub fn perks(&self) -> Vec<String> {
        self.state().perks.clone()
    }

    /// Returns `true` if the perk is attached.
    pub fn has_perk(&self, name: &str) -> bool {
        self.state().perks.iter().any(|p| p == name)
    }

    /// Marks a perk attached; returns `false` if it already was.
    pub(crate) fn mark_perk(&self, name: &str) -> bool {
        let mut st = self.state();
        if st.perks.iter().any(|p| p == name) {
            return false;
        }
        st.perks.push(name.to_string());
        true
    }

    /// Clears the perk namespace, returning the names in attachment order.
    pub(crate) fn take_perks(&self) -> Vec<String> {
        std::mem::take(&mut self.state().perks)
    }

    fn state(&self) -> MutexGuard<'_, UnitState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl fmt::Debug for Unit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Unit")
            .field("id", &self.id)
            .field("tag", &self.tag)
            .field("class", &self.class.name())
            .field("status", &self.status())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unit(spec: UnitSpec) -> UnitRef {
        Unit::new(
            spec,
            Arc::new(UnitClass::new("plain")),
            Arc::new(ChainableStore::new()),
        )
    }

    #[test]
    fn generated_ids_are_unique() {
        let a = unit(UnitSpec::new("x"));
        let b = unit(UnitSpec::new("x"));
        assert_ne!(a.id(), b.id());
        assert_eq!(unit(UnitSpec::new("x").with_id("fixed")).id(), "fixed");
    }

    #[test]
    fn perk_marking_is_idempotent() {
        let u = unit(UnitSpec::new("x"));
        assert!(u.mark_perk("status"));
        assert!(!u.mark_perk("status"));
        assert!(u.mark_perk("event"));
        assert_eq!(u.perks(), ["status", "event"]);
        assert_eq!(u.take_perks(), ["status", "event"]);
        assert!(u.perks().is_empty());
    }

    #[test]
    fn handler_lookup_prefers_skills() {
        let u = unit(UnitSpec::new("x"));
        u.add_spell(Handler::future("go", |_ctx| async { Ok(()) }));
        assert!(u.handler("go").is_some_and(|h| h.is_async()));
        u.add_skill(Handler::sync("go", |_ctx| Ok(())));
        assert!(u.handler("go").is_some_and(|h| !h.is_async()));
        assert!(u.handler("missing").is_none());
    }

    #[test]
    fn inventory_round_trip() {
        let u = unit(UnitSpec::new("x"));
        u.stash("data", serde_json::json!({"k": 1}));
        assert_eq!(u.inventory("data"), Some(serde_json::json!({"k": 1})));
        assert_eq!(u.unstash("data"), Some(serde_json::json!({"k": 1})));
        assert_eq!(u.inventory("data"), None);
    }
}
