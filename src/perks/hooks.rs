//! Lifecycle hooks registered by perks during global initialization.
//!
//! Hooks run synchronously, in registration order, whenever the runtime
//! processes the matching host notification, for every unit (whether or not the
//! registering perk is attached to it).

use std::fmt;
use std::sync::Arc;

use crate::core::Runtime;
use crate::error::UnitError;
use crate::units::UnitRef;

/// Host notification a hook is bound to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum HookPoint {
    /// First attach notification, after indexing and before perks attach.
    Connected,
    /// Detach notification, after the stop spell.
    Disconnected,
    /// Re-parent notification.
    Adopted,
    /// Attribute change notification, after settings were updated.
    AttributeChanged,
}

/// Hook callback.
pub type Hook = Arc<dyn Fn(&Runtime, &UnitRef) -> Result<(), UnitError> + Send + Sync>;

#[derive(Clone)]
pub(crate) struct HookEntry {
    pub(crate) point: HookPoint,
    pub(crate) owner: Arc<str>,
    pub(crate) hook: Hook,
}

/// Collector handed to [`Perk::global_init`](crate::Perk::global_init).
#[derive(Default)]
pub struct Hooks {
    pub(crate) entries: Vec<HookEntry>,
}

impl Hooks {
    /// Registers `f` for `point`.
    pub fn on<F>(&mut self, point: HookPoint, f: F)
    where
        F: Fn(&Runtime, &UnitRef) -> Result<(), UnitError> + Send + Sync + 'static,
    {
        self.entries.push(HookEntry {
            point,
            owner: Arc::from(""),
            hook: Arc::new(f),
        });
    }

    /// Number of registered hooks.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if no hook was registered.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl fmt::Debug for Hooks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(self.entries.iter().map(|e| (e.point, &e.owner)))
            .finish()
    }
}
