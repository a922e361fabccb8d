//! # Runtime events emitted by the registry, lifecycle core and status sync.
//!
//! The [`EventKind`] enum classifies event types across four categories:
//! - **Perk events**: registration and per-unit attachment
//! - **Unit events**: attach/detach notifications, status changes
//! - **Spell events**: lifecycle spell execution (starting, finished, failed)
//! - **Wait events**: cross-unit status waits (registered, resolved, timed out)
//!
//! These are *observability* events published on the [`Bus`](crate::events::Bus);
//! they are distinct from the named events dispatched to unit listeners through
//! the [`EventChain`](crate::EventChain).
//!
//! ## Ordering guarantees
//! Each event has a globally unique sequence number (`seq`) that increases monotonically.
//! Use `seq` to restore the exact order when events are delivered out of order.
//!
//! ## Example
//! ```rust
//! use unitvisor::{Event, EventKind};
//!
//! let ev = Event::new(EventKind::SpellFailed)
//!     .with_unit("card-1")
//!     .with_spell("fetch")
//!     .with_reason("boom");
//!
//! assert_eq!(ev.kind, EventKind::SpellFailed);
//! assert_eq!(ev.unit.as_deref(), Some("card-1"));
//! assert_eq!(ev.reason.as_deref(), Some("boom"));
//! ```

use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::sync::Arc;
use std::time::SystemTime;

/// Global sequence counter for event ordering.
static EVENT_SEQ: AtomicU64 = AtomicU64::new(0);

/// Classification of runtime events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    // === Subscriber events ===
    /// Subscriber panicked during event processing.
    ///
    /// Sets:
    /// - `unit`: subscriber name
    /// - `reason`: panic info/message
    SubscriberPanicked,

    /// Subscriber dropped an event (queue full or worker closed).
    ///
    /// Sets:
    /// - `unit`: subscriber name
    /// - `reason`: reason string (e.g., "full", "closed")
    SubscriberOverflow,

    // === Perk events ===
    /// A perk was registered and its global initializer ran.
    ///
    /// Sets:
    /// - `perk`: perk name
    PerkRegistered,

    /// A perk was attached to a unit (after `init_for_unit` returned).
    ///
    /// Sets:
    /// - `unit`: unit id
    /// - `perk`: perk name
    PerkAttached,

    /// A perk was detached from a unit.
    ///
    /// Sets:
    /// - `unit`: unit id
    /// - `perk`: perk name
    PerkDetached,

    // === Unit events ===
    /// First attach notification processed (unit indexed).
    ///
    /// Sets:
    /// - `unit`: unit id
    UnitAttached,

    /// Detach notification processed (unit pruned from the index).
    ///
    /// Sets:
    /// - `unit`: unit id
    UnitDetached,

    /// Unit status changed.
    ///
    /// Sets:
    /// - `unit`: unit id
    /// - `status`: new status
    /// - `reason`: previous status
    StatusChanged,

    // === Spell events ===
    /// A lifecycle spell began.
    ///
    /// Sets:
    /// - `unit`: unit id
    /// - `spell`: spell name
    SpellStarting,

    /// A lifecycle spell completed.
    ///
    /// Sets:
    /// - `unit`: unit id
    /// - `spell`: spell name
    SpellFinished,

    /// A lifecycle spell failed; the unit keeps the last status it reached.
    ///
    /// Sets:
    /// - `unit`: unit id
    /// - `spell`: spell name
    /// - `reason`: error message
    SpellFailed,

    // === Wait events ===
    /// A status wait could not be satisfied immediately and was registered.
    ///
    /// Sets:
    /// - `unit`: waiter id (if any)
    /// - `reason`: expectations
    WaitRegistered,

    /// A registered wait became satisfied.
    ///
    /// Sets:
    /// - `unit`: waiter id (if any)
    WaitResolved,

    /// A registered wait hit its timeout and was removed.
    ///
    /// Sets:
    /// - `unit`: waiter id (if any)
    /// - `reason`: unsatisfied expectations
    WaitTimedOut,
}

/// Runtime event with optional metadata.
///
/// - `seq`: monotonic global sequence for ordering
/// - `at`: wall-clock timestamp (for logs)
/// - other optional fields are set depending on the [`EventKind`]
#[derive(Clone, Debug)]
pub struct Event {
    /// Globally unique, monotonically increasing sequence number.
    pub seq: u64,
    /// Wall-clock timestamp.
    pub at: SystemTime,
    /// Event classification.
    pub kind: EventKind,

    /// Unit id (or subscriber name for subscriber events).
    pub unit: Option<Arc<str>>,
    /// Perk name.
    pub perk: Option<Arc<str>>,
    /// Spell name.
    pub spell: Option<Arc<str>>,
    /// Status value.
    pub status: Option<Arc<str>>,
    /// Human-readable reason (errors, previous status, overflow details, etc.).
    pub reason: Option<Arc<str>>,
}

impl Event {
    /// Creates a new event of the given kind with current timestamp and next sequence number.
    pub fn new(kind: EventKind) -> Self {
        Self {
            seq: EVENT_SEQ.fetch_add(1, AtomicOrdering::Relaxed),
            at: SystemTime::now(),
            kind,
            unit: None,
            perk: None,
            spell: None,
            status: None,
            reason: None,
        }
    }

    /// Attaches a unit id.
    #[inline]
    pub fn with_unit(mut self, unit: impl Into<Arc<str>>) -> Self {
        self.unit = Some(unit.into());
        self
    }

    /// Attaches a perk name.
    #[inline]
    pub fn with_perk(mut self, perk: impl Into<Arc<str>>) -> Self {
        self.perk = Some(perk.into());
        self
    }

    /// Attaches a spell name.
    #[inline]
    pub fn with_spell(mut self, spell: impl Into<Arc<str>>) -> Self {
        self.spell = Some(spell.into());
        self
    }

    /// Attaches a status value.
    #[inline]
    pub fn with_status(mut self, status: impl Into<Arc<str>>) -> Self {
        self.status = Some(status.into());
        self
    }

    /// Attaches a human-readable reason.
    #[inline]
    pub fn with_reason(mut self, reason: impl Into<Arc<str>>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    /// Creates a subscriber overflow event.
    #[inline]
    pub fn subscriber_overflow(subscriber: &'static str, reason: &'static str) -> Self {
        Event::new(EventKind::SubscriberOverflow)
            .with_unit(subscriber)
            .with_reason(format!("subscriber={subscriber} reason={reason}"))
    }

    /// Creates a subscriber panic event.
    #[inline]
    pub fn subscriber_panicked(subscriber: &'static str, info: String) -> Self {
        Event::new(EventKind::SubscriberPanicked)
            .with_unit(subscriber)
            .with_reason(info)
    }

    #[inline]
    pub fn is_subscriber_overflow(&self) -> bool {
        matches!(self.kind, EventKind::SubscriberOverflow)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sequence_is_monotonic() {
        let a = Event::new(EventKind::UnitAttached);
        let b = Event::new(EventKind::UnitDetached);
        assert!(b.seq > a.seq);
    }

    #[test]
    fn overflow_helper_sets_fields() {
        let ev = Event::subscriber_overflow("log", "full");
        assert!(ev.is_subscriber_overflow());
        assert_eq!(ev.unit.as_deref(), Some("log"));
        assert_eq!(ev.reason.as_deref(), Some("subscriber=log reason=full"));
    }
}
