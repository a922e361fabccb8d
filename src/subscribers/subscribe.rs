//! # Subscriber contract.
//!
//! A [`Subscribe`] implementation observes the runtime's [`Event`] stream:
//! perk attachment, status transitions, spells, waits. The
//! [`SubscriberSet`](crate::subscribers::SubscriberSet) gives each subscriber its
//! own worker and bounded queue, so a slow subscriber only delays itself. When
//! its queue is full, events for it are dropped and a `SubscriberOverflow`
//! event is published instead.
//!
//! ## Example
//! ```rust
//! use std::sync::atomic::{AtomicUsize, Ordering};
//! use unitvisor::{Event, EventKind, Subscribe};
//!
//! #[derive(Default)]
//! struct ReadyCounter(AtomicUsize);
//!
//! #[async_trait::async_trait]
//! impl Subscribe for ReadyCounter {
//!     async fn on_event(&self, ev: &Event) {
//!         if ev.kind == EventKind::StatusChanged && ev.status.as_deref() == Some("ready") {
//!             self.0.fetch_add(1, Ordering::Relaxed);
//!         }
//!     }
//!     fn name(&self) -> &'static str { "ready-counter" }
//!     fn queue_capacity(&self) -> usize { 512 }
//! }
//! ```

use async_trait::async_trait;

use crate::events::Event;

/// Runtime event observer.
#[async_trait]
pub trait Subscribe: Send + Sync + 'static {
    /// Handles one event. Runs on the subscriber's worker task.
    async fn on_event(&self, event: &Event);

    /// Name used in overflow and panic events.
    fn name(&self) -> &'static str {
        std::any::type_name::<Self>()
    }

    /// Capacity of the subscriber's queue (minimum 1).
    fn queue_capacity(&self) -> usize {
        1024
    }
}
