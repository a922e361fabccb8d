//! Runtime events: types and broadcast bus.
//!
//! This module groups the event **data model** and the **bus** used to
//! publish/subscribe to observability events emitted by the perk registry,
//! the lifecycle core, status sync and subscriber workers.
//!
//! ## Contents
//! - [`EventKind`], [`Event`] event classification and metadata
//! - [`Bus`] thin wrapper over `tokio::sync::broadcast`
//!
//! ## Quick reference
//! - **Publishers**: `PerkRegistry`, `Runtime` (attach/detach, spells),
//!   `StatusSync` (status changes, waits), `SubscriberSet` workers (overflow/panic).
//! - **Consumers**: the runtime's subscriber listener, which fans out to
//!   [`SubscriberSet`](crate::SubscriberSet).
//!
//! See `core/mod.rs` for the system-level wiring diagram.

mod bus;
mod event;

pub use bus::Bus;
pub use event::{Event, EventKind};
