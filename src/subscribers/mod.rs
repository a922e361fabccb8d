//! # Event subscribers for the unitvisor runtime.
//!
//! This module provides the [`Subscribe`] trait and the [`SubscriberSet`] that
//! fans runtime events out to every subscriber.
//!
//! ## Architecture
//! ```text
//! Event flow:
//!   PerkRegistry / Runtime / StatusSync ── publish(Event) ──► Bus
//!                                                              │
//!                                          subscriber listener (in Runtime)
//!                                                              │
//!                                                   SubscriberSet::emit(&Event)
//!                                                 ┌────────────┼────────────┐
//!                                                 ▼            ▼            ▼
//!                                             LogWriter     Metrics      Custom
//! ```
//!
//! ## Subscriber types
//! - **Passive subscribers** - observe and react to events (logging, metrics, alerts)
//! - **Stateful subscribers** - maintain internal state based on events (dashboards, audits)

#[cfg(feature = "logging")]
mod log;
mod subscribe;
mod subscriber_set;

#[cfg(feature = "logging")]
pub use log::LogWriter;
pub use subscribe::Subscribe;
pub use subscriber_set::SubscriberSet;
