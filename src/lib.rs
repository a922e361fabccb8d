//! # unitvisor
//!
//! **Unitvisor** is a component-lifecycle runtime for Rust.
//!
//! It manages long-lived, independently addressable **units**. Each unit moves
//! through `connected → starting → started → ready → stopping → stopped`, is
//! configured through layered, inheritable settings, and is extended at runtime
//! by **perks**: dependency-ordered capability modules that register behaviour
//! (listeners, skills, spells) into per-unit namespaces.
//!
//! ## Architecture
//! ### Overview
//! ```text
//!   Host platform
//!     │ connected / disconnected / adopted / attribute_changed
//!     ▼
//! ┌───────────────────────────────────────────────────────────────────┐
//! │  Runtime                                                          │
//! │  - UnitIndex     (by id, tag, class, name)                        │
//! │  - SettingsLayer (class defaults, attributes, external settings)  │
//! │  - PerkRegistry  (register, plan, attach_all, detach_all)         │
//! │  - StatusSync    (busy rule, wait-list, timeouts)                 │
//! │  - EventChain    (ordered listeners, trailing stop-propagation)   │
//! │  - Bus + SubscriberSet (observability)                            │
//! └──────┬──────────────────┬──────────────────┬──────────────────────┘
//!        ▼                  ▼                  ▼
//!    Unit "a"           Unit "b"           Unit "c"
//!    perks: status,     perks: status,     perks: status,
//!           event, …           event, …           event, …
//! ```
//!
//! ### Lifecycle
//! ```text
//! connected(unit)
//!   ├─► index, resolve settings, status "connected"
//!   ├─► attach perks (ascending order, dependencies first, once per unit)
//!   └─► start:
//!         beforeStart ─► "starting" ─► [transform] ─► doStart ─► [refresh]
//!         ─► "started" ─► afterStart ─► "ready" ─► afterReady
//!
//! disconnected(unit)
//!   └─► stop: "stopping" ─► beforeStop ─► doStop ─► "stopped" ─► afterStop
//!       ─► detach perks (reverse) ─► drop listeners ─► "disconnected"
//! ```
//!
//! ## Features
//! | Area             | Description                                                          | Key types / traits                          |
//! |------------------|----------------------------------------------------------------------|---------------------------------------------|
//! | **Perks**        | Named, ordered, dependency-aware capability modules.                 | [`Perk`], [`PerkFn`], [`PerkRegistry`]      |
//! | **Lifecycle**    | Async spells bracketed by `before*`/`do*`/`after*` events.           | [`Runtime`], [`Unit`], [`Status`]           |
//! | **Status sync**  | Cross-unit waits with milestone matching and deadlines.              | [`StatusSync`], [`Expectation`], [`Target`] |
//! | **Events**       | Ordered listener chains, sync or async handlers.                     | [`EventChain`], [`Handler`], [`ListenOptions`] |
//! | **Settings**     | Deep-merged, parent-chained JSON settings.                           | [`ChainableStore`], [`SettingsLayer`]       |
//! | **Observability**| Runtime events on a broadcast bus, fanned out to subscribers.        | [`Event`], [`Bus`], [`Subscribe`]           |
//!
//! ## Optional features
//! - `logging`: exports [`LogWriter`], a `tracing`-backed event subscriber.
//!
//! ## Example
//! ```rust
//! use serde_json::json;
//! use unitvisor::{Handler, PerkFn, Runtime, RuntimeConfig, Status, UnitClass, UnitError, UnitSpec};
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> Result<(), UnitError> {
//! let greeter = PerkFn::new("greeter", |_rt, unit| async move {
//!     unit.add_skill(Handler::sync("greet", |ctx| {
//!         let unit = ctx.bound_unit("greet")?;
//!         unit.stash("greeted", json!(true));
//!         Ok(())
//!     }));
//!     Ok::<_, UnitError>(())
//! });
//!
//! let rt = Runtime::builder(RuntimeConfig::default())
//!     .with_perk(greeter.into_ref())
//!     .build()?;
//! rt.define(
//!     "x-card",
//!     UnitClass::new("Card").with_defaults(json!({
//!         "perks": ["greeter"],
//!         "event": { "self": { "afterReady": "greet" } }
//!     })),
//! );
//!
//! let card = rt.create(UnitSpec::new("x-card").with_id("card-1"))?;
//! rt.connected(&card).await?;
//!
//! assert_eq!(card.status(), Status::READY);
//! assert_eq!(card.inventory("greeted"), Some(json!(true)));
//! assert_eq!(card.perks(), ["status", "greeter", "event", "unit"]);
//! # Ok(())
//! # }
//! ```

mod core;
mod dispatch;
mod error;
mod status;
mod units;

pub mod events;
pub mod perks;
pub mod settings;
pub mod store;
pub mod subscribers;

// ---- Public re-exports ----

pub use crate::core::{Host, NullHost, Runtime, RuntimeBuilder, RuntimeConfig, DATA_KEY};
pub use dispatch::{DispatchOutcome, Element, EventChain, EventCtx, Handler, ListenOptions, Payload};
pub use error::UnitError;
pub use events::{Bus, Event, EventKind};
pub use perks::{Hook, HookPoint, Hooks, Perk, PerkDescriptor, PerkFn, PerkRef, PerkRegistry};
pub use settings::{FsLoader, Loader, SettingsLayer, StaticLoader};
pub use status::{Expectation, StatusSync, Target, WaitFuture, WaitOptions};
pub use store::{ChainableStore, HierarchicalStore};
pub use units::{Status, Unit, UnitClass, UnitIndex, UnitRef, UnitSpec};

#[cfg(feature = "logging")]
pub use subscribers::LogWriter;
pub use subscribers::{Subscribe, SubscriberSet};
