//! Ordered event dispatch.
//!
//! - [`payload`]: open key/value event payloads;
//! - [`listener`]: elements, handlers and listener options;
//! - [`chain`]: per-`(element, event)` ordered listener chains.

mod chain;
mod listener;
mod payload;

pub use chain::{DispatchOutcome, EventChain};
pub use listener::{Element, EventCtx, Handler, ListenOptions};
pub use payload::Payload;
