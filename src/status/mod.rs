//! Cross-unit status synchronization.
//!
//! - [`StatusSync`] status transitions and the global wait-list
//! - [`Target`], [`Expectation`] what to wait for
//! - [`WaitOptions`] per-call timeout override

mod sync;
mod target;

pub use sync::{StatusSync, WaitFuture};
pub use target::{Expectation, Target, WaitOptions};
