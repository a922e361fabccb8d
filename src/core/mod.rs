//! Runtime core: orchestration and lifecycle.
//!
//! Internal modules:
//! - [`runtime`]: the [`Runtime`] handle, host notifications, status and event API;
//! - [`spells`]: the async lifecycle spells (start, stop, refresh, ...);
//! - [`builder`]: assembles a runtime from config, perks, host and loader;
//! - [`config`]: global configuration;
//! - [`host`]: the host platform bridge.

mod builder;
mod config;
mod host;
mod runtime;
mod spells;

pub use builder::RuntimeBuilder;
pub use config::RuntimeConfig;
pub use host::{Host, NullHost};
pub use runtime::Runtime;
pub use spells::DATA_KEY;
