//! Unit settings: layered resolution and external loaders.

mod layer;
mod loader;

pub use layer::{attribute_settings, parse_attribute, SettingsLayer, SETTINGS_ATTRIBUTE};
pub use loader::{FsLoader, Loader, StaticLoader};
