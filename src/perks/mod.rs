//! Perks: capability modules attachable to units.
//!
//! - [`Perk`] the capability contract, [`PerkFn`] its closure-backed form
//! - [`PerkRegistry`] registration, dependency planning and attachment
//! - [`Hooks`] lifecycle hooks collected during global initialization
//! - [`builtin`] the `status`, `event` and `unit` perks

pub mod builtin;
mod hooks;
mod perk;
mod perk_fn;
mod registry;

pub use hooks::{Hook, HookPoint, Hooks};
pub use perk::{Perk, PerkRef};
pub use perk_fn::PerkFn;
pub use registry::{PerkDescriptor, PerkRegistry, PERKS_KEY};
