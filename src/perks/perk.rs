//! # Perk abstraction.
//!
//! A [`Perk`] is a named, orderable, dependency-aware capability module. It is
//! registered once per runtime and attached at most once per unit:
//!
//! ```text
//! register(perk) ──► perk.global_init(&mut hooks)          (once per runtime)
//! attach(unit)   ──► deps first ──► perk.init_for_unit(rt, unit)   (once per unit)
//! detach(unit)   ──► perk.deinit_for_unit(rt, unit)        (reverse attach order)
//! ```
//!
//! Perks usually read their own settings section
//! (`unit.settings().get(perk.section())`), register listeners on the unit's
//! element, and add skills/spells to the unit's asset table.
//!
//! # Example
//! ```
//! use async_trait::async_trait;
//! use unitvisor::{Perk, Runtime, UnitError, UnitRef};
//!
//! struct Audit;
//!
//! #[async_trait]
//! impl Perk for Audit {
//!     fn name(&self) -> &str { "audit" }
//!     fn order(&self) -> Option<i32> { Some(900) }
//!
//!     async fn init_for_unit(&self, _rt: &Runtime, unit: &UnitRef) -> Result<(), UnitError> {
//!         unit.stash("audit.enabled", serde_json::json!(true));
//!         Ok(())
//!     }
//! }
//! ```

use std::sync::Arc;

use async_trait::async_trait;

use crate::core::Runtime;
use crate::error::UnitError;
use crate::perks::hooks::Hooks;
use crate::units::UnitRef;

/// Shared handle to a perk.
pub type PerkRef = Arc<dyn Perk>;

/// Capability module attachable to units.
#[async_trait]
pub trait Perk: Send + Sync + 'static {
    /// Unique perk name.
    fn name(&self) -> &str;

    /// Settings section the perk claims (defaults to its name).
    ///
    /// A top-level settings key equal to the section implies the perk.
    fn section(&self) -> &str {
        self.name()
    }

    /// Attachment order; `None` uses the runtime default (500).
    fn order(&self) -> Option<i32> {
        None
    }

    /// Perks that must be attached before this one.
    fn depends(&self) -> Vec<String> {
        Vec::new()
    }

    /// One-time initializer run at registration; may register lifecycle hooks.
    fn global_init(&self, _hooks: &mut Hooks) -> Result<(), UnitError> {
        Ok(())
    }

    /// Per-unit initializer, run once when the perk is attached to `unit`.
    async fn init_for_unit(&self, rt: &Runtime, unit: &UnitRef) -> Result<(), UnitError>;

    /// Per-unit teardown, run when the unit is detached.
    async fn deinit_for_unit(&self, _rt: &Runtime, _unit: &UnitRef) -> Result<(), UnitError> {
        Ok(())
    }
}
