//! # Global runtime configuration.
//!
//! Provides [`RuntimeConfig`], the centralized settings for a [`Runtime`](crate::Runtime).
//!
//! Config is used in three places:
//! 1. **Runtime creation**: `RuntimeBuilder::new(config)` sizes the event bus.
//! 2. **Perk registration**: perks without an explicit order get `default_order`.
//! 3. **Unit lifecycle**: `default_perks`, `settings_path` and `wait_timeout` apply
//!    to every unit unless its settings override them.
//!
//! ## Sentinel values
//! - `bus_capacity = 0` → clamped to 1
//! - `wait_timeout = 0s` → waits that are not satisfied immediately fail at once

use std::time::Duration;

/// Global configuration for the unit runtime.
///
/// ## Field semantics
/// - `bus_capacity`: Event bus ring buffer size (min 1; clamped by Bus)
/// - `wait_timeout`: Default status-wait timeout (unit `status.timeout` and
///   per-call options take precedence)
/// - `default_order`: Attachment order of perks that declare none
/// - `default_perks`: Perks attached to every unit
/// - `settings_path`: Directory of externally referenced settings documents
///
/// ## Notes
/// All fields are public for flexibility; the helper accessors keep sentinel
/// checks in one place.
#[derive(Clone, Debug)]
pub struct RuntimeConfig {
    /// Capacity of the event bus broadcast channel ring buffer.
    ///
    /// Slow subscribers that lag behind more than `bus_capacity` messages will
    /// receive `Lagged` and skip older items.
    pub bus_capacity: usize,

    /// Default timeout of `Runtime::wait_for`.
    pub wait_timeout: Duration,

    /// Attachment order for perks that do not declare one.
    pub default_order: i32,

    /// Perks attached to every unit, in addition to those its settings imply.
    pub default_perks: Vec<String>,

    /// Directory prefix of external settings documents.
    pub settings_path: String,
}

impl RuntimeConfig {
    /// Returns a bus capacity clamped to a minimum of 1.
    #[inline]
    pub fn bus_capacity_clamped(&self) -> usize {
        self.bus_capacity.max(1)
    }

    /// Returns `true` if `perk` is attached to every unit.
    #[inline]
    pub fn is_default_perk(&self, perk: &str) -> bool {
        self.default_perks.iter().any(|p| p == perk)
    }
}

impl Default for RuntimeConfig {
    /// Default configuration:
    ///
    /// - `bus_capacity = 1024`
    /// - `wait_timeout = 10s`
    /// - `default_order = 500`
    /// - `default_perks = ["status", "event", "unit"]` (the built-in perks)
    /// - `settings_path = "settings/"`
    fn default() -> Self {
        Self {
            bus_capacity: 1024,
            wait_timeout: Duration::from_secs(10),
            default_order: 500,
            default_perks: vec!["status".into(), "event".into(), "unit".into()],
            settings_path: "settings/".into(),
        }
    }
}
