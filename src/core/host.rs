//! # Host platform bridge.
//!
//! The runtime never touches the host platform directly. Everything
//! platform-specific (installing a native event dispatcher, propagating events
//! past the unit, materializing templates, rendering data) goes through a
//! [`Host`] implementation handed to the
//! [`RuntimeBuilder`](crate::RuntimeBuilder).
//!
//! Every method has a no-op default, so a host only overrides what it supports.
//! [`NullHost`] is the host used when none is configured.

use async_trait::async_trait;
use serde_json::Value;

use crate::dispatch::{Element, Payload};
use crate::error::UnitError;
use crate::units::UnitRef;

/// Callbacks into the host platform.
#[async_trait]
pub trait Host: Send + Sync + 'static {
    /// Called once per `(element, event)` when the first listener is added.
    fn install_dispatcher(&self, _element: &Element, _event: &str) {}

    /// Called after a dispatch in which no listener requested stop-propagation.
    fn propagate(&self, _element: &Element, _event: &str, _payload: &Payload) {}

    /// Default `transform` action: build the unit's visual structure.
    async fn materialize(&self, _unit: &UnitRef) -> Result<(), UnitError> {
        Ok(())
    }

    /// Default `setup` action.
    async fn setup(&self, _unit: &UnitRef) -> Result<(), UnitError> {
        Ok(())
    }

    /// Default `clear` action: drop previously rendered data.
    async fn clear(&self, _unit: &UnitRef) -> Result<(), UnitError> {
        Ok(())
    }

    /// Default `fill` action: render `data` (inventory key `data`, or `null`).
    async fn fill(&self, _unit: &UnitRef, _data: &Value) -> Result<(), UnitError> {
        Ok(())
    }
}

/// Host that does nothing.
#[derive(Clone, Copy, Debug, Default)]
pub struct NullHost;

impl Host for NullHost {}
