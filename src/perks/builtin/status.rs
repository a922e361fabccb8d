//! `status` perk: cross-unit start dependencies.
//!
//! ```json
//! { "status": { "timeout": 2000, "waitFor": ["db", {"tag": "x-auth", "status": "started"}] } }
//! ```
//!
//! - `timeout` (ms) becomes the unit's default wait timeout;
//! - `waitFor` delays `start` after `beforeStart` until every expectation holds.

use async_trait::async_trait;
use serde_json::Value;

use crate::core::Runtime;
use crate::dispatch::{EventCtx, Handler, ListenOptions};
use crate::error::UnitError;
use crate::perks::Perk;
use crate::status::{Expectation, WaitOptions};
use crate::units::UnitRef;

/// Order of the `beforeStart` wait listener; runs ahead of default-ordered listeners.
const WAIT_ORDER: i32 = 0;

/// Built-in `status` perk.
#[derive(Clone, Copy, Debug, Default)]
pub struct StatusPerk;

impl StatusPerk {
    fn expectations(unit: &UnitRef) -> Result<Vec<Expectation>, UnitError> {
        match unit.settings().get("status.waitFor") {
            None | Some(Value::Null) => Ok(Vec::new()),
            Some(Value::Array(items)) => items.iter().map(Expectation::from_value).collect(),
            Some(single) => Ok(vec![Expectation::from_value(&single)?]),
        }
    }
}

#[async_trait]
impl Perk for StatusPerk {
    fn name(&self) -> &str {
        "status"
    }

    fn order(&self) -> Option<i32> {
        Some(100)
    }

    async fn init_for_unit(&self, rt: &Runtime, unit: &UnitRef) -> Result<(), UnitError> {
        if let Some(v) = unit.settings().get("status.timeout") {
            if v.as_u64().is_none() {
                return Err(UnitError::InvalidSetting {
                    path: "status.timeout".into(),
                    reason: format!("expected milliseconds, got {v}"),
                });
            }
        }

        let expectations = Self::expectations(unit)?;
        if expectations.is_empty() {
            return Ok(());
        }

        let handler = Handler::future("status.waitFor", move |ctx: EventCtx| {
            let expectations = expectations.clone();
            async move {
                let unit = ctx.bound_unit("status.waitFor")?.clone();
                ctx.runtime
                    .wait_for(Some(&unit), expectations, WaitOptions::default())
                    .await
            }
        });
        rt.add_listener(
            &unit.element(),
            "beforeStart",
            handler,
            ListenOptions::ordered(WAIT_ORDER).bind(unit.clone()),
        );
        Ok(())
    }
}
