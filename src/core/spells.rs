//! # Lifecycle spells.
//!
//! Spells are async, event-bracketed lifecycle operations. Every event fire is
//! awaited before the next step, so side effects of one unit are strictly
//! serialized; different units interleave freely.
//!
//! ```text
//! start:   apply attribute settings
//!          ─► beforeStart ─► status starting
//!          ─► transform (basic.transform, default off)
//!          ─► doStart ─► refresh (basic.refresh, default on)
//!          ─► status started ─► afterStart ─► status ready ─► afterReady
//!
//! stop:    status stopping ─► beforeStop ─► doStop ─► status stopped ─► afterStop
//!
//! transform | setup | refresh | fetch | fill | clear:
//!          before<Spell> ─► action ─► do<Spell> ─► after<Spell>
//!
//! refresh action: clear (basic.clear) ─► fetch (basic.fetch) ─► fill (basic.fill)
//! ```
//!
//! The action of an envelope spell is the unit's own spell of the same name
//! when one is registered (`unit.add_spell`); otherwise the default:
//!
//! | spell       | default action                                         |
//! |-------------|--------------------------------------------------------|
//! | `transform` | `Host::materialize`                                    |
//! | `setup`     | `Host::setup`                                          |
//! | `clear`     | drop inventory `data`, `Host::clear`                   |
//! | `fetch`     | load setting `fetch.url` through the loader into `data`|
//! | `fill`      | `Host::fill` with inventory `data`                     |
//!
//! A failing step aborts the spell; the unit keeps the last status it reached.

use std::future::Future;

use serde_json::Value;

use crate::core::runtime::Runtime;
use crate::dispatch::{EventCtx, Payload};
use crate::error::UnitError;
use crate::events::{Event, EventKind};
use crate::units::{Status, UnitRef};

/// Inventory key holding fetched data.
pub const DATA_KEY: &str = "data";

impl Runtime {
    /// Runs the `start` spell.
    pub async fn start(&self, unit: &UnitRef) -> Result<(), UnitError> {
        self.cast(unit, "start", async {
            self.settings_layer().apply_attributes(unit)?;
            self.fire(unit, "beforeStart", lifecycle(unit)).await?;
            self.change_status(unit, Status::STARTING)?;
            if unit.settings().flag("basic.transform", false) {
                self.transform(unit).await?;
            }
            self.fire(unit, "doStart", lifecycle(unit)).await?;
            if unit.settings().flag("basic.refresh", true) {
                self.refresh(unit).await?;
            }
            self.change_status(unit, Status::STARTED)?;
            self.fire(unit, "afterStart", lifecycle(unit)).await?;
            self.change_status(unit, Status::READY)?;
            self.fire(unit, "afterReady", lifecycle(unit)).await
        })
        .await
    }

    /// Runs the `stop` spell.
    pub async fn stop(&self, unit: &UnitRef) -> Result<(), UnitError> {
        self.cast(unit, "stop", async {
            self.change_status(unit, Status::STOPPING)?;
            self.fire(unit, "beforeStop", lifecycle(unit)).await?;
            self.fire(unit, "doStop", lifecycle(unit)).await?;
            self.change_status(unit, Status::STOPPED)?;
            self.fire(unit, "afterStop", lifecycle(unit)).await
        })
        .await
    }

    /// Runs the `transform` spell (template/skin materialization).
    pub async fn transform(&self, unit: &UnitRef) -> Result<(), UnitError> {
        self.envelope(unit, "transform", async {
            self.inner.host.materialize(unit).await
        })
        .await
    }

    /// Runs the `setup` spell.
    pub async fn setup(&self, unit: &UnitRef) -> Result<(), UnitError> {
        self.envelope(unit, "setup", async { self.inner.host.setup(unit).await })
            .await
    }

    /// Runs the `refresh` spell: `clear`, `fetch`, `fill` as enabled by
    /// `basic.clear`, `basic.fetch` and `basic.fill`.
    pub async fn refresh(&self, unit: &UnitRef) -> Result<(), UnitError> {
        self.envelope(unit, "refresh", async {
            let settings = unit.settings();
            if settings.flag("basic.clear", true) {
                self.clear(unit).await?;
            }
            if settings.flag("basic.fetch", true) {
                self.fetch(unit).await?;
            }
            if settings.flag("basic.fill", true) {
                self.fill(unit).await?;
            }
            Ok(())
        })
        .await
    }

    /// Runs the `fetch` spell.
    pub async fn fetch(&self, unit: &UnitRef) -> Result<(), UnitError> {
        self.envelope(unit, "fetch", async {
            let url = match unit.settings().get("fetch.url") {
                None | Some(Value::Null) => return Ok(()),
                Some(Value::String(url)) => url,
                Some(other) => {
                    return Err(UnitError::InvalidSetting {
                        path: "fetch.url".into(),
                        reason: format!("expected string, got {other}"),
                    })
                }
            };
            let data = self.inner.settings.loader().load_json(&url).await?;
            unit.stash(DATA_KEY, data);
            Ok(())
        })
        .await
    }

    /// Runs the `fill` spell.
    pub async fn fill(&self, unit: &UnitRef) -> Result<(), UnitError> {
        self.envelope(unit, "fill", async {
            let data = unit.inventory(DATA_KEY).unwrap_or(Value::Null);
            self.inner.host.fill(unit, &data).await
        })
        .await
    }

    /// Runs the `clear` spell.
    pub async fn clear(&self, unit: &UnitRef) -> Result<(), UnitError> {
        self.envelope(unit, "clear", async {
            unit.unstash(DATA_KEY);
            self.inner.host.clear(unit).await
        })
        .await
    }

    /// `before* ─► action ─► do* ─► after*`, where the action is the unit's
    /// own spell named `spell` if registered, `default` otherwise.
    async fn envelope<F>(&self, unit: &UnitRef, spell: &'static str, default: F) -> Result<(), UnitError>
    where
        F: Future<Output = Result<(), UnitError>>,
    {
        self.cast(unit, spell, async {
            let phase = capitalize(spell);
            self.fire(unit, &format!("before{phase}"), lifecycle(unit)).await?;
            match unit.spell(spell) {
                Some(own) => {
                    let ctx = EventCtx {
                        runtime: self.clone(),
                        element: unit.element(),
                        event: spell.into(),
                        payload: lifecycle(unit),
                        unit: Some(unit.clone()),
                    };
                    own.call(ctx).await?;
                }
                None => default.await?,
            }
            self.fire(unit, &format!("do{phase}"), lifecycle(unit)).await?;
            self.fire(unit, &format!("after{phase}"), lifecycle(unit)).await
        })
        .await
    }

    /// Runs `body` as spell `spell`, publishing start/finish/failure events.
    async fn cast<F>(&self, unit: &UnitRef, spell: &'static str, body: F) -> Result<(), UnitError>
    where
        F: Future<Output = Result<(), UnitError>>,
    {
        tracing::debug!(unit = unit.id(), spell, "spell starting");
        self.inner.bus.publish(
            Event::new(EventKind::SpellStarting)
                .with_unit(unit.id())
                .with_spell(spell),
        );

        match body.await {
            Ok(()) => {
                self.inner.bus.publish(
                    Event::new(EventKind::SpellFinished)
                        .with_unit(unit.id())
                        .with_spell(spell)
                        .with_status(unit.status().as_str()),
                );
                Ok(())
            }
            Err(e) => {
                tracing::warn!(unit = unit.id(), spell, error = %e, "spell failed");
                self.inner.bus.publish(
                    Event::new(EventKind::SpellFailed)
                        .with_unit(unit.id())
                        .with_spell(spell)
                        .with_status(unit.status().as_str())
                        .with_reason(e.to_string()),
                );
                Err(e)
            }
        }
    }
}

fn lifecycle(unit: &UnitRef) -> Payload {
    Payload::new().with("unit", unit.id())
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn phase_names() {
        assert_eq!(format!("before{}", capitalize("refresh")), "beforeRefresh");
        assert_eq!(capitalize(""), "");
    }
}
