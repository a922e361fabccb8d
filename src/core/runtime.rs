//! # Runtime: owns every shared table and maps host notifications to lifecycle work.
//!
//! The [`Runtime`] is a cheap, cloneable handle over one set of services:
//! event bus and subscribers, perk registry, unit index and class table,
//! [`StatusSync`], [`EventChain`], global settings, settings layer and host bridge.
//! Each service guards its own table; no lock is held across an `.await`.
//!
//! ## Host notifications
//! ```text
//! connected(unit)      (no-op while already initialized)
//!   ├─► reject ids with whitespace (InvalidSetting) or already in use (DuplicateUnit)
//!   ├─► index by id/tag/class/name, publish UnitAttached
//!   ├─► SettingsLayer::resolve (class defaults, attributes, external, attributes)
//!   ├─► status "connected", Connected hooks
//!   ├─► PerkRegistry::attach_all (defaults ∪ settings["perks"] ∪ sections)
//!   └─► start spell
//!
//! disconnected(unit)   (no-op unless initialized)
//!   ├─► stop spell (when the unit is idle and not stopped yet)
//!   ├─► Disconnected hooks
//!   ├─► PerkRegistry::detach_all (reverse attach order)
//!   ├─► EventChain::remove_bound, prune index, clear "initialized"
//!   └─► status "disconnected", publish UnitDetached
//!
//! adopted(unit, parent)               → re-parent, Adopted hooks, fire "adopted"
//! attribute_changed(unit, name, val)  → update attribute + setting, hooks,
//!                                       fire "attributeChanged" {name, old, new}
//! ```
//!
//! ## Event flow (observability)
//! ```text
//! services ── publish(Event) ──► Bus ──► subscriber listener ──► SubscriberSet::emit
//! ```

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::time::Duration;

use serde_json::Value;
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::core::config::RuntimeConfig;
use crate::core::host::Host;
use crate::dispatch::{DispatchOutcome, Element, EventChain, Handler, ListenOptions, Payload};
use crate::error::UnitError;
use crate::events::{Bus, Event, EventKind};
use crate::perks::{HookPoint, PerkDescriptor, PerkRef, PerkRegistry};
use crate::settings::{parse_attribute, SettingsLayer, SETTINGS_ATTRIBUTE};
use crate::status::{Expectation, StatusSync, Target, WaitFuture, WaitOptions};
use crate::store::ChainableStore;
use crate::subscribers::SubscriberSet;
use crate::units::{Status, Unit, UnitClass, UnitIndex, UnitRef, UnitSpec};

pub(crate) struct Inner {
    pub(crate) cfg: RuntimeConfig,
    pub(crate) bus: Bus,
    pub(crate) subs: Mutex<Option<Arc<SubscriberSet>>>,
    pub(crate) listener: Mutex<Option<JoinHandle<()>>>,
    pub(crate) perks: PerkRegistry,
    pub(crate) units: Arc<UnitIndex>,
    pub(crate) classes: RwLock<HashMap<String, Arc<UnitClass>>>,
    pub(crate) status: Arc<StatusSync>,
    pub(crate) chain: EventChain,
    pub(crate) global: Arc<ChainableStore>,
    pub(crate) settings: SettingsLayer,
    pub(crate) host: Arc<dyn Host>,
    pub(crate) token: CancellationToken,
}

/// Handle to one unit runtime.
///
/// ## Example
/// ```rust
/// use unitvisor::{Runtime, RuntimeConfig, Status, UnitClass, UnitSpec};
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() -> Result<(), unitvisor::UnitError> {
/// let rt = Runtime::builder(RuntimeConfig::default()).build()?;
/// rt.define("x-card", UnitClass::new("Card"));
///
/// let card = rt.create(UnitSpec::new("x-card").with_id("card-1"))?;
/// rt.connected(&card).await?;
/// assert_eq!(card.status(), Status::READY);
///
/// rt.disconnected(&card).await?;
/// assert_eq!(card.status(), Status::DISCONNECTED);
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct Runtime {
    pub(crate) inner: Arc<Inner>,
}

impl Runtime {
    /// Global runtime configuration.
    pub fn config(&self) -> &RuntimeConfig {
        &self.inner.cfg
    }

    /// Event bus (subscribe for raw runtime events).
    pub fn bus(&self) -> &Bus {
        &self.inner.bus
    }

    /// Perk registry.
    pub fn perks(&self) -> &PerkRegistry {
        &self.inner.perks
    }

    /// Unit index.
    pub fn units(&self) -> &UnitIndex {
        &self.inner.units
    }

    /// Status service.
    pub fn status_sync(&self) -> &Arc<StatusSync> {
        &self.inner.status
    }

    /// Listener chains.
    pub fn chain(&self) -> &EventChain {
        &self.inner.chain
    }

    /// Global settings store (parent of every unit's settings).
    pub fn global_settings(&self) -> &Arc<ChainableStore> {
        &self.inner.global
    }

    /// Host bridge.
    pub fn host(&self) -> &Arc<dyn Host> {
        &self.inner.host
    }

    /// Settings resolver.
    pub fn settings_layer(&self) -> &SettingsLayer {
        &self.inner.settings
    }

    /// Registers a perk (see [`PerkRegistry::register`]).
    pub fn register_perk(&self, perk: PerkRef) -> Result<Arc<PerkDescriptor>, UnitError> {
        self.inner.perks.register(perk)
    }

    // ---- classes & units -------------------------------------------------------

    /// Binds a host tag to a unit class, replacing any previous binding.
    pub fn define(&self, tag: impl Into<String>, class: UnitClass) -> Arc<UnitClass> {
        let class = Arc::new(class);
        self.inner
            .classes
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(tag.into(), class.clone());
        class
    }

    /// Class bound to `tag`.
    pub fn class(&self, tag: &str) -> Option<Arc<UnitClass>> {
        self.inner
            .classes
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(tag)
            .cloned()
    }

    /// Creates a unit of the class defined for `spec.tag`.
    ///
    /// The unit is not indexed until [`Runtime::connected`].
    pub fn create(&self, spec: UnitSpec) -> Result<UnitRef, UnitError> {
        let class = self
            .class(&spec.tag)
            .ok_or_else(|| UnitError::not_found("class", spec.tag.clone()))?;
        Ok(Unit::new(spec, class, self.inner.global.clone()))
    }

    /// Connected unit with this id.
    pub fn unit(&self, id: &str) -> Option<UnitRef> {
        self.inner.units.get(id)
    }

    /// Connected units with this tag.
    pub fn units_by_tag(&self, tag: &str) -> Vec<UnitRef> {
        self.inner.units.by_tag(tag)
    }

    /// Connected units of this class (or a class derived from it).
    pub fn units_by_class(&self, class: &str) -> Vec<UnitRef> {
        self.inner.units.by_class(class)
    }

    /// Connected units with this name.
    pub fn units_by_name(&self, name: &str) -> Vec<UnitRef> {
        self.inner.units.by_name(name)
    }

    /// Connected units whose parent is `id`.
    pub fn children_of(&self, id: &str) -> Vec<UnitRef> {
        self.inner
            .units
            .all()
            .into_iter()
            .filter(|u| u.parent().as_deref() == Some(id))
            .collect()
    }

    // ---- host notifications ----------------------------------------------------

    /// Host attach notification.
    pub async fn connected(&self, unit: &UnitRef) -> Result<(), UnitError> {
        if unit.id().contains(char::is_whitespace) {
            return Err(UnitError::InvalidSetting {
                path: "id".into(),
                reason: format!("unit id {:?} must not contain whitespace", unit.id()),
            });
        }
        if unit.set_initialized(true) {
            tracing::debug!(unit = unit.id(), "repeated attach notification ignored");
            return Ok(());
        }

        if !self.inner.units.insert(unit) {
            unit.set_initialized(false);
            return Err(UnitError::DuplicateUnit {
                id: unit.id().to_string(),
            });
        }
        self.inner.bus.publish(
            Event::new(EventKind::UnitAttached)
                .with_unit(unit.id())
                .with_reason(format!("tag={} class={}", unit.tag(), unit.class().name())),
        );

        self.inner.settings.resolve(unit).await?;
        self.change_status(unit, Status::CONNECTED)?;
        self.run_hooks(HookPoint::Connected, unit)?;

        let attached = self
            .inner
            .perks
            .attach_all(self, unit, &self.inner.cfg.default_perks)
            .await?;
        tracing::debug!(unit = unit.id(), perks = ?attached, "unit connected");

        self.start(unit).await
    }

    /// Host detach notification.
    ///
    /// Teardown continues past failures; the first failure is returned.
    pub async fn disconnected(&self, unit: &UnitRef) -> Result<(), UnitError> {
        if !unit.is_initialized() {
            return Ok(());
        }
        let mut first_err: Option<UnitError> = None;

        let status = unit.status();
        if status.is_busy() {
            tracing::warn!(unit = unit.id(), %status, "detaching a busy unit without stop");
        } else if status != Status::STOPPED {
            if let Err(e) = self.stop(unit).await {
                first_err.get_or_insert(e);
            }
        }

        if let Err(e) = self.run_hooks(HookPoint::Disconnected, unit) {
            first_err.get_or_insert(e);
        }
        if let Err(e) = self.inner.perks.detach_all(self, unit).await {
            first_err.get_or_insert(e);
        }

        let dropped = self.inner.chain.remove_bound(unit);
        self.inner.units.remove(unit);
        unit.set_initialized(false);
        if let Err(e) = self.change_status(unit, Status::DISCONNECTED) {
            first_err.get_or_insert(e);
        }

        tracing::debug!(unit = unit.id(), listeners = dropped, "unit disconnected");
        self.inner
            .bus
            .publish(Event::new(EventKind::UnitDetached).with_unit(unit.id()));
        first_err.map_or(Ok(()), Err)
    }

    /// Host re-parent notification.
    pub async fn adopted(&self, unit: &UnitRef, parent: Option<String>) -> Result<(), UnitError> {
        let old = unit.set_parent(parent.clone());
        self.run_hooks(HookPoint::Adopted, unit)?;
        let payload = Payload::new()
            .with("unit", unit.id())
            .with("old", old.map_or(Value::Null, Value::String))
            .with("parent", parent.map_or(Value::Null, Value::String));
        self.fire(unit, "adopted", payload).await
    }

    /// Host attribute-change notification; `None` removes the attribute.
    pub async fn attribute_changed(
        &self,
        unit: &UnitRef,
        name: &str,
        value: Option<String>,
    ) -> Result<(), UnitError> {
        let old = unit.set_attribute(name, value.clone());
        if name != SETTINGS_ATTRIBUTE {
            match &value {
                Some(raw) => unit.settings().set(name, parse_attribute(raw))?,
                None => self.inner.settings.restore(unit, name).await?,
            }
        }
        self.run_hooks(HookPoint::AttributeChanged, unit)?;

        let payload = Payload::new()
            .with("name", name)
            .with("old", old.map_or(Value::Null, Value::String))
            .with("new", value.map_or(Value::Null, Value::String));
        self.fire(unit, "attributeChanged", payload).await
    }

    // ---- status ----------------------------------------------------------------

    /// Changes a unit's status (see [`StatusSync::change_status`]).
    pub fn change_status(&self, unit: &Unit, status: impl Into<Status>) -> Result<(), UnitError> {
        self.inner.status.change_status(unit, status.into())
    }

    /// Current status of the first unit selected by `target`.
    pub fn get_status(&self, target: &Target) -> Option<Status> {
        self.inner.status.get_status(target)
    }

    /// Waits until every expectation holds.
    ///
    /// Timeout precedence: `options.timeout`, then the waiter's
    /// `status.timeout` setting (milliseconds), then
    /// [`RuntimeConfig::wait_timeout`].
    pub fn wait_for(
        &self,
        waiter: Option<&UnitRef>,
        expectations: Vec<Expectation>,
        options: WaitOptions,
    ) -> WaitFuture {
        let timeout = options
            .timeout
            .or_else(|| {
                waiter
                    .and_then(|w| w.settings().get("status.timeout"))
                    .and_then(|v| v.as_u64())
                    .map(Duration::from_millis)
            })
            .unwrap_or(self.inner.cfg.wait_timeout);
        self.inner
            .status
            .wait_for(waiter.map(|w| &**w), expectations, timeout)
    }

    // ---- events ----------------------------------------------------------------

    /// Registers a listener (see [`EventChain::add_listener`]).
    pub fn add_listener(&self, element: &Element, event: &str, handler: Handler, options: ListenOptions) {
        self.inner.chain.add_listener(element, event, handler, options);
    }

    /// Removes a listener by handler identity.
    pub fn remove_listener(&self, element: &Element, event: &str, handler: &Handler) -> bool {
        self.inner.chain.remove_listener(element, event, handler)
    }

    /// Dispatches an event, awaiting every listener in order.
    pub async fn trigger(
        &self,
        element: &Element,
        event: &str,
        payload: Payload,
    ) -> Result<DispatchOutcome, UnitError> {
        self.inner.chain.trigger(self, element, event, payload).await
    }

    /// Dispatches an event synchronously (see [`EventChain::trigger_sync`]).
    pub fn trigger_sync(
        &self,
        element: &Element,
        event: &str,
        payload: Payload,
    ) -> Result<DispatchOutcome, UnitError> {
        self.inner.chain.trigger_sync(self, element, event, payload)
    }

    /// Fires `event` on the unit's own element.
    pub(crate) async fn fire(&self, unit: &Unit, event: &str, payload: Payload) -> Result<(), UnitError> {
        self.trigger(&unit.element(), event, payload).await.map(|_| ())
    }

    // ---- shutdown --------------------------------------------------------------

    /// Stops event delivery and drops pending waits.
    ///
    /// Buffered bus events are forwarded to subscribers before their workers
    /// are drained. Units are left as they are.
    pub async fn shutdown(&self) {
        self.inner.token.cancel();
        let listener = self
            .inner
            .listener
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(h) = listener {
            let _ = h.await;
        }

        let subs = self
            .inner
            .subs
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(set) = subs.and_then(|s| Arc::try_unwrap(s).ok()) {
            set.shutdown().await;
        }

        self.inner.status.clear();
    }

    /// Subscribes to the bus and forwards events to the subscriber set.
    pub(crate) fn subscriber_listener(&self, set: Arc<SubscriberSet>) {
        let mut rx = self.inner.bus.subscribe();
        let token = self.inner.token.clone();
        let handle = tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = token.cancelled() => {
                        while let Ok(ev) = rx.try_recv() {
                            set.emit(&ev);
                        }
                        break;
                    }
                    msg = rx.recv() => match msg {
                        Ok(ev) => set.emit(&ev),
                        Err(RecvError::Lagged(skipped)) => {
                            tracing::warn!(skipped, "subscriber listener lagged behind the bus");
                        }
                        Err(RecvError::Closed) => break,
                    },
                }
            }
        });
        *self
            .inner
            .listener
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(handle);
    }

    fn run_hooks(&self, point: HookPoint, unit: &UnitRef) -> Result<(), UnitError> {
        for hook in self.inner.perks.hooks(point) {
            hook(self, unit)?;
        }
        Ok(())
    }
}

impl std::fmt::Debug for Runtime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Runtime")
            .field("units", &self.inner.units.len())
            .field("perks", &self.inner.perks.names())
            .field("pending_waits", &self.inner.status.pending_waits())
            .finish()
    }
}
