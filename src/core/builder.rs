use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};

use serde_json::Value;

use crate::{
    core::{
        config::RuntimeConfig,
        host::{Host, NullHost},
        runtime::{Inner, Runtime},
    },
    dispatch::EventChain,
    error::UnitError,
    events::Bus,
    perks::{builtin, PerkRef, PerkRegistry},
    settings::{Loader, SettingsLayer, StaticLoader},
    status::StatusSync,
    store::ChainableStore,
    subscribers::{Subscribe, SubscriberSet},
    units::UnitIndex,
};

/// Builder for constructing a [`Runtime`] with optional collaborators.
pub struct RuntimeBuilder {
    cfg: RuntimeConfig,
    subscribers: Vec<Arc<dyn Subscribe>>,
    perks: Vec<PerkRef>,
    host: Option<Arc<dyn Host>>,
    loader: Option<Arc<dyn Loader>>,
    settings: Value,
    builtins: bool,
}

impl RuntimeBuilder {
    /// Creates a new builder with the given configuration.
    pub fn new(cfg: RuntimeConfig) -> Self {
        Self {
            cfg,
            subscribers: Vec::new(),
            perks: Vec::new(),
            host: None,
            loader: None,
            settings: Value::Null,
            builtins: true,
        }
    }

    /// Sets event subscribers for observability.
    ///
    /// Subscribers receive runtime events (perk attachment, status changes,
    /// spells, waits) through dedicated workers with bounded queues. Building
    /// with subscribers spawns tasks, so it must happen inside a tokio runtime.
    pub fn with_subscribers(mut self, subscribers: Vec<Arc<dyn Subscribe>>) -> Self {
        self.subscribers = subscribers;
        self
    }

    /// Registers a perk at build time (after the built-in perks).
    pub fn with_perk(mut self, perk: PerkRef) -> Self {
        self.perks.push(perk);
        self
    }

    /// Sets the host bridge (defaults to [`NullHost`]).
    pub fn with_host(mut self, host: Arc<dyn Host>) -> Self {
        self.host = Some(host);
        self
    }

    /// Sets the loader for external settings and `fetch` (defaults to an empty [`StaticLoader`]).
    pub fn with_loader(mut self, loader: Arc<dyn Loader>) -> Self {
        self.loader = Some(loader);
        self
    }

    /// Seeds the global settings store.
    pub fn with_settings(mut self, settings: Value) -> Self {
        self.settings = settings;
        self
    }

    /// Skips registration of the built-in `status`, `event` and `unit` perks.
    ///
    /// Remember to trim [`RuntimeConfig::default_perks`] accordingly.
    pub fn without_builtin_perks(mut self) -> Self {
        self.builtins = false;
        self
    }

    /// Builds and returns the runtime.
    ///
    /// This consumes the builder and initializes all runtime components:
    /// - Event bus for broadcasting
    /// - Perk registry (built-ins first, then [`with_perk`](Self::with_perk) perks)
    /// - Unit index, status service and listener chains
    /// - Subscriber workers (if any)
    pub fn build(self) -> Result<Runtime, UnitError> {
        let bus = Bus::new(self.cfg.bus_capacity_clamped());
        let units = Arc::new(UnitIndex::new());
        let host = self.host.unwrap_or_else(|| Arc::new(NullHost));
        let loader = self
            .loader
            .unwrap_or_else(|| Arc::new(StaticLoader::new()));

        let inner = Inner {
            perks: PerkRegistry::new(self.cfg.default_order, bus.clone()),
            status: StatusSync::new(units.clone(), bus.clone()),
            chain: EventChain::new(host.clone()),
            global: Arc::new(ChainableStore::from_value(self.settings)),
            settings: SettingsLayer::new(loader, self.cfg.settings_path.clone()),
            classes: RwLock::new(HashMap::new()),
            subs: Mutex::new(None),
            listener: Mutex::new(None),
            token: tokio_util::sync::CancellationToken::new(),
            units,
            host,
            bus: bus.clone(),
            cfg: self.cfg,
        };
        let rt = Runtime {
            inner: Arc::new(inner),
        };

        if self.builtins {
            for perk in builtin::all() {
                rt.register_perk(perk)?;
            }
        }
        for perk in self.perks {
            rt.register_perk(perk)?;
        }

        if !self.subscribers.is_empty() {
            let subs = Arc::new(SubscriberSet::new(self.subscribers, bus));
            *rt.inner.subs.lock().unwrap_or_else(std::sync::PoisonError::into_inner) =
                Some(subs.clone());
            rt.subscriber_listener(subs);
        }
        Ok(rt)
    }
}

impl Runtime {
    /// Starts building a runtime.
    pub fn builder(cfg: RuntimeConfig) -> RuntimeBuilder {
        RuntimeBuilder::new(cfg)
    }
}
