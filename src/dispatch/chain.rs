//! # Ordered, per-element listener chains.
//!
//! [`EventChain`] keeps one ordered listener list per `(element, event)` pair and
//! dispatches events through it.
//!
//! ## Architecture
//! ```text
//! add_listener(el, ev, handler, opts)
//!     ├─► first time for (el, ev): Host::install_dispatcher(el, ev)
//!     └─► push entry, stable sort by opts.order
//!
//! trigger(el, ev, payload)                      trigger_sync(el, ev, payload)
//!     ├─► snapshot listeners                        ├─► snapshot listeners
//!     ├─► in-flight += 1 (log if already > 0)       ├─► in-flight += 1
//!     ├─► for each: handler.call(ctx).await         ├─► for each: sync → call inline
//!     │       └─ Err → abort, return Err            │             async → spawn detached
//!     ├─► stop |= opts.stop_propagation             ├─► stop |= opts.stop_propagation
//!     └─► !stop → Host::propagate(el, ev, payload)  └─► !stop → Host::propagate(...)
//! ```
//!
//! ## Rules
//! - Listeners run in `order`; equal orders keep registration order (stable sort).
//! - Stop-propagation is **trailing**: every listener of the dispatch still runs,
//!   propagation is suppressed afterwards.
//! - No reversal for `after*` style events: order is always registration order.
//! - Concurrent dispatches of the same `(element, event)` are observable through
//!   [`EventChain::is_handling`] and logged, never rejected.
//! - The listener table lock is never held while a handler runs, so handlers may
//!   add/remove listeners or trigger further events.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::core::{Host, Runtime};
use crate::dispatch::listener::{Element, EventCtx, Handler, ListenOptions, ListenerEntry};
use crate::dispatch::payload::Payload;
use crate::error::UnitError;
use crate::units::Unit;

type Key = (Element, Arc<str>);

/// Result of one dispatch.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DispatchOutcome {
    /// Number of listeners that ran (or were spawned) to completion.
    pub listeners: usize,
    /// `true` when at least one listener requested stop-propagation.
    pub propagation_stopped: bool,
}

/// Listener table plus dispatcher bookkeeping.
pub struct EventChain {
    table: Mutex<HashMap<Key, Vec<ListenerEntry>>>,
    installed: Mutex<HashSet<Key>>,
    in_flight: Mutex<HashMap<Key, usize>>,
    seq: AtomicU64,
    host: Arc<dyn Host>,
}

impl EventChain {
    /// Creates an empty chain that installs dispatchers through `host`.
    pub fn new(host: Arc<dyn Host>) -> Self {
        Self {
            table: Mutex::new(HashMap::new()),
            installed: Mutex::new(HashSet::new()),
            in_flight: Mutex::new(HashMap::new()),
            seq: AtomicU64::new(0),
            host,
        }
    }

    /// Registers `handler` for `event` on `element`.
    pub fn add_listener(
        &self,
        element: &Element,
        event: &str,
        handler: Handler,
        options: ListenOptions,
    ) {
        let key: Key = (element.clone(), Arc::from(event));

        if lock(&self.installed).insert(key.clone()) {
            self.host.install_dispatcher(element, event);
        }

        let entry = ListenerEntry {
            handler,
            options,
            seq: self.seq.fetch_add(1, AtomicOrdering::Relaxed),
        };
        let mut table = lock(&self.table);
        let list = table.entry(key).or_default();
        list.push(entry);
        list.sort_by_key(|e| e.options.order);
    }

    /// Removes the first listener whose handler is `handler` (by identity).
    pub fn remove_listener(&self, element: &Element, event: &str, handler: &Handler) -> bool {
        let key: Key = (element.clone(), Arc::from(event));
        let mut table = lock(&self.table);
        let Some(list) = table.get_mut(&key) else {
            return false;
        };
        match list.iter().position(|e| e.handler.same(handler)) {
            Some(i) => {
                list.remove(i);
                true
            }
            None => false,
        }
    }

    /// Removes every listener bound to `unit` or attached to one of its elements.
    ///
    /// Returns the number of removed listeners.
    pub fn remove_bound(&self, unit: &Unit) -> usize {
        let own = unit.element();
        let prefix = format!("{} ", own.as_str());
        let mut removed = 0;
        let mut table = lock(&self.table);
        for ((element, _), list) in table.iter_mut() {
            let owned = *element == own || element.as_str().starts_with(&prefix);
            let before = list.len();
            list.retain(|e| {
                !owned && !e.options.bind.as_ref().is_some_and(|b| b.id() == unit.id())
            });
            removed += before - list.len();
        }
        table.retain(|_, list| !list.is_empty());
        removed
    }

    /// Number of listeners registered for `(element, event)`.
    pub fn listener_count(&self, element: &Element, event: &str) -> usize {
        let key: Key = (element.clone(), Arc::from(event));
        lock(&self.table).get(&key).map_or(0, Vec::len)
    }

    /// Names of the handlers registered for `(element, event)`, in dispatch order.
    pub fn listener_names(&self, element: &Element, event: &str) -> Vec<String> {
        let key: Key = (element.clone(), Arc::from(event));
        lock(&self.table)
            .get(&key)
            .map(|l| l.iter().map(|e| e.handler.name().to_string()).collect())
            .unwrap_or_default()
    }

    /// Returns `true` while a dispatch of `(element, event)` is running.
    pub fn is_handling(&self, element: &Element, event: &str) -> bool {
        let key: Key = (element.clone(), Arc::from(event));
        lock(&self.in_flight).get(&key).is_some_and(|n| *n > 0)
    }

    /// Dispatches `event` and awaits every listener in order.
    ///
    /// The first handler error aborts the dispatch and is returned.
    pub async fn trigger(
        &self,
        runtime: &Runtime,
        element: &Element,
        event: &str,
        payload: Payload,
    ) -> Result<DispatchOutcome, UnitError> {
        let key: Key = (element.clone(), Arc::from(event));
        let listeners = self.snapshot(&key);
        let _guard = InFlight::enter(self, &key);

        let mut outcome = DispatchOutcome::default();
        for entry in listeners {
            if entry.options.once {
                self.remove_seq(&key, entry.seq);
            }
            let ctx = self.ctx(runtime, &key, &payload, &entry);
            if let Err(e) = entry.handler.call(ctx).await {
                tracing::warn!(
                    element = %element,
                    event,
                    handler = entry.handler.name(),
                    error = %e,
                    "listener failed"
                );
                return Err(e);
            }
            outcome.propagation_stopped |= entry.options.stop_propagation;
            outcome.listeners += 1;
        }

        if !outcome.propagation_stopped {
            self.host.propagate(element, event, &payload);
        }
        Ok(outcome)
    }

    /// Dispatches `event` synchronously.
    ///
    /// Synchronous handlers run inline in order. Future-returning handlers are
    /// spawned detached onto the current tokio runtime; their failures are only
    /// logged. Without a runtime such a handler is an error.
    pub fn trigger_sync(
        &self,
        runtime: &Runtime,
        element: &Element,
        event: &str,
        payload: Payload,
    ) -> Result<DispatchOutcome, UnitError> {
        let key: Key = (element.clone(), Arc::from(event));
        let listeners = self.snapshot(&key);
        let _guard = InFlight::enter(self, &key);

        let mut outcome = DispatchOutcome::default();
        for entry in listeners {
            if entry.options.once {
                self.remove_seq(&key, entry.seq);
            }
            let ctx = self.ctx(runtime, &key, &payload, &entry);
            if let Some(fut) = entry.handler.call_sync(ctx)? {
                let rt = tokio::runtime::Handle::try_current().map_err(|_| {
                    UnitError::handler(entry.handler.name(), "async handler outside tokio runtime")
                })?;
                let name = entry.handler.name().to_string();
                rt.spawn(async move {
                    if let Err(e) = fut.await {
                        tracing::warn!(handler = %name, error = %e, "detached listener failed");
                    }
                });
            }
            outcome.propagation_stopped |= entry.options.stop_propagation;
            outcome.listeners += 1;
        }

        if !outcome.propagation_stopped {
            self.host.propagate(element, event, &payload);
        }
        Ok(outcome)
    }

    fn ctx(&self, runtime: &Runtime, key: &Key, payload: &Payload, e: &ListenerEntry) -> EventCtx {
        EventCtx {
            runtime: runtime.clone(),
            element: key.0.clone(),
            event: key.1.clone(),
            payload: payload.clone(),
            unit: e.options.bind.clone(),
        }
    }

    fn snapshot(&self, key: &Key) -> Vec<ListenerEntry> {
        lock(&self.table).get(key).cloned().unwrap_or_default()
    }

    fn remove_seq(&self, key: &Key, seq: u64) {
        if let Some(list) = lock(&self.table).get_mut(key) {
            list.retain(|e| e.seq != seq);
        }
    }
}

/// In-flight marker for one dispatch; decremented on drop (also on error).
struct InFlight<'a> {
    chain: &'a EventChain,
    key: Key,
}

impl<'a> InFlight<'a> {
    fn enter(chain: &'a EventChain, key: &Key) -> Self {
        let mut map = lock(&chain.in_flight);
        let n = map.entry(key.clone()).or_insert(0);
        if *n > 0 {
            tracing::debug!(
                element = %key.0,
                event = %key.1,
                running = *n,
                "event dispatched while already handling"
            );
        }
        *n += 1;
        Self {
            chain,
            key: key.clone(),
        }
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        let mut map = lock(&self.chain.in_flight);
        if let Some(n) = map.get_mut(&self.key) {
            *n -= 1;
            if *n == 0 {
                map.remove(&self.key);
            }
        }
    }
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;
    use crate::core::RuntimeConfig;
    use crate::units::{UnitClass, UnitSpec};

    #[derive(Default)]
    struct Recording {
        installed: Mutex<Vec<String>>,
        propagated: Mutex<Vec<String>>,
    }

    impl Host for Recording {
        fn install_dispatcher(&self, element: &Element, event: &str) {
            self.installed.lock().unwrap().push(format!("{element}:{event}"));
        }

        fn propagate(&self, element: &Element, event: &str, _payload: &Payload) {
            self.propagated.lock().unwrap().push(format!("{element}:{event}"));
        }
    }

    fn runtime(host: Arc<Recording>) -> Runtime {
        let cfg = RuntimeConfig {
            default_perks: Vec::new(),
            ..RuntimeConfig::default()
        };
        Runtime::builder(cfg)
            .without_builtin_perks()
            .with_host(host)
            .build()
            .unwrap()
    }

    fn push(log: &Arc<Mutex<Vec<&'static str>>>, name: &'static str) -> Handler {
        let log = log.clone();
        Handler::sync(name, move |_| {
            log.lock().unwrap().push(name);
            Ok(())
        })
    }

    #[tokio::test]
    async fn listeners_run_by_order_then_registration() {
        let host = Arc::new(Recording::default());
        let rt = runtime(host.clone());
        let el = Element::new("panel");
        let log = Arc::new(Mutex::new(Vec::new()));

        rt.add_listener(&el, "ping", push(&log, "late"), ListenOptions::ordered(20));
        rt.add_listener(&el, "ping", push(&log, "first"), ListenOptions::ordered(10));
        rt.add_listener(&el, "ping", push(&log, "second"), ListenOptions::ordered(10));

        let out = rt.trigger(&el, "ping", Payload::new()).await.unwrap();

        assert_eq!(*log.lock().unwrap(), ["first", "second", "late"]);
        assert_eq!(out.listeners, 3);
        assert!(!out.propagation_stopped);
        assert_eq!(*host.installed.lock().unwrap(), ["panel:ping"]);
        assert_eq!(*host.propagated.lock().unwrap(), ["panel:ping"]);
    }

    #[tokio::test]
    async fn sync_trigger_runs_sequentially_and_propagates() {
        let host = Arc::new(Recording::default());
        let rt = runtime(host.clone());
        let el = Element::new("panel");
        let log = Arc::new(Mutex::new(Vec::new()));

        rt.add_listener(&el, "click", push(&log, "b"), ListenOptions::ordered(20));
        rt.add_listener(&el, "click", push(&log, "a"), ListenOptions::ordered(10));

        let out = rt.trigger_sync(&el, "click", Payload::new()).unwrap();

        assert_eq!(*log.lock().unwrap(), ["a", "b"]);
        assert_eq!(out.listeners, 2);
        assert_eq!(*host.propagated.lock().unwrap(), ["panel:click"]);
    }

    #[tokio::test]
    async fn stop_propagation_is_trailing() {
        let host = Arc::new(Recording::default());
        let rt = runtime(host.clone());
        let el = Element::new("panel");
        let log = Arc::new(Mutex::new(Vec::new()));

        rt.add_listener(
            &el,
            "click",
            push(&log, "stopper"),
            ListenOptions::ordered(1).stop_propagation(),
        );
        rt.add_listener(&el, "click", push(&log, "after"), ListenOptions::ordered(2));

        let out = rt.trigger(&el, "click", Payload::new()).await.unwrap();

        assert_eq!(*log.lock().unwrap(), ["stopper", "after"]);
        assert!(out.propagation_stopped);
        assert!(host.propagated.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn remove_listener_uses_identity() {
        let rt = runtime(Arc::new(Recording::default()));
        let el = Element::new("panel");
        let log = Arc::new(Mutex::new(Vec::new()));

        let kept = push(&log, "same-name");
        let dropped = push(&log, "same-name");
        rt.add_listener(&el, "ping", kept, ListenOptions::default());
        rt.add_listener(&el, "ping", dropped.clone(), ListenOptions::default());

        assert!(rt.remove_listener(&el, "ping", &dropped));
        assert!(!rt.remove_listener(&el, "ping", &dropped));
        assert_eq!(rt.chain().listener_count(&el, "ping"), 1);
    }

    #[tokio::test]
    async fn once_listener_runs_a_single_time() {
        let rt = runtime(Arc::new(Recording::default()));
        let el = Element::new("panel");
        let log = Arc::new(Mutex::new(Vec::new()));

        rt.add_listener(&el, "ping", push(&log, "once"), ListenOptions::default().once());
        rt.add_listener(&el, "ping", push(&log, "always"), ListenOptions::default());

        rt.trigger(&el, "ping", Payload::new()).await.unwrap();
        rt.trigger(&el, "ping", Payload::new()).await.unwrap();

        assert_eq!(*log.lock().unwrap(), ["once", "always", "always"]);
    }

    #[tokio::test]
    async fn handler_error_aborts_dispatch() {
        let host = Arc::new(Recording::default());
        let rt = runtime(host.clone());
        let el = Element::new("panel");
        let log = Arc::new(Mutex::new(Vec::new()));

        rt.add_listener(
            &el,
            "save",
            Handler::future("fail", |_| async { Err(UnitError::handler("fail", "nope")) }),
            ListenOptions::ordered(1),
        );
        rt.add_listener(&el, "save", push(&log, "never"), ListenOptions::ordered(2));

        let err = rt.trigger(&el, "save", Payload::new()).await.unwrap_err();

        assert_eq!(err.as_label(), "unit_handler_failed");
        assert!(log.lock().unwrap().is_empty());
        assert!(host.propagated.lock().unwrap().is_empty());
        assert!(!rt.chain().is_handling(&el, "save"));
    }

    #[tokio::test]
    async fn remove_bound_drops_owned_and_bound_listeners() {
        let rt = runtime(Arc::new(Recording::default()));
        rt.define("x-card", UnitClass::new("Card"));
        let card = rt.create(UnitSpec::new("x-card").with_id("card")).unwrap();
        let log = Arc::new(Mutex::new(Vec::new()));

        let own = card.element();
        let inner = Element::within(&own, "button");
        let other = Element::new("window");
        rt.add_listener(&own, "ping", push(&log, "own"), ListenOptions::default());
        rt.add_listener(&inner, "click", push(&log, "inner"), ListenOptions::default());
        rt.add_listener(
            &other,
            "resize",
            push(&log, "bound"),
            ListenOptions::default().bind(card.clone()),
        );
        rt.add_listener(&other, "resize", push(&log, "foreign"), ListenOptions::default());

        assert_eq!(rt.chain().remove_bound(&card), 3);
        assert_eq!(rt.chain().listener_names(&other, "resize"), ["foreign"]);
        assert_eq!(rt.chain().listener_count(&own, "ping"), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn overlapping_dispatches_are_observable() {
        use std::sync::atomic::{AtomicUsize, Ordering};
        use std::time::Duration;

        let rt = runtime(Arc::new(Recording::default()));
        let el = Element::new("panel");
        let active = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));
        rt.add_listener(
            &el,
            "load",
            Handler::future("slow", {
                let (active, peak) = (active.clone(), peak.clone());
                move |_| {
                    let (active, peak) = (active.clone(), peak.clone());
                    async move {
                        let now = active.fetch_add(1, Ordering::SeqCst) + 1;
                        peak.fetch_max(now, Ordering::SeqCst);
                        tokio::time::sleep(Duration::from_millis(100)).await;
                        active.fetch_sub(1, Ordering::SeqCst);
                        Ok(())
                    }
                }
            }),
            ListenOptions::default(),
        );

        let spawn = || {
            let (rt, el) = (rt.clone(), el.clone());
            tokio::spawn(async move { rt.trigger(&el, "load", Payload::new()).await })
        };
        let (first, second) = (spawn(), spawn());
        while active.load(Ordering::SeqCst) < 2 {
            tokio::task::yield_now().await;
        }
        assert!(rt.chain().is_handling(&el, "load"));

        first.await.unwrap().unwrap();
        second.await.unwrap().unwrap();
        assert_eq!(peak.load(Ordering::SeqCst), 2);
        assert!(!rt.chain().is_handling(&el, "load"));
    }

    #[tokio::test]
    async fn sync_trigger_detaches_future_handlers() {
        let rt = runtime(Arc::new(Recording::default()));
        let el = Element::new("panel");
        let log = Arc::new(Mutex::new(Vec::new()));

        let ran = log.clone();
        rt.add_listener(
            &el,
            "click",
            Handler::future("later", move |_| {
                let ran = ran.clone();
                async move {
                    ran.lock().unwrap().push("later");
                    Ok(())
                }
            }),
            ListenOptions::ordered(1),
        );
        rt.add_listener(
            &el,
            "click",
            Handler::future("failing", |_| async { Err(UnitError::handler("failing", "nope")) }),
            ListenOptions::ordered(2),
        );
        rt.add_listener(&el, "click", push(&log, "inline"), ListenOptions::ordered(3));

        let out = rt.trigger_sync(&el, "click", Payload::new()).unwrap();
        assert_eq!(out.listeners, 3);
        assert_eq!(*log.lock().unwrap(), ["inline"]);

        for _ in 0..4 {
            tokio::task::yield_now().await;
        }
        assert_eq!(*log.lock().unwrap(), ["inline", "later"]);
    }
}
