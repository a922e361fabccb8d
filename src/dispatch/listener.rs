//! # Handlers, listener options and listener entries.
//!
//! A [`Handler`] is a named closure, either synchronous or future-returning,
//! shared behind an `Arc` so the same handler can be registered on several
//! elements and later removed by identity ([`Handler::same`]).
//!
//! ## Example
//! ```rust
//! use unitvisor::{Handler, UnitError};
//!
//! let log = Handler::sync("log", |ctx| {
//!     println!("{} on {}", ctx.event, ctx.element);
//!     Ok(())
//! });
//! let slow = Handler::future("slow", |_ctx| async move {
//!     tokio::time::sleep(std::time::Duration::from_millis(5)).await;
//!     Ok::<_, UnitError>(())
//! });
//!
//! assert!(log.same(&log.clone()));
//! assert!(!log.same(&slow));
//! ```

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use futures::future::BoxFuture;

use crate::core::Runtime;
use crate::dispatch::payload::Payload;
use crate::error::UnitError;
use crate::units::UnitRef;

/// Host element key that listeners are attached to.
///
/// A unit's own element is keyed by the unit id; sub-elements are addressed as
/// `"<unit id> <selector>"`. Unit ids never contain whitespace, so the first
/// space always ends the owner part.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Element(Arc<str>);

impl Element {
    /// Creates an element key.
    pub fn new(key: impl Into<Arc<str>>) -> Self {
        Element(key.into())
    }

    /// Key of a sub-element of `owner` selected by `selector`.
    pub fn within(owner: &Element, selector: &str) -> Self {
        Element(format!("{} {selector}", owner.0).into())
    }

    /// Raw key.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Element {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Element {
    fn from(s: &str) -> Self {
        Element(s.into())
    }
}

/// Context handed to every handler invocation.
#[derive(Clone)]
pub struct EventCtx {
    /// Runtime the event was dispatched in.
    pub runtime: Runtime,
    /// Element the event was dispatched on.
    pub element: Element,
    /// Event name.
    pub event: Arc<str>,
    /// Event payload.
    pub payload: Payload,
    /// Unit the listener is bound to, if any.
    pub unit: Option<UnitRef>,
}

impl EventCtx {
    /// Bound unit, or a [`UnitError::NotFound`] naming the handler.
    pub fn bound_unit(&self, handler: &str) -> Result<&UnitRef, UnitError> {
        self.unit
            .as_ref()
            .ok_or_else(|| UnitError::not_found("unit", format!("bind target of {handler}")))
    }
}

type SyncFn = dyn Fn(&EventCtx) -> Result<(), UnitError> + Send + Sync;
type AsyncFn = dyn Fn(EventCtx) -> BoxFuture<'static, Result<(), UnitError>> + Send + Sync;

#[derive(Clone)]
enum Body {
    Sync(Arc<SyncFn>),
    Async(Arc<AsyncFn>),
}

/// Named event handler.
#[derive(Clone)]
pub struct Handler {
    name: Arc<str>,
    body: Body,
}

impl Handler {
    /// Wraps a synchronous closure.
    pub fn sync<F>(name: impl Into<Arc<str>>, f: F) -> Self
    where
        F: Fn(&EventCtx) -> Result<(), UnitError> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            body: Body::Sync(Arc::new(f)),
        }
    }

    /// Wraps a closure producing a fresh future per invocation.
    pub fn future<F, Fut>(name: impl Into<Arc<str>>, f: F) -> Self
    where
        F: Fn(EventCtx) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), UnitError>> + Send + 'static,
    {
        Self {
            name: name.into(),
            body: Body::Async(Arc::new(
                move |ctx| -> BoxFuture<'static, Result<(), UnitError>> { Box::pin(f(ctx)) },
            )),
        }
    }

    /// Handler name (diagnostics only; identity is by reference).
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns `true` for future-returning handlers.
    pub fn is_async(&self) -> bool {
        matches!(self.body, Body::Async(_))
    }

    /// Identity comparison: `true` when both wrap the same closure allocation.
    pub fn same(&self, other: &Handler) -> bool {
        match (&self.body, &other.body) {
            (Body::Sync(a), Body::Sync(b)) => {
                Arc::as_ptr(a) as *const () == Arc::as_ptr(b) as *const ()
            }
            (Body::Async(a), Body::Async(b)) => {
                Arc::as_ptr(a) as *const () == Arc::as_ptr(b) as *const ()
            }
            _ => false,
        }
    }

    /// Runs the handler to completion.
    pub async fn call(&self, ctx: EventCtx) -> Result<(), UnitError> {
        match &self.body {
            Body::Sync(f) => f(&ctx),
            Body::Async(f) => f(ctx).await,
        }
    }

    /// Runs a synchronous handler inline; a future-returning handler is
    /// returned unstarted so the caller decides where it runs.
    pub(crate) fn call_sync(
        &self,
        ctx: EventCtx,
    ) -> Result<Option<BoxFuture<'static, Result<(), UnitError>>>, UnitError> {
        match &self.body {
            Body::Sync(f) => f(&ctx).map(|()| None),
            Body::Async(f) => Ok(Some(f(ctx))),
        }
    }
}

impl fmt::Debug for Handler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Handler")
            .field("name", &self.name)
            .field("async", &self.is_async())
            .finish()
    }
}

/// Per-registration listener options.
#[derive(Clone, Debug)]
pub struct ListenOptions {
    /// Sort key; lower runs first, equal keys keep registration order.
    pub order: i32,
    /// Request trailing stop-propagation for dispatches this listener runs in.
    pub stop_propagation: bool,
    /// Remove the listener after its first invocation.
    pub once: bool,
    /// Unit passed to the handler as `ctx.unit`.
    pub bind: Option<UnitRef>,
}

impl Default for ListenOptions {
    /// Order 1000, no stop-propagation, not one-shot, unbound.
    fn default() -> Self {
        Self::ordered(ListenOptions::DEFAULT_ORDER)
    }
}

impl ListenOptions {
    /// Order used when none is given.
    pub const DEFAULT_ORDER: i32 = 1000;

    /// Options with the given order and everything else off.
    pub fn ordered(order: i32) -> Self {
        Self {
            order,
            stop_propagation: false,
            once: false,
            bind: None,
        }
    }

    /// Binds the listener to a unit.
    pub fn bind(mut self, unit: UnitRef) -> Self {
        self.bind = Some(unit);
        self
    }

    /// Requests trailing stop-propagation.
    pub fn stop_propagation(mut self) -> Self {
        self.stop_propagation = true;
        self
    }

    /// Makes the listener one-shot.
    pub fn once(mut self) -> Self {
        self.once = true;
        self
    }
}

/// One registered listener.
#[derive(Clone, Debug)]
pub(crate) struct ListenerEntry {
    pub(crate) handler: Handler,
    pub(crate) options: ListenOptions,
    /// Registration sequence (diagnostics and `once` removal).
    pub(crate) seq: u64,
}
