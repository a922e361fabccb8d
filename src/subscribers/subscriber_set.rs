//! # Fan-out of runtime events to subscribers.
//!
//! ```text
//! emit(event) ─┬─► queue "log"    ─► worker ─► LogWriter::on_event
//!              ├─► queue "audit"  ─► worker ─► Audit::on_event
//!              └─► queue full     ─► SubscriberOverflow on the bus
//! ```
//!
//! Each subscriber sees events in publish order; there is no ordering across
//! subscribers. `emit` uses `try_send` and never waits for a worker. A panic
//! inside `on_event` is caught, reported as `SubscriberPanicked`, and the
//! worker moves on to the next event. Shared state the subscriber was mutating
//! when it panicked may be left half-updated.
//!
//! ## Example
//! ```rust
//! use std::sync::Arc;
//! use unitvisor::{Bus, Event, EventKind, Subscribe, SubscriberSet};
//!
//! struct Audit;
//!
//! #[async_trait::async_trait]
//! impl Subscribe for Audit {
//!     async fn on_event(&self, _ev: &Event) {}
//!     fn name(&self) -> &'static str { "audit" }
//! }
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let bus = Bus::new(16);
//! let set = SubscriberSet::new(vec![Arc::new(Audit) as Arc<dyn Subscribe>], bus);
//! set.emit(&Event::new(EventKind::UnitAttached).with_unit("card-1"));
//! set.shutdown().await;
//! # }
//! ```

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::task::JoinHandle;

use crate::events::{Bus, Event};
use crate::subscribers::Subscribe;

struct Queue {
    name: &'static str,
    tx: mpsc::Sender<Arc<Event>>,
}

/// Subscribers with their queues and worker tasks.
pub struct SubscriberSet {
    queues: Vec<Queue>,
    workers: Vec<JoinHandle<()>>,
    bus: Bus,
}

impl SubscriberSet {
    /// Spawns one worker per subscriber; must be called inside a tokio runtime.
    #[must_use]
    pub fn new(subs: Vec<Arc<dyn Subscribe>>, bus: Bus) -> Self {
        let mut queues = Vec::with_capacity(subs.len());
        let mut workers = Vec::with_capacity(subs.len());
        for sub in subs {
            let (tx, rx) = mpsc::channel(sub.queue_capacity().max(1));
            queues.push(Queue {
                name: sub.name(),
                tx,
            });
            workers.push(tokio::spawn(worker(sub, rx, bus.clone())));
        }
        Self {
            queues,
            workers,
            bus,
        }
    }

    /// Queues a copy of `event` for every subscriber.
    pub fn emit(&self, event: &Event) {
        self.emit_arc(Arc::new(event.clone()));
    }

    /// Queues `event` for every subscriber without copying it.
    ///
    /// A full or closed queue drops the event for that subscriber and publishes
    /// `SubscriberOverflow`, except when the dropped event is itself an
    /// overflow report.
    pub fn emit_arc(&self, event: Arc<Event>) {
        for q in &self.queues {
            let reason = match q.tx.try_send(Arc::clone(&event)) {
                Ok(()) => continue,
                Err(TrySendError::Full(_)) => "full",
                Err(TrySendError::Closed(_)) => "closed",
            };
            if !event.is_subscriber_overflow() {
                self.bus.publish(Event::subscriber_overflow(q.name, reason));
            }
        }
    }

    /// Closes every queue and waits until the workers have drained them.
    pub async fn shutdown(self) {
        drop(self.queues);
        for w in self.workers {
            let _ = w.await;
        }
    }
}

async fn worker(sub: Arc<dyn Subscribe>, mut rx: mpsc::Receiver<Arc<Event>>, bus: Bus) {
    while let Some(ev) = rx.recv().await {
        if let Err(panic) = AssertUnwindSafe(sub.on_event(&ev)).catch_unwind().await {
            bus.publish(Event::subscriber_panicked(sub.name(), panic_message(&*panic)));
        }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&'static str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::EventKind;
    use async_trait::async_trait;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Record(Mutex<Vec<EventKind>>);

    #[async_trait]
    impl Subscribe for Record {
        async fn on_event(&self, ev: &Event) {
            self.0.lock().unwrap().push(ev.kind);
        }
        fn name(&self) -> &'static str {
            "record"
        }
    }

    struct Explode;

    #[async_trait]
    impl Subscribe for Explode {
        async fn on_event(&self, _ev: &Event) {
            panic!("boom");
        }
        fn name(&self) -> &'static str {
            "explode"
        }
    }

    #[tokio::test]
    async fn panicking_subscriber_is_isolated() {
        let bus = Bus::new(16);
        let mut rx = bus.subscribe();
        let record = Arc::new(Record::default());
        let set = SubscriberSet::new(
            vec![Arc::new(Explode) as Arc<dyn Subscribe>, record.clone()],
            bus.clone(),
        );

        set.emit(&Event::new(EventKind::UnitAttached));
        set.emit(&Event::new(EventKind::UnitDetached));
        set.shutdown().await;

        assert_eq!(
            *record.0.lock().unwrap(),
            [EventKind::UnitAttached, EventKind::UnitDetached]
        );
        let first = rx.recv().await.unwrap();
        assert_eq!(first.kind, EventKind::SubscriberPanicked);
        assert_eq!(first.unit.as_deref(), Some("explode"));
        assert_eq!(first.reason.as_deref(), Some("boom"));
    }

    struct Tiny;

    #[async_trait]
    impl Subscribe for Tiny {
        async fn on_event(&self, _ev: &Event) {}
        fn name(&self) -> &'static str {
            "tiny"
        }
        fn queue_capacity(&self) -> usize {
            1
        }
    }

    #[tokio::test]
    async fn full_queue_reports_overflow() {
        let bus = Bus::new(16);
        let mut rx = bus.subscribe();
        let set = SubscriberSet::new(vec![Arc::new(Tiny) as Arc<dyn Subscribe>], bus.clone());

        // the worker has not run yet, so only the first event fits
        for _ in 0..3 {
            set.emit(&Event::new(EventKind::StatusChanged));
        }
        set.shutdown().await;

        for _ in 0..2 {
            let ev = rx.recv().await.unwrap();
            assert!(ev.is_subscriber_overflow());
            assert_eq!(ev.reason.as_deref(), Some("subscriber=tiny reason=full"));
        }
    }
}
