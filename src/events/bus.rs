//! # Observability bus.
//!
//! Every runtime service publishes [`Event`]s here: the perk registry on
//! register/attach/detach, the runtime around spells and host notifications,
//! [`StatusSync`](crate::StatusSync) on status changes and waits, and subscriber
//! workers on overflow or panic.
//!
//! ```text
//! PerkRegistry ─┐
//! Runtime      ─┼─► Bus (broadcast ring) ─► subscriber listener ─► SubscriberSet
//! StatusSync   ─┤                       └─► any extra bus().subscribe() receiver
//! workers      ─┘
//! ```
//!
//! Publishing never blocks and never fails. Events published while nobody is
//! subscribed are dropped; a receiver that falls more than `capacity` events
//! behind sees `RecvError::Lagged(n)` and resumes at the oldest retained one.

use tokio::sync::broadcast;

use super::event::Event;

/// Cloneable handle to the runtime's broadcast channel.
#[derive(Clone, Debug)]
pub struct Bus {
    tx: broadcast::Sender<Event>,
}

impl Bus {
    /// Bus retaining at most `capacity` undelivered events (at least 1).
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    /// Sends `ev` to every current receiver. Callable from sync code.
    pub fn publish(&self, ev: Event) {
        let _ = self.tx.send(ev);
    }

    /// New receiver; it sees only events published from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.tx.subscribe()
    }

    /// Number of live receivers.
    pub fn receiver_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::EventKind;

    #[tokio::test]
    async fn receivers_only_see_later_events() {
        let bus = Bus::new(0);
        bus.publish(Event::new(EventKind::UnitAttached));

        let mut rx = bus.subscribe();
        assert_eq!(bus.receiver_count(), 1);
        bus.publish(Event::new(EventKind::UnitDetached).with_unit("u"));

        let ev = rx.recv().await.unwrap();
        assert_eq!(ev.kind, EventKind::UnitDetached);
        assert_eq!(ev.unit.as_deref(), Some("u"));
    }

    #[tokio::test]
    async fn lagging_receiver_skips_oldest() {
        let bus = Bus::new(2);
        let mut rx = bus.subscribe();
        for id in ["a", "b", "c"] {
            bus.publish(Event::new(EventKind::UnitAttached).with_unit(id));
        }

        assert!(matches!(
            rx.recv().await,
            Err(broadcast::error::RecvError::Lagged(1))
        ));
        assert_eq!(rx.recv().await.unwrap().unit.as_deref(), Some("b"));
    }
}
