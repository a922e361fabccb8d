//! # Cross-unit status synchronization.
//!
//! [`StatusSync`] owns status transitions and the global wait-list.
//!
//! ## Architecture
//! ```text
//! change_status(unit, s)
//!     ├─► busy rule check ──✗──► Err(IllegalTransition)
//!     ├─► store status, publish StatusChanged
//!     └─► settle(): for each WaitEntry
//!             ├─ receiver dropped      → remove
//!             └─ all expectations met  → remove, complete, publish WaitResolved
//!
//! wait_for(waiter, expectations, timeout)
//!     ├─ all met now  → ready future (no entry, no timer)
//!     └─ otherwise    → push WaitEntry, return future:
//!            ├─ completed by settle()      → Ok(())
//!            └─ deadline reached first     → remove entry → Err(WaitTimeout)
//! ```
//!
//! ## Rules
//! - Waits are re-evaluated only when a status changes (no polling).
//! - The wait-list lock is taken before the unit index and unit state locks;
//!   `wait_for` evaluates and registers under that lock so a concurrent status
//!   change cannot slip between the check and the registration.
//! - Timeouts only remove the entry; handlers already running are unaffected.

use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use futures::future::{self, BoxFuture};
use tokio::sync::oneshot;
use tokio::time::{self, Instant};

use crate::error::UnitError;
use crate::events::{Bus, Event, EventKind};
use crate::status::target::{Expectation, Target};
use crate::units::{Status, Unit, UnitIndex};

/// Pending cross-unit expectation.
struct WaitEntry {
    id: u64,
    waiter: Arc<str>,
    expectations: Vec<Expectation>,
    done: oneshot::Sender<()>,
}

/// Completion returned by [`StatusSync::wait_for`].
pub type WaitFuture = BoxFuture<'static, Result<(), UnitError>>;

/// Status transitions plus the global wait-list.
pub struct StatusSync {
    index: Arc<UnitIndex>,
    waits: Mutex<Vec<WaitEntry>>,
    next_id: AtomicU64,
    bus: Bus,
}

impl StatusSync {
    /// Creates the service over `index`, publishing to `bus`.
    pub fn new(index: Arc<UnitIndex>, bus: Bus) -> Arc<Self> {
        Arc::new(Self {
            index,
            waits: Mutex::new(Vec::new()),
            next_id: AtomicU64::new(1),
            bus,
        })
    }

    /// Moves `unit` to `status`, then resolves every wait that became satisfied.
    ///
    /// Fails with [`UnitError::IllegalTransition`] when the unit is busy and
    /// `status` is not the busy status's completion.
    pub fn change_status(&self, unit: &Unit, status: Status) -> Result<(), UnitError> {
        let previous = unit.transition(status.clone()).map_err(|(from, expected)| {
            UnitError::IllegalTransition {
                unit: unit.id().to_string(),
                from: from.to_string(),
                to: status.to_string(),
                expected: expected.to_string(),
            }
        })?;

        tracing::debug!(unit = unit.id(), from = %previous, to = %status, "status changed");
        self.bus.publish(
            Event::new(EventKind::StatusChanged)
                .with_unit(unit.id())
                .with_status(status.as_str())
                .with_reason(previous.as_str()),
        );
        self.settle();
        Ok(())
    }

    /// Current status of the first unit selected by `target`.
    pub fn get_status(&self, target: &Target) -> Option<Status> {
        target
            .resolve(&self.index)
            .first()
            .map(|u| u.status())
    }

    /// Returns `true` if every expectation holds right now.
    pub fn is_satisfied(&self, expectations: &[Expectation]) -> bool {
        expectations.iter().all(|e| e.is_satisfied(&self.index))
    }

    /// Waits until every expectation holds or `timeout` elapses.
    ///
    /// Already-satisfied expectations complete immediately without registering
    /// anything. The deadline is fixed at call time, not at first poll.
    pub fn wait_for(
        self: &Arc<Self>,
        waiter: Option<&Unit>,
        expectations: Vec<Expectation>,
        timeout: Duration,
    ) -> WaitFuture {
        let waiter: Arc<str> = Arc::from(waiter.map_or("-", Unit::id));

        let mut waits = self.lock();
        if self.is_satisfied(&expectations) {
            return Box::pin(future::ready(Ok(())));
        }

        let id = self.next_id.fetch_add(1, AtomicOrdering::Relaxed);
        let (tx, rx) = oneshot::channel();
        let summary = summarize(&expectations);
        waits.push(WaitEntry {
            id,
            waiter: waiter.clone(),
            expectations,
            done: tx,
        });
        drop(waits);

        tracing::debug!(waiter = %waiter, targets = %summary, ?timeout, "wait registered");
        self.bus.publish(
            Event::new(EventKind::WaitRegistered)
                .with_unit(waiter.clone())
                .with_reason(summary),
        );

        let deadline = Instant::now() + timeout;
        let me = Arc::clone(self);
        Box::pin(async move {
            match time::timeout_at(deadline, rx).await {
                Ok(Ok(())) => Ok(()),
                Ok(Err(_)) => Err(UnitError::handler("wait", "wait-list cleared")),
                Err(_) => me.expire(id, &waiter, timeout),
            }
        })
    }

    /// Number of registered (unsatisfied, not yet expired) waits.
    pub fn pending_waits(&self) -> usize {
        self.lock().len()
    }

    /// Drops every pending wait; their futures fail immediately.
    pub fn clear(&self) {
        self.lock().clear();
    }

    /// Resolves and removes every satisfied entry; prunes abandoned ones.
    fn settle(&self) {
        let mut resolved = Vec::new();
        {
            let mut waits = self.lock();
            let mut i = 0;
            while i < waits.len() {
                if waits[i].done.is_closed() {
                    waits.swap_remove(i);
                } else if self.is_satisfied(&waits[i].expectations) {
                    let entry = waits.swap_remove(i);
                    let _ = entry.done.send(());
                    resolved.push(entry.waiter);
                } else {
                    i += 1;
                }
            }
        }
        for waiter in resolved {
            self.bus
                .publish(Event::new(EventKind::WaitResolved).with_unit(waiter));
        }
    }

    /// Removes an expired entry and builds the timeout error.
    ///
    /// If the entry is already gone it was resolved concurrently with the
    /// deadline, which counts as success.
    fn expire(&self, id: u64, waiter: &str, timeout: Duration) -> Result<(), UnitError> {
        let entry = {
            let mut waits = self.lock();
            match waits.iter().position(|w| w.id == id) {
                Some(i) => waits.swap_remove(i),
                None => return Ok(()),
            }
        };

        let unsatisfied: Vec<String> = entry
            .expectations
            .iter()
            .filter(|e| !e.is_satisfied(&self.index))
            .map(|e| e.describe(&self.index))
            .collect();

        tracing::warn!(waiter, ?timeout, unsatisfied = ?unsatisfied, "wait timed out");
        self.bus.publish(
            Event::new(EventKind::WaitTimedOut)
                .with_unit(waiter)
                .with_reason(unsatisfied.join(", ")),
        );
        Err(UnitError::WaitTimeout {
            waiter: waiter.to_string(),
            timeout,
            unsatisfied,
        })
    }

    fn lock(&self) -> MutexGuard<'_, Vec<WaitEntry>> {
        self.waits.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn summarize(expectations: &[Expectation]) -> String {
    expectations
        .iter()
        .map(|e| format!("{}@{}", e.target, e.status))
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::ChainableStore;
    use crate::units::{UnitClass, UnitRef, UnitSpec};

    fn setup() -> (Arc<StatusSync>, Arc<UnitIndex>) {
        let index = Arc::new(UnitIndex::new());
        (StatusSync::new(index.clone(), Bus::new(16)), index)
    }

    fn add(index: &UnitIndex, id: &str, tag: &str) -> UnitRef {
        let u = Unit::new(
            UnitSpec::new(tag).with_id(id),
            Arc::new(UnitClass::new("plain")),
            Arc::new(ChainableStore::new()),
        );
        index.insert(&u);
        u
    }

    #[test]
    fn busy_status_rejects_anything_but_completion() {
        let (sync, index) = setup();
        let u = add(&index, "u", "x");
        sync.change_status(&u, Status::STARTING).unwrap();

        let err = sync.change_status(&u, Status::STARTING).unwrap_err();
        assert_eq!(err.as_label(), "unit_illegal_transition");
        assert_eq!(u.status(), Status::STARTING);

        assert!(sync.change_status(&u, Status::READY).is_err());
        sync.change_status(&u, Status::STARTED).unwrap();
        sync.change_status(&u, Status::READY).unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn satisfied_wait_resolves_without_entry() {
        let (sync, index) = setup();
        let u = add(&index, "obj1", "x");
        sync.change_status(&u, Status::READY).unwrap();

        let fut = sync.wait_for(
            None,
            vec![Expectation::id("obj1").with_status("started")],
            Duration::from_millis(100),
        );
        assert_eq!(sync.pending_waits(), 0);
        fut.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn wait_resolves_on_status_change() {
        let (sync, index) = setup();
        let u = add(&index, "obj1", "x");

        let fut = sync.wait_for(None, vec![Expectation::id("obj1")], Duration::from_secs(10));
        assert_eq!(sync.pending_waits(), 1);

        let driver = {
            let sync = sync.clone();
            let u = u.clone();
            tokio::spawn(async move {
                time::sleep(Duration::from_millis(50)).await;
                sync.change_status(&u, Status::STARTING).unwrap();
                sync.change_status(&u, Status::STARTED).unwrap();
                sync.change_status(&u, Status::READY).unwrap();
            })
        };

        fut.await.unwrap();
        driver.await.unwrap();
        assert_eq!(sync.pending_waits(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn wait_times_out_exactly_at_deadline() {
        let (sync, index) = setup();
        let u = add(&index, "obj1", "x");
        sync.change_status(&u, Status::STARTING).unwrap();
        sync.change_status(&u, Status::STARTED).unwrap();

        let start = Instant::now();
        let err = sync
            .wait_for(None, vec![Expectation::id("obj1")], Duration::from_millis(100))
            .await
            .unwrap_err();

        let elapsed = start.elapsed();
        assert!(elapsed >= Duration::from_millis(100), "rejected early: {elapsed:?}");
        assert!(elapsed <= Duration::from_millis(101), "rejected late: {elapsed:?}");
        assert!(err.is_recoverable());
        assert!(err.to_string().contains("obj1"));
        match err {
            UnitError::WaitTimeout { unsatisfied, .. } => {
                assert_eq!(unsatisfied, ["id=obj1 expected=ready actual=obj1:started"]);
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(sync.pending_waits(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn wait_is_pending_before_deadline() {
        let (sync, index) = setup();
        add(&index, "obj1", "x");

        let mut fut =
            sync.wait_for(None, vec![Expectation::id("obj1")], Duration::from_millis(100));
        let early = time::timeout(Duration::from_millis(99), &mut fut).await;
        assert!(early.is_err(), "wait must still be pending before its deadline");
        assert_eq!(sync.pending_waits(), 1);
        assert!(fut.await.is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn tag_targets_need_every_match() {
        let (sync, index) = setup();
        let a = add(&index, "a", "x-db");
        let b = add(&index, "b", "x-db");

        let fut = sync.wait_for(
            None,
            vec![Expectation::new(Target::Tag("x-db".into())).with_status("stopped")],
            Duration::from_secs(1),
        );
        sync.change_status(&a, Status::STOPPED).unwrap();
        assert_eq!(sync.pending_waits(), 1);
        sync.change_status(&b, Status::STOPPED).unwrap();
        assert_eq!(sync.pending_waits(), 0);
        fut.await.unwrap();
    }

    #[tokio::test]
    async fn dropped_waits_are_pruned_on_next_change() {
        let (sync, index) = setup();
        let u = add(&index, "u", "x");
        drop(sync.wait_for(None, vec![Expectation::id("ghost")], Duration::from_secs(5)));
        assert_eq!(sync.pending_waits(), 1);
        sync.change_status(&u, Status::CONNECTED).unwrap();
        assert_eq!(sync.pending_waits(), 0);
    }

    #[test]
    fn get_status_reads_first_match() {
        let (sync, index) = setup();
        let u = add(&index, "u", "x");
        assert_eq!(sync.get_status(&Target::Id("u".into())), Some(Status::CREATED));
        sync.change_status(&u, Status::CONNECTED).unwrap();
        assert_eq!(sync.get_status(&Target::Tag("x".into())), Some(Status::CONNECTED));
        assert_eq!(sync.get_status(&Target::Id("nope".into())), None);
    }
}
