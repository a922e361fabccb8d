//! # LogWriter: renders runtime events through `tracing`.
//!
//! Enabled via the `logging` feature. Failures (spell failures, wait timeouts,
//! subscriber overflow/panic) are logged at `warn`, everything else at `debug`.
//!
//! ## Example output
//! ```text
//! DEBUG unitvisor: [perk-attached] unit=card-1 perk=status
//! DEBUG unitvisor: [status] unit=card-1 status=starting from=connected
//! WARN  unitvisor: [wait-timed-out] unit=card-1 reason="id=db expected=ready actual=missing"
//! ```

use async_trait::async_trait;

use crate::events::{Event, EventKind};
use crate::subscribers::Subscribe;

/// Event writer subscriber.
#[derive(Default)]
pub struct LogWriter;

impl LogWriter {
    /// Construct a new [`LogWriter`].
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

fn field(v: &Option<std::sync::Arc<str>>) -> &str {
    v.as_deref().unwrap_or("-")
}

#[async_trait]
impl Subscribe for LogWriter {
    async fn on_event(&self, e: &Event) {
        let unit = field(&e.unit);
        match e.kind {
            EventKind::PerkRegistered => {
                tracing::debug!("[perk-registered] perk={} {}", field(&e.perk), field(&e.reason));
            }
            EventKind::PerkAttached => {
                tracing::debug!("[perk-attached] unit={unit} perk={}", field(&e.perk));
            }
            EventKind::PerkDetached => {
                tracing::debug!("[perk-detached] unit={unit} perk={}", field(&e.perk));
            }
            EventKind::UnitAttached => {
                tracing::debug!("[attached] unit={unit} {}", field(&e.reason));
            }
            EventKind::UnitDetached => {
                tracing::debug!("[detached] unit={unit}");
            }
            EventKind::StatusChanged => {
                tracing::debug!(
                    "[status] unit={unit} status={} from={}",
                    field(&e.status),
                    field(&e.reason)
                );
            }
            EventKind::SpellStarting => {
                tracing::debug!("[spell] unit={unit} spell={}", field(&e.spell));
            }
            EventKind::SpellFinished => {
                tracing::debug!(
                    "[spell-done] unit={unit} spell={} status={}",
                    field(&e.spell),
                    field(&e.status)
                );
            }
            EventKind::SpellFailed => {
                tracing::warn!(
                    "[spell-failed] unit={unit} spell={} status={} err={:?}",
                    field(&e.spell),
                    field(&e.status),
                    field(&e.reason)
                );
            }
            EventKind::WaitRegistered => {
                tracing::debug!("[wait] unit={unit} targets={:?}", field(&e.reason));
            }
            EventKind::WaitResolved => {
                tracing::debug!("[wait-resolved] unit={unit}");
            }
            EventKind::WaitTimedOut => {
                tracing::warn!("[wait-timed-out] unit={unit} reason={:?}", field(&e.reason));
            }
            EventKind::SubscriberOverflow => {
                tracing::warn!("[subscriber-overflow] {}", field(&e.reason));
            }
            EventKind::SubscriberPanicked => {
                tracing::warn!("[subscriber-panicked] subscriber={unit} info={}", field(&e.reason));
            }
        }
    }

    fn name(&self) -> &'static str {
        "LogWriter"
    }
}
