//! # Unit status values and transition rules.
//!
//! A [`Status`] is an open string enum: the lifecycle uses the well-known values
//! below, perks may introduce their own.
//!
//! ```text
//! connected ──► starting ──► started ──► ready
//!                                          │
//!        (any non-busy status) ──► stopping ──► stopped
//! ```
//!
//! ## Busy rule
//! A status ending in `-ing` is *busy*; the only status accepted from it is its
//! completion (`stem + "ed"`): `starting → started`, `stopping → stopped`.
//! From any non-busy status every transition is accepted.
//!
//! ## Match rule
//! [`Status::satisfies`] answers "has this unit reached at least the expected
//! milestone": `ready` satisfies `ready|started|starting`, `started` satisfies
//! `started|starting`, `stopped` satisfies `stopped|stopping`; everything else
//! needs an exact match.

use std::borrow::Cow;
use std::fmt;

/// Discrete lifecycle stage of a unit.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Status(Cow<'static, str>);

impl Status {
    /// Unit created but never attached.
    pub const CREATED: Status = Status(Cow::Borrowed("created"));
    /// Attach notification processed.
    pub const CONNECTED: Status = Status(Cow::Borrowed("connected"));
    /// `start` spell in flight.
    pub const STARTING: Status = Status(Cow::Borrowed("starting"));
    /// `start` core steps completed.
    pub const STARTED: Status = Status(Cow::Borrowed("started"));
    /// Fully started and usable.
    pub const READY: Status = Status(Cow::Borrowed("ready"));
    /// `stop` spell in flight.
    pub const STOPPING: Status = Status(Cow::Borrowed("stopping"));
    /// `stop` spell completed.
    pub const STOPPED: Status = Status(Cow::Borrowed("stopped"));
    /// Detach notification processed.
    pub const DISCONNECTED: Status = Status(Cow::Borrowed("disconnected"));

    /// Creates a (possibly custom) status.
    pub fn new(s: impl Into<Cow<'static, str>>) -> Self {
        Status(s.into())
    }

    /// Returns the status string.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns `true` for in-flight (`-ing`) statuses.
    pub fn is_busy(&self) -> bool {
        self.0.len() > 3 && self.0.ends_with("ing")
    }

    /// Returns the only status accepted from a busy status.
    pub fn completion(&self) -> Option<Status> {
        if !self.is_busy() {
            return None;
        }
        let stem = &self.0[..self.0.len() - 3];
        Some(Status(Cow::Owned(format!("{stem}ed"))))
    }

    /// Checks the busy rule for `self → next`.
    ///
    /// Returns the expected completion on violation.
    pub fn check_transition(&self, next: &Status) -> Result<(), Status> {
        match self.completion() {
            Some(done) if &done != next => Err(done),
            _ => Ok(()),
        }
    }

    /// Returns `true` if a unit at `self` meets an expectation of `expected`.
    pub fn satisfies(&self, expected: &Status) -> bool {
        match self.as_str() {
            "ready" => matches!(expected.as_str(), "ready" | "started" | "starting"),
            "started" => matches!(expected.as_str(), "started" | "starting"),
            "stopped" => matches!(expected.as_str(), "stopped" | "stopping"),
            _ => self == expected,
        }
    }
}

impl Default for Status {
    fn default() -> Self {
        Status::CREATED
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&'static str> for Status {
    fn from(s: &'static str) -> Self {
        Status(Cow::Borrowed(s))
    }
}

impl From<String> for Status {
    fn from(s: String) -> Self {
        Status(Cow::Owned(s))
    }
}

impl PartialEq<str> for Status {
    fn eq(&self, other: &str) -> bool {
        self.as_str() == other
    }
}

impl PartialEq<&str> for Status {
    fn eq(&self, other: &&str) -> bool {
        self.as_str() == *other
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL: [Status; 8] = [
        Status::CREATED,
        Status::CONNECTED,
        Status::STARTING,
        Status::STARTED,
        Status::READY,
        Status::STOPPING,
        Status::STOPPED,
        Status::DISCONNECTED,
    ];

    #[test]
    fn busy_statuses_only_accept_their_completion() {
        for next in ALL.iter() {
            let ok = Status::STARTING.check_transition(next).is_ok();
            assert_eq!(ok, *next == Status::STARTED, "starting -> {next}");

            let ok = Status::STOPPING.check_transition(next).is_ok();
            assert_eq!(ok, *next == Status::STOPPED, "stopping -> {next}");
        }
    }

    #[test]
    fn non_busy_statuses_accept_anything() {
        for from in ALL.iter().filter(|s| !s.is_busy()) {
            for next in ALL.iter() {
                assert!(from.check_transition(next).is_ok(), "{from} -> {next}");
            }
            assert!(from.check_transition(&Status::new("custom")).is_ok());
        }
    }

    #[test]
    fn starting_to_starting_is_rejected() {
        assert_eq!(
            Status::STARTING.check_transition(&Status::STARTING),
            Err(Status::STARTED)
        );
    }

    #[test]
    fn custom_busy_status_has_derived_completion() {
        let loading = Status::new("loading");
        assert!(loading.is_busy());
        assert_eq!(loading.completion(), Some(Status::new("loaded")));
        assert!(!Status::new("ing").is_busy());
    }

    #[test]
    fn milestone_matching() {
        assert!(Status::READY.satisfies(&Status::READY));
        assert!(Status::READY.satisfies(&Status::STARTED));
        assert!(Status::READY.satisfies(&Status::STARTING));
        assert!(!Status::READY.satisfies(&Status::STOPPED));

        assert!(Status::STARTED.satisfies(&Status::STARTING));
        assert!(!Status::STARTED.satisfies(&Status::READY));

        assert!(Status::STOPPED.satisfies(&Status::STOPPING));
        assert!(!Status::STOPPING.satisfies(&Status::STOPPED));

        assert!(Status::new("custom").satisfies(&Status::new("custom")));
        assert!(!Status::CONNECTED.satisfies(&Status::STARTING));
    }
}
