//! Circuit breaker state machine types.

use std::fmt::{self, Display, Formatter};
use std::time::Instant;

/// Represents the possible states of a circuit breaker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BreakerState {
    /// Circuit is closed and calls are allowed.
    Closed,

    /// Circuit is open and calls are rejected until the cooldown elapses.
    Open,

    /// Circuit is allowing a single probe call to test recovery.
    HalfOpen,
}

impl BreakerState {
    /// Stable lowercase label used in logs and metric labels.
    pub fn as_str(&self) -> &'static str {
        match self {
            BreakerState::Closed => "closed",
            BreakerState::Open => "open",
            BreakerState::HalfOpen => "half-open",
        }
    }
}

impl Display for BreakerState {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why an attempt counted as a failure against the breaker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailureKind {
    /// The transport could not complete the exchange.
    Transport,

    /// The attempt exceeded the configured deadline.
    Timeout,

    /// A response arrived with a status outside the accepted window.
    Status,

    /// The response body exceeded the configured byte cap.
    Oversized,

    /// The body arrived within bounds but could not be decoded.
    Decode,

    /// The attempt was cancelled by the caller or abandoned mid-flight.
    Cancelled,
}

impl FailureKind {
    /// Stable lowercase label used in logs and metric labels.
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureKind::Transport => "transport",
            FailureKind::Timeout => "timeout",
            FailureKind::Status => "status",
            FailureKind::Oversized => "oversized",
            FailureKind::Decode => "decode",
            FailureKind::Cancelled => "cancelled",
        }
    }
}

impl Display for FailureKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of one admitted attempt, as seen by the breaker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// The attempt produced a valid payload.
    Success,

    /// The attempt failed for the given reason.
    Failure(FailureKind),
}

impl Outcome {
    /// Returns true for [`Outcome::Success`].
    pub fn is_success(&self) -> bool {
        matches!(self, Outcome::Success)
    }

    pub(crate) fn label(&self) -> &'static str {
        match self {
            Outcome::Success => "success",
            Outcome::Failure(kind) => kind.as_str(),
        }
    }
}

/// A state change, as delivered to hooks and metric sinks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    /// State before the change.
    pub from: BreakerState,
    /// State after the change.
    pub to: BreakerState,
}

/// Mutable state owned by a single breaker and guarded by its lock.
///
/// Every field is mutated only by the breaker's `admit`/`settle`/`reset`
/// paths while the lock is held.
#[derive(Debug)]
pub(crate) struct Machine {
    pub(crate) state: BreakerState,
    pub(crate) failure_tally: u32,
    pub(crate) opened_at: Option<Instant>,
    pub(crate) probe_in_flight: bool,
    pub(crate) epoch: u64,
}

impl Machine {
    pub(crate) fn new() -> Self {
        Self {
            state: BreakerState::Closed,
            failure_tally: 0,
            opened_at: None,
            probe_in_flight: false,
            epoch: 0,
        }
    }

    /// Moves to `to`, bumping the epoch and clearing fields that only have
    /// meaning inside the state being left.
    pub(crate) fn transition(&mut self, to: BreakerState, now: Instant) -> Transition {
        let from = self.state;
        self.state = to;
        self.epoch = self.epoch.wrapping_add(1);
        self.probe_in_flight = false;

        match to {
            BreakerState::Open => self.opened_at = Some(now),
            BreakerState::HalfOpen => self.opened_at = None,
            BreakerState::Closed => {
                self.opened_at = None;
                self.failure_tally = 0;
            }
        }

        Transition { from, to }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn labels_are_stable() {
        assert_eq!(BreakerState::Closed.to_string(), "closed");
        assert_eq!(BreakerState::Open.to_string(), "open");
        assert_eq!(BreakerState::HalfOpen.to_string(), "half-open");
        assert_eq!(Outcome::Failure(FailureKind::Timeout).label(), "timeout");
        assert_eq!(Outcome::Success.label(), "success");
    }

    #[test]
    fn entering_open_stamps_opened_at_and_bumps_epoch() {
        let mut machine = Machine::new();
        let now = Instant::now();
        let transition = machine.transition(BreakerState::Open, now);

        assert_eq!(transition.from, BreakerState::Closed);
        assert_eq!(transition.to, BreakerState::Open);
        assert_eq!(machine.opened_at, Some(now));
        assert_eq!(machine.epoch, 1);
    }

    #[test]
    fn entering_closed_clears_tally_and_latch() {
        let mut machine = Machine::new();
        let now = Instant::now();
        machine.transition(BreakerState::Open, now);
        machine.transition(BreakerState::HalfOpen, now);
        machine.probe_in_flight = true;
        machine.failure_tally = 4;

        machine.transition(BreakerState::Closed, now);

        assert_eq!(machine.failure_tally, 0);
        assert!(!machine.probe_in_flight);
        assert!(machine.opened_at.is_none());
    }
}
