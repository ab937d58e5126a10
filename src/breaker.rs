//! Core circuit breaker implementation.

use parking_lot::Mutex;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use crate::clock::Clock;
use crate::config::BreakerBuilder;
use crate::error::Rejection;
use crate::hook::HookRegistry;
use crate::metrics::{BreakerStats, MetricSink, StatsSnapshot};
use crate::state::{BreakerState, FailureKind, Machine, Outcome, Transition};

/// Inner state of the circuit breaker, shared between clones and permits.
struct BreakerInner {
    name: String,
    machine: Mutex<Machine>,
    failure_threshold: u32,
    cooldown: Duration,
    clock: Arc<dyn Clock>,
    stats: BreakerStats,
    metric_sink: Arc<dyn MetricSink>,
    hooks: Arc<HookRegistry>,
}

/// A three-state circuit breaker guarding one upstream dependency.
///
/// Every attempt must first obtain a [`Permit`] from [`admit`](Self::admit)
/// and hand its outcome back through [`Permit::report`]. Both steps take the
/// internal lock only briefly and never across an `.await`, so a breaker can be
/// shared freely between tasks.
#[derive(Clone)]
pub struct CircuitBreaker {
    inner: Arc<BreakerInner>,
}

impl fmt::Debug for CircuitBreaker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CircuitBreaker")
            .field("name", &self.inner.name)
            .field("state", &self.state())
            .field("failure_threshold", &self.inner.failure_threshold)
            .field("cooldown", &self.inner.cooldown)
            .finish()
    }
}

impl CircuitBreaker {
    pub(crate) fn new(
        name: String,
        failure_threshold: u32,
        cooldown: Duration,
        clock: Arc<dyn Clock>,
        metric_sink: Arc<dyn MetricSink>,
        hooks: Arc<HookRegistry>,
    ) -> Self {
        info!(
            breaker = %name,
            failure_threshold,
            cooldown = ?cooldown,
            "Creating circuit breaker"
        );

        let inner = BreakerInner {
            name,
            machine: Mutex::new(Machine::new()),
            failure_threshold,
            cooldown,
            clock,
            stats: BreakerStats::new(),
            metric_sink,
            hooks,
        };

        Self {
            inner: Arc::new(inner),
        }
    }

    /// Creates a new builder for customizing a circuit breaker.
    pub fn builder() -> BreakerBuilder {
        BreakerBuilder::new()
    }

    /// The name used in logs.
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Gets the current state of the circuit breaker.
    ///
    /// This does not drive the open to half-open transition; only
    /// [`admit`](Self::admit) does.
    pub fn state(&self) -> BreakerState {
        self.inner.machine.lock().state
    }

    /// Consecutive failures observed while closed.
    pub fn failure_tally(&self) -> u32 {
        self.inner.machine.lock().failure_tally
    }

    /// Configured consecutive-failure threshold.
    pub fn failure_threshold(&self) -> u32 {
        self.inner.failure_threshold
    }

    /// Configured cooldown before a probe is admitted.
    pub fn cooldown(&self) -> Duration {
        self.inner.cooldown
    }

    /// A copy of the cumulative call counters.
    pub fn stats(&self) -> StatsSnapshot {
        self.inner.stats.snapshot()
    }

    /// Zeroes the cumulative call counters. State and tally are untouched.
    pub fn reset_stats(&self) {
        self.inner.stats.reset();
    }

    /// Decides whether an attempt may proceed.
    ///
    /// Never blocks. When the breaker is open and the cooldown has elapsed
    /// this moves it to half-open and grants the single probe.
    pub fn admit(&self) -> Result<Permit, Rejection> {
        let inner = &self.inner;
        let now = inner.clock.now();

        let (decision, transition) = {
            let mut machine = inner.machine.lock();
            let mut transition = None;
            let decision = match machine.state {
                BreakerState::Closed => Ok(false),
                BreakerState::Open => {
                    let opened_at = machine.opened_at.unwrap_or(now);
                    let elapsed = now.saturating_duration_since(opened_at);
                    if elapsed >= inner.cooldown {
                        transition = Some(machine.transition(BreakerState::HalfOpen, now));
                        machine.probe_in_flight = true;
                        Ok(true)
                    } else {
                        Err(Rejection::CircuitOpen {
                            retry_after: inner.cooldown - elapsed,
                        })
                    }
                }
                BreakerState::HalfOpen => {
                    if machine.probe_in_flight {
                        Err(Rejection::ProbeInFlight)
                    } else {
                        machine.probe_in_flight = true;
                        Ok(true)
                    }
                }
            };
            (decision.map(|probe| (probe, machine.epoch)), transition)
        };

        // Everything below runs outside the lock path.
        if let Some(transition) = transition {
            inner.announce(transition, 0);
        }

        match decision {
            Ok((probe, epoch)) => {
                inner.stats.record_admitted();
                if probe {
                    inner.metric_sink.record_probe_attempt(true);
                    debug!(breaker = %inner.name, "Admitting half-open probe");
                }
                Ok(Permit {
                    inner: Arc::clone(inner),
                    epoch,
                    probe,
                    started: now,
                    settled: false,
                })
            }
            Err(rejection) => {
                let state = match rejection {
                    Rejection::CircuitOpen { .. } => BreakerState::Open,
                    Rejection::ProbeInFlight => {
                        inner.metric_sink.record_probe_attempt(false);
                        BreakerState::HalfOpen
                    }
                };
                inner.stats.record_rejection();
                inner.metric_sink.record_rejection(state);
                inner.hooks.execute_rejection_hook(state);
                debug!(breaker = %inner.name, reason = %rejection, "Rejecting call");
                Err(rejection)
            }
        }
    }

    /// Records the outcome of an admitted attempt.
    ///
    /// Equivalent to [`Permit::report`].
    pub fn report(&self, permit: Permit, outcome: Outcome) {
        permit.report(outcome);
    }

    /// Administrative override back to closed with a zero failure tally.
    ///
    /// Attempts admitted before the reset still owe a report, but their
    /// outcomes no longer move the state machine.
    pub fn reset(&self) {
        let inner = &self.inner;
        let now = inner.clock.now();
        let transition = {
            let mut machine = inner.machine.lock();
            if machine.state == BreakerState::Closed {
                machine.failure_tally = 0;
                machine.epoch = machine.epoch.wrapping_add(1);
                None
            } else {
                Some(machine.transition(BreakerState::Closed, now))
            }
        };

        info!(breaker = %inner.name, "Circuit breaker reset");
        if let Some(transition) = transition {
            inner.announce(transition, 0);
        }
    }
}

impl BreakerInner {
    fn settle(&self, epoch: u64, probe: bool, started: Instant, outcome: Outcome) {
        let now = self.clock.now();

        let (applied, transition, tally) = {
            let mut machine = self.machine.lock();
            if machine.epoch != epoch {
                (false, None, machine.failure_tally)
            } else {
                let transition = match (machine.state, outcome) {
                    (BreakerState::Closed, Outcome::Success) => {
                        machine.failure_tally = 0;
                        None
                    }
                    (BreakerState::Closed, Outcome::Failure(_)) => {
                        self.record_closed_failure(&mut machine, now)
                    }
                    (BreakerState::HalfOpen, Outcome::Success) => {
                        Some(machine.transition(BreakerState::Closed, now))
                    }
                    (BreakerState::HalfOpen, Outcome::Failure(_)) => {
                        Some(machine.transition(BreakerState::Open, now))
                    }
                    // Open never admits, so no permit can share its epoch.
                    (BreakerState::Open, _) => None,
                };
                (true, transition, machine.failure_tally)
            }
        };

        self.stats.record_outcome(outcome);
        self.metric_sink
            .record_call(outcome, now.saturating_duration_since(started));

        match outcome {
            Outcome::Success => self.hooks.execute_success_hook(),
            Outcome::Failure(kind) => {
                warn!(
                    breaker = %self.name,
                    reason = %kind,
                    probe,
                    failure_tally = tally,
                    "Call failed"
                );
                self.hooks.execute_failure_hook(kind);
            }
        }

        if !applied {
            self.stats.record_stale();
            debug!(
                breaker = %self.name,
                outcome = outcome.label(),
                "Ignoring outcome from an earlier breaker epoch"
            );
        }

        if let Some(transition) = transition {
            self.announce(transition, tally);
        }
    }

    /// The single place the consecutive-failure threshold is compared.
    fn record_closed_failure(&self, machine: &mut Machine, now: Instant) -> Option<Transition> {
        machine.failure_tally = machine.failure_tally.saturating_add(1);
        if machine.failure_tally >= self.failure_threshold {
            Some(machine.transition(BreakerState::Open, now))
        } else {
            None
        }
    }

    fn announce(&self, transition: Transition, failure_tally: u32) {
        info!(
            breaker = %self.name,
            from = %transition.from,
            to = %transition.to,
            failure_tally,
            "Circuit breaker state transition"
        );

        if transition.to == BreakerState::Open {
            self.stats.record_opened();
        }
        self.hooks.execute_state_transition_hook(transition);
        self.metric_sink.record_state_transition(transition);
    }
}

/// Permission to make one attempt, granted by [`CircuitBreaker::admit`].
///
/// Consuming the permit with [`report`](Self::report) is the only way to feed
/// an outcome back. A permit dropped unreported counts as a cancelled
/// failure, so an abandoned probe cannot hold the half-open latch forever.
#[must_use = "an admitted attempt must report its outcome"]
pub struct Permit {
    inner: Arc<BreakerInner>,
    epoch: u64,
    probe: bool,
    started: Instant,
    settled: bool,
}

impl Permit {
    /// Returns true if this is the half-open probe.
    pub fn is_probe(&self) -> bool {
        self.probe
    }

    /// Records the outcome of the attempt.
    pub fn report(mut self, outcome: Outcome) {
        self.settled = true;
        self.inner
            .settle(self.epoch, self.probe, self.started, outcome);
    }

    /// Shorthand for `report(Outcome::Success)`.
    pub fn succeeded(self) {
        self.report(Outcome::Success);
    }

    /// Shorthand for `report(Outcome::Failure(kind))`.
    pub fn failed(self, kind: FailureKind) {
        self.report(Outcome::Failure(kind));
    }
}

impl Drop for Permit {
    fn drop(&mut self) {
        if self.settled {
            return;
        }
        self.settled = true;
        warn!(
            breaker = %self.inner.name,
            probe = self.probe,
            "Permit dropped without a report, counting as cancelled"
        );
        self.inner.settle(
            self.epoch,
            self.probe,
            self.started,
            Outcome::Failure(FailureKind::Cancelled),
        );
    }
}

impl fmt::Debug for Permit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Permit")
            .field("breaker", &self.inner.name)
            .field("epoch", &self.epoch)
            .field("probe", &self.probe)
            .finish()
    }
}
