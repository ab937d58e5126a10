//! Call statistics and metric sinks for the circuit breaker.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::state::{BreakerState, Outcome, Transition};

/// Trait for metrics sinks that can receive circuit breaker events.
///
/// Events are delivered after the breaker releases its lock, so ordering
/// across concurrent callers is best effort: two transitions racing on
/// different tasks may arrive in either order. Use
/// [`CircuitBreaker::state`](crate::CircuitBreaker::state) for the
/// authoritative state.
pub trait MetricSink: Send + Sync + 'static {
    /// Records a state transition event.
    fn record_state_transition(&self, transition: Transition);

    /// Records a call refused without a network attempt.
    fn record_rejection(&self, state: BreakerState);

    /// Records a probe admission decision while half-open.
    fn record_probe_attempt(&self, granted: bool);

    /// Records the outcome and wall time of an admitted call.
    fn record_call(&self, outcome: Outcome, duration: Duration);
}

/// A null metrics sink that discards all events.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullMetricSink;

impl MetricSink for NullMetricSink {
    fn record_state_transition(&self, _transition: Transition) {}
    fn record_rejection(&self, _state: BreakerState) {}
    fn record_probe_attempt(&self, _granted: bool) {}
    fn record_call(&self, _outcome: Outcome, _duration: Duration) {}
}

impl<M: MetricSink> MetricSink for Arc<M> {
    fn record_state_transition(&self, transition: Transition) {
        (**self).record_state_transition(transition);
    }

    fn record_rejection(&self, state: BreakerState) {
        (**self).record_rejection(state);
    }

    fn record_probe_attempt(&self, granted: bool) {
        (**self).record_probe_attempt(granted);
    }

    fn record_call(&self, outcome: Outcome, duration: Duration) {
        (**self).record_call(outcome, duration);
    }
}

/// Cumulative counters for one breaker.
///
/// These are diagnostics only; the state machine never reads them.
#[derive(Debug, Default)]
pub(crate) struct BreakerStats {
    admitted: AtomicU64,
    successes: AtomicU64,
    failures: AtomicU64,
    rejections: AtomicU64,
    stale_reports: AtomicU64,
    times_opened: AtomicU64,
}

/// A point-in-time copy of a breaker's cumulative counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatsSnapshot {
    /// Attempts granted by `admit`.
    pub admitted: u64,
    /// Admitted attempts that succeeded.
    pub successes: u64,
    /// Admitted attempts that failed, including abandoned ones.
    pub failures: u64,
    /// Calls refused without a network attempt.
    pub rejections: u64,
    /// Outcomes that arrived after the breaker had already moved on.
    pub stale_reports: u64,
    /// Transitions into the open state.
    pub times_opened: u64,
}

impl BreakerStats {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn record_admitted(&self) {
        self.admitted.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_outcome(&self, outcome: Outcome) {
        match outcome {
            Outcome::Success => self.successes.fetch_add(1, Ordering::Relaxed),
            Outcome::Failure(_) => self.failures.fetch_add(1, Ordering::Relaxed),
        };
    }

    pub(crate) fn record_rejection(&self) {
        self.rejections.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_stale(&self) {
        self.stale_reports.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_opened(&self) {
        self.times_opened.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            admitted: self.admitted.load(Ordering::Relaxed),
            successes: self.successes.load(Ordering::Relaxed),
            failures: self.failures.load(Ordering::Relaxed),
            rejections: self.rejections.load(Ordering::Relaxed),
            stale_reports: self.stale_reports.load(Ordering::Relaxed),
            times_opened: self.times_opened.load(Ordering::Relaxed),
        }
    }

    pub(crate) fn reset(&self) {
        self.admitted.store(0, Ordering::Relaxed);
        self.successes.store(0, Ordering::Relaxed);
        self.failures.store(0, Ordering::Relaxed);
        self.rejections.store(0, Ordering::Relaxed);
        self.stale_reports.store(0, Ordering::Relaxed);
        self.times_opened.store(0, Ordering::Relaxed);
    }
}

#[cfg(feature = "prometheus")]
pub use self::prometheus::PrometheusSink;

#[cfg(feature = "prometheus")]
mod prometheus {
    use prometheus_client::encoding::EncodeLabelSet;
    use prometheus_client::metrics::counter::Counter;
    use prometheus_client::metrics::family::Family;
    use prometheus_client::metrics::gauge::Gauge;
    use prometheus_client::metrics::histogram::{exponential_buckets, Histogram};
    use prometheus_client::registry::Registry;
    use std::time::Duration;

    use super::MetricSink;
    use crate::state::{BreakerState, Outcome, Transition};

    #[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
    struct TransitionLabels {
        from: String,
        to: String,
    }

    #[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
    struct OutcomeLabels {
        outcome: String,
    }

    #[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
    struct StateLabels {
        state: String,
    }

    #[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
    struct ProbeLabels {
        granted: String,
    }

    /// Exports breaker events through a `prometheus-client` registry.
    #[derive(Clone, Debug)]
    pub struct PrometheusSink {
        transitions: Family<TransitionLabels, Counter>,
        calls: Family<OutcomeLabels, Counter>,
        rejections: Family<StateLabels, Counter>,
        probes: Family<ProbeLabels, Counter>,
        call_duration: Histogram,
        state: Gauge,
    }

    impl PrometheusSink {
        /// Creates the metric families and registers them under `breaker_*`.
        pub fn register(registry: &mut Registry) -> Self {
            let sink = Self {
                transitions: Family::default(),
                calls: Family::default(),
                rejections: Family::default(),
                probes: Family::default(),
                call_duration: Histogram::new(exponential_buckets(0.005, 2.0, 12)),
                state: Gauge::default(),
            };

            registry.register(
                "breaker_transitions",
                "Circuit breaker state transitions",
                sink.transitions.clone(),
            );
            registry.register(
                "breaker_calls",
                "Admitted calls by outcome",
                sink.calls.clone(),
            );
            registry.register(
                "breaker_rejections",
                "Calls refused without a network attempt",
                sink.rejections.clone(),
            );
            registry.register(
                "breaker_probes",
                "Half-open probe admission decisions",
                sink.probes.clone(),
            );
            registry.register(
                "breaker_call_duration_seconds",
                "Wall time of admitted calls",
                sink.call_duration.clone(),
            );
            registry.register(
                "breaker_state",
                "Current state (0 closed, 1 open, 2 half-open)",
                sink.state.clone(),
            );

            sink
        }
    }

    fn state_value(state: BreakerState) -> i64 {
        match state {
            BreakerState::Closed => 0,
            BreakerState::Open => 1,
            BreakerState::HalfOpen => 2,
        }
    }

    impl MetricSink for PrometheusSink {
        fn record_state_transition(&self, transition: Transition) {
            self.transitions
                .get_or_create(&TransitionLabels {
                    from: transition.from.as_str().to_string(),
                    to: transition.to.as_str().to_string(),
                })
                .inc();
            self.state.set(state_value(transition.to));
        }

        fn record_rejection(&self, state: BreakerState) {
            self.rejections
                .get_or_create(&StateLabels {
                    state: state.as_str().to_string(),
                })
                .inc();
        }

        fn record_probe_attempt(&self, granted: bool) {
            self.probes
                .get_or_create(&ProbeLabels {
                    granted: granted.to_string(),
                })
                .inc();
        }

        fn record_call(&self, outcome: Outcome, duration: Duration) {
            self.calls
                .get_or_create(&OutcomeLabels {
                    outcome: outcome.label().to_string(),
                })
                .inc();
            self.call_duration.observe(duration.as_secs_f64());
        }
    }

    #[cfg(test)]
    mod tests {
        use super::*;
        use crate::state::FailureKind;
        use prometheus_client::encoding::text::encode;

        #[test]
        fn exports_registered_families() {
            let mut registry = Registry::default();
            let sink = PrometheusSink::register(&mut registry);

            sink.record_state_transition(Transition {
                from: BreakerState::Closed,
                to: BreakerState::Open,
            });
            sink.record_call(
                Outcome::Failure(FailureKind::Timeout),
                Duration::from_millis(20),
            );
            sink.record_rejection(BreakerState::Open);

            let mut buffer = String::new();
            encode(&mut buffer, &registry).expect("encode registry");

            assert!(buffer.contains("breaker_transitions_total"));
            assert!(buffer.contains("outcome=\"timeout\""));
            assert!(buffer.contains("breaker_state 1"));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::FailureKind;

    #[test]
    fn snapshot_reflects_recorded_events() {
        let stats = BreakerStats::new();
        stats.record_admitted();
        stats.record_admitted();
        stats.record_outcome(Outcome::Success);
        stats.record_outcome(Outcome::Failure(FailureKind::Decode));
        stats.record_rejection();
        stats.record_opened();

        let snapshot = stats.snapshot();
        assert_eq!(snapshot.admitted, 2);
        assert_eq!(snapshot.successes, 1);
        assert_eq!(snapshot.failures, 1);
        assert_eq!(snapshot.rejections, 1);
        assert_eq!(snapshot.times_opened, 1);
        assert_eq!(snapshot.stale_reports, 0);
    }

    #[test]
    fn reset_zeroes_every_counter() {
        let stats = BreakerStats::new();
        stats.record_admitted();
        stats.record_stale();
        stats.reset();
        assert_eq!(stats.snapshot(), StatsSnapshot::default());
    }
}
