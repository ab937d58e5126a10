//! Hook registry for circuit breaker events.

use crate::state::{BreakerState, FailureKind, Transition};
use parking_lot::RwLock;
use std::sync::Arc;

type HookFn = Arc<dyn Fn() + Send + Sync + 'static>;
type FailureHookFn = Arc<dyn Fn(FailureKind) + Send + Sync + 'static>;
type RejectionHookFn = Arc<dyn Fn(BreakerState) + Send + Sync + 'static>;

/// A registry for circuit breaker event hooks.
///
/// Hooks run on the caller's task after the breaker has released its lock,
/// so a hook may safely query the breaker it is attached to.
#[derive(Default)]
pub struct HookRegistry {
    on_open: RwLock<Option<HookFn>>,
    on_close: RwLock<Option<HookFn>>,
    on_half_open: RwLock<Option<HookFn>>,
    on_success: RwLock<Option<HookFn>>,
    on_failure: RwLock<Option<FailureHookFn>>,
    on_rejection: RwLock<Option<RejectionHookFn>>,
}

impl std::fmt::Debug for HookRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HookRegistry")
            .field("on_open", &self.on_open.read().is_some())
            .field("on_close", &self.on_close.read().is_some())
            .field("on_half_open", &self.on_half_open.read().is_some())
            .field("on_success", &self.on_success.read().is_some())
            .field("on_failure", &self.on_failure.read().is_some())
            .field("on_rejection", &self.on_rejection.read().is_some())
            .finish()
    }
}

impl HookRegistry {
    /// Creates a new empty hook registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the hook to call when the circuit breaker opens.
    pub fn set_on_open<F>(&self, f: F)
    where
        F: Fn() + Send + Sync + 'static,
    {
        *self.on_open.write() = Some(Arc::new(f));
    }

    /// Sets the hook to call when the circuit breaker closes.
    pub fn set_on_close<F>(&self, f: F)
    where
        F: Fn() + Send + Sync + 'static,
    {
        *self.on_close.write() = Some(Arc::new(f));
    }

    /// Sets the hook to call when the circuit breaker half-opens.
    pub fn set_on_half_open<F>(&self, f: F)
    where
        F: Fn() + Send + Sync + 'static,
    {
        *self.on_half_open.write() = Some(Arc::new(f));
    }

    /// Sets the hook to call when an admitted call succeeds.
    pub fn set_on_success<F>(&self, f: F)
    where
        F: Fn() + Send + Sync + 'static,
    {
        *self.on_success.write() = Some(Arc::new(f));
    }

    /// Sets the hook to call when an admitted call fails.
    pub fn set_on_failure<F>(&self, f: F)
    where
        F: Fn(FailureKind) + Send + Sync + 'static,
    {
        *self.on_failure.write() = Some(Arc::new(f));
    }

    /// Sets the hook to call when a call is refused without being attempted.
    pub fn set_on_rejection<F>(&self, f: F)
    where
        F: Fn(BreakerState) + Send + Sync + 'static,
    {
        *self.on_rejection.write() = Some(Arc::new(f));
    }

    /// Executes the appropriate hook for a state transition.
    pub fn execute_state_transition_hook(&self, transition: Transition) {
        let slot = match transition.to {
            BreakerState::Open => &self.on_open,
            BreakerState::Closed => &self.on_close,
            BreakerState::HalfOpen => &self.on_half_open,
        };

        // Clone out of the lock so a hook can re-register hooks.
        let hook = slot.read().clone();
        if let Some(hook) = hook {
            hook();
        }
    }

    /// Executes the success hook.
    pub fn execute_success_hook(&self) {
        let hook = self.on_success.read().clone();
        if let Some(hook) = hook {
            hook();
        }
    }

    /// Executes the failure hook.
    pub fn execute_failure_hook(&self, kind: FailureKind) {
        let hook = self.on_failure.read().clone();
        if let Some(hook) = hook {
            hook(kind);
        }
    }

    /// Executes the rejection hook.
    pub fn execute_rejection_hook(&self, state: BreakerState) {
        let hook = self.on_rejection.read().clone();
        if let Some(hook) = hook {
            hook(state);
        }
    }
}
