//! Tick scoping and blocking-call instrumentation.
//!
//! A tick is one opportunity-evaluation cycle. Ticks may nest on one thread
//! and run concurrently across worker threads, so the shared "any tick
//! active" and "any tick forbids REST" states are counts, never booleans.
//!
//! REST enforcement is instrumentation: a REST call recorded while any
//! forbidding tick is active increments a violation counter and logs a
//! warning, but the call itself is not aborted.

use parking_lot::Mutex;
use serde::Serialize;
use std::cell::Cell;
use std::marker::PhantomData;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, error, warn};

use crate::error::{EngineError, EngineResult};

#[derive(Debug, Clone, Copy, Default)]
struct LocalTick {
    depth: usize,
    forbidding: usize,
}

thread_local! {
    // Nesting on the current call stack. Guards are !Send, so a guard is
    // always released on the thread that acquired it.
    static LOCAL_TICK: Cell<LocalTick> = const { Cell::new(LocalTick { depth: 0, forbidding: 0 }) };
}

#[derive(Debug, Default)]
struct TickCounts {
    active: usize,
    forbidding: usize,
    entered: u64,
    exited: u64,
}

#[derive(Debug, Default)]
struct Shared {
    counts: Mutex<TickCounts>,
    rest_calls: AtomicU64,
    violations: AtomicU64,
}

/// Outcome of recording a REST call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RestCallCheck {
    Allowed,
    Violation,
}

impl RestCallCheck {
    pub fn is_violation(&self) -> bool {
        matches!(self, RestCallCheck::Violation)
    }
}

/// Snapshot of tick counters for dashboards.
#[derive(Debug, Clone, Serialize)]
pub struct TickStats {
    pub active_ticks: usize,
    pub forbidding_ticks: usize,
    pub ticks_entered: u64,
    pub ticks_exited: u64,
    pub rest_calls: u64,
    pub rest_violations: u64,
}

/// Process-wide tick state. Cheap to clone; clones share counters.
#[derive(Debug, Clone, Default)]
pub struct TickScope {
    shared: Arc<Shared>,
}

impl TickScope {
    /// Create a new, idle tick scope.
    pub fn new() -> Self {
        Self::default()
    }

    /// Enter a tick. The returned guard releases it on drop, including
    /// during unwinding.
    pub fn enter_tick(&self, rest_forbidden: bool) -> TickGuard<'_> {
        {
            let mut counts = self.shared.counts.lock();
            counts.active += 1;
            counts.entered += 1;
            if rest_forbidden {
                counts.forbidding += 1;
            }
        }

        LOCAL_TICK.with(|local| {
            let mut state = local.get();
            state.depth += 1;
            if rest_forbidden {
                state.forbidding += 1;
            }
            local.set(state);
        });

        TickGuard {
            scope: self,
            rest_forbidden,
            _not_send: PhantomData,
        }
    }

    /// Run `f` inside a tick.
    pub fn run<F, R>(&self, rest_forbidden: bool, f: F) -> R
    where
        F: FnOnce() -> R,
    {
        let _guard = self.enter_tick(rest_forbidden);
        f()
    }

    /// Record a blocking REST call about to be made.
    ///
    /// Returns `Violation` when any forbidding tick is active on any thread.
    pub fn record_rest_call(&self, endpoint: &str) -> RestCallCheck {
        self.shared.rest_calls.fetch_add(1, Ordering::Relaxed);

        let forbidding = self.shared.counts.lock().forbidding;
        if forbidding == 0 {
            return RestCallCheck::Allowed;
        }

        let total = self.shared.violations.fetch_add(1, Ordering::Relaxed) + 1;
        warn!(
            endpoint = %endpoint,
            forbidding_ticks = forbidding,
            on_forbidding_stack = Self::current_thread_forbids_rest(),
            total_violations = total,
            "REST call recorded inside a REST-forbidden tick"
        );
        RestCallCheck::Violation
    }

    /// Whether any tick is active.
    pub fn is_active(&self) -> bool {
        self.shared.counts.lock().active > 0
    }

    /// Whether any active tick forbids REST calls.
    pub fn is_rest_forbidden(&self) -> bool {
        self.shared.counts.lock().forbidding > 0
    }

    /// Number of active ticks across all threads.
    pub fn active_count(&self) -> usize {
        self.shared.counts.lock().active
    }

    /// Number of active REST-forbidding ticks across all threads.
    pub fn forbidding_count(&self) -> usize {
        self.shared.counts.lock().forbidding
    }

    /// Whether the current call stack is inside a tick.
    pub fn current_thread_in_tick() -> bool {
        LOCAL_TICK.with(|local| local.get().depth > 0)
    }

    /// Whether the current call stack is inside a REST-forbidding tick.
    pub fn current_thread_forbids_rest() -> bool {
        LOCAL_TICK.with(|local| local.get().forbidding > 0)
    }

    /// Total REST violations recorded.
    pub fn violation_count(&self) -> u64 {
        self.shared.violations.load(Ordering::Relaxed)
    }

    /// Verify that every acquired tick has been released.
    ///
    /// A non-zero count once all work has finished means a guard was leaked.
    pub fn check_quiescent(&self) -> EngineResult<()> {
        let counts = self.shared.counts.lock();
        if counts.active == 0 && counts.forbidding == 0 {
            return Ok(());
        }
        Err(EngineError::InvariantViolation {
            context: format!(
                "tick scope not quiescent: active={} forbidding={} entered={} exited={}",
                counts.active, counts.forbidding, counts.entered, counts.exited
            ),
        })
    }

    /// Counter snapshot.
    pub fn get_stats(&self) -> TickStats {
        let counts = self.shared.counts.lock();
        TickStats {
            active_ticks: counts.active,
            forbidding_ticks: counts.forbidding,
            ticks_entered: counts.entered,
            ticks_exited: counts.exited,
            rest_calls: self.shared.rest_calls.load(Ordering::Relaxed),
            rest_violations: self.shared.violations.load(Ordering::Relaxed),
        }
    }

    fn release(&self, rest_forbidden: bool) {
        LOCAL_TICK.with(|local| {
            let mut state = local.get();
            state.depth = state.depth.saturating_sub(1);
            if rest_forbidden {
                state.forbidding = state.forbidding.saturating_sub(1);
            }
            local.set(state);
        });

        let mut counts = self.shared.counts.lock();
        counts.exited += 1;

        let active_ok = match counts.active.checked_sub(1) {
            Some(active) => {
                counts.active = active;
                true
            }
            None => false,
        };

        let forbidding_ok = if rest_forbidden {
            match counts.forbidding.checked_sub(1) {
                Some(forbidding) => {
                    counts.forbidding = forbidding;
                    true
                }
                None => false,
            }
        } else {
            true
        };

        if !(active_ok && forbidding_ok) {
            error!(
                target: "risk_alert",
                active = counts.active,
                forbidding = counts.forbidding,
                "Tick released without matching acquire"
            );
            // Never panic while already unwinding.
            if !std::thread::panicking() {
                debug_assert!(false, "tick released without matching acquire");
            }
        } else {
            debug!(
                active = counts.active,
                forbidding = counts.forbidding,
                "Tick released"
            );
        }
    }
}

/// Scoped handle for an active tick. Not `Send`.
#[must_use = "a tick ends as soon as its guard is dropped"]
pub struct TickGuard<'a> {
    scope: &'a TickScope,
    rest_forbidden: bool,
    _not_send: PhantomData<*const ()>,
}

impl TickGuard<'_> {
    /// Whether this tick forbids REST calls.
    pub fn rest_forbidden(&self) -> bool {
        self.rest_forbidden
    }
}

impl Drop for TickGuard<'_> {
    fn drop(&mut self) {
        self.scope.release(self.rest_forbidden);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::panic::{catch_unwind, AssertUnwindSafe};

    #[test]
    fn test_rest_call_outside_tick_is_allowed() {
        let scope = TickScope::new();
        assert_eq!(scope.record_rest_call("/api/v3/order"), RestCallCheck::Allowed);
        assert_eq!(scope.violation_count(), 0);
    }

    #[test]
    fn test_rest_call_inside_forbidding_tick_is_violation() {
        let scope = TickScope::new();
        {
            let guard = scope.enter_tick(true);
            assert!(guard.rest_forbidden());
            assert!(TickScope::current_thread_forbids_rest());
            assert!(scope.record_rest_call("/api/v3/order").is_violation());
        }
        assert_eq!(scope.violation_count(), 1);
        assert!(!TickScope::current_thread_in_tick());
        assert!(scope.check_quiescent().is_ok());
    }

    #[test]
    fn test_permissive_tick_allows_rest() {
        let scope = TickScope::new();
        let _guard = scope.enter_tick(false);
        assert!(scope.is_active());
        assert!(!scope.is_rest_forbidden());
        assert_eq!(scope.record_rest_call("/depth"), RestCallCheck::Allowed);
    }

    #[test]
    fn test_nested_ticks_do_not_reset_early() {
        let scope = TickScope::new();
        let outer = scope.enter_tick(true);
        {
            let _inner = scope.enter_tick(true);
            assert_eq!(scope.forbidding_count(), 2);
        }
        // Inner exit must not clear the outer tick's state.
        assert!(scope.is_rest_forbidden());
        assert!(TickScope::current_thread_forbids_rest());
        drop(outer);
        assert!(!scope.is_rest_forbidden());
        assert!(scope.check_quiescent().is_ok());
    }

    #[test]
    fn test_violation_observed_from_other_thread() {
        let scope = TickScope::new();
        let _guard = scope.enter_tick(true);

        let remote = scope.clone();
        let check = std::thread::spawn(move || {
            assert!(!TickScope::current_thread_in_tick());
            remote.record_rest_call("/api/v3/account")
        })
        .join()
        .unwrap();

        assert!(check.is_violation());
        assert_eq!(scope.violation_count(), 1);
    }

    #[test]
    fn test_release_on_panic() {
        let scope = TickScope::new();
        let result = catch_unwind(AssertUnwindSafe(|| {
            let _guard = scope.enter_tick(true);
            panic!("evaluation failed");
        }));

        assert!(result.is_err());
        assert_eq!(scope.active_count(), 0);
        assert_eq!(scope.forbidding_count(), 0);
        assert!(!TickScope::current_thread_in_tick());
    }

    #[test]
    fn test_leaked_guard_is_detected() {
        let scope = TickScope::new();
        std::mem::forget(scope.enter_tick(true));

        // A skipped release leaves the forbidding count stuck above zero.
        assert!(scope.is_rest_forbidden());
        assert!(matches!(
            scope.check_quiescent(),
            Err(EngineError::InvariantViolation { .. })
        ));

        // Reset the thread-local depth left behind by the leaked guard.
        LOCAL_TICK.with(|local| local.set(LocalTick::default()));
    }

    #[test]
    fn test_run_helper_and_stats() {
        let scope = TickScope::new();
        let value = scope.run(true, || {
            scope.record_rest_call("/ticker");
            42
        });

        assert_eq!(value, 42);
        let stats = scope.get_stats();
        assert_eq!(stats.ticks_entered, 1);
        assert_eq!(stats.ticks_exited, 1);
        assert_eq!(stats.rest_calls, 1);
        assert_eq!(stats.rest_violations, 1);
        assert_eq!(stats.active_ticks, 0);
    }
}
