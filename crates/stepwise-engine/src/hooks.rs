//! Priority-ordered cleanup hooks.
//!
//! A [`HookContainer`] belongs to exactly one scope (a step chain or a test).
//! Hooks are registered while the scope is open and drained once when it
//! closes. Draining runs hooks by priority descending; hooks with equal
//! priority run in registration order. Every hook runs, even when earlier
//! ones fail or panic, and their failures are folded into one outcome.

use std::cmp::Reverse;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};

use parking_lot::Mutex;
use stepwise_core::{Failure, FailureCollector, HookPriority, UsageError};
use tracing::{debug, warn};

/// Deferred cleanup action.
pub type HookAction = Box<dyn FnOnce() -> Result<(), Failure> + Send>;

/// A deferred action tagged with a priority.
pub struct Hook {
    priority: HookPriority,
    action: HookAction,
}

impl Hook {
    /// Create a hook.
    pub fn new<F>(priority: HookPriority, action: F) -> Self
    where
        F: FnOnce() -> Result<(), Failure> + Send + 'static,
    {
        Self {
            priority,
            action: Box::new(action),
        }
    }

    /// Priority of this hook.
    #[must_use]
    pub fn priority(&self) -> HookPriority {
        self.priority
    }

    /// Run the hook, turning a panic into a [`Failure`].
    pub fn run(self) -> Result<(), Failure> {
        match panic::catch_unwind(AssertUnwindSafe(self.action)) {
            Ok(result) => result,
            Err(payload) => Err(Failure::from_panic(payload.as_ref())),
        }
    }
}

impl fmt::Debug for Hook {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Hook")
            .field("priority", &self.priority)
            .finish_non_exhaustive()
    }
}

/// Thread-safe collection of hooks for one scope.
#[derive(Default)]
pub struct HookContainer {
    hooks: Mutex<Vec<Hook>>,
}

impl HookContainer {
    /// Create an empty container.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a hook with a raw priority.
    ///
    /// Fails with [`UsageError::PriorityOutOfRange`] and registers nothing
    /// when `priority` lies outside `[MIN_HOOK_PRIORITY, MAX_HOOK_PRIORITY]`.
    pub fn add_hook<F>(&self, priority: i32, action: F) -> Result<(), UsageError>
    where
        F: FnOnce() -> Result<(), Failure> + Send + 'static,
    {
        let priority = HookPriority::new(priority)?;
        self.add_hook_at(priority, action);
        Ok(())
    }

    /// Register a hook with a validated priority.
    pub fn add_hook_at<F>(&self, priority: HookPriority, action: F)
    where
        F: FnOnce() -> Result<(), Failure> + Send + 'static,
    {
        self.push(Hook::new(priority, action));
    }

    /// Register an already built hook.
    pub fn push(&self, hook: Hook) {
        let priority = hook.priority().get();
        let mut hooks = self.hooks.lock();
        hooks.push(hook);
        debug!(priority, pending = hooks.len(), "hook registered");
    }

    /// Number of hooks waiting to run.
    #[must_use]
    pub fn len(&self) -> usize {
        self.hooks.lock().len()
    }

    /// Whether no hooks are waiting.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.hooks.lock().is_empty()
    }

    /// Run every pending hook.
    ///
    /// Returns the first failure in execution order with the later ones
    /// suppressed onto it, or `Ok(())` if all hooks succeeded.
    pub fn call_hooks(&self) -> Result<(), Failure> {
        self.drain().into_result()
    }

    /// Run every pending hook, suppressing each hook failure onto `base`.
    #[must_use]
    pub fn call_hooks_with(&self, base: Failure) -> Failure {
        self.drain().attach_to(base)
    }

    fn drain(&self) -> FailureCollector {
        // Released before any hook runs. Hooks registered by a running hook
        // stay pending for the next drain.
        let mut hooks = std::mem::take(&mut *self.hooks.lock());
        hooks.sort_by_key(|h| Reverse(h.priority()));

        let mut failures = FailureCollector::new();
        if hooks.is_empty() {
            return failures;
        }
        debug!(count = hooks.len(), "draining hooks");

        for hook in hooks {
            let priority = hook.priority().get();
            if let Err(failure) = hook.run() {
                warn!(priority, failure_id = %failure.id(), error = %failure, "hook failed");
                failures.collect(failure);
            }
        }
        failures
    }
}

impl fmt::Debug for HookContainer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HookContainer")
            .field("pending", &self.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use assert_matches::assert_matches;
    use stepwise_core::{FailureId, MAX_HOOK_PRIORITY, MIN_HOOK_PRIORITY};

    type Log = Arc<Mutex<Vec<u32>>>;

    fn appender(log: &Log, value: u32) -> impl FnOnce() -> Result<(), Failure> + Send + 'static {
        let log = Arc::clone(log);
        move || {
            log.lock().push(value);
            Ok(())
        }
    }

    #[test]
    fn empty_container_succeeds() {
        let hooks = HookContainer::new();
        assert!(hooks.is_empty());
        assert!(hooks.call_hooks().is_ok());
    }

    #[test]
    fn runs_by_priority_descending_ties_in_registration_order() {
        let log: Log = Arc::default();
        let hooks = HookContainer::new();
        for (value, priority) in [(1, 5), (2, 5), (3, 9), (4, 9), (5, 9), (6, 3)] {
            hooks.add_hook(priority, appender(&log, value)).unwrap();
        }
        hooks.call_hooks().unwrap();
        assert_eq!(*log.lock(), [3, 4, 5, 1, 2, 6]);
    }

    #[test]
    fn first_failure_primary_rest_suppressed() {
        let log: Log = Arc::default();
        let hooks = HookContainer::new();
        let mut e1_id: Option<FailureId> = None;
        let mut e2_id: Option<FailureId> = None;
        for (value, priority) in [(1, 5), (2, 5), (3, 9), (4, 9), (5, 9), (6, 3)] {
            let log = Arc::clone(&log);
            let failure = match value {
                4 => Some(Failure::msg("E1")),
                2 => Some(Failure::msg("E2")),
                _ => None,
            };
            if let Some(f) = &failure {
                if value == 4 {
                    e1_id = Some(f.id());
                } else {
                    e2_id = Some(f.id());
                }
            }
            hooks
                .add_hook(priority, move || {
                    log.lock().push(value);
                    failure.map_or(Ok(()), Err)
                })
                .unwrap();
        }

        let err = hooks.call_hooks().unwrap_err();
        assert_eq!(Some(err.id()), e1_id);
        assert_eq!(err.to_string(), "E1");
        assert_eq!(err.suppressed().len(), 1);
        assert_eq!(Some(err.suppressed()[0].id()), e2_id);
        // Failing hooks did not stop the rest.
        assert_eq!(*log.lock(), [3, 4, 5, 1, 2, 6]);
    }

    #[test]
    fn call_hooks_with_attaches_everything_to_base() {
        let hooks = HookContainer::new();
        hooks.add_hook(2, || Err(Failure::msg("low"))).unwrap();
        hooks.add_hook(8, || Err(Failure::msg("high"))).unwrap();
        hooks.add_hook(5, || Ok(())).unwrap();

        let base = Failure::msg("step failed");
        let base_id = base.id();
        let out = hooks.call_hooks_with(base);
        assert_eq!(out.id(), base_id);
        assert_eq!(out.all_messages(), ["step failed", "high", "low"]);
    }

    #[test]
    fn call_hooks_with_no_hooks_returns_base() {
        let out = HookContainer::new().call_hooks_with(Failure::msg("base"));
        assert!(out.suppressed().is_empty());
    }

    #[test]
    fn out_of_range_priority_rejected_without_registering() {
        let hooks = HookContainer::new();
        let err = hooks.add_hook(MAX_HOOK_PRIORITY + 1, || Ok(())).unwrap_err();
        assert_matches!(err, UsageError::PriorityOutOfRange { priority: 11, .. });
        let err = hooks.add_hook(MIN_HOOK_PRIORITY - 1, || Ok(())).unwrap_err();
        assert_matches!(err, UsageError::PriorityOutOfRange { priority: 0, .. });
        assert!(hooks.is_empty());
    }

    #[test]
    fn panicking_hook_becomes_failure_and_others_run() {
        let ran = Arc::new(AtomicUsize::new(0));
        let hooks = HookContainer::new();
        hooks
            .add_hook(9, || -> Result<(), Failure> { panic!("hook exploded") })
            .unwrap();
        let counter = Arc::clone(&ran);
        hooks
            .add_hook(1, move || {
                let _ = counter.fetch_add(1, Ordering::SeqCst);
                Ok(())
            })
            .unwrap();

        let err = hooks.call_hooks().unwrap_err();
        assert!(err.is_panic());
        assert!(err.to_string().contains("hook exploded"));
        assert_eq!(ran.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn second_drain_has_no_work() {
        let log: Log = Arc::default();
        let hooks = HookContainer::new();
        hooks.add_hook(5, appender(&log, 1)).unwrap();
        hooks.call_hooks().unwrap();
        hooks.call_hooks().unwrap();
        assert_eq!(*log.lock(), [1]);
    }

    #[test]
    fn hook_registered_during_drain_stays_pending() {
        let hooks = Arc::new(HookContainer::new());
        let inner = Arc::clone(&hooks);
        hooks
            .add_hook(5, move || {
                inner.add_hook_at(HookPriority::NORM, || Ok(()));
                Ok(())
            })
            .unwrap();
        hooks.call_hooks().unwrap();
        assert_eq!(hooks.len(), 1);
    }

    #[test]
    fn drain_logs_hook_failures() {
        let (logs, _guard) = stepwise_logging::capture_logs();
        let hooks = HookContainer::new();
        hooks.add_hook(5, || Err(Failure::msg("close failed"))).unwrap();
        let _ = hooks.call_hooks();
        assert!(logs.has_event(tracing::Level::WARN, "hook failed"));
        assert!(logs.has_event(tracing::Level::DEBUG, "draining hooks"));
    }

    mod proptests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn every_valid_priority_runs_exactly_once(p in MIN_HOOK_PRIORITY..=MAX_HOOK_PRIORITY) {
                let count = Arc::new(AtomicUsize::new(0));
                let hooks = HookContainer::new();
                let c = Arc::clone(&count);
                hooks.add_hook(p, move || {
                    let _ = c.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                }).unwrap();
                hooks.call_hooks().unwrap();
                hooks.call_hooks().unwrap();
                prop_assert_eq!(count.load(Ordering::SeqCst), 1);
            }

            #[test]
            fn execution_order_is_priority_descending(priorities in prop::collection::vec(MIN_HOOK_PRIORITY..=MAX_HOOK_PRIORITY, 0..20)) {
                let seen = Arc::new(Mutex::new(Vec::new()));
                let hooks = HookContainer::new();
                for (index, p) in priorities.iter().copied().enumerate() {
                    let seen = Arc::clone(&seen);
                    hooks.add_hook(p, move || {
                        seen.lock().push((p, index));
                        Ok(())
                    }).unwrap();
                }
                hooks.call_hooks().unwrap();
                let seen = seen.lock();
                prop_assert_eq!(seen.len(), priorities.len());
                for pair in seen.windows(2) {
                    let (p0, i0) = pair[0];
                    let (p1, i1) = pair[1];
                    prop_assert!(p0 > p1 || (p0 == p1 && i0 < i1));
                }
            }
        }
    }
}
