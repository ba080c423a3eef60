//! Per-test context and the test runner entry point.

use std::panic::{self, AssertUnwindSafe};

use stepwise_core::{Artifacts, Failure, HookPriority, TestId, UsageError};
use stepwise_engine::{StepReporter, TestHookRegistry};
use tracing::{debug, info_span};

/// Handle a running test uses to register cleanup and report steps.
///
/// Passed explicitly to the test body; there is no ambient "current test".
#[derive(Debug)]
pub struct TestContext<'a> {
    id: TestId,
    registry: &'a TestHookRegistry,
    reporter: Option<&'a StepReporter>,
}

impl<'a> TestContext<'a> {
    /// Context for an already begun test.
    #[must_use]
    pub fn new(id: TestId, registry: &'a TestHookRegistry, reporter: Option<&'a StepReporter>) -> Self {
        Self {
            id,
            registry,
            reporter,
        }
    }

    /// Id of the running test.
    #[must_use]
    pub fn id(&self) -> &TestId {
        &self.id
    }

    /// Register a cleanup hook that runs when the test ends.
    pub fn add_hook<F>(&self, priority: i32, action: F) -> Result<(), UsageError>
    where
        F: FnOnce() -> Result<(), Failure> + Send + 'static,
    {
        self.registry.add_hook(&self.id, priority, action)
    }

    /// Register a cleanup hook at the conventional default priority.
    pub fn add_norm_hook<F>(&self, action: F) -> Result<(), UsageError>
    where
        F: FnOnce() -> Result<(), Failure> + Send + 'static,
    {
        self.registry.add_hook_at(&self.id, HookPriority::NORM, action)
    }

    /// Hooks registered so far.
    #[must_use]
    pub fn pending_hooks(&self) -> usize {
        self.registry.pending_hooks(&self.id).unwrap_or(0)
    }

    /// Report a step. Without a reporter the action simply runs.
    pub fn step<R, F>(&self, artifacts: &Artifacts, action: F) -> Result<R, Failure>
    where
        F: FnOnce() -> Result<R, Failure>,
    {
        match self.reporter {
            Some(reporter) => reporter.report(artifacts, action),
            None => action(),
        }
    }
}

/// Run one test body inside a registry scope.
///
/// A panicking body is turned into a [`Failure`]. Hooks always run, and the
/// body's outcome is combined with hook failures.
pub fn run_test<F>(registry: &TestHookRegistry, body: F) -> Result<(), Failure>
where
    F: FnOnce(&TestContext<'_>) -> Result<(), Failure>,
{
    run_test_with(registry, None, body)
}

/// [`run_test`] with a reporter available to [`TestContext::step`].
pub fn run_test_with<F>(
    registry: &TestHookRegistry,
    reporter: Option<&StepReporter>,
    body: F,
) -> Result<(), Failure>
where
    F: FnOnce(&TestContext<'_>) -> Result<(), Failure>,
{
    let id = registry.begin_test();
    let span = info_span!("test", test_id = %id);
    let _entered = span.enter();

    let cx = TestContext::new(id.clone(), registry, reporter);
    let outcome = match panic::catch_unwind(AssertUnwindSafe(|| body(&cx))) {
        Ok(outcome) => outcome,
        Err(payload) => {
            let failure = Failure::from_panic(payload.as_ref());
            debug!(failure_id = %failure.id(), "test body panicked");
            Err(failure)
        }
    };

    registry.end_test(id, outcome)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use parking_lot::Mutex;
    use stepwise_engine::NoopHandler;

    fn registry() -> TestHookRegistry {
        TestHookRegistry::with_handler(Arc::new(NoopHandler))
    }

    #[test]
    fn hooks_run_after_passing_body() {
        let reg = registry();
        let log: Arc<Mutex<Vec<&str>>> = Arc::default();
        let l = Arc::clone(&log);
        run_test(&reg, |cx| {
            let l2 = Arc::clone(&l);
            cx.add_norm_hook(move || {
                l2.lock().push("close db");
                Ok(())
            })?;
            cx.add_hook(9, move || {
                l.lock().push("release lock");
                Ok(())
            })?;
            assert_eq!(cx.pending_hooks(), 2);
            Ok(())
        })
        .unwrap();
        assert_eq!(*log.lock(), ["release lock", "close db"]);
        assert_eq!(reg.active_count(), 0);
    }

    #[test]
    fn panicking_body_still_drains_hooks() {
        let reg = registry();
        let err = run_test(&reg, |cx| {
            cx.add_norm_hook(|| Err(Failure::msg("teardown failed")))?;
            panic!("assertion failed: left == right");
        })
        .unwrap_err();
        assert!(err.is_panic());
        assert_eq!(err.suppressed().len(), 1);
        assert_eq!(err.suppressed()[0].to_string(), "teardown failed");
    }

    #[test]
    fn usage_error_from_body_fails_test() {
        let reg = registry();
        let err = run_test(&reg, |cx| {
            cx.add_hook(0, || Ok(()))?;
            Ok(())
        })
        .unwrap_err();
        assert!(err.is::<UsageError>());
    }

    #[test]
    fn step_without_reporter_runs_action() {
        let reg = registry();
        run_test(&reg, |cx| {
            let v = cx.step(&Artifacts::named("compute"), || Ok(2 + 2))?;
            assert_eq!(v, 4);
            Ok(())
        })
        .unwrap();
    }
}
