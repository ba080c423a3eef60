//! Per-test hook registry.
//!
//! Test-runner adapters open a scope per test with
//! [`TestHookRegistry::begin_test`], hand the resulting [`TestId`] to the
//! test body, and close the scope with [`TestHookRegistry::end_test`], which
//! drains the test's hooks exactly once and removes its entry.
//!
//! ```text
//! unregistered ──begin_test──▶ active ──add_hook*──▶ active ──end_test──▶ unregistered
//! ```
//!
//! Tests are isolated from each other: one test can only reach the hooks
//! registered under its own id. There is no ordering between tests.

use std::fmt;
use std::sync::{Arc, OnceLock};

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use stepwise_core::{Failure, HookPriority, TestId, UsageError};
use tracing::{debug, warn};

use crate::handler::{ExceptionHandler, exception_handler};
use crate::hooks::HookContainer;

/// Narrow interface test-runner adapters drive.
pub trait TestLifecycle: Send + Sync {
    /// Open a scope for a new test.
    fn begin_test(&self) -> TestId;

    /// Close the scope, run its hooks, and fold their failures into `outcome`.
    fn end_test(&self, id: TestId, outcome: Result<(), Failure>) -> Result<(), Failure>;
}

/// Registry entry for one active test.
#[derive(Default)]
struct TestEntry {
    /// Created on the first hook registration.
    hooks: OnceLock<HookContainer>,
}

/// Maps active tests to their hook containers.
pub struct TestHookRegistry {
    tests: DashMap<TestId, TestEntry>,
    handler: Option<Arc<dyn ExceptionHandler>>,
}

impl TestHookRegistry {
    /// Registry that routes failures through the process-wide handler.
    #[must_use]
    pub fn new() -> Self {
        Self {
            tests: DashMap::new(),
            handler: None,
        }
    }

    /// Registry with a dedicated exception handler.
    #[must_use]
    pub fn with_handler(handler: Arc<dyn ExceptionHandler>) -> Self {
        Self {
            tests: DashMap::new(),
            handler: Some(handler),
        }
    }

    /// Open a scope under a freshly generated id.
    pub fn begin_test(&self) -> TestId {
        let id = TestId::new();
        // A fresh v7 id cannot collide with an active one.
        let _ = self.tests.insert(id.clone(), TestEntry::default());
        debug!(test_id = %id, "test begun");
        id
    }

    /// Open a scope under an id supplied by the host runner.
    pub fn begin_test_with(&self, id: TestId) -> Result<(), UsageError> {
        match self.tests.entry(id) {
            Entry::Occupied(entry) => Err(UsageError::TestAlreadyActive(entry.key().clone())),
            Entry::Vacant(entry) => {
                debug!(test_id = %entry.key(), "test begun");
                let _ = entry.insert(TestEntry::default());
                Ok(())
            }
        }
    }

    /// Register a hook for an active test.
    ///
    /// Fails without changing anything when the priority is out of range or
    /// `id` is not active.
    pub fn add_hook<F>(&self, id: &TestId, priority: i32, action: F) -> Result<(), UsageError>
    where
        F: FnOnce() -> Result<(), Failure> + Send + 'static,
    {
        let priority = HookPriority::new(priority)?;
        self.add_hook_at(id, priority, action)
    }

    /// Register a hook with a validated priority.
    pub fn add_hook_at<F>(&self, id: &TestId, priority: HookPriority, action: F) -> Result<(), UsageError>
    where
        F: FnOnce() -> Result<(), Failure> + Send + 'static,
    {
        let entry = self
            .tests
            .get(id)
            .ok_or_else(|| UsageError::NoActiveTest(id.clone()))?;
        entry
            .hooks
            .get_or_init(HookContainer::new)
            .add_hook_at(priority, action);
        Ok(())
    }

    /// Close the scope of `id`, run its hooks, and combine the outcome.
    ///
    /// - test passed: the first hook failure (if any) becomes the outcome
    ///   with later ones suppressed onto it
    /// - test failed: hook failures are suppressed onto the test's failure
    ///
    /// The resulting failure passes through the exception handler. Ending a
    /// test that is not active runs no hooks and returns `outcome` as is
    /// (after handling).
    pub fn end_test(&self, id: TestId, outcome: Result<(), Failure>) -> Result<(), Failure> {
        let container = match self.tests.remove(&id) {
            Some((_, entry)) => entry.hooks.into_inner(),
            None => {
                warn!(test_id = %id, "end_test for a test that is not active");
                None
            }
        };

        let result = match (container, outcome) {
            (None, outcome) => outcome,
            (Some(hooks), Ok(())) => hooks.call_hooks(),
            (Some(hooks), Err(failure)) => Err(hooks.call_hooks_with(failure)),
        };

        match result {
            Ok(()) => {
                debug!(test_id = %id, "test ended");
                Ok(())
            }
            Err(mut failure) => {
                self.handler().handle(&mut failure);
                debug!(
                    test_id = %id,
                    failure_id = %failure.id(),
                    suppressed = failure.suppressed().len(),
                    "test ended with failure"
                );
                Err(failure)
            }
        }
    }

    /// Whether `id` has an open scope.
    #[must_use]
    pub fn is_active(&self, id: &TestId) -> bool {
        self.tests.contains_key(id)
    }

    /// Number of open scopes.
    #[must_use]
    pub fn active_count(&self) -> usize {
        self.tests.len()
    }

    /// Hooks waiting to run for `id`, or `None` if it is not active.
    #[must_use]
    pub fn pending_hooks(&self, id: &TestId) -> Option<usize> {
        self.tests
            .get(id)
            .map(|entry| entry.hooks.get().map_or(0, HookContainer::len))
    }

    fn handler(&self) -> Arc<dyn ExceptionHandler> {
        match &self.handler {
            Some(h) => Arc::clone(h),
            None => exception_handler(),
        }
    }
}

impl Default for TestHookRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl TestLifecycle for TestHookRegistry {
    fn begin_test(&self) -> TestId {
        Self::begin_test(self)
    }

    fn end_test(&self, id: TestId, outcome: Result<(), Failure>) -> Result<(), Failure> {
        Self::end_test(self, id, outcome)
    }
}

impl fmt::Debug for TestHookRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TestHookRegistry")
            .field("active", &self.active_count())
            .field("handler", &self.handler.as_ref().map(|h| h.name()))
            .finish()
    }
}
