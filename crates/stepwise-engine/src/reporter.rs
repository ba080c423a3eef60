//! Step execution and reporting.
//!
//! [`StepReporter`] wraps a fallible action with lifecycle notifications and
//! turns everything that went wrong (the action, the listeners, cleanup
//! hooks) into exactly one [`Failure`]. The action's own failure always
//! stays primary and keeps its identity; secondary failures are attached as
//! suppressed in the order they happened.

use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use stepwise_core::{Artifacts, CorrelationId, Failure, FailureCollector, UsageError};
use stepwise_settings::StepwiseSettings;
use tracing::{debug, warn};

use crate::handler::{ExceptionHandler, exception_handler, handler_from_settings};
use crate::hooks::HookContainer;
use crate::listener::{ListenerBinding, ListenerCatalog, ListenerSet, ReportListener, StepListener};

/// Runs steps and notifies listeners.
#[derive(Clone)]
pub struct StepReporter {
    listeners: ListenerSet,
    handler: Arc<dyn ExceptionHandler>,
}

impl StepReporter {
    /// Reporter over `listeners` using the process-wide exception handler.
    #[must_use]
    pub fn new(listeners: ListenerSet) -> Self {
        Self {
            listeners,
            handler: exception_handler(),
        }
    }

    /// Start building a reporter.
    #[must_use]
    pub fn builder() -> StepReporterBuilder {
        StepReporterBuilder::default()
    }

    /// Reporter with the listeners and handler described by settings.
    pub fn from_settings(settings: &StepwiseSettings, catalog: &ListenerCatalog) -> Result<Self, UsageError> {
        Ok(Self {
            listeners: ListenerSet::from_settings(settings, catalog)?,
            handler: handler_from_settings(&settings.handler),
        })
    }

    /// Listeners in notification order.
    #[must_use]
    pub fn listeners(&self) -> &ListenerSet {
        &self.listeners
    }

    /// Exception handler failures are routed through.
    #[must_use]
    pub fn handler(&self) -> &Arc<dyn ExceptionHandler> {
        &self.handler
    }

    /// Run `action` between uncorrelated notifications.
    ///
    /// The action's result is returned unchanged. A failure is passed to the
    /// exception handler before listeners see it.
    pub fn execute_step<R, F>(&self, artifacts: &Artifacts, action: F) -> Result<R, Failure>
    where
        F: FnOnce() -> Result<R, Failure>,
    {
        for listener in self.listeners.step_listeners() {
            listener.step_started(artifacts);
        }

        match action() {
            Ok(value) => {
                for listener in self.listeners.step_listeners() {
                    listener.step_passed();
                }
                Ok(value)
            }
            Err(mut failure) => {
                self.handler.handle(&mut failure);
                for listener in self.listeners.step_listeners() {
                    listener.step_failed(&failure);
                }
                Err(failure)
            }
        }
    }

    /// Run `action` between correlated, fallible notifications.
    ///
    /// - action failed: its failure is returned, with every listener failure
    ///   suppressed onto it in the order they occurred
    /// - action succeeded, a listener failed: the first listener failure is
    ///   returned with the later ones suppressed onto it
    /// - otherwise the action's value is returned unchanged
    ///
    /// A panicking listener counts as a failing one.
    pub fn report<R, F>(&self, artifacts: &Artifacts, action: F) -> Result<R, Failure>
    where
        F: FnOnce() -> Result<R, Failure>,
    {
        let id = CorrelationId::new();
        let mut listener_failures = FailureCollector::new();

        for (name, listener) in self.listeners.report_listeners() {
            let result = contained(|| listener.step_started(&id, artifacts));
            self.collect(&mut listener_failures, &id, name, "step_started", result);
        }

        match action() {
            Ok(value) => {
                for (name, listener) in self.listeners.report_listeners() {
                    let result = contained(|| listener.step_passed(&id));
                    self.collect(&mut listener_failures, &id, name, "step_passed", result);
                }
                match listener_failures.into_result() {
                    Ok(()) => Ok(value),
                    Err(mut failure) => {
                        self.handler.handle(&mut failure);
                        debug!(correlation_id = %id, failure_id = %failure.id(), "passed step reported as failed");
                        Err(failure)
                    }
                }
            }
            Err(mut failure) => {
                self.handler.handle(&mut failure);
                for (name, listener) in self.listeners.report_listeners() {
                    let result = contained(|| listener.step_failed(&id, &failure));
                    self.collect(&mut listener_failures, &id, name, "step_failed", result);
                }
                Err(listener_failures.attach_to(failure))
            }
        }
    }

    /// Run `action`; on failure drain `hooks` onto the failure.
    ///
    /// Hooks stay pending when the action succeeds; the owning scope drains
    /// them when it closes.
    pub fn exec<R, F>(&self, hooks: &HookContainer, action: F) -> Result<R, Failure>
    where
        F: FnOnce() -> Result<R, Failure>,
    {
        action().map_err(|failure| {
            let mut failure = hooks.call_hooks_with(failure);
            self.handler.handle(&mut failure);
            failure
        })
    }

    fn collect(
        &self,
        collector: &mut FailureCollector,
        id: &CorrelationId,
        listener: &str,
        phase: &'static str,
        result: Result<(), Failure>,
    ) {
        if let Err(mut failure) = result {
            self.handler.handle(&mut failure);
            warn!(correlation_id = %id, listener, phase, error = %failure, "listener failed");
            collector.collect(failure);
        }
    }
}

/// Run one listener notification, turning a panic into a [`Failure`].
fn contained(call: impl FnOnce() -> Result<(), Failure>) -> Result<(), Failure> {
    panic::catch_unwind(AssertUnwindSafe(call))
        .unwrap_or_else(|payload| Err(Failure::from_panic(payload.as_ref())))
}

impl Default for StepReporter {
    fn default() -> Self {
        Self::new(ListenerSet::new())
    }
}

impl fmt::Debug for StepReporter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StepReporter")
            .field("listeners", &self.listeners)
            .field("handler", &self.handler.name())
            .finish()
    }
}

/// Builder for [`StepReporter`].
#[derive(Default)]
pub struct StepReporterBuilder {
    listeners: ListenerSet,
    handler: Option<Arc<dyn ExceptionHandler>>,
}

impl StepReporterBuilder {
    /// Append a listener.
    #[must_use]
    pub fn listener(mut self, name: impl Into<String>, binding: ListenerBinding) -> Self {
        self.listeners.push(name, binding);
        self
    }

    /// Append a listener implementing both traits.
    #[must_use]
    pub fn both<T>(self, name: impl Into<String>, listener: Arc<T>) -> Self
    where
        T: StepListener + ReportListener + 'static,
    {
        self.listener(name, ListenerBinding::both(listener))
    }

    /// Replace all listeners.
    #[must_use]
    pub fn listeners(mut self, listeners: ListenerSet) -> Self {
        self.listeners = listeners;
        self
    }

    /// Use a dedicated exception handler instead of the process-wide one.
    #[must_use]
    pub fn handler(mut self, handler: Arc<dyn ExceptionHandler>) -> Self {
        self.handler = Some(handler);
        self
    }

    /// Build the reporter.
    #[must_use]
    pub fn build(self) -> StepReporter {
        StepReporter {
            listeners: self.listeners,
            handler: self.handler.unwrap_or_else(exception_handler),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handler::NoopHandler;
    use crate::listener::{RecordedEvent, RecordingListener};
    use parking_lot::Mutex;

    /// Report listener that fails in chosen phases and logs every call.
    struct Flaky {
        label: &'static str,
        fail_start: bool,
        fail_end: bool,
        calls: Arc<Mutex<Vec<String>>>,
    }

    impl Flaky {
        fn new(label: &'static str, fail_start: bool, fail_end: bool, calls: &Arc<Mutex<Vec<String>>>) -> Self {
            Self {
                label,
                fail_start,
                fail_end,
                calls: Arc::clone(calls),
            }
        }

        fn outcome(&self, phase: &str, fail: bool) -> Result<(), Failure> {
            self.calls.lock().push(format!("{}:{phase}", self.label));
            if fail {
                Err(Failure::msg(format!("{} {phase}", self.label)))
            } else {
                Ok(())
            }
        }
    }

    impl ReportListener for Flaky {
        fn step_started(&self, _id: &CorrelationId, _artifacts: &Artifacts) -> Result<(), Failure> {
            self.outcome("started", self.fail_start)
        }

        fn step_passed(&self, _id: &CorrelationId) -> Result<(), Failure> {
            self.outcome("passed", self.fail_end)
        }

        fn step_failed(&self, _id: &CorrelationId, _failure: &Failure) -> Result<(), Failure> {
            self.outcome("failed", self.fail_end)
        }
    }

    fn reporter_with(listeners: Vec<Flaky>) -> StepReporter {
        let mut builder = StepReporter::builder().handler(Arc::new(NoopHandler));
        for (i, l) in listeners.into_iter().enumerate() {
            builder = builder.listener(format!("flaky{i}"), ListenerBinding::report_only(Arc::new(l)));
        }
        builder.build()
    }

    #[test]
    fn report_success_returns_value_unchanged() {
        let recorder = Arc::new(RecordingListener::new());
        let reporter = StepReporter::builder()
            .handler(Arc::new(NoopHandler))
            .both("recording", Arc::clone(&recorder))
            .build();

        let shared = Arc::new(vec![1, 2, 3]);
        let returned = reporter
            .report(&Artifacts::named("load"), || Ok(Arc::clone(&shared)))
            .unwrap();
        assert!(Arc::ptr_eq(&returned, &shared));

        let events = recorder.events();
        assert_eq!(events.len(), 2);
        assert!(matches!(&events[0], RecordedEvent::Started { name, .. } if name == "load"));
        assert!(matches!(events[1], RecordedEvent::Passed { .. }));
        assert_eq!(events[0].correlation(), events[1].correlation());
        assert!(events[0].correlation().is_some());
    }

    #[test]
    fn each_report_gets_its_own_correlation_id() {
        let recorder = Arc::new(RecordingListener::new());
        let reporter = StepReporter::builder()
            .handler(Arc::new(NoopHandler))
            .both("recording", Arc::clone(&recorder))
            .build();
        reporter.report(&Artifacts::named("a"), || Ok(())).unwrap();
        reporter.report(&Artifacts::named("b"), || Ok(())).unwrap();
        let events = recorder.events();
        assert_ne!(events[0].correlation(), events[2].correlation());
    }

    #[test]
    fn report_failure_keeps_action_failure_primary() {
        let calls = Arc::default();
        let reporter = reporter_with(vec![
            Flaky::new("a", false, true, &calls),
            Flaky::new("b", false, false, &calls),
        ]);

        let action_failure = Failure::msg("element not found");
        let action_id = action_failure.id();
        let err = reporter
            .report(&Artifacts::named("click"), || Err::<(), _>(action_failure))
            .unwrap_err();

        assert_eq!(err.id(), action_id);
        assert_eq!(err.all_messages(), ["element not found", "a failed"]);
        assert_eq!(*calls.lock(), ["a:started", "b:started", "a:failed", "b:failed"]);
    }

    #[test]
    fn listener_failures_are_chronological_across_phases() {
        let calls = Arc::default();
        let reporter = reporter_with(vec![
            Flaky::new("a", false, true, &calls),
            Flaky::new("b", true, false, &calls),
        ]);
        let err = reporter
            .report(&Artifacts::named("x"), || Err::<(), _>(Failure::msg("action")))
            .unwrap_err();
        assert_eq!(err.all_messages(), ["action", "b started", "a failed"]);
    }

    #[test]
    fn listener_failure_turns_success_into_failure() {
        let calls = Arc::default();
        let reporter = reporter_with(vec![
            Flaky::new("a", true, false, &calls),
            Flaky::new("b", false, true, &calls),
        ]);
        let err = reporter
            .report(&Artifacts::named("x"), || Ok(42))
            .unwrap_err();
        assert_eq!(err.all_messages(), ["a started", "b passed"]);
        // The action still ran and every listener heard the outcome.
        assert_eq!(calls.lock().len(), 4);
    }

    /// Report listener that panics in chosen phases.
    struct Panicky {
        on_start: bool,
    }

    impl ReportListener for Panicky {
        fn step_started(&self, _id: &CorrelationId, _artifacts: &Artifacts) -> Result<(), Failure> {
            assert!(!self.on_start, "listener blew up on start");
            Ok(())
        }

        fn step_passed(&self, _id: &CorrelationId) -> Result<(), Failure> {
            Ok(())
        }

        fn step_failed(&self, _id: &CorrelationId, _failure: &Failure) -> Result<(), Failure> {
            panic!("listener blew up on failure");
        }
    }

    fn panicky_then_recorder(on_start: bool) -> (StepReporter, Arc<RecordingListener>) {
        let recorder = Arc::new(RecordingListener::new());
        let reporter = StepReporter::builder()
            .handler(Arc::new(NoopHandler))
            .listener("panicky", ListenerBinding::report_only(Arc::new(Panicky { on_start })))
            .both("recording", Arc::clone(&recorder))
            .build();
        (reporter, recorder)
    }

    #[test]
    fn panicking_listener_is_suppressed_onto_action_failure() {
        let (reporter, recorder) = panicky_then_recorder(false);
        let action_failure = Failure::msg("action");
        let action_id = action_failure.id();

        let err = reporter
            .report(&Artifacts::named("x"), || Err::<(), _>(action_failure))
            .unwrap_err();

        assert_eq!(err.id(), action_id);
        assert_eq!(err.suppressed().len(), 1);
        assert!(err.suppressed()[0].is_panic());
        assert!(err.suppressed()[0].to_string().contains("listener blew up on failure"));

        // The listener after the panicking one still heard the outcome.
        let events = recorder.events();
        assert_eq!(events.len(), 2);
        assert!(matches!(&events[1], RecordedEvent::Failed { message, .. } if message == "action"));
    }

    #[test]
    fn panicking_listener_on_start_fails_passing_step() {
        let (reporter, recorder) = panicky_then_recorder(true);
        let err = reporter.report(&Artifacts::named("x"), || Ok(1)).unwrap_err();
        assert!(err.is_panic());
        assert!(err.to_string().contains("listener blew up on start"));
        assert!(matches!(recorder.events()[..], [RecordedEvent::Started { .. }, RecordedEvent::Passed { .. }]));
    }

    #[test]
    fn execute_step_notifies_in_order() {
        let recorder = Arc::new(RecordingListener::new());
        let reporter = StepReporter::builder()
            .handler(Arc::new(NoopHandler))
            .listener("recording", ListenerBinding::step_only(Arc::clone(&recorder)))
            .build();

        assert_eq!(reporter.execute_step(&Artifacts::named("ok"), || Ok(7)).unwrap(), 7);
        let failure = Failure::msg("bad");
        let fid = failure.id();
        let err = reporter
            .execute_step(&Artifacts::named("bad"), || Err::<(), _>(failure))
            .unwrap_err();
        assert_eq!(err.id(), fid);
        assert!(err.suppressed().is_empty());

        assert_eq!(
            recorder.events(),
            [
                RecordedEvent::Started { correlation: None, name: "ok".into() },
                RecordedEvent::Passed { correlation: None },
                RecordedEvent::Started { correlation: None, name: "bad".into() },
                RecordedEvent::Failed { correlation: None, message: "bad".into() },
            ]
        );
    }

    #[test]
    fn exec_drains_hooks_only_on_failure() {
        let reporter = StepReporter::builder().handler(Arc::new(NoopHandler)).build();
        let hooks = HookContainer::new();
        hooks.add_hook(5, || Err(Failure::msg("rollback failed"))).unwrap();

        assert_eq!(reporter.exec(&hooks, || Ok("done")).unwrap(), "done");
        assert_eq!(hooks.len(), 1);

        let failure = Failure::msg("insert failed");
        let fid = failure.id();
        let err = reporter.exec(&hooks, || Err::<(), _>(failure)).unwrap_err();
        assert_eq!(err.id(), fid);
        assert_eq!(err.all_messages(), ["insert failed", "rollback failed"]);
        assert!(hooks.is_empty());
    }

    #[test]
    fn listener_failures_are_logged() {
        let (logs, _guard) = stepwise_logging::capture_logs();
        let calls = Arc::default();
        let reporter = reporter_with(vec![Flaky::new("a", true, false, &calls)]);
        let _ = reporter.report(&Artifacts::named("x"), || Ok(()));
        let warned = logs
            .events()
            .into_iter()
            .find(|e| e.message.contains("listener failed"))
            .unwrap();
        assert_eq!(warned.field("listener"), Some("flaky0"));
        assert_eq!(warned.field("phase"), Some("step_started"));
    }

    #[test]
    fn from_settings_resolves_listeners_and_handler() {
        let mut settings = StepwiseSettings::default();
        settings.listeners = vec!["recording".into()];
        settings.handler.kind = stepwise_settings::HandlerKind::Noop;
        let reporter = StepReporter::from_settings(&settings, &ListenerCatalog::with_builtins()).unwrap();
        assert_eq!(reporter.handler().name(), "noop");
        assert!(reporter.listeners().find::<RecordingListener>().is_some());

        settings.listeners = vec!["extent".into()];
        assert!(StepReporter::from_settings(&settings, &ListenerCatalog::with_builtins()).is_err());
    }
}
