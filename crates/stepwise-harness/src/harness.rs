//! Process startup for test runs.

use std::sync::Arc;

use stepwise_core::{Failure, set_capture_traces};
use stepwise_engine::{
    ListenerCatalog, ListenerSet, StepReporter, TestHookRegistry, handler_from_settings,
    set_exception_handler,
};
use stepwise_settings::{StepwiseSettings, get_settings, init_settings};
use tracing::info;

use crate::context::{TestContext, run_test_with};
use crate::errors::Result;

/// Everything a test run needs, built once from settings.
#[derive(Debug)]
pub struct Harness {
    settings: Arc<StepwiseSettings>,
    reporter: StepReporter,
    registry: TestHookRegistry,
}

impl Harness {
    /// Bootstrap from the process-wide settings with the built-in listeners.
    ///
    /// Settings are read through [`get_settings`], which loads them on first
    /// use and falls back to defaults when the file cannot be read.
    pub fn bootstrap() -> Result<Self> {
        let settings = StepwiseSettings::clone(&get_settings());
        Self::bootstrap_with(settings, &ListenerCatalog::with_builtins())
    }

    /// Bootstrap from explicit settings and listener catalog.
    ///
    /// Initializes logging, switches trace capture, installs the configured
    /// exception handler process-wide, and resolves the listeners. The
    /// settings become the process-wide settings.
    pub fn bootstrap_with(settings: StepwiseSettings, catalog: &ListenerCatalog) -> Result<Self> {
        settings.validate()?;
        let listeners = ListenerSet::from_settings(&settings, catalog)?;

        stepwise_logging::init(&settings.logging.level, settings.logging.json);
        set_capture_traces(settings.handler.capture_traces);

        let handler = handler_from_settings(&settings.handler);
        let _ = set_exception_handler(Arc::clone(&handler));

        let reporter = StepReporter::builder()
            .listeners(listeners)
            .handler(Arc::clone(&handler))
            .build();
        let registry = TestHookRegistry::with_handler(handler);

        info!(
            listeners = ?reporter.listeners().names().collect::<Vec<_>>(),
            handler = reporter.handler().name(),
            "harness ready"
        );

        init_settings(settings);
        Ok(Self {
            settings: get_settings(),
            reporter,
            registry,
        })
    }

    /// Settings the harness was built from.
    #[must_use]
    pub fn settings(&self) -> &Arc<StepwiseSettings> {
        &self.settings
    }

    /// Shared step reporter.
    #[must_use]
    pub fn reporter(&self) -> &StepReporter {
        &self.reporter
    }

    /// Registry scoping hooks to tests.
    #[must_use]
    pub fn registry(&self) -> &TestHookRegistry {
        &self.registry
    }

    /// Run one test body with steps reported through this harness.
    pub fn run_test<F>(&self, body: F) -> std::result::Result<(), Failure>
    where
        F: FnOnce(&TestContext<'_>) -> std::result::Result<(), Failure>,
    {
        run_test_with(&self.registry, Some(&self.reporter), body)
    }
}
