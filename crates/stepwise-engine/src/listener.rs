//! Step listeners.
//!
//! Two listener flavours observe step execution:
//!
//! - [`StepListener`]: uncorrelated and infallible, driven by
//!   [`StepReporter::execute_step`](crate::StepReporter::execute_step)
//! - [`ReportListener`]: every notification of one step carries the same
//!   [`CorrelationId`], and each notification may fail. Driven by
//!   [`StepReporter::report`](crate::StepReporter::report)
//!
//! Reporting-tool adapters implement one or both traits and are registered by
//! name in a [`ListenerCatalog`]. At startup the names listed in the settings
//! are resolved, in order, into a [`ListenerSet`].

use std::any::Any;
use std::fmt;
use std::sync::Arc;

use indexmap::IndexMap;
use parking_lot::Mutex;
use stepwise_core::{Artifacts, CorrelationId, Failure, UsageError};
use tracing::{debug, info, warn};

/// Uncorrelated, infallible step observer.
pub trait StepListener: Send + Sync {
    /// A step is about to run. The artifacts must not be retained.
    fn step_started(&self, artifacts: &Artifacts);

    /// The step that started last succeeded.
    fn step_passed(&self);

    /// The step that started last failed.
    fn step_failed(&self, failure: &Failure);
}

/// Correlated, fallible step observer.
pub trait ReportListener: Send + Sync {
    /// A step is about to run. The artifacts must not be retained.
    fn step_started(&self, id: &CorrelationId, artifacts: &Artifacts) -> Result<(), Failure>;

    /// The step with this id succeeded.
    fn step_passed(&self, id: &CorrelationId) -> Result<(), Failure>;

    /// The step with this id failed.
    fn step_failed(&self, id: &CorrelationId, failure: &Failure) -> Result<(), Failure>;
}

// ─────────────────────────────────────────────────────────────────────────────
// Built-in listeners
// ─────────────────────────────────────────────────────────────────────────────

/// Logs step lifecycle events through `tracing`.
#[derive(Clone, Copy, Debug, Default)]
pub struct TracingListener;

impl StepListener for TracingListener {
    fn step_started(&self, artifacts: &Artifacts) {
        let keyword = artifacts.keyword();
        info!(
            step = artifacts.name(),
            keyword = keyword.as_ref().map(|k| k.as_str()),
            params = artifacts.params().len(),
            "step started"
        );
    }

    fn step_passed(&self) {
        info!("step passed");
    }

    fn step_failed(&self, failure: &Failure) {
        warn!(failure_id = %failure.id(), error = %failure, "step failed");
    }
}

impl ReportListener for TracingListener {
    fn step_started(&self, id: &CorrelationId, artifacts: &Artifacts) -> Result<(), Failure> {
        let keyword = artifacts.keyword();
        info!(
            correlation_id = %id,
            step = artifacts.name(),
            keyword = keyword.as_ref().map(|k| k.as_str()),
            params = artifacts.params().len(),
            "step started"
        );
        Ok(())
    }

    fn step_passed(&self, id: &CorrelationId) -> Result<(), Failure> {
        info!(correlation_id = %id, "step passed");
        Ok(())
    }

    fn step_failed(&self, id: &CorrelationId, failure: &Failure) -> Result<(), Failure> {
        warn!(correlation_id = %id, failure_id = %failure.id(), error = %failure, "step failed");
        Ok(())
    }
}

/// One notification seen by a [`RecordingListener`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RecordedEvent {
    /// `step_started`, with the step name.
    Started {
        /// Correlation id, for correlated notifications.
        correlation: Option<CorrelationId>,
        /// Step name from the artifacts.
        name: String,
    },
    /// `step_passed`.
    Passed {
        /// Correlation id, for correlated notifications.
        correlation: Option<CorrelationId>,
    },
    /// `step_failed`, with the failure's message.
    Failed {
        /// Correlation id, for correlated notifications.
        correlation: Option<CorrelationId>,
        /// Display form of the primary error.
        message: String,
    },
}

impl RecordedEvent {
    /// Correlation id carried by the event, if any.
    #[must_use]
    pub fn correlation(&self) -> Option<&CorrelationId> {
        match self {
            Self::Started { correlation, .. }
            | Self::Passed { correlation }
            | Self::Failed { correlation, .. } => correlation.as_ref(),
        }
    }
}

/// Keeps every notification in memory, in arrival order.
#[derive(Debug, Default)]
pub struct RecordingListener {
    events: Mutex<Vec<RecordedEvent>>,
}

impl RecordingListener {
    /// Create an empty recorder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of recorded events.
    pub fn events(&self) -> Vec<RecordedEvent> {
        self.events.lock().clone()
    }

    /// Number of recorded events.
    pub fn len(&self) -> usize {
        self.events.lock().len()
    }

    /// Whether nothing was recorded.
    pub fn is_empty(&self) -> bool {
        self.events.lock().is_empty()
    }

    /// Forget all recorded events.
    pub fn clear(&self) {
        self.events.lock().clear();
    }

    fn record(&self, event: RecordedEvent) {
        self.events.lock().push(event);
    }
}

impl StepListener for RecordingListener {
    fn step_started(&self, artifacts: &Artifacts) {
        self.record(RecordedEvent::Started {
            correlation: None,
            name: artifacts.name().to_owned(),
        });
    }

    fn step_passed(&self) {
        self.record(RecordedEvent::Passed { correlation: None });
    }

    fn step_failed(&self, failure: &Failure) {
        self.record(RecordedEvent::Failed {
            correlation: None,
            message: failure.to_string(),
        });
    }
}

impl ReportListener for RecordingListener {
    fn step_started(&self, id: &CorrelationId, artifacts: &Artifacts) -> Result<(), Failure> {
        self.record(RecordedEvent::Started {
            correlation: Some(id.clone()),
            name: artifacts.name().to_owned(),
        });
        Ok(())
    }

    fn step_passed(&self, id: &CorrelationId) -> Result<(), Failure> {
        self.record(RecordedEvent::Passed {
            correlation: Some(id.clone()),
        });
        Ok(())
    }

    fn step_failed(&self, id: &CorrelationId, failure: &Failure) -> Result<(), Failure> {
        self.record(RecordedEvent::Failed {
            correlation: Some(id.clone()),
            message: failure.to_string(),
        });
        Ok(())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Binding, catalog, set
// ─────────────────────────────────────────────────────────────────────────────

/// A listener instance together with the traits it takes part in.
#[derive(Clone)]
pub struct ListenerBinding {
    step: Option<Arc<dyn StepListener>>,
    report: Option<Arc<dyn ReportListener>>,
    instance: Arc<dyn Any + Send + Sync>,
}

impl ListenerBinding {
    /// A listener that implements both traits.
    pub fn both<T>(listener: Arc<T>) -> Self
    where
        T: StepListener + ReportListener + 'static,
    {
        Self {
            step: Some(Arc::clone(&listener) as Arc<dyn StepListener>),
            report: Some(Arc::clone(&listener) as Arc<dyn ReportListener>),
            instance: listener,
        }
    }

    /// A listener that only receives uncorrelated notifications.
    pub fn step_only<T>(listener: Arc<T>) -> Self
    where
        T: StepListener + 'static,
    {
        Self {
            step: Some(Arc::clone(&listener) as Arc<dyn StepListener>),
            report: None,
            instance: listener,
        }
    }

    /// A listener that only receives correlated notifications.
    pub fn report_only<T>(listener: Arc<T>) -> Self
    where
        T: ReportListener + 'static,
    {
        Self {
            step: None,
            report: Some(Arc::clone(&listener) as Arc<dyn ReportListener>),
            instance: listener,
        }
    }

    /// The concrete listener, if it is a `T`.
    pub fn downcast<T: Send + Sync + 'static>(&self) -> Option<Arc<T>> {
        Arc::clone(&self.instance).downcast::<T>().ok()
    }
}

impl fmt::Debug for ListenerBinding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ListenerBinding")
            .field("step", &self.step.is_some())
            .field("report", &self.report.is_some())
            .finish()
    }
}

type ListenerFactory = Box<dyn Fn() -> ListenerBinding + Send + Sync>;

/// Named listener factories.
#[derive(Default)]
pub struct ListenerCatalog {
    factories: IndexMap<String, ListenerFactory>,
}

impl ListenerCatalog {
    /// Empty catalog.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Catalog with `"tracing"` and `"recording"` registered.
    #[must_use]
    pub fn with_builtins() -> Self {
        let mut catalog = Self::new();
        catalog.register("tracing", || ListenerBinding::both(Arc::new(TracingListener)));
        catalog.register("recording", || {
            ListenerBinding::both(Arc::new(RecordingListener::new()))
        });
        catalog
    }

    /// Register (or replace) a factory under `name`.
    pub fn register<F>(&mut self, name: impl Into<String>, factory: F)
    where
        F: Fn() -> ListenerBinding + Send + Sync + 'static,
    {
        let name = name.into();
        debug!(name = %name, "registering listener factory");
        let _ = self.factories.insert(name, Box::new(factory));
    }

    /// Build a fresh listener by name.
    pub fn resolve(&self, name: &str) -> Result<ListenerBinding, UsageError> {
        self.factories
            .get(name)
            .map(|factory| factory())
            .ok_or_else(|| UsageError::UnknownListener(name.to_owned()))
    }

    /// Whether a factory is registered under `name`.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.factories.contains_key(name)
    }

    /// Registered names in registration order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.factories.keys().map(String::as_str)
    }
}

impl fmt::Debug for ListenerCatalog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ListenerCatalog")
            .field("names", &self.names().collect::<Vec<_>>())
            .finish()
    }
}

/// Ordered listeners a reporter notifies.
#[derive(Clone, Default)]
pub struct ListenerSet {
    bindings: Vec<(String, ListenerBinding)>,
}

impl ListenerSet {
    /// Empty set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolve `names` in order against `catalog`.
    ///
    /// Fails on the first unknown name; nothing is built in that case.
    pub fn from_names<S: AsRef<str>>(names: &[S], catalog: &ListenerCatalog) -> Result<Self, UsageError> {
        if let Some(unknown) = names.iter().find(|n| !catalog.contains(n.as_ref())) {
            return Err(UsageError::UnknownListener(unknown.as_ref().to_owned()));
        }
        let mut set = Self::new();
        for name in names {
            let name = name.as_ref();
            set.push(name, catalog.resolve(name)?);
        }
        debug!(listeners = ?set.names().collect::<Vec<_>>(), "listeners resolved");
        Ok(set)
    }

    /// Resolve the listeners named in settings.
    pub fn from_settings(
        settings: &stepwise_settings::StepwiseSettings,
        catalog: &ListenerCatalog,
    ) -> Result<Self, UsageError> {
        Self::from_names(settings.listeners.as_slice(), catalog)
    }

    /// Append a binding. Notification order is append order.
    pub fn push(&mut self, name: impl Into<String>, binding: ListenerBinding) {
        self.bindings.push((name.into(), binding));
    }

    /// Builder form of [`push`](Self::push).
    #[must_use]
    pub fn with(mut self, name: impl Into<String>, binding: ListenerBinding) -> Self {
        self.push(name, binding);
        self
    }

    /// Listener names in notification order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.bindings.iter().map(|(name, _)| name.as_str())
    }

    /// Uncorrelated listeners in notification order.
    pub fn step_listeners(&self) -> impl Iterator<Item = &Arc<dyn StepListener>> {
        self.bindings.iter().filter_map(|(_, b)| b.step.as_ref())
    }

    /// Correlated listeners in notification order, with their names.
    pub fn report_listeners(&self) -> impl Iterator<Item = (&str, &Arc<dyn ReportListener>)> {
        self.bindings
            .iter()
            .filter_map(|(name, b)| b.report.as_ref().map(|l| (name.as_str(), l)))
    }

    /// First listener of concrete type `T`.
    pub fn find<T: Send + Sync + 'static>(&self) -> Option<Arc<T>> {
        self.bindings.iter().find_map(|(_, b)| b.downcast::<T>())
    }

    /// Number of listeners.
    #[must_use]
    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    /// Whether the set is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }
}

impl fmt::Debug for ListenerSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.names()).finish()
    }
}
