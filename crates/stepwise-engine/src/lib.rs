//! # stepwise-engine
//!
//! Step execution, listener notification, and deferred cleanup.
//!
//! - [`StepReporter`] runs a step between listener notifications and folds
//!   action, listener, and hook failures into one [`Failure`](stepwise_core::Failure)
//! - [`HookContainer`] holds priority-ordered cleanup hooks for one scope
//! - [`TestHookRegistry`] maps active tests to their hook containers
//! - [`ExceptionHandler`] post-processes every failure before it escapes
//!
//! ## Crate Position
//!
//! Depends on: stepwise-core, stepwise-settings.
//! Depended on by: stepwise-harness.

#![deny(unsafe_code)]

pub mod handler;
pub mod hooks;
pub mod listener;
pub mod registry;
pub mod reporter;

pub use handler::{
    CleanTraceHandler, DEFAULT_MEMO_CAPACITY, ExceptionHandler, NoopHandler, exception_handler,
    handler_from_settings, set_exception_handler,
};
pub use hooks::{Hook, HookAction, HookContainer};
pub use listener::{
    ListenerBinding, ListenerCatalog, ListenerSet, RecordedEvent, RecordingListener,
    ReportListener, StepListener, TracingListener,
};
pub use registry::{TestHookRegistry, TestLifecycle};
pub use reporter::{StepReporter, StepReporterBuilder};
