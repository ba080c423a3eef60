//! # stepwise-core
//!
//! Shared vocabulary for the stepwise step-reporting engine.
//!
//! - **Failures**: [`Failure`] carries one primary error plus an ordered list
//!   of suppressed secondary failures. Identity of the primary is preserved
//!   through a process-unique [`FailureId`].
//! - **Collection**: [`FailureCollector`] folds many failures into one
//!   deterministic outcome.
//! - **Artifacts**: [`Artifacts`] is the insertion-ordered metadata bag that
//!   describes a step.
//! - **IDs**: [`CorrelationId`] and [`TestId`] as branded newtypes.
//! - **Priorities**: [`HookPriority`] bounded by [`MIN_HOOK_PRIORITY`] and
//!   [`MAX_HOOK_PRIORITY`].
//! - **Usage errors**: [`UsageError`] for invalid calls into the engine.

#![deny(unsafe_code)]

pub mod artifacts;
pub mod collector;
pub mod constants;
pub mod errors;
pub mod failure;
pub mod ids;
pub mod priority;

pub use artifacts::{ArtifactValue, Artifacts, Keyword};
pub use collector::FailureCollector;
pub use constants::{MAX_HOOK_PRIORITY, MIN_HOOK_PRIORITY, NORM_HOOK_PRIORITY};
pub use errors::UsageError;
pub use failure::{Failure, FailureId, PanicError, TraceFrame, capture_traces, set_capture_traces};
pub use ids::{CorrelationId, TestId};
pub use priority::HookPriority;
