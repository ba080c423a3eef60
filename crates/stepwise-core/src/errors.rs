//! Usage errors.
//!
//! A [`UsageError`] reports a call into the engine that could never succeed:
//! an out-of-range hook priority, a hook registered without an active test,
//! or a listener name nobody registered. These fail fast and leave no partial
//! state behind. They are distinct from [`Failure`](crate::Failure), which
//! carries the outcome of user actions, listeners, and hooks.

use thiserror::Error;

use crate::ids::TestId;

/// Invalid use of the engine API.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum UsageError {
    /// Hook priority outside `[min, max]`.
    #[error("hook priority {priority} is outside the allowed range [{min}, {max}]")]
    PriorityOutOfRange {
        /// Priority the caller supplied.
        priority: i32,
        /// Inclusive lower bound.
        min: i32,
        /// Inclusive upper bound.
        max: i32,
    },

    /// Hook registration for a test that was never begun or has already ended.
    #[error("no active test with id '{0}'; hooks can only be added between begin_test and end_test")]
    NoActiveTest(TestId),

    /// A test id was begun twice without ending in between.
    #[error("test '{0}' is already active")]
    TestAlreadyActive(TestId),

    /// A listener name in the settings has no factory in the catalog.
    #[error("unknown listener '{0}'")]
    UnknownListener(String),
}

impl UsageError {
    /// Short classification string for logging.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::PriorityOutOfRange { .. } => "priority_out_of_range",
            Self::NoActiveTest(_) => "no_active_test",
            Self::TestAlreadyActive(_) => "test_already_active",
            Self::UnknownListener(_) => "unknown_listener",
        }
    }
}
