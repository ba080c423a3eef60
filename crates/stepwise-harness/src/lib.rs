//! # stepwise-harness
//!
//! Thin adapter between a test runner and the stepwise engine.
//!
//! A test body receives a [`TestContext`] for registering cleanup hooks and
//! reporting steps. [`run_test`] opens the test's scope, runs the body
//! (turning panics into failures), drains its hooks, and returns one
//! aggregated outcome. [`Harness`] builds the reporter, registry, and
//! exception handler from settings once per process.
//!
//! ## Crate Position
//!
//! Depends on: stepwise-core, stepwise-settings, stepwise-logging,
//! stepwise-engine.

#![deny(unsafe_code)]

pub mod context;
pub mod errors;
pub mod harness;

pub use context::{TestContext, run_test, run_test_with};
pub use errors::{HarnessError, Result};
pub use harness::Harness;
