//! Aggregated failures.
//!
//! A [`Failure`] is the single value that escapes a failed step or test. It
//! owns the primary error exactly as the action produced it (never wrapped)
//! together with an ordered list of suppressed secondary failures from
//! listeners and hooks.
//!
//! Every failure gets a process-unique [`FailureId`] at construction. The id
//! travels with the value through the engine, so callers can check that the
//! failure they receive is the very one their action returned.
//!
//! When trace capture is switched on with [`set_capture_traces`], each new
//! failure records the call stack as a list of [`TraceFrame`]s. Exception
//! handlers are free to rewrite that list.

use std::any::Any;
use std::backtrace::Backtrace;
use std::error::Error as StdError;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::errors::UsageError;

type BoxError = Box<dyn StdError + Send + Sync + 'static>;

static NEXT_FAILURE_ID: AtomicU64 = AtomicU64::new(1);
static CAPTURE_TRACES: AtomicBool = AtomicBool::new(false);

/// Enable or disable trace capture for failures created after this call.
pub fn set_capture_traces(enabled: bool) {
    CAPTURE_TRACES.store(enabled, Ordering::Relaxed);
}

/// Whether new failures capture a trace.
#[must_use]
pub fn capture_traces() -> bool {
    CAPTURE_TRACES.load(Ordering::Relaxed)
}

/// Process-unique identity of a [`Failure`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct FailureId(u64);

impl FailureId {
    fn next() -> Self {
        Self(NEXT_FAILURE_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Raw numeric value.
    #[must_use]
    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for FailureId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "failure#{}", self.0)
    }
}

/// One frame of a captured trace.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TraceFrame {
    /// Demangled symbol, e.g. `stepwise_engine::hooks::HookContainer::call_hooks`.
    pub symbol: String,
    /// `file:line:col` when debug info was available.
    pub location: Option<String>,
}

impl TraceFrame {
    /// Frame with a symbol and no location.
    #[must_use]
    pub fn new(symbol: impl Into<String>) -> Self {
        Self {
            symbol: symbol.into(),
            location: None,
        }
    }

    /// Parse the rendered form of a [`Backtrace`] into frames.
    ///
    /// Lines look like `  12: some::symbol` followed by an optional
    /// `at path/to/file.rs:10:5` line. Anything else is ignored.
    #[must_use]
    pub fn parse_backtrace(rendered: &str) -> Vec<Self> {
        let mut frames: Vec<Self> = Vec::new();
        for line in rendered.lines() {
            let line = line.trim();
            if let Some(location) = line.strip_prefix("at ") {
                if let Some(last) = frames.last_mut() {
                    last.location = Some(location.to_owned());
                }
                continue;
            }
            if let Some((index, symbol)) = line.split_once(": ") {
                if !index.is_empty() && index.chars().all(|c| c.is_ascii_digit()) {
                    frames.push(Self::new(symbol));
                }
            }
        }
        frames
    }
}

impl fmt::Display for TraceFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.location {
            Some(location) => write!(f, "{} ({location})", self.symbol),
            None => f.write_str(&self.symbol),
        }
    }
}

/// Plain-message error behind [`Failure::msg`].
#[derive(Debug, Error)]
#[error("{0}")]
struct MessageError(String);

/// A panic converted into a failure.
#[derive(Debug, Error)]
#[error("panicked: {message}")]
pub struct PanicError {
    /// Panic payload rendered as text.
    pub message: String,
}

impl PanicError {
    /// Render a panic payload as returned by `std::panic::catch_unwind`.
    #[must_use]
    pub fn from_payload(payload: &(dyn Any + Send)) -> Self {
        let message = if let Some(s) = payload.downcast_ref::<&str>() {
            (*s).to_owned()
        } else if let Some(s) = payload.downcast_ref::<String>() {
            s.clone()
        } else {
            "non-string panic payload".to_owned()
        };
        Self { message }
    }
}

/// A primary error plus ordered suppressed failures.
pub struct Failure {
    id: FailureId,
    error: BoxError,
    suppressed: Vec<Failure>,
    trace: Vec<TraceFrame>,
}

impl Failure {
    /// Wrap an error value as a new failure.
    pub fn new<E>(error: E) -> Self
    where
        E: StdError + Send + Sync + 'static,
    {
        Self::from_boxed(Box::new(error))
    }

    /// Build a failure from an already boxed error.
    #[must_use]
    pub fn from_boxed(error: BoxError) -> Self {
        let trace = if capture_traces() {
            TraceFrame::parse_backtrace(&Backtrace::force_capture().to_string())
        } else {
            Vec::new()
        };
        Self {
            id: FailureId::next(),
            error,
            suppressed: Vec::new(),
            trace,
        }
    }

    /// A failure carrying only a message.
    #[must_use]
    pub fn msg(message: impl Into<String>) -> Self {
        Self::new(MessageError(message.into()))
    }

    /// Convert a caught panic payload into a failure.
    #[must_use]
    pub fn from_panic(payload: &(dyn Any + Send)) -> Self {
        Self::new(PanicError::from_payload(payload))
    }

    /// Identity of this failure.
    #[must_use]
    pub fn id(&self) -> FailureId {
        self.id
    }

    /// The primary error, exactly as supplied.
    #[must_use]
    pub fn error(&self) -> &(dyn StdError + Send + Sync + 'static) {
        self.error.as_ref()
    }

    /// Downcast the primary error to its concrete type.
    #[must_use]
    pub fn downcast_ref<E: StdError + 'static>(&self) -> Option<&E> {
        self.error.downcast_ref::<E>()
    }

    /// Whether the primary error is of type `E`.
    #[must_use]
    pub fn is<E: StdError + 'static>(&self) -> bool {
        self.error.is::<E>()
    }

    /// Whether this failure came from a caught panic.
    #[must_use]
    pub fn is_panic(&self) -> bool {
        self.is::<PanicError>()
    }

    /// Consume the failure and return the primary error. Suppressed
    /// failures are dropped.
    #[must_use]
    pub fn into_error(self) -> BoxError {
        self.error
    }

    /// Secondary failures in the order they were attached.
    #[must_use]
    pub fn suppressed(&self) -> &[Failure] {
        &self.suppressed
    }

    /// Attach a secondary failure. The primary is left untouched.
    pub fn add_suppressed(&mut self, failure: Failure) {
        self.suppressed.push(failure);
    }

    /// Builder form of [`add_suppressed`](Self::add_suppressed).
    #[must_use]
    pub fn with_suppressed(mut self, failure: Failure) -> Self {
        self.add_suppressed(failure);
        self
    }

    /// Mutable access to suppressed failures, for exception handlers that
    /// walk the whole tree.
    pub fn suppressed_mut(&mut self) -> &mut [Failure] {
        &mut self.suppressed
    }

    /// Captured trace frames, outermost last.
    #[must_use]
    pub fn trace(&self) -> &[TraceFrame] {
        &self.trace
    }

    /// Replace the trace.
    pub fn set_trace(&mut self, trace: Vec<TraceFrame>) {
        self.trace = trace;
    }

    /// Builder form of [`set_trace`](Self::set_trace).
    #[must_use]
    pub fn with_trace(mut self, trace: Vec<TraceFrame>) -> Self {
        self.trace = trace;
        self
    }

    /// Keep only the trace frames for which `keep` returns `true`.
    pub fn retain_frames(&mut self, keep: impl FnMut(&TraceFrame) -> bool) {
        self.trace.retain(keep);
    }

    /// This failure plus every suppressed failure, recursively.
    #[must_use]
    pub fn total_count(&self) -> usize {
        1 + self.suppressed.iter().map(Failure::total_count).sum::<usize>()
    }

    /// Messages of this failure and all suppressed failures, depth first.
    #[must_use]
    pub fn all_messages(&self) -> Vec<String> {
        let mut out = vec![self.error.to_string()];
        for s in &self.suppressed {
            out.extend(s.all_messages());
        }
        out
    }
}

impl fmt::Debug for Failure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Failure")
            .field("id", &self.id)
            .field("error", &self.error)
            .field("suppressed", &self.suppressed)
            .field("trace_frames", &self.trace.len())
            .finish()
    }
}

impl fmt::Display for Failure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.error)?;
        if f.alternate() {
            for s in &self.suppressed {
                write!(f, "\n  suppressed: {s:#}")?;
            }
        }
        Ok(())
    }
}

impl StdError for Failure {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        self.error.source()
    }
}

impl From<UsageError> for Failure {
    fn from(err: UsageError) -> Self {
        Self::new(err)
    }
}

impl From<&str> for Failure {
    fn from(message: &str) -> Self {
        Self::msg(message)
    }
}

impl From<String> for Failure {
    fn from(message: String) -> Self {
        Self::msg(message)
    }
}
