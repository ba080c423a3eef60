//! Exception handlers.
//!
//! Every failure the engine observes is passed to an [`ExceptionHandler`]
//! before it propagates. Handlers work on side channels only (the captured
//! trace); they never change which failure escapes or whether one does.
//!
//! [`CleanTraceHandler`] removes engine-internal frames from traces so users
//! see their own code first. Failures can reach the handler more than once
//! (a step failure is handled, then handled again after hooks attach their
//! own failures), so the handler remembers which [`FailureId`]s it already
//! cleaned in a bounded per-thread memo. The memos belong to the handler and
//! are freed with it.

use std::collections::{HashSet, VecDeque};
use std::fmt;
use std::sync::Arc;
use std::thread::{self, ThreadId};

use dashmap::DashMap;
use parking_lot::RwLock;
use stepwise_core::{Failure, FailureId};
use stepwise_settings::{HandlerKind, HandlerSettings};
use tracing::{debug, trace};

/// Default memo capacity of [`CleanTraceHandler`].
pub const DEFAULT_MEMO_CAPACITY: usize = 256;

/// Pluggable strategy invoked on every failure the engine observes.
pub trait ExceptionHandler: Send + Sync {
    /// Handler name for logging.
    fn name(&self) -> &'static str;

    /// Process a failure in place.
    fn handle(&self, failure: &mut Failure);
}

// ─────────────────────────────────────────────────────────────────────────────
// NoopHandler
// ─────────────────────────────────────────────────────────────────────────────

/// Leaves failures untouched.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoopHandler;

impl ExceptionHandler for NoopHandler {
    fn name(&self) -> &'static str {
        "noop"
    }

    fn handle(&self, _failure: &mut Failure) {}
}

// ─────────────────────────────────────────────────────────────────────────────
// CleanTraceHandler
// ─────────────────────────────────────────────────────────────────────────────

/// Bounded FIFO set of failure ids.
#[derive(Default)]
struct Memo {
    order: VecDeque<FailureId>,
    seen: HashSet<FailureId>,
}

impl Memo {
    /// Record `id`. Returns `false` if it was already present.
    fn insert(&mut self, id: FailureId, capacity: usize) -> bool {
        if !self.seen.insert(id) {
            return false;
        }
        self.order.push_back(id);
        while self.order.len() > capacity {
            if let Some(evicted) = self.order.pop_front() {
                let _ = self.seen.remove(&evicted);
            }
        }
        true
    }
}

/// Strips frames whose symbol starts with one of the internal prefixes.
///
/// Each thread that uses the handler gets its own memo, keyed by thread id.
/// A memo outlives its thread until the handler is dropped, so the memory
/// held is bounded by `memo_capacity` times the number of threads that ever
/// used this handler.
pub struct CleanTraceHandler {
    internal_prefixes: Vec<String>,
    memo_capacity: usize,
    memos: DashMap<ThreadId, Memo>,
}

impl CleanTraceHandler {
    /// Handler with the default prefixes and memo capacity.
    #[must_use]
    pub fn new() -> Self {
        let defaults = HandlerSettings::default();
        Self::with_prefixes(defaults.internal_prefixes, DEFAULT_MEMO_CAPACITY)
    }

    /// Handler with explicit prefixes and memo capacity (clamped to at least 1).
    #[must_use]
    pub fn with_prefixes(internal_prefixes: Vec<String>, memo_capacity: usize) -> Self {
        Self {
            internal_prefixes,
            memo_capacity: memo_capacity.max(1),
            memos: DashMap::new(),
        }
    }

    /// Prefixes treated as engine-internal.
    #[must_use]
    pub fn internal_prefixes(&self) -> &[String] {
        &self.internal_prefixes
    }

    /// Maximum number of remembered failure ids per thread.
    #[must_use]
    pub fn memo_capacity(&self) -> usize {
        self.memo_capacity
    }

    fn is_internal(&self, symbol: &str) -> bool {
        self.internal_prefixes
            .iter()
            .any(|prefix| symbol.starts_with(prefix.as_str()))
    }

    /// Returns `true` the first time this thread sees `id`.
    fn first_visit(&self, id: FailureId) -> bool {
        self.memos
            .entry(thread::current().id())
            .or_default()
            .insert(id, self.memo_capacity)
    }

    fn clean(&self, failure: &mut Failure) {
        if self.first_visit(failure.id()) {
            failure.retain_frames(|frame| !self.is_internal(&frame.symbol));
        } else {
            trace!(failure_id = %failure.id(), "trace already cleaned");
        }
        // Suppressed failures may have been attached since the last visit.
        for suppressed in failure.suppressed_mut() {
            self.clean(suppressed);
        }
    }
}

impl Default for CleanTraceHandler {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for CleanTraceHandler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CleanTraceHandler")
            .field("internal_prefixes", &self.internal_prefixes)
            .field("memo_capacity", &self.memo_capacity)
            .field("memo_threads", &self.memos.len())
            .finish()
    }
}

impl ExceptionHandler for CleanTraceHandler {
    fn name(&self) -> &'static str {
        "clean_trace"
    }

    fn handle(&self, failure: &mut Failure) {
        self.clean(failure);
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Process-wide handler
// ─────────────────────────────────────────────────────────────────────────────

static HANDLER: RwLock<Option<Arc<dyn ExceptionHandler>>> = parking_lot::const_rwlock(None);

/// The process-wide exception handler.
///
/// Installs a default [`CleanTraceHandler`] on first use if none was set.
pub fn exception_handler() -> Arc<dyn ExceptionHandler> {
    if let Some(ref h) = *HANDLER.read() {
        return Arc::clone(h);
    }

    let mut guard = HANDLER.write();
    if let Some(ref h) = *guard {
        return Arc::clone(h);
    }
    let handler: Arc<dyn ExceptionHandler> = Arc::new(CleanTraceHandler::new());
    *guard = Some(Arc::clone(&handler));
    handler
}

/// Replace the process-wide exception handler, returning the previous one.
pub fn set_exception_handler(
    handler: Arc<dyn ExceptionHandler>,
) -> Option<Arc<dyn ExceptionHandler>> {
    debug!(handler = handler.name(), "installing exception handler");
    HANDLER.write().replace(handler)
}

/// Build the handler described by settings.
pub fn handler_from_settings(settings: &HandlerSettings) -> Arc<dyn ExceptionHandler> {
    match settings.kind {
        HandlerKind::CleanTrace => Arc::new(CleanTraceHandler::with_prefixes(
            settings.internal_prefixes.clone(),
            settings.memo_capacity,
        )),
        HandlerKind::Noop => Arc::new(NoopHandler),
    }
}
