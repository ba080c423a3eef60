//! Lossless folding of many failures into one outcome.
//!
//! Hook drains, listener notifications, and test teardown all gather
//! failures one by one and then need a single value to hand back. The
//! folding rule is the same everywhere:
//!
//! - nothing collected: success
//! - a base failure exists: every collected failure is suppressed onto it
//! - no base: the first collected failure is primary, later ones are
//!   suppressed onto it in collection order

use crate::failure::Failure;

/// Collects failures without short-circuiting.
///
/// # Example
///
/// ```
/// use stepwise_core::{Failure, FailureCollector};
///
/// let mut collector = FailureCollector::new();
/// collector.collect(Failure::msg("first"));
/// collector.collect(Failure::msg("second"));
///
/// let failure = collector.into_result().unwrap_err();
/// assert_eq!(failure.to_string(), "first");
/// assert_eq!(failure.suppressed().len(), 1);
/// ```
#[derive(Debug, Default)]
pub struct FailureCollector {
    failures: Vec<Failure>,
}

impl FailureCollector {
    /// Create a new empty collector.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a failure.
    pub fn collect(&mut self, failure: Failure) {
        self.failures.push(failure);
    }

    /// Fold into one outcome: first failure primary, the rest suppressed.
    pub fn into_result(self) -> Result<(), Failure> {
        let mut iter = self.failures.into_iter();
        match iter.next() {
            None => Ok(()),
            Some(mut primary) => {
                for rest in iter {
                    primary.add_suppressed(rest);
                }
                Err(primary)
            }
        }
    }

    /// Suppress every collected failure onto `base` and return it.
    #[must_use]
    pub fn attach_to(self, mut base: Failure) -> Failure {
        for failure in self.failures {
            base.add_suppressed(failure);
        }
        base
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_is_ok() {
        assert!(FailureCollector::new().into_result().is_ok());
    }

    #[test]
    fn single_failure_is_returned_as_is() {
        let f = Failure::msg("only");
        let id = f.id();
        let mut c = FailureCollector::new();
        c.collect(f);
        let out = c.into_result().unwrap_err();
        assert_eq!(out.id(), id);
        assert!(out.suppressed().is_empty());
    }

    #[test]
    fn first_is_primary_rest_suppressed_in_order() {
        let mut c = FailureCollector::new();
        let first = Failure::msg("a");
        let first_id = first.id();
        c.collect(first);
        c.collect(Failure::msg("b"));
        c.collect(Failure::msg("c"));
        let out = c.into_result().unwrap_err();
        assert_eq!(out.id(), first_id);
        assert_eq!(out.all_messages(), ["a", "b", "c"]);
    }

    #[test]
    fn attach_to_keeps_base_primary() {
        let base = Failure::msg("base");
        let base_id = base.id();
        let mut c = FailureCollector::new();
        c.collect(Failure::msg("x"));
        c.collect(Failure::msg("y"));
        let out = c.attach_to(base);
        assert_eq!(out.id(), base_id);
        assert_eq!(out.all_messages(), ["base", "x", "y"]);
    }

    #[test]
    fn attach_to_with_nothing_collected() {
        let out = FailureCollector::new().attach_to(Failure::msg("base"));
        assert!(out.suppressed().is_empty());
    }
}
