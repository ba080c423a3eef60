//! Validated hook priority.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::constants::{MAX_HOOK_PRIORITY, MIN_HOOK_PRIORITY, NORM_HOOK_PRIORITY};
use crate::errors::UsageError;

/// A hook priority guaranteed to lie in `[MIN_HOOK_PRIORITY, MAX_HOOK_PRIORITY]`.
///
/// Higher priorities run first when a hook container drains.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "i32", into = "i32")]
pub struct HookPriority(i32);

impl HookPriority {
    /// Lowest priority.
    pub const MIN: Self = Self(MIN_HOOK_PRIORITY);
    /// Conventional default.
    pub const NORM: Self = Self(NORM_HOOK_PRIORITY);
    /// Highest priority.
    pub const MAX: Self = Self(MAX_HOOK_PRIORITY);

    /// Validate a raw priority.
    pub fn new(priority: i32) -> Result<Self, UsageError> {
        if (MIN_HOOK_PRIORITY..=MAX_HOOK_PRIORITY).contains(&priority) {
            Ok(Self(priority))
        } else {
            Err(UsageError::PriorityOutOfRange {
                priority,
                min: MIN_HOOK_PRIORITY,
                max: MAX_HOOK_PRIORITY,
            })
        }
    }

    /// The raw value.
    #[must_use]
    pub fn get(self) -> i32 {
        self.0
    }
}

impl Default for HookPriority {
    fn default() -> Self {
        Self::NORM
    }
}

impl TryFrom<i32> for HookPriority {
    type Error = UsageError;

    fn try_from(value: i32) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<HookPriority> for i32 {
    fn from(p: HookPriority) -> Self {
        p.0
    }
}

impl fmt::Display for HookPriority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn bounds_are_inclusive() {
        assert_eq!(HookPriority::new(MIN_HOOK_PRIORITY).unwrap(), HookPriority::MIN);
        assert_eq!(HookPriority::new(MAX_HOOK_PRIORITY).unwrap(), HookPriority::MAX);
    }

    #[test]
    fn rejects_below_min() {
        assert_matches!(
            HookPriority::new(MIN_HOOK_PRIORITY - 1),
            Err(UsageError::PriorityOutOfRange { priority: 0, .. })
        );
    }

    #[test]
    fn rejects_above_max() {
        assert_matches!(
            HookPriority::new(MAX_HOOK_PRIORITY + 1),
            Err(UsageError::PriorityOutOfRange { .. })
        );
    }

    #[test]
    fn default_is_norm() {
        assert_eq!(HookPriority::default().get(), NORM_HOOK_PRIORITY);
    }

    #[test]
    fn serde_validates() {
        let ok: HookPriority = serde_json::from_str("7").unwrap();
        assert_eq!(ok.get(), 7);
        assert!(serde_json::from_str::<HookPriority>("42").is_err());
    }

    mod proptests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn accepts_exactly_the_closed_interval(p in -1000i32..1000) {
                let in_range = (MIN_HOOK_PRIORITY..=MAX_HOOK_PRIORITY).contains(&p);
                prop_assert_eq!(HookPriority::new(p).is_ok(), in_range);
            }
        }
    }
}
