//! Package-level constants.

/// Current version of stepwise (sourced from Cargo.toml).
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Lowest legal hook priority. Hooks at this level run last.
pub const MIN_HOOK_PRIORITY: i32 = 1;

/// Conventional hook priority when the caller has no ordering preference.
pub const NORM_HOOK_PRIORITY: i32 = 5;

/// Highest legal hook priority. Hooks at this level run first.
pub const MAX_HOOK_PRIORITY: i32 = 10;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn version_is_semver() {
        let parts: Vec<&str> = VERSION.split('.').collect();
        assert_eq!(parts.len(), 3, "VERSION must be semver (MAJOR.MINOR.PATCH)");
        for part in parts {
            let _: u32 = part.parse().expect("each semver segment must be a number");
        }
    }

    #[test]
    #[allow(clippy::assertions_on_constants)]
    fn norm_priority_within_bounds() {
        assert!(MIN_HOOK_PRIORITY < NORM_HOOK_PRIORITY);
        assert!(NORM_HOOK_PRIORITY < MAX_HOOK_PRIORITY);
    }
}
