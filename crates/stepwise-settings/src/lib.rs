//! # stepwise-settings
//!
//! Configuration management with layered sources for stepwise.
//!
//! Settings are loaded from three layers (in priority order):
//! 1. **Compiled defaults**: [`StepwiseSettings::default()`]
//! 2. **User file**: `$STEPWISE_SETTINGS` or `~/.stepwise/settings.json`
//!    (deep-merged over defaults)
//! 3. **Environment variables**: `STEPWISE_*` overrides (highest priority)
//!
//! Settings are read once at process start by the harness bootstrap, which
//! resolves listeners and the exception handler from them. The global cache
//! can be replaced with [`init_settings`] or reloaded with
//! [`reload_settings_from_path`].

#![deny(unsafe_code)]

pub mod errors;
pub mod loader;
pub mod types;

pub use errors::{Result, SettingsError};
pub use loader::{deep_merge, load_settings, load_settings_from_path, settings_path};
pub use types::*;

use std::path::Path;
use std::sync::Arc;

use parking_lot::RwLock;

/// Global settings singleton.
static SETTINGS: RwLock<Option<Arc<StepwiseSettings>>> = parking_lot::const_rwlock(None);

/// Get the global settings instance.
///
/// On first call, loads settings from the default path with env var
/// overrides. On subsequent calls, returns the cached value. If loading
/// fails, returns compiled defaults.
pub fn get_settings() -> Arc<StepwiseSettings> {
    if let Some(ref s) = *SETTINGS.read() {
        return Arc::clone(s);
    }

    let mut guard = SETTINGS.write();
    // Another thread may have initialized while we waited for the write lock.
    if let Some(ref s) = *guard {
        return Arc::clone(s);
    }

    let settings = Arc::new(match load_settings() {
        Ok(s) => s,
        Err(e) => {
            tracing::warn!(error = %e, "failed to load settings, using defaults");
            StepwiseSettings::default()
        }
    });
    *guard = Some(Arc::clone(&settings));
    settings
}

/// Initialize the global settings with a specific value.
pub fn init_settings(settings: StepwiseSettings) {
    *SETTINGS.write() = Some(Arc::new(settings));
}

/// Reload settings from a specific file path and swap the global cache.
pub fn reload_settings_from_path(path: &Path) {
    let new = Arc::new(match load_settings_from_path(path) {
        Ok(s) => s,
        Err(e) => {
            tracing::warn!(error = %e, ?path, "failed to reload settings, falling back to defaults");
            StepwiseSettings::default()
        }
    });
    *SETTINGS.write() = Some(new);
    tracing::info!(?path, "settings reloaded from disk");
}
