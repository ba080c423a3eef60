//! Harness errors.

use stepwise_core::UsageError;
use stepwise_settings::SettingsError;
use thiserror::Error;

/// Failures while bootstrapping the harness.
#[derive(Debug, Error)]
pub enum HarnessError {
    /// Settings could not be loaded.
    #[error("settings: {0}")]
    Settings(#[from] SettingsError),

    /// Settings named something the engine cannot build.
    #[error(transparent)]
    Usage(#[from] UsageError),
}

/// Convenience result type for harness operations.
pub type Result<T> = std::result::Result<T, HarnessError>;
