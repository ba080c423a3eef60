//! Settings type definitions.
//!
//! All types use `#[serde(rename_all = "camelCase", default)]` so partial JSON
//! files are accepted: missing fields keep their compiled default.

use serde::{Deserialize, Serialize};

/// Smallest accepted exception-handler memo capacity.
pub const MIN_MEMO_CAPACITY: usize = 1;
/// Largest accepted exception-handler memo capacity.
pub const MAX_MEMO_CAPACITY: usize = 65_536;

/// Root settings type.
///
/// # JSON Format
///
/// ```json
/// {
///   "logging": { "level": "debug" },
///   "listeners": ["tracing", "recording"],
///   "handler": { "kind": "clean_trace", "memoCapacity": 128 }
/// }
/// ```
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct StepwiseSettings {
    /// Logging configuration.
    pub logging: LoggingSettings,
    /// Names of step listeners to resolve at startup, in notification order.
    pub listeners: Vec<String>,
    /// Exception handler configuration.
    pub handler: HandlerSettings,
}

impl Default for StepwiseSettings {
    fn default() -> Self {
        Self {
            logging: LoggingSettings::default(),
            listeners: vec!["tracing".to_string()],
            handler: HandlerSettings::default(),
        }
    }
}

impl StepwiseSettings {
    /// Check cross-field constraints that serde cannot express.
    pub fn validate(&self) -> crate::Result<()> {
        let cap = self.handler.memo_capacity;
        if !(MIN_MEMO_CAPACITY..=MAX_MEMO_CAPACITY).contains(&cap) {
            return Err(crate::SettingsError::InvalidValue(format!(
                "handler.memoCapacity must be in [{MIN_MEMO_CAPACITY}, {MAX_MEMO_CAPACITY}], got {cap}"
            )));
        }
        if let Some(blank) = self.listeners.iter().find(|l| l.trim().is_empty()) {
            return Err(crate::SettingsError::InvalidValue(format!(
                "listener names must not be blank, got {blank:?}"
            )));
        }
        Ok(())
    }
}

/// Logging configuration.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LoggingSettings {
    /// Default filter directive. `RUST_LOG` takes precedence when set.
    pub level: String,
    /// Emit JSON lines instead of compact text.
    pub json: bool,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "warn".to_string(),
            json: false,
        }
    }
}

/// Which exception handler strategy to install.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HandlerKind {
    /// Strip internal engine frames from captured traces.
    #[default]
    CleanTrace,
    /// Leave failures untouched.
    Noop,
}

/// Exception handler configuration.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct HandlerSettings {
    /// Strategy to install.
    pub kind: HandlerKind,
    /// Per-thread count of failure ids remembered as already processed.
    pub memo_capacity: usize,
    /// Symbol prefixes treated as internal frames.
    pub internal_prefixes: Vec<String>,
    /// Capture a trace for every new failure.
    pub capture_traces: bool,
}

impl Default for HandlerSettings {
    fn default() -> Self {
        Self {
            kind: HandlerKind::CleanTrace,
            memo_capacity: 256,
            internal_prefixes: vec![
                "stepwise_engine::".to_string(),
                "stepwise_core::".to_string(),
                "stepwise_harness::".to_string(),
                "std::backtrace".to_string(),
                "core::ops::function".to_string(),
            ],
            capture_traces: false,
        }
    }
}
