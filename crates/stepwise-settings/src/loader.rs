//! Settings loading with deep merge and environment variable overrides.
//!
//! Loading flow:
//! 1. Start with compiled [`StepwiseSettings::default()`]
//! 2. If the settings file exists, deep-merge its values over the defaults
//! 3. Apply `STEPWISE_*` environment overrides (highest priority)
//! 4. Validate
//!
//! Deep merge rules:
//! - Objects are merged recursively (source overrides target per-key)
//! - Arrays and primitives are replaced entirely by source
//! - Null values in source are skipped (preserving target)

use std::path::{Path, PathBuf};

use serde_json::Value;
use tracing::debug;

use crate::errors::Result;
use crate::types::{HandlerKind, MAX_MEMO_CAPACITY, MIN_MEMO_CAPACITY, StepwiseSettings};

/// Env var naming an explicit settings file.
pub const SETTINGS_PATH_ENV: &str = "STEPWISE_SETTINGS";

/// Resolve the settings file path.
///
/// `STEPWISE_SETTINGS` wins; otherwise `~/.stepwise/settings.json`.
pub fn settings_path() -> PathBuf {
    if let Some(explicit) = read_env_string(SETTINGS_PATH_ENV) {
        return PathBuf::from(explicit);
    }
    let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
    PathBuf::from(home).join(".stepwise").join("settings.json")
}

/// Load settings from the default path with env var overrides.
pub fn load_settings() -> Result<StepwiseSettings> {
    load_settings_from_path(&settings_path())
}

/// Load settings from a specific path with env var overrides.
///
/// If the file does not exist, returns defaults. If the file contains
/// invalid JSON or out-of-range values, returns an error.
pub fn load_settings_from_path(path: &Path) -> Result<StepwiseSettings> {
    let mut settings = load_file_layer(path)?;
    apply_env_overrides(&mut settings);
    settings.validate()?;
    Ok(settings)
}

/// Defaults merged with the file at `path`, without env overrides.
pub fn load_file_layer(path: &Path) -> Result<StepwiseSettings> {
    let defaults = serde_json::to_value(StepwiseSettings::default())?;

    let merged = if path.exists() {
        debug!(?path, "loading settings from file");
        let content = std::fs::read_to_string(path)?;
        let user: Value = serde_json::from_str(&content)?;
        deep_merge(defaults, user)
    } else {
        debug!(?path, "settings file not found, using defaults");
        defaults
    };

    Ok(serde_json::from_value(merged)?)
}

/// Recursive deep merge of two JSON values.
pub fn deep_merge(target: Value, source: Value) -> Value {
    match (target, source) {
        (Value::Object(mut target_map), Value::Object(source_map)) => {
            for (key, source_val) in source_map {
                if source_val.is_null() {
                    continue;
                }
                let merged = if let Some(target_val) = target_map.remove(&key) {
                    deep_merge(target_val, source_val)
                } else {
                    source_val
                };
                let _ = target_map.insert(key, merged);
            }
            Value::Object(target_map)
        }
        (_, source) => source,
    }
}

/// Apply environment variable overrides to loaded settings.
pub fn apply_env_overrides(settings: &mut StepwiseSettings) {
    apply_overrides(settings, |name| std::env::var(name).ok());
}

/// Apply overrides read through `lookup`.
///
/// Invalid values are logged and ignored, falling back to file/default.
///
/// | variable                 | field                      |
/// |--------------------------|----------------------------|
/// | `STEPWISE_LOG_LEVEL`     | `logging.level`            |
/// | `STEPWISE_LOG_JSON`      | `logging.json`             |
/// | `STEPWISE_LISTENERS`     | `listeners` (comma list)   |
/// | `STEPWISE_HANDLER`       | `handler.kind`             |
/// | `STEPWISE_HANDLER_MEMO`  | `handler.memoCapacity`     |
/// | `STEPWISE_TRACE_CAPTURE` | `handler.captureTraces`    |
pub fn apply_overrides(settings: &mut StepwiseSettings, lookup: impl Fn(&str) -> Option<String>) {
    let get = |name: &str| lookup(name).filter(|v| !v.is_empty());

    if let Some(v) = get("STEPWISE_LOG_LEVEL") {
        settings.logging.level = v;
    }
    if let Some(v) = get("STEPWISE_LOG_JSON") {
        match parse_bool(&v) {
            Some(b) => settings.logging.json = b,
            None => warn_invalid("STEPWISE_LOG_JSON", &v),
        }
    }
    if let Some(v) = get("STEPWISE_LISTENERS") {
        settings.listeners = parse_list(&v);
    }
    if let Some(v) = get("STEPWISE_HANDLER") {
        match parse_handler_kind(&v) {
            Some(kind) => settings.handler.kind = kind,
            None => warn_invalid("STEPWISE_HANDLER", &v),
        }
    }
    if let Some(v) = get("STEPWISE_HANDLER_MEMO") {
        match parse_usize_range(&v, MIN_MEMO_CAPACITY, MAX_MEMO_CAPACITY) {
            Some(n) => settings.handler.memo_capacity = n,
            None => warn_invalid("STEPWISE_HANDLER_MEMO", &v),
        }
    }
    if let Some(v) = get("STEPWISE_TRACE_CAPTURE") {
        match parse_bool(&v) {
            Some(b) => settings.handler.capture_traces = b,
            None => warn_invalid("STEPWISE_TRACE_CAPTURE", &v),
        }
    }
}

// ── Pure parsing functions ──────────────────────────────────────────────────

/// Parse a string as a boolean.
///
/// Accepts (case-insensitive): `true`/`1`/`yes`/`on` or `false`/`0`/`no`/`off`.
pub fn parse_bool(val: &str) -> Option<bool> {
    match val.to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Parse a string as a `usize` within an inclusive range.
pub fn parse_usize_range(val: &str, min: usize, max: usize) -> Option<usize> {
    let n: usize = val.trim().parse().ok()?;
    (n >= min && n <= max).then_some(n)
}

/// Split a comma-separated list, trimming and dropping empty entries.
pub fn parse_list(val: &str) -> Vec<String> {
    val.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

/// Parse a handler kind name.
pub fn parse_handler_kind(val: &str) -> Option<HandlerKind> {
    serde_json::from_value(Value::String(val.trim().to_lowercase())).ok()
}

fn warn_invalid(key: &str, value: &str) {
    tracing::warn!(key, value, "invalid settings env var, ignoring");
}

fn read_env_string(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.is_empty())
}
