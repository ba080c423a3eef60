//! Step artifacts.
//!
//! An [`Artifacts`] map is the metadata bag describing one step: its name,
//! description, keyword, parameters, and text replacements. It is built once
//! per step and handed to listeners as an immutable snapshot.
//!
//! Keys keep insertion order. Absent keys resolve to defaults instead of
//! errors: an empty string for `name` and `desc`, an empty map for `params`
//! and `replacements`, and no keyword.

use std::fmt;
use std::sync::LazyLock;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Key for the step keyword (`Given`, `When`, `Then`, ...).
pub const KEYWORD: &str = "keyword";
/// Key for the step name.
pub const NAME: &str = "name";
/// Key for the step description.
pub const DESC: &str = "desc";
/// Key for the ordered parameter map.
pub const PARAMS: &str = "params";
/// Key for the ordered replacement map.
pub const REPLACEMENTS: &str = "replacements";

static EMPTY_MAP: LazyLock<IndexMap<String, Value>> = LazyLock::new(IndexMap::new);

/// A step keyword such as `Given` or `Then`.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Keyword(String);

impl Keyword {
    /// Create a keyword from its display text.
    #[must_use]
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Display text of the keyword.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Keyword {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A single artifact value.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ArtifactValue {
    /// Plain text (`name`, `desc`, `keyword`).
    Text(String),
    /// Ordered string-keyed map (`params`, `replacements`).
    Map(IndexMap<String, Value>),
    /// Anything else a producer chose to attach.
    Other(Value),
}

impl ArtifactValue {
    /// Text content, if this is a text value.
    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Map content, if this is a map value.
    #[must_use]
    pub fn as_map(&self) -> Option<&IndexMap<String, Value>> {
        match self {
            Self::Map(m) => Some(m),
            _ => None,
        }
    }
}

impl From<&str> for ArtifactValue {
    fn from(s: &str) -> Self {
        Self::Text(s.to_owned())
    }
}

impl From<String> for ArtifactValue {
    fn from(s: String) -> Self {
        Self::Text(s)
    }
}

impl From<IndexMap<String, Value>> for ArtifactValue {
    fn from(m: IndexMap<String, Value>) -> Self {
        Self::Map(m)
    }
}

/// Insertion-ordered step metadata.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Artifacts(IndexMap<String, ArtifactValue>);

impl Artifacts {
    /// Create an empty artifacts map.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Shorthand for a map holding only a step name.
    #[must_use]
    pub fn named(name: impl Into<String>) -> Self {
        Self::new().with_name(name)
    }

    /// Set the step name.
    #[must_use]
    pub fn with_name(self, name: impl Into<String>) -> Self {
        self.with(NAME, name.into())
    }

    /// Set the step description.
    #[must_use]
    pub fn with_desc(self, desc: impl Into<String>) -> Self {
        self.with(DESC, desc.into())
    }

    /// Set the step keyword.
    #[must_use]
    pub fn with_keyword(self, keyword: Keyword) -> Self {
        self.with(KEYWORD, keyword.0)
    }

    /// Append a parameter, keeping parameter insertion order.
    #[must_use]
    pub fn with_param(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        let _ = self.map_entry(PARAMS).insert(key.into(), value.into());
        self
    }

    /// Append a replacement, keeping replacement insertion order.
    #[must_use]
    pub fn with_replacement(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        let _ = self.map_entry(REPLACEMENTS).insert(key.into(), value.into());
        self
    }

    /// Set an arbitrary key.
    #[must_use]
    pub fn with(mut self, key: impl Into<String>, value: impl Into<ArtifactValue>) -> Self {
        let _ = self.insert(key, value);
        self
    }

    /// Set an arbitrary key, returning the previous value.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<ArtifactValue>) -> Option<ArtifactValue> {
        self.0.insert(key.into(), value.into())
    }

    /// Raw lookup.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&ArtifactValue> {
        self.0.get(key)
    }

    /// Step name, or `""` when absent.
    #[must_use]
    pub fn name(&self) -> &str {
        self.text(NAME)
    }

    /// Step description, or `""` when absent.
    #[must_use]
    pub fn desc(&self) -> &str {
        self.text(DESC)
    }

    /// Step keyword, or `None` when absent.
    #[must_use]
    pub fn keyword(&self) -> Option<Keyword> {
        self.get(KEYWORD)
            .and_then(ArtifactValue::as_text)
            .map(Keyword::new)
    }

    /// Step parameters, or an empty map when absent.
    #[must_use]
    pub fn params(&self) -> &IndexMap<String, Value> {
        self.map(PARAMS)
    }

    /// Step replacements, or an empty map when absent.
    #[must_use]
    pub fn replacements(&self) -> &IndexMap<String, Value> {
        self.map(REPLACEMENTS)
    }

    /// Iterate entries in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &ArtifactValue)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Number of keys present.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether no keys are present.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    fn text(&self, key: &str) -> &str {
        self.get(key).and_then(ArtifactValue::as_text).unwrap_or("")
    }

    fn map(&self, key: &str) -> &IndexMap<String, Value> {
        self.get(key).and_then(ArtifactValue::as_map).unwrap_or(&EMPTY_MAP)
    }

    fn map_entry(&mut self, key: &str) -> &mut IndexMap<String, Value> {
        let slot = self
            .0
            .entry(key.to_owned())
            .or_insert_with(|| ArtifactValue::Map(IndexMap::new()));
        if !matches!(slot, ArtifactValue::Map(_)) {
            *slot = ArtifactValue::Map(IndexMap::new());
        }
        match slot {
            ArtifactValue::Map(m) => m,
            _ => unreachable!("slot was just set to a map"),
        }
    }
}

impl FromIterator<(String, ArtifactValue)> for Artifacts {
    fn from_iter<I: IntoIterator<Item = (String, ArtifactValue)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}
