//! Persisted settings document
//!
//! The host application persists plugin settings as a flat key/value
//! document whose values are JSON-safe. Absent keys mean "use the
//! companion process default".

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Well-known document keys
pub mod keys {
    /// Video configuration series, JSON text
    pub const VIDEO_CONFIG: &str = "video_config";
    /// Surface alpha series, JSON text
    pub const SURFACE_ALPHAS: &str = "surface_alphas";
    /// Canvas corner table, CSV text
    pub const CANVAS_CORNERS: &str = "canvas_corners";
    /// Frame corner table, CSV text
    pub const FRAME_CORNERS: &str = "frame_corners";
    /// Window allocation
    pub const X: &str = "x";
    pub const Y: &str = "y";
    pub const WIDTH: &str = "width";
    pub const HEIGHT: &str = "height";
    /// Per-step video flag
    pub const VIDEO_ENABLED: &str = "video_enabled";
}

/// Default window width when no allocation was persisted
pub const DEFAULT_WIDTH: i64 = 400;
/// Default window height when no allocation was persisted
pub const DEFAULT_HEIGHT: i64 = 500;

/// A JSON-safe scalar setting value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SettingValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
}

impl SettingValue {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            SettingValue::Text(text) => Some(text),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            SettingValue::Int(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            SettingValue::Bool(value) => Some(*value),
            _ => None,
        }
    }
}

impl From<&str> for SettingValue {
    fn from(text: &str) -> Self {
        SettingValue::Text(text.to_string())
    }
}

impl From<String> for SettingValue {
    fn from(text: String) -> Self {
        SettingValue::Text(text)
    }
}

impl From<i64> for SettingValue {
    fn from(value: i64) -> Self {
        SettingValue::Int(value)
    }
}

impl From<bool> for SettingValue {
    fn from(value: bool) -> Self {
        SettingValue::Bool(value)
    }
}

/// Flat key/value settings document
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SettingsDocument(BTreeMap<String, SettingValue>);

impl SettingsDocument {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<&SettingValue> {
        self.0.get(key)
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<SettingValue>) {
        self.0.insert(key.into(), value.into());
    }

    pub fn remove(&mut self, key: &str) -> Option<SettingValue> {
        self.0.remove(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    /// Text value under `key`, if present and textual
    pub fn text(&self, key: &str) -> Option<&str> {
        self.get(key).and_then(SettingValue::as_text)
    }

    /// Integer value under `key`, if present and integral
    pub fn int(&self, key: &str) -> Option<i64> {
        self.get(key).and_then(SettingValue::as_int)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &SettingValue)> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Fill in the window allocation defaults the companion expects when
    /// nothing was persisted yet.
    pub fn ensure_layout_defaults(&mut self) {
        if !self.contains(keys::WIDTH) {
            self.set(keys::WIDTH, DEFAULT_WIDTH);
        }
        if !self.contains(keys::HEIGHT) {
            self.set(keys::HEIGHT, DEFAULT_HEIGHT);
        }
    }

    /// Serialize the whole document to a JSON object string (the
    /// companion's launch allocation argument).
    pub fn to_json(&self) -> String {
        serde_json::json!(self.0).to_string()
    }
}

impl FromIterator<(String, SettingValue)> for SettingsDocument {
    fn from_iter<I: IntoIterator<Item = (String, SettingValue)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}
