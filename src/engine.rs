use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};

use crate::error::RenderError;

/// A template engine the [`Renderer`](crate::Renderer) can dispatch to.
pub trait Engine: Send + Sync {
    /// Renders `template` with `data`. `options` are the caller's render
    /// options, passed through unchanged.
    fn render(
        &self,
        template: &str,
        data: &JsonValue,
        options: &RenderOptions,
    ) -> Result<Rendered, RenderError>;

    /// File extensions (without the leading dot) this engine handles.
    fn supported_extensions(&self) -> &[&str];

    fn name(&self) -> &str;
}

/// Options for a single render call.
///
/// `engine` and `format` steer engine selection; every other key is kept
/// in `extra` and reaches the engine untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RenderOptions {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub engine: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub format: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, JsonValue>,
}

impl RenderOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_engine(mut self, engine: impl Into<String>) -> Self {
        self.engine = Some(engine.into());
        self
    }

    pub fn with_format(mut self, format: impl Into<String>) -> Self {
        self.format = Some(format.into());
        self
    }

    pub fn with_option(mut self, key: impl Into<String>, value: impl Into<JsonValue>) -> Self {
        self.extra.insert(key.into(), value.into());
        self
    }

    /// Engine-specific settings found under `options.config.<section>`.
    pub fn config_section(&self, section: &str) -> Option<&JsonValue> {
        self.extra.get("config").and_then(|config| config.get(section))
    }

    pub fn to_value(&self) -> JsonValue {
        serde_json::to_value(self).unwrap_or(JsonValue::Null)
    }
}

/// Output of an engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Rendered {
    Text(String),
    /// Binary documents such as PDF.
    Binary(Vec<u8>),
}

impl Rendered {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Rendered::Text(text) => Some(text),
            Rendered::Binary(_) => None,
        }
    }

    /// The text output; binary output is decoded lossily.
    pub fn into_text(self) -> String {
        match self {
            Rendered::Text(text) => text,
            Rendered::Binary(bytes) => String::from_utf8_lossy(&bytes).into_owned(),
        }
    }

    pub fn into_bytes(self) -> Vec<u8> {
        match self {
            Rendered::Text(text) => text.into_bytes(),
            Rendered::Binary(bytes) => bytes,
        }
    }

    pub fn is_binary(&self) -> bool {
        matches!(self, Rendered::Binary(_))
    }
}

/// Builds an engine's render context: `{"options": options}` merged
/// recursively with `data`, data winning on conflicts.
pub fn build_context(data: &JsonValue, options: &RenderOptions) -> JsonValue {
    let mut base = Map::new();
    base.insert("options".to_string(), options.to_value());
    merge_recursive(JsonValue::Object(base), data.clone())
}

/// Recursive replace: maps merge key by key, any other overlay value
/// replaces the base value. A `null` overlay at the top level keeps the base.
pub fn merge_recursive(base: JsonValue, overlay: JsonValue) -> JsonValue {
    match (base, overlay) {
        (JsonValue::Object(mut base), JsonValue::Object(overlay)) => {
            for (key, value) in overlay {
                let merged = match base.remove(&key) {
                    Some(existing) => merge_recursive_value(existing, value),
                    None => value,
                };
                base.insert(key, merged);
            }
            JsonValue::Object(base)
        }
        (base, JsonValue::Null) => base,
        (_, overlay) => overlay,
    }
}

fn merge_recursive_value(base: JsonValue, overlay: JsonValue) -> JsonValue {
    match (base, overlay) {
        (JsonValue::Object(base), JsonValue::Object(overlay)) => {
            merge_recursive(JsonValue::Object(base), JsonValue::Object(overlay))
        }
        (JsonValue::Array(mut base), JsonValue::Array(overlay)) => {
            // Arrays are replaced index by index, like keyed maps.
            for (i, value) in overlay.into_iter().enumerate() {
                if i < base.len() {
                    let existing = std::mem::take(&mut base[i]);
                    base[i] = merge_recursive_value(existing, value);
                } else {
                    base.push(value);
                }
            }
            JsonValue::Array(base)
        }
        (_, overlay) => overlay,
    }
}
