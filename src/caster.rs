//! Best-effort conversion of template values to display strings.

use minijinja::value::{Value, ValueKind};

/// The outcome of casting a value.
///
/// Casting never aborts a render; a failed cast still produces a
/// diagnostic string through [`Cast::into_string`], but tests and callers
/// can tell the two cases apart.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Cast {
    Text(String),
    Failed { type_name: String, reason: String },
}

impl Cast {
    pub fn is_failed(&self) -> bool {
        matches!(self, Cast::Failed { .. })
    }

    pub fn into_string(self) -> String {
        match self {
            Cast::Text(text) => text,
            Cast::Failed { type_name, reason } => {
                format!("Serialization for data type {} failed: {}", type_name, reason)
            }
        }
    }
}

/// Casts `value` in priority order: scalars, values with their own display,
/// then pretty-printed JSON.
pub fn cast(value: &Value) -> Cast {
    match value.kind() {
        ValueKind::Undefined | ValueKind::None => Cast::Text(String::new()),
        ValueKind::Bool | ValueKind::Number => Cast::Text(value.to_string()),
        ValueKind::String => Cast::Text(value.as_str().unwrap_or_default().to_string()),
        ValueKind::Plain => Cast::Text(value.to_string()),
        // serde writes invalid values as `null`; their display carries the error.
        ValueKind::Invalid => Cast::Failed {
            type_name: kind_name(ValueKind::Invalid).to_string(),
            reason: value.to_string(),
        },
        _ => match serde_json::to_string_pretty(value) {
            Ok(json) => Cast::Text(json),
            Err(e) => Cast::Failed {
                type_name: kind_name(value.kind()).to_string(),
                reason: e.to_string(),
            },
        },
    }
}

/// The never-failing boundary used by handlers.
pub fn cast_to_string(value: &Value) -> String {
    cast(value).into_string()
}

pub(crate) fn kind_name(kind: ValueKind) -> &'static str {
    match kind {
        ValueKind::Undefined => "undefined",
        ValueKind::None => "none",
        ValueKind::Bool => "bool",
        ValueKind::Number => "number",
        ValueKind::String => "string",
        ValueKind::Bytes => "bytes",
        ValueKind::Seq => "sequence",
        ValueKind::Map => "map",
        ValueKind::Iterable => "iterable",
        ValueKind::Plain => "object",
        ValueKind::Invalid => "invalid",
        _ => "unknown",
    }
}
