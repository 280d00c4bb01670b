//! Format handlers and the generic handler that applies them.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use minijinja::value::{Value, ValueKind};

use crate::caster::cast_to_string;
use crate::pattern::sprintf;

/// Failure raised by user-supplied handler code.
pub type HandlerError = anyhow::Error;

/// Signature of callable handlers: `(value, format) -> display value`.
pub type HandlerFn = dyn Fn(&Value, &str) -> Result<Value, HandlerError> + Send + Sync;

/// A repository-like collaborator resolving a raw value to a display value,
/// e.g. an id to a record.
pub trait Repository: Send + Sync {
    fn find(&self, key: &Value) -> Result<Value, HandlerError>;
}

/// A handler that declares the formats it supports and formats values
/// under them itself.
pub trait HandlerFormatter: Send + Sync {
    /// Formats `value` under `format`; fails if the format is unsupported.
    fn handle(&self, value: &Value, format: &str) -> Result<String, HandlerError>;

    fn supported_formats(&self) -> Vec<String>;
}

/// The closed set of handler shapes.
#[derive(Clone)]
pub enum Handler {
    /// printf-style pattern, e.g. `"$%.2f"`.
    Pattern(String),
    /// Raw value → display value. Keys are the scalar's text form.
    Lookup(HashMap<String, Value>),
    Callable(Arc<HandlerFn>),
    Repository(Arc<dyn Repository>),
    /// Redirects to another format of the table that declares it.
    Alias(String),
    Formatter(Arc<dyn HandlerFormatter>),
}

impl Handler {
    pub fn pattern(pattern: impl Into<String>) -> Self {
        Handler::Pattern(pattern.into())
    }

    pub fn lookup<K, V, I>(entries: I) -> Self
    where
        K: Into<String>,
        V: Into<Value>,
        I: IntoIterator<Item = (K, V)>,
    {
        Handler::Lookup(
            entries
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }

    pub fn callable<F>(f: F) -> Self
    where
        F: Fn(&Value, &str) -> Result<Value, HandlerError> + Send + Sync + 'static,
    {
        Handler::Callable(Arc::new(f))
    }

    pub fn repository<R: Repository + 'static>(repository: R) -> Self {
        Handler::Repository(Arc::new(repository))
    }

    pub fn alias(target: impl Into<String>) -> Self {
        Handler::Alias(target.into())
    }

    pub fn formatter<H: HandlerFormatter + 'static>(formatter: H) -> Self {
        Handler::Formatter(Arc::new(formatter))
    }

    /// Formats declared by a capability-rich handler; empty for every other shape.
    pub fn supported_formats(&self) -> Vec<String> {
        match self {
            Handler::Formatter(f) => f.supported_formats(),
            _ => Vec::new(),
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Handler::Pattern(_) => "pattern",
            Handler::Lookup(_) => "lookup",
            Handler::Callable(_) => "callable",
            Handler::Repository(_) => "repository",
            Handler::Alias(_) => "alias",
            Handler::Formatter(_) => "formatter",
        }
    }
}

impl fmt::Debug for Handler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Handler::Pattern(p) => f.debug_tuple("Pattern").field(p).finish(),
            Handler::Lookup(m) => f.debug_tuple("Lookup").field(m).finish(),
            Handler::Alias(target) => f.debug_tuple("Alias").field(target).finish(),
            Handler::Formatter(h) => f
                .debug_tuple("Formatter")
                .field(&h.supported_formats())
                .finish(),
            other => f.write_str(other.kind()),
        }
    }
}

impl From<&str> for Handler {
    fn from(pattern: &str) -> Self {
        Handler::pattern(pattern)
    }
}

impl From<String> for Handler {
    fn from(pattern: String) -> Self {
        Handler::Pattern(pattern)
    }
}

/// Text form of a scalar used as a lookup key; `None` for anything else.
pub(crate) fn lookup_key(value: &Value) -> Option<String> {
    match value.kind() {
        ValueKind::String => value.as_str().map(str::to_string),
        ValueKind::Number => Some(integral_key(value).unwrap_or_else(|| value.to_string())),
        ValueKind::Bool => Some(value.to_string()),
        _ => None,
    }
}

// Integral floats key like integers: `1.0` looks up `"1"`.
fn integral_key(value: &Value) -> Option<String> {
    if let Some(int) = value.as_i64() {
        return Some(int.to_string());
    }
    let float = f64::try_from(value.clone()).ok()?;
    (float.is_finite() && float.fract() == 0.0 && float.abs() < i64::MAX as f64)
        .then(|| (float as i64).to_string())
}

/// Applies a handler to a value, falling back to plain casting.
#[derive(Debug, Default, Clone, Copy)]
pub struct GenericFormatHandler;

impl GenericFormatHandler {
    pub fn new() -> Self {
        Self
    }

    /// Formats `value` with `handler`. Errors come only from callable,
    /// repository and formatter handlers and are passed through.
    pub fn handle(
        &self,
        value: &Value,
        handler: Option<&Handler>,
        format: Option<&str>,
    ) -> Result<String, HandlerError> {
        match handler {
            Some(Handler::Pattern(pattern)) => Ok(sprintf(pattern, value)),
            Some(Handler::Lookup(map)) => {
                let mapped = lookup_key(value).and_then(|key| map.get(&key));
                Ok(cast_to_string(mapped.unwrap_or(value)))
            }
            Some(Handler::Callable(f)) => Ok(cast_to_string(&f(value, format.unwrap_or(""))?)),
            Some(Handler::Repository(repository)) => {
                Ok(cast_to_string(&repository.find(value)?))
            }
            Some(Handler::Formatter(formatter)) => formatter.handle(value, format.unwrap_or("")),
            // An alias is meaningless outside the table that declared it.
            Some(Handler::Alias(_)) | None => Ok(cast_to_string(value)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::anyhow;

    struct Users;

    impl Repository for Users {
        fn find(&self, key: &Value) -> Result<Value, HandlerError> {
            match lookup_key(key).as_deref() {
                Some("1") => Ok(Value::from("Alice")),
                Some(other) => Err(anyhow!("user {} not found", other)),
                None => Err(anyhow!("invalid user id")),
            }
        }
    }

    #[test]
    fn test_pattern_handler() {
        let generic = GenericFormatHandler::new();
        let out = generic
            .handle(&Value::from(42), Some(&Handler::pattern("Value is: %d")), None)
            .unwrap();
        assert_eq!(out, "Value is: 42");
    }

    #[test]
    fn test_lookup_handler_maps_and_passes_through() {
        let generic = GenericFormatHandler::new();
        let handler = Handler::lookup([("key", "value"), ("1", "Active")]);
        assert_eq!(
            generic.handle(&Value::from("key"), Some(&handler), None).unwrap(),
            "value"
        );
        assert_eq!(
            generic.handle(&Value::from(1), Some(&handler), None).unwrap(),
            "Active"
        );
        assert_eq!(
            generic.handle(&Value::from("missing"), Some(&handler), None).unwrap(),
            "missing"
        );
    }

    #[test]
    fn test_lookup_integral_float_matches_integer_key() {
        let generic = GenericFormatHandler::new();
        let handler = Handler::lookup([("1", "Active"), ("0", "Inactive")]);
        assert_eq!(
            generic.handle(&Value::from(1.0), Some(&handler), None).unwrap(),
            "Active"
        );
        assert_eq!(
            generic.handle(&Value::from(0.0), Some(&handler), None).unwrap(),
            "Inactive"
        );
        assert_eq!(
            generic.handle(&Value::from(1.5), Some(&handler), None).unwrap(),
            "1.5"
        );
        assert_eq!(lookup_key(&Value::from(-3.0)).as_deref(), Some("-3"));
    }

    #[test]
    fn test_callable_handler_receives_format() {
        let generic = GenericFormatHandler::new();
        let handler = Handler::callable(|value, format| {
            Ok(Value::from(format!("{}:{}", format, value)))
        });
        let out = generic
            .handle(&Value::from(7), Some(&handler), Some("num"))
            .unwrap();
        assert_eq!(out, "num:7");
    }

    #[test]
    fn test_callable_result_is_cast() {
        let generic = GenericFormatHandler::new();
        let handler = Handler::callable(|value, _| Ok(Value::from(vec![value.clone()])));
        let out = generic.handle(&Value::from(2), Some(&handler), None).unwrap();
        assert_eq!(out, "[\n  2\n]");
    }

    #[test]
    fn test_repository_handler() {
        let generic = GenericFormatHandler::new();
        let handler = Handler::repository(Users);
        assert_eq!(
            generic.handle(&Value::from(1), Some(&handler), None).unwrap(),
            "Alice"
        );
        let err = generic
            .handle(&Value::from(2), Some(&handler), None)
            .unwrap_err();
        assert_eq!(err.to_string(), "user 2 not found");
    }

    #[test]
    fn test_missing_handler_casts() {
        let generic = GenericFormatHandler::new();
        assert_eq!(generic.handle(&Value::from(true), None, None).unwrap(), "true");
        assert_eq!(
            generic
                .handle(&Value::from("x"), Some(&Handler::alias("other")), None)
                .unwrap(),
            "x"
        );
    }
}
