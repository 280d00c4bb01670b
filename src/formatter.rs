//! Format resolution: maps a format identifier to a registered handler.
//!
//! A format is resolved, in order, by:
//!
//! 1. exact handler name (`"date"` → handler `date`, sub-format `date`);
//! 2. dotted notation (`"date.short"` → handler `date`, sub-format `short`);
//! 3. capability search over [`HandlerFormatter`] handlers, in registration order;
//! 4. the [`DEFAULT_HANDLER`] entry, if registered.
//!
//! When the handler part of a dotted format is not registered, that part is
//! used as an inline pattern. A format that resolves to no handler at all
//! casts the value.

use std::fmt;

use log::debug;
use minijinja::value::Value;
use once_cell::sync::OnceCell;

use crate::caster::cast_to_string;
use crate::error::RenderError;
use crate::handler::{GenericFormatHandler, Handler, HandlerError, HandlerFormatter};

/// Reserved handler name used when nothing else matches.
pub const DEFAULT_HANDLER: &str = "default";

/// The handler name and sub-format a format identifier resolved to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
    pub handler: Option<String>,
    pub format: String,
}

/// Registry of named handlers.
#[derive(Debug, Default, Clone)]
pub struct DataFormatter {
    handlers: Vec<(String, Handler)>,
    generic: GenericFormatHandler,
}

impl DataFormatter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `handler` under `name`, replacing any previous entry in place.
    pub fn register_handler(&mut self, name: impl Into<String>, handler: impl Into<Handler>) -> &mut Self {
        let name = name.into();
        let handler = handler.into();
        match self.handlers.iter_mut().find(|(n, _)| *n == name) {
            Some(slot) => slot.1 = handler,
            None => self.handlers.push((name, handler)),
        }
        self
    }

    pub fn with_handler(mut self, name: impl Into<String>, handler: impl Into<Handler>) -> Self {
        self.register_handler(name, handler);
        self
    }

    pub fn handler(&self, name: &str) -> Option<&Handler> {
        self.handlers.iter().find(|(n, _)| n == name).map(|(_, h)| h)
    }

    pub fn has_handler(&self, name: &str) -> bool {
        self.handler(name).is_some()
    }

    pub fn handler_names(&self) -> impl Iterator<Item = &str> {
        self.handlers.iter().map(|(n, _)| n.as_str())
    }

    /// Formats `value` under `format`. `none` and undefined values always
    /// produce an empty string.
    pub fn format(&self, value: &Value, format: &str) -> Result<String, RenderError> {
        let mut trail = Vec::new();
        self.format_inner(value, format, &mut trail)
    }

    fn format_inner(
        &self,
        value: &Value,
        format: &str,
        trail: &mut Vec<String>,
    ) -> Result<String, RenderError> {
        if value.is_none() || value.is_undefined() {
            return Ok(String::new());
        }

        let resolution = self.resolve_lenient(format);
        debug!(
            "format {:?} resolved to handler {:?} (sub-format {:?})",
            format, resolution.handler, resolution.format
        );

        let inline;
        let handler = match resolution.handler.as_deref() {
            Some(name) => match self.handler(name) {
                Some(handler) => Some(handler),
                None => {
                    inline = Handler::pattern(name);
                    Some(&inline)
                }
            },
            None => None,
        };

        match handler {
            Some(Handler::Alias(target)) => {
                trail.push(format.to_string());
                if trail.iter().any(|seen| seen == target) {
                    return Err(RenderError::formatting(
                        format,
                        cycle_message(trail, target),
                    ));
                }
                self.format_inner(value, target, trail)
            }
            Some(Handler::Formatter(formatter)) => formatter
                .handle(value, &resolution.format)
                .map_err(|e| RenderError::formatting(format, e)),
            other => self
                .generic
                .handle(value, other, Some(format))
                .map_err(|e| RenderError::formatting(format, e)),
        }
    }

    /// Strict resolution: fails with [`RenderError::HandlerNotFound`] when
    /// no registered handler (nor `"default"`) matches `format`.
    pub fn resolve(&self, format: &str) -> Result<Resolution, RenderError> {
        let resolution = self.resolve_lenient(format);
        match resolution.handler.as_deref() {
            Some(name) if self.has_handler(name) => Ok(resolution),
            _ => Err(RenderError::HandlerNotFound(format.to_string())),
        }
    }

    fn resolve_lenient(&self, format: &str) -> Resolution {
        if self.has_handler(format) {
            return Resolution {
                handler: Some(format.to_string()),
                format: format.to_string(),
            };
        }

        if let Some((name, sub)) = format.split_once('.') {
            return Resolution {
                handler: Some(name.to_string()),
                format: sub.to_string(),
            };
        }

        Resolution {
            handler: self.determine_handler(format),
            format: format.to_string(),
        }
    }

    fn determine_handler(&self, format: &str) -> Option<String> {
        self.handlers
            .iter()
            .find(|(_, handler)| {
                matches!(handler, Handler::Formatter(_))
                    && handler.supported_formats().iter().any(|f| f == format)
            })
            .map(|(name, _)| name.clone())
            .or_else(|| {
                self.has_handler(DEFAULT_HANDLER)
                    .then(|| DEFAULT_HANDLER.to_string())
            })
    }
}

fn cycle_message(trail: &[String], target: &str) -> String {
    let mut path = trail.join(" -> ");
    path.push_str(" -> ");
    path.push_str(target);
    format!("alias cycle detected: {}", path)
}

type TableBuilder = Box<dyn Fn() -> Vec<(String, Handler)> + Send + Sync>;

/// A [`HandlerFormatter`] backed by a table of per-format handlers.
///
/// The table is built on first use. Entries may be [`Handler::Alias`] to
/// redirect one format to another; alias cycles are reported as errors.
pub struct MappedFormatter {
    builder: TableBuilder,
    table: OnceCell<Vec<(String, Handler)>>,
}

impl MappedFormatter {
    pub fn new<K, I>(entries: I) -> Self
    where
        K: Into<String>,
        I: IntoIterator<Item = (K, Handler)>,
    {
        let table: Vec<(String, Handler)> =
            entries.into_iter().map(|(k, h)| (k.into(), h)).collect();
        Self {
            builder: Box::new(Vec::new),
            table: OnceCell::with_value(table),
        }
    }

    /// Defers building the table until a format is first requested.
    pub fn lazy<F>(builder: F) -> Self
    where
        F: Fn() -> Vec<(String, Handler)> + Send + Sync + 'static,
    {
        Self {
            builder: Box::new(builder),
            table: OnceCell::new(),
        }
    }

    fn table(&self) -> &[(String, Handler)] {
        self.table.get_or_init(|| (self.builder)())
    }

    fn entry(&self, format: &str) -> Option<&Handler> {
        self.table().iter().find(|(f, _)| f == format).map(|(_, h)| h)
    }

    fn handle_inner(
        &self,
        value: &Value,
        format: &str,
        trail: &mut Vec<String>,
    ) -> Result<String, HandlerError> {
        let handler = self
            .entry(format)
            .ok_or_else(|| anyhow::anyhow!("Handler for the format \"{}\" not found.", format))?;

        match handler {
            Handler::Alias(target) => {
                trail.push(format.to_string());
                if trail.iter().any(|seen| seen == target) {
                    anyhow::bail!(cycle_message(trail, target));
                }
                self.handle_inner(value, target, trail)
            }
            handler => GenericFormatHandler.handle(value, Some(handler), Some(format)),
        }
    }
}

impl HandlerFormatter for MappedFormatter {
    fn handle(&self, value: &Value, format: &str) -> Result<String, HandlerError> {
        if value.is_none() || value.is_undefined() {
            return Ok(cast_to_string(value));
        }
        self.handle_inner(value, format, &mut Vec::new())
    }

    fn supported_formats(&self) -> Vec<String> {
        self.table().iter().map(|(f, _)| f.clone()).collect()
    }
}

impl fmt::Debug for MappedFormatter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MappedFormatter")
            .field("built", &self.table.get().is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn dates() -> MappedFormatter {
        MappedFormatter::new([
            ("short", Handler::pattern("S:%s")),
            ("long", Handler::pattern("L:%s")),
            ("brief", Handler::alias("short")),
        ])
    }

    #[test]
    fn test_null_value_short_circuits() {
        let formatter = DataFormatter::new().with_handler(
            DEFAULT_HANDLER,
            Handler::callable(|_, _| anyhow::bail!("must not be called")),
        );
        assert_eq!(formatter.format(&Value::from(()), "anything").unwrap(), "");
        assert_eq!(formatter.format(&Value::UNDEFINED, "date").unwrap(), "");
    }

    #[test]
    fn test_registered_pattern() {
        let formatter = DataFormatter::new().with_handler("money", "$%.2f");
        assert_eq!(formatter.format(&Value::from(5), "money").unwrap(), "$5.00");
    }

    #[test]
    fn test_lookup_pass_through() {
        let formatter =
            DataFormatter::new().with_handler("status", Handler::lookup([("1", "Active")]));
        assert_eq!(formatter.format(&Value::from(1), "status").unwrap(), "Active");
        assert_eq!(formatter.format(&Value::from(9), "status").unwrap(), "9");
    }

    #[test]
    fn test_dotted_resolution_passes_sub_format() {
        let formatter = DataFormatter::new().with_handler("date", Handler::formatter(dates()));
        assert_eq!(
            formatter.format(&Value::from("2025-01-02"), "date.short").unwrap(),
            "S:2025-01-02"
        );
        assert_eq!(
            formatter.resolve("date.short").unwrap(),
            Resolution {
                handler: Some("date".to_string()),
                format: "short".to_string()
            }
        );
    }

    #[test]
    fn test_dotted_callable_receives_full_format() {
        let formatter = DataFormatter::new().with_handler(
            "date",
            Handler::callable(|v, f| Ok(Value::from(format!("{}|{}", f, v)))),
        );
        assert_eq!(formatter.format(&Value::from(3), "date.short").unwrap(), "date.short|3");
    }

    #[test]
    fn test_capability_search_prefers_earlier_registration() {
        let formatter = DataFormatter::new()
            .with_handler("first", Handler::formatter(MappedFormatter::new([("x", Handler::pattern("first:%s"))])))
            .with_handler("second", Handler::formatter(MappedFormatter::new([("x", Handler::pattern("second:%s"))])));
        assert_eq!(formatter.format(&Value::from(1), "x").unwrap(), "first:1");
    }

    #[test]
    fn test_capability_search_falls_back_to_default() {
        let formatter = DataFormatter::new().with_handler(
            DEFAULT_HANDLER,
            Handler::callable(|v, _| Ok(Value::from(cast_to_string(v).to_uppercase()))),
        );
        assert_eq!(formatter.format(&Value::from(42), "anything").unwrap(), "42");
        assert_eq!(formatter.format(&Value::from("abc"), "anything").unwrap(), "ABC");
    }

    #[test]
    fn test_unregistered_dotted_name_is_inline_pattern() {
        let formatter = DataFormatter::new();
        assert_eq!(formatter.format(&Value::from(7), "plain").unwrap(), "7");
        assert_eq!(formatter.format(&Value::from(7), "date.short").unwrap(), "date");
        assert_eq!(formatter.format(&Value::from(7), "#%d.x").unwrap(), "#7");
    }

    #[test]
    fn test_reregistration_replaces_in_place() {
        let mut formatter = DataFormatter::new();
        formatter
            .register_handler("a", "A:%s")
            .register_handler("b", "B:%s")
            .register_handler("a", "A2:%s");
        assert_eq!(formatter.handler_names().collect::<Vec<_>>(), vec!["a", "b"]);
        assert_eq!(formatter.format(&Value::from(1), "a").unwrap(), "A2:1");
    }

    #[test]
    fn test_handler_errors_are_wrapped() {
        let formatter = DataFormatter::new()
            .with_handler("boom", Handler::callable(|_, _| anyhow::bail!("exploded")));
        let err = formatter.format(&Value::from(1), "boom").unwrap_err();
        match err {
            RenderError::Formatting { format, message } => {
                assert_eq!(format, "boom");
                assert_eq!(message, "exploded");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_unsupported_sub_format_is_formatting_error() {
        let formatter = DataFormatter::new().with_handler("date", Handler::formatter(dates()));
        let err = formatter.format(&Value::from(1), "date.iso").unwrap_err();
        assert!(err.to_string().contains("Handler for the format \"iso\" not found."));
    }

    #[test]
    fn test_mapped_formatter_alias() {
        let formatter = dates();
        assert_eq!(formatter.handle(&Value::from("d"), "brief").unwrap(), "S:d");
        assert_eq!(
            formatter.supported_formats(),
            vec!["short".to_string(), "long".to_string(), "brief".to_string()]
        );
    }

    #[test]
    fn test_mapped_formatter_alias_cycle() {
        let formatter = MappedFormatter::new([
            ("a", Handler::alias("b")),
            ("b", Handler::alias("a")),
            ("self", Handler::alias("self")),
        ]);
        let err = formatter.handle(&Value::from(1), "a").unwrap_err();
        assert_eq!(err.to_string(), "alias cycle detected: a -> b -> a");
        assert!(formatter.handle(&Value::from(1), "self").is_err());
    }

    #[test]
    fn test_data_formatter_alias_cycle() {
        let formatter = DataFormatter::new()
            .with_handler("price", Handler::alias("cost"))
            .with_handler("cost", Handler::alias("price"))
            .with_handler("amount", Handler::alias("money"))
            .with_handler("money", "$%d");
        assert_eq!(formatter.format(&Value::from(3), "amount").unwrap(), "$3");
        let err = formatter.format(&Value::from(3), "price").unwrap_err();
        assert!(err.to_string().contains("alias cycle detected: price -> cost -> price"));
    }

    #[test]
    fn test_mapped_formatter_builds_lazily_once() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let formatter = MappedFormatter::lazy(move || {
            counter.fetch_add(1, Ordering::SeqCst);
            vec![("upper".to_string(), Handler::callable(|v, _| {
                Ok(Value::from(cast_to_string(v).to_uppercase()))
            }))]
        });
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert_eq!(formatter.handle(&Value::from("a"), "upper").unwrap(), "A");
        assert_eq!(formatter.handle(&Value::from("b"), "upper").unwrap(), "B");
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_strict_resolve_reports_missing_handler() {
        let formatter = DataFormatter::new().with_handler("money", "$%.2f");
        assert!(matches!(
            formatter.resolve("unknown"),
            Err(RenderError::HandlerNotFound(f)) if f == "unknown"
        ));
        assert!(matches!(
            formatter.resolve("nope.short"),
            Err(RenderError::HandlerNotFound(_))
        ));
        assert_eq!(formatter.resolve("money").unwrap().handler.as_deref(), Some("money"));
    }
}
