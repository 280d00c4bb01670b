use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use log::debug;
use minijinja::value::Value;
use serde_json::Value as JsonValue;

use super::Wrapper;
use crate::engine::{build_context, Engine, RenderOptions, Rendered};
use crate::error::RenderError;
use crate::filters::STRING_FORMAT;
use crate::formatter::DataFormatter;

const NATIVE_EXTENSION: &str = "native";

/// A template written as Rust code.
pub type NativeTemplate = Arc<dyn Fn(&NativeScope<'_>) -> anyhow::Result<String> + Send + Sync>;

/// What a native template sees while it runs: the render context and the
/// same formatting helpers templates get as filters.
pub struct NativeScope<'a> {
    context: &'a JsonValue,
    formatter: &'a DataFormatter,
}

impl<'a> NativeScope<'a> {
    pub fn context(&self) -> &JsonValue {
        self.context
    }

    /// Looks up a dotted path (`"invoice.total"`) in the context.
    pub fn get(&self, path: &str) -> Option<&JsonValue> {
        path.split('.')
            .try_fold(self.context, |current, key| match current {
                JsonValue::Array(items) => key.parse::<usize>().ok().and_then(|i| items.get(i)),
                _ => current.get(key),
            })
    }

    pub fn format_as(&self, value: &JsonValue, format: &str) -> Result<String, RenderError> {
        self.formatter.format(&Value::from_serialize(value), format)
    }

    pub fn to_string(&self, value: &JsonValue) -> Result<String, RenderError> {
        self.format_as(value, STRING_FORMAT)
    }
}

/// Runs registered Rust closures as templates and wraps their output.
pub struct NativeEngine {
    templates: HashMap<String, NativeTemplate>,
    wrapper: Wrapper,
}

impl NativeEngine {
    pub fn new(wrapper: Wrapper) -> Self {
        Self {
            templates: HashMap::new(),
            wrapper,
        }
    }

    pub fn add_template<F>(&mut self, name: impl Into<String>, template: F) -> &mut Self
    where
        F: Fn(&NativeScope<'_>) -> anyhow::Result<String> + Send + Sync + 'static,
    {
        self.templates.insert(name.into(), Arc::new(template));
        self
    }

    pub fn add_shared_template(&mut self, name: impl Into<String>, template: NativeTemplate) -> &mut Self {
        self.templates.insert(name.into(), template);
        self
    }

    pub fn template_names(&self) -> impl Iterator<Item = &str> {
        self.templates.keys().map(String::as_str)
    }

    fn lookup(&self, template: &str) -> Option<&NativeTemplate> {
        self.templates.get(template).or_else(|| {
            template
                .strip_suffix(NATIVE_EXTENSION)
                .and_then(|stem| stem.strip_suffix('.'))
                .and_then(|stem| self.templates.get(stem))
        })
    }
}

impl Engine for NativeEngine {
    fn render(
        &self,
        template: &str,
        data: &JsonValue,
        options: &RenderOptions,
    ) -> Result<Rendered, RenderError> {
        let native = self
            .lookup(template)
            .ok_or_else(|| RenderError::TemplateNotFound(template.to_string()))?;

        let context = build_context(data, options);
        let scope = NativeScope {
            context: &context,
            formatter: self.wrapper.service().formatter(),
        };
        debug!("running native template {:?}", template);
        let content = native(&scope).map_err(|e| RenderError::rendering(template, format!("{:#}", e)))?;

        self.wrapper.wrap(&context, content).map(Rendered::Text)
    }

    fn supported_extensions(&self) -> &[&str] {
        &[NATIVE_EXTENSION]
    }

    fn name(&self) -> &str {
        "native"
    }
}

impl fmt::Debug for NativeEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<&str> = self.template_names().collect();
        names.sort_unstable();
        f.debug_struct("NativeEngine").field("templates", &names).finish()
    }
}
