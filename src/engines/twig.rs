use std::sync::Arc;

use log::debug;
use minijinja::value::Value;
use minijinja::{AutoEscape, Environment, UndefinedBehavior};
use serde_json::Value as JsonValue;

use crate::engine::{build_context, Engine, RenderOptions, Rendered};
use crate::error::RenderError;
use crate::filters::register_filters;
use crate::formatter::DataFormatter;
use crate::locator::TemplateLocator;

/// Extensions of templates handled by the minijinja environment.
pub const TWIG_EXTENSIONS: &[&str] = &["html.twig", "txt.twig", "pdf.twig"];

/// Escaping for a template name: the extension left after dropping `.twig`
/// decides. Plain text and Markdown are raw, everything else (bare names
/// included) is HTML-escaped.
pub fn auto_escape_for(name: &str) -> AutoEscape {
    let name = name.strip_suffix(".twig").unwrap_or(name);
    match name.rsplit_once('.').map(|(_, ext)| ext) {
        Some("txt" | "md" | "markdown") => AutoEscape::None,
        _ => AutoEscape::Html,
    }
}

/// The shared minijinja environment.
///
/// Templates are loaded from the locator's search paths on demand; the
/// `format_as` and `to_string` filters are backed by the [`DataFormatter`].
pub struct TwigService {
    env: Environment<'static>,
    formatter: Arc<DataFormatter>,
}

impl TwigService {
    pub fn new(locator: TemplateLocator, formatter: Arc<DataFormatter>) -> Self {
        let mut env = Environment::new();
        env.set_undefined_behavior(UndefinedBehavior::Lenient);
        env.set_auto_escape_callback(auto_escape_for);
        register_filters(&mut env, formatter.clone());

        let locator = locator.with_extensions(TWIG_EXTENSIONS.iter().copied());
        env.set_loader(move |name| locator.load(name));

        Self { env, formatter }
    }

    /// Registers an in-memory template; it shadows files with the same name.
    pub fn add_template(&mut self, name: impl Into<String>, source: impl Into<String>) -> Result<(), RenderError> {
        let name = name.into();
        self.env
            .add_template_owned(name.clone(), source.into())
            .map_err(|e| RenderError::from_minijinja(&name, e))
    }

    /// Makes `value` available to every template as `name`.
    pub fn add_global(&mut self, name: impl Into<String>, value: JsonValue) {
        let name: String = name.into();
        self.env.add_global(name, Value::from_serialize(&value));
    }

    pub fn formatter(&self) -> &Arc<DataFormatter> {
        &self.formatter
    }

    pub fn render(&self, template: &str, context: &JsonValue) -> Result<String, RenderError> {
        self.render_value(template, Value::from_serialize(context))
    }

    /// Renders `source` as an anonymous template registered under `name`.
    pub fn render_source(&self, name: &str, source: &str, context: &JsonValue) -> Result<String, RenderError> {
        self.env
            .render_named_str(name, source, Value::from_serialize(context))
            .map_err(|e| RenderError::from_minijinja(name, e))
    }

    /// Renders with a prepared minijinja context, e.g. one holding safe strings.
    pub fn render_value(&self, template: &str, context: Value) -> Result<String, RenderError> {
        debug!("rendering template {:?}", template);
        let tmpl = self
            .env
            .get_template(template)
            .map_err(|e| RenderError::from_minijinja(template, e))?;
        tmpl.render(context)
            .map_err(|e| RenderError::from_minijinja(template, e))
    }
}

/// Renders HTML and text templates through the [`TwigService`].
pub struct TwigEngine {
    service: Arc<TwigService>,
}

impl TwigEngine {
    pub fn new(service: Arc<TwigService>) -> Self {
        Self { service }
    }
}

impl Engine for TwigEngine {
    fn render(
        &self,
        template: &str,
        data: &JsonValue,
        options: &RenderOptions,
    ) -> Result<Rendered, RenderError> {
        let context = build_context(data, options);
        self.service.render(template, &context).map(Rendered::Text)
    }

    fn supported_extensions(&self) -> &[&str] {
        &["html.twig", "txt.twig"]
    }

    fn name(&self) -> &str {
        "twig"
    }
}
