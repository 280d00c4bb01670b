use std::sync::Arc;

use log::{debug, warn};

use crate::config::RendererConfig;
use crate::engine::Engine;
use crate::engines::{
    MarkdownEngine, NativeEngine, NativeScope, NativeTemplate, PdfEngine, TwigEngine, TwigService,
    Wrapper,
};
use crate::error::RenderError;
use crate::filters::{text_formatter, TEXT_HANDLER};
use crate::formatter::DataFormatter;
use crate::handler::Handler;
use crate::locator::TemplateLocator;
use crate::renderer::Renderer;

/// Builds a [`Renderer`] with its engines, template service and formatter
/// from a [`RendererConfig`] plus anything registered in code.
pub struct RendererFactory {
    config: RendererConfig,
    handlers: Vec<(String, Handler)>,
    templates: Vec<(String, String)>,
    native_templates: Vec<(String, NativeTemplate)>,
    engines: Vec<(String, Arc<dyn Engine>)>,
}

impl RendererFactory {
    pub fn new(config: RendererConfig) -> Self {
        Self {
            config,
            handlers: Vec::new(),
            templates: Vec::new(),
            native_templates: Vec::new(),
            engines: Vec::new(),
        }
    }

    /// Shortcut for a factory with nothing but `config`.
    pub fn create(config: &RendererConfig) -> Result<Renderer, RenderError> {
        Self::new(config.clone()).build()
    }

    pub fn config(&self) -> &RendererConfig {
        &self.config
    }

    /// Registers a handler after the configured ones; same-named entries
    /// are replaced.
    pub fn with_formatter(mut self, name: impl Into<String>, handler: impl Into<Handler>) -> Self {
        self.handlers.push((name.into(), handler.into()));
        self
    }

    /// An in-memory template, e.g. the wrapper layout.
    pub fn with_template(mut self, name: impl Into<String>, source: impl Into<String>) -> Self {
        self.templates.push((name.into(), source.into()));
        self
    }

    pub fn with_native_template<F>(mut self, name: impl Into<String>, template: F) -> Self
    where
        F: Fn(&NativeScope<'_>) -> anyhow::Result<String> + Send + Sync + 'static,
    {
        self.native_templates.push((name.into(), Arc::new(template)));
        self
    }

    /// A custom engine, registered after the configured ones.
    pub fn with_engine(mut self, name: impl Into<String>, engine: Arc<dyn Engine>) -> Self {
        self.engines.push((name.into(), engine));
        self
    }

    /// The formatter every engine shares: configured handlers, then the
    /// ones added in code, then the built-in `text` formatter.
    pub fn data_formatter(&self) -> DataFormatter {
        let mut formatter = DataFormatter::new();
        for (name, handler) in &self.config.formatters {
            formatter.register_handler(name.as_str(), handler.to_handler());
        }
        for (name, handler) in &self.handlers {
            formatter.register_handler(name.as_str(), handler.clone());
        }
        if !formatter.has_handler(TEXT_HANDLER) {
            formatter.register_handler(TEXT_HANDLER, Handler::formatter(text_formatter()));
        }
        formatter
    }

    pub fn build(self) -> Result<Renderer, RenderError> {
        let formatter = Arc::new(self.data_formatter());
        let locator = TemplateLocator::new(self.config.paths.iter().cloned(), Vec::<String>::new());

        let mut service = TwigService::new(locator.clone(), formatter);
        for (name, source) in &self.templates {
            service.add_template(name.as_str(), source.as_str())?;
        }
        for (name, value) in &self.config.globals {
            service.add_global(name.as_str(), value.clone());
        }
        let service = Arc::new(service);

        let wrapper = Wrapper::new(service.clone())
            .with_template(self.config.wrapper_template.clone())
            .with_content_var(self.config.content_var.as_str());

        let mut renderer = Renderer::new(self.config.default_engine.as_str());
        let mut native_templates = Some(self.native_templates);

        for name in &self.config.engines {
            if renderer.has_engine(name) {
                warn!("Rendering engine {:?} is listed more than once, skipping", name);
                continue;
            }
            let engine: Arc<dyn Engine> = match name.as_str() {
                "twig" => Arc::new(TwigEngine::new(service.clone())),
                "markdown" => Arc::new(MarkdownEngine::new(locator.clone(), wrapper.clone())),
                "pdf" => Arc::new(PdfEngine::new(service.clone())),
                "native" => {
                    let mut engine = NativeEngine::new(wrapper.clone());
                    for (template, f) in native_templates.take().unwrap_or_default() {
                        engine.add_shared_template(template, f);
                    }
                    Arc::new(engine)
                }
                other => {
                    warn!("Unknown rendering engine {:?} in configuration, skipping", other);
                    continue;
                }
            };
            renderer.add_engine(name.as_str(), engine);
        }

        if !renderer.has_engine("twig") {
            debug!("twig engine not configured, adding it");
            renderer.add_engine("twig", Arc::new(TwigEngine::new(service.clone())));
        }

        if native_templates.is_some_and(|templates| !templates.is_empty()) {
            warn!("Native templates were registered but the native engine is not enabled");
        }

        for (name, engine) in self.engines {
            renderer.add_engine(name, engine);
        }

        if !renderer.has_engine(renderer.default_engine()) {
            return Err(RenderError::Configuration {
                option: "default_engine".to_string(),
                value: renderer.default_engine().to_string(),
                expected: format!("one of {}", renderer.engine_names().join(", ")),
            });
        }

        Ok(renderer)
    }
}
