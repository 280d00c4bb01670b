//! Engine adapters.
//!
//! Every engine builds its context with [`build_context`](crate::engine::build_context).
//! Composite engines (Markdown, native) render their own content first and
//! then hand it to a wrapper layout through the shared [`TwigService`].

use std::collections::HashMap;
use std::sync::Arc;

use minijinja::value::Value;
use serde_json::Value as JsonValue;

use crate::error::RenderError;

pub mod markdown;
pub mod native;
pub mod pdf;
pub mod twig;

pub use markdown::MarkdownEngine;
pub use native::{NativeEngine, NativeScope, NativeTemplate};
pub use pdf::{PdfEngine, PdfSettings};
pub use twig::{TwigEngine, TwigService, TWIG_EXTENSIONS};

/// Default layout wrapping Markdown and native output.
pub const DEFAULT_WRAPPER_TEMPLATE: &str = "html";

/// Default variable the wrapped content is bound to.
pub const DEFAULT_CONTENT_VAR: &str = "content";

/// Context key that overrides the wrapper layout for one render.
pub const WRAPPER_TEMPLATE_KEY: &str = "wrapperTemplate";

/// Renders inner content into an outer layout.
#[derive(Clone)]
pub struct Wrapper {
    service: Arc<TwigService>,
    template: Option<String>,
    content_var: String,
}

impl Wrapper {
    pub fn new(service: Arc<TwigService>) -> Self {
        Self {
            service,
            template: Some(DEFAULT_WRAPPER_TEMPLATE.to_string()),
            content_var: DEFAULT_CONTENT_VAR.to_string(),
        }
    }

    /// `None` disables wrapping unless the context names a layout.
    pub fn with_template(mut self, template: Option<String>) -> Self {
        self.template = template;
        self
    }

    pub fn with_content_var(mut self, content_var: impl Into<String>) -> Self {
        self.content_var = content_var.into();
        self
    }

    pub fn service(&self) -> &Arc<TwigService> {
        &self.service
    }

    /// Binds `content` (as safe markup) into `context` and renders the layout.
    pub fn wrap(&self, context: &JsonValue, content: String) -> Result<String, RenderError> {
        let template = context
            .get(WRAPPER_TEMPLATE_KEY)
            .and_then(JsonValue::as_str)
            .map(str::to_string)
            .or_else(|| self.template.clone());

        let Some(template) = template else {
            return Ok(content);
        };

        let mut map: HashMap<String, Value> = match context {
            JsonValue::Object(entries) => entries
                .iter()
                .map(|(k, v)| (k.clone(), Value::from_serialize(v)))
                .collect(),
            _ => HashMap::new(),
        };
        map.insert(self.content_var.clone(), Value::from_safe_string(content));

        self.service.render_value(&template, Value::from(map))
    }
}
