use log::debug;
use pulldown_cmark::{html, Options, Parser};
use serde_json::Value as JsonValue;

use super::Wrapper;
use crate::engine::{build_context, Engine, RenderOptions, Rendered};
use crate::error::RenderError;
use crate::locator::TemplateLocator;

/// Renders Markdown files to HTML and wraps them in a layout.
///
/// The file is first rendered as a template (so `{{ title }}` and the
/// formatter filters work inside Markdown), then converted to HTML.
pub struct MarkdownEngine {
    locator: TemplateLocator,
    wrapper: Wrapper,
}

impl MarkdownEngine {
    pub fn new(locator: TemplateLocator, wrapper: Wrapper) -> Self {
        let locator = locator.with_extensions(["md", "markdown"]);
        Self { locator, wrapper }
    }
}

/// Markdown → HTML with tables, footnotes, strikethrough and task lists.
pub fn markdown_to_html(source: &str) -> String {
    let mut options = Options::empty();
    options.insert(Options::ENABLE_TABLES);
    options.insert(Options::ENABLE_FOOTNOTES);
    options.insert(Options::ENABLE_STRIKETHROUGH);
    options.insert(Options::ENABLE_TASKLISTS);

    let parser = Parser::new_ext(source, options);
    let mut out = String::with_capacity(source.len() * 3 / 2);
    html::push_html(&mut out, parser);
    out
}

// Expansion runs before conversion, so a bare name must not pick up HTML escaping.
fn source_name(template: &str) -> String {
    if template.ends_with(".md") || template.ends_with(".markdown") {
        template.to_string()
    } else {
        format!("{}.md", template)
    }
}

impl Engine for MarkdownEngine {
    fn render(
        &self,
        template: &str,
        data: &JsonValue,
        options: &RenderOptions,
    ) -> Result<Rendered, RenderError> {
        let context = build_context(data, options);

        let source = self.locator.read(template)?;
        let expanded = self
            .wrapper
            .service()
            .render_source(&source_name(template), &source, &context)?;
        debug!("converting markdown template {:?} to html", template);
        let html = markdown_to_html(&expanded);

        self.wrapper.wrap(&context, html).map(Rendered::Text)
    }

    fn supported_extensions(&self) -> &[&str] {
        &["md", "markdown"]
    }

    fn name(&self) -> &str {
        "markdown"
    }
}
