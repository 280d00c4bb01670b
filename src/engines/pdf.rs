use std::sync::Arc;

use log::debug;
use once_cell::sync::Lazy;
use printpdf::{BuiltinFont, Mm, PdfDocument};
use regex::Regex;
use serde::Deserialize;
use serde_json::Value as JsonValue;

use super::TwigService;
use crate::engine::{build_context, Engine, RenderOptions, Rendered};
use crate::error::RenderError;

const PT_TO_MM: f32 = 0.352_778;
// Average Helvetica glyph width relative to the font size.
const GLYPH_WIDTH: f32 = 0.5;
const LINE_SPACING: f32 = 1.2;

fn default_page_width() -> f32 {
    210.0
}

fn default_page_height() -> f32 {
    297.0
}

fn default_margin() -> f32 {
    15.0
}

fn default_font_size() -> f32 {
    11.0
}

fn default_title() -> String {
    "Document".to_string()
}

/// Page layout, read from `options.config.pdf`. Lengths are millimetres,
/// the font size is in points.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PdfSettings {
    #[serde(default = "default_page_width")]
    pub page_width: f32,
    #[serde(default = "default_page_height")]
    pub page_height: f32,
    #[serde(default = "default_margin")]
    pub margin: f32,
    #[serde(default = "default_font_size")]
    pub font_size: f32,
    #[serde(default = "default_title")]
    pub title: String,
}

impl Default for PdfSettings {
    fn default() -> Self {
        Self {
            page_width: default_page_width(),
            page_height: default_page_height(),
            margin: default_margin(),
            font_size: default_font_size(),
            title: default_title(),
        }
    }
}

impl PdfSettings {
    pub fn from_options(options: &RenderOptions) -> Result<Self, RenderError> {
        let settings = match options.config_section("pdf") {
            None | Some(JsonValue::Null) => Self::default(),
            Some(section) => Self::deserialize(section).map_err(|e| RenderError::Configuration {
                option: "pdf".to_string(),
                value: section.to_string(),
                expected: format!("page settings ({})", e),
            })?,
        };
        settings.validate()?;
        Ok(settings)
    }

    fn validate(&self) -> Result<(), RenderError> {
        let invalid = |option: &str, value: f32, expected: &str| RenderError::Configuration {
            option: format!("pdf.{}", option),
            value: value.to_string(),
            expected: expected.to_string(),
        };

        if !positive(self.page_width) {
            return Err(invalid("page_width", self.page_width, "a positive length in mm"));
        }
        if !positive(self.page_height) {
            return Err(invalid("page_height", self.page_height, "a positive length in mm"));
        }
        if !(self.margin.is_finite() && self.margin >= 0.0)
            || self.margin * 2.0 >= self.page_width
            || self.margin * 2.0 >= self.page_height
        {
            return Err(invalid(
                "margin",
                self.margin,
                "a non-negative length smaller than half the page",
            ));
        }
        if !positive(self.font_size) || self.font_size * PT_TO_MM * LINE_SPACING > self.usable_height() {
            return Err(invalid("font_size", self.font_size, "a positive size in points that fits the page"));
        }
        Ok(())
    }

    fn usable_width(&self) -> f32 {
        self.page_width - 2.0 * self.margin
    }

    fn usable_height(&self) -> f32 {
        self.page_height - 2.0 * self.margin
    }

    fn line_height(&self) -> f32 {
        self.font_size * PT_TO_MM * LINE_SPACING
    }

    fn chars_per_line(&self) -> usize {
        let glyph = self.font_size * PT_TO_MM * GLYPH_WIDTH;
        ((self.usable_width() / glyph).floor() as usize).max(1)
    }

    fn lines_per_page(&self) -> usize {
        ((self.usable_height() / self.line_height()).floor() as usize).max(1)
    }
}

fn positive(value: f32) -> bool {
    value.is_finite() && value > 0.0
}

static HIDDEN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?is)<script\b.*?</script>|<style\b.*?</style>|<head\b.*?</head>").expect("regex is valid"));
static BREAKS: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)<br\s*/?>|</(p|div|h[1-6]|li|tr|table|ul|ol|pre|blockquote|section|article|header|footer)\s*>")
        .expect("regex is valid")
});
static BULLETS: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)<li\b[^>]*>").expect("regex is valid"));
// A tag opens with a name, `/` or `!`; a bare `<` is text.
static TAGS: Lazy<Regex> = Lazy::new(|| Regex::new(r"<[A-Za-z/!][^>]*>").expect("regex is valid"));
static SPACES: Lazy<Regex> = Lazy::new(|| Regex::new(r"[ \t\r\f]+").expect("regex is valid"));

fn decode_entities(text: &str) -> String {
    text.replace("&nbsp;", " ")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&#x27;", "'")
        .replace("&#x2f;", "/")
        .replace("&amp;", "&")
}

/// Reduces rendered HTML to plain text lines, one per block element.
pub fn html_to_lines(html: &str) -> Vec<String> {
    let text = HIDDEN.replace_all(html, "");
    let text = BREAKS.replace_all(&text, "\n");
    let text = BULLETS.replace_all(&text, "- ");
    let text = TAGS.replace_all(&text, "");

    let mut lines = Vec::new();
    for raw in text.lines() {
        let line = decode_entities(SPACES.replace_all(raw, " ").trim());
        if line.is_empty() && lines.last().map_or(true, String::is_empty) {
            continue;
        }
        lines.push(line);
    }
    while lines.last().is_some_and(String::is_empty) {
        lines.pop();
    }
    lines
}

/// Greedy word wrap at `width` characters; words longer than a line are split.
pub fn wrap_line(line: &str, width: usize) -> Vec<String> {
    let mut out = Vec::new();
    let mut current = String::new();

    for word in line.split_whitespace() {
        let mut word: Vec<char> = word.chars().collect();
        while word.len() > width {
            if !current.is_empty() {
                out.push(std::mem::take(&mut current));
            }
            out.push(word.drain(..width).collect());
        }
        if word.is_empty() {
            continue;
        }
        let needed = word.len() + usize::from(!current.is_empty());
        if current.chars().count() + needed > width {
            out.push(std::mem::take(&mut current));
        }
        if !current.is_empty() {
            current.push(' ');
        }
        current.extend(word);
    }
    if !current.is_empty() || out.is_empty() {
        out.push(current);
    }
    out
}

/// Lays `lines` out on as many pages as needed.
pub fn build_pdf(lines: &[String], settings: &PdfSettings) -> Result<Vec<u8>, RenderError> {
    let (doc, first_page, first_layer) = PdfDocument::new(
        settings.title.as_str(),
        Mm(settings.page_width),
        Mm(settings.page_height),
        "Layer 1",
    );
    let font = doc
        .add_builtin_font(BuiltinFont::Helvetica)
        .map_err(|e| RenderError::rendering(settings.title.as_str(), e))?;

    let wrapped: Vec<String> = lines
        .iter()
        .flat_map(|line| wrap_line(line, settings.chars_per_line()))
        .collect();
    let per_page = settings.lines_per_page();
    debug!(
        "laying out {} lines on {} page(s)",
        wrapped.len(),
        wrapped.len().div_ceil(per_page).max(1)
    );

    let mut layer = doc.get_page(first_page).get_layer(first_layer);
    for (page_index, chunk) in wrapped.chunks(per_page).enumerate() {
        if page_index > 0 {
            let (page, page_layer) =
                doc.add_page(Mm(settings.page_width), Mm(settings.page_height), "Layer 1");
            layer = doc.get_page(page).get_layer(page_layer);
        }
        for (i, line) in chunk.iter().enumerate() {
            let baseline = settings.page_height
                - settings.margin
                - settings.line_height() * (i as f32 + 1.0);
            layer.use_text(line.as_str(), settings.font_size, Mm(settings.margin), Mm(baseline), &font);
        }
    }

    doc.save_to_bytes()
        .map_err(|e| RenderError::rendering(settings.title.as_str(), e))
}

/// Renders a template to HTML, then typesets its text into a PDF.
pub struct PdfEngine {
    service: Arc<TwigService>,
}

impl PdfEngine {
    pub fn new(service: Arc<TwigService>) -> Self {
        Self { service }
    }
}

impl Engine for PdfEngine {
    fn render(
        &self,
        template: &str,
        data: &JsonValue,
        options: &RenderOptions,
    ) -> Result<Rendered, RenderError> {
        let settings = PdfSettings::from_options(options)?;
        let context = build_context(data, options);
        let html = self.service.render(template, &context)?;
        let bytes = build_pdf(&html_to_lines(&html), &settings)?;
        Ok(Rendered::Binary(bytes))
    }

    fn supported_extensions(&self) -> &[&str] {
        &["pdf.twig"]
    }

    fn name(&self) -> &str {
        "pdf"
    }
}
