use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use log::debug;
use serde_json::Value as JsonValue;

use crate::engine::{Engine, RenderOptions, Rendered};
use crate::error::RenderError;

/// Engine used when neither the options nor the file extension pick one.
pub const DEFAULT_ENGINE: &str = "twig";

/// Dispatches render calls to registered engines.
///
/// Engine selection, first match wins:
///
/// 1. `options.engine`, when non-empty;
/// 2. `options.format` (`html` → `twig`, `pdf` → `pdf`, anything else as the engine name);
/// 3. the longest registered extension the template name ends with;
/// 4. the default engine.
pub struct Renderer {
    engines: HashMap<String, Arc<dyn Engine>>,
    extensions: Vec<(String, String)>,
    default_engine: String,
}

impl Renderer {
    pub fn new(default_engine: impl Into<String>) -> Self {
        Self {
            engines: HashMap::new(),
            extensions: Vec::new(),
            default_engine: default_engine.into(),
        }
    }

    /// Registers `engine` under `name` along with its extensions. A later
    /// engine claiming an extension takes it over.
    pub fn add_engine(&mut self, name: impl Into<String>, engine: Arc<dyn Engine>) -> &mut Self {
        let name = name.into();
        for ext in engine.supported_extensions() {
            match self.extensions.iter_mut().find(|(e, _)| e == ext) {
                Some(slot) => slot.1 = name.clone(),
                None => self.extensions.push((ext.to_string(), name.clone())),
            }
        }
        debug!(
            "registered engine {:?} for extensions {:?}",
            name,
            engine.supported_extensions()
        );
        self.engines.insert(name, engine);
        self
    }

    pub fn with_engine(mut self, name: impl Into<String>, engine: Arc<dyn Engine>) -> Self {
        self.add_engine(name, engine);
        self
    }

    pub fn get_engine(&self, name: &str) -> Result<Arc<dyn Engine>, RenderError> {
        self.engines
            .get(name)
            .cloned()
            .ok_or_else(|| RenderError::EngineNotFound(name.to_string()))
    }

    pub fn has_engine(&self, name: &str) -> bool {
        self.engines.contains_key(name)
    }

    /// Registered engine names, sorted.
    pub fn engine_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.engines.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// `(extension, engine)` pairs in registration order.
    pub fn extensions(&self) -> &[(String, String)] {
        &self.extensions
    }

    pub fn default_engine(&self) -> &str {
        &self.default_engine
    }

    /// Picks the engine name for `template`. The name is not checked
    /// against the registry.
    pub fn resolve_engine(&self, template: &str, options: &RenderOptions) -> String {
        if let Some(engine) = options.engine.as_deref().filter(|e| !e.is_empty()) {
            return engine.to_string();
        }

        if let Some(format) = options.format.as_deref().filter(|f| !f.is_empty()) {
            return match format {
                "html" => "twig",
                "pdf" => "pdf",
                other => other,
            }
            .to_string();
        }

        let mut best: Option<&(String, String)> = None;
        for entry in &self.extensions {
            let (ext, _) = entry;
            let matches = template.len() > ext.len()
                && template.ends_with(ext.as_str())
                && template[..template.len() - ext.len()].ends_with('.');
            if matches && best.map_or(true, |(b, _)| ext.len() > b.len()) {
                best = Some(entry);
            }
        }

        match best {
            Some((_, engine)) => engine.clone(),
            None => self.default_engine.clone(),
        }
    }

    /// Renders `template` with the engine chosen by [`resolve_engine`](Self::resolve_engine).
    pub fn render(
        &self,
        template: &str,
        data: &JsonValue,
        options: &RenderOptions,
    ) -> Result<Rendered, RenderError> {
        let name = self.resolve_engine(template, options);
        debug!("rendering {:?} with engine {:?}", template, name);
        let engine = self.get_engine(&name)?;
        engine.render(template, data, options)
    }
}

impl Default for Renderer {
    fn default() -> Self {
        Self::new(DEFAULT_ENGINE)
    }
}

impl fmt::Debug for Renderer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Renderer")
            .field("engines", &self.engine_names())
            .field("extensions", &self.extensions)
            .field("default_engine", &self.default_engine)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    struct Stub {
        name: &'static str,
        extensions: &'static [&'static str],
    }

    impl Engine for Stub {
        fn render(
            &self,
            template: &str,
            data: &JsonValue,
            options: &RenderOptions,
        ) -> Result<Rendered, RenderError> {
            Ok(Rendered::Text(format!(
                "{}:{}:{}:{}",
                self.name,
                template,
                data,
                options.to_value()
            )))
        }

        fn supported_extensions(&self) -> &[&str] {
            self.extensions
        }

        fn name(&self) -> &str {
            self.name
        }
    }

    fn stub(name: &'static str, extensions: &'static [&'static str]) -> Arc<dyn Engine> {
        Arc::new(Stub { name, extensions })
    }

    fn renderer() -> Renderer {
        Renderer::default()
            .with_engine("twig", stub("twig", &["html.twig", "txt.twig"]))
            .with_engine("markdown", stub("markdown", &["md", "markdown"]))
            .with_engine("pdf", stub("pdf", &["pdf.twig"]))
    }

    #[test]
    fn test_resolve_by_extension() {
        let renderer = renderer();
        let options = RenderOptions::new();
        assert_eq!(renderer.resolve_engine("readme.md", &options), "markdown");
        assert_eq!(renderer.resolve_engine("invoice.pdf.twig", &options), "pdf");
        assert_eq!(renderer.resolve_engine("page.html.twig", &options), "twig");
        assert_eq!(renderer.resolve_engine("page", &options), "twig");
        // Only whole extensions match.
        assert_eq!(renderer.resolve_engine("notes.xmd", &options), "twig");
    }

    #[test]
    fn test_longest_extension_wins_regardless_of_order() {
        let renderer = Renderer::default()
            .with_engine("plain", stub("plain", &["twig"]))
            .with_engine("html", stub("html", &["html.twig"]));
        assert_eq!(renderer.resolve_engine("page.html.twig", &RenderOptions::new()), "html");

        let renderer = Renderer::default()
            .with_engine("html", stub("html", &["html.twig"]))
            .with_engine("plain", stub("plain", &["twig"]));
        assert_eq!(renderer.resolve_engine("page.html.twig", &RenderOptions::new()), "html");
        assert_eq!(renderer.resolve_engine("page.twig", &RenderOptions::new()), "plain");
    }

    #[test]
    fn test_explicit_engine_and_format() {
        let renderer = renderer();
        assert_eq!(
            renderer.resolve_engine("readme.md", &RenderOptions::new().with_engine("pdf")),
            "pdf"
        );
        assert_eq!(
            renderer.resolve_engine("readme.md", &RenderOptions::new().with_format("html")),
            "twig"
        );
        assert_eq!(
            renderer.resolve_engine("page.html.twig", &RenderOptions::new().with_format("pdf")),
            "pdf"
        );
        assert_eq!(
            renderer.resolve_engine("page", &RenderOptions::new().with_format("markdown")),
            "markdown"
        );
        // An empty engine option is ignored.
        assert_eq!(
            renderer.resolve_engine("readme.md", &RenderOptions::new().with_engine("")),
            "markdown"
        );
    }

    #[test]
    fn test_last_registration_of_extension_wins() {
        let renderer = renderer().with_engine("commonmark", stub("commonmark", &["md"]));
        assert_eq!(renderer.resolve_engine("readme.md", &RenderOptions::new()), "commonmark");
        assert_eq!(
            renderer
                .extensions()
                .iter()
                .filter(|(ext, _)| ext == "md")
                .count(),
            1
        );
    }

    #[test]
    fn test_render_delegates_unmodified() {
        let renderer = renderer();
        let options = RenderOptions::new().with_option("theme", "dark");
        let out = renderer.render("readme.md", &json!({"a": 1}), &options).unwrap();
        assert_eq!(out.into_text(), r#"markdown:readme.md:{"a":1}:{"theme":"dark"}"#);
    }

    #[test]
    fn test_unknown_engine() {
        let renderer = renderer();
        let Err(err) = renderer.get_engine("nonexistent") else {
            panic!("engine \"nonexistent\" should not be registered");
        };
        assert_eq!(err.to_string(), "Rendering engine \"nonexistent\" not found.");

        let err = renderer
            .render("x", &json!({}), &RenderOptions::new().with_engine("nonexistent"))
            .unwrap_err();
        assert!(matches!(err, RenderError::EngineNotFound(name) if name == "nonexistent"));
    }

    #[test]
    fn test_engine_names() {
        assert_eq!(renderer().engine_names(), vec!["markdown", "pdf", "twig"]);
    }
}
