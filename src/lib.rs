//! Template rendering façade.
//!
//! A [`Renderer`] picks one of several engines (minijinja HTML/text
//! templates, Markdown, Rust-native templates, PDF) for each render call,
//! based on the render options or the template's extension. Templates
//! format values through a shared [`DataFormatter`] via the `format_as`
//! and `to_string` filters.
//!
//! ```no_run
//! use rendition::{RenderOptions, RendererConfig, RendererFactory};
//! use serde_json::json;
//!
//! let config = RendererConfig::load("rendition.yaml".as_ref())?;
//! let renderer = RendererFactory::create(&config)?;
//! let page = renderer.render("invoice.html.twig", &json!({"total": 10}), &RenderOptions::new())?;
//! println!("{}", page.into_text());
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod caster;
pub mod config;
pub mod engine;
pub mod engines;
pub mod error;
pub mod factory;
pub mod filters;
pub mod formatter;
pub mod handler;
pub mod locator;
pub mod pattern;
pub mod renderer;

pub use caster::{cast, cast_to_string, Cast};
pub use config::{ConfigError, HandlerConfig, RendererConfig};
pub use engine::{Engine, RenderOptions, Rendered};
pub use error::RenderError;
pub use factory::RendererFactory;
pub use formatter::{DataFormatter, MappedFormatter, Resolution, DEFAULT_HANDLER};
pub use handler::{GenericFormatHandler, Handler, HandlerError, HandlerFormatter, Repository};
pub use locator::TemplateLocator;
pub use renderer::{Renderer, DEFAULT_ENGINE};
