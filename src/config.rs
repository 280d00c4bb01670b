use serde::de::{Deserializer, MapAccess, Visitor};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::engines::{DEFAULT_CONTENT_VAR, DEFAULT_WRAPPER_TEMPLATE};
use crate::handler::Handler;
use crate::renderer::DEFAULT_ENGINE;

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RendererConfig {
    /// Template search paths, relative to the config file when loaded from one.
    #[serde(default)]
    pub paths: Vec<PathBuf>,

    #[serde(default = "default_engines")]
    pub engines: Vec<String>,

    #[serde(default = "default_engine")]
    pub default_engine: String,

    /// Layout wrapping Markdown and native output; `null` disables wrapping.
    #[serde(default = "default_wrapper_template")]
    pub wrapper_template: Option<String>,

    #[serde(default = "default_content_var")]
    pub content_var: String,

    /// Named handlers registered on the data formatter, in file order.
    #[serde(default, deserialize_with = "ordered_entries")]
    pub formatters: Vec<(String, HandlerConfig)>,

    /// Variables available to every template.
    #[serde(default)]
    pub globals: BTreeMap<String, serde_json::Value>,
}

impl Default for RendererConfig {
    fn default() -> Self {
        Self {
            paths: Vec::new(),
            engines: default_engines(),
            default_engine: default_engine(),
            wrapper_template: default_wrapper_template(),
            content_var: default_content_var(),
            formatters: Vec::new(),
            globals: BTreeMap::new(),
        }
    }
}

fn default_engines() -> Vec<String> {
    vec![DEFAULT_ENGINE.to_string()]
}

fn default_engine() -> String {
    DEFAULT_ENGINE.to_string()
}

fn default_wrapper_template() -> Option<String> {
    Some(DEFAULT_WRAPPER_TEMPLATE.to_string())
}

fn default_content_var() -> String {
    DEFAULT_CONTENT_VAR.to_string()
}

// Handler registration order matters for capability search, so the map is
// read as a list of entries.
fn ordered_entries<'de, D>(deserializer: D) -> Result<Vec<(String, HandlerConfig)>, D::Error>
where
    D: Deserializer<'de>,
{
    struct EntriesVisitor;

    impl<'de> Visitor<'de> for EntriesVisitor {
        type Value = Vec<(String, HandlerConfig)>;

        fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
            f.write_str("a map of formatter names to handlers")
        }

        fn visit_unit<E>(self) -> Result<Self::Value, E> {
            Ok(Vec::new())
        }

        fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<Self::Value, A::Error> {
            let mut entries = Vec::with_capacity(map.size_hint().unwrap_or(0));
            while let Some(entry) = map.next_entry()? {
                entries.push(entry);
            }
            Ok(entries)
        }
    }

    deserializer.deserialize_map(EntriesVisitor)
}

/// A handler declared in the config file.
///
/// ```yaml
/// money: "$%.2f"
/// status: { lookup: { "1": Active, "0": Inactive } }
/// price: { alias: money }
/// ```
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum HandlerConfig {
    Pattern(String),
    Lookup {
        lookup: BTreeMap<String, serde_json::Value>,
    },
    Alias {
        alias: String,
    },
}

impl HandlerConfig {
    pub fn to_handler(&self) -> Handler {
        match self {
            HandlerConfig::Pattern(pattern) => Handler::pattern(pattern.as_str()),
            HandlerConfig::Lookup { lookup } => Handler::lookup(
                lookup
                    .iter()
                    .map(|(k, v)| (k.as_str(), minijinja::Value::from_serialize(v))),
            ),
            HandlerConfig::Alias { alias } => Handler::alias(alias.as_str()),
        }
    }
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to parse YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

impl RendererConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let mut config = Self::from_yaml(&content)?;
        if let Some(base) = path.parent() {
            config.paths = config
                .paths
                .into_iter()
                .map(|p| if p.is_relative() { base.join(p) } else { p })
                .collect();
        }
        Ok(config)
    }

    pub fn from_yaml(content: &str) -> Result<Self, ConfigError> {
        let config: RendererConfig = serde_yaml::from_str(content)?;
        Ok(config)
    }
}
