use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use log::info;
use rendition::{DataFormatter, RenderOptions, RendererConfig, RendererFactory};
use serde_json::{Map, Value as JsonValue};
use std::io::Write;
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Path to the YAML configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize a new project with a config file and a wrapper layout
    Init {
        /// Project directory
        #[arg(default_value = ".")]
        path: PathBuf,
    },
    /// Render a template
    Render {
        /// Template name or path
        template: String,

        /// Path to the JSON or YAML data file
        #[arg(short, long)]
        data: Option<PathBuf>,

        /// Engine to use, bypassing extension detection
        #[arg(long)]
        engine: Option<String>,

        /// Output format (html, pdf, or an engine name)
        #[arg(long)]
        format: Option<String>,

        /// Extra render option as key=value; dotted keys nest, values are JSON when they parse
        #[arg(long = "option", value_name = "KEY=VALUE")]
        options: Vec<String>,

        /// Output file (stdout when omitted)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Format a single value
    Format {
        /// The value, as JSON (bare words are taken as strings)
        value: String,

        /// Format identifier, e.g. "money" or "text.snakecase"
        format: String,

        /// Fail when no registered handler matches the format
        #[arg(long)]
        strict: bool,
    },
    /// List the enabled engines and their extensions
    Engines,
}

fn main() -> Result<()> {
    env_logger::init();

    let cli = Cli::parse();
    let config = load_config(cli.config.as_deref())?;

    match cli.command {
        Commands::Init { path } => init_project(&path),
        Commands::Render {
            template,
            data,
            engine,
            format,
            options,
            output,
        } => {
            let mut render_options = RenderOptions::new();
            render_options.engine = engine;
            render_options.format = format;
            for option in &options {
                let (key, value) = parse_option(option)?;
                insert_dotted(&mut render_options.extra, &key, value);
            }
            let data = match data {
                Some(path) => load_data(&path)?,
                None => JsonValue::Object(Map::new()),
            };
            render(&config, &template, &data, &render_options, output.as_deref())
        }
        Commands::Format {
            value,
            format,
            strict,
        } => {
            let formatter = RendererFactory::new(config).data_formatter();
            println!("{}", format_value(&formatter, &value, &format, strict)?);
            Ok(())
        }
        Commands::Engines => {
            let renderer = RendererFactory::create(&config)?;
            for name in renderer.engine_names() {
                let extensions: Vec<&str> = renderer
                    .extensions()
                    .iter()
                    .filter(|(_, engine)| engine == name)
                    .map(|(ext, _)| ext.as_str())
                    .collect();
                let marker = if name == renderer.default_engine() { " (default)" } else { "" };
                println!("{}{}: {}", name, marker, extensions.join(", "));
            }
            Ok(())
        }
    }
}

fn load_config(path: Option<&Path>) -> Result<RendererConfig> {
    match path {
        Some(path) => {
            info!("Loading config from {:?}", path);
            RendererConfig::load(path).context("Failed to load config")
        }
        None => Ok(RendererConfig {
            paths: vec![PathBuf::from(".")],
            ..RendererConfig::default()
        }),
    }
}

fn load_data(path: &Path) -> Result<JsonValue> {
    info!("Loading data from {:?}", path);
    let content = std::fs::read_to_string(path).context("Failed to read data file")?;
    let is_yaml = matches!(
        path.extension().and_then(|e| e.to_str()),
        Some("yaml") | Some("yml")
    );
    if is_yaml {
        serde_yaml::from_str(&content).context("Failed to parse YAML data")
    } else {
        serde_json::from_str(&content).context("Failed to parse JSON data")
    }
}

fn render(
    config: &RendererConfig,
    template: &str,
    data: &JsonValue,
    options: &RenderOptions,
    output: Option<&Path>,
) -> Result<()> {
    let renderer = RendererFactory::create(config)?;
    let rendered = renderer.render(template, data, options)?;

    match output {
        Some(path) => {
            std::fs::write(path, rendered.into_bytes())
                .with_context(|| format!("Failed to write {:?}", path))?;
            info!("✓ Rendered {} to {:?}", template, path);
        }
        None => {
            let mut stdout = std::io::stdout().lock();
            stdout.write_all(&rendered.into_bytes())?;
            stdout.flush()?;
        }
    }
    Ok(())
}

fn format_value(formatter: &DataFormatter, raw: &str, format: &str, strict: bool) -> Result<String> {
    if strict {
        formatter.resolve(format)?;
    }
    let value = parse_value(raw);
    Ok(formatter.format(&minijinja::Value::from_serialize(&value), format)?)
}

fn parse_value(raw: &str) -> JsonValue {
    serde_json::from_str(raw).unwrap_or_else(|_| JsonValue::String(raw.to_string()))
}

fn parse_option(option: &str) -> Result<(String, JsonValue)> {
    let Some((key, value)) = option.split_once('=') else {
        bail!("Invalid option {:?}, expected KEY=VALUE", option);
    };
    if key.is_empty() {
        bail!("Invalid option {:?}, the key is empty", option);
    }
    Ok((key.to_string(), parse_value(value)))
}

/// `config.pdf.margin=5` becomes `{"config": {"pdf": {"margin": 5}}}`.
fn insert_dotted(map: &mut Map<String, JsonValue>, key: &str, value: JsonValue) {
    match key.split_once('.') {
        None => {
            map.insert(key.to_string(), value);
        }
        Some((head, rest)) => {
            let entry = map
                .entry(head.to_string())
                .or_insert_with(|| JsonValue::Object(Map::new()));
            if !entry.is_object() {
                *entry = JsonValue::Object(Map::new());
            }
            if let JsonValue::Object(inner) = entry {
                insert_dotted(inner, rest, value);
            }
        }
    }
}

fn init_project(path: &Path) -> Result<()> {
    info!("Initializing rendition project at {:?}", path);

    std::fs::create_dir_all(path.join("templates"))?;

    let config_content = r#"paths: [templates]
engines: [twig, markdown, pdf]
default_engine: twig
wrapper_template: html
content_var: content
formatters:
  money: "$%.2f"
  status: { lookup: { "1": Active, "0": Inactive } }
  price: { alias: money }
"#;
    std::fs::write(path.join("rendition.yaml"), config_content)?;

    let data_content = r#"{
  "title": "Welcome",
  "total": 1234.5,
  "status": 1
}
"#;
    std::fs::write(path.join("data.json"), data_content)?;

    let layout = r#"<!doctype html>
<html>
<head><title>{{ title }}</title></head>
<body>
{{ content }}
</body>
</html>
"#;
    std::fs::write(path.join("templates/html.html.twig"), layout)?;

    let page = r#"# {{ title }}

Total: {{ total | format_as('price') }} ({{ status | format_as('status') }})
"#;
    std::fs::write(path.join("templates/index.md"), page)?;

    info!("✓ Project initialized successfully!");
    info!("  Run: rendition -c rendition.yaml render index.md -d data.json");

    Ok(())
}
