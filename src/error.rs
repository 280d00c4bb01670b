use thiserror::Error;

/// Errors raised while resolving engines, formatting values or rendering
/// templates. Every variant is terminal for the current render call.
#[derive(Error, Debug)]
pub enum RenderError {
    #[error("Rendering engine \"{0}\" not found.")]
    EngineNotFound(String),

    #[error("Formatter \"{0}\" not found.")]
    HandlerNotFound(String),

    /// A handler failed. Only the inner message is kept.
    #[error("Error in formatter handler \"{format}\": {message}")]
    Formatting { format: String, message: String },

    #[error("Template \"{0}\" not found or is not readable.")]
    TemplateNotFound(String),

    #[error("Invalid value \"{value}\" for configuration option \"{option}\". Expected: {expected}.")]
    Configuration {
        option: String,
        value: String,
        expected: String,
    },

    #[error("Error rendering template \"{template}\": {message}")]
    Rendering { template: String, message: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to serialize render data: {0}")]
    Json(#[from] serde_json::Error),
}

impl RenderError {
    pub fn formatting(format: impl Into<String>, message: impl ToString) -> Self {
        RenderError::Formatting {
            format: format.into(),
            message: message.to_string(),
        }
    }

    pub fn rendering(template: impl Into<String>, message: impl ToString) -> Self {
        RenderError::Rendering {
            template: template.into(),
            message: message.to_string(),
        }
    }

    /// Maps a minijinja failure for `template` onto the crate's error kinds.
    pub(crate) fn from_minijinja(template: &str, err: minijinja::Error) -> Self {
        match err.kind() {
            minijinja::ErrorKind::TemplateNotFound => {
                RenderError::TemplateNotFound(err.name().unwrap_or(template).to_string())
            }
            _ => {
                let mut message = err.to_string();
                let mut source = std::error::Error::source(&err);
                while let Some(inner) = source {
                    message.push_str(": ");
                    message.push_str(&inner.to_string());
                    source = inner.source();
                }
                RenderError::rendering(template, message)
            }
        }
    }
}
