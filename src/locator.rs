use std::fs;
use std::path::{Path, PathBuf};

use log::debug;

use crate::error::RenderError;

/// Resolves template identifiers to files.
///
/// An identifier is tried as an existing path first, then inside every
/// search path in order, both as given and with each known extension
/// appended (unless it already ends with one).
#[derive(Debug, Clone, Default)]
pub struct TemplateLocator {
    paths: Vec<PathBuf>,
    extensions: Vec<String>,
}

impl TemplateLocator {
    pub fn new<P, E>(paths: P, extensions: E) -> Self
    where
        P: IntoIterator,
        P::Item: Into<PathBuf>,
        E: IntoIterator,
        E::Item: Into<String>,
    {
        Self {
            paths: paths.into_iter().map(Into::into).collect(),
            extensions: extensions.into_iter().map(Into::into).collect(),
        }
    }

    pub fn paths(&self) -> &[PathBuf] {
        &self.paths
    }

    /// Same search paths, different extensions.
    pub fn with_extensions<E>(&self, extensions: E) -> Self
    where
        E: IntoIterator,
        E::Item: Into<String>,
    {
        Self::new(self.paths.clone(), extensions)
    }

    fn has_known_extension(&self, template: &str) -> bool {
        self.extensions
            .iter()
            .any(|ext| template.ends_with(&format!(".{}", ext)))
    }

    fn candidates(&self, template: &str) -> Vec<PathBuf> {
        let mut names = vec![template.to_string()];
        if !self.has_known_extension(template) {
            names.extend(self.extensions.iter().map(|ext| format!("{}.{}", template, ext)));
        }

        let mut candidates: Vec<PathBuf> = names.iter().map(PathBuf::from).collect();
        for dir in &self.paths {
            candidates.extend(names.iter().map(|name| dir.join(name)));
        }
        candidates
    }

    /// Finds the file for `template`.
    pub fn locate(&self, template: &str) -> Result<PathBuf, RenderError> {
        self.candidates(template)
            .into_iter()
            .find(|candidate| candidate.is_file())
            .inspect(|found| debug!("template {:?} resolved to {:?}", template, found))
            .ok_or_else(|| RenderError::TemplateNotFound(template.to_string()))
    }

    /// Reads the source of `template`.
    pub fn read(&self, template: &str) -> Result<String, RenderError> {
        let path = self.locate(template)?;
        read_template(&path, template)
    }

    /// Loader used by the minijinja environment: a miss is `Ok(None)` so
    /// minijinja reports it as a missing template.
    pub fn load(&self, template: &str) -> Result<Option<String>, minijinja::Error> {
        match self.locate(template) {
            Ok(path) => fs::read_to_string(&path).map(Some).map_err(|e| {
                minijinja::Error::new(
                    minijinja::ErrorKind::InvalidOperation,
                    format!("Failed to read template file {:?}", path),
                )
                .with_source(e)
            }),
            Err(_) => Ok(None),
        }
    }
}

fn read_template(path: &Path, template: &str) -> Result<String, RenderError> {
    fs::read_to_string(path).map_err(|e| {
        debug!("failed to read template file {:?}: {}", path, e);
        RenderError::TemplateNotFound(template.to_string())
    })
}
