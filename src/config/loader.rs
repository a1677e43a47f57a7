use crate::config::schema::{validate, FileSpec, ValidationError};
use serde::Deserialize;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

/// Failure to load a sweep configuration. Nothing has been edited when this
/// is returned.
#[derive(Debug)]
pub enum ConfigError {
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    Yaml {
        path: Option<PathBuf>,
        document: usize,
        source: serde_yaml::Error,
    },
    Validation {
        path: Option<PathBuf>,
        source: ValidationError,
    },
}

impl ConfigError {
    fn with_path(self, path: &Path) -> Self {
        let path = path.to_path_buf();
        match self {
            ConfigError::Io { .. } => self,
            ConfigError::Yaml {
                path: None,
                document,
                source,
            } => ConfigError::Yaml {
                path: Some(path),
                document,
                source,
            },
            ConfigError::Validation { path: None, source } => ConfigError::Validation {
                path: Some(path),
                source,
            },
            other => other,
        }
    }
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::Io { path, source } => {
                write!(
                    f,
                    "could not load configuration from {}: {}",
                    path.display(),
                    source
                )
            }
            ConfigError::Yaml {
                path,
                document,
                source,
            } => match path {
                Some(path) => write!(
                    f,
                    "failed to parse configuration YAML ({}, document {}): {}",
                    path.display(),
                    document,
                    source
                ),
                None => write!(
                    f,
                    "failed to parse configuration YAML (document {}): {}",
                    document, source
                ),
            },
            ConfigError::Validation { path, source } => match path {
                Some(path) => write!(f, "invalid configuration ({}): {}", path.display(), source),
                None => write!(f, "invalid configuration: {}", source),
            },
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::Io { source, .. } => Some(source),
            ConfigError::Yaml { source, .. } => Some(source),
            ConfigError::Validation { source, .. } => Some(source),
        }
    }
}

/// Parse a `---` separated stream of file documents.
///
/// Empty documents (a stray `---`, a comment-only document) are skipped.
pub fn load_from_str(input: &str) -> Result<Vec<FileSpec>, ConfigError> {
    let mut specs = Vec::new();

    for (document, de) in serde_yaml::Deserializer::from_str(input).enumerate() {
        let yaml_error = |source| ConfigError::Yaml {
            path: None,
            document,
            source,
        };
        let value = serde_yaml::Value::deserialize(de).map_err(yaml_error)?;
        if value.is_null() {
            continue;
        }
        specs.push(FileSpec::deserialize(value).map_err(yaml_error)?);
    }

    validate(&specs).map_err(|source| ConfigError::Validation { path: None, source })?;
    Ok(specs)
}

pub fn load_from_path(path: impl AsRef<Path>) -> Result<Vec<FileSpec>, ConfigError> {
    let path = path.as_ref();
    let contents = fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    load_from_str(&contents).map_err(|error| error.with_path(path))
}
