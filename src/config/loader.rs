//! Configuration loading from disk.

use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::config::schema::{RouterConfig, RoutesConfig};
use crate::config::validation::{validate_config, ValidationError};
use crate::tree::{RouteManifest, TreeBuildError};

/// Error type for configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error reading {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation failed: {}", join(.0))]
    Validation(Vec<ValidationError>),

    #[error("Invalid route tree: {0}")]
    Routes(#[from] TreeBuildError),
}

fn join(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

fn read(path: &Path) -> Result<String, ConfigError> {
    fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })
}

/// Load and validate configuration from a TOML file.
pub fn load_config(path: &Path) -> Result<RouterConfig, ConfigError> {
    let content = read(path)?;
    let config: RouterConfig = toml::from_str(&content)?;

    validate_config(&config).map_err(ConfigError::Validation)?;

    Ok(config)
}

/// Load a route manifest file.
pub fn load_manifest(path: &Path) -> Result<RouteManifest, ConfigError> {
    let content = read(path)?;
    Ok(RouteManifest::from_toml(&content)?)
}

/// The manifest named by the routes section: the file when set, else the
/// inline entries.
pub fn manifest_for(routes: &RoutesConfig) -> Result<RouteManifest, ConfigError> {
    match &routes.manifest_path {
        Some(path) => load_manifest(Path::new(path)),
        None => Ok(RouteManifest::new(routes.entries.clone())),
    }
}
