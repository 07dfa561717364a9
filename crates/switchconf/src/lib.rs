//! Configuration for switchboard.
//!
//! # Config File Locations
//!
//! Files are loaded in order (later wins):
//! 1. `/etc/switchboard/config.toml` (system)
//! 2. `~/.config/switchboard/config.toml` (user)
//! 3. `./switchboard.toml`, or the path given on the command line
//! 4. Environment variables (`SWITCHBOARD_*`)
//!
//! Files are merged key by key, so a local file only needs the values it
//! changes.
//!
//! # Example Config
//!
//! ```toml
//! [servers]
//! endpoints = ["http://localhost:8000/mcp"]
//!
//! [session]
//! base_url = "http://localhost:11434/v1"
//! model = "qwen3:8b"
//! max_tool_iterations = 8
//!
//! [media]
//! dir = "~/.cache/switchboard/media"
//!
//! [telemetry]
//! log_level = "info,switchboard=debug"
//! otlp_endpoint = "http://127.0.0.1:4317"
//! ```

pub mod loader;
mod sections;

pub use loader::ConfigSources;
pub use sections::{MediaConfig, ServersConfig, SessionConfig, TelemetryConfig};

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Configuration loading errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    FileRead {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse config file {path}: {message}")]
    Parse { path: PathBuf, message: String },

    /// The merged files parsed as TOML but do not fit the config shape.
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SwitchConfig {
    #[serde(default)]
    pub servers: ServersConfig,
    #[serde(default)]
    pub session: SessionConfig,
    #[serde(default)]
    pub media: MediaConfig,
    #[serde(default)]
    pub telemetry: TelemetryConfig,
}

impl SwitchConfig {
    /// Load configuration from all standard sources.
    pub fn load() -> Result<Self, ConfigError> {
        let (config, _sources) = Self::load_with_sources_from(None)?;
        Ok(config)
    }

    /// Load with an optional CLI path that replaces `./switchboard.toml`.
    pub fn load_from(config_path: Option<&Path>) -> Result<Self, ConfigError> {
        let (config, _sources) = Self::load_with_sources_from(config_path)?;
        Ok(config)
    }

    pub fn load_with_sources_from(
        config_path: Option<&Path>,
    ) -> Result<(Self, ConfigSources), ConfigError> {
        let files = loader::discover_config_files_with_override(config_path);
        Self::load_files(&files, |key| std::env::var(key).ok())
    }

    /// Merge the given files in order, then apply overrides from `env`.
    pub fn load_files(
        files: &[PathBuf],
        env: impl Fn(&str) -> Option<String>,
    ) -> Result<(Self, ConfigSources), ConfigError> {
        let mut sources = ConfigSources::default();
        let mut merged = toml::Table::new();

        for path in files {
            let table = loader::load_from_file(path)?;
            loader::merge_tables(&mut merged, table);
            sources.files.push(path.clone());
        }

        let mut config: SwitchConfig = toml::Value::Table(merged)
            .try_into()
            .map_err(|e: toml::de::Error| ConfigError::Invalid(e.to_string()))?;

        loader::apply_env_overrides(&mut config, &mut sources, env);

        if let Some(dir) = config.media.dir.take() {
            config.media.dir = Some(loader::expand_path(&dir.to_string_lossy()));
        }

        if config.session.max_tool_iterations == 0 {
            return Err(ConfigError::Invalid(
                "session.max_tool_iterations must be at least 1".into(),
            ));
        }

        Ok((config, sources))
    }

    pub fn to_toml(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(|e| ConfigError::Invalid(e.to_string()))
    }
}
