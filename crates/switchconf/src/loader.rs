//! Config file discovery, merging, and environment variable overlay.

use crate::{ConfigError, SwitchConfig};
use std::path::{Path, PathBuf};

/// Information about where config values came from.
#[derive(Debug, Clone, Default)]
pub struct ConfigSources {
    /// Config files that were loaded (in order)
    pub files: Vec<PathBuf>,
    /// Environment variables that overrode config values
    pub env_overrides: Vec<String>,
}

/// Discover config files, optionally with a CLI override path.
///
/// Returns paths in load order (system, user, local/cli). Only existing
/// files are returned.
pub fn discover_config_files_with_override(cli_path: Option<&Path>) -> Vec<PathBuf> {
    let mut files = Vec::new();

    let system = PathBuf::from("/etc/switchboard/config.toml");
    if system.exists() {
        files.push(system);
    }

    if let Some(config_dir) = directories::BaseDirs::new().map(|d| d.config_dir().to_path_buf()) {
        let user = config_dir.join("switchboard/config.toml");
        if user.exists() {
            files.push(user);
        }
    }

    // CLI override takes precedence over local
    if let Some(path) = cli_path {
        if path.exists() {
            files.push(path.to_path_buf());
            return files;
        }
    }

    let local = PathBuf::from("switchboard.toml");
    if local.exists() {
        files.push(local);
    }

    files
}

pub fn load_from_file(path: &Path) -> Result<toml::Table, ConfigError> {
    let contents = std::fs::read_to_string(path).map_err(|e| ConfigError::FileRead {
        path: path.to_path_buf(),
        source: e,
    })?;

    contents.parse().map_err(|e: toml::de::Error| ConfigError::Parse {
        path: path.to_path_buf(),
        message: e.to_string(),
    })
}

/// Merge `overlay` into `base`. Tables merge recursively; anything else replaces.
pub fn merge_tables(base: &mut toml::Table, overlay: toml::Table) {
    for (key, value) in overlay {
        match (base.get_mut(&key), value) {
            (Some(toml::Value::Table(existing)), toml::Value::Table(incoming)) => {
                merge_tables(existing, incoming);
            }
            (_, value) => {
                base.insert(key, value);
            }
        }
    }
}

/// Apply environment overrides, reading variables through `env`.
pub fn apply_env_overrides(
    config: &mut SwitchConfig,
    sources: &mut ConfigSources,
    env: impl Fn(&str) -> Option<String>,
) {
    let mut take = |key: &str| {
        let value = env(key)?;
        sources.env_overrides.push(key.to_string());
        Some(value)
    };

    if let Some(v) = take("SWITCHBOARD_SERVERS") {
        config.servers.endpoints = v
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect();
    }

    if let Some(v) = take("SWITCHBOARD_BASE_URL") {
        config.session.base_url = v;
    }
    if let Some(v) = take("SWITCHBOARD_MODEL") {
        config.session.model = v;
    }
    if let Some(v) = take("SWITCHBOARD_API_KEY") {
        config.session.api_key = Some(v);
    } else if let Some(v) = take("OPENAI_API_KEY") {
        config.session.api_key = Some(v);
    }

    if let Some(v) = take("SWITCHBOARD_MEDIA_DIR") {
        config.media.dir = Some(PathBuf::from(v));
    }

    if let Some(v) = take("SWITCHBOARD_LOG_LEVEL") {
        config.telemetry.log_level = v;
    } else if let Some(v) = take("RUST_LOG") {
        config.telemetry.log_level = v;
    }
    if let Some(v) = take("SWITCHBOARD_OTLP_ENDPOINT") {
        config.telemetry.otlp_endpoint = Some(v);
    }
}

/// Expand ~ and environment variables in a path.
pub fn expand_path(path: &str) -> PathBuf {
    if let Some(stripped) = path.strip_prefix("~/") {
        return match directories::BaseDirs::new() {
            Some(dirs) => dirs.home_dir().join(stripped),
            None => PathBuf::from(path),
        };
    }

    if let Some(stripped) = path.strip_prefix('$') {
        let (var_name, rest) = match stripped.find('/') {
            Some(pos) => (&stripped[..pos], Some(&stripped[pos + 1..])),
            None => (stripped, None),
        };
        return match (std::env::var(var_name), rest) {
            (Ok(value), Some(rest)) => PathBuf::from(value).join(rest),
            (Ok(value), None) => PathBuf::from(value),
            (Err(_), _) => PathBuf::from(path),
        };
    }

    PathBuf::from(path)
}
