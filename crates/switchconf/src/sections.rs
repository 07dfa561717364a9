use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Remote tool servers to connect on startup.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ServersConfig {
    #[serde(default)]
    pub endpoints: Vec<String>,
}

/// OpenAI-compatible chat completions backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Default: http://localhost:11434/v1
    #[serde(default = "SessionConfig::default_base_url")]
    pub base_url: String,

    #[serde(default = "SessionConfig::default_model")]
    pub model: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// Upper bound on tool-calling rounds within one response.
    #[serde(default = "SessionConfig::default_max_tool_iterations")]
    pub max_tool_iterations: usize,

    #[serde(default = "SessionConfig::default_timeout_secs")]
    pub timeout_secs: u64,
}

impl SessionConfig {
    fn default_base_url() -> String {
        "http://localhost:11434/v1".to_string()
    }

    fn default_model() -> String {
        "gpt-4o-mini".to_string()
    }

    fn default_max_tool_iterations() -> usize {
        8
    }

    fn default_timeout_secs() -> u64 {
        120
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            base_url: Self::default_base_url(),
            model: Self::default_model(),
            api_key: None,
            max_tool_iterations: Self::default_max_tool_iterations(),
            timeout_secs: Self::default_timeout_secs(),
        }
    }
}

/// Where decoded images, audio and saved resources are written.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MediaConfig {
    /// Unset means `<tmp>/switchboard-media`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dir: Option<PathBuf>,
}

impl MediaConfig {
    pub fn resolved_dir(&self) -> PathBuf {
        self.dir
            .clone()
            .unwrap_or_else(|| std::env::temp_dir().join("switchboard-media"))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TelemetryConfig {
    /// `EnvFilter` directive string.
    #[serde(default = "TelemetryConfig::default_log_level")]
    pub log_level: String,

    /// OTLP gRPC endpoint. Traces are only exported when set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub otlp_endpoint: Option<String>,
}

impl TelemetryConfig {
    fn default_log_level() -> String {
        "info".to_string()
    }
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            log_level: Self::default_log_level(),
            otlp_endpoint: None,
        }
    }
}
