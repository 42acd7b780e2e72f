//! Sub-configuration structs with their defaults.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// General settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Directory where models are stored
    pub model_dir: PathBuf,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            model_dir: PathBuf::from("~/.captionist/models"),
        }
    }
}

/// Execution device for the captioning model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Device {
    /// Use CUDA when the runtime reports it available, CPU otherwise
    #[default]
    Auto,
    /// Always run on the CPU
    Cpu,
    /// Request CUDA (falls back to CPU with a warning if unavailable)
    Cuda,
}

impl std::fmt::Display for Device {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Device::Auto => write!(f, "auto"),
            Device::Cpu => write!(f, "cpu"),
            Device::Cuda => write!(f, "cuda"),
        }
    }
}

/// Captioning model settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptionConfig {
    /// Model directory name under `general.model_dir`
    pub model: String,

    /// Execution device
    pub device: Device,
}

impl Default for CaptionConfig {
    fn default() -> Self {
        Self {
            model: "blip-image-captioning-base".to_string(),
            device: Device::Auto,
        }
    }
}

/// Caption refinement settings.
///
/// `api_key` and `project_id` support `${ENV_VAR}` syntax and are resolved
/// once when the enhancer is built.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EnhancerConfig {
    /// IBM Cloud API key
    pub api_key: String,

    /// watsonx.ai project identifier
    pub project_id: String,

    /// Foundation model used for refinement
    pub model_id: String,
}

impl Default for EnhancerConfig {
    fn default() -> Self {
        Self {
            api_key: "${IBM_CLOUD_API_KEY}".to_string(),
            project_id: "${WATSONX_AI_PROJECT_ID}".to_string(),
            model_id: "ibm/granite-13b-instruct-v2".to_string(),
        }
    }
}

/// Web server settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Bind address
    pub host: String,

    /// Bind port
    pub port: u16,

    /// Where uploaded images are stored (and served from)
    pub upload_dir: PathBuf,

    /// Maximum request body size in megabytes
    pub max_upload_mb: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 5000,
            upload_dir: PathBuf::from("uploads"),
            max_upload_mb: 16,
        }
    }
}

impl ServerConfig {
    /// Maximum request body size in bytes.
    pub fn max_upload_bytes(&self) -> usize {
        (self.max_upload_mb as usize).saturating_mul(1024 * 1024)
    }
}

/// Logging settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level: error, warn, info, debug, trace
    pub level: String,

    /// Log format: "pretty" or "json"
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_device_parses_lowercase() {
        #[derive(Deserialize)]
        struct Wrapper {
            device: Device,
        }
        let parsed: Wrapper = toml::from_str("device = \"cuda\"").unwrap();
        assert_eq!(parsed.device, Device::Cuda);
    }

    #[test]
    fn test_max_upload_bytes() {
        let config = ServerConfig::default();
        assert_eq!(config.max_upload_bytes(), 16 * 1024 * 1024);
    }
}
