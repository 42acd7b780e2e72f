//! Configuration validation with range checks.

use crate::error::ConfigError;

use super::Config;

impl Config {
    /// Validate configuration values are within acceptable ranges.
    pub(crate) fn validate(&self) -> Result<(), ConfigError> {
        if self.caption.model.trim().is_empty() {
            return Err(ConfigError::ValidationError(
                "caption.model must not be empty".into(),
            ));
        }
        if self.enhancer.model_id.trim().is_empty() {
            return Err(ConfigError::ValidationError(
                "enhancer.model_id must not be empty".into(),
            ));
        }
        if self.server.host.trim().is_empty() {
            return Err(ConfigError::ValidationError(
                "server.host must not be empty".into(),
            ));
        }
        if self.server.upload_dir.as_os_str().is_empty() {
            return Err(ConfigError::ValidationError(
                "server.upload_dir must not be empty".into(),
            ));
        }
        if self.server.max_upload_mb == 0 {
            return Err(ConfigError::ValidationError(
                "server.max_upload_mb must be > 0".into(),
            ));
        }
        if !matches!(self.logging.format.as_str(), "pretty" | "json") {
            return Err(ConfigError::ValidationError(
                "logging.format must be \"pretty\" or \"json\"".into(),
            ));
        }
        Ok(())
    }
}
