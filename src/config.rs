//! Engine and store configuration
//!
//! Both structs deserialize from JSON with every field optional.

use serde::{Deserialize, Serialize};

use crate::errors::{ModelError, ModelResult};
use crate::observability::{Logger, Severity};

/// Store configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Field every record is keyed by (default: "id")
    #[serde(default = "default_key_field")]
    pub key_field: String,
}

fn default_key_field() -> String {
    "id".to_string()
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            key_field: default_key_field(),
        }
    }
}

impl StoreConfig {
    /// Config with a custom key field
    pub fn with_key_field(key_field: impl Into<String>) -> Self {
        Self {
            key_field: key_field.into(),
        }
    }

    pub fn validate(&self) -> ModelResult<()> {
        if self.key_field.is_empty() || self.key_field.contains('.') {
            return Err(ModelError::Config(format!(
                "key_field '{}' must be a non-empty top-level field name",
                self.key_field
            )));
        }
        Ok(())
    }

    pub fn from_json_str(json: &str) -> ModelResult<Self> {
        let config: Self =
            serde_json::from_str(json).map_err(|e| ModelError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }
}

/// Query/mutation engine configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Issue selector-sequence fetches concurrently (default: false).
    /// Results keep selector order either way.
    #[serde(default)]
    pub parallel_fan_out: bool,

    /// Minimum log severity (default: "warn")
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_log_level() -> String {
    "warn".to_string()
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            parallel_fan_out: false,
            log_level: default_log_level(),
        }
    }
}

impl EngineConfig {
    pub fn severity(&self) -> ModelResult<Severity> {
        self.log_level.parse().map_err(ModelError::Config)
    }

    pub fn validate(&self) -> ModelResult<()> {
        self.severity().map(|_| ())
    }

    /// Push `log_level` into the process-wide logger
    pub fn apply_logging(&self) -> ModelResult<()> {
        Logger::set_min_severity(self.severity()?);
        Ok(())
    }

    pub fn from_json_str(json: &str) -> ModelResult<Self> {
        let config: Self =
            serde_json::from_str(json).map_err(|e| ModelError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_store_config() {
        let config = StoreConfig::default();
        assert_eq!(config.key_field, "id");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_store_config_rejects_dotted_key() {
        assert!(StoreConfig::with_key_field("a.b").validate().is_err());
        assert!(StoreConfig::from_json_str(r#"{"key_field": ""}"#).is_err());
    }

    #[test]
    fn test_engine_config_from_partial_json() {
        let config = EngineConfig::from_json_str(r#"{"parallel_fan_out": true}"#).unwrap();
        assert!(config.parallel_fan_out);
        assert_eq!(config.log_level, "warn");
        assert_eq!(config.severity().unwrap(), Severity::Warn);
    }

    #[test]
    fn test_engine_config_rejects_unknown_level() {
        assert!(EngineConfig::from_json_str(r#"{"log_level": "chatty"}"#).is_err());
    }
}
