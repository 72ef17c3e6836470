//! Loop configuration

use crate::error::ConfigError;
use crate::timer::DEFAULT_FEEDBACK_SECONDS;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Default wall-clock length of one timer tick in milliseconds
pub const DEFAULT_TICK_MILLIS: u64 = 1000;

/// Longest feedback window accepted (one hour)
pub const MAX_FEEDBACK_SECONDS: u32 = 3600;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoopConfig {
    /// Length of each feedback window in seconds
    pub feedback_seconds: u32,
    /// Wall-clock time per countdown step, used by blocking drivers
    pub tick_millis: u64,
}

impl Default for LoopConfig {
    fn default() -> Self {
        Self {
            feedback_seconds: DEFAULT_FEEDBACK_SECONDS,
            tick_millis: DEFAULT_TICK_MILLIS,
        }
    }
}

impl LoopConfig {
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let json = fs::read_to_string(path)?;
        Self::from_json(&json)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.feedback_seconds == 0 || self.feedback_seconds > MAX_FEEDBACK_SECONDS {
            return Err(ConfigError::Validation(format!(
                "feedback_seconds must be between 1 and {MAX_FEEDBACK_SECONDS}, got {}",
                self.feedback_seconds
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = LoopConfig::default();
        assert_eq!(config.feedback_seconds, 30);
        assert_eq!(config.tick_millis, 1000);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config = LoopConfig::from_json(r#"{"feedback_seconds": 45}"#).unwrap();
        assert_eq!(config.feedback_seconds, 45);
        assert_eq!(config.tick_millis, DEFAULT_TICK_MILLIS);
    }

    #[test]
    fn test_rejects_zero_duration() {
        assert!(matches!(
            LoopConfig::from_json(r#"{"feedback_seconds": 0}"#),
            Err(ConfigError::Validation(_))
        ));
        assert!(matches!(
            LoopConfig::from_json("not json"),
            Err(ConfigError::Json(_))
        ));
    }
}
