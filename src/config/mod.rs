//! Engine Configuration
//!
//! Read-only configuration supplied to the engine at startup. Loaded from
//! a JSON5 file when one exists, otherwise defaults apply.

use std::path::Path;

use serde::{Deserialize, Serialize};

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config file: {0}")]
    Parse(String),

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Engine configuration flags plus the command prefix, which is consulted
/// only at start time to reject choices that collide with it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Departed voters have their cast vote un-counted and their slot freed.
    #[serde(default = "default_true")]
    pub only_online_users_count: bool,

    /// Senders below the "registered" permission level cannot vote.
    #[serde(default)]
    pub only_registered_may_vote: bool,

    /// Reject choices that start with the command prefix.
    #[serde(default = "default_true")]
    pub forbid_prefixed_choices: bool,

    /// The command prefix used by the surrounding router.
    #[serde(default = "default_prefix")]
    pub command_prefix: String,
}

fn default_true() -> bool {
    true
}

fn default_prefix() -> String {
    "!".to_string()
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            only_online_users_count: true,
            only_registered_may_vote: false,
            forbid_prefixed_choices: true,
            command_prefix: default_prefix(),
        }
    }
}

impl EngineConfig {
    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.forbid_prefixed_choices && self.command_prefix.is_empty() {
            return Err(ConfigError::Invalid(
                "forbid_prefixed_choices requires a non-empty command_prefix".to_string(),
            ));
        }
        Ok(())
    }

    /// Load from a JSON5 file. A missing file yields defaults.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let raw = std::fs::read_to_string(path)?;
        let config: Self =
            json5::from_str(&raw).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = EngineConfig::default();
        assert!(config.only_online_users_count);
        assert!(!config.only_registered_may_vote);
        assert!(config.forbid_prefixed_choices);
        assert_eq!(config.command_prefix, "!");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_load_missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = EngineConfig::load(&dir.path().join("absent.json5")).unwrap();
        assert_eq!(config, EngineConfig::default());
    }

    #[test]
    fn test_load_json5_with_partial_fields() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("engine.json5");
        std::fs::write(
            &path,
            r#"{
                // votes are anonymous-ish; registered accounts only
                only_registered_may_vote: true,
                command_prefix: "%%",
            }"#,
        )
        .unwrap();

        let config = EngineConfig::load(&path).unwrap();
        assert!(config.only_registered_may_vote);
        assert_eq!(config.command_prefix, "%%");
        // Unstated fields keep their defaults.
        assert!(config.only_online_users_count);
    }

    #[test]
    fn test_load_rejects_empty_prefix_with_forbid_on() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("engine.json5");
        std::fs::write(&path, r#"{ command_prefix: "" }"#).unwrap();

        assert!(matches!(
            EngineConfig::load(&path),
            Err(ConfigError::Invalid(_))
        ));
    }

    #[test]
    fn test_load_rejects_malformed_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("engine.json5");
        std::fs::write(&path, "not json5 at all {{{").unwrap();

        assert!(matches!(
            EngineConfig::load(&path),
            Err(ConfigError::Parse(_))
        ));
    }
}
