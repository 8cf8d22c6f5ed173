//! Engine configuration stored in `~/.pagepace/config.json`.

use std::fs;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::types::BuiltinTargets;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("home directory not found")]
    HomeDirNotFound,

    #[error("config file not found at {0}")]
    NotFound(PathBuf),

    #[error("failed to read config: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),
}

/// How the completion detector treats a goal it has never snapshotted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FirstObservationPolicy {
    /// A never-snapshotted goal reads as previous = 0, so a target already
    /// met at first observation fires once. Matches the shipped client
    /// behavior.
    #[default]
    TreatAsZero,
    /// Seed the first snapshot from the goal's current value; already-met
    /// goals stay silent until progress crosses the target again.
    SeedFromCurrent,
}

/// Engine configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EngineConfig {
    #[serde(default = "default_service_url")]
    pub service_url: String,
    /// Targets for the built-in aggregate goals; unset targets disable the
    /// corresponding kind.
    #[serde(default)]
    pub builtin_targets: BuiltinTargets,
    #[serde(default)]
    pub first_observation: FirstObservationPolicy,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            service_url: default_service_url(),
            builtin_targets: BuiltinTargets::default(),
            first_observation: FirstObservationPolicy::default(),
        }
    }
}

fn default_service_url() -> String {
    "https://api.pagepace.app/v1".to_string()
}

/// Canonical config file path (`~/.pagepace/config.json`).
pub fn config_path() -> Result<PathBuf, ConfigError> {
    let home = dirs::home_dir().ok_or(ConfigError::HomeDirNotFound)?;
    Ok(home.join(".pagepace").join("config.json"))
}

/// Load configuration from disk.
pub fn load_config() -> Result<EngineConfig, ConfigError> {
    let path = config_path()?;
    load_config_at(&path)
}

fn load_config_at(path: &PathBuf) -> Result<EngineConfig, ConfigError> {
    if !path.exists() {
        return Err(ConfigError::NotFound(path.clone()));
    }
    let content = fs::read_to_string(path)?;
    Ok(serde_json::from_str(&content)?)
}

/// Write configuration to disk, creating `~/.pagepace/` on first run.
pub fn save_config(config: &EngineConfig) -> Result<(), ConfigError> {
    let path = config_path()?;
    save_config_at(config, &path)
}

fn save_config_at(config: &EngineConfig, path: &PathBuf) -> Result<(), ConfigError> {
    if let Some(parent) = path.parent() {
        if !parent.exists() {
            fs::create_dir_all(parent)?;
        }
    }
    let content = serde_json::to_string_pretty(config)?;
    fs::write(path, content)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_from_empty_object() {
        let config: EngineConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config.service_url, default_service_url());
        assert_eq!(config.builtin_targets.daily_minutes, None);
        assert_eq!(config.first_observation, FirstObservationPolicy::TreatAsZero);
    }

    #[test]
    fn test_policy_wire_names() {
        let config: EngineConfig =
            serde_json::from_str(r#"{"firstObservation": "seed-from-current"}"#).unwrap();
        assert_eq!(config.first_observation, FirstObservationPolicy::SeedFromCurrent);
    }

    #[test]
    fn test_save_and_load_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");

        let config = EngineConfig {
            service_url: "http://localhost:8080".to_string(),
            builtin_targets: BuiltinTargets {
                daily_minutes: Some(30),
                weekly_books: Some(3),
                monthly_books: None,
            },
            first_observation: FirstObservationPolicy::SeedFromCurrent,
        };
        save_config_at(&config, &path).unwrap();

        let loaded = load_config_at(&path).unwrap();
        assert_eq!(loaded.service_url, "http://localhost:8080");
        assert_eq!(loaded.builtin_targets.weekly_books, Some(3));
        assert_eq!(loaded.first_observation, FirstObservationPolicy::SeedFromCurrent);
    }

    #[test]
    fn test_missing_file_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nope.json");
        assert!(matches!(
            load_config_at(&path),
            Err(ConfigError::NotFound(_))
        ));
    }
}
