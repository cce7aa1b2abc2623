use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};

use crate::layout::LayoutConfig;

const APP_NAME: &str = "taskflow";
const CONFIG_FILE: &str = "config.json";

pub const ENV_DATA_PATH: &str = "TASKFLOW_DB";
pub const ENV_BACKEND: &str = "TASKFLOW_BACKEND";

/// Which [`EntityStore`](crate::store::EntityStore) implementation to open.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum StoreBackend {
    /// SQLite database file
    #[default]
    Sqlite,
    /// JSON file holding every collection
    Json,
}

impl StoreBackend {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Sqlite => "sqlite",
            Self::Json => "json",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "sqlite" => Some(Self::Sqlite),
            "json" => Some(Self::Json),
            _ => None,
        }
    }

    fn default_file_name(&self) -> &'static str {
        match self {
            Self::Sqlite => "taskflow.db",
            Self::Json => "taskflow.json",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub backend: StoreBackend,
    /// Explicit store location. Defaults to a file in the platform data directory.
    pub data_path: Option<PathBuf>,
    pub layout: LayoutConfig,
}

impl Config {
    /// Load configuration from the user's config directory, then apply
    /// environment overrides.
    /// Falls back to defaults if the file is missing or fails to parse.
    pub fn load() -> Self {
        let mut config = match Self::try_load() {
            Ok(config) => config,
            Err(e) => {
                tracing::warn!("Failed to load config, using defaults: {:#}", e);
                Self::default()
            }
        };
        config.apply_overrides(|key| std::env::var(key).ok());
        config
    }

    pub fn try_load() -> Result<Self> {
        let config_path = config_path()?;
        if !config_path.exists() {
            return Ok(Self::default());
        }
        Self::from_file(&config_path)
    }

    pub fn from_file(path: &std::path::Path) -> Result<Self> {
        let content = fs::read_to_string(path).context("Failed to read config file")?;
        let config = serde_json::from_str(&content).context("Failed to parse config file")?;
        Ok(config)
    }

    /// Save the current configuration to the user's config directory.
    pub fn save(&self) -> Result<PathBuf> {
        let config_path = config_path()?;
        self.save_to(&config_path)?;
        Ok(config_path)
    }

    pub fn save_to(&self, path: &std::path::Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).context("Failed to create config directory")?;
        }

        let content = serde_json::to_string_pretty(self).context("Failed to serialize config")?;
        fs::write(path, content).context("Failed to write config file")?;

        Ok(())
    }

    /// Apply `TASKFLOW_DB` and `TASKFLOW_BACKEND`, read through `lookup`.
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(path) = lookup(ENV_DATA_PATH).filter(|p| !p.is_empty()) {
            self.data_path = Some(PathBuf::from(path));
        }
        if let Some(value) = lookup(ENV_BACKEND) {
            match StoreBackend::from_str(&value) {
                Some(backend) => self.backend = backend,
                None => tracing::warn!("Ignoring unknown {} value {:?}", ENV_BACKEND, value),
            }
        }
    }

    /// Where the store lives: the explicit path, or the backend's default file.
    pub fn resolved_data_path(&self) -> Result<PathBuf> {
        if let Some(path) = &self.data_path {
            return Ok(path.clone());
        }
        let dirs = ProjectDirs::from("", "", APP_NAME)
            .ok_or_else(|| anyhow::anyhow!("Could not determine data directory"))?;
        Ok(dirs.data_dir().join(self.backend.default_file_name()))
    }
}

fn config_path() -> Result<PathBuf> {
    let dirs = ProjectDirs::from("", "", APP_NAME)
        .ok_or_else(|| anyhow::anyhow!("Could not determine config directory"))?;
    Ok(dirs.config_dir().join(CONFIG_FILE))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let config: Config = serde_json::from_str(r#"{"backend": "json"}"#).unwrap();
        assert_eq!(config.backend, StoreBackend::Json);
        assert_eq!(config.data_path, None);
        assert_eq!(config.layout, LayoutConfig::default());
    }

    #[test]
    fn test_layout_overrides_are_read() {
        let config: Config =
            serde_json::from_str(r#"{"layout": {"node_width": 120.0, "sweeps": 1}}"#).unwrap();
        assert_eq!(config.layout.node_width, 120.0);
        assert_eq!(config.layout.sweeps, 1);
        assert_eq!(config.layout.node_height, LayoutConfig::default().node_height);
    }

    #[test]
    fn test_env_overrides_file_values() {
        let mut config = Config::default();
        config.apply_overrides(env(&[(ENV_DATA_PATH, "/tmp/flow.json"), (ENV_BACKEND, "JSON")]));
        assert_eq!(config.backend, StoreBackend::Json);
        assert_eq!(config.data_path, Some(PathBuf::from("/tmp/flow.json")));
        assert_eq!(config.resolved_data_path().unwrap(), PathBuf::from("/tmp/flow.json"));
    }

    #[test]
    fn test_unknown_backend_is_ignored() {
        let mut config = Config::default();
        config.apply_overrides(env(&[(ENV_BACKEND, "postgres"), (ENV_DATA_PATH, "")]));
        assert_eq!(config.backend, StoreBackend::Sqlite);
        assert_eq!(config.data_path, None);
    }

    #[test]
    fn test_saved_config_reads_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.json");
        let config = Config {
            backend: StoreBackend::Json,
            data_path: Some(PathBuf::from("/srv/flows.json")),
            layout: LayoutConfig {
                sweeps: 9,
                ..LayoutConfig::default()
            },
        };

        config.save_to(&path).unwrap();
        assert_eq!(Config::from_file(&path).unwrap(), config);
    }

    #[test]
    fn test_from_file_reports_parse_errors() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, "{ nope").unwrap();
        assert!(Config::from_file(&path).is_err());
    }
}
