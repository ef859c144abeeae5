//! Storage layer for the engine configuration (JSON file in the data dir)

use crate::error::EngineError;
use mediadl_types::EngineConfig;
use serde_json::Value;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::debug;

const CONFIG_FILE: &str = "config.json";

/// Storage manager for MediaDL settings
#[derive(Clone, Debug)]
pub struct ConfigStore {
    /// Data directory
    data_dir: PathBuf,
}

impl ConfigStore {
    /// Create a new storage instance
    pub async fn new(data_dir: PathBuf) -> Result<Self, EngineError> {
        fs::create_dir_all(&data_dir).await?;
        Ok(Self { data_dir })
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    pub fn path(&self) -> PathBuf {
        self.data_dir.join(CONFIG_FILE)
    }

    /// Load the config; a missing file yields the defaults
    pub async fn load(&self) -> Result<EngineConfig, EngineError> {
        let path = self.path();
        if !path.exists() {
            debug!("No config at {}, using defaults", path.display());
            return Ok(EngineConfig::default());
        }

        let content = fs::read_to_string(&path).await?;
        let config: EngineConfig = serde_json::from_str(&content)
            .map_err(|e| EngineError::Serialization(e.to_string()))?;
        config.validate().map_err(EngineError::InvalidConfig)?;

        Ok(config)
    }

    /// Save the config
    pub async fn save(&self, config: &EngineConfig) -> Result<(), EngineError> {
        config.validate().map_err(EngineError::InvalidConfig)?;

        let content = serde_json::to_string_pretty(config)
            .map_err(|e| EngineError::Serialization(e.to_string()))?;
        fs::write(self.path(), content).await?;

        Ok(())
    }

    /// Overwrite the stored config with the defaults
    pub async fn reset(&self) -> Result<EngineConfig, EngineError> {
        let config = EngineConfig::default();
        self.save(&config).await?;
        Ok(config)
    }
}

/// Read a single setting by its field name
pub fn get_setting(config: &EngineConfig, key: &str) -> Result<Value, EngineError> {
    let value = serde_json::to_value(config).map_err(|e| EngineError::Serialization(e.to_string()))?;
    value
        .get(key)
        .cloned()
        .ok_or_else(|| EngineError::InvalidConfig(format!("unknown key: {}", key)))
}

/// Return a copy of `config` with one field replaced.
///
/// `raw` is parsed as JSON first and falls back to a plain string, so both
/// `250` and `KB/s` work from a command line.
pub fn apply_setting(config: &EngineConfig, key: &str, raw: &str) -> Result<EngineConfig, EngineError> {
    let mut value =
        serde_json::to_value(config).map_err(|e| EngineError::Serialization(e.to_string()))?;

    let fields = value
        .as_object_mut()
        .ok_or_else(|| EngineError::Serialization("config is not an object".to_string()))?;
    if !fields.contains_key(key) {
        return Err(EngineError::InvalidConfig(format!("unknown key: {}", key)));
    }

    let parsed = serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()));
    fields.insert(key.to_string(), parsed);

    let updated: EngineConfig = serde_json::from_value(value)
        .map_err(|e| EngineError::InvalidConfig(format!("{}: {}", key, e)))?;
    updated.validate().map_err(EngineError::InvalidConfig)?;

    Ok(updated)
}
