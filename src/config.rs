//! Storage configuration

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{Result, StorageError};

/// Settings shared by every storage built for one training run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Present rows in a deterministic shuffled order
    pub shuffle: bool,

    /// Seed for the shuffle; `None` draws from OS entropy
    pub random_state: Option<u64>,

    /// Keep a missing target absent (prediction only)
    pub allow_absent_target: bool,

    /// Default feature selectors of storages built from this config;
    /// `None` uses every column
    pub features: Option<Vec<String>>,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            shuffle: false,
            random_state: None,
            allow_absent_target: false,
            features: None,
        }
    }
}

impl StorageConfig {
    /// Create a new configuration with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder method to enable or disable shuffling
    pub fn with_shuffle(mut self, shuffle: bool) -> Self {
        self.shuffle = shuffle;
        self
    }

    /// Builder method to set the random seed
    pub fn with_random_state(mut self, seed: u64) -> Self {
        self.random_state = Some(seed);
        self
    }

    /// Builder method to allow storages without a target
    pub fn with_allow_absent_target(mut self, allow: bool) -> Self {
        self.allow_absent_target = allow;
        self
    }

    /// Builder method to set the feature selectors
    pub fn with_features<S: Into<String>>(mut self, features: impl IntoIterator<Item = S>) -> Self {
        self.features = Some(features.into_iter().map(Into::into).collect());
        self
    }

    /// Check the configuration for values no storage can honor
    pub fn validate(&self) -> Result<()> {
        if let Some(features) = &self.features {
            if features.is_empty() {
                return Err(StorageError::ConfigError(
                    "features must not be empty; use None for all columns".to_string(),
                ));
            }
            if let Some(blank) = features.iter().find(|f| f.trim().is_empty()) {
                return Err(StorageError::ConfigError(format!(
                    "blank feature selector: '{}'",
                    blank
                )));
            }
        }
        Ok(())
    }

    /// Parse from a JSON string
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Load from a JSON file
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_json_str(&contents)
    }

    /// Serialize to pretty-printed JSON
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Write to a JSON file
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        std::fs::write(path, self.to_json()?)?;
        Ok(())
    }
}
