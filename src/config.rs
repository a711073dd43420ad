//! Application and engine configuration
//!
//! Defaults are overridden, in order, by an optional JSON file, by
//! `EASYML_*` environment variables and finally by command-line flags.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{EasyMlError, Result};
use crate::training::DEFAULT_TEST_SIZE;

/// Settings that influence training results
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Fraction of rows held out for the reported accuracy
    pub test_size: f64,
    /// Folds used by cross-validated searches
    pub cv_folds: usize,
    /// Seed for splits and estimators; `None` draws from the OS
    pub random_state: Option<u64>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            test_size: DEFAULT_TEST_SIZE,
            cv_folds: 5,
            random_state: None,
        }
    }
}

impl EngineConfig {
    pub fn with_test_size(mut self, test_size: f64) -> Self {
        self.test_size = test_size;
        self
    }

    pub fn with_cv_folds(mut self, cv_folds: usize) -> Self {
        self.cv_folds = cv_folds;
        self
    }

    pub fn with_random_state(mut self, seed: Option<u64>) -> Self {
        self.random_state = seed;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if !(self.test_size > 0.0 && self.test_size < 1.0) {
            return Err(EasyMlError::ConfigError(format!(
                "test_size must be strictly between 0 and 1, got {}",
                self.test_size
            )));
        }
        if self.cv_folds < 2 {
            return Err(EasyMlError::ConfigError(format!(
                "cv_folds must be at least 2, got {}",
                self.cv_folds
            )));
        }
        Ok(())
    }
}

/// Top-level configuration of a workspace
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Directory holding the record store; `None` keeps everything in memory
    pub workspace_dir: Option<PathBuf>,
    /// User on whose behalf requests are made
    pub owner: String,
    /// Largest accepted upload
    pub max_upload_bytes: u64,
    pub engine: EngineConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            workspace_dir: None,
            owner: "default".to_string(),
            max_upload_bytes: 2_621_440, // 2.5 MiB
            engine: EngineConfig::default(),
        }
    }
}

impl AppConfig {
    /// Read a JSON config file; missing fields keep their defaults
    pub fn from_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        serde_json::from_str(&text)
            .map_err(|e| EasyMlError::ConfigError(format!("{}: {}", path.display(), e)))
    }

    /// Apply `EASYML_WORKSPACE`, `EASYML_OWNER`, `EASYML_SEED` and `EASYML_TEST_SIZE`
    pub fn with_env_overrides(self) -> Result<Self> {
        self.with_overrides_from(|key| std::env::var(key).ok())
    }

    fn with_overrides_from<F>(mut self, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(dir) = lookup("EASYML_WORKSPACE") {
            self.workspace_dir = Some(PathBuf::from(dir));
        }
        if let Some(owner) = lookup("EASYML_OWNER") {
            self.owner = owner;
        }
        if let Some(seed) = lookup("EASYML_SEED") {
            let seed = seed
                .trim()
                .parse()
                .map_err(|_| EasyMlError::ConfigError(format!("EASYML_SEED is not a u64: {}", seed)))?;
            self.engine.random_state = Some(seed);
        }
        if let Some(size) = lookup("EASYML_TEST_SIZE") {
            self.engine.test_size = size.trim().parse().map_err(|_| {
                EasyMlError::ConfigError(format!("EASYML_TEST_SIZE is not a number: {}", size))
            })?;
        }
        Ok(self)
    }

    pub fn with_workspace_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.workspace_dir = Some(dir.into());
        self
    }

    pub fn with_owner(mut self, owner: impl Into<String>) -> Self {
        self.owner = owner.into();
        self
    }

    pub fn with_max_upload_bytes(mut self, bytes: u64) -> Self {
        self.max_upload_bytes = bytes;
        self
    }

    pub fn with_engine(mut self, engine: EngineConfig) -> Self {
        self.engine = engine;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.owner.trim().is_empty() {
            return Err(EasyMlError::ConfigError("owner must not be empty".to_string()));
        }
        self.engine.validate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_defaults() {
        let config = AppConfig::default();
        assert_eq!(config.engine.test_size, 0.25);
        assert_eq!(config.engine.cv_folds, 5);
        assert_eq!(config.max_upload_bytes, 2_621_440);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_overrides() {
        let vars: HashMap<&str, &str> = [
            ("EASYML_OWNER", "alice"),
            ("EASYML_SEED", "17"),
            ("EASYML_TEST_SIZE", "0.3"),
        ]
        .into_iter()
        .collect();

        let config = AppConfig::default()
            .with_overrides_from(|key| vars.get(key).map(|v| v.to_string()))
            .unwrap();
        assert_eq!(config.owner, "alice");
        assert_eq!(config.engine.random_state, Some(17));
        assert_eq!(config.engine.test_size, 0.3);
        assert_eq!(config.workspace_dir, None);
    }

    #[test]
    fn test_bad_override_is_reported() {
        let result = AppConfig::default().with_overrides_from(|key| {
            (key == "EASYML_SEED").then(|| "soon".to_string())
        });
        assert!(matches!(result, Err(EasyMlError::ConfigError(_))));
    }

    #[test]
    fn test_partial_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("easyml.json");
        std::fs::write(&path, r#"{"owner": "bob", "engine": {"cv_folds": 3}}"#).unwrap();

        let config = AppConfig::from_file(&path).unwrap();
        assert_eq!(config.owner, "bob");
        assert_eq!(config.engine.cv_folds, 3);
        assert_eq!(config.engine.test_size, 0.25);
    }

    #[test]
    fn test_invalid_engine() {
        assert!(EngineConfig::default().with_test_size(1.0).validate().is_err());
        assert!(EngineConfig::default().with_cv_folds(1).validate().is_err());
    }
}
