//! # Config Module
//!
//! Runtime configuration for the matcher binary.
//!
//! Values come from three layers, later ones winning:
//! 1. Built-in defaults (threshold 0.7, top 5, paths under the user data dir)
//! 2. An optional JSON file
//! 3. Command-line flags

use crate::core::matching::MatchConfig;
use crate::error::{AnimalMatcherError, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Directory name used under the platform data dir
pub const APP_DIR_NAME: &str = "animal-matcher";

/// Matcher configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MatcherConfig {
    /// Similarity threshold and result count
    pub matching: MatchConfig,
    /// Registry database file
    pub db_path: Option<PathBuf>,
    /// Directory registered photos are copied into
    pub media_dir: Option<PathBuf>,
}

impl MatcherConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load configuration from a JSON file
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|e| AnimalMatcherError::Io {
            path: path.to_path_buf(),
            source: e,
        })?;

        let config: MatcherConfig = serde_json::from_str(&content).map_err(|e| {
            AnimalMatcherError::Config(format!(
                "Failed to parse config file '{}': {}",
                path.display(),
                e
            ))
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Save configuration as pretty-printed JSON
    pub fn save_to_json_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        let content = serde_json::to_string_pretty(self)
            .map_err(|e| AnimalMatcherError::Config(format!("Failed to serialize config: {}", e)))?;

        fs::write(path, content).map_err(|e| AnimalMatcherError::Io {
            path: path.to_path_buf(),
            source: e,
        })
    }

    /// Set the similarity threshold
    pub fn similarity_threshold(mut self, threshold: f32) -> Self {
        self.matching.similarity_threshold = threshold;
        self
    }

    /// Set the maximum number of matches
    pub fn top_k(mut self, top_k: usize) -> Self {
        self.matching.top_k = top_k;
        self
    }

    /// Set the registry database file
    pub fn db_path(mut self, path: PathBuf) -> Self {
        self.db_path = Some(path);
        self
    }

    /// Set the media directory
    pub fn media_dir(mut self, path: PathBuf) -> Self {
        self.media_dir = Some(path);
        self
    }

    pub fn validate(&self) -> Result<()> {
        self.matching.validate()
    }

    /// Registry database file, falling back to the platform data dir
    pub fn resolved_db_path(&self) -> PathBuf {
        self.db_path.clone().unwrap_or_else(|| {
            dirs::data_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join(APP_DIR_NAME)
                .join("registry.db")
        })
    }

    /// Media directory, falling back to `media/` next to the database
    pub fn resolved_media_dir(&self) -> PathBuf {
        self.media_dir.clone().unwrap_or_else(|| {
            let db_path = self.resolved_db_path();
            db_path
                .parent()
                .map(Path::to_path_buf)
                .unwrap_or_else(|| PathBuf::from("."))
                .join("media")
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn builder_overrides_defaults() {
        let config = MatcherConfig::new()
            .similarity_threshold(0.85)
            .top_k(3)
            .db_path(PathBuf::from("/tmp/r.db"));

        assert_eq!(config.matching.similarity_threshold, 0.85);
        assert_eq!(config.matching.top_k, 3);
        assert_eq!(config.resolved_db_path(), PathBuf::from("/tmp/r.db"));
        assert_eq!(config.resolved_media_dir(), PathBuf::from("/tmp/media"));
    }

    #[test]
    fn partial_file_keeps_defaults() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("config.json");
        fs::write(&path, r#"{"matching": {"top_k": 2}}"#).unwrap();

        let config = MatcherConfig::from_json_file(&path).unwrap();

        assert_eq!(config.matching.top_k, 2);
        assert_eq!(config.matching.similarity_threshold, 0.7);
        assert!(config.db_path.is_none());
    }

    #[test]
    fn saved_file_loads_back() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("config.json");
        let config = MatcherConfig::new()
            .top_k(9)
            .media_dir(temp_dir.path().join("photos"));

        config.save_to_json_file(&path).unwrap();
        let loaded = MatcherConfig::from_json_file(&path).unwrap();

        assert_eq!(loaded, config);
    }

    #[test]
    fn invalid_threshold_in_file_is_rejected() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("config.json");
        fs::write(&path, r#"{"matching": {"similarity_threshold": 3.0}}"#).unwrap();

        let result = MatcherConfig::from_json_file(&path);

        assert!(matches!(result, Err(AnimalMatcherError::Config(_))));
    }

    #[test]
    fn malformed_file_is_config_error() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("config.json");
        fs::write(&path, "not json").unwrap();

        assert!(matches!(
            MatcherConfig::from_json_file(&path),
            Err(AnimalMatcherError::Config(_))
        ));
    }
}
