use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::{IndexError, Result};

/// Top-level configuration for the semantic index.
///
/// Loaded from a TOML file by the host application. Every section falls back
/// to its defaults when absent, so an empty file is a valid configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IndexConfig {
    #[serde(default)]
    pub general: GeneralConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub ingest: IngestConfig,
    #[serde(default)]
    pub search: SearchConfig,
}

impl IndexConfig {
    /// Load configuration from a TOML file.
    ///
    /// Returns an error if the file cannot be read, parsed, or fails validation.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: IndexConfig = toml::from_str(&content)?;
        config.validate()?;
        info!("Configuration loaded from {}", path.display());
        Ok(config)
    }

    /// Load configuration from a TOML file, falling back to defaults if the
    /// file does not exist or cannot be parsed.
    pub fn load_or_default(path: &Path) -> Self {
        match Self::load(path) {
            Ok(config) => config,
            Err(e) => {
                warn!(
                    "Failed to load config from {}: {}. Using defaults.",
                    path.display(),
                    e
                );
                Self::default()
            }
        }
    }

    /// Save the current configuration to a TOML file.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        info!("Configuration saved to {}", path.display());
        Ok(())
    }

    /// Reject settings that would make the index unusable.
    pub fn validate(&self) -> Result<()> {
        if self.storage.capacity == 0 {
            return Err(IndexError::Config("storage.capacity must be > 0".into()));
        }
        if self.embedding.dimension == 0 {
            return Err(IndexError::Config("embedding.dimension must be > 0".into()));
        }
        if self.ingest.max_text_chars == 0 {
            return Err(IndexError::Config("ingest.max_text_chars must be > 0".into()));
        }
        if self.search.max_queries == 0 {
            return Err(IndexError::Config("search.max_queries must be > 0".into()));
        }
        if self.search.max_top_k == 0 {
            return Err(IndexError::Config("search.max_top_k must be > 0".into()));
        }
        Ok(())
    }
}

/// General settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Log level: trace, debug, info, warn, error.
    pub log_level: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
        }
    }
}

/// Which backing medium the record store lives on.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StorageMedium {
    /// SQLite database file at `StorageConfig::path`.
    #[default]
    Sqlite,
    /// Private in-memory SQLite database.
    Memory,
    /// No storage capability; every operation degrades to a no-op.
    Disabled,
}

/// Storage and capacity configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub medium: StorageMedium,
    /// Database file path. A leading `~` expands to the home directory.
    pub path: String,
    /// Maximum number of records kept; oldest-ingested are evicted first.
    pub capacity: usize,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            medium: StorageMedium::Sqlite,
            path: "~/.semindex/vectors.db".to_string(),
            capacity: 5000,
        }
    }
}

impl StorageConfig {
    /// In-memory storage with the given capacity.
    pub fn memory(capacity: usize) -> Self {
        Self {
            medium: StorageMedium::Memory,
            capacity,
            ..Self::default()
        }
    }

    /// File-backed storage at `path` with the given capacity.
    pub fn sqlite(path: impl Into<PathBuf>, capacity: usize) -> Self {
        Self {
            medium: StorageMedium::Sqlite,
            path: path.into().to_string_lossy().to_string(),
            capacity,
        }
    }

    /// Storage with no backing medium at all.
    pub fn disabled() -> Self {
        Self {
            medium: StorageMedium::Disabled,
            ..Self::default()
        }
    }

    /// The database path with `~` expanded.
    pub fn resolved_path(&self) -> PathBuf {
        expand_home(&self.path)
    }
}

/// Expand a leading `~` to the home directory.
fn expand_home(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/").or_else(|| path.strip_prefix("~\\")) {
        #[cfg(target_os = "windows")]
        let home = std::env::var("USERPROFILE").unwrap_or_else(|_| ".".to_string());
        #[cfg(not(target_os = "windows"))]
        let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
        PathBuf::from(home).join(rest)
    } else {
        PathBuf::from(path)
    }
}

/// Embedding model configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingConfig {
    /// Embedding model name.
    pub model: String,
    /// Vector dimension every stored record must have.
    pub dimension: usize,
    /// Directory holding `model.onnx` and `tokenizer.json`, if a local model is used.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model_dir: Option<String>,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            model: "all-MiniLM-L6-v2".to_string(),
            dimension: 384,
            model_dir: None,
        }
    }
}

impl EmbeddingConfig {
    /// Directory holding the model files.
    ///
    /// `model_dir` when set, otherwise `~/.semindex/models/<model>`.
    pub fn resolved_model_dir(&self) -> PathBuf {
        match &self.model_dir {
            Some(dir) => expand_home(dir),
            None => expand_home(&format!("~/.semindex/models/{}", self.model)),
        }
    }
}

/// Ingestion configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IngestConfig {
    /// Sanitized text is truncated to this many characters.
    pub max_text_chars: usize,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self { max_text_chars: 200 }
    }
}

/// Search configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    /// Query embeddings beyond this count are ignored.
    pub max_queries: usize,
    /// Upper clamp for `top_k`.
    pub max_top_k: usize,
    /// Number of results when the caller has no preference.
    pub default_top_k: usize,
    /// Score threshold when the caller has no preference.
    pub default_min_score: f64,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            max_queries: 5,
            max_top_k: 20,
            default_top_k: 5,
            default_min_score: 0.3,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn create_temp_config(content: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_default_config() {
        let config = IndexConfig::default();
        assert_eq!(config.general.log_level, "info");
        assert_eq!(config.storage.medium, StorageMedium::Sqlite);
        assert_eq!(config.storage.capacity, 5000);
        assert_eq!(config.embedding.dimension, 384);
        assert_eq!(config.ingest.max_text_chars, 200);
        assert_eq!(config.search.max_queries, 5);
        assert_eq!(config.search.max_top_k, 20);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_load_valid_config() {
        let content = r#"
[general]
log_level = "debug"

[storage]
medium = "memory"
capacity = 100

[embedding]
dimension = 8

[search]
max_top_k = 10
"#;
        let file = create_temp_config(content);
        let config = IndexConfig::load(file.path()).unwrap();
        assert_eq!(config.general.log_level, "debug");
        assert_eq!(config.storage.medium, StorageMedium::Memory);
        assert_eq!(config.storage.capacity, 100);
        assert_eq!(config.embedding.dimension, 8);
        assert_eq!(config.search.max_top_k, 10);
        // Unspecified fields keep their defaults.
        assert_eq!(config.search.max_queries, 5);
        assert_eq!(config.ingest.max_text_chars, 200);
    }

    #[test]
    fn test_load_disabled_medium() {
        let file = create_temp_config("[storage]\nmedium = \"disabled\"\n");
        let config = IndexConfig::load(file.path()).unwrap();
        assert_eq!(config.storage.medium, StorageMedium::Disabled);
    }

    #[test]
    fn test_load_rejects_zero_capacity() {
        let file = create_temp_config("[storage]\ncapacity = 0\n");
        let err = IndexConfig::load(file.path()).unwrap_err();
        assert!(matches!(err, IndexError::Config(_)));
    }

    #[test]
    fn test_load_rejects_unknown_medium() {
        let file = create_temp_config("[storage]\nmedium = \"floppy\"\n");
        assert!(IndexConfig::load(file.path()).is_err());
    }

    #[test]
    fn test_load_or_default_missing_file() {
        let config = IndexConfig::load_or_default(Path::new("/nonexistent/semindex.toml"));
        assert_eq!(config, IndexConfig::default());
    }

    #[test]
    fn test_save_and_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        let mut config = IndexConfig::default();
        config.storage = StorageConfig::memory(42);
        config.embedding.model_dir = Some("/models/minilm".to_string());
        config.save(&path).unwrap();

        let loaded = IndexConfig::load(&path).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_resolved_path_expands_home() {
        let storage = StorageConfig::default();
        let resolved = storage.resolved_path();
        assert!(!resolved.to_string_lossy().starts_with('~'));
        assert!(resolved.ends_with(".semindex/vectors.db"));
    }

    #[test]
    fn test_resolved_path_absolute_untouched() {
        let storage = StorageConfig::sqlite("/tmp/x/vectors.db", 10);
        assert_eq!(storage.resolved_path(), PathBuf::from("/tmp/x/vectors.db"));
    }

    #[test]
    fn test_model_dir_defaults_to_model_name() {
        let embedding = EmbeddingConfig::default();
        let dir = embedding.resolved_model_dir();
        assert!(dir.ends_with(".semindex/models/all-MiniLM-L6-v2"));
    }

    #[test]
    fn test_model_dir_explicit() {
        let embedding = EmbeddingConfig {
            model_dir: Some("/opt/models/minilm".to_string()),
            ..EmbeddingConfig::default()
        };
        assert_eq!(embedding.resolved_model_dir(), PathBuf::from("/opt/models/minilm"));
    }
}
