use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{BookrecError, Result};
use crate::features::VectorizerPreset;
use crate::similarity::{HybridWeights, SimilarityMode};

/// Root application configuration, loaded from `~/.config/bookrec/config.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub data: DataConfig,
    pub collect: CollectConfig,
    pub features: FeatureConfig,
    pub similarity: SimilarityConfig,
    pub clustering: ClusteringConfig,
    pub ui: UiConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DataConfig {
    pub data_dir: String,
    pub raw_file: String,
    pub dataset_file: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CollectConfig {
    /// Paginated list page; `?page=N` is appended.
    pub list_url: String,
    pub pages: u32,
    /// Fetch every book page for genres and first-publication year.
    pub fetch_details: bool,
    pub delay_ms: u64,
    pub timeout_secs: u64,
    pub max_retries: u32,
    pub user_agent: String,
    pub openlibrary: bool,
    pub google_books: bool,
    pub google_api_key_env: String,
    pub cache_ttl_hours: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FeatureConfig {
    pub preset: VectorizerPreset,
    pub analysis_max_features: usize,
    pub interactive_max_features: usize,
    pub genre_vocabulary_size: usize,
    /// Scale applied to the one-hot genre block in the combined feature space.
    pub genre_weight: f32,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SimilarityConfig {
    pub weights: HybridWeights,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClusteringConfig {
    pub k: usize,
    pub max_iterations: usize,
    pub tolerance: f64,
    pub seed: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct UiConfig {
    pub default_mode: SimilarityMode,
    pub default_limit: usize,
    pub max_limit: usize,
}

// ─── Defaults ──────────────────────────────────────────────

impl Default for DataConfig {
    fn default() -> Self {
        let data_dir = dirs::data_dir()
            .unwrap_or_else(|| PathBuf::from("~/.local/share"))
            .join("bookrec");

        Self {
            data_dir: data_dir.to_string_lossy().to_string(),
            raw_file: "raw.json".to_string(),
            dataset_file: "books.db".to_string(),
        }
    }
}

impl Default for CollectConfig {
    fn default() -> Self {
        Self {
            list_url: "https://www.goodreads.com/list/show/1.Best_Books_Ever".to_string(),
            pages: 10,
            fetch_details: true,
            delay_ms: 1500,
            timeout_secs: 20,
            max_retries: 2,
            user_agent: "bookrec/0.1 (+student data project)".to_string(),
            openlibrary: true,
            google_books: true,
            google_api_key_env: "GOOGLE_BOOKS_API_KEY".to_string(),
            cache_ttl_hours: 7 * 24,
        }
    }
}

impl Default for FeatureConfig {
    fn default() -> Self {
        Self {
            preset: VectorizerPreset::Analysis,
            analysis_max_features: 5000,
            interactive_max_features: 1000,
            genre_vocabulary_size: 20,
            genre_weight: 1.0,
        }
    }
}

impl FeatureConfig {
    pub fn max_features(&self, preset: VectorizerPreset) -> usize {
        match preset {
            VectorizerPreset::Analysis => self.analysis_max_features,
            VectorizerPreset::Interactive => self.interactive_max_features,
        }
    }

    /// Same settings with a different vectorizer preset.
    pub fn with_preset(&self, preset: VectorizerPreset) -> Self {
        Self {
            preset,
            ..self.clone()
        }
    }
}

impl Default for ClusteringConfig {
    fn default() -> Self {
        Self {
            k: 6,
            max_iterations: 300,
            tolerance: 1e-4,
            seed: 42,
        }
    }
}

impl Default for UiConfig {
    fn default() -> Self {
        Self {
            default_mode: SimilarityMode::Hybrid,
            default_limit: 10,
            max_limit: 50,
        }
    }
}

// ─── Load / Save ───────────────────────────────────────────

impl AppConfig {
    /// Standard config file path: `~/.config/bookrec/config.toml`
    pub fn config_path() -> PathBuf {
        if let Ok(path) = std::env::var("BOOKREC_CONFIG") {
            return PathBuf::from(path);
        }

        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("~/.config"))
            .join("bookrec")
            .join("config.toml")
    }

    /// Load config from disk, falling back to defaults if file doesn't exist.
    pub fn load() -> Result<Self> {
        let mut config = Self::load_from(&Self::config_path())?;
        if let Ok(dir) = std::env::var("BOOKREC_DATA_DIR") {
            config.data.data_dir = dir;
        }
        Ok(config)
    }

    /// Load config from a specific path.
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let contents = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Save config to a specific path.
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let toml_str = toml::to_string_pretty(self)?;
        std::fs::write(path, toml_str)?;
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.clustering.k == 0 {
            return Err(BookrecError::ConfigError(
                "clustering.k must be at least 1".to_string(),
            ));
        }
        if self.features.genre_vocabulary_size == 0 {
            return Err(BookrecError::ConfigError(
                "features.genre_vocabulary_size must be at least 1".to_string(),
            ));
        }
        if self.similarity.weights.total() <= 0.0 {
            return Err(BookrecError::ConfigError(
                "similarity.weights must not all be zero".to_string(),
            ));
        }
        Ok(())
    }

    // ─── Derived paths ─────────────────────────────────────

    pub fn data_dir(&self) -> PathBuf {
        PathBuf::from(&self.data.data_dir)
    }

    /// Path to the collected raw records.
    pub fn raw_path(&self) -> PathBuf {
        self.data_dir().join(&self.data.raw_file)
    }

    /// Path to the persisted dataset.
    pub fn dataset_path(&self) -> PathBuf {
        self.data_dir().join(&self.data.dataset_file)
    }

    /// Directory for cached API responses.
    pub fn cache_dir(&self) -> PathBuf {
        self.data_dir().join("cache")
    }

    pub fn log_path(&self) -> PathBuf {
        self.data_dir().join("bookrec.log")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_default_config_is_valid() {
        let cfg = AppConfig::default();
        assert!(cfg.validate().is_ok());
        assert_eq!(cfg.clustering.k, 6);
        assert_eq!(cfg.features.genre_vocabulary_size, 20);
        assert!(!cfg.data.data_dir.is_empty());
    }

    #[test]
    fn test_config_toml_roundtrip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");

        let mut cfg = AppConfig::default();
        cfg.clustering.k = 8;
        cfg.features.preset = VectorizerPreset::Interactive;
        cfg.save_to(&path).unwrap();

        let loaded = AppConfig::load_from(&path).unwrap();
        assert_eq!(loaded.clustering.k, 8);
        assert_eq!(loaded.features.preset, VectorizerPreset::Interactive);
        assert_eq!(loaded.collect.pages, cfg.collect.pages);
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[clustering]\nk = 4\n").unwrap();

        let loaded = AppConfig::load_from(&path).unwrap();
        assert_eq!(loaded.clustering.k, 4);
        assert_eq!(loaded.clustering.seed, 42);
        assert_eq!(loaded.features.analysis_max_features, 5000);
    }

    #[test]
    fn test_zero_k_is_rejected() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[clustering]\nk = 0\n").unwrap();

        assert!(matches!(
            AppConfig::load_from(&path),
            Err(BookrecError::ConfigError(_))
        ));
    }

    #[test]
    fn test_load_nonexistent_returns_default() {
        let cfg = AppConfig::load_from(Path::new("/tmp/nonexistent_bookrec_config.toml")).unwrap();
        assert_eq!(cfg.ui.default_limit, 10);
    }

    #[test]
    fn test_derived_paths() {
        let cfg = AppConfig::default();
        assert!(cfg.dataset_path().to_string_lossy().ends_with("books.db"));
        assert!(cfg.raw_path().to_string_lossy().ends_with("raw.json"));
    }
}
