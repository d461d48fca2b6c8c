//! Application Configuration
//!
//! Service credentials, recognition defaults and pipeline tuning, stored in
//! TOML format.

use anyhow::{Context, Result};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tracing::{debug, warn};

use crate::vision::Mode;

/// Environment variable that overrides the stored API key
pub const API_KEY_ENV: &str = "VENDOR_OCR_API_KEY";

/// File name inside the platform config directory
pub const CONFIG_FILE_NAME: &str = "config.toml";

/// How long a loaded settings snapshot stays fresh
pub const SETTINGS_REFRESH: Duration = Duration::from_secs(30);

/// Application settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Vision service settings
    pub api: ApiConfig,
    /// Recognition defaults
    pub ocr: OcrConfig,
    /// Scheduling, caching and image budget settings
    pub pipeline: PipelineConfig,
}

/// Vision service settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    /// API key, sent as a query parameter
    pub api_key: Option<String>,
    /// Base URL; the model name and `:generateContent` are appended
    pub endpoint: String,
    /// Hard timeout per attempt in seconds
    pub timeout_secs: u64,
    /// Retries after the first attempt for retryable failures
    pub max_retries: u32,
    /// Base backoff in milliseconds, multiplied by 1.5 per attempt
    pub backoff_ms: u64,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            endpoint: "https://generativelanguage.googleapis.com/v1beta/models".to_string(),
            timeout_secs: 15,
            max_retries: 1,
            backoff_ms: 1000,
        }
    }
}

impl ApiConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn backoff(&self) -> Duration {
        Duration::from_millis(self.backoff_ms)
    }
}

/// Recognition defaults used when a request leaves them unset
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OcrConfig {
    pub language: String,
    pub mode: Mode,
    pub model: String,
}

impl Default for OcrConfig {
    fn default() -> Self {
        Self {
            language: "ja".to_string(),
            mode: Mode::Accurate,
            model: "gemini-2.0-flash".to_string(),
        }
    }
}

/// Scheduling, caching and image budget settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Minimum gap between the end of one request and the start of the next
    pub min_interval_ms: u64,
    /// Extra delay before the next queued request is picked up
    pub settle_delay_ms: u64,
    /// Maximum number of cached results
    pub cache_capacity: usize,
    /// Longest image side after preprocessing
    pub max_dimension: u32,
    /// Estimated size above which an image must be compressed
    pub size_ceiling_bytes: usize,
    /// Size the compressor aims for
    pub compression_target_bytes: usize,
    /// Age after which an in-progress flag is considered released
    pub processing_release_secs: u64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            min_interval_ms: 500,
            settle_delay_ms: 50,
            cache_capacity: 30,
            max_dimension: 1600,
            size_ceiling_bytes: 15 * 1024 * 1024,
            compression_target_bytes: 10 * 1024 * 1024,
            processing_release_secs: 10,
        }
    }
}

impl PipelineConfig {
    pub fn min_interval(&self) -> Duration {
        Duration::from_millis(self.min_interval_ms)
    }

    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_delay_ms)
    }

    pub fn processing_release(&self) -> Duration {
        Duration::from_secs(self.processing_release_secs)
    }
}

/// Load configuration from file
pub fn load_config(path: &Path) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file {}", path.display()))?;
    let config: AppConfig = toml::from_str(&content)
        .with_context(|| format!("Failed to parse config file {}", path.display()))?;
    Ok(config)
}

/// Save configuration to file
pub fn save_config(config: &AppConfig, path: &Path) -> Result<()> {
    let content = toml::to_string_pretty(config)?;
    std::fs::write(path, content)
        .with_context(|| format!("Failed to write config file {}", path.display()))?;
    Ok(())
}

/// `config.toml` in the platform config directory
pub fn default_config_path() -> Result<PathBuf> {
    Ok(crate::storage::get_config_dir()?.join(CONFIG_FILE_NAME))
}

/// Snapshot of the user-facing settings consumed by the pipeline
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    pub api_key: Option<String>,
    pub language: String,
    pub mode: Mode,
    pub model: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self::from(&AppConfig::default())
    }
}

impl From<&AppConfig> for Settings {
    fn from(config: &AppConfig) -> Self {
        Self {
            api_key: config
                .api
                .api_key
                .as_deref()
                .map(str::trim)
                .filter(|key| !key.is_empty())
                .map(str::to_string),
            language: config.ocr.language.clone(),
            mode: config.ocr.mode,
            model: config.ocr.model.clone(),
        }
    }
}

impl Settings {
    /// Replace the API key when an override is present and non-blank
    pub fn with_key_override(mut self, key: Option<String>) -> Self {
        if let Some(key) = key.map(|k| k.trim().to_string()).filter(|k| !k.is_empty()) {
            self.api_key = Some(key);
        }
        self
    }
}

/// Read-only source of settings snapshots
pub trait SettingsProvider: Send + Sync {
    /// Current settings; staleness policy is up to the provider
    fn load_settings(&self) -> Settings;
}

/// Fixed settings, for embedding and tests
#[derive(Debug, Clone, Default)]
pub struct StaticSettings(pub Settings);

impl SettingsProvider for StaticSettings {
    fn load_settings(&self) -> Settings {
        self.0.clone()
    }
}

/// Settings read from a TOML file, re-read at most once per refresh window
pub struct FileSettingsProvider {
    path: PathBuf,
    refresh: Duration,
    cached: RwLock<Option<(Instant, Settings)>>,
}

impl FileSettingsProvider {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self::with_refresh(path, SETTINGS_REFRESH)
    }

    pub fn with_refresh(path: impl Into<PathBuf>, refresh: Duration) -> Self {
        Self {
            path: path.into(),
            refresh,
            cached: RwLock::new(None),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Drop the cached snapshot so the next load reads the file
    pub fn invalidate(&self) {
        *self.cached.write() = None;
    }

    fn read_file(&self) -> Settings {
        match load_config(&self.path) {
            Ok(config) => Settings::from(&config),
            Err(e) => {
                warn!("Using default settings: {:#}", e);
                Settings::default()
            }
        }
    }
}

impl SettingsProvider for FileSettingsProvider {
    fn load_settings(&self) -> Settings {
        if let Some((loaded_at, settings)) = self.cached.read().as_ref() {
            if loaded_at.elapsed() < self.refresh {
                return settings.clone();
            }
        }

        debug!("Reloading settings from {}", self.path.display());
        let settings = self
            .read_file()
            .with_key_override(std::env::var(API_KEY_ENV).ok());

        *self.cached.write() = Some((Instant::now(), settings.clone()));
        settings
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_default_app_config() {
        let config = AppConfig::default();

        // Check api defaults
        assert!(config.api.api_key.is_none());
        assert!(config.api.endpoint.starts_with("https://"));
        assert_eq!(config.api.timeout(), Duration::from_secs(15));
        assert_eq!(config.api.max_retries, 1);
        assert_eq!(config.api.backoff(), Duration::from_millis(1000));

        // Check ocr defaults
        assert_eq!(config.ocr.language, "ja");
        assert_eq!(config.ocr.mode, Mode::Accurate);
        assert_eq!(config.ocr.model, "gemini-2.0-flash");

        // Check pipeline defaults
        assert_eq!(config.pipeline.min_interval(), Duration::from_millis(500));
        assert_eq!(config.pipeline.settle_delay(), Duration::from_millis(50));
        assert_eq!(config.pipeline.cache_capacity, 30);
        assert_eq!(config.pipeline.max_dimension, 1600);
        assert_eq!(config.pipeline.size_ceiling_bytes, 15 * 1024 * 1024);
        assert_eq!(config.pipeline.compression_target_bytes, 10 * 1024 * 1024);
        assert_eq!(config.pipeline.processing_release(), Duration::from_secs(10));
    }

    #[test]
    fn test_config_serialization_roundtrip() {
        let mut config = AppConfig::default();
        config.api.api_key = Some("secret".to_string());
        config.ocr.mode = Mode::Fast;

        let toml_str = toml::to_string_pretty(&config).unwrap();
        let parsed: AppConfig = toml::from_str(&toml_str).unwrap();

        assert_eq!(parsed.api.api_key.as_deref(), Some("secret"));
        assert_eq!(parsed.ocr.mode, Mode::Fast);
        assert_eq!(parsed.pipeline.cache_capacity, config.pipeline.cache_capacity);
    }

    #[test]
    fn test_partial_config_uses_defaults() {
        let parsed: AppConfig = toml::from_str("[ocr]\nmode = \"fast\"\n").unwrap();
        assert_eq!(parsed.ocr.mode, Mode::Fast);
        assert_eq!(parsed.ocr.language, "ja");
        assert_eq!(parsed.api.timeout_secs, 15);
        assert_eq!(parsed.pipeline.max_dimension, 1600);
    }

    #[test]
    fn test_save_and_load_config() {
        let mut config = AppConfig::default();
        config.ocr.model = "gemini-2.5-flash".to_string();

        let temp_file = NamedTempFile::new().unwrap();
        save_config(&config, temp_file.path()).unwrap();
        let loaded = load_config(temp_file.path()).unwrap();

        assert_eq!(loaded.ocr.model, "gemini-2.5-flash");
        assert_eq!(loaded.api.max_retries, config.api.max_retries);
    }

    #[test]
    fn test_load_config_file_not_found() {
        let result = load_config(Path::new("/nonexistent/path/config.toml"));
        assert!(result.is_err());
    }

    #[test]
    fn test_load_config_invalid_toml() {
        let mut temp_file = NamedTempFile::new().unwrap();
        writeln!(temp_file, "this is not valid toml {{{{").unwrap();

        let result = load_config(temp_file.path());
        assert!(result.is_err());
    }

    #[test]
    fn test_settings_from_config() {
        let mut config = AppConfig::default();
        config.api.api_key = Some("   ".to_string());
        assert_eq!(Settings::from(&config).api_key, None);

        config.api.api_key = Some(" abc ".to_string());
        let settings = Settings::from(&config);
        assert_eq!(settings.api_key.as_deref(), Some("abc"));
        assert_eq!(settings.language, "ja");
    }

    #[test]
    fn test_key_override() {
        let settings = Settings::default();
        assert_eq!(settings.clone().with_key_override(None).api_key, None);
        assert_eq!(settings.clone().with_key_override(Some("".into())).api_key, None);
        assert_eq!(
            settings.with_key_override(Some("env-key".into())).api_key.as_deref(),
            Some("env-key")
        );
    }

    #[test]
    fn test_file_provider_missing_file_falls_back() {
        let provider = FileSettingsProvider::new("/nonexistent/path/config.toml");
        let settings = provider.load_settings();
        assert_eq!(settings.language, "ja");
        assert_eq!(settings.mode, Mode::Accurate);
        assert_eq!(settings.model, "gemini-2.0-flash");
    }

    #[test]
    fn test_file_provider_refresh_window() {
        let temp_file = NamedTempFile::new().unwrap();
        let mut config = AppConfig::default();
        config.ocr.language = "en".to_string();
        save_config(&config, temp_file.path()).unwrap();

        let provider = FileSettingsProvider::new(temp_file.path());
        assert_eq!(provider.load_settings().language, "en");

        // Changes inside the window are not picked up
        config.ocr.language = "zh".to_string();
        save_config(&config, temp_file.path()).unwrap();
        assert_eq!(provider.load_settings().language, "en");

        provider.invalidate();
        assert_eq!(provider.load_settings().language, "zh");
    }

    #[test]
    fn test_file_provider_zero_window_always_reads() {
        let temp_file = NamedTempFile::new().unwrap();
        let mut config = AppConfig::default();
        save_config(&config, temp_file.path()).unwrap();

        let provider = FileSettingsProvider::with_refresh(temp_file.path(), Duration::ZERO);
        assert_eq!(provider.load_settings().mode, Mode::Accurate);

        config.ocr.mode = Mode::Fast;
        save_config(&config, temp_file.path()).unwrap();
        assert_eq!(provider.load_settings().mode, Mode::Fast);
    }
}
