//! # Configuration Management Module
//!
//! Questo modulo gestisce tutta la configurazione dell'applicazione.
//!
//! ## Responsabilità:
//! - Definisce la struct `Config` con i parametri del client e del servizio
//! - Definisce `Settings`, i due parametri di compressione con clamping
//! - Supporta caricamento/salvataggio configurazione da/verso file JSON
//! - Fornisce valori di default sensati per tutti i parametri
//!
//! ## Parametri di configurazione:
//! - `server_url`: Endpoint del servizio di compressione
//! - `lossy`: Livello lossy (0-300, default: 200)
//! - `colors`: Numero di colori della palette (2-256, default: 64)
//! - `timeout_secs`: Timeout della richiesta batch (default: 120)
//! - `output_path`: Directory dove scrivere i file ottimizzati (default: None = directory corrente)
//! - `expected_mime`: Tipo media accettato in ingresso (default: "image/gif")
//! - `json_output`: Output JSON strutturato (default: false)
//!
//! ## Clamping vs validazione:
//! - `lossy` e `colors` non producono mai errori: vengono riportati nel range
//! - `validate()` controlla solo URL, timeout e directory di output
//!
//! ## Esempio:
//! ```rust,ignore
//! let config = Config {
//!     lossy: 120,
//!     colors: 32,
//!     ..Default::default()
//! };
//! config.validate()?;
//! let settings = config.settings();
//! ```

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const LOSSY_MIN: i64 = 0;
pub const LOSSY_MAX: i64 = 300;
pub const COLORS_MIN: i64 = 2;
pub const COLORS_MAX: i64 = 256;

pub const DEFAULT_SERVER_URL: &str = "http://127.0.0.1:5000/api/optimize-gif";
pub const DEFAULT_MIME: &str = "image/gif";

/// Compression parameters sent with every batch.
///
/// Both values are clamped independently on every update, so a `Settings`
/// value is always in range. It is `Copy`: the dispatcher takes its own
/// snapshot and later edits never reach an in-flight batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Settings {
    lossy: u16,
    color_count: u16,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            lossy: 200,
            color_count: 64,
        }
    }
}

impl Settings {
    pub fn new(lossy: i64, color_count: i64) -> Self {
        let mut settings = Self::default();
        settings.set_lossy(lossy);
        settings.set_color_count(color_count);
        settings
    }

    pub fn lossy(&self) -> u16 {
        self.lossy
    }

    pub fn color_count(&self) -> u16 {
        self.color_count
    }

    pub fn set_lossy(&mut self, value: i64) {
        self.lossy = value.clamp(LOSSY_MIN, LOSSY_MAX) as u16;
    }

    pub fn set_color_count(&mut self, value: i64) {
        self.color_count = value.clamp(COLORS_MIN, COLORS_MAX) as u16;
    }
}

/// Configuration for the batch client
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Batch endpoint of the compression service
    pub server_url: String,
    /// Lossy level (0-300)
    pub lossy: i64,
    /// Palette size (2-256)
    pub colors: i64,
    /// Request timeout in seconds
    pub timeout_secs: u64,
    /// Directory for optimized files (None = current directory)
    pub output_path: Option<PathBuf>,
    /// Media type accepted at ingestion
    pub expected_mime: String,
    /// Output progress and results as JSON for programmatic use
    pub json_output: bool,
}

impl Default for Config {
    fn default() -> Self {
        let settings = Settings::default();
        Self {
            server_url: DEFAULT_SERVER_URL.to_string(),
            lossy: settings.lossy() as i64,
            colors: settings.color_count() as i64,
            timeout_secs: 120,
            output_path: None,
            expected_mime: DEFAULT_MIME.to_string(),
            json_output: false,
        }
    }
}

impl Config {
    /// Validate configuration parameters
    pub fn validate(&self) -> Result<()> {
        if !(self.server_url.starts_with("http://") || self.server_url.starts_with("https://")) {
            return Err(anyhow::anyhow!(
                "Server URL must start with http:// or https://: {}",
                self.server_url
            ));
        }

        if self.timeout_secs == 0 {
            return Err(anyhow::anyhow!("Timeout must be greater than 0"));
        }

        if self.expected_mime.trim().is_empty() {
            return Err(anyhow::anyhow!("Expected media type must not be empty"));
        }

        if let Some(ref output_path) = self.output_path {
            if output_path.exists() && !output_path.is_dir() {
                return Err(anyhow::anyhow!("Output path is not a directory: {}", output_path.display()));
            }
        }

        Ok(())
    }

    /// Clamped compression settings derived from this configuration
    pub fn settings(&self) -> Settings {
        Settings::new(self.lossy, self.colors)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Default location of the configuration file (`~/.gif-optimizer/config.json`)
    pub fn default_path() -> Option<PathBuf> {
        dirs::home_dir().map(|home| home.join(".gif-optimizer").join("config.json"))
    }

    /// Load configuration from file
    pub async fn from_file(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = tokio::fs::read_to_string(path).await?;
        let config: Config = serde_json::from_str(&content)
            .map_err(|e| anyhow::anyhow!("Invalid config file {}: {}", path.display(), e))?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to file
    pub async fn save_to_file(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let content = serde_json::to_string_pretty(self)?;
        tokio::fs::write(path, content).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_settings_clamp_each_value_independently() {
        let mut settings = Settings::default();

        settings.set_lossy(999);
        assert_eq!(settings.lossy(), 300);
        assert_eq!(settings.color_count(), 64);

        settings.set_lossy(-5);
        assert_eq!(settings.lossy(), 0);

        settings.set_color_count(1);
        assert_eq!(settings.color_count(), 2);

        settings.set_color_count(4096);
        assert_eq!(settings.color_count(), 256);
        assert_eq!(settings.lossy(), 0);
    }

    #[test]
    fn test_settings_snapshot_is_independent() {
        let mut settings = Settings::new(100, 32);
        let snapshot = settings;
        settings.set_lossy(250);

        assert_eq!(snapshot.lossy(), 100);
        assert_eq!(settings.lossy(), 250);
    }

    #[test]
    fn test_config_validation() {
        let mut config = Config::default();
        assert!(config.validate().is_ok());

        config.server_url = "ftp://example.com".to_string();
        assert!(config.validate().is_err());

        config.server_url = DEFAULT_SERVER_URL.to_string();
        config.timeout_secs = 0;
        assert!(config.validate().is_err());

        config.timeout_secs = 30;
        config.expected_mime = "  ".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_config_out_of_range_settings_are_clamped_not_rejected() {
        let config = Config {
            lossy: 1000,
            colors: 0,
            ..Default::default()
        };
        assert!(config.validate().is_ok());

        let settings = config.settings();
        assert_eq!(settings.lossy(), 300);
        assert_eq!(settings.color_count(), 2);
    }

    #[test]
    fn test_config_default() {
        let config = Config::default();
        assert_eq!(config.server_url, DEFAULT_SERVER_URL);
        assert_eq!(config.lossy, 200);
        assert_eq!(config.colors, 64);
        assert_eq!(config.expected_mime, "image/gif");
        assert!(config.output_path.is_none());
        assert!(!config.json_output);
    }

    #[tokio::test]
    async fn test_config_save_load() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("nested").join("config.json");

        let original_config = Config {
            server_url: "https://gif.example.com/api/optimize-gif".to_string(),
            lossy: 80,
            colors: 128,
            timeout_secs: 45,
            ..Default::default()
        };

        original_config.save_to_file(&config_path).await.unwrap();
        let loaded_config = Config::from_file(&config_path).await.unwrap();

        assert_eq!(loaded_config.server_url, "https://gif.example.com/api/optimize-gif");
        assert_eq!(loaded_config.lossy, 80);
        assert_eq!(loaded_config.colors, 128);
        assert_eq!(loaded_config.timeout_secs, 45);
    }

    #[tokio::test]
    async fn test_config_missing_file_falls_back_to_default() {
        let temp_dir = TempDir::new().unwrap();
        let config = Config::from_file(&temp_dir.path().join("absent.json")).await.unwrap();
        assert_eq!(config.lossy, 200);
    }

    #[tokio::test]
    async fn test_config_partial_file_uses_defaults_for_missing_fields() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("config.json");
        tokio::fs::write(&config_path, r#"{ "colors": 16 }"#).await.unwrap();

        let config = Config::from_file(&config_path).await.unwrap();
        assert_eq!(config.colors, 16);
        assert_eq!(config.lossy, 200);
        assert_eq!(config.server_url, DEFAULT_SERVER_URL);
    }

    #[tokio::test]
    async fn test_config_file_settings_are_clamped_on_load() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("config.json");
        tokio::fs::write(&config_path, r#"{ "lossy": 9999, "colors": 0 }"#).await.unwrap();

        let settings = Config::from_file(&config_path).await.unwrap().settings();
        assert_eq!(settings, Settings::new(300, 2));
    }
}
