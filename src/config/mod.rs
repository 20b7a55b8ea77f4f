use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use tracing::warn;

/// Top-level application configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct AppConfig {
    #[serde(default)]
    pub scraper: ScraperConfig,
    #[serde(default)]
    pub storage: StorageConfig,
}

/// Scraper configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ScraperConfig {
    /// Root of the clergy/church directory (people, pastor, church, statistics pages).
    #[serde(default = "default_umdata_base_url")]
    pub umdata_base_url: String,

    #[serde(default = "default_megachurch_url")]
    pub megachurch_url: String,

    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    #[serde(default = "default_request_delay_ms")]
    pub request_delay_ms: u64,

    #[serde(default)]
    pub jitter_ms: u64,

    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    #[serde(default = "default_accept")]
    pub accept: String,

    #[serde(default = "default_accept_language")]
    pub accept_language: String,

    /// `length` sent to DataTables endpoints.
    #[serde(default = "default_page_size")]
    pub page_size: usize,

    #[serde(default = "default_stats_year")]
    pub stats_year: String,
}

/// Storage configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StorageConfig {
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
}

// ── Defaults ─────────────────────────────────────────────────────────────────

fn default_umdata_base_url() -> String {
    "https://www.umdata.org".to_string()
}
fn default_megachurch_url() -> String {
    "https://hirr.hartfordinternational.edu/research/megachurch-database/full-list-of-megachurches/"
        .to_string()
}
fn default_timeout_secs() -> u64 {
    30
}
fn default_request_delay_ms() -> u64 {
    1000
}
fn default_user_agent() -> String {
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36"
        .to_string()
}
fn default_accept() -> String {
    "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8".to_string()
}
fn default_accept_language() -> String {
    "en-US,en;q=0.9".to_string()
}
fn default_page_size() -> usize {
    100
}
fn default_stats_year() -> String {
    "2024".to_string()
}
fn default_data_dir() -> PathBuf {
    PathBuf::from("data")
}

impl Default for ScraperConfig {
    fn default() -> Self {
        Self {
            umdata_base_url: default_umdata_base_url(),
            megachurch_url: default_megachurch_url(),
            timeout_secs: default_timeout_secs(),
            request_delay_ms: default_request_delay_ms(),
            jitter_ms: 0,
            user_agent: default_user_agent(),
            accept: default_accept(),
            accept_language: default_accept_language(),
            page_size: default_page_size(),
            stats_year: default_stats_year(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
        }
    }
}

impl ScraperConfig {
    pub fn request_delay(&self) -> Duration {
        Duration::from_millis(self.request_delay_ms)
    }

    /// Apply a `--delay <seconds>` flag.
    pub fn set_delay_secs(&mut self, secs: f64) {
        self.request_delay_ms = (secs.max(0.0) * 1000.0).round() as u64;
    }
}

// ── Loader ───────────────────────────────────────────────────────────────────

impl AppConfig {
    /// Load configuration from file + environment overrides
    pub fn load() -> Result<Self> {
        dotenv::dotenv().ok();

        let cfg = config::Config::builder()
            .add_source(
                config::File::with_name("config/default")
                    .required(false)
                    .format(config::FileFormat::Toml),
            )
            .add_source(
                config::File::with_name("config/local")
                    .required(false)
                    .format(config::FileFormat::Toml),
            )
            .add_source(config::Environment::with_prefix("CHURCH_ETL").separator("__"))
            .build()?;

        let app_cfg = cfg.try_deserialize().unwrap_or_else(|e| {
            warn!("Ignoring unreadable configuration ({}), using defaults", e);
            AppConfig::default()
        });
        Ok(app_cfg)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let cfg = AppConfig::default();
        assert_eq!(cfg.scraper.timeout_secs, 30);
        assert_eq!(cfg.scraper.request_delay(), Duration::from_secs(1));
        assert_eq!(cfg.scraper.page_size, 100);
        assert_eq!(cfg.scraper.jitter_ms, 0);
        assert_eq!(cfg.storage.data_dir, PathBuf::from("data"));
    }

    #[test]
    fn test_partial_section_falls_back_per_field() {
        let cfg: AppConfig = config::Config::builder()
            .add_source(config::File::from_str(
                "[scraper]\nrequest_delay_ms = 250\n",
                config::FileFormat::Toml,
            ))
            .build()
            .unwrap()
            .try_deserialize()
            .unwrap();
        assert_eq!(cfg.scraper.request_delay_ms, 250);
        assert_eq!(cfg.scraper.umdata_base_url, "https://www.umdata.org");
        assert_eq!(cfg.storage.data_dir, PathBuf::from("data"));
    }

    #[test]
    fn test_set_delay_secs() {
        let mut cfg = ScraperConfig::default();
        cfg.set_delay_secs(0.5);
        assert_eq!(cfg.request_delay_ms, 500);
        cfg.set_delay_secs(-3.0);
        assert_eq!(cfg.request_delay_ms, 0);
    }
}
