use crate::error::ConfigError;
use serde::Deserialize;
use std::fs;
use std::path::Path;
use std::time::Duration;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    /// Site root, without trailing slash
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// SQLite file backing the `mangas` and `chapters` collections
    #[serde(default = "default_db_path")]
    pub db_path: String,

    /// Directory holding per-stage snapshots for resumable runs
    #[serde(default = "default_snapshot_dir")]
    pub snapshot_dir: String,

    /// Circuit breaker for sites that never emit the no-results marker
    #[serde(default = "default_max_listing_pages")]
    pub max_listing_pages: u32,

    #[serde(default)]
    pub http: HttpConfig,

    #[serde(default)]
    pub schedule: ScheduleConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct HttpConfig {
    /// Timeout for catalogue listing pages in seconds
    #[serde(default = "default_listing_timeout")]
    pub listing_timeout_secs: u64,

    /// Timeout for manga detail pages in seconds
    #[serde(default = "default_detail_timeout")]
    pub detail_timeout_secs: u64,

    /// Timeout for HEAD probes of well-known scan paths
    #[serde(default = "default_probe_timeout")]
    pub probe_timeout_secs: u64,

    /// Timeout for scan pages and episodes scripts
    #[serde(default = "default_episodes_timeout")]
    pub episodes_timeout_secs: u64,

    /// Per-request retries; whole-run retries belong to the scheduler
    #[serde(default)]
    pub max_retries: usize,

    #[serde(default = "default_initial_retry_delay")]
    pub initial_retry_delay_ms: u64,

    #[serde(default = "default_max_retry_delay")]
    pub max_retry_delay_ms: u64,

    #[serde(default = "default_true")]
    pub enable_cookies: bool,

    #[serde(default = "default_true")]
    pub enable_compression: bool,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ScheduleConfig {
    /// Local wall-clock time of the daily run, `HH:MM`
    #[serde(default = "default_daily_at")]
    pub daily_at: String,

    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    #[serde(default = "default_retry_delay_secs")]
    pub retry_delay_secs: u64,
}

fn default_base_url() -> String { "https://anime-sama.fr".to_string() }
fn default_db_path() -> String { "catalogue.db".to_string() }
fn default_snapshot_dir() -> String { "snapshots".to_string() }
fn default_max_listing_pages() -> u32 { 500 }
fn default_listing_timeout() -> u64 { 15 }
fn default_detail_timeout() -> u64 { 10 }
fn default_probe_timeout() -> u64 { 5 }
fn default_episodes_timeout() -> u64 { 15 }
fn default_initial_retry_delay() -> u64 { 500 }
fn default_max_retry_delay() -> u64 { 8000 }
fn default_true() -> bool { true }
fn default_daily_at() -> String { "00:00".to_string() }
fn default_max_attempts() -> u32 { 3 }
fn default_retry_delay_secs() -> u64 { 300 }

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            listing_timeout_secs: default_listing_timeout(),
            detail_timeout_secs: default_detail_timeout(),
            probe_timeout_secs: default_probe_timeout(),
            episodes_timeout_secs: default_episodes_timeout(),
            max_retries: 0,
            initial_retry_delay_ms: default_initial_retry_delay(),
            max_retry_delay_ms: default_max_retry_delay(),
            enable_cookies: true,
            enable_compression: true,
        }
    }
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            daily_at: default_daily_at(),
            max_attempts: default_max_attempts(),
            retry_delay_secs: default_retry_delay_secs(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            db_path: default_db_path(),
            snapshot_dir: default_snapshot_dir(),
            max_listing_pages: default_max_listing_pages(),
            http: HttpConfig::default(),
            schedule: ScheduleConfig::default(),
        }
    }
}

impl Config {
    /// Loads `config.toml` from the working directory, falling back to
    /// defaults when it is absent or unreadable, then applies env overrides.
    pub fn load() -> Self {
        Self::load_from(Path::new("config.toml"))
    }

    /// Same as [`Config::load`] with an explicit file.
    pub fn load_from(path: &Path) -> Self {
        let mut cfg = match Self::from_file(path) {
            Ok(Some(cfg)) => cfg,
            Ok(None) => Self::default(),
            Err(e) => {
                log::warn!("Ignoring {}: {}", path.display(), e);
                Self::default()
            }
        };
        cfg.apply_env();
        cfg
    }

    pub fn from_file(path: &Path) -> Result<Option<Self>, ConfigError> {
        if !path.exists() {
            return Ok(None);
        }
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml_str(&content).map(Some)
    }

    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let mut cfg: Config = toml::from_str(content)?;
        cfg.base_url = cfg.base_url.trim_end_matches('/').to_string();
        Ok(cfg)
    }

    fn apply_env(&mut self) {
        if let Ok(path) = std::env::var("SCRAPER_DB_PATH") {
            if !path.trim().is_empty() {
                self.db_path = path;
            }
        }
        if let Ok(base) = std::env::var("SCRAPER_BASE_URL") {
            if !base.trim().is_empty() {
                self.base_url = base.trim_end_matches('/').to_string();
            }
        }
    }
}

impl HttpConfig {
    pub fn listing_timeout(&self) -> Duration { Duration::from_secs(self.listing_timeout_secs) }
    pub fn detail_timeout(&self) -> Duration { Duration::from_secs(self.detail_timeout_secs) }
    pub fn probe_timeout(&self) -> Duration { Duration::from_secs(self.probe_timeout_secs) }
    pub fn episodes_timeout(&self) -> Duration { Duration::from_secs(self.episodes_timeout_secs) }

    pub fn create_http_client(&self) -> Result<crate::http_client::EnhancedHttpClient, reqwest::Error> {
        crate::http_client::EnhancedHttpClient::from_config(self)
    }
}
