//! Configuration loader and validator for the leaderboard sync service.
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("YAML parse error: {0}")]
    Parse(#[from] serde_yaml::Error),
    #[error("Invalid configuration: {0}")]
    Invalid(&'static str),
}

/// Root configuration struct mirroring the YAML schema exactly.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Config {
    pub app: App,
    pub provider: Provider,
    pub mail: Mail,
    pub site: Site,
}

/// App-level settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct App {
    pub data_dir: String,
    pub sync_interval_secs: u64,
    pub fetch_timeout_secs: u64,
    /// Minimum age before the same feed URL is fetched again.
    #[serde(default)]
    pub feed_cache_ttl_secs: u64,
}

/// Scoring provider endpoints. Paths are joined onto `base_url` after
/// substituting `{id}` (competition id) or `{season}`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Provider {
    pub base_url: String,
    pub leaderboard_path: String,
    pub tee_times_path: String,
    pub entries_path: String,
    pub schedule_path: String,
}

/// Outbound mail relay.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Mail {
    pub endpoint: String,
    pub api_key: String,
    pub from: String,
}

/// Public site, used for links in e-mails.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Site {
    pub base_url: String,
}

impl Config {
    /// Ensure required directories exist (creates `app.data_dir` if missing).
    pub fn ensure_dirs(&self) -> Result<(), std::io::Error> {
        if self.app.data_dir.trim().is_empty() {
            return Ok(());
        }
        fs::create_dir_all(&self.app.data_dir)
    }

    /// `DATABASE_URL` wins over the file-backed default under `data_dir`.
    pub fn database_url(&self) -> String {
        std::env::var("DATABASE_URL")
            .unwrap_or_else(|_| format!("sqlite://{}/leaderboard.db", self.app.data_dir))
    }

    pub fn sync_interval(&self) -> Duration {
        Duration::from_secs(self.app.sync_interval_secs)
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.app.fetch_timeout_secs)
    }

    pub fn feed_cache_ttl(&self) -> Duration {
        Duration::from_secs(self.app.feed_cache_ttl_secs)
    }
}

/// Load configuration from a YAML file and validate it.
/// - If `path` is None, uses `config.yaml` in the current working directory.
pub fn load(path: Option<&Path>) -> Result<Config, ConfigError> {
    let path = path.unwrap_or_else(|| Path::new("config.yaml"));
    let content = fs::read_to_string(path)?;
    let cfg: Config = serde_yaml::from_str(&content)?;
    validate(&cfg)?;
    Ok(cfg)
}

/// Validate a configuration instance.
fn validate(cfg: &Config) -> Result<(), ConfigError> {
    if cfg.app.data_dir.trim().is_empty() {
        return Err(ConfigError::Invalid("app.data_dir must be non-empty"));
    }
    if cfg.app.sync_interval_secs == 0 {
        return Err(ConfigError::Invalid("app.sync_interval_secs must be > 0"));
    }
    if cfg.app.fetch_timeout_secs == 0 {
        return Err(ConfigError::Invalid("app.fetch_timeout_secs must be > 0"));
    }

    let p = &cfg.provider;
    if !(p.base_url.starts_with("http://") || p.base_url.starts_with("https://")) {
        return Err(ConfigError::Invalid("provider.base_url must be an http(s) URL"));
    }
    if !p.leaderboard_path.contains("{id}") {
        return Err(ConfigError::Invalid("provider.leaderboard_path must contain {id}"));
    }
    if !p.tee_times_path.contains("{id}") {
        return Err(ConfigError::Invalid("provider.tee_times_path must contain {id}"));
    }
    if !p.entries_path.contains("{id}") {
        return Err(ConfigError::Invalid("provider.entries_path must contain {id}"));
    }
    if !p.schedule_path.contains("{season}") {
        return Err(ConfigError::Invalid("provider.schedule_path must contain {season}"));
    }

    if cfg.mail.endpoint.trim().is_empty() {
        return Err(ConfigError::Invalid("mail.endpoint must be non-empty"));
    }
    if cfg.mail.api_key.trim().is_empty() {
        return Err(ConfigError::Invalid("mail.api_key must be non-empty"));
    }
    if !cfg.mail.from.contains('@') {
        return Err(ConfigError::Invalid("mail.from must be an e-mail address"));
    }

    if cfg.site.base_url.trim().is_empty() {
        return Err(ConfigError::Invalid("site.base_url must be non-empty"));
    }

    Ok(())
}

/// Example configuration, also used as the test fixture.
pub fn example() -> &'static str {
    r#"app:
  data_dir: "./data"
  sync_interval_secs: 300
  fetch_timeout_secs: 10
  feed_cache_ttl_secs: 30

provider:
  base_url: "https://scores.example.com/"
  leaderboard_path: "competition/{id}/leaderboard"
  tee_times_path: "competition/{id}/teetimes"
  entries_path: "competition/{id}/entries"
  schedule_path: "schedule/{season}"

mail:
  endpoint: "https://mail.example.com/v1/send"
  api_key: "YOUR_MAIL_API_KEY"
  from: "Leaderboard <noreply@example.com>"

site:
  base_url: "https://leaderboard.example.com"
"#
}
