//! Configuration file support.
//!
//! TOML from, lowest priority first:
//! - user config: `<config_dir>/forecast-console/config.toml`
//! - project-local: `.forecast-console.toml` (searched up the directory tree)
//! - an explicit `--config` file
//!
//! CLI flags are applied on top by [`Settings::resolve`].

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::console::DedupPolicy;
use crate::job::JobKind;
use crate::poller::PollerOptions;

pub const DEFAULT_BASE_URL: &str = "http://127.0.0.1:5000";
const DEFAULT_TIMEOUT_SECS: u64 = 30;
const PROJECT_FILE: &str = ".forecast-console.toml";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("server.base_url '{url}' is not a valid url: {reason}")]
    BaseUrl { url: String, reason: String },

    #[error("{field} must be greater than 0")]
    Zero { field: &'static str },

    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}

#[derive(Debug, Default, Clone, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub polling: PollingConfig,
    pub output: OutputConfig,
}

#[derive(Debug, Default, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub base_url: Option<String>,
    /// Raw `Cookie` header value of a logged-in session.
    pub session_cookie: Option<String>,
    pub timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Clone, Deserialize)]
#[serde(default)]
pub struct PollingConfig {
    pub training_interval_ms: Option<u64>,
    pub prediction_interval_ms: Option<u64>,
    pub redirect_delay_ms: Option<u64>,
    pub dedup: Option<DedupPolicy>,
}

#[derive(Debug, Default, Clone, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// JSON-lines events instead of progress bars.
    pub json: Option<bool>,
    pub open_browser: Option<bool>,
}

impl AppConfig {
    /// Loads and merges every config layer. Missing files are skipped; broken
    /// ones are logged and skipped.
    pub fn load(explicit: Option<&Path>) -> Self {
        let cwd = std::env::current_dir().ok();
        Self::load_layers(user_config_path(), cwd.as_deref(), explicit)
    }

    fn load_layers(user: Option<PathBuf>, cwd: Option<&Path>, explicit: Option<&Path>) -> Self {
        let mut config = Self::default();

        if let Some(path) = user {
            if path.exists() {
                log::info!("loading user config: {}", path.display());
                if let Some(user_config) = load_logged(&path) {
                    config = user_config;
                }
            } else {
                log::debug!("user config not found: {}", path.display());
            }
        }

        if let Some(path) = cwd.and_then(find_config_in_parents) {
            log::info!("loading project config: {}", path.display());
            if let Some(project_config) = load_logged(&path) {
                config.merge(project_config);
            }
        }

        if let Some(path) = explicit {
            log::info!("loading config: {}", path.display());
            match load_file(path) {
                Ok(explicit_config) => config.merge(explicit_config),
                // Asked for by name, so say so on stderr too.
                Err(e) => eprintln!("warning: {e}"),
            }
        }

        if let Err(e) = config.validate() {
            log::warn!("{e}");
            eprintln!("warning: {e}");
        }

        config
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if let Some(url) = &self.server.base_url {
            reqwest::Url::parse(url).map_err(|e| ConfigError::BaseUrl {
                url: url.clone(),
                reason: e.to_string(),
            })?;
        }
        let positive = [
            ("server.timeout_secs", self.server.timeout_secs),
            ("polling.training_interval_ms", self.polling.training_interval_ms),
            ("polling.prediction_interval_ms", self.polling.prediction_interval_ms),
        ];
        for (field, value) in positive {
            if value == Some(0) {
                return Err(ConfigError::Zero { field });
            }
        }
        Ok(())
    }

    /// Values from `other` win when present.
    fn merge(&mut self, other: Self) {
        // Server
        self.server.base_url = other.server.base_url.or_else(|| self.server.base_url.take());
        self.server.session_cookie = other
            .server
            .session_cookie
            .or_else(|| self.server.session_cookie.take());
        self.server.timeout_secs = other.server.timeout_secs.or(self.server.timeout_secs);

        // Polling
        self.polling.training_interval_ms = other
            .polling
            .training_interval_ms
            .or(self.polling.training_interval_ms);
        self.polling.prediction_interval_ms = other
            .polling
            .prediction_interval_ms
            .or(self.polling.prediction_interval_ms);
        self.polling.redirect_delay_ms = other
            .polling
            .redirect_delay_ms
            .or(self.polling.redirect_delay_ms);
        self.polling.dedup = other.polling.dedup.or(self.polling.dedup);

        // Output
        self.output.json = other.output.json.or(self.output.json);
        self.output.open_browser = other.output.open_browser.or(self.output.open_browser);
    }
}

fn user_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("forecast-console").join("config.toml"))
}

fn find_config_in_parents(start: &Path) -> Option<PathBuf> {
    let mut current = Some(start);
    while let Some(dir) = current {
        let config_path = dir.join(PROJECT_FILE);
        if config_path.exists() {
            return Some(config_path);
        }
        current = dir.parent();
    }
    None
}

fn load_file(path: &Path) -> Result<AppConfig, ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    toml::from_str(&content).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

fn load_logged(path: &Path) -> Option<AppConfig> {
    match load_file(path) {
        Ok(config) => Some(config),
        Err(e) => {
            log::warn!("{e}");
            None
        }
    }
}

/// Flag values that override the config files. `None` leaves the file value.
#[derive(Debug, Default, Clone)]
pub struct Overrides {
    pub server: Option<String>,
    pub session_cookie: Option<String>,
    pub json: bool,
    pub no_open: bool,
    pub dedup: Option<DedupPolicy>,
    pub interval_ms: Option<u64>,
    pub redirect_delay_ms: Option<u64>,
}

/// Fully resolved settings for one invocation.
#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    pub base_url: String,
    pub session_cookie: Option<String>,
    pub timeout: Duration,
    pub training_interval: Duration,
    pub prediction_interval: Duration,
    pub redirect_delay: Duration,
    pub dedup: DedupPolicy,
    pub json: bool,
    pub open_browser: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Settings::resolve(&AppConfig::default(), &Overrides::default())
    }
}

impl Settings {
    /// Defaults < config < flags. Zero durations fall back to the defaults.
    pub fn resolve(config: &AppConfig, flags: &Overrides) -> Self {
        let ms = |v: Option<u64>| v.filter(|v| *v > 0).map(Duration::from_millis);
        let flag_interval = ms(flags.interval_ms);

        Self {
            base_url: flags
                .server
                .clone()
                .or_else(|| config.server.base_url.clone())
                .unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            session_cookie: flags
                .session_cookie
                .clone()
                .or_else(|| config.server.session_cookie.clone()),
            timeout: Duration::from_secs(
                config
                    .server
                    .timeout_secs
                    .filter(|v| *v > 0)
                    .unwrap_or(DEFAULT_TIMEOUT_SECS),
            ),
            training_interval: flag_interval
                .or_else(|| ms(config.polling.training_interval_ms))
                .unwrap_or_else(|| JobKind::Training.default_interval()),
            prediction_interval: flag_interval
                .or_else(|| ms(config.polling.prediction_interval_ms))
                .unwrap_or_else(|| JobKind::Prediction.default_interval()),
            redirect_delay: flags
                .redirect_delay_ms
                .or(config.polling.redirect_delay_ms)
                .map(Duration::from_millis)
                .unwrap_or(PollerOptions::REDIRECT_DELAY),
            dedup: flags.dedup.or(config.polling.dedup).unwrap_or_default(),
            json: flags.json || config.output.json.unwrap_or(false),
            open_browser: !flags.no_open && config.output.open_browser.unwrap_or(true),
        }
    }

    pub fn interval_for(&self, kind: JobKind) -> Duration {
        match kind {
            JobKind::Training => self.training_interval,
            JobKind::Prediction => self.prediction_interval,
        }
    }

    pub fn poller_options(&self, kind: JobKind) -> PollerOptions {
        PollerOptions {
            interval: self.interval_for(kind),
            redirect_delay: self.redirect_delay,
            dedup: self.dedup,
        }
    }
}
