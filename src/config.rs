//! Configuration management for banhammer
//!
//! All configuration is loaded from `./config/banhammer.toml`.
//! The embedded template below is the single source of defaults for a fresh install.

use serde::Deserialize;
use std::fs;
use std::io::{self, IsTerminal, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Configuration file path relative to working directory
pub const CONFIG_PATH: &str = "./config/banhammer.toml";

/// Default configuration file content
pub const DEFAULT_CONFIG: &str = include_str!("../config/banhammer.toml");

/// Environment variable that overrides `api.session_token`
pub const SESSION_TOKEN_ENV: &str = "BANHAMMER_SESSION_TOKEN";

/// Hard upper bound on the page size accepted by the remote API
pub const MAX_PAGE_SIZE: usize = 100;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Configuration file not found at {0}")]
    FileNotFound(PathBuf),

    #[error("Failed to read configuration file: {0}")]
    IoError(#[from] io::Error),

    #[error("Failed to parse configuration file: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("Invalid URL in '{field}': {url}")]
    InvalidUrl { field: String, url: String },

    #[error("Configuration field '{field}' cannot be empty")]
    EmptyRequired { field: String },

    #[error("Configuration field '{field}' is out of range: {reason}")]
    OutOfRange { field: String, reason: String },
}

/// Root configuration structure
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub api: ApiConfig,
    #[serde(default)]
    pub rate_limit: RateLimitConfig,
    #[serde(default)]
    pub search: SearchConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
    pub base_url: String,
    #[serde(default)]
    pub session_token: String,
    pub request_timeout_secs: u64,
}

/// Backoff strategy applied between retries of a failed remote call
#[derive(Debug, Clone, Copy, Deserialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum BackoffStrategy {
    Linear,
    Exponential,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RateLimitConfig {
    #[serde(default = "default_requests_per_second")]
    pub requests_per_second: u32,
    #[serde(default = "default_backoff_strategy")]
    pub backoff_strategy: BackoffStrategy,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_backoff_base_delay_ms")]
    pub backoff_base_delay_ms: u64,
    #[serde(default = "default_backoff_max_delay_ms")]
    pub backoff_max_delay_ms: u64,
    /// Longest server-requested flood wait we are willing to sleep through
    #[serde(default = "default_max_flood_wait_secs")]
    pub max_flood_wait_secs: u64,
}

fn default_requests_per_second() -> u32 {
    5
}

fn default_backoff_strategy() -> BackoffStrategy {
    BackoffStrategy::Exponential
}

fn default_max_retries() -> u32 {
    3
}

fn default_backoff_base_delay_ms() -> u64 {
    1000
}

fn default_backoff_max_delay_ms() -> u64 {
    30_000
}

fn default_max_flood_wait_secs() -> u64 {
    900
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            requests_per_second: default_requests_per_second(),
            backoff_strategy: default_backoff_strategy(),
            max_retries: default_max_retries(),
            backoff_base_delay_ms: default_backoff_base_delay_ms(),
            backoff_max_delay_ms: default_backoff_max_delay_ms(),
            max_flood_wait_secs: default_max_flood_wait_secs(),
        }
    }
}

impl RateLimitConfig {
    /// Delay before retry number `attempt` (1-based). Attempt 0 never waits.
    pub fn calculate_backoff_delay(&self, attempt: u32) -> Duration {
        if attempt == 0 {
            return Duration::ZERO;
        }
        let base = self.backoff_base_delay_ms;
        let delay_ms = match self.backoff_strategy {
            BackoffStrategy::Linear => base.saturating_mul(attempt as u64),
            BackoffStrategy::Exponential => {
                let factor = 1u64.checked_shl(attempt - 1).unwrap_or(u64::MAX);
                base.saturating_mul(factor)
            }
        };
        Duration::from_millis(delay_ms.min(self.backoff_max_delay_ms))
    }

    pub fn max_flood_wait(&self) -> Duration {
        Duration::from_secs(self.max_flood_wait_secs)
    }
}

/// How candidates are discovered. The two strategies are never mixed within a run.
#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum ScanStrategy {
    /// Search "user joined" service messages inside the window.
    /// Misses users whose join did not leave a retained service message.
    JoinMessages,
    /// Page through the member list by offset.
    /// Misses users if the server reorders members between page requests.
    MemberListing,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SearchConfig {
    #[serde(default = "default_page_size")]
    pub page_size: usize,
    #[serde(default = "default_page_size")]
    pub channel_capacity: usize,
    #[serde(default = "default_strategy")]
    pub strategy: ScanStrategy,
    #[serde(default = "default_results_dir")]
    pub results_dir: String,
    #[serde(default = "default_fetch_messages")]
    pub fetch_messages: bool,
}

fn default_page_size() -> usize {
    MAX_PAGE_SIZE
}

fn default_strategy() -> ScanStrategy {
    ScanStrategy::JoinMessages
}

fn default_results_dir() -> String {
    "./ban".to_string()
}

fn default_fetch_messages() -> bool {
    true
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            page_size: default_page_size(),
            channel_capacity: default_page_size(),
            strategy: default_strategy(),
            results_dir: default_results_dir(),
            fetch_messages: default_fetch_messages(),
        }
    }
}

impl AppConfig {
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from_path(Path::new(CONFIG_PATH))
    }

    pub fn load_from_path(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Err(ConfigError::FileNotFound(path.to_path_buf()));
        }

        let content = fs::read_to_string(path)?;
        let mut config: AppConfig = toml::from_str(&content)?;
        if let Ok(token) = std::env::var(SESSION_TOKEN_ENV) {
            if !token.is_empty() {
                config.api.session_token = token;
            }
        }
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.api.base_url.is_empty() {
            return Err(ConfigError::EmptyRequired {
                field: "api.base_url".to_string(),
            });
        }
        if !self.api.base_url.starts_with("http://") && !self.api.base_url.starts_with("https://") {
            return Err(ConfigError::InvalidUrl {
                field: "api.base_url".to_string(),
                url: self.api.base_url.clone(),
            });
        }
        if self.api.request_timeout_secs == 0 {
            return Err(ConfigError::EmptyRequired {
                field: "api.request_timeout_secs".to_string(),
            });
        }

        if self.search.page_size == 0 || self.search.page_size > MAX_PAGE_SIZE {
            return Err(ConfigError::OutOfRange {
                field: "search.page_size".to_string(),
                reason: format!("must be between 1 and {}", MAX_PAGE_SIZE),
            });
        }
        if self.search.channel_capacity == 0 {
            return Err(ConfigError::OutOfRange {
                field: "search.channel_capacity".to_string(),
                reason: "must be greater than 0".to_string(),
            });
        }
        if self.search.results_dir.is_empty() {
            return Err(ConfigError::EmptyRequired {
                field: "search.results_dir".to_string(),
            });
        }

        if self.rate_limit.backoff_base_delay_ms > self.rate_limit.backoff_max_delay_ms {
            return Err(ConfigError::OutOfRange {
                field: "rate_limit.backoff_base_delay_ms".to_string(),
                reason: "must not exceed rate_limit.backoff_max_delay_ms".to_string(),
            });
        }

        Ok(())
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.api.request_timeout_secs)
    }

    pub fn create_default_config() -> Result<PathBuf, ConfigError> {
        let path = Path::new(CONFIG_PATH);

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        // Never clobber an existing config holding a session token
        let mut file = fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(path)?;
        file.write_all(DEFAULT_CONFIG.as_bytes())?;

        Ok(path.to_path_buf())
    }

    /// Check if stdin is a TTY (interactive terminal)
    pub fn is_interactive() -> bool {
        io::stdin().is_terminal()
    }

    /// Prompt user to create default config (only in interactive mode)
    pub fn prompt_create_config() -> Result<Option<PathBuf>, ConfigError> {
        if !Self::is_interactive() {
            return Ok(None);
        }

        print!("Configuration file not found. Create default config? [Y/n] ");
        io::stdout().flush()?;

        let mut input = String::new();
        io::stdin().read_line(&mut input)?;
        let input = input.trim().to_lowercase();

        if input.is_empty() || input == "y" || input == "yes" {
            let path = Self::create_default_config()?;
            Ok(Some(path))
        } else {
            Ok(None)
        }
    }
}
