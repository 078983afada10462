//! Configuration loading and management
//!
//! Configuration is loaded from `~/.config/ideaflow/config.toml`
//!
//! This module follows the XDG Base Directory Specification:
//! - Config: `$XDG_CONFIG_HOME/ideaflow/` (~/.config/ideaflow/)
//! - Data: `$XDG_DATA_HOME/ideaflow/` (~/.local/share/ideaflow/)
//! - State/Logs: `$XDG_STATE_HOME/ideaflow/` (~/.local/state/ideaflow/)

use crate::error::{Error, Result};
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

/// Environment variable consulted when `backend.access_token` is unset.
pub const ACCESS_TOKEN_ENV: &str = "IDEAFLOW_ACCESS_TOKEN";

/// Returns a best-effort home directory path.
fn home_dir() -> PathBuf {
    std::env::var_os("HOME")
        .map(PathBuf::from)
        .or_else(dirs::home_dir)
        .unwrap_or_else(|| PathBuf::from("."))
}

/// Returns XDG_CONFIG_HOME or ~/.config
fn xdg_config_home() -> PathBuf {
    std::env::var("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| home_dir().join(".config"))
}

/// Returns XDG_DATA_HOME or ~/.local/share
fn xdg_data_home() -> PathBuf {
    std::env::var("XDG_DATA_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| home_dir().join(".local/share"))
}

/// Returns XDG_STATE_HOME or ~/.local/state
fn xdg_state_home() -> PathBuf {
    std::env::var("XDG_STATE_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| home_dir().join(".local/state"))
}

/// Main configuration struct
#[derive(Debug, Deserialize, Default)]
pub struct Config {
    /// Hosted backend (REST + edge functions)
    #[serde(default)]
    pub backend: BackendConfig,

    /// Prototype generation polling
    #[serde(default)]
    pub generation: GenerationConfig,

    /// Analytics configuration
    #[serde(default)]
    pub analytics: AnalyticsConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Hosted backend configuration
#[derive(Debug, Deserialize, Clone)]
pub struct BackendConfig {
    /// Project URL (e.g., `https://abcd.supabase.co`)
    pub url: Option<String>,

    /// Public API key sent as `apikey` on every request
    pub anon_key: Option<String>,

    /// Signed-in admin session token (can also use `IDEAFLOW_ACCESS_TOKEN`)
    pub access_token: Option<String>,

    /// Edge function that starts prototype generation
    #[serde(default = "default_generation_function")]
    pub generation_function: String,

    /// HTTP request timeout in seconds
    #[serde(default = "default_backend_timeout")]
    pub timeout_secs: u64,

    /// Max retry attempts for transient failures
    #[serde(default = "default_backend_max_retries")]
    pub max_retries: usize,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            url: None,
            anon_key: None,
            access_token: None,
            generation_function: default_generation_function(),
            timeout_secs: default_backend_timeout(),
            max_retries: default_backend_max_retries(),
        }
    }
}

impl BackendConfig {
    /// Check if the backend is configured well enough to make requests
    pub fn is_ready(&self) -> bool {
        self.url.is_some() && self.anon_key.is_some()
    }

    /// Validate configuration, returning error message if invalid
    pub fn validate(&self) -> Result<()> {
        match self.url.as_deref() {
            None => {
                return Err(Error::Config("backend.url is required".to_string()));
            }
            Some(url) if !(url.starts_with("https://") || url.starts_with("http://")) => {
                return Err(Error::Config(format!(
                    "backend.url must be an http(s) URL, got {:?}",
                    url
                )));
            }
            Some(_) => {}
        }
        if self.anon_key.is_none() {
            return Err(Error::Config("backend.anon_key is required".to_string()));
        }
        if self.generation_function.trim().is_empty() {
            return Err(Error::Config(
                "backend.generation_function must not be empty".to_string(),
            ));
        }
        Ok(())
    }

    /// Session token from config, falling back to the environment.
    pub fn access_token(&self) -> Option<String> {
        self.access_token
            .clone()
            .or_else(|| std::env::var(ACCESS_TOKEN_ENV).ok())
            .filter(|token| !token.is_empty())
    }
}

fn default_generation_function() -> String {
    "generate-prototype".to_string()
}

fn default_backend_timeout() -> u64 {
    30
}

fn default_backend_max_retries() -> usize {
    3
}

/// Prototype generation polling configuration
#[derive(Debug, Deserialize, Clone)]
pub struct GenerationConfig {
    /// Status checks before giving up
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Delay between status checks in milliseconds
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// Persisted generations older than this are not resumed
    #[serde(default = "default_resume_window_secs")]
    pub resume_window_secs: u64,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            poll_interval_ms: default_poll_interval_ms(),
            resume_window_secs: default_resume_window_secs(),
        }
    }
}

impl GenerationConfig {
    /// Validate configuration, returning error message if invalid
    pub fn validate(&self) -> Result<()> {
        if self.max_attempts == 0 {
            return Err(Error::Config(
                "generation.max_attempts must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

fn default_max_attempts() -> u32 {
    60
}

fn default_poll_interval_ms() -> u64 {
    1000
}

fn default_resume_window_secs() -> u64 {
    3600
}

/// Analytics configuration
#[derive(Debug, Deserialize, Clone)]
pub struct AnalyticsConfig {
    /// Number of submitters shown on the leaderboard
    #[serde(default = "default_leaderboard_size")]
    pub leaderboard_size: usize,

    /// Number of newest ideas listed under recent submissions
    #[serde(default = "default_recent_submissions")]
    pub recent_submissions: usize,

    /// How long a cached report for a named preset stays fresh
    #[serde(default = "default_snapshot_ttl_secs")]
    pub snapshot_ttl_secs: u64,

    /// Per-transition benchmark targets
    #[serde(default)]
    pub benchmarks: BenchmarkTargets,
}

impl Default for AnalyticsConfig {
    fn default() -> Self {
        Self {
            leaderboard_size: default_leaderboard_size(),
            recent_submissions: default_recent_submissions(),
            snapshot_ttl_secs: default_snapshot_ttl_secs(),
            benchmarks: BenchmarkTargets::default(),
        }
    }
}

fn default_leaderboard_size() -> usize {
    10
}

fn default_recent_submissions() -> usize {
    10
}

fn default_snapshot_ttl_secs() -> u64 {
    300
}

/// Benchmark targets for the four tracked pipeline transitions
#[derive(Debug, Deserialize, Clone)]
pub struct BenchmarkTargets {
    #[serde(default = "default_decision_target")]
    pub submission_to_decision: BenchmarkTarget,
    #[serde(default = "default_prd_target")]
    pub approval_to_prd: BenchmarkTarget,
    #[serde(default = "default_prototype_target")]
    pub prd_to_prototype: BenchmarkTarget,
    #[serde(default = "default_end_to_end_target")]
    pub end_to_end: BenchmarkTarget,
}

impl Default for BenchmarkTargets {
    fn default() -> Self {
        Self {
            submission_to_decision: default_decision_target(),
            approval_to_prd: default_prd_target(),
            prd_to_prototype: default_prototype_target(),
            end_to_end: default_end_to_end_target(),
        }
    }
}

/// A target duration and the ceiling above which a metric is "behind".
#[derive(Debug, Deserialize, Clone, Copy, PartialEq)]
pub struct BenchmarkTarget {
    pub target_days: f64,
    /// Defaults to 110% of the target
    pub at_risk_days: Option<f64>,
}

impl BenchmarkTarget {
    pub const fn days(target_days: f64) -> Self {
        Self {
            target_days,
            at_risk_days: None,
        }
    }

    /// Upper bound of the at-risk band.
    pub fn ceiling(&self) -> f64 {
        self.at_risk_days.unwrap_or(self.target_days * 1.1)
    }
}

fn default_decision_target() -> BenchmarkTarget {
    BenchmarkTarget::days(3.0)
}

fn default_prd_target() -> BenchmarkTarget {
    BenchmarkTarget::days(5.0)
}

fn default_prototype_target() -> BenchmarkTarget {
    BenchmarkTarget::days(2.0)
}

fn default_end_to_end_target() -> BenchmarkTarget {
    BenchmarkTarget::days(14.0)
}

/// Logging configuration
#[derive(Debug, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Maximum number of log files to keep
    #[serde(default = "default_max_log_files")]
    pub max_files: usize,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            max_files: default_max_log_files(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_max_log_files() -> usize {
    5
}

impl Config {
    /// Load configuration from the default path
    pub fn load() -> Result<Self> {
        let config_path = Self::config_path();

        if !config_path.exists() {
            tracing::info!("No config file found at {:?}, using defaults", config_path);
            return Ok(Config::default());
        }

        Self::load_from(&config_path)
    }

    /// Load configuration from a specific path
    pub fn load_from(path: &PathBuf) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("failed to read config file {:?}: {}", path, e)))?;

        let config: Config = toml::from_str(&content)
            .map_err(|e| Error::Config(format!("failed to parse config: {}", e)))?;

        config.generation.validate()?;

        Ok(config)
    }

    /// Returns the default config file path
    ///
    /// `$XDG_CONFIG_HOME/ideaflow/config.toml` (~/.config/ideaflow/config.toml)
    pub fn config_path() -> PathBuf {
        xdg_config_home().join("ideaflow").join("config.toml")
    }

    /// Returns the data directory path (for the SQLite mirror)
    ///
    /// `$XDG_DATA_HOME/ideaflow/` (~/.local/share/ideaflow/)
    pub fn data_dir() -> PathBuf {
        xdg_data_home().join("ideaflow")
    }

    /// Returns the state directory path (for logs)
    ///
    /// `$XDG_STATE_HOME/ideaflow/` (~/.local/state/ideaflow/)
    pub fn state_dir() -> PathBuf {
        xdg_state_home().join("ideaflow")
    }

    /// Returns the database file path
    ///
    /// `$XDG_DATA_HOME/ideaflow/data.db` (~/.local/share/ideaflow/data.db)
    pub fn database_path() -> PathBuf {
        Self::data_dir().join("data.db")
    }

    /// Returns the persisted generation state path
    ///
    /// `$XDG_DATA_HOME/ideaflow/generation_state.json`
    pub fn generation_state_path() -> PathBuf {
        Self::data_dir().join("generation_state.json")
    }

    /// Returns the log file path
    ///
    /// `$XDG_STATE_HOME/ideaflow/ideaflow.log` (~/.local/state/ideaflow/ideaflow.log)
    pub fn log_path() -> PathBuf {
        Self::state_dir().join("ideaflow.log")
    }

    /// Ensure XDG base directory environment variables are set.
    ///
    /// This is mainly for CLI binaries that want explicit, stable path behavior
    /// before invoking other components that read these env vars.
    pub fn ensure_xdg_env() {
        let home = home_dir();

        if std::env::var("XDG_DATA_HOME").is_err() {
            std::env::set_var("XDG_DATA_HOME", home.join(".local/share"));
        }

        if std::env::var("XDG_STATE_HOME").is_err() {
            std::env::set_var("XDG_STATE_HOME", home.join(".local/state"));
        }

        if std::env::var("XDG_CONFIG_HOME").is_err() {
            std::env::set_var("XDG_CONFIG_HOME", home.join(".config"));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert!(!config.backend.is_ready());
        assert_eq!(config.generation.max_attempts, 60);
        assert_eq!(config.generation.poll_interval(), Duration::from_millis(1000));
        assert_eq!(config.analytics.leaderboard_size, 10);
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_parse_config() {
        let toml = r#"
[backend]
url = "https://abcd.supabase.co"
anon_key = "anon"

[generation]
max_attempts = 90
poll_interval_ms = 2000

[analytics.benchmarks.submission_to_decision]
target_days = 2.0
at_risk_days = 4.0

[logging]
level = "debug"
"#;
        let config: Config = toml::from_str(toml).unwrap();

        assert!(config.backend.is_ready());
        assert!(config.backend.validate().is_ok());
        assert_eq!(config.backend.generation_function, "generate-prototype");
        assert_eq!(config.generation.max_attempts, 90);
        assert_eq!(config.generation.resume_window_secs, 3600);

        let decision = config.analytics.benchmarks.submission_to_decision;
        assert_eq!(decision.target_days, 2.0);
        assert_eq!(decision.ceiling(), 4.0);
        // untouched benchmarks keep their defaults
        assert_eq!(config.analytics.benchmarks.end_to_end.target_days, 14.0);
        assert_eq!(config.logging.level, "debug");
    }

    #[test]
    fn test_benchmark_ceiling_defaults_to_110_percent() {
        let target = BenchmarkTarget::days(10.0);
        assert!((target.ceiling() - 11.0).abs() < 1e-9);
    }

    #[test]
    fn test_backend_validation() {
        let config = BackendConfig::default();
        assert!(config.validate().is_err());

        let config = BackendConfig {
            url: Some("abcd.supabase.co".to_string()),
            anon_key: Some("anon".to_string()),
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = BackendConfig {
            url: Some("https://abcd.supabase.co".to_string()),
            anon_key: Some("anon".to_string()),
            ..Default::default()
        };
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_generation_validation() {
        let config = GenerationConfig {
            max_attempts: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
        assert!(GenerationConfig::default().validate().is_ok());
    }
}
