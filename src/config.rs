use crate::error::{Error, Result};
use crate::services::draft_store::AutosaveConfig;
use crate::services::feedback_service::EditPolicy;
use crate::services::retry_service::RetryConfig;
use dotenvy::dotenv;
use std::env;
use std::path::PathBuf;
use std::sync::OnceLock;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct Config {
    pub api_base_url: String,
    pub api_token: Option<String>,
    pub http_timeout_secs: u64,
    pub retry_max_retries: u32,
    pub retry_base_delay_ms: u64,
    pub feedback_edit_window_minutes: i64,
    pub feedback_max_edits: u32,
    pub notification_poll_secs: u64,
    pub draft_autosave_secs: u64,
    pub draft_debounce_ms: u64,
    pub draft_dir: Option<PathBuf>,
}

pub static CONFIG: OnceLock<Config> = OnceLock::new();

impl Config {
    /// Defaults for everything except the API location.
    pub fn new(api_base_url: impl Into<String>) -> Self {
        Self {
            api_base_url: api_base_url.into(),
            api_token: None,
            http_timeout_secs: 30,
            retry_max_retries: 3,
            retry_base_delay_ms: 1000,
            feedback_edit_window_minutes: 30,
            feedback_max_edits: 3,
            notification_poll_secs: 30,
            draft_autosave_secs: 30,
            draft_debounce_ms: 2000,
            draft_dir: None,
        }
    }

    pub fn from_env() -> Result<Self> {
        dotenv().ok();

        let defaults = Self::new(get_env("API_BASE_URL")?);
        Ok(Self {
            api_token: env::var("API_TOKEN").ok().filter(|t| !t.is_empty()),
            http_timeout_secs: get_env_parse_or("HTTP_TIMEOUT_SECS", defaults.http_timeout_secs)?,
            retry_max_retries: get_env_parse_or("RETRY_MAX_RETRIES", defaults.retry_max_retries)?,
            retry_base_delay_ms: get_env_parse_or(
                "RETRY_BASE_DELAY_MS",
                defaults.retry_base_delay_ms,
            )?,
            feedback_edit_window_minutes: get_env_parse_or(
                "FEEDBACK_EDIT_WINDOW_MINUTES",
                defaults.feedback_edit_window_minutes,
            )?,
            feedback_max_edits: get_env_parse_or("FEEDBACK_MAX_EDITS", defaults.feedback_max_edits)?,
            notification_poll_secs: get_env_parse_or(
                "NOTIFICATION_POLL_SECS",
                defaults.notification_poll_secs,
            )?,
            draft_autosave_secs: get_env_parse_or(
                "DRAFT_AUTOSAVE_SECS",
                defaults.draft_autosave_secs,
            )?,
            draft_debounce_ms: get_env_parse_or("DRAFT_DEBOUNCE_MS", defaults.draft_debounce_ms)?,
            draft_dir: env::var("DRAFT_DIR")
                .ok()
                .filter(|d| !d.is_empty())
                .map(PathBuf::from),
            ..defaults
        })
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs)
    }

    pub fn retry_config(&self) -> RetryConfig {
        RetryConfig::new(
            self.retry_max_retries,
            Duration::from_millis(self.retry_base_delay_ms),
        )
    }

    pub fn edit_policy(&self) -> EditPolicy {
        EditPolicy {
            window: chrono::Duration::minutes(self.feedback_edit_window_minutes),
            max_edits: self.feedback_max_edits,
        }
    }

    pub fn autosave_config(&self) -> AutosaveConfig {
        AutosaveConfig {
            interval: Duration::from_secs(self.draft_autosave_secs),
            debounce: Duration::from_millis(self.draft_debounce_ms),
        }
    }

    pub fn notification_poll_interval(&self) -> Duration {
        Duration::from_secs(self.notification_poll_secs)
    }
}

fn get_env(name: &str) -> Result<String> {
    env::var(name).map_err(|_| Error::Config(format!("Missing environment variable: {}", name)))
}

fn get_env_parse_or<T>(name: &str, default: T) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(name) {
        Ok(raw) if !raw.trim().is_empty() => raw
            .trim()
            .parse()
            .map_err(|e| Error::Config(format!("Invalid value for {}: {}", name, e))),
        _ => Ok(default),
    }
}

pub fn init_config() -> Result<()> {
    let config = Config::from_env()?;
    CONFIG
        .set(config)
        .map_err(|_| Error::Config("Configuration has already been initialized".to_string()))?;
    Ok(())
}

pub fn get_config() -> Result<&'static Config> {
    CONFIG
        .get()
        .ok_or_else(|| Error::Config("Configuration has not been initialized".to_string()))
}
