//! Watchtower configuration system.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{Result, WatchtowerError};

/// Root configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WatchtowerConfig {
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    #[serde(default)]
    pub fetch: FetchConfig,
    #[serde(default)]
    pub notify: NotifyConfig,
    #[serde(default)]
    pub history: HistoryConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
}

impl WatchtowerConfig {
    /// Load config from the default path (~/.watchtower/config.toml).
    pub fn load() -> Result<Self> {
        let path = Self::default_path();
        if path.exists() {
            Self::load_from(&path)
        } else {
            Ok(Self::default())
        }
    }

    /// Load config from a specific path.
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| WatchtowerError::Config(format!("Failed to read config: {e}")))?;
        let config: Self = toml::from_str(&content)
            .map_err(|e| WatchtowerError::Config(format!("Failed to parse config: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Save config to the default path.
    pub fn save(&self) -> Result<()> {
        let path = Self::default_path();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)
            .map_err(|e| WatchtowerError::Config(format!("Failed to serialize config: {e}")))?;
        std::fs::write(&path, content)?;
        Ok(())
    }

    /// Reject values the scheduler cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.scheduler.tick_secs == 0 {
            return Err(WatchtowerError::Config("scheduler.tick_secs must be > 0".into()));
        }
        if self.scheduler.platform_floor_secs == 0 {
            return Err(WatchtowerError::Config(
                "scheduler.platform_floor_secs must be > 0".into(),
            ));
        }
        if self.scheduler.max_concurrent == 0 {
            return Err(WatchtowerError::Config(
                "scheduler.max_concurrent must be > 0".into(),
            ));
        }
        let email_timeout = self.notify.email.as_ref().map(|e| e.timeout_secs);
        for (name, secs) in [
            ("fetch.timeout_secs", Some(self.fetch.timeout_secs)),
            ("notify.webhook_timeout_secs", Some(self.notify.webhook_timeout_secs)),
            ("notify.email.timeout_secs", email_timeout),
        ] {
            match secs {
                Some(0) => return Err(WatchtowerError::Config(format!("{name} must be > 0"))),
                Some(s) if s > MAX_TIMEOUT_SECS => {
                    return Err(WatchtowerError::Config(format!(
                        "{name} must be at most {MAX_TIMEOUT_SECS}"
                    )));
                }
                _ => {}
            }
        }
        Ok(())
    }

    /// Get the default config path.
    pub fn default_path() -> PathBuf {
        Self::home_dir().join("config.toml")
    }

    /// Get the Watchtower home directory.
    pub fn home_dir() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".watchtower")
    }
}

/// Scheduler driver and due-set selection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Period of the driver's trigger.
    #[serde(default = "default_tick_secs")]
    pub tick_secs: u64,
    /// Effective interval is `min(configured interval, floor)`.
    #[serde(default = "default_platform_floor_secs")]
    pub platform_floor_secs: u64,
    /// Executions allowed to run at once across all watchers.
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent: usize,
}

fn default_tick_secs() -> u64 { 60 }
fn default_platform_floor_secs() -> u64 { 3600 }
fn default_max_concurrent() -> usize { 4 }

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            tick_secs: default_tick_secs(),
            platform_floor_secs: default_platform_floor_secs(),
            max_concurrent: default_max_concurrent(),
        }
    }
}

/// Upper bound for any configured network timeout.
pub const MAX_TIMEOUT_SECS: u64 = 3600;

/// Content fetching.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetchConfig {
    #[serde(default = "default_fetch_timeout")]
    pub timeout_secs: u64,
    #[serde(default = "default_max_redirects")]
    pub max_redirects: usize,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
    /// Retry once without certificate validation when the primary fetch
    /// fails on a certificate error. Logged at warn level every time.
    #[serde(default = "bool_true")]
    pub allow_insecure_fallback: bool,
}

fn default_fetch_timeout() -> u64 { 10 }
fn default_max_redirects() -> usize { 10 }
fn default_user_agent() -> String { format!("Watchtower/{}", env!("CARGO_PKG_VERSION")) }
fn bool_true() -> bool { true }

impl FetchConfig {
    /// Hard limit on one handler fetch: room for the primary attempt and the
    /// insecure retry, plus slack.
    pub fn deadline(&self) -> Duration {
        Duration::from_secs(self.timeout_secs.saturating_mul(2).saturating_add(5))
    }
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_fetch_timeout(),
            max_redirects: default_max_redirects(),
            user_agent: default_user_agent(),
            allow_insecure_fallback: true,
        }
    }
}

/// Notification delivery.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotifyConfig {
    #[serde(default = "default_webhook_timeout")]
    pub webhook_timeout_secs: u64,
    /// Characters of the new value included in a notification.
    #[serde(default = "default_preview_chars")]
    pub preview_chars: usize,
    /// Email transport; email channels fail when absent.
    #[serde(default)]
    pub email: Option<EmailConfig>,
}

fn default_webhook_timeout() -> u64 { 5 }
fn default_preview_chars() -> usize { 200 }

impl Default for NotifyConfig {
    fn default() -> Self {
        Self {
            webhook_timeout_secs: default_webhook_timeout(),
            preview_chars: default_preview_chars(),
            email: None,
        }
    }
}

/// Email sender configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmailConfig {
    /// Sender address.
    pub from: String,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default = "default_email_timeout")]
    pub timeout_secs: u64,
    pub transport: EmailTransport,
}

fn default_email_timeout() -> u64 { 15 }

/// How emails leave the process.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "provider", rename_all = "snake_case")]
pub enum EmailTransport {
    /// STARTTLS SMTP relay.
    Smtp {
        host: String,
        #[serde(default = "default_smtp_port")]
        port: u16,
        username: String,
        password: String,
    },
    /// Resend HTTP API. An empty key falls back to `RESEND_API_KEY`.
    Resend {
        #[serde(default)]
        api_key: String,
        #[serde(default = "default_resend_endpoint")]
        endpoint: String,
    },
}

fn default_smtp_port() -> u16 { 587 }
fn default_resend_endpoint() -> String { "https://api.resend.com/emails".into() }

/// Run history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryConfig {
    /// Captured value / error text is truncated to this many characters.
    #[serde(default = "default_result_max_chars")]
    pub result_max_chars: usize,
}

fn default_result_max_chars() -> usize { 500 }

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            result_max_chars: default_result_max_chars(),
        }
    }
}

/// SQLite record store location.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_db_path")]
    pub path: String,
}

fn default_db_path() -> String { "~/.watchtower/watchtower.db".into() }

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}
