//! Watcher definitions and run history — the core data model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate::error::{Result, WatchtowerError};

/// Selector used by website monitors when none is configured.
pub const DEFAULT_SELECTOR: &str = "body";

/// A persisted watcher.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Watcher {
    /// Unique watcher ID.
    pub id: String,
    /// Owner reference (opaque to the core).
    pub owner: String,
    /// Human-readable name.
    pub name: String,
    /// What to observe and how.
    pub config: WatcherConfig,
    /// Where to send change notifications.
    #[serde(default)]
    pub channels: Vec<ChannelDescriptor>,
    /// Configured check interval.
    pub interval_secs: u64,
    /// Whether the scheduler should consider this watcher at all.
    pub is_active: bool,
    /// Last time a run finished (successfully or not).
    pub last_run: Option<DateTime<Utc>>,
    /// Baseline snapshot used for change comparison.
    pub last_observed: Option<String>,
    /// Created timestamp.
    pub created_at: DateTime<Utc>,
}

/// Kind-specific watcher configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum WatcherConfig {
    /// Watch the text content of a page region.
    WebsiteMonitor {
        url: String,
        #[serde(default = "default_selector")]
        css_selector: String,
    },
    /// Watch a product price, optionally alerting only at or below a target.
    PriceTracker {
        url: String,
        #[serde(default)]
        css_selector: Option<String>,
        #[serde(default)]
        target_price: Option<f64>,
    },
}

fn default_selector() -> String {
    DEFAULT_SELECTOR.into()
}

/// Discriminant of [`WatcherConfig`], used to look up execution handlers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WatcherKind {
    WebsiteMonitor,
    PriceTracker,
}

impl std::fmt::Display for WatcherKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            WatcherKind::WebsiteMonitor => write!(f, "website_monitor"),
            WatcherKind::PriceTracker => write!(f, "price_tracker"),
        }
    }
}

impl WatcherConfig {
    pub fn kind(&self) -> WatcherKind {
        match self {
            WatcherConfig::WebsiteMonitor { .. } => WatcherKind::WebsiteMonitor,
            WatcherConfig::PriceTracker { .. } => WatcherKind::PriceTracker,
        }
    }

    /// Target address being observed.
    pub fn url(&self) -> &str {
        match self {
            WatcherConfig::WebsiteMonitor { url, .. } | WatcherConfig::PriceTracker { url, .. } => {
                url
            }
        }
    }
}

/// A notification channel configured on a watcher.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ChannelDescriptor {
    /// Discord-compatible webhook URL.
    Webhook { url: String },
    /// Email recipient.
    Email { address: String },
}

impl ChannelDescriptor {
    /// Channel name for logs ("webhook" / "email").
    pub fn channel_name(&self) -> &'static str {
        match self {
            ChannelDescriptor::Webhook { .. } => "webhook",
            ChannelDescriptor::Email { .. } => "email",
        }
    }
}

impl Watcher {
    /// Create a new active website monitor.
    pub fn website_monitor(name: &str, url: &str, css_selector: &str, interval_secs: u64) -> Self {
        Self::new(
            name,
            WatcherConfig::WebsiteMonitor {
                url: url.to_string(),
                css_selector: css_selector.to_string(),
            },
            interval_secs,
        )
    }

    /// Create a new active watcher of any kind.
    pub fn new(name: &str, config: WatcherConfig, interval_secs: u64) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            owner: "default".into(),
            name: name.to_string(),
            config,
            channels: Vec::new(),
            interval_secs,
            is_active: true,
            last_run: None,
            last_observed: None,
            created_at: Utc::now(),
        }
    }

    /// Builder-style channel registration.
    pub fn with_channel(mut self, channel: ChannelDescriptor) -> Self {
        self.channels.push(channel);
        self
    }

    pub fn kind(&self) -> WatcherKind {
        self.config.kind()
    }

    /// Shape checks a watcher must pass before it is handed to the scheduler.
    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(WatchtowerError::InvalidWatcher("name is empty".into()));
        }
        if self.interval_secs == 0 {
            return Err(WatchtowerError::InvalidWatcher(
                "interval must be at least one second".into(),
            ));
        }
        let url = self.config.url();
        if !is_http_url(url) {
            return Err(WatchtowerError::InvalidWatcher(format!(
                "target '{url}' is not an http(s) URL"
            )));
        }
        match &self.config {
            WatcherConfig::WebsiteMonitor { css_selector, .. } if css_selector.trim().is_empty() => {
                return Err(WatchtowerError::InvalidWatcher("css_selector is empty".into()));
            }
            WatcherConfig::PriceTracker {
                target_price: Some(target),
                ..
            } if !target.is_finite() || *target < 0.0 => {
                return Err(WatchtowerError::InvalidWatcher(format!(
                    "target_price {target} must be a non-negative number"
                )));
            }
            _ => {}
        }
        for channel in &self.channels {
            match channel {
                ChannelDescriptor::Webhook { url } if !is_http_url(url) => {
                    return Err(WatchtowerError::InvalidWatcher(format!(
                        "webhook '{url}' is not an http(s) URL"
                    )));
                }
                ChannelDescriptor::Email { address } if !looks_like_email(address) => {
                    return Err(WatchtowerError::InvalidWatcher(format!(
                        "'{address}' is not an email address"
                    )));
                }
                _ => {}
            }
        }
        Ok(())
    }
}

fn is_http_url(s: &str) -> bool {
    match url::Url::parse(s) {
        Ok(parsed) => {
            matches!(parsed.scheme(), "http" | "https")
                && parsed.host_str().is_some_and(|h| !h.is_empty())
        }
        Err(_) => false,
    }
}

fn looks_like_email(s: &str) -> bool {
    lettre::Address::from_str(s).is_ok()
}

/// Outcome of one run.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Unchanged,
    Changed,
    Error,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Unchanged => "unchanged",
            RunStatus::Changed => "changed",
            RunStatus::Error => "error",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "unchanged" => Some(RunStatus::Unchanged),
            "changed" => Some(RunStatus::Changed),
            "error" => Some(RunStatus::Error),
            _ => None,
        }
    }
}

impl std::fmt::Display for RunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.pad(self.as_str())
    }
}

/// A run about to be appended to history.
#[derive(Debug, Clone, PartialEq)]
pub struct NewRunRecord {
    pub watcher_id: String,
    pub status: RunStatus,
    /// Captured value or error text, already truncated.
    pub result: String,
    pub executed_at: DateTime<Utc>,
}

/// An appended run. Immutable except for the one-way `notified` flag.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RunRecord {
    pub id: i64,
    pub watcher_id: String,
    pub status: RunStatus,
    pub result: String,
    pub notified: bool,
    pub executed_at: DateTime<Utc>,
}

impl RunRecord {
    pub fn from_new(id: i64, new: NewRunRecord) -> Self {
        Self {
            id,
            watcher_id: new.watcher_id,
            status: new.status,
            result: new.result,
            notified: false,
            executed_at: new.executed_at,
        }
    }
}

/// Truncate to at most `max` characters, respecting char boundaries.
pub fn truncate_chars(s: &str, max: usize) -> String {
    match s.char_indices().nth(max) {
        Some((idx, _)) => s[..idx].to_string(),
        None => s.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_toml_roundtrip_uses_kind_tag() {
        let toml_src = r#"
            name = "Docs"
            interval_secs = 600

            [config]
            kind = "website_monitor"
            url = "https://example.com"

            [[channels]]
            type = "webhook"
            url = "https://discord.com/api/webhooks/1/abc"
        "#;

        #[derive(Deserialize)]
        struct Def {
            name: String,
            interval_secs: u64,
            config: WatcherConfig,
            channels: Vec<ChannelDescriptor>,
        }

        let def: Def = toml::from_str(toml_src).unwrap();
        assert_eq!(def.name, "Docs");
        assert_eq!(def.interval_secs, 600);
        assert_eq!(def.config.kind(), WatcherKind::WebsiteMonitor);
        // Selector falls back to the whole document.
        assert_eq!(
            def.config,
            WatcherConfig::WebsiteMonitor {
                url: "https://example.com".into(),
                css_selector: "body".into(),
            }
        );
        assert_eq!(def.channels[0].channel_name(), "webhook");
    }

    #[test]
    fn test_validate_rejects_bad_shapes() {
        let ok = Watcher::website_monitor("w", "https://example.com", "h1", 60)
            .with_channel(ChannelDescriptor::Email {
                address: "me@example.com".into(),
            });
        assert!(ok.validate().is_ok());

        let bad_url = Watcher::website_monitor("w", "ftp://example.com", "h1", 60);
        assert!(bad_url.validate().is_err());

        let zero_interval = Watcher::website_monitor("w", "https://example.com", "h1", 0);
        assert!(zero_interval.validate().is_err());

        let bad_email = Watcher::website_monitor("w", "https://example.com", "h1", 60)
            .with_channel(ChannelDescriptor::Email {
                address: "nobody".into(),
            });
        assert!(bad_email.validate().is_err());

        let negative_target = Watcher::new(
            "p",
            WatcherConfig::PriceTracker {
                url: "https://shop.example.com/item".into(),
                css_selector: None,
                target_price: Some(-1.0),
            },
            60,
        );
        assert!(negative_target.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_malformed_urls_and_addresses() {
        for url in ["http://exa mple.com", "https://::::", "http://?", "https://", "example.com"] {
            let w = Watcher::website_monitor("w", url, "body", 60);
            assert!(w.validate().is_err(), "accepted url {url:?}");
        }
        for address in ["a@b.c@d.e", "me@", "@example.com", "me @example.com"] {
            let w = Watcher::website_monitor("w", "https://example.com", "body", 60)
                .with_channel(ChannelDescriptor::Email {
                    address: address.into(),
                });
            assert!(w.validate().is_err(), "accepted address {address:?}");
        }
        let hook = Watcher::website_monitor("w", "https://example.com:8443/page?q=1", "body", 60)
            .with_channel(ChannelDescriptor::Webhook {
                url: "http://[::1]:9000/hook".into(),
            });
        assert!(hook.validate().is_ok());
    }

    #[test]
    fn test_truncate_chars_is_char_safe() {
        assert_eq!(truncate_chars("héllo", 2), "hé");
        assert_eq!(truncate_chars("abc", 10), "abc");
        assert_eq!(truncate_chars("", 3), "");
    }

    #[test]
    fn test_run_status_parse() {
        for status in [RunStatus::Unchanged, RunStatus::Changed, RunStatus::Error] {
            assert_eq!(RunStatus::parse(status.as_str()), Some(status));
        }
        assert_eq!(RunStatus::parse("change_detected"), None);
    }
}
