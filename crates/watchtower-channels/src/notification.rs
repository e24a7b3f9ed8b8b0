//! The message every channel renders, and the channel trait.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use watchtower_core::error::Result;

/// Embed color used for change notifications (Discord blurple-ish).
pub const CHANGE_COLOR: u32 = 5_814_783;

/// A change notification, rendered per channel.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct Notification {
    /// Title/summary.
    pub title: String,
    /// New observed value (already shortened for display).
    pub description: String,
    /// The observed resource.
    pub url: String,
    /// Embed color for webhook channels.
    pub color: u32,
    /// When the change was detected.
    pub timestamp: DateTime<Utc>,
}

impl Notification {
    /// Notification for a detected change on `watcher_name`.
    pub fn change(watcher_name: &str, url: &str, preview: &str, at: DateTime<Utc>) -> Self {
        Self {
            title: format!("🔔 Change detected: {watcher_name}"),
            description: preview.to_string(),
            url: url.to_string(),
            color: CHANGE_COLOR,
            timestamp: at,
        }
    }
}

/// A delivery mechanism. `target` is the channel-specific address taken from
/// the watcher (webhook URL, email recipient).
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Human-readable name for this channel (e.g., "webhook", "email").
    fn channel_name(&self) -> &str;

    /// Deliver once. No retries.
    async fn send(&self, target: &str, notification: &Notification) -> Result<()>;
}
