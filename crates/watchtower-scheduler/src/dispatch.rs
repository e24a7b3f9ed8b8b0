//! Notification dispatch — routes a change notification to each channel
//! configured on a watcher. One attempt per channel, channels independent.

use async_trait::async_trait;
use std::time::Duration;
use watchtower_channels::{EmailNotifier, Notification, Notifier, WebhookNotifier};
use watchtower_core::config::NotifyConfig;
use watchtower_core::error::{Result, WatchtowerError};
use watchtower_core::types::ChannelDescriptor;

/// Sends one notification to one channel.
#[async_trait]
pub trait Dispatch: Send + Sync {
    async fn dispatch(&self, channel: &ChannelDescriptor, notification: &Notification) -> Result<()>;
}

/// Production dispatcher backed by the webhook and email notifiers.
pub struct ChannelDispatcher {
    webhook: WebhookNotifier,
    email: Option<EmailNotifier>,
}

impl ChannelDispatcher {
    pub fn new(webhook: WebhookNotifier, email: Option<EmailNotifier>) -> Self {
        Self { webhook, email }
    }

    /// Build from the `[notify]` config section.
    pub fn from_config(config: &NotifyConfig) -> Result<Self> {
        let webhook = WebhookNotifier::new(Duration::from_secs(config.webhook_timeout_secs));
        let email = config.email.as_ref().map(EmailNotifier::new).transpose()?;
        if email.is_none() {
            tracing::debug!("📭 No email transport configured; email channels will fail");
        }
        Ok(Self::new(webhook, email))
    }

    /// Notifier responsible for `channel`, and the target it delivers to.
    fn route<'a>(&'a self, channel: &'a ChannelDescriptor) -> Result<(&'a dyn Notifier, &'a str)> {
        match channel {
            ChannelDescriptor::Webhook { url } => {
                Ok((&self.webhook as &dyn Notifier, url.as_str()))
            }
            ChannelDescriptor::Email { address } => match &self.email {
                Some(email) => Ok((email as &dyn Notifier, address.as_str())),
                None => Err(WatchtowerError::Notification(
                    "no email transport configured".into(),
                )),
            },
        }
    }
}

#[async_trait]
impl Dispatch for ChannelDispatcher {
    async fn dispatch(&self, channel: &ChannelDescriptor, notification: &Notification) -> Result<()> {
        let (notifier, target) = self.route(channel)?;
        tracing::debug!("📨 Sending via {} to {target}", notifier.channel_name());
        notifier.send(target, notification).await
    }
}

/// Dispatch to every channel in order, one attempt each.
/// Returns a Vec of (channel_name, Result).
pub async fn dispatch_all(
    dispatcher: &dyn Dispatch,
    channels: &[ChannelDescriptor],
    notification: &Notification,
) -> Vec<(String, Result<()>)> {
    let mut results = Vec::with_capacity(channels.len());
    for channel in channels {
        let result = dispatcher.dispatch(channel, notification).await;
        results.push((channel.channel_name().to_string(), result));
    }
    results
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_route_picks_notifier_matching_descriptor() {
        let email = EmailNotifier::new(&watchtower_core::config::EmailConfig {
            from: "alerts@example.com".into(),
            display_name: None,
            timeout_secs: 5,
            transport: watchtower_core::config::EmailTransport::Resend {
                api_key: "re_test".into(),
                endpoint: "http://127.0.0.1:1/emails".into(),
            },
        })
        .unwrap();
        let dispatcher = ChannelDispatcher::new(
            WebhookNotifier::new(Duration::from_secs(5)),
            Some(email),
        );
        for channel in [
            ChannelDescriptor::Webhook {
                url: "https://hooks.example.com/x".into(),
            },
            ChannelDescriptor::Email {
                address: "me@example.com".into(),
            },
        ] {
            let (notifier, target) = dispatcher.route(&channel).unwrap();
            assert_eq!(notifier.channel_name(), channel.channel_name());
            assert!(target.contains("example.com"));
        }
    }

    #[tokio::test]
    async fn test_email_without_transport_is_notification_error() {
        let dispatcher = ChannelDispatcher::from_config(&NotifyConfig::default()).unwrap();
        let notification =
            Notification::change("w", "https://example.com", "B", chrono::Utc::now());
        let results = dispatch_all(
            &dispatcher,
            &[ChannelDescriptor::Email {
                address: "me@example.com".into(),
            }],
            &notification,
        )
        .await;
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].0, "email");
        assert!(matches!(
            results[0].1,
            Err(WatchtowerError::Notification(_))
        ));
    }
}
