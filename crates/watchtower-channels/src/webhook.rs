//! Webhook channel — Discord-compatible embed over HTTP POST.

use async_trait::async_trait;
use std::time::Duration;
use watchtower_core::error::{Result, WatchtowerError};

use crate::notification::{Notification, Notifier};

/// Posts notifications as a single embed.
#[derive(Debug, Clone)]
pub struct WebhookNotifier {
    /// Shared HTTP client (connection pooling).
    client: reqwest::Client,
    timeout: Duration,
}

impl WebhookNotifier {
    pub fn new(timeout: Duration) -> Self {
        Self {
            client: reqwest::Client::new(),
            timeout,
        }
    }

    /// JSON body sent to the webhook.
    pub fn payload(notification: &Notification) -> serde_json::Value {
        serde_json::json!({
            "embeds": [{
                "title": notification.title,
                "description": notification.description,
                "url": notification.url,
                "color": notification.color,
                "timestamp": notification.timestamp.to_rfc3339(),
            }]
        })
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    fn channel_name(&self) -> &str {
        "webhook"
    }

    async fn send(&self, url: &str, notification: &Notification) -> Result<()> {
        let resp = self
            .client
            .post(url)
            .json(&Self::payload(notification))
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| WatchtowerError::Notification(format!("Webhook send failed: {e}")))?;

        // Discord answers 204; any 2xx counts as delivered.
        if resp.status().is_success() {
            tracing::info!("✅ Webhook notification sent: {}", notification.title);
            Ok(())
        } else {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            Err(WatchtowerError::Notification(format!(
                "Webhook error {status}: {body}"
            )))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::extract::State;
    use axum::http::StatusCode;
    use axum::routing::post;
    use axum::{Json, Router};
    use std::sync::{Arc, Mutex};

    type Received = Arc<Mutex<Vec<serde_json::Value>>>;

    async fn serve(status: StatusCode) -> (String, Received) {
        let received: Received = Arc::new(Mutex::new(Vec::new()));
        let router = Router::new()
            .route(
                "/hook",
                post(
                    move |State(received): State<Received>, Json(body): Json<serde_json::Value>| async move {
                        received.lock().unwrap().push(body);
                        status
                    },
                ),
            )
            .with_state(received.clone());
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        (format!("http://{addr}/hook"), received)
    }

    fn notification() -> Notification {
        Notification::change("Docs", "https://example.com", "B", chrono::Utc::now())
    }

    #[tokio::test]
    async fn test_posts_embed_and_accepts_204() {
        let (url, received) = serve(StatusCode::NO_CONTENT).await;
        let notifier = WebhookNotifier::new(Duration::from_secs(5));
        notifier.send(&url, &notification()).await.unwrap();

        let bodies = received.lock().unwrap();
        assert_eq!(bodies.len(), 1);
        let embed = &bodies[0]["embeds"][0];
        assert_eq!(embed["title"], "🔔 Change detected: Docs");
        assert_eq!(embed["description"], "B");
        assert_eq!(embed["color"], 5_814_783);
        assert!(embed["timestamp"].as_str().is_some());
    }

    #[tokio::test]
    async fn test_server_error_is_notification_error() {
        let (url, received) = serve(StatusCode::INTERNAL_SERVER_ERROR).await;
        let notifier = WebhookNotifier::new(Duration::from_secs(5));
        let err = notifier.send(&url, &notification()).await.unwrap_err();
        assert!(matches!(err, WatchtowerError::Notification(_)));
        assert!(err.to_string().contains("500"));
        // Exactly one attempt.
        assert_eq!(received.lock().unwrap().len(), 1);
    }
}
