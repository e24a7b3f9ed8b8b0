//! Email channel — SMTP (async lettre) or the Resend HTTP API.

use async_trait::async_trait;
use lettre::message::header::ContentType;
use lettre::message::Mailbox;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message as LettreMessage, Tokio1Executor};
use std::time::Duration;
use watchtower_core::config::{EmailConfig, EmailTransport};
use watchtower_core::error::{Result, WatchtowerError};

use crate::notification::{Notification, Notifier};

/// A rendered email.
#[derive(Debug, Clone, PartialEq)]
pub struct EmailMessage {
    pub to: String,
    pub subject: String,
    pub html_body: String,
}

impl EmailMessage {
    pub fn render(to: &str, notification: &Notification) -> Self {
        let html_body = format!(
            "<h2>{title}</h2>\
             <p><a href=\"{url}\">{url}</a></p>\
             <pre style=\"white-space: pre-wrap\">{description}</pre>\
             <p><small>Detected at {at}</small></p>",
            title = escape_html(&notification.title),
            url = escape_html(&notification.url),
            description = escape_html(&notification.description),
            at = notification.timestamp.format("%Y-%m-%d %H:%M:%S UTC"),
        );
        Self {
            to: to.to_string(),
            subject: notification.title.clone(),
            html_body,
        }
    }
}

enum Sender {
    Smtp(AsyncSmtpTransport<Tokio1Executor>),
    Resend {
        client: reqwest::Client,
        api_key: String,
        endpoint: String,
    },
}

/// Sends change notifications by email.
pub struct EmailNotifier {
    from: Mailbox,
    sender: Sender,
}

impl EmailNotifier {
    pub fn new(config: &EmailConfig) -> Result<Self> {
        let from_name = config.display_name.as_deref().unwrap_or("Watchtower");
        let from: Mailbox = format!("{from_name} <{}>", config.from)
            .parse()
            .map_err(|e| WatchtowerError::Config(format!("Invalid from: {e}")))?;
        let timeout = Duration::from_secs(config.timeout_secs);

        let sender = match &config.transport {
            EmailTransport::Smtp {
                host,
                port,
                username,
                password,
            } => {
                let creds = Credentials::new(username.clone(), password.clone());
                let mailer = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(host)
                    .map_err(|e| WatchtowerError::Config(format!("SMTP relay: {e}")))?
                    .port(*port)
                    .credentials(creds)
                    .timeout(Some(timeout))
                    .build();
                Sender::Smtp(mailer)
            }
            EmailTransport::Resend { api_key, endpoint } => {
                let api_key = if api_key.is_empty() {
                    std::env::var("RESEND_API_KEY").map_err(|_| {
                        WatchtowerError::Config(
                            "Resend transport needs api_key or RESEND_API_KEY".into(),
                        )
                    })?
                } else {
                    api_key.clone()
                };
                let client = reqwest::Client::builder()
                    .timeout(timeout)
                    .build()
                    .map_err(|e| WatchtowerError::Config(format!("HTTP client error: {e}")))?;
                Sender::Resend {
                    client,
                    api_key,
                    endpoint: endpoint.clone(),
                }
            }
        };

        Ok(Self { from, sender })
    }

    async fn send_smtp(
        &self,
        mailer: &AsyncSmtpTransport<Tokio1Executor>,
        message: &EmailMessage,
    ) -> Result<()> {
        let to: Mailbox = message
            .to
            .parse()
            .map_err(|e| WatchtowerError::Notification(format!("Invalid to: {e}")))?;
        let email = LettreMessage::builder()
            .from(self.from.clone())
            .to(to)
            .subject(message.subject.as_str())
            .header(ContentType::TEXT_HTML)
            .body(message.html_body.clone())
            .map_err(|e| WatchtowerError::Notification(format!("Build email: {e}")))?;

        mailer
            .send(email)
            .await
            .map_err(|e| WatchtowerError::Notification(format!("SMTP send: {e}")))?;
        Ok(())
    }

    async fn send_resend(
        &self,
        client: &reqwest::Client,
        api_key: &str,
        endpoint: &str,
        message: &EmailMessage,
    ) -> Result<()> {
        let resp = client
            .post(endpoint)
            .bearer_auth(api_key)
            .json(&serde_json::json!({
                "from": self.from.to_string(),
                "to": [message.to],
                "subject": message.subject,
                "html": message.html_body,
            }))
            .send()
            .await
            .map_err(|e| WatchtowerError::Notification(format!("Resend send failed: {e}")))?;

        if resp.status().is_success() {
            Ok(())
        } else {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            Err(WatchtowerError::Notification(format!(
                "Resend API error {status}: {body}"
            )))
        }
    }
}

#[async_trait]
impl Notifier for EmailNotifier {
    fn channel_name(&self) -> &str {
        "email"
    }

    async fn send(&self, to: &str, notification: &Notification) -> Result<()> {
        let message = EmailMessage::render(to, notification);
        match &self.sender {
            Sender::Smtp(mailer) => self.send_smtp(mailer, &message).await?,
            Sender::Resend {
                client,
                api_key,
                endpoint,
            } => self.send_resend(client, api_key, endpoint, &message).await?,
        }
        tracing::info!("📤 Email sent to: {to}");
        Ok(())
    }
}

fn escape_html(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::{HeaderMap, StatusCode};
    use axum::routing::post;
    use axum::{Json, Router};
    use std::sync::{Arc, Mutex};

    fn notification() -> Notification {
        Notification::change(
            "Shop <sale>",
            "https://shop.example.com/?a=1&b=2",
            "Price now 10 & falling",
            chrono::Utc::now(),
        )
    }

    #[test]
    fn test_render_escapes_html() {
        let msg = EmailMessage::render("me@example.com", &notification());
        assert_eq!(msg.to, "me@example.com");
        assert_eq!(msg.subject, "🔔 Change detected: Shop <sale>");
        assert!(msg.html_body.contains("Shop &lt;sale&gt;"));
        assert!(msg.html_body.contains("10 &amp; falling"));
        assert!(msg.html_body.contains("a=1&amp;b=2"));
    }

    #[tokio::test]
    async fn test_resend_transport_posts_with_bearer() {
        let seen: Arc<Mutex<Vec<(String, serde_json::Value)>>> = Arc::new(Mutex::new(Vec::new()));
        let seen_handler = seen.clone();
        let router = Router::new().route(
            "/emails",
            post(move |headers: HeaderMap, Json(body): Json<serde_json::Value>| {
                let seen = seen_handler.clone();
                async move {
                    let auth = headers
                        .get("authorization")
                        .and_then(|v| v.to_str().ok())
                        .unwrap_or_default()
                        .to_string();
                    seen.lock().unwrap().push((auth, body));
                    (StatusCode::OK, "{\"id\":\"1\"}")
                }
            }),
        );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });

        let notifier = EmailNotifier::new(&EmailConfig {
            from: "alerts@example.com".into(),
            display_name: None,
            timeout_secs: 5,
            transport: EmailTransport::Resend {
                api_key: "re_test".into(),
                endpoint: format!("http://{addr}/emails"),
            },
        })
        .unwrap();
        notifier.send("me@example.com", &notification()).await.unwrap();

        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].0, "Bearer re_test");
        assert_eq!(seen[0].1["to"][0], "me@example.com");
        assert_eq!(seen[0].1["from"], "Watchtower <alerts@example.com>");
    }

    #[test]
    fn test_invalid_from_is_config_error() {
        let result = EmailNotifier::new(&EmailConfig {
            from: "not an address".into(),
            display_name: None,
            timeout_secs: 5,
            transport: EmailTransport::Resend {
                api_key: "re_test".into(),
                endpoint: "http://127.0.0.1:1/emails".into(),
            },
        });
        assert!(matches!(result, Err(WatchtowerError::Config(_))));
    }
}
