//! Bounded page fetching.
//!
//! One GET per call with a hard timeout and a redirect limit. When the
//! primary client fails on a certificate problem and the insecure fallback is
//! enabled, the request is retried once with certificate validation turned
//! off. That retry is always logged; it is never silent.

use std::error::Error as _;
use std::time::Duration;

use watchtower_core::config::FetchConfig;
use watchtower_core::error::{Result, WatchtowerError};

/// Why a single attempt failed.
enum AttemptError {
    Transport(reqwest::Error),
    Status(reqwest::StatusCode),
}

/// HTTP fetcher shared by all watcher handlers.
#[derive(Debug, Clone)]
pub struct Fetcher {
    client: reqwest::Client,
    /// Present only when the insecure fallback is enabled.
    insecure: Option<reqwest::Client>,
    timeout: Duration,
}

impl Fetcher {
    pub fn new(config: &FetchConfig) -> Result<Self> {
        let timeout = Duration::from_secs(config.timeout_secs);
        let client = build_client(config, timeout, false)?;
        let insecure = if config.allow_insecure_fallback {
            Some(build_client(config, timeout, true)?)
        } else {
            None
        };
        Ok(Self {
            client,
            insecure,
            timeout,
        })
    }

    /// Fetch `url` and return the response body.
    pub async fn fetch(&self, url: &str) -> Result<String> {
        match attempt(&self.client, url).await {
            Ok(body) => Ok(body),
            Err(AttemptError::Transport(e)) if is_certificate_error(&e) => {
                let Some(insecure) = &self.insecure else {
                    return Err(self.describe(url, AttemptError::Transport(e)));
                };
                tracing::warn!(
                    "🔓 Certificate validation failed for {url} ({}); retrying WITHOUT certificate validation",
                    root_cause(&e)
                );
                attempt(insecure, url)
                    .await
                    .map_err(|e| self.describe(url, e))
            }
            Err(e) => Err(self.describe(url, e)),
        }
    }

    fn describe(&self, url: &str, err: AttemptError) -> WatchtowerError {
        let message = match err {
            AttemptError::Status(status) => format!("HTTP {status} from {url}"),
            AttemptError::Transport(e) if e.is_timeout() => format!(
                "request to {url} timed out after {}s",
                self.timeout.as_secs()
            ),
            AttemptError::Transport(e) => {
                format!("request to {url} failed: {}", root_cause(&e))
            }
        };
        WatchtowerError::Fetch(message)
    }
}

fn build_client(config: &FetchConfig, timeout: Duration, insecure: bool) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .user_agent(config.user_agent.as_str())
        .timeout(timeout)
        .redirect(reqwest::redirect::Policy::limited(config.max_redirects))
        .danger_accept_invalid_certs(insecure)
        .build()
        .map_err(|e| WatchtowerError::Config(format!("HTTP client error: {e}")))
}

async fn attempt(client: &reqwest::Client, url: &str) -> std::result::Result<String, AttemptError> {
    let resp = client
        .get(url)
        .send()
        .await
        .map_err(AttemptError::Transport)?;
    let status = resp.status();
    if !status.is_success() {
        return Err(AttemptError::Status(status));
    }
    resp.text().await.map_err(AttemptError::Transport)
}

/// reqwest does not expose TLS failures as a kind, so walk the source chain.
fn is_certificate_error(err: &reqwest::Error) -> bool {
    let mut source: Option<&dyn std::error::Error> = Some(err);
    while let Some(e) = source {
        let msg = e.to_string().to_lowercase();
        if msg.contains("certificate")
            || msg.contains("self signed")
            || msg.contains("self-signed")
            || msg.contains("unknown issuer")
            || msg.contains("unable to get local issuer")
        {
            return true;
        }
        source = e.source();
    }
    false
}

fn root_cause(err: &reqwest::Error) -> String {
    let mut current: &dyn std::error::Error = err;
    while let Some(next) = current.source() {
        current = next;
    }
    current.to_string()
}
