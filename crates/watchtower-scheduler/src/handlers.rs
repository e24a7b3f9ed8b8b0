//! Per-kind execution handlers.
//!
//! The engine owns the state machine; a handler only knows how to fetch and
//! extract for its watcher kind, plus whether a detected change deserves a
//! notification. New kinds are added by registering a handler — the driver and
//! the selector never change.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use watchtower_core::error::{Result, WatchtowerError};
use watchtower_core::types::{Watcher, WatcherConfig, WatcherKind};
use watchtower_extract::{Fetcher, extract_price, extract_text};

/// Fetching + Extracting for one watcher kind.
#[async_trait]
pub trait WatcherHandler: Send + Sync {
    fn kind(&self) -> WatcherKind;

    /// Retrieve the raw resource.
    async fn fetch(&self, watcher: &Watcher) -> Result<String>;

    /// Reduce the raw resource to a comparable snapshot.
    fn extract(&self, watcher: &Watcher, raw: &str) -> Result<String>;

    /// Whether a change to `observed` should be announced.
    fn should_notify(&self, _watcher: &Watcher, _observed: &str) -> bool {
        true
    }
}

/// Handlers keyed by watcher kind.
#[derive(Default, Clone)]
pub struct HandlerRegistry {
    handlers: HashMap<WatcherKind, Arc<dyn WatcherHandler>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with every built-in kind, sharing one fetcher.
    pub fn with_defaults(fetcher: Fetcher) -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(WebsiteMonitorHandler::new(fetcher.clone())));
        registry.register(Arc::new(PriceTrackerHandler::new(fetcher)));
        registry
    }

    /// Register (or replace) the handler for its kind.
    pub fn register(&mut self, handler: Arc<dyn WatcherHandler>) {
        self.handlers.insert(handler.kind(), handler);
    }

    pub fn get(&self, kind: WatcherKind) -> Option<Arc<dyn WatcherHandler>> {
        self.handlers.get(&kind).cloned()
    }
}

/// Text content of a page region.
pub struct WebsiteMonitorHandler {
    fetcher: Fetcher,
}

impl WebsiteMonitorHandler {
    pub fn new(fetcher: Fetcher) -> Self {
        Self { fetcher }
    }
}

#[async_trait]
impl WatcherHandler for WebsiteMonitorHandler {
    fn kind(&self) -> WatcherKind {
        WatcherKind::WebsiteMonitor
    }

    async fn fetch(&self, watcher: &Watcher) -> Result<String> {
        self.fetcher.fetch(watcher.config.url()).await
    }

    fn extract(&self, watcher: &Watcher, raw: &str) -> Result<String> {
        match &watcher.config {
            WatcherConfig::WebsiteMonitor { css_selector, .. } => extract_text(raw, css_selector),
            other => Err(mismatch(WatcherKind::WebsiteMonitor, other)),
        }
    }
}

/// Product price; announces only at or below the target when one is set.
pub struct PriceTrackerHandler {
    fetcher: Fetcher,
}

impl PriceTrackerHandler {
    pub fn new(fetcher: Fetcher) -> Self {
        Self { fetcher }
    }
}

#[async_trait]
impl WatcherHandler for PriceTrackerHandler {
    fn kind(&self) -> WatcherKind {
        WatcherKind::PriceTracker
    }

    async fn fetch(&self, watcher: &Watcher) -> Result<String> {
        self.fetcher.fetch(watcher.config.url()).await
    }

    fn extract(&self, watcher: &Watcher, raw: &str) -> Result<String> {
        match &watcher.config {
            WatcherConfig::PriceTracker { css_selector, .. } => {
                let price = extract_price(raw, css_selector.as_deref())?;
                Ok(price.to_string())
            }
            other => Err(mismatch(WatcherKind::PriceTracker, other)),
        }
    }

    fn should_notify(&self, watcher: &Watcher, observed: &str) -> bool {
        let WatcherConfig::PriceTracker {
            target_price: Some(target),
            ..
        } = &watcher.config
        else {
            return true;
        };
        observed
            .parse::<f64>()
            .is_ok_and(|price| price <= *target)
    }
}

fn mismatch(expected: WatcherKind, config: &WatcherConfig) -> WatchtowerError {
    WatchtowerError::Extraction(format!(
        "{expected} handler received a {} watcher",
        config.kind()
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use watchtower_core::config::FetchConfig;

    fn fetcher() -> Fetcher {
        Fetcher::new(&FetchConfig::default()).unwrap()
    }

    fn price_watcher(target_price: Option<f64>) -> Watcher {
        Watcher::new(
            "Lamp",
            WatcherConfig::PriceTracker {
                url: "https://shop.example.com/lamp".into(),
                css_selector: None,
                target_price,
            },
            3600,
        )
    }

    #[test]
    fn test_registry_defaults_cover_builtin_kinds() {
        let registry = HandlerRegistry::with_defaults(fetcher());
        assert!(registry.get(WatcherKind::WebsiteMonitor).is_some());
        assert!(registry.get(WatcherKind::PriceTracker).is_some());
        assert!(HandlerRegistry::new().get(WatcherKind::WebsiteMonitor).is_none());
    }

    #[test]
    fn test_website_extract_uses_configured_selector() {
        let handler = WebsiteMonitorHandler::new(fetcher());
        let w = Watcher::website_monitor("w", "https://example.com", "#status", 60);
        let html = "<body><p id='status'> All   good </p><p>noise</p></body>";
        assert_eq!(handler.extract(&w, html).unwrap(), "All good");
    }

    #[test]
    fn test_price_extract_and_target_gate() {
        let handler = PriceTrackerHandler::new(fetcher());
        let html = "<div class='price'>$1,024.50</div>";
        let w = price_watcher(Some(1000.0));
        let observed = handler.extract(&w, html).unwrap();
        assert_eq!(observed, "1024.5");
        assert!(!handler.should_notify(&w, &observed));
        assert!(handler.should_notify(&w, "999.99"));
        assert!(handler.should_notify(&price_watcher(None), &observed));
    }

    #[test]
    fn test_kind_mismatch_is_extraction_error() {
        let handler = PriceTrackerHandler::new(fetcher());
        let w = Watcher::website_monitor("w", "https://example.com", "body", 60);
        assert!(matches!(
            handler.extract(&w, "<body>1</body>"),
            Err(WatchtowerError::Extraction(_))
        ));
    }
}
