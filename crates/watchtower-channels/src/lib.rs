//! # Watchtower Channels
//!
//! Notification channel implementations. Each [`Notifier`] performs exactly
//! one delivery attempt per call and knows nothing about run history or
//! retries.

pub mod email;
pub mod notification;
pub mod webhook;

pub use email::EmailNotifier;
pub use notification::{Notification, Notifier};
pub use webhook::WebhookNotifier;
