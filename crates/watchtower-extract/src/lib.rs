//! # Watchtower Extract
//!
//! Fetches a page and reduces it to a comparable text snapshot.
//!
//! - [`Fetcher`] — one bounded GET per call, redirects followed, optional
//!   logged fallback without certificate validation.
//! - [`extract_text`] — first element matching a CSS selector, visible text,
//!   whitespace normalized. No match is an error, never an empty snapshot.
//! - [`extract_price`] — numeric token for price trackers.

pub mod extract;
pub mod fetch;

pub use extract::{PRICE_SELECTORS, extract_price, extract_text, normalize_whitespace};
pub use fetch::Fetcher;
