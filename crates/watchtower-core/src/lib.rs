//! # Watchtower Core
//!
//! Shared vocabulary for the Watchtower workspace: the watcher data model,
//! the error taxonomy, configuration, the injectable clock and the
//! [`RecordStore`](store::RecordStore) contract the scheduler persists through.

pub mod clock;
pub mod config;
pub mod error;
pub mod store;
pub mod types;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::WatchtowerConfig;
pub use error::{Result, WatchtowerError};
pub use store::RecordStore;
pub use types::{
    ChannelDescriptor, NewRunRecord, RunRecord, RunStatus, Watcher, WatcherConfig, WatcherKind,
};
