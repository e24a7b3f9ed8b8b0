//! # Watchtower Scheduler
//!
//! Background scheduling and change detection for watchers.
//!
//! ## Architecture
//! ```text
//! Scheduler (tokio interval, injected Clock)
//!   └── on tick → DueSelector (pure read over the RecordStore)
//!                   └── per due watcher, one at a time per identity (InFlight)
//!                         └── ExecutionEngine
//!                               ├── HandlerRegistry → WatcherHandler (fetch, extract)
//!                               ├── compare with baseline
//!                               ├── HistoryRecorder → RecordStore::commit_run
//!                               └── on change → Dispatch
//!                                                 ├── Webhook (embed POST)
//!                                                 └── Email (SMTP / Resend)
//! ```
//!
//! Notification delivery is at-most-once per run: a failed channel is logged
//! and the next tick's comparison is the only "retry".

pub mod dispatch;
pub mod driver;
pub mod engine;
pub mod handlers;
pub mod inflight;
pub mod persistence;
pub mod recorder;
pub mod selector;
pub mod store;

pub use dispatch::{ChannelDispatcher, Dispatch};
pub use driver::{Scheduler, SchedulerHandle, TickReport};
pub use engine::{ExecutionEngine, ExecutionOutcome, Phase};
pub use handlers::{HandlerRegistry, PriceTrackerHandler, WatcherHandler, WebsiteMonitorHandler};
pub use inflight::{InFlight, InFlightGuard};
pub use persistence::SqliteStore;
pub use recorder::HistoryRecorder;
pub use selector::DueSelector;
pub use store::MemoryStore;
