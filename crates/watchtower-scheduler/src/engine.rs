//! Execution engine — one run of one watcher.
//!
//! `Idle → Fetching → Extracting → Comparing → {Unchanged | Changed}
//!  → Persisting → NotifyIfConfigured → Idle`, with `Error` reachable from
//! `Fetching` and `Extracting`. Errors skip straight to `Persisting`; they
//! never change the baseline and never notify.
//!
//! The engine keeps no state between runs beyond what it persists.

use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use watchtower_channels::Notification;
use watchtower_core::clock::Clock;
use watchtower_core::error::{Result, WatchtowerError};
use watchtower_core::types::{RunRecord, RunStatus, Watcher, truncate_chars};

use crate::dispatch::{Dispatch, dispatch_all};
use crate::handlers::{HandlerRegistry, WatcherHandler};
use crate::recorder::HistoryRecorder;

/// States of a single run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    Fetching,
    Extracting,
    Comparing,
    Unchanged,
    Changed,
    Error,
    Persisting,
    NotifyIfConfigured,
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Phase::Idle => "idle",
            Phase::Fetching => "fetching",
            Phase::Extracting => "extracting",
            Phase::Comparing => "comparing",
            Phase::Unchanged => "unchanged",
            Phase::Changed => "changed",
            Phase::Error => "error",
            Phase::Persisting => "persisting",
            Phase::NotifyIfConfigured => "notify_if_configured",
        };
        f.write_str(name)
    }
}

/// What a run left behind.
#[derive(Debug, Clone, PartialEq)]
pub enum ExecutionOutcome {
    /// The run was persisted (with its final notified flag).
    Recorded(RunRecord),
    /// Persisting failed; nothing else was attempted.
    PersistFailed(String),
}

impl ExecutionOutcome {
    pub fn run(&self) -> Option<&RunRecord> {
        match self {
            ExecutionOutcome::Recorded(run) => Some(run),
            ExecutionOutcome::PersistFailed(_) => None,
        }
    }
}

/// Composes handlers, recorder and dispatcher into the run state machine.
pub struct ExecutionEngine {
    handlers: HandlerRegistry,
    recorder: HistoryRecorder,
    dispatcher: Arc<dyn Dispatch>,
    clock: Arc<dyn Clock>,
    /// Upper bound on a handler's fetch, on top of the fetcher's own timeout.
    fetch_deadline: Duration,
    /// Characters of the new value put into notifications.
    preview_chars: usize,
}

impl ExecutionEngine {
    pub fn new(
        handlers: HandlerRegistry,
        recorder: HistoryRecorder,
        dispatcher: Arc<dyn Dispatch>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            handlers,
            recorder,
            dispatcher,
            clock,
            fetch_deadline: Duration::from_secs(30),
            preview_chars: 200,
        }
    }

    pub fn with_fetch_deadline(mut self, deadline: Duration) -> Self {
        self.fetch_deadline = deadline;
        self
    }

    pub fn with_preview_chars(mut self, chars: usize) -> Self {
        self.preview_chars = chars;
        self
    }

    /// Run the state machine once for `watcher`. Never fails: fetch and
    /// extraction errors become `error` runs, persistence errors are logged.
    pub async fn execute(&self, watcher: &Watcher) -> ExecutionOutcome {
        let observed = match self.handlers.get(watcher.kind()) {
            Some(handler) => self.observe(handler.as_ref(), watcher).await,
            None => Err(WatchtowerError::Extraction(format!(
                "no handler registered for kind {}",
                watcher.kind()
            ))),
        };

        self.transition(watcher, Phase::Comparing);
        let (status, text, new_baseline) = match &observed {
            Err(e) => {
                self.transition(watcher, Phase::Error);
                tracing::warn!(
                    error_kind = e.kind(),
                    "⚠️ Watcher '{}' ({}) failed: {e}",
                    watcher.name,
                    watcher.id
                );
                (RunStatus::Error, e.to_string(), None)
            }
            Ok(text) if watcher.last_observed.as_deref() == Some(text.as_str()) => {
                self.transition(watcher, Phase::Unchanged);
                (RunStatus::Unchanged, text.clone(), None)
            }
            // No baseline yet also lands here: establishing it counts as a change.
            Ok(text) => {
                self.transition(watcher, Phase::Changed);
                (RunStatus::Changed, text.clone(), Some(text.clone()))
            }
        };

        self.transition(watcher, Phase::Persisting);
        let now = self.clock.now();
        let mut run = match self
            .recorder
            .record(watcher, status, &text, new_baseline, now)
            .await
        {
            Ok(run) => run,
            Err(e) => {
                tracing::error!(
                    "💾 Failed to persist run for watcher '{}' ({}): {e}",
                    watcher.name,
                    watcher.id
                );
                self.transition(watcher, Phase::Idle);
                return ExecutionOutcome::PersistFailed(e.to_string());
            }
        };

        if status == RunStatus::Changed {
            self.transition(watcher, Phase::NotifyIfConfigured);
            let handler = self.handlers.get(watcher.kind());
            let wanted = handler.is_some_and(|h| h.should_notify(watcher, &text));
            if wanted && self.notify(watcher, &text, now).await {
                self.recorder.mark_notified(&mut run).await;
            }
        }

        tracing::info!(
            "🔍 Watcher '{}' → {} (notified: {})",
            watcher.name,
            run.status,
            run.notified
        );
        self.transition(watcher, Phase::Idle);
        ExecutionOutcome::Recorded(run)
    }

    /// Fetching → Extracting.
    async fn observe(&self, handler: &dyn WatcherHandler, watcher: &Watcher) -> Result<String> {
        self.transition(watcher, Phase::Fetching);
        let raw = match tokio::time::timeout(self.fetch_deadline, handler.fetch(watcher)).await {
            Ok(result) => result?,
            Err(_) => {
                return Err(WatchtowerError::Fetch(format!(
                    "fetching {} exceeded {:?}",
                    watcher.config.url(),
                    self.fetch_deadline
                )));
            }
        };
        self.transition(watcher, Phase::Extracting);
        handler.extract(watcher, &raw)
    }

    /// One attempt per configured channel. True if any channel succeeded.
    async fn notify(&self, watcher: &Watcher, text: &str, at: DateTime<Utc>) -> bool {
        if watcher.channels.is_empty() {
            return false;
        }
        let notification = Notification::change(
            &watcher.name,
            watcher.config.url(),
            &truncate_chars(text, self.preview_chars),
            at,
        );
        let results = dispatch_all(self.dispatcher.as_ref(), &watcher.channels, &notification).await;

        let mut any_ok = false;
        for (channel, result) in results {
            match result {
                Ok(()) => any_ok = true,
                Err(e) => tracing::warn!(
                    "⚠️ {channel} notification for watcher '{}' failed: {e}",
                    watcher.name
                ),
            }
        }
        any_ok
    }

    fn transition(&self, watcher: &Watcher, phase: Phase) {
        tracing::debug!(watcher_id = %watcher.id, "→ {phase}");
    }
}
