//! History recorder — appends one immutable run record per execution.

use chrono::{DateTime, Utc};
use std::sync::Arc;
use watchtower_core::error::{Result, WatchtowerError};
use watchtower_core::store::RecordStore;
use watchtower_core::types::{NewRunRecord, RunRecord, RunStatus, Watcher, truncate_chars};

/// Writes runs through the [`RecordStore`].
#[derive(Clone)]
pub struct HistoryRecorder {
    store: Arc<dyn RecordStore>,
    result_max_chars: usize,
}

impl HistoryRecorder {
    pub fn new(store: Arc<dyn RecordStore>, result_max_chars: usize) -> Self {
        Self {
            store,
            result_max_chars,
        }
    }

    /// Append a run for `watcher` and advance its `last_run` to `at`.
    /// `new_baseline` is stored untruncated; the run's `result` is truncated.
    pub async fn record(
        &self,
        watcher: &Watcher,
        status: RunStatus,
        text: &str,
        new_baseline: Option<String>,
        at: DateTime<Utc>,
    ) -> Result<RunRecord> {
        let run = NewRunRecord {
            watcher_id: watcher.id.clone(),
            status,
            result: truncate_chars(text, self.result_max_chars),
            executed_at: at,
        };
        self.store
            .commit_run(run, new_baseline)
            .await
            .map_err(|e| match e {
                WatchtowerError::Persistence(_) => e,
                other => WatchtowerError::Persistence(other.to_string()),
            })
    }

    /// Set the run's notified flag. Failures are logged, never propagated:
    /// the run itself is already recorded.
    pub async fn mark_notified(&self, run: &mut RunRecord) {
        match self.store.mark_notified(run.id).await {
            Ok(()) => run.notified = true,
            Err(e) => tracing::warn!("⚠️ Failed to mark run {} as notified: {e}", run.id),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    #[tokio::test]
    async fn test_result_truncated_baseline_kept_whole() {
        let store = Arc::new(MemoryStore::new());
        let watcher = Watcher::website_monitor("w", "https://example.com", "body", 60);
        store.insert_watcher(&watcher).await.unwrap();
        let recorder = HistoryRecorder::new(store.clone(), 5);

        let long = "abcdefghij";
        let mut run = recorder
            .record(&watcher, RunStatus::Changed, long, Some(long.into()), Utc::now())
            .await
            .unwrap();
        assert_eq!(run.result, "abcde");
        let stored = store.get_watcher(&watcher.id).await.unwrap().unwrap();
        assert_eq!(stored.last_observed.as_deref(), Some(long));

        recorder.mark_notified(&mut run).await;
        assert!(run.notified);
        assert!(store.list_runs(&watcher.id, 1).await.unwrap()[0].notified);
    }

    #[tokio::test]
    async fn test_missing_watcher_is_persistence_error() {
        let store = Arc::new(MemoryStore::new());
        let recorder = HistoryRecorder::new(store, 500);
        let watcher = Watcher::website_monitor("w", "https://example.com", "body", 60);
        let err = recorder
            .record(&watcher, RunStatus::Unchanged, "x", None, Utc::now())
            .await
            .unwrap_err();
        assert!(matches!(err, WatchtowerError::Persistence(_)));
    }
}
