//! Due-set selection — which active watchers may run right now.
//! Pure read over the store; never touches the network.

use chrono::{DateTime, Utc};
use watchtower_core::error::Result;
use watchtower_core::store::RecordStore;
use watchtower_core::types::Watcher;

/// Decides due-ness using `min(configured interval, platform floor)`.
#[derive(Debug, Clone, Copy)]
pub struct DueSelector {
    platform_floor_secs: u64,
}

impl DueSelector {
    pub fn new(platform_floor_secs: u64) -> Self {
        Self {
            platform_floor_secs,
        }
    }

    /// Spacing actually enforced between two runs of `watcher`.
    pub fn effective_interval_secs(&self, watcher: &Watcher) -> u64 {
        watcher.interval_secs.min(self.platform_floor_secs)
    }

    /// Active, and either never run or at least one effective interval
    /// since the last run. A `last_run` in the future is never due.
    pub fn is_due(&self, watcher: &Watcher, now: DateTime<Utc>) -> bool {
        if !watcher.is_active {
            return false;
        }
        match watcher.last_run {
            None => true,
            Some(last) => {
                let elapsed = now.signed_duration_since(last).num_seconds();
                elapsed >= 0 && elapsed as u64 >= self.effective_interval_secs(watcher)
            }
        }
    }

    /// Active watchers that are due at `now`.
    pub async fn select(&self, store: &dyn RecordStore, now: DateTime<Utc>) -> Result<Vec<Watcher>> {
        let mut due = store.list_active_watchers().await?;
        due.retain(|w| self.is_due(w, now));
        Ok(due)
    }
}
