//! Record Store contract — the persistence seam between the scheduler and
//! whatever layer owns watcher records.

use async_trait::async_trait;

use crate::error::Result;
use crate::types::{NewRunRecord, RunRecord, Watcher};

/// Create/read/update/delete of watchers and their run history.
///
/// Implementations must make [`RecordStore::commit_run`] atomic: the run is
/// appended and the watcher's `last_run` (and, when given, `last_observed`)
/// are updated together or not at all.
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Persist a new, already validated watcher.
    async fn insert_watcher(&self, watcher: &Watcher) -> Result<()>;

    async fn get_watcher(&self, id: &str) -> Result<Option<Watcher>>;

    async fn list_watchers(&self) -> Result<Vec<Watcher>>;

    /// Watchers with `is_active == true`.
    async fn list_active_watchers(&self) -> Result<Vec<Watcher>>;

    /// Pause or resume. Returns false if the watcher does not exist.
    async fn set_active(&self, id: &str, active: bool) -> Result<bool>;

    /// Delete a watcher and its history. Returns false if it did not exist.
    async fn delete_watcher(&self, id: &str) -> Result<bool>;

    /// Append a run and advance the watcher's `last_run` to the run's
    /// `executed_at`. `new_baseline` replaces `last_observed` when `Some`.
    async fn commit_run(&self, run: NewRunRecord, new_baseline: Option<String>)
    -> Result<RunRecord>;

    /// Flip a run's notified flag from false to true.
    async fn mark_notified(&self, run_id: i64) -> Result<()>;

    /// Most recent runs first.
    async fn list_runs(&self, watcher_id: &str, limit: usize) -> Result<Vec<RunRecord>>;
}
