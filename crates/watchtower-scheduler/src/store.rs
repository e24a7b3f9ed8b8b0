//! In-memory record store — for tests and for embedding the scheduler
//! without a database. Nothing survives a restart.

use async_trait::async_trait;
use std::sync::{Mutex, MutexGuard};
use watchtower_core::error::{Result, WatchtowerError};
use watchtower_core::store::RecordStore;
use watchtower_core::types::{NewRunRecord, RunRecord, Watcher};

#[derive(Default)]
struct State {
    watchers: Vec<Watcher>,
    runs: Vec<RunRecord>,
    next_run_id: i64,
}

/// Process-local [`RecordStore`].
#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<State>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, State>> {
        self.state
            .lock()
            .map_err(|e| WatchtowerError::Persistence(format!("store lock poisoned: {e}")))
    }
}

#[async_trait]
impl RecordStore for MemoryStore {
    async fn insert_watcher(&self, watcher: &Watcher) -> Result<()> {
        let mut state = self.lock()?;
        if state.watchers.iter().any(|w| w.id == watcher.id) {
            return Err(WatchtowerError::Persistence(format!(
                "watcher {} already exists",
                watcher.id
            )));
        }
        state.watchers.push(watcher.clone());
        Ok(())
    }

    async fn get_watcher(&self, id: &str) -> Result<Option<Watcher>> {
        Ok(self.lock()?.watchers.iter().find(|w| w.id == id).cloned())
    }

    async fn list_watchers(&self) -> Result<Vec<Watcher>> {
        Ok(self.lock()?.watchers.clone())
    }

    async fn list_active_watchers(&self) -> Result<Vec<Watcher>> {
        Ok(self
            .lock()?
            .watchers
            .iter()
            .filter(|w| w.is_active)
            .cloned()
            .collect())
    }

    async fn set_active(&self, id: &str, active: bool) -> Result<bool> {
        let mut state = self.lock()?;
        match state.watchers.iter_mut().find(|w| w.id == id) {
            Some(w) => {
                w.is_active = active;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn delete_watcher(&self, id: &str) -> Result<bool> {
        let mut state = self.lock()?;
        let len = state.watchers.len();
        state.watchers.retain(|w| w.id != id);
        if state.watchers.len() == len {
            return Ok(false);
        }
        state.runs.retain(|r| r.watcher_id != id);
        Ok(true)
    }

    async fn commit_run(
        &self,
        run: NewRunRecord,
        new_baseline: Option<String>,
    ) -> Result<RunRecord> {
        let mut state = self.lock()?;
        let Some(watcher) = state.watchers.iter_mut().find(|w| w.id == run.watcher_id) else {
            return Err(WatchtowerError::Persistence(format!(
                "watcher {} not found",
                run.watcher_id
            )));
        };
        watcher.last_run = Some(run.executed_at);
        if let Some(baseline) = new_baseline {
            watcher.last_observed = Some(baseline);
        }

        state.next_run_id += 1;
        let record = RunRecord::from_new(state.next_run_id, run);
        state.runs.push(record.clone());
        Ok(record)
    }

    async fn mark_notified(&self, run_id: i64) -> Result<()> {
        let mut state = self.lock()?;
        match state.runs.iter_mut().find(|r| r.id == run_id) {
            Some(run) => {
                run.notified = true;
                Ok(())
            }
            None => Err(WatchtowerError::Persistence(format!("run {run_id} not found"))),
        }
    }

    async fn list_runs(&self, watcher_id: &str, limit: usize) -> Result<Vec<RunRecord>> {
        Ok(self
            .lock()?
            .runs
            .iter()
            .rev()
            .filter(|r| r.watcher_id == watcher_id)
            .take(limit)
            .cloned()
            .collect())
    }
}
