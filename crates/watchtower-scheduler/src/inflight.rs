//! Per-watcher in-flight registry.
//!
//! At most one execution per watcher identity: a watcher still running from
//! an earlier tick is skipped instead of queued. Claims are released when the
//! guard drops, including on panic.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

/// Set of watcher IDs with an execution in progress.
#[derive(Debug, Clone, Default)]
pub struct InFlight {
    ids: Arc<Mutex<HashSet<String>>>,
}

impl InFlight {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim `id`, or `None` if it is already running.
    pub fn try_claim(&self, id: &str) -> Option<InFlightGuard> {
        let mut ids = self.ids.lock().unwrap_or_else(|e| e.into_inner());
        if !ids.insert(id.to_string()) {
            return None;
        }
        Some(InFlightGuard {
            ids: self.ids.clone(),
            id: id.to_string(),
        })
    }

    pub fn is_running(&self, id: &str) -> bool {
        self.ids
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .contains(id)
    }

    /// Number of executions currently claimed.
    pub fn len(&self) -> usize {
        self.ids.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Releases the claim on drop.
#[derive(Debug)]
pub struct InFlightGuard {
    ids: Arc<Mutex<HashSet<String>>>,
    id: String,
}

impl InFlightGuard {
    pub fn id(&self) -> &str {
        &self.id
    }
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.ids
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(&self.id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_second_claim_is_refused_until_release() {
        let inflight = InFlight::new();
        let guard = inflight.try_claim("w1").unwrap();
        assert_eq!(guard.id(), "w1");
        assert!(inflight.try_claim("w1").is_none());
        assert!(inflight.try_claim("w2").is_some()); // dropped immediately
        assert!(inflight.is_running("w1"));
        assert_eq!(inflight.len(), 1);

        drop(guard);
        assert!(inflight.is_empty());
        assert!(inflight.try_claim("w1").is_some());
    }

    #[tokio::test]
    async fn test_claim_released_when_task_panics() {
        let inflight = InFlight::new();
        let guard = inflight.try_claim("w1").unwrap();
        let handle = tokio::spawn(async move {
            let _guard = guard;
            panic!("boom");
        });
        assert!(handle.await.unwrap_err().is_panic());
        assert!(!inflight.is_running("w1"));
    }
}
