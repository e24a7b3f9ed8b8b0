//! Scheduler driver — periodic trigger, fan-out of due watchers, shutdown.
//!
//! Each tick asks the [`DueSelector`] for due watchers and starts one
//! execution per watcher that is not already in flight. Executions run as
//! separate tokio tasks bounded by a semaphore; a panic in one is logged and
//! never reaches the loop.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Semaphore, watch};
use tokio::task::{JoinError, JoinHandle, JoinSet};
use tokio::time::MissedTickBehavior;
use watchtower_core::clock::Clock;
use watchtower_core::config::SchedulerConfig;
use watchtower_core::error::Result;
use watchtower_core::store::RecordStore;

use crate::engine::ExecutionEngine;
use crate::inflight::InFlight;
use crate::selector::DueSelector;

/// What one tick found and started.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickReport {
    pub due: usize,
    pub started: usize,
    pub skipped_in_flight: usize,
    /// Listed as due, but a run finished in the meantime.
    pub skipped_not_due: usize,
}

pub struct Scheduler {
    store: Arc<dyn RecordStore>,
    clock: Arc<dyn Clock>,
    selector: DueSelector,
    engine: Arc<ExecutionEngine>,
    inflight: InFlight,
    permits: Arc<Semaphore>,
    tick_every: Duration,
}

impl Scheduler {
    pub fn new(
        store: Arc<dyn RecordStore>,
        clock: Arc<dyn Clock>,
        engine: ExecutionEngine,
        config: &SchedulerConfig,
    ) -> Self {
        Self {
            store,
            clock,
            selector: DueSelector::new(config.platform_floor_secs),
            engine: Arc::new(engine),
            inflight: InFlight::new(),
            permits: Arc::new(Semaphore::new(config.max_concurrent.max(1))),
            tick_every: Duration::from_secs(config.tick_secs.max(1)),
        }
    }

    pub fn inflight(&self) -> &InFlight {
        &self.inflight
    }

    /// One tick, waiting for every execution it started.
    pub async fn tick(&self) -> Result<TickReport> {
        let mut tasks = JoinSet::new();
        let report = self.start_due(&mut tasks).await?;
        while let Some(joined) = tasks.join_next().await {
            log_join(joined);
        }
        Ok(report)
    }

    /// Select due watchers and spawn their executions into `tasks`.
    async fn start_due(&self, tasks: &mut JoinSet<()>) -> Result<TickReport> {
        let now = self.clock.now();
        let due = self.selector.select(self.store.as_ref(), now).await?;
        let mut report = TickReport {
            due: due.len(),
            ..TickReport::default()
        };

        for listed in due {
            let Some(guard) = self.inflight.try_claim(&listed.id) else {
                tracing::debug!("⏭️ Watcher '{}' still running, skipping", listed.name);
                report.skipped_in_flight += 1;
                continue;
            };
            // The listing may predate a run that committed and released its
            // claim since; only the stored copy under our claim is current.
            let watcher = match self.store.get_watcher(&listed.id).await {
                Ok(Some(w)) if self.selector.is_due(&w, self.clock.now()) => w,
                Ok(_) => {
                    tracing::debug!("⏭️ Watcher '{}' no longer due, skipping", listed.name);
                    report.skipped_not_due += 1;
                    continue;
                }
                Err(e) => {
                    tracing::warn!("⚠️ Failed to reload watcher '{}': {e}", listed.name);
                    continue;
                }
            };
            let engine = self.engine.clone();
            let permits = self.permits.clone();
            tasks.spawn(async move {
                let _guard = guard;
                let Ok(_permit) = permits.acquire_owned().await else {
                    return;
                };
                engine.execute(&watcher).await;
            });
            report.started += 1;
        }

        if report.due > 0 {
            tracing::info!(
                "⏰ Tick: {} due, {} started, {} still running, {} no longer due",
                report.due,
                report.started,
                report.skipped_in_flight,
                report.skipped_not_due
            );
        }
        Ok(report)
    }

    /// Run the trigger loop in the background until the handle is shut down.
    pub fn spawn(self: Arc<Self>) -> SchedulerHandle {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let task = tokio::spawn(self.run(shutdown_rx));
        SchedulerHandle {
            shutdown: shutdown_tx,
            task,
        }
    }

    async fn run(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) {
        tracing::info!(
            "⏰ Scheduler started (tick every {}s)",
            self.tick_every.as_secs()
        );
        let mut interval = tokio::time::interval(self.tick_every);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut tasks = JoinSet::new();

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    if let Err(e) = self.start_due(&mut tasks).await {
                        tracing::error!("❌ Tick failed: {e}");
                    }
                }
                Some(joined) = tasks.join_next(), if !tasks.is_empty() => log_join(joined),
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        tracing::info!("🛑 Scheduler stopping, waiting for {} execution(s)", tasks.len());
        while let Some(joined) = tasks.join_next().await {
            log_join(joined);
        }
        tracing::info!("✅ Scheduler stopped");
    }
}

fn log_join(joined: std::result::Result<(), JoinError>) {
    if let Err(e) = joined {
        if e.is_panic() {
            tracing::error!("💥 Watcher execution panicked: {e}");
        } else {
            tracing::warn!("⚠️ Watcher execution cancelled: {e}");
        }
    }
}

/// Handle to a spawned scheduler loop.
pub struct SchedulerHandle {
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl SchedulerHandle {
    /// Stop triggering, then wait for in-flight executions to finish.
    pub async fn shutdown(self) {
        let _ = self.shutdown.send(true);
        if let Err(e) = self.task.await {
            tracing::error!("❌ Scheduler loop ended abnormally: {e}");
        }
    }
}
