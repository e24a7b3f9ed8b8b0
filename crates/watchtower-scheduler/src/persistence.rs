//! SQLite-backed record store for watchers and their run history.
//! Survives restarts; the connection is shared behind a mutex.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::types::Type;
use rusqlite::{Connection, OptionalExtension, Row};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use watchtower_core::error::{Result, WatchtowerError};
use watchtower_core::store::RecordStore;
use watchtower_core::types::{NewRunRecord, RunRecord, RunStatus, Watcher};

const WATCHER_COLUMNS: &str = "id, owner, name, config, channels, interval_secs, is_active, \
                               last_run, last_observed, created_at";

fn db_err(context: &str) -> impl Fn(rusqlite::Error) -> WatchtowerError + '_ {
    move |e| WatchtowerError::Persistence(format!("{context}: {e}"))
}

/// SQLite-backed [`RecordStore`].
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Open or create the database and run migrations.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path).map_err(db_err("DB open"))?;
        Self::from_connection(conn)
    }

    /// In-memory database, mostly for tests.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(db_err("DB open"))?;
        Self::from_connection(conn)
    }

    fn from_connection(conn: Connection) -> Result<Self> {
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.migrate()?;
        Ok(store)
    }

    /// Run migrations to create tables.
    fn migrate(&self) -> Result<()> {
        self.lock()?
            .execute_batch(
                "
            -- Watchers (one row per monitored resource)
            CREATE TABLE IF NOT EXISTS watchers (
                id TEXT PRIMARY KEY,
                owner TEXT NOT NULL,
                name TEXT NOT NULL,
                kind TEXT NOT NULL,              -- 'website_monitor', 'price_tracker'
                config TEXT NOT NULL,            -- JSON, tagged by kind
                channels TEXT NOT NULL DEFAULT '[]',  -- JSON array of channel descriptors
                interval_secs INTEGER NOT NULL,
                is_active INTEGER NOT NULL DEFAULT 1,
                last_run TEXT,
                last_observed TEXT,
                created_at TEXT NOT NULL
            );

            -- Append-only run history
            CREATE TABLE IF NOT EXISTS watcher_runs (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                watcher_id TEXT NOT NULL,
                status TEXT NOT NULL,            -- 'unchanged', 'changed', 'error'
                result TEXT NOT NULL DEFAULT '',
                notified INTEGER NOT NULL DEFAULT 0,
                executed_at TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_watcher_runs_watcher
                ON watcher_runs (watcher_id, id DESC);
         ",
            )
            .map_err(db_err("Migration"))
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| WatchtowerError::Persistence(format!("connection lock poisoned: {e}")))
    }
}

fn parse_ts(idx: usize, s: &str) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|d| d.with_timezone(&Utc))
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn parse_json<T: serde::de::DeserializeOwned>(idx: usize, s: &str) -> rusqlite::Result<T> {
    serde_json::from_str(s)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn watcher_from_row(row: &Row<'_>) -> rusqlite::Result<Watcher> {
    let config: String = row.get(3)?;
    let channels: String = row.get(4)?;
    let interval_secs: i64 = row.get(5)?;
    let last_run: Option<String> = row.get(7)?;
    let created_at: String = row.get(9)?;

    Ok(Watcher {
        id: row.get(0)?,
        owner: row.get(1)?,
        name: row.get(2)?,
        config: parse_json(3, &config)?,
        channels: parse_json(4, &channels)?,
        interval_secs: interval_secs.max(0) as u64,
        is_active: row.get::<_, i32>(6)? != 0,
        last_run: last_run.as_deref().map(|s| parse_ts(7, s)).transpose()?,
        last_observed: row.get(8)?,
        created_at: parse_ts(9, &created_at)?,
    })
}

fn run_from_row(row: &Row<'_>) -> rusqlite::Result<RunRecord> {
    let status: String = row.get(2)?;
    let executed_at: String = row.get(5)?;
    let status = RunStatus::parse(&status).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            2,
            Type::Text,
            format!("unknown run status '{status}'").into(),
        )
    })?;

    Ok(RunRecord {
        id: row.get(0)?,
        watcher_id: row.get(1)?,
        status,
        result: row.get(3)?,
        notified: row.get::<_, i32>(4)? != 0,
        executed_at: parse_ts(5, &executed_at)?,
    })
}

#[async_trait]
impl RecordStore for SqliteStore {
    async fn insert_watcher(&self, watcher: &Watcher) -> Result<()> {
        let config = serde_json::to_string(&watcher.config)
            .map_err(|e| WatchtowerError::Persistence(format!("Serialize config: {e}")))?;
        let channels = serde_json::to_string(&watcher.channels)
            .map_err(|e| WatchtowerError::Persistence(format!("Serialize channels: {e}")))?;

        self.lock()?
            .execute(
                "INSERT INTO watchers
                 (id, owner, name, kind, config, channels, interval_secs, is_active,
                  last_run, last_observed, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
                rusqlite::params![
                    watcher.id,
                    watcher.owner,
                    watcher.name,
                    watcher.kind().to_string(),
                    config,
                    channels,
                    i64::try_from(watcher.interval_secs).unwrap_or(i64::MAX),
                    watcher.is_active as i32,
                    watcher.last_run.map(|t| t.to_rfc3339()),
                    watcher.last_observed,
                    watcher.created_at.to_rfc3339(),
                ],
            )
            .map_err(db_err("Insert watcher"))?;
        Ok(())
    }

    async fn get_watcher(&self, id: &str) -> Result<Option<Watcher>> {
        let conn = self.lock()?;
        conn.query_row(
            &format!("SELECT {WATCHER_COLUMNS} FROM watchers WHERE id = ?1"),
            [id],
            watcher_from_row,
        )
        .optional()
        .map_err(db_err("Get watcher"))
    }

    async fn list_watchers(&self) -> Result<Vec<Watcher>> {
        let conn = self.lock()?;
        let mut stmt = conn
            .prepare(&format!(
                "SELECT {WATCHER_COLUMNS} FROM watchers ORDER BY created_at"
            ))
            .map_err(db_err("List watchers"))?;
        let rows = stmt
            .query_map([], watcher_from_row)
            .map_err(db_err("List watchers"))?;
        rows.collect::<rusqlite::Result<Vec<_>>>()
            .map_err(db_err("List watchers"))
    }

    async fn list_active_watchers(&self) -> Result<Vec<Watcher>> {
        let conn = self.lock()?;
        let mut stmt = conn
            .prepare(&format!(
                "SELECT {WATCHER_COLUMNS} FROM watchers WHERE is_active = 1 ORDER BY created_at"
            ))
            .map_err(db_err("List active watchers"))?;
        let rows = stmt
            .query_map([], watcher_from_row)
            .map_err(db_err("List active watchers"))?;
        rows.collect::<rusqlite::Result<Vec<_>>>()
            .map_err(db_err("List active watchers"))
    }

    async fn set_active(&self, id: &str, active: bool) -> Result<bool> {
        let changed = self
            .lock()?
            .execute(
                "UPDATE watchers SET is_active = ?1 WHERE id = ?2",
                rusqlite::params![active as i32, id],
            )
            .map_err(db_err("Set active"))?;
        Ok(changed > 0)
    }

    async fn delete_watcher(&self, id: &str) -> Result<bool> {
        let mut conn = self.lock()?;
        let tx = conn.transaction().map_err(db_err("Delete watcher"))?;
        tx.execute("DELETE FROM watcher_runs WHERE watcher_id = ?1", [id])
            .map_err(db_err("Delete runs"))?;
        let deleted = tx
            .execute("DELETE FROM watchers WHERE id = ?1", [id])
            .map_err(db_err("Delete watcher"))?;
        tx.commit().map_err(db_err("Delete watcher"))?;
        Ok(deleted > 0)
    }

    async fn commit_run(
        &self,
        run: NewRunRecord,
        new_baseline: Option<String>,
    ) -> Result<RunRecord> {
        let mut conn = self.lock()?;
        let tx = conn.transaction().map_err(db_err("Commit run"))?;

        let updated = tx
            .execute(
                "UPDATE watchers
                 SET last_run = ?1, last_observed = COALESCE(?2, last_observed)
                 WHERE id = ?3",
                rusqlite::params![run.executed_at.to_rfc3339(), new_baseline, run.watcher_id],
            )
            .map_err(db_err("Update watcher"))?;
        if updated == 0 {
            return Err(WatchtowerError::Persistence(format!(
                "watcher {} not found",
                run.watcher_id
            )));
        }

        tx.execute(
            "INSERT INTO watcher_runs (watcher_id, status, result, notified, executed_at)
             VALUES (?1, ?2, ?3, 0, ?4)",
            rusqlite::params![
                run.watcher_id,
                run.status.as_str(),
                run.result,
                run.executed_at.to_rfc3339(),
            ],
        )
        .map_err(db_err("Insert run"))?;
        let id = tx.last_insert_rowid();
        tx.commit().map_err(db_err("Commit run"))?;

        Ok(RunRecord::from_new(id, run))
    }

    async fn mark_notified(&self, run_id: i64) -> Result<()> {
        let updated = self
            .lock()?
            .execute(
                "UPDATE watcher_runs SET notified = 1 WHERE id = ?1",
                [run_id],
            )
            .map_err(db_err("Mark notified"))?;
        if updated == 0 {
            return Err(WatchtowerError::Persistence(format!("run {run_id} not found")));
        }
        Ok(())
    }

    async fn list_runs(&self, watcher_id: &str, limit: usize) -> Result<Vec<RunRecord>> {
        let conn = self.lock()?;
        let mut stmt = conn
            .prepare(
                "SELECT id, watcher_id, status, result, notified, executed_at
                 FROM watcher_runs WHERE watcher_id = ?1 ORDER BY id DESC LIMIT ?2",
            )
            .map_err(db_err("List runs"))?;
        let rows = stmt
            .query_map(
                rusqlite::params![watcher_id, i64::try_from(limit).unwrap_or(i64::MAX)],
                run_from_row,
            )
            .map_err(db_err("List runs"))?;
        rows.collect::<rusqlite::Result<Vec<_>>>()
            .map_err(db_err("List runs"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use watchtower_core::types::{ChannelDescriptor, WatcherConfig};

    fn sample() -> Watcher {
        Watcher::website_monitor("Docs", "https://example.com/docs", "main", 600).with_channel(
            ChannelDescriptor::Webhook {
                url: "https://discord.com/api/webhooks/1/abc".into(),
            },
        )
    }

    #[tokio::test]
    async fn test_open_and_migrate_file() {
        let dir = std::env::temp_dir().join("watchtower-sqlite-test");
        std::fs::remove_dir_all(&dir).ok();
        let path = dir.join("nested").join("test.db");
        let store = SqliteStore::open(&path).unwrap();
        assert!(store.list_watchers().await.unwrap().is_empty());
        drop(store);
        // Reopening runs migrations again without complaint.
        let store = SqliteStore::open(&path).unwrap();
        assert!(store.list_watchers().await.unwrap().is_empty());
        std::fs::remove_dir_all(&dir).ok();
    }

    #[tokio::test]
    async fn test_watcher_roundtrip() {
        let store = SqliteStore::open_in_memory().unwrap();
        let w = sample();
        store.insert_watcher(&w).await.unwrap();
        let loaded = store.get_watcher(&w.id).await.unwrap().unwrap();
        assert_eq!(loaded, w);

        let price = Watcher::new(
            "Lamp",
            WatcherConfig::PriceTracker {
                url: "https://shop.example.com/lamp".into(),
                css_selector: None,
                target_price: Some(25.0),
            },
            3600,
        );
        store.insert_watcher(&price).await.unwrap();
        assert_eq!(store.list_watchers().await.unwrap().len(), 2);
        assert!(store.get_watcher("missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_commit_run_is_atomic_with_watcher_update() {
        let store = SqliteStore::open_in_memory().unwrap();
        let w = sample();
        store.insert_watcher(&w).await.unwrap();

        let at = Utc::now();
        let run = store
            .commit_run(
                NewRunRecord {
                    watcher_id: w.id.clone(),
                    status: RunStatus::Changed,
                    result: "A".into(),
                    executed_at: at,
                },
                Some("A".into()),
            )
            .await
            .unwrap();
        let loaded = store.get_watcher(&w.id).await.unwrap().unwrap();
        assert_eq!(loaded.last_observed.as_deref(), Some("A"));
        assert_eq!(loaded.last_run, Some(at));

        store
            .commit_run(
                NewRunRecord {
                    watcher_id: w.id.clone(),
                    status: RunStatus::Error,
                    result: "timeout".into(),
                    executed_at: at + chrono::Duration::seconds(60),
                },
                None,
            )
            .await
            .unwrap();
        let loaded = store.get_watcher(&w.id).await.unwrap().unwrap();
        assert_eq!(loaded.last_observed.as_deref(), Some("A"));

        store.mark_notified(run.id).await.unwrap();
        let runs = store.list_runs(&w.id, 20).await.unwrap();
        assert_eq!(runs.len(), 2);
        assert_eq!(runs[0].status, RunStatus::Error);
        assert!(!runs[0].notified);
        assert_eq!(runs[1].status, RunStatus::Changed);
        assert!(runs[1].notified);

        // Unknown watcher: nothing is appended.
        let err = store
            .commit_run(
                NewRunRecord {
                    watcher_id: "ghost".into(),
                    status: RunStatus::Changed,
                    result: "x".into(),
                    executed_at: at,
                },
                None,
            )
            .await
            .unwrap_err();
        assert!(matches!(err, WatchtowerError::Persistence(_)));
        assert!(store.list_runs("ghost", 10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_toggle_and_delete() {
        let store = SqliteStore::open_in_memory().unwrap();
        let w = sample();
        store.insert_watcher(&w).await.unwrap();
        assert!(store.set_active(&w.id, false).await.unwrap());
        assert!(store.list_active_watchers().await.unwrap().is_empty());
        assert!(store.set_active(&w.id, true).await.unwrap());
        assert_eq!(store.list_active_watchers().await.unwrap().len(), 1);

        assert!(store.delete_watcher(&w.id).await.unwrap());
        assert!(!store.delete_watcher(&w.id).await.unwrap());
        assert!(store.list_watchers().await.unwrap().is_empty());
    }
}
