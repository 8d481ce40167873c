//! Append-only channel store backed by SQLite.
//!
//! Each reporting channel owns one append-only table, keyed by an
//! auto-incrementing row id with a UTC timestamp column and channel-specific
//! payload columns. Records are immutable once written; "latest" is a pure
//! read ordered by row id, so insertion order - not a client-supplied clock -
//! decides which record is most recent.
//!
//! # Concurrency
//!
//! The SQLite connection is owned by a single dedicated worker thread. Async
//! callers submit closures over an mpsc channel and await the result on a
//! oneshot; every operation carries a bounded timeout and surfaces
//! [`StoreError::Unavailable`] instead of hanging. Because each append is one
//! atomic insert executed on that thread, reads can never observe a
//! partially written record.

use std::path::Path;
use std::sync::{mpsc, Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use thiserror::Error;
use tokio::sync::oneshot;
use tracing::{debug, error, info};

use crate::types::{
    ActivityRecord, Channel, HeartRateRecord, LockState, PhoneStatusRecord, RecordId,
};

/// Upper bound on any single store operation.
const STORE_TIMEOUT: Duration = Duration::from_secs(5);

/// Errors that can occur in the channel store.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// The backing store cannot be reached, the write failed, or the
    /// operation timed out. Safe for the caller to retry.
    #[error("channel store unavailable: {0}")]
    Unavailable(String),

    /// The channel's table is missing. This is internal misconfiguration,
    /// not something a reporter can trigger.
    #[error("unknown channel: {0}")]
    UnknownChannel(String),

    /// A stored row could not be decoded back into a record.
    #[error("corrupt record: {0}")]
    Corrupt(String),
}

/// A record kind that lives in exactly one channel table.
///
/// The three channels share this one abstraction instead of duplicating the
/// append/latest logic per record kind; only the SQL and the row mapping
/// differ.
pub trait ChannelRecord: Send + Sized + 'static {
    /// The channel this record kind belongs to.
    const CHANNEL: Channel;

    /// When the reporter created this record.
    fn created_at(&self) -> DateTime<Utc>;

    /// Inserts the record as one atomic write, returning the new row id.
    fn insert(&self, conn: &Connection) -> Result<i64, StoreError>;

    /// Reads the most recently appended record, if any.
    fn latest(conn: &Connection) -> Result<Option<Self>, StoreError>;
}

type StoreTask = Box<dyn FnOnce(&mut Connection) + Send + 'static>;

enum StoreCommand {
    Execute(StoreTask),
    Shutdown,
}

struct StoreInner {
    sender: mpsc::Sender<StoreCommand>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl Drop for StoreInner {
    fn drop(&mut self) {
        let mut guard = match self.worker.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };

        if let Some(handle) = guard.take() {
            if let Err(err) = self.sender.send(StoreCommand::Shutdown) {
                error!(error = %err, "Failed to send shutdown to store worker");
            }
            if let Err(join_err) = handle.join() {
                error!(error = ?join_err, "Failed to join store worker");
            }
        }
    }
}

/// Handle to the channel store. Cheap to clone; all clones share the same
/// worker thread and connection.
#[derive(Clone)]
pub struct Store {
    inner: Arc<StoreInner>,
}

impl std::fmt::Debug for Store {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Store").finish_non_exhaustive()
    }
}

impl Store {
    /// Opens (creating if needed) the store at the given path.
    ///
    /// The schema for all three channel tables is provisioned idempotently
    /// before the store accepts operations.
    pub fn open(db_path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let db_path = db_path.as_ref().to_path_buf();

        if let Some(parent) = db_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|err| {
                StoreError::Unavailable(format!(
                    "failed to create store directory {}: {err}",
                    parent.display()
                ))
            })?;
        }

        info!(path = %db_path.display(), "Opening channel store");
        Self::spawn(move || Connection::open(&db_path))
    }

    /// Opens an in-memory store. Used by tests.
    pub fn in_memory() -> Result<Self, StoreError> {
        Self::spawn(Connection::open_in_memory)
    }

    fn spawn<F>(open: F) -> Result<Self, StoreError>
    where
        F: FnOnce() -> rusqlite::Result<Connection> + Send + 'static,
    {
        let (command_tx, command_rx) = mpsc::channel::<StoreCommand>();
        let (ready_tx, ready_rx) = mpsc::channel::<Result<(), StoreError>>();

        let worker = thread::Builder::new()
            .name("presence-store".into())
            .spawn(move || {
                let mut conn = match open() {
                    Ok(conn) => conn,
                    Err(err) => {
                        let _ = ready_tx.send(Err(StoreError::Unavailable(format!(
                            "failed to open channel store: {err}"
                        ))));
                        return;
                    }
                };

                if let Err(err) = provision(&conn) {
                    let _ = ready_tx.send(Err(err));
                    return;
                }

                if ready_tx.send(Ok(())).is_err() {
                    return;
                }

                while let Ok(command) = command_rx.recv() {
                    match command {
                        StoreCommand::Execute(task) => task(&mut conn),
                        StoreCommand::Shutdown => break,
                    }
                }

                debug!("Store worker stopped");
            })
            .map_err(|err| {
                StoreError::Unavailable(format!("failed to spawn store worker: {err}"))
            })?;

        match ready_rx.recv() {
            Ok(Ok(())) => Ok(Self {
                inner: Arc::new(StoreInner {
                    sender: command_tx,
                    worker: Mutex::new(Some(worker)),
                }),
            }),
            Ok(Err(err)) => Err(err),
            Err(_) => Err(StoreError::Unavailable(
                "store worker exited during startup".to_string(),
            )),
        }
    }

    /// Appends one record as a single atomic, durable write.
    pub async fn append<R: ChannelRecord>(&self, record: R) -> Result<RecordId, StoreError> {
        self.execute(move |conn| record.insert(conn).map(RecordId))
            .await
    }

    /// Returns the most recently appended record for `R`'s channel.
    pub async fn latest<R: ChannelRecord>(&self) -> Result<Option<R>, StoreError> {
        self.execute(|conn| R::latest(conn)).await
    }

    /// Runs an operation on the store worker thread with a bounded timeout.
    async fn execute<T, F>(&self, op: F) -> Result<T, StoreError>
    where
        T: Send + 'static,
        F: FnOnce(&Connection) -> Result<T, StoreError> + Send + 'static,
    {
        let (reply_tx, reply_rx) = oneshot::channel();
        let task: StoreTask = Box::new(move |conn| {
            let _ = reply_tx.send(op(conn));
        });

        self.inner
            .sender
            .send(StoreCommand::Execute(task))
            .map_err(|_| StoreError::Unavailable("store worker has shut down".to_string()))?;

        match tokio::time::timeout(STORE_TIMEOUT, reply_rx).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(StoreError::Unavailable(
                "store worker dropped the operation".to_string(),
            )),
            Err(_) => Err(StoreError::Unavailable(format!(
                "operation timed out after {STORE_TIMEOUT:?}"
            ))),
        }
    }
}

/// Idempotent schema provisioning for the three channel tables.
///
/// WAL keeps concurrent reads cheap; synchronous=FULL makes an acknowledged
/// append durable across power loss.
fn provision(conn: &Connection) -> Result<(), StoreError> {
    conn.pragma_update(None, "journal_mode", "WAL")
        .and_then(|()| conn.pragma_update(None, "synchronous", "FULL"))
        .map_err(|err| StoreError::Unavailable(format!("failed to configure store: {err}")))?;

    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS activity (
             id INTEGER PRIMARY KEY AUTOINCREMENT,
             created_at TEXT NOT NULL,
             active_process TEXT,
             active_title TEXT,
             apps_json TEXT NOT NULL
         );

         CREATE TABLE IF NOT EXISTS heart_rate (
             id INTEGER PRIMARY KEY AUTOINCREMENT,
             created_at TEXT NOT NULL,
             rate INTEGER NOT NULL,
             source TEXT
         );

         CREATE TABLE IF NOT EXISTS phone_status (
             id INTEGER PRIMARY KEY AUTOINCREMENT,
             created_at TEXT NOT NULL,
             locked TEXT NOT NULL,
             battery INTEGER,
             app TEXT,
             source TEXT
         );",
    )
    .map_err(|err| StoreError::Unavailable(format!("failed to provision schema: {err}")))
}

/// Maps a rusqlite error, distinguishing a missing channel table from
/// general unavailability.
fn map_sqlite(channel: Channel, err: rusqlite::Error) -> StoreError {
    if err.to_string().contains("no such table") {
        StoreError::UnknownChannel(channel.name().to_string())
    } else {
        StoreError::Unavailable(err.to_string())
    }
}

fn parse_created_at(raw: &str) -> Result<DateTime<Utc>, StoreError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|err| StoreError::Corrupt(format!("invalid created_at '{raw}': {err}")))
}

impl ChannelRecord for ActivityRecord {
    const CHANNEL: Channel = Channel::Activity;

    fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    fn insert(&self, conn: &Connection) -> Result<i64, StoreError> {
        let apps_json = serde_json::to_string(&self.open_apps)
            .map_err(|err| StoreError::Corrupt(format!("failed to serialize apps: {err}")))?;

        conn.execute(
            "INSERT INTO activity (created_at, active_process, active_title, apps_json)
             VALUES (?1, ?2, ?3, ?4)",
            params![
                self.created_at.to_rfc3339(),
                self.active_process,
                self.active_title,
                apps_json,
            ],
        )
        .map_err(|err| map_sqlite(Self::CHANNEL, err))?;

        Ok(conn.last_insert_rowid())
    }

    fn latest(conn: &Connection) -> Result<Option<Self>, StoreError> {
        let row: Option<(String, Option<String>, Option<String>, String)> = conn
            .query_row(
                "SELECT created_at, active_process, active_title, apps_json
                 FROM activity ORDER BY id DESC LIMIT 1",
                [],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?)),
            )
            .optional()
            .map_err(|err| map_sqlite(Self::CHANNEL, err))?;

        let Some((created_at, active_process, active_title, apps_json)) = row else {
            return Ok(None);
        };

        let open_apps = serde_json::from_str(&apps_json)
            .map_err(|err| StoreError::Corrupt(format!("invalid apps_json: {err}")))?;

        Ok(Some(Self {
            created_at: parse_created_at(&created_at)?,
            active_process,
            active_title,
            open_apps,
        }))
    }
}

impl ChannelRecord for HeartRateRecord {
    const CHANNEL: Channel = Channel::HeartRate;

    fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    fn insert(&self, conn: &Connection) -> Result<i64, StoreError> {
        conn.execute(
            "INSERT INTO heart_rate (created_at, rate, source) VALUES (?1, ?2, ?3)",
            params![self.created_at.to_rfc3339(), self.rate, self.source],
        )
        .map_err(|err| map_sqlite(Self::CHANNEL, err))?;

        Ok(conn.last_insert_rowid())
    }

    fn latest(conn: &Connection) -> Result<Option<Self>, StoreError> {
        let row: Option<(String, i64, Option<String>)> = conn
            .query_row(
                "SELECT created_at, rate, source FROM heart_rate ORDER BY id DESC LIMIT 1",
                [],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
            )
            .optional()
            .map_err(|err| map_sqlite(Self::CHANNEL, err))?;

        let Some((created_at, rate, source)) = row else {
            return Ok(None);
        };

        Ok(Some(Self {
            created_at: parse_created_at(&created_at)?,
            rate,
            source,
        }))
    }
}

impl ChannelRecord for PhoneStatusRecord {
    const CHANNEL: Channel = Channel::PhoneStatus;

    fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    fn insert(&self, conn: &Connection) -> Result<i64, StoreError> {
        conn.execute(
            "INSERT INTO phone_status (created_at, locked, battery, app, source)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                self.created_at.to_rfc3339(),
                self.locked.as_str(),
                self.battery,
                self.app,
                self.source,
            ],
        )
        .map_err(|err| map_sqlite(Self::CHANNEL, err))?;

        Ok(conn.last_insert_rowid())
    }

    fn latest(conn: &Connection) -> Result<Option<Self>, StoreError> {
        let row: Option<(String, String, Option<u8>, Option<String>, Option<String>)> = conn
            .query_row(
                "SELECT created_at, locked, battery, app, source
                 FROM phone_status ORDER BY id DESC LIMIT 1",
                [],
                |row| {
                    Ok((
                        row.get(0)?,
                        row.get(1)?,
                        row.get(2)?,
                        row.get(3)?,
                        row.get(4)?,
                    ))
                },
            )
            .optional()
            .map_err(|err| map_sqlite(Self::CHANNEL, err))?;

        let Some((created_at, locked, battery, app, source)) = row else {
            return Ok(None);
        };

        let locked = LockState::from_name(&locked)
            .ok_or_else(|| StoreError::Corrupt(format!("invalid lock state '{locked}'")))?;

        Ok(Some(Self {
            created_at: parse_created_at(&created_at)?,
            locked,
            battery,
            app,
            source,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::OpenApp;

    fn at(s: &str) -> DateTime<Utc> {
        s.parse().unwrap()
    }

    fn activity_record(created_at: &str) -> ActivityRecord {
        ActivityRecord {
            created_at: at(created_at),
            active_process: Some("code.exe".to_string()),
            active_title: Some("main.rs".to_string()),
            open_apps: vec![OpenApp {
                process: "code.exe".to_string(),
                title: "main.rs".to_string(),
            }],
        }
    }

    fn heart_rate_record(rate: i64) -> HeartRateRecord {
        HeartRateRecord {
            created_at: at("2024-01-01T10:00:00Z"),
            rate,
            source: Some("watch".to_string()),
        }
    }

    #[tokio::test]
    async fn latest_is_none_before_any_append() {
        let store = Store::in_memory().unwrap();
        assert_eq!(store.latest::<ActivityRecord>().await.unwrap(), None);
        assert_eq!(store.latest::<HeartRateRecord>().await.unwrap(), None);
        assert_eq!(store.latest::<PhoneStatusRecord>().await.unwrap(), None);
    }

    #[tokio::test]
    async fn activity_append_round_trips() {
        let store = Store::in_memory().unwrap();
        let record = activity_record("2024-01-01T10:00:00Z");

        let id = store.append(record.clone()).await.unwrap();
        assert_eq!(id, RecordId(1));

        let latest = store.latest::<ActivityRecord>().await.unwrap().unwrap();
        assert_eq!(latest, record);
    }

    #[tokio::test]
    async fn heart_rate_append_round_trips() {
        let store = Store::in_memory().unwrap();
        let record = heart_rate_record(72);

        store.append(record.clone()).await.unwrap();

        let latest = store.latest::<HeartRateRecord>().await.unwrap().unwrap();
        assert_eq!(latest, record);
    }

    #[tokio::test]
    async fn phone_status_append_round_trips() {
        let store = Store::in_memory().unwrap();
        let record = PhoneStatusRecord {
            created_at: at("2024-01-01T10:00:00Z"),
            locked: LockState::Unlocked,
            battery: Some(80),
            app: Some("Safari".to_string()),
            source: Some("iphone".to_string()),
        };

        store.append(record.clone()).await.unwrap();

        let latest = store.latest::<PhoneStatusRecord>().await.unwrap().unwrap();
        assert_eq!(latest, record);
    }

    #[tokio::test]
    async fn latest_returns_most_recent_append() {
        let store = Store::in_memory().unwrap();

        let first = store.append(heart_rate_record(60)).await.unwrap();
        let second = store.append(heart_rate_record(75)).await.unwrap();
        assert!(second > first);

        let latest = store.latest::<HeartRateRecord>().await.unwrap().unwrap();
        assert_eq!(latest.rate, 75);
    }

    #[tokio::test]
    async fn insertion_order_breaks_created_at_ties() {
        // Two reporters with identical clocks: the later insert wins.
        let store = Store::in_memory().unwrap();

        store.append(heart_rate_record(60)).await.unwrap();
        store.append(heart_rate_record(75)).await.unwrap();

        let latest = store.latest::<HeartRateRecord>().await.unwrap().unwrap();
        assert_eq!(latest.rate, 75);
    }

    #[tokio::test]
    async fn channels_are_independent() {
        let store = Store::in_memory().unwrap();

        store.append(heart_rate_record(72)).await.unwrap();

        assert_eq!(store.latest::<ActivityRecord>().await.unwrap(), None);
        assert_eq!(store.latest::<PhoneStatusRecord>().await.unwrap(), None);
        assert!(store.latest::<HeartRateRecord>().await.unwrap().is_some());
    }

    #[tokio::test]
    async fn concurrent_appends_each_produce_a_distinct_record() {
        let store = Store::in_memory().unwrap();

        let (a, b) = tokio::join!(
            store.append(heart_rate_record(60)),
            store.append(heart_rate_record(75)),
        );
        let a = a.unwrap();
        let b = b.unwrap();
        assert_ne!(a, b);

        // Whichever insert landed second is the latest; never a merge.
        let latest = store.latest::<HeartRateRecord>().await.unwrap().unwrap();
        let winner = if a > b { 60 } else { 75 };
        assert_eq!(latest.rate, winner);
    }

    #[tokio::test]
    async fn appends_survive_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("presence.db");

        {
            let store = Store::open(&path).unwrap();
            store.append(heart_rate_record(72)).await.unwrap();
        }

        let store = Store::open(&path).unwrap();
        let latest = store.latest::<HeartRateRecord>().await.unwrap().unwrap();
        assert_eq!(latest.rate, 72);
    }

    #[tokio::test]
    async fn record_ids_keep_increasing_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("presence.db");

        let first = {
            let store = Store::open(&path).unwrap();
            store.append(heart_rate_record(60)).await.unwrap()
        };

        let store = Store::open(&path).unwrap();
        let second = store.append(heart_rate_record(75)).await.unwrap();
        assert!(second > first);
    }

    #[tokio::test]
    async fn missing_table_reports_unknown_channel() {
        let store = Store::in_memory().unwrap();

        store
            .execute(|conn| {
                conn.execute_batch("DROP TABLE heart_rate")
                    .map_err(|err| StoreError::Unavailable(err.to_string()))
            })
            .await
            .unwrap();

        let err = store.latest::<HeartRateRecord>().await.unwrap_err();
        assert_eq!(err, StoreError::UnknownChannel("heart_rate".to_string()));

        let err = store.append(heart_rate_record(72)).await.unwrap_err();
        assert_eq!(err, StoreError::UnknownChannel("heart_rate".to_string()));
    }

    #[test]
    fn open_fails_unavailable_for_unusable_path() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("blocker");
        std::fs::write(&blocker, b"not a directory").unwrap();

        // Parent "directory" is a regular file.
        let err = Store::open(blocker.join("presence.db")).unwrap_err();
        assert!(matches!(err, StoreError::Unavailable(_)));
    }
}
