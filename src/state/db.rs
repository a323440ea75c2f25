//! Ledger trait and SQLite implementation.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use fs4::fs_std::FileExt;
use rusqlite::{Connection, OpenFlags, OptionalExtension};

use super::error::StateError;
use super::schema;
use super::types::{AssetRecord, AssetStatus, LocationStatus, RunStats, StateSummary};

/// Per-asset migration progress, persisted across runs.
///
/// Object-safe so the migrator can hold it as `&dyn StateDb`.
#[async_trait]
pub trait StateDb: Send + Sync {
    /// UIDs of assets a previous run finished without any failure.
    async fn completed_uids(&self) -> Result<HashSet<String>, StateError>;

    /// Record a successful upload. Resets location and link progress, since
    /// those steps follow every upload.
    async fn mark_uploaded(
        &self,
        uid: &str,
        file_name: &str,
        device_asset_id: &str,
        destination_id: &str,
    ) -> Result<(), StateError>;

    /// Record a rejected upload.
    async fn mark_upload_failed(
        &self,
        uid: &str,
        file_name: &str,
        device_asset_id: &str,
        error: &str,
    ) -> Result<(), StateError>;

    async fn set_location_status(
        &self,
        uid: &str,
        status: LocationStatus,
    ) -> Result<(), StateError>;

    /// Record the album-link step; the asset becomes `completed` when
    /// nothing failed, `partial` otherwise.
    async fn mark_linked(
        &self,
        uid: &str,
        albums_linked: u32,
        albums_failed: u32,
    ) -> Result<(), StateError>;

    /// Assets whose upload failed or that finished with a failed step.
    async fn get_failed(&self) -> Result<Vec<AssetRecord>, StateError>;

    /// Assets uploaded but never linked: the run stopped in between.
    async fn get_incomplete(&self) -> Result<Vec<AssetRecord>, StateError>;

    async fn get_summary(&self) -> Result<StateSummary, StateError>;

    async fn start_run(&self) -> Result<i64, StateError>;

    async fn complete_run(&self, run_id: i64, stats: &RunStats) -> Result<(), StateError>;
}

/// SQLite ledger guarded by an exclusive lock file so two migrations never
/// write the same ledger.
pub struct SqliteStateDb {
    /// rusqlite::Connection is not Sync.
    conn: Mutex<Connection>,
    path: PathBuf,
    /// Held for the lifetime of the ledger; dropping it releases the lock.
    _lock: Option<std::fs::File>,
}

impl std::fmt::Debug for SqliteStateDb {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteStateDb")
            .field("path", &self.path)
            .finish_non_exhaustive()
    }
}

fn lock_path(db_path: &Path) -> PathBuf {
    let mut name = db_path.file_name().unwrap_or_default().to_os_string();
    name.push(".lock");
    db_path.with_file_name(name)
}

fn acquire_lock(path: &Path) -> Result<std::fs::File, StateError> {
    let file = std::fs::File::create(path).map_err(|source| StateError::LockFile {
        path: path.to_path_buf(),
        source,
    })?;
    file.try_lock_exclusive()
        .map_err(|_| StateError::Locked {
            path: path.to_path_buf(),
        })?;
    Ok(file)
}

impl SqliteStateDb {
    /// Open or create the ledger at `path` and take its lock.
    pub async fn open(path: &Path) -> Result<Self, StateError> {
        let path = path.to_path_buf();
        let path_clone = path.clone();

        let (conn, lock) = tokio::task::spawn_blocking(move || {
            if let Some(parent) = path_clone.parent().filter(|p| !p.as_os_str().is_empty()) {
                std::fs::create_dir_all(parent).map_err(|source| StateError::LockFile {
                    path: parent.to_path_buf(),
                    source,
                })?;
            }
            let lock = acquire_lock(&lock_path(&path_clone))?;

            let conn = Connection::open(&path_clone).map_err(|e| StateError::Open {
                path: path_clone.clone(),
                source: e,
            })?;
            conn.pragma_update(None, "journal_mode", "WAL")
                .map_err(StateError::Migration)?;
            conn.pragma_update(None, "synchronous", "NORMAL")
                .map_err(StateError::Migration)?;
            schema::migrate(&conn)?;

            Ok::<_, StateError>((conn, lock))
        })
        .await??;

        Ok(Self {
            conn: Mutex::new(conn),
            path,
            _lock: Some(lock),
        })
    }

    /// Open an existing ledger for reading without taking its lock, so the
    /// ledger of a running migration can still be inspected.
    pub async fn open_read_only(path: &Path) -> Result<Self, StateError> {
        let path = path.to_path_buf();
        let path_clone = path.clone();

        let conn = tokio::task::spawn_blocking(move || {
            let conn = Connection::open_with_flags(
                &path_clone,
                OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
            )
            .map_err(|e| StateError::Open {
                path: path_clone.clone(),
                source: e,
            })?;
            let version = schema::get_schema_version(&conn)?;
            if version > schema::SCHEMA_VERSION {
                return Err(StateError::UnsupportedSchemaVersion {
                    found: version,
                    expected: schema::SCHEMA_VERSION,
                });
            }
            Ok::<_, StateError>(conn)
        })
        .await??;

        Ok(Self {
            conn: Mutex::new(conn),
            path,
            _lock: None,
        })
    }

    #[cfg(test)]
    pub fn open_in_memory() -> Result<Self, StateError> {
        let conn = Connection::open_in_memory().map_err(|e| StateError::Open {
            path: PathBuf::from(":memory:"),
            source: e,
        })?;
        schema::migrate(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
            path: PathBuf::from(":memory:"),
            _lock: None,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn lock_conn(&self) -> Result<std::sync::MutexGuard<'_, Connection>, StateError> {
        self.conn
            .lock()
            .map_err(|e| StateError::Query(e.to_string()))
    }

    fn query_records(&self, sql: &str) -> Result<Vec<AssetRecord>, StateError> {
        let conn = self.lock_conn()?;
        let mut stmt = conn.prepare(sql).map_err(StateError::query)?;
        let records = stmt
            .query_map([], |row| Ok(row_to_asset_record(row)))
            .map_err(StateError::query)?
            .collect::<Result<Vec<_>, _>>()
            .map_err(StateError::query)?;
        Ok(records)
    }

    fn count_status(conn: &Connection, status: AssetStatus) -> Result<u64, StateError> {
        let count: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM assets WHERE status = ?1",
                [status.as_str()],
                |row| row.get(0),
            )
            .map_err(StateError::query)?;
        Ok(count as u64)
    }
}

const RECORD_COLUMNS: &str = "uid, file_name, device_asset_id, destination_id, status, location_status, albums_linked, albums_failed, attempts, last_error, updated_at";

fn row_to_asset_record(row: &rusqlite::Row<'_>) -> AssetRecord {
    let status: String = row.get(4).unwrap_or_default();
    let location_status: String = row.get(5).unwrap_or_default();
    let updated_at: i64 = row.get(10).unwrap_or(0);
    AssetRecord {
        uid: row.get(0).unwrap_or_default(),
        file_name: row.get(1).unwrap_or_default(),
        device_asset_id: row.get(2).unwrap_or_default(),
        destination_id: row.get(3).unwrap_or(None),
        status: AssetStatus::from_str(&status).unwrap_or(AssetStatus::Failed),
        location_status: LocationStatus::from_str(&location_status)
            .unwrap_or(LocationStatus::Skipped),
        albums_linked: row.get::<_, i64>(6).unwrap_or(0) as u32,
        albums_failed: row.get::<_, i64>(7).unwrap_or(0) as u32,
        attempts: row.get::<_, i64>(8).unwrap_or(0) as u32,
        last_error: row.get(9).unwrap_or(None),
        updated_at: Utc.timestamp_opt(updated_at, 0).single().unwrap_or_default(),
    }
}

#[async_trait]
impl StateDb for SqliteStateDb {
    async fn completed_uids(&self) -> Result<HashSet<String>, StateError> {
        let conn = self.lock_conn()?;
        let mut stmt = conn
            .prepare("SELECT uid FROM assets WHERE status = 'completed'")
            .map_err(StateError::query)?;
        let uids = stmt
            .query_map([], |row| row.get::<_, String>(0))
            .map_err(StateError::query)?
            .collect::<Result<HashSet<_>, _>>()
            .map_err(StateError::query)?;
        Ok(uids)
    }

    async fn mark_uploaded(
        &self,
        uid: &str,
        file_name: &str,
        device_asset_id: &str,
        destination_id: &str,
    ) -> Result<(), StateError> {
        let now = Utc::now().timestamp();
        let conn = self.lock_conn()?;
        conn.execute(
            r#"
            INSERT INTO assets (uid, file_name, device_asset_id, destination_id, status, attempts, updated_at)
            VALUES (?1, ?2, ?3, ?4, 'uploaded', 1, ?5)
            ON CONFLICT(uid) DO UPDATE SET
                file_name = excluded.file_name,
                device_asset_id = excluded.device_asset_id,
                destination_id = excluded.destination_id,
                status = 'uploaded',
                location_status = 'skipped',
                albums_linked = 0,
                albums_failed = 0,
                attempts = attempts + 1,
                last_error = NULL,
                updated_at = excluded.updated_at
            "#,
            rusqlite::params![uid, file_name, device_asset_id, destination_id, now],
        )
        .map_err(StateError::query)?;
        Ok(())
    }

    async fn mark_upload_failed(
        &self,
        uid: &str,
        file_name: &str,
        device_asset_id: &str,
        error: &str,
    ) -> Result<(), StateError> {
        let now = Utc::now().timestamp();
        let conn = self.lock_conn()?;
        conn.execute(
            r#"
            INSERT INTO assets (uid, file_name, device_asset_id, status, attempts, last_error, updated_at)
            VALUES (?1, ?2, ?3, 'failed', 1, ?4, ?5)
            ON CONFLICT(uid) DO UPDATE SET
                file_name = excluded.file_name,
                device_asset_id = excluded.device_asset_id,
                status = 'failed',
                attempts = attempts + 1,
                last_error = excluded.last_error,
                updated_at = excluded.updated_at
            "#,
            rusqlite::params![uid, file_name, device_asset_id, error, now],
        )
        .map_err(StateError::query)?;
        Ok(())
    }

    async fn set_location_status(
        &self,
        uid: &str,
        status: LocationStatus,
    ) -> Result<(), StateError> {
        let now = Utc::now().timestamp();
        let conn = self.lock_conn()?;
        conn.execute(
            "UPDATE assets SET location_status = ?1, updated_at = ?2 WHERE uid = ?3",
            rusqlite::params![status.as_str(), now, uid],
        )
        .map_err(StateError::query)?;
        Ok(())
    }

    async fn mark_linked(
        &self,
        uid: &str,
        albums_linked: u32,
        albums_failed: u32,
    ) -> Result<(), StateError> {
        let now = Utc::now().timestamp();
        let conn = self.lock_conn()?;
        conn.execute(
            r#"
            UPDATE assets SET
                albums_linked = ?1,
                albums_failed = ?2,
                status = CASE
                    WHEN ?2 = 0 AND location_status != 'failed' THEN 'completed'
                    ELSE 'partial'
                END,
                last_error = CASE WHEN ?2 = 0 THEN last_error ELSE ?2 || ' album link(s) failed' END,
                updated_at = ?3
            WHERE uid = ?4
            "#,
            rusqlite::params![albums_linked, albums_failed, now, uid],
        )
        .map_err(StateError::query)?;
        Ok(())
    }

    async fn get_failed(&self) -> Result<Vec<AssetRecord>, StateError> {
        self.query_records(&format!(
            "SELECT {} FROM assets WHERE status IN ('failed', 'partial') ORDER BY updated_at",
            RECORD_COLUMNS
        ))
    }

    async fn get_incomplete(&self) -> Result<Vec<AssetRecord>, StateError> {
        self.query_records(&format!(
            "SELECT {} FROM assets WHERE status = 'uploaded' ORDER BY updated_at",
            RECORD_COLUMNS
        ))
    }

    async fn get_summary(&self) -> Result<StateSummary, StateError> {
        let conn = self.lock_conn()?;

        let total_assets: i64 = conn
            .query_row("SELECT COUNT(*) FROM assets", [], |row| row.get(0))
            .map_err(StateError::query)?;

        let last_run: Option<(Option<i64>, Option<i64>)> = conn
            .query_row(
                "SELECT started_at, completed_at FROM runs ORDER BY id DESC LIMIT 1",
                [],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()
            .map_err(StateError::query)?;
        let (started, completed) = last_run.unwrap_or((None, None));

        Ok(StateSummary {
            total_assets: total_assets as u64,
            completed: Self::count_status(&conn, AssetStatus::Completed)?,
            partial: Self::count_status(&conn, AssetStatus::Partial)?,
            uploaded: Self::count_status(&conn, AssetStatus::Uploaded)?,
            failed: Self::count_status(&conn, AssetStatus::Failed)?,
            last_run_started: started.and_then(|ts| Utc.timestamp_opt(ts, 0).single()),
            last_run_completed: completed.and_then(|ts| Utc.timestamp_opt(ts, 0).single()),
        })
    }

    async fn start_run(&self) -> Result<i64, StateError> {
        let now = Utc::now().timestamp();
        let conn = self.lock_conn()?;
        conn.execute("INSERT INTO runs (started_at) VALUES (?1)", [now])
            .map_err(StateError::query)?;
        Ok(conn.last_insert_rowid())
    }

    async fn complete_run(&self, run_id: i64, stats: &RunStats) -> Result<(), StateError> {
        let now = Utc::now().timestamp();
        let conn = self.lock_conn()?;
        conn.execute(
            r#"
            UPDATE runs SET
                completed_at = ?1,
                assets_seen = ?2,
                assets_uploaded = ?3,
                assets_failed = ?4,
                halted = ?5,
                interrupted = ?6
            WHERE id = ?7
            "#,
            rusqlite::params![
                now,
                stats.assets_seen as i64,
                stats.assets_uploaded as i64,
                stats.assets_failed as i64,
                stats.halted,
                stats.interrupted,
                run_id,
            ],
        )
        .map_err(StateError::query)?;
        Ok(())
    }
}
