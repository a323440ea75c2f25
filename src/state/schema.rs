//! Ledger schema and migrations.

use rusqlite::Connection;

use super::error::StateError;

/// Current schema version. Increment when making schema changes.
pub const SCHEMA_VERSION: i32 = 1;

const SCHEMA_V1: &str = r#"
CREATE TABLE IF NOT EXISTS assets (
    uid TEXT PRIMARY KEY NOT NULL,
    file_name TEXT NOT NULL,
    device_asset_id TEXT NOT NULL,
    destination_id TEXT,
    status TEXT NOT NULL,
    location_status TEXT NOT NULL DEFAULT 'skipped',
    albums_linked INTEGER NOT NULL DEFAULT 0,
    albums_failed INTEGER NOT NULL DEFAULT 0,
    attempts INTEGER NOT NULL DEFAULT 0,
    last_error TEXT,
    updated_at INTEGER NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_assets_status ON assets(status);
CREATE INDEX IF NOT EXISTS idx_assets_destination_id ON assets(destination_id);

CREATE TABLE IF NOT EXISTS runs (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    started_at INTEGER NOT NULL,
    completed_at INTEGER,
    assets_seen INTEGER DEFAULT 0,
    assets_uploaded INTEGER DEFAULT 0,
    assets_failed INTEGER DEFAULT 0,
    halted INTEGER DEFAULT 0,
    interrupted INTEGER DEFAULT 0
);
"#;

pub(crate) fn get_schema_version(conn: &Connection) -> Result<i32, StateError> {
    let version: i32 = conn.pragma_query_value(None, "user_version", |row| row.get(0))?;
    Ok(version)
}

fn set_schema_version(conn: &Connection, version: i32) -> Result<(), StateError> {
    conn.pragma_update(None, "user_version", version)?;
    Ok(())
}

/// Initialize or upgrade the schema. Idempotent.
pub(crate) fn migrate(conn: &Connection) -> Result<(), StateError> {
    let current_version = get_schema_version(conn)?;

    if current_version > SCHEMA_VERSION {
        return Err(StateError::UnsupportedSchemaVersion {
            found: current_version,
            expected: SCHEMA_VERSION,
        });
    }

    if current_version < SCHEMA_VERSION {
        conn.execute_batch(SCHEMA_V1)?;
        set_schema_version(conn, SCHEMA_VERSION)?;
        tracing::debug!("Initialized ledger schema at version {}", SCHEMA_VERSION);
    }

    Ok(())
}
