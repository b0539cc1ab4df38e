//! Database migrations.
//!
//! Migrations run in order and are tracked in the `migrations` table.

use crate::{StoreError, StoreResult};
use rusqlite::Connection;
use tracing::{debug, info};

/// Current schema version.
pub const CURRENT_VERSION: i32 = 1;

/// Run all pending migrations.
pub fn run_migrations(conn: &Connection) -> StoreResult<()> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS migrations (
            version INTEGER PRIMARY KEY,
            name TEXT NOT NULL,
            applied_at TEXT NOT NULL DEFAULT (datetime('now'))
        )",
        [],
    )?;

    let current_version: i32 = conn.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM migrations",
        [],
        |row| row.get(0),
    )?;

    if current_version > CURRENT_VERSION {
        return Err(StoreError::Migration(format!(
            "schema version {current_version} is newer than supported version {CURRENT_VERSION}"
        )));
    }

    if current_version == CURRENT_VERSION {
        debug!(current_version, "Schema up to date");
        return Ok(());
    }

    info!(current_version, target_version = CURRENT_VERSION, "Running migrations");

    if current_version < 1 {
        migrate_v1_outbox_records(conn)?;
    }

    info!("Migrations complete");
    Ok(())
}

fn record_migration(conn: &Connection, version: i32, name: &str) -> StoreResult<()> {
    // OR IGNORE: two processes may race to migrate a fresh file.
    conn.execute(
        "INSERT OR IGNORE INTO migrations (version, name) VALUES (?1, ?2)",
        rusqlite::params![version, name],
    )?;
    debug!(version, name, "Migration applied");
    Ok(())
}

/// V1: outbox records table.
///
/// `created_at` and `claimed_at` are fixed-width RFC 3339 UTC strings, so
/// lexical order is chronological order.
fn migrate_v1_outbox_records(conn: &Connection) -> StoreResult<()> {
    info!("Applying migration v1: outbox records");

    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS outbox_records (
            id TEXT PRIMARY KEY,
            topic TEXT NOT NULL,
            payload BLOB NOT NULL,
            status TEXT NOT NULL DEFAULT 'pending'
                CHECK (status IN ('pending', 'in_progress', 'completed', 'failed')),
            created_at TEXT NOT NULL,
            claimed_at TEXT,
            claimant_id TEXT,
            retry_count INTEGER NOT NULL DEFAULT 0,
            completed_at TEXT
        );

        CREATE INDEX IF NOT EXISTS idx_outbox_records_status_created
            ON outbox_records(status, created_at);
        ",
    )?;

    record_migration(conn, 1, "outbox_records")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn migrations_are_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        run_migrations(&conn).unwrap();
        run_migrations(&conn).unwrap();

        let applied: i64 = conn
            .query_row("SELECT COUNT(*) FROM migrations", [], |row| row.get(0))
            .unwrap();
        assert_eq!(applied, 1);
    }

    #[test]
    fn newer_schema_is_rejected() {
        let conn = Connection::open_in_memory().unwrap();
        run_migrations(&conn).unwrap();
        conn.execute(
            "INSERT INTO migrations (version, name) VALUES (?1, 'future')",
            [CURRENT_VERSION + 1],
        )
        .unwrap();

        assert!(matches!(
            run_migrations(&conn),
            Err(StoreError::Migration(_))
        ));
    }

    #[test]
    fn status_column_rejects_unknown_values() {
        let conn = Connection::open_in_memory().unwrap();
        run_migrations(&conn).unwrap();
        let result = conn.execute(
            "INSERT INTO outbox_records (id, topic, payload, status, created_at)
             VALUES ('a', 't', x'', 'sent', '2024-01-01T00:00:00Z')",
            [],
        );
        assert!(result.is_err());
    }
}
