//! Database schema migrations.

use rusqlite::Connection;
use tracing::info;

use ihos_core::error::IhosError;

/// Run all pending database migrations.
pub fn run_migrations(conn: &Connection) -> Result<(), IhosError> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS schema_migrations (
            version     INTEGER PRIMARY KEY NOT NULL,
            name        TEXT NOT NULL,
            applied_at  INTEGER NOT NULL DEFAULT (strftime('%s', 'now'))
        );",
    )
    .map_err(|e| IhosError::Storage(format!("Failed to create migrations table: {}", e)))?;

    let current = current_version(conn)?;

    if current < 1 {
        apply_v1(conn)?;
        info!("Applied migration v1: documents");
    }

    Ok(())
}

/// Highest applied migration version, 0 for a fresh database.
pub fn current_version(conn: &Connection) -> Result<i64, IhosError> {
    conn.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM schema_migrations",
        [],
        |row| row.get(0),
    )
    .map_err(|e| IhosError::Storage(format!("Failed to query migration version: {}", e)))
}

/// Version 1: JSON document table keyed by collection.
fn apply_v1(conn: &Connection) -> Result<(), IhosError> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS documents (
            seq         INTEGER PRIMARY KEY AUTOINCREMENT,
            id          TEXT NOT NULL UNIQUE,
            collection  TEXT NOT NULL,
            body        TEXT NOT NULL,
            created_at  INTEGER NOT NULL DEFAULT (strftime('%s', 'now')),
            updated_at  INTEGER NOT NULL DEFAULT (strftime('%s', 'now'))
        );

        CREATE INDEX IF NOT EXISTS idx_documents_collection
            ON documents (collection, seq ASC);

        INSERT INTO schema_migrations (version, name) VALUES (1, 'documents');
        ",
    )
    .map_err(|e| IhosError::Storage(format!("Migration v1 failed: {}", e)))
}
