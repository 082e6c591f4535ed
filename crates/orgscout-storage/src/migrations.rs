//! Schema versioning for the turn log.

use rusqlite::{params, Connection};
use tracing::info;

use orgscout_core::error::ScoutError;

use crate::db::sqlite_err;

/// Ordered schema steps as (version, name, sql). Versions only ever grow.
///
/// Evidence columns hold JSON text; NULL means "absent", which is distinct
/// from an empty list.
const STEPS: &[(i64, &str, &str)] = &[(
    1,
    "turns",
    "CREATE TABLE IF NOT EXISTS turns (
        id               TEXT PRIMARY KEY NOT NULL,
        conversation_id  TEXT NOT NULL,
        user_request     TEXT NOT NULL,
        enriched_query   TEXT NOT NULL DEFAULT '',
        answer           TEXT NOT NULL DEFAULT '',
        citations        TEXT NOT NULL DEFAULT '[]',
        locations        TEXT,
        images           TEXT,
        organizations    TEXT,
        created_at       INTEGER NOT NULL
    );
    CREATE INDEX IF NOT EXISTS idx_turns_conversation
        ON turns (conversation_id, created_at);",
)];

/// Apply every step newer than the recorded schema version.
pub fn run_migrations(conn: &Connection) -> Result<(), ScoutError> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS schema_migrations (
            version     INTEGER PRIMARY KEY NOT NULL,
            name        TEXT NOT NULL,
            applied_at  INTEGER NOT NULL DEFAULT (strftime('%s', 'now'))
        );",
    )
    .map_err(sqlite_err("create schema_migrations"))?;

    let applied: i64 = conn
        .query_row(
            "SELECT COALESCE(MAX(version), 0) FROM schema_migrations",
            [],
            |row| row.get(0),
        )
        .map_err(sqlite_err("read schema version"))?;

    for (version, name, sql) in STEPS.iter().filter(|(v, _, _)| *v > applied) {
        conn.execute_batch(sql).map_err(sqlite_err("apply migration"))?;
        conn.execute(
            "INSERT INTO schema_migrations (version, name) VALUES (?1, ?2)",
            params![version, name],
        )
        .map_err(sqlite_err("record migration"))?;
        info!(version, name, "Schema migration applied");
    }
    Ok(())
}
