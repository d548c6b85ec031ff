//! Schema steps for the cache database.
//!
//! `_migrations` records the highest step applied. Each pending step runs
//! in its own transaction together with its bookkeeping row, so a crash
//! leaves the schema at a whole step.

use super::Error;
use tokio_rusqlite::{Connection, params};

/// Ordered schema steps, numbered from 1.
const MIGRATIONS: &[(i64, &str)] = &[
    (1, include_str!("../../migrations/001_cache_versions.sql")),
    (2, include_str!("../../migrations/002_cache_entries.sql")),
];

/// Bring the schema up to the latest step.
///
/// # Errors
///
/// Returns `Error::MigrationFailed` naming the step whose SQL was rejected.
pub async fn run(conn: &Connection) -> Result<(), Error> {
    conn.call(|conn| -> Result<(), Error> {
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS _migrations (
                version INTEGER PRIMARY KEY,
                applied_at TEXT NOT NULL
            )",
        )?;

        let applied: i64 = conn.query_row("SELECT COALESCE(MAX(version), 0) FROM _migrations", [], |row| row.get(0))?;

        for (step, sql) in MIGRATIONS.iter().filter(|(step, _)| *step > applied) {
            let tx = conn.transaction()?;
            tx.execute_batch(sql)
                .map_err(|e| Error::MigrationFailed(format!("step {step}: {e}")))?;
            tx.execute(
                "INSERT INTO _migrations (version, applied_at) VALUES (?1, ?2)",
                params![step, chrono::Utc::now().to_rfc3339()],
            )?;
            tx.commit()?;
            tracing::debug!(step, "applied cache schema step");
        }

        Ok(())
    })
    .await
    .map_err(Error::from)
}
