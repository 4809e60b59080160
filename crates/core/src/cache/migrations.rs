//! Result store schema migrations.
//!
//! Applied versions are recorded in `_migrations`; each entry below is a SQL
//! batch written with `IF NOT EXISTS` so re-running it is harmless.

use super::Error;
use tokio_rusqlite::{Connection, params};

/// Ordered `(version, SQL)` pairs.
const MIGRATIONS: &[(i64, &str)] = &[(1, include_str!("../../migrations/001_captures.sql"))];

/// Apply every migration newer than the recorded version.
///
/// # Errors
///
/// Returns an error if the version table cannot be read or a batch fails.
pub async fn run(conn: &Connection) -> Result<(), Error> {
    conn.call(|conn| -> Result<(), Error> {
        conn.execute(
            "CREATE TABLE IF NOT EXISTS _migrations (
                version INTEGER PRIMARY KEY,
                applied_at TEXT NOT NULL
            )",
            [],
        )?;

        let current: i64 =
            conn.query_row("SELECT COALESCE(MAX(version), 0) FROM _migrations", [], |row| row.get(0))?;

        for (version, sql) in MIGRATIONS.iter().filter(|(v, _)| *v > current) {
            conn.execute_batch(sql)
                .map_err(|e| Error::MigrationFailed(format!("version {version}: {e}")))?;
            conn.execute(
                "INSERT INTO _migrations (version, applied_at) VALUES (?1, ?2)",
                params![version, chrono::Utc::now().to_rfc3339()],
            )?;
            tracing::debug!(version, "applied result store migration");
        }

        Ok(())
    })
    .await
    .map_err(Error::from)
}
