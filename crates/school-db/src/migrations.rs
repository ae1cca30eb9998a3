//! Embedded SQL migration runner.
//!
//! Scripts are SQL files compiled into the binary and listed in
//! [`MIGRATIONS`] in ascending name order. Applied scripts are journaled in
//! the `SchemaVersions` table; a script whose name is already journaled is
//! never executed again, so an upgrade against an up-to-date database is a
//! no-op.

use rusqlite::{Connection, OptionalExtension};
use thiserror::Error;

/// Name of the journal table recording applied scripts.
pub const JOURNAL_TABLE: &str = "SchemaVersions";

/// A single embedded migration script.
#[derive(Debug, Clone, Copy)]
pub struct Migration {
    pub name: &'static str,
    pub sql: &'static str,
}

/// All scripts in order. New scripts are appended here and must sort after
/// every existing name.
pub const MIGRATIONS: &[Migration] = &[
    Migration {
        name: "0001_create_students",
        sql: include_str!("migrations/0001_create_students.sql"),
    },
    Migration {
        name: "0002_create_courses",
        sql: include_str!("migrations/0002_create_courses.sql"),
    },
    Migration {
        name: "0003_seed_courses",
        sql: include_str!("migrations/0003_seed_courses.sql"),
    },
];

/// Outcome of a successful upgrade.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct UpgradeReport {
    /// Scripts executed by this run, in execution order.
    pub applied: Vec<String>,
    /// Last journaled script after the run, if any.
    pub schema_version: Option<String>,
}

/// Errors that can occur during migration execution.
#[derive(Debug, Error)]
pub enum MigrationError {
    /// A SQL statement within a migration failed.
    #[error("migration '{name}' failed: {source}")]
    ExecutionFailed {
        /// The name of the migration that failed.
        name: String,
        /// The underlying SQLite error.
        source: rusqlite::Error,
    },

    /// Failed to query migration state.
    #[error("failed to check migration state: {0}")]
    StateQuery(rusqlite::Error),

    /// Failed to check out a connection to migrate with.
    #[error("failed to get a database connection for migrations: {0}")]
    Connection(#[from] r2d2::Error),
}

/// Runs all pending migrations against the given connection.
///
/// # Errors
///
/// Returns `MigrationError` if any migration fails to execute or if the
/// journal table cannot be queried. Scripts applied before the failing one
/// stay applied.
pub fn upgrade(conn: &Connection) -> Result<UpgradeReport, MigrationError> {
    upgrade_from_list(conn, MIGRATIONS)
}

/// Lists the names of embedded scripts not yet journaled.
///
/// # Errors
///
/// Returns `MigrationError` if the journal table cannot be created or read.
pub fn pending_scripts(conn: &Connection) -> Result<Vec<&'static str>, MigrationError> {
    pending_from_list(conn, MIGRATIONS)
}

/// Returns `true` if any embedded script is not yet journaled.
///
/// # Errors
///
/// Returns `MigrationError` if the journal table cannot be created or read.
pub fn is_upgrade_required(conn: &Connection) -> Result<bool, MigrationError> {
    Ok(!pending_scripts(conn)?.is_empty())
}

/// Returns the highest journaled script name, or `None` on a fresh database.
///
/// # Errors
///
/// Returns `MigrationError` if the journal table cannot be created or read.
pub fn schema_version(conn: &Connection) -> Result<Option<String>, MigrationError> {
    ensure_journal(conn)?;
    conn.query_row(
        "SELECT ScriptName FROM SchemaVersions ORDER BY ScriptName DESC LIMIT 1",
        [],
        |row| row.get(0),
    )
    .optional()
    .map_err(MigrationError::StateQuery)
}

fn ensure_journal(conn: &Connection) -> Result<(), MigrationError> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS SchemaVersions (
            Id INTEGER PRIMARY KEY AUTOINCREMENT,
            ScriptName TEXT NOT NULL UNIQUE,
            Applied TEXT NOT NULL DEFAULT (datetime('now'))
        );",
    )
    .map_err(|e| MigrationError::ExecutionFailed {
        name: format!("{JOURNAL_TABLE}_bootstrap"),
        source: e,
    })
}

fn is_journaled(conn: &Connection, name: &str) -> Result<bool, MigrationError> {
    conn.query_row(
        "SELECT COUNT(*) > 0 FROM SchemaVersions WHERE ScriptName = ?1",
        [name],
        |row| row.get(0),
    )
    .map_err(MigrationError::StateQuery)
}

fn pending_from_list(
    conn: &Connection,
    migrations: &[Migration],
) -> Result<Vec<&'static str>, MigrationError> {
    ensure_journal(conn)?;
    let mut pending = Vec::new();
    for migration in migrations {
        if !is_journaled(conn, migration.name)? {
            pending.push(migration.name);
        }
    }
    Ok(pending)
}

fn upgrade_from_list(
    conn: &Connection,
    migrations: &[Migration],
) -> Result<UpgradeReport, MigrationError> {
    tracing::info!("beginning database upgrade");
    ensure_journal(conn)?;

    let mut report = UpgradeReport::default();

    for migration in migrations {
        if is_journaled(conn, migration.name)? {
            tracing::debug!(
                migration = migration.name,
                "migration already applied, skipping"
            );
            continue;
        }

        tracing::info!(migration = migration.name, "executing migration script");

        let failed = |e| MigrationError::ExecutionFailed {
            name: migration.name.to_string(),
            source: e,
        };

        let tx = conn.unchecked_transaction().map_err(failed)?;
        tx.execute_batch(migration.sql).map_err(failed)?;
        tx.execute(
            "INSERT INTO SchemaVersions (ScriptName) VALUES (?1)",
            [migration.name],
        )
        .map_err(failed)?;
        tx.commit().map_err(failed)?;

        report.applied.push(migration.name.to_string());
    }

    if report.applied.is_empty() {
        tracing::info!("no new scripts need to be executed");
    } else {
        tracing::info!(count = report.applied.len(), "upgrade successful");
    }

    report.schema_version = schema_version(conn)?;
    Ok(report)
}
