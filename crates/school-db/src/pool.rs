//! Connection pool creation and configuration.

use crate::connection::{ConnectionSettings, OpenMode};
use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::OpenFlags;
use std::time::Duration;

/// Runtime tunables for SQLite connection behavior.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DbRuntimeSettings {
    /// Busy timeout for SQLite connections, in milliseconds.
    pub busy_timeout_ms: u64,

    /// Maximum number of pooled SQLite connections.
    pub pool_max_size: u32,

    /// How long pool creation and checkout wait for a connection, in milliseconds.
    pub connect_timeout_ms: u64,
}

impl Default for DbRuntimeSettings {
    fn default() -> Self {
        Self {
            busy_timeout_ms: 5_000,
            pool_max_size: 8,
            connect_timeout_ms: 5_000,
        }
    }
}

impl DbRuntimeSettings {
    /// Applies the tunables a connection string carries on top of these.
    pub fn overridden_by(self, connection: &ConnectionSettings) -> Self {
        Self {
            busy_timeout_ms: connection.busy_timeout_ms.unwrap_or(self.busy_timeout_ms),
            pool_max_size: connection.max_pool_size.unwrap_or(self.pool_max_size),
            connect_timeout_ms: self.connect_timeout_ms,
        }
    }
}

/// A type alias for the SQLite connection pool.
pub type DbPool = Pool<SqliteConnectionManager>;

fn open_flags(mode: OpenMode) -> OpenFlags {
    let base = OpenFlags::SQLITE_OPEN_FULL_MUTEX | OpenFlags::SQLITE_OPEN_URI;
    match mode {
        OpenMode::ReadWriteCreate | OpenMode::Memory => {
            base | OpenFlags::SQLITE_OPEN_READ_WRITE | OpenFlags::SQLITE_OPEN_CREATE
        }
        OpenMode::ReadWrite => base | OpenFlags::SQLITE_OPEN_READ_WRITE,
        OpenMode::ReadOnly => base | OpenFlags::SQLITE_OPEN_READ_ONLY,
    }
}

/// Creates a new SQLite connection pool for the given connection settings.
///
/// Writable connections are switched to WAL mode. Every connection gets the
/// configured busy timeout and foreign-key enforcement.
///
/// `Mode=Memory` gives each pooled connection its own private database, so
/// it is only useful for single-connection work such as unit tests.
///
/// No connection is opened here. An unreachable database surfaces as an
/// `r2d2::Error` from the first `get`, after `connect_timeout_ms`.
pub fn create_pool(connection: &ConnectionSettings, settings: DbRuntimeSettings) -> DbPool {
    let manager = match connection.mode {
        OpenMode::Memory => SqliteConnectionManager::memory(),
        _ => SqliteConnectionManager::file(&connection.data_source),
    };

    let use_wal = !matches!(connection.mode, OpenMode::ReadOnly);
    let foreign_keys = if connection.foreign_keys { "ON" } else { "OFF" };

    let manager = manager
        .with_flags(open_flags(connection.mode))
        .with_init(move |conn| {
            if use_wal {
                // In-memory databases report "memory", which is expected.
                let journal_mode: String =
                    conn.query_row("PRAGMA journal_mode = WAL;", [], |row| row.get(0))?;
                if journal_mode != "wal" && journal_mode != "memory" {
                    return Err(rusqlite::Error::SqliteFailure(
                        rusqlite::ffi::Error::new(rusqlite::ffi::SQLITE_ERROR),
                        Some(format!(
                            "failed to set WAL journal mode, got: {}",
                            journal_mode
                        )),
                    ));
                }
            }
            conn.execute_batch(&format!(
                "PRAGMA foreign_keys = {};
                 PRAGMA busy_timeout = {};",
                foreign_keys, settings.busy_timeout_ms
            ))
        });

    let pool = Pool::builder()
        .max_size(settings.pool_max_size)
        .connection_timeout(Duration::from_millis(settings.connect_timeout_ms))
        .build_unchecked(manager);

    tracing::debug!(
        connection = %connection,
        max_size = settings.pool_max_size,
        "database pool configured"
    );

    pool
}
