//! Database layer for the School API.
//!
//! Provides connection string parsing, SQLite connection pooling (via
//! `r2d2`), the embedded migration runner, and the pooled data-access
//! context the HTTP controllers query through.
//!
//! # Design decisions
//!
//! - **SQLite with WAL mode**: no external database process is required, and
//!   WAL lets pooled readers run alongside a single writer.
//! - **Embedded migrations**: SQL files are compiled into the binary via
//!   `include_str!` and listed explicitly in name order, so the script set
//!   cannot drift from the code that depends on it.
//! - **One connection string, two consumers**: the migration step and the
//!   data-access context are both built from the same [`ConnectionSettings`].

mod connection;
mod context;
mod migrations;
mod pool;

pub use connection::{ConnectionSettings, ConnectionStringError, OpenMode};
pub use context::{ContextError, SchoolDbContext};
pub use migrations::{
    is_upgrade_required, pending_scripts, schema_version, upgrade, Migration, MigrationError,
    UpgradeReport, JOURNAL_TABLE, MIGRATIONS,
};
pub use pool::{create_pool, DbPool, DbRuntimeSettings};
