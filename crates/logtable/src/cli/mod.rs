//! Subcommand implementations.

pub mod columns;
pub mod config;
pub mod output;
pub mod sync;
pub mod tail;
pub mod write;

use anyhow::{Context, Result};
use logtable_sink::DbConnection;

/// Open the database named by `--db`: a `sqlite:` URL or a file path.
pub fn open_storage(database: &str, read_only: bool) -> Result<DbConnection> {
    let opened = if database.starts_with("sqlite:") {
        DbConnection::open_from_url(database)
    } else if read_only {
        DbConnection::open_readonly(database)
    } else {
        DbConnection::open(database)
    };
    opened.with_context(|| format!("Failed to open database: {}", database))
}
