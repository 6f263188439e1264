//! Storage layer for logtable.
//!
//! A thin, blocking wrapper over a single SQLite connection. Everything the
//! sink needs from a database goes through the [`Executor`] trait so the
//! schema engine never touches `rusqlite` directly.
//!
//! # Usage
//!
//! ```rust,ignore
//! use logtable_db::{DbConnection, DbValue, Executor};
//!
//! let conn = DbConnection::open("logs.sqlite3")?;
//! conn.execute_batch("CREATE TABLE t (id INTEGER PRIMARY KEY, name TEXT)")?;
//! conn.execute_named(
//!     "INSERT INTO t (name) VALUES (:name)",
//!     &[(":name".to_string(), DbValue::from("alpha"))],
//! )?;
//! let columns = conn.column_names("SELECT * FROM t LIMIT 0")?;
//! ```

mod backend;
mod sql;

pub use backend::{
    AccessMode, BackendError, DbConnection, DbRow, DbValue, Executor, FromDbValue,
};
pub use sql::{hash_sql, quote_ident, sql_op_name};
