//! SQLite connection and the [`Executor`] seam.
//!
//! One connection per [`DbConnection`]. Statements take positional (`?`) or
//! `:name` parameters, and result column names can be read from a prepared
//! statement without stepping it.

use std::path::Path;
use std::time::Instant;

use rusqlite::types::{Value, ValueRef};
use rusqlite::{OpenFlags, ToSql};
use thiserror::Error;
use tracing::{debug_span, field, info, Span};

use crate::sql::{hash_sql, sql_op_name};

#[derive(Debug, Error)]
pub enum BackendError {
    #[error("Cannot open database: {0}")]
    Database(String),

    #[error("Connection is read-only")]
    ReadOnly,

    #[error("Query failed: {0}")]
    Query(String),

    #[error("Transaction aborted: {0}")]
    Transaction(String),

    #[error("Cannot convert column value: {0}")]
    TypeConversion(String),

    #[error("Unsupported storage: {0}")]
    NotAvailable(String),

    #[error(transparent)]
    Sqlite(#[from] rusqlite::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessMode {
    ReadWrite,
    ReadOnly,
}

/// A bound parameter or a column read back from a row.
#[derive(Debug, Clone, PartialEq)]
pub enum DbValue {
    Null,
    Integer(i64),
    Real(f64),
    Text(String),
    Blob(Vec<u8>),
}

impl DbValue {
    pub fn is_null(&self) -> bool {
        matches!(self, DbValue::Null)
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            DbValue::Text(text) => Some(text),
            _ => None,
        }
    }

    fn bind(&self) -> Value {
        match self {
            DbValue::Null => Value::Null,
            DbValue::Integer(n) => Value::Integer(*n),
            DbValue::Real(x) => Value::Real(*x),
            DbValue::Text(text) => Value::Text(text.clone()),
            DbValue::Blob(bytes) => Value::Blob(bytes.clone()),
        }
    }

    fn read(column: ValueRef<'_>) -> Self {
        match column {
            ValueRef::Null => DbValue::Null,
            ValueRef::Integer(n) => DbValue::Integer(n),
            ValueRef::Real(x) => DbValue::Real(x),
            ValueRef::Text(bytes) => DbValue::Text(String::from_utf8_lossy(bytes).into_owned()),
            ValueRef::Blob(bytes) => DbValue::Blob(bytes.to_vec()),
        }
    }

    fn kind(&self) -> &'static str {
        match self {
            DbValue::Null => "NULL",
            DbValue::Integer(_) => "INTEGER",
            DbValue::Real(_) => "REAL",
            DbValue::Text(_) => "TEXT",
            DbValue::Blob(_) => "BLOB",
        }
    }
}

impl std::fmt::Display for DbValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DbValue::Null => f.write_str("NULL"),
            DbValue::Integer(n) => write!(f, "{n}"),
            DbValue::Real(x) => write!(f, "{x}"),
            DbValue::Text(text) => f.write_str(text),
            DbValue::Blob(bytes) => write!(f, "<{} bytes>", bytes.len()),
        }
    }
}

impl From<i64> for DbValue {
    fn from(n: i64) -> Self {
        DbValue::Integer(n)
    }
}

impl From<bool> for DbValue {
    fn from(flag: bool) -> Self {
        DbValue::Integer(i64::from(flag))
    }
}

impl From<&str> for DbValue {
    fn from(text: &str) -> Self {
        DbValue::Text(text.to_owned())
    }
}

impl From<String> for DbValue {
    fn from(text: String) -> Self {
        DbValue::Text(text)
    }
}

/// One result row with its column names.
#[derive(Debug, Clone)]
pub struct DbRow {
    columns: Vec<String>,
    values: Vec<DbValue>,
}

impl DbRow {
    pub fn new(columns: Vec<String>, values: Vec<DbValue>) -> Self {
        Self { columns, values }
    }

    pub fn get<T: FromDbValue>(&self, index: usize) -> Result<T, BackendError> {
        let value = self.values.get(index).ok_or_else(|| {
            BackendError::TypeConversion(format!(
                "row has {} columns, no index {index}",
                self.values.len()
            ))
        })?;
        T::from_db_value(value)
    }

    pub fn get_by_name<T: FromDbValue>(&self, name: &str) -> Result<T, BackendError> {
        match self.columns.iter().position(|column| column == name) {
            Some(index) => self.get(index),
            None => Err(BackendError::TypeConversion(format!("row has no column '{name}'"))),
        }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn column_names(&self) -> &[String] {
        &self.columns
    }

    pub fn values(&self) -> &[DbValue] {
        &self.values
    }
}

/// Typed read of a single column. NULL only converts into `Option<T>`.
pub trait FromDbValue: Sized {
    fn from_db_value(value: &DbValue) -> Result<Self, BackendError>;
}

fn mismatch(wanted: &str, value: &DbValue) -> BackendError {
    BackendError::TypeConversion(format!("wanted {wanted}, found {}", value.kind()))
}

impl FromDbValue for i64 {
    fn from_db_value(value: &DbValue) -> Result<Self, BackendError> {
        match value {
            DbValue::Integer(n) => Ok(*n),
            other => Err(mismatch("INTEGER", other)),
        }
    }
}

impl FromDbValue for String {
    fn from_db_value(value: &DbValue) -> Result<Self, BackendError> {
        match value {
            DbValue::Text(text) => Ok(text.clone()),
            other => Err(mismatch("TEXT", other)),
        }
    }
}

impl<T: FromDbValue> FromDbValue for Option<T> {
    fn from_db_value(value: &DbValue) -> Result<Self, BackendError> {
        if value.is_null() {
            Ok(None)
        } else {
            T::from_db_value(value).map(Some)
        }
    }
}

/// Blocking SQL execution surface the log sink is written against.
///
/// Implemented by [`DbConnection`] and by shared references to any executor,
/// so callers can lend a connection to a sink and keep inspecting it.
pub trait Executor {
    /// Execute one or more statements without parameters or results.
    fn execute_batch(&self, sql: &str) -> Result<(), BackendError>;

    /// Execute a statement with positional (`?`) parameters.
    fn execute(&self, sql: &str, params: &[DbValue]) -> Result<u64, BackendError>;

    /// Execute a statement with named parameters; names include their prefix (`:col`).
    fn execute_named(&self, sql: &str, params: &[(String, DbValue)]) -> Result<u64, BackendError>;

    fn query_all(&self, sql: &str, params: &[DbValue]) -> Result<Vec<DbRow>, BackendError>;

    /// Prepare a query and return its result column names without stepping it.
    fn column_names(&self, sql: &str) -> Result<Vec<String>, BackendError>;

    /// Run `op` between `BEGIN` and `COMMIT`, rolling back if it fails.
    fn in_transaction<T, E, F>(&self, op: F) -> Result<T, E>
    where
        Self: Sized,
        F: FnOnce(&Self) -> Result<T, E>,
        E: From<BackendError> + std::fmt::Display,
    {
        self.execute_batch("BEGIN").map_err(E::from)?;
        let err = match op(self) {
            Ok(value) => {
                self.execute_batch("COMMIT").map_err(E::from)?;
                return Ok(value);
            }
            Err(err) => err,
        };
        match self.execute_batch("ROLLBACK") {
            Ok(()) => Err(err),
            Err(rollback) => Err(E::from(BackendError::Transaction(format!(
                "{err}; ROLLBACK also failed: {rollback}"
            )))),
        }
    }
}

impl<T: Executor + ?Sized> Executor for &T {
    fn execute_batch(&self, sql: &str) -> Result<(), BackendError> {
        (**self).execute_batch(sql)
    }

    fn execute(&self, sql: &str, params: &[DbValue]) -> Result<u64, BackendError> {
        (**self).execute(sql, params)
    }

    fn execute_named(&self, sql: &str, params: &[(String, DbValue)]) -> Result<u64, BackendError> {
        (**self).execute_named(sql, params)
    }

    fn query_all(&self, sql: &str, params: &[DbValue]) -> Result<Vec<DbRow>, BackendError> {
        (**self).query_all(sql, params)
    }

    fn column_names(&self, sql: &str) -> Result<Vec<String>, BackendError> {
        (**self).column_names(sql)
    }
}

pub struct DbConnection {
    conn: rusqlite::Connection,
    access_mode: AccessMode,
}

impl std::fmt::Debug for DbConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DbConnection")
            .field("access_mode", &self.access_mode)
            .finish_non_exhaustive()
    }
}

impl DbConnection {
    /// Open from `sqlite:<path>` or `sqlite::memory:`.
    pub fn open_from_url(url: &str) -> Result<Self, BackendError> {
        match url.strip_prefix("sqlite:") {
            Some(":memory:") => Self::open_memory(),
            Some(path) if !path.is_empty() => Self::open(Path::new(path)),
            _ => Err(BackendError::NotAvailable(format!(
                "'{url}' is not a sqlite: URL"
            ))),
        }
    }

    /// Open or create a database file, creating missing parent directories.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, BackendError> {
        let path = path.as_ref();
        if let Some(dir) = path.parent().filter(|dir| !dir.as_os_str().is_empty()) {
            std::fs::create_dir_all(dir)
                .map_err(|e| BackendError::Database(format!("{}: {e}", dir.display())))?;
        }

        let conn = rusqlite::Connection::open(path)?;
        info!(path = %path.display(), "Opened log database");
        Ok(Self::wrap(conn, AccessMode::ReadWrite))
    }

    /// Open an existing database file without write access.
    pub fn open_readonly(path: impl AsRef<Path>) -> Result<Self, BackendError> {
        let path = path.as_ref();
        let flags = OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX;
        let conn = rusqlite::Connection::open_with_flags(path, flags)?;
        info!(path = %path.display(), "Opened log database read-only");
        Ok(Self::wrap(conn, AccessMode::ReadOnly))
    }

    pub fn open_memory() -> Result<Self, BackendError> {
        let conn = rusqlite::Connection::open_in_memory()?;
        Ok(Self::wrap(conn, AccessMode::ReadWrite))
    }

    fn wrap(conn: rusqlite::Connection, access_mode: AccessMode) -> Self {
        Self { conn, access_mode }
    }

    pub fn access_mode(&self) -> AccessMode {
        self.access_mode
    }

    pub fn is_writable(&self) -> bool {
        self.access_mode == AccessMode::ReadWrite
    }

    /// First column of the first row.
    pub fn query_scalar<T: FromDbValue>(
        &self,
        sql: &str,
        params: &[DbValue],
    ) -> Result<T, BackendError> {
        let rows = self.query_all(sql, params)?;
        let row = rows
            .first()
            .ok_or_else(|| BackendError::Query(format!("no rows from: {sql}")))?;
        row.get(0)
    }

    fn ensure_writable(&self) -> Result<(), BackendError> {
        if self.is_writable() {
            Ok(())
        } else {
            Err(BackendError::ReadOnly)
        }
    }

    fn prepare(&self, sql: &str) -> Result<rusqlite::Statement<'_>, BackendError> {
        Ok(self.conn.prepare(sql)?)
    }
}

/// Runs `op` inside `span` and records how long it took.
fn timed<T>(span: Span, op: impl FnOnce() -> Result<T, BackendError>) -> Result<T, BackendError> {
    let started = Instant::now();
    let result = span.in_scope(op);
    span.record("duration_ms", started.elapsed().as_millis() as u64);
    result
}

fn statement_names(stmt: &rusqlite::Statement<'_>) -> Vec<String> {
    stmt.column_names().into_iter().map(str::to_owned).collect()
}

impl Executor for DbConnection {
    fn execute_batch(&self, sql: &str) -> Result<(), BackendError> {
        self.ensure_writable()?;
        let span = debug_span!(
            "db.exec_batch",
            op = "BATCH",
            sql_hash = %hash_sql(sql),
            duration_ms = field::Empty
        );
        timed(span, || Ok(self.conn.execute_batch(sql)?))
    }

    fn execute(&self, sql: &str, params: &[DbValue]) -> Result<u64, BackendError> {
        self.ensure_writable()?;
        let span = debug_span!(
            "db.exec",
            op = sql_op_name(sql),
            sql_hash = %hash_sql(sql),
            duration_ms = field::Empty
        );
        timed(span, || {
            let bound: Vec<Value> = params.iter().map(DbValue::bind).collect();
            let changed = self
                .prepare(sql)?
                .execute(rusqlite::params_from_iter(bound.iter()))?;
            Ok(changed as u64)
        })
    }

    fn execute_named(&self, sql: &str, params: &[(String, DbValue)]) -> Result<u64, BackendError> {
        self.ensure_writable()?;
        let span = debug_span!(
            "db.exec",
            op = sql_op_name(sql),
            sql_hash = %hash_sql(sql),
            duration_ms = field::Empty
        );
        timed(span, || {
            let bound: Vec<(&str, Value)> = params
                .iter()
                .map(|(name, value)| (name.as_str(), value.bind()))
                .collect();
            let named: Vec<(&str, &dyn ToSql)> = bound
                .iter()
                .map(|(name, value)| (*name, value as &dyn ToSql))
                .collect();
            let changed = self.prepare(sql)?.execute(named.as_slice())?;
            Ok(changed as u64)
        })
    }

    fn query_all(&self, sql: &str, params: &[DbValue]) -> Result<Vec<DbRow>, BackendError> {
        let span = debug_span!(
            "db.query",
            op = sql_op_name(sql),
            sql_hash = %hash_sql(sql),
            duration_ms = field::Empty
        );
        timed(span, || {
            let mut stmt = self.prepare(sql)?;
            let columns = statement_names(&stmt);
            let bound: Vec<Value> = params.iter().map(DbValue::bind).collect();
            let mut cursor = stmt.query(rusqlite::params_from_iter(bound.iter()))?;

            let mut rows = Vec::new();
            while let Some(row) = cursor.next()? {
                let values = (0..columns.len())
                    .map(|i| row.get_ref(i).map(DbValue::read))
                    .collect::<Result<Vec<_>, _>>()?;
                rows.push(DbRow::new(columns.clone(), values));
            }
            Ok(rows)
        })
    }

    fn column_names(&self, sql: &str) -> Result<Vec<String>, BackendError> {
        let _span = debug_span!("db.describe", sql_hash = %hash_sql(sql)).entered();
        let stmt = self.prepare(sql)?;
        Ok(statement_names(&stmt))
    }
}
