//! Log sink for SQL tables with a configurable column set.
//!
//! A log table has five fixed columns (`id`, `channel`, `level`, `message`,
//! `time`) plus any number of additional columns named by configuration.
//! Before the first write the sink reconciles the live table with that list,
//! adding and dropping columns as needed; afterwards each [`Record`] is
//! projected onto exactly those columns and inserted.
//!
//! ```no_run
//! use logtable_sink::{Level, Record, SinkConfig, SqlSink};
//!
//! # fn main() -> Result<(), logtable_sink::SinkError> {
//! let config = SinkConfig::new("log").with_columns(["username", "userid"]);
//! let mut sink = SqlSink::open("sqlite:app-log.db", config)?;
//!
//! let record = Record::new("auth", Level::Info, "login")
//!     .with_context("username", "ada")
//!     .with_context("userid", 42);
//! sink.handle(&record)?;
//! # Ok(())
//! # }
//! ```

mod config;
mod ddl;
mod error;
mod handler;
mod insert;
mod layer;
mod level;
mod projector;
mod record;
mod schema;
mod sink;
pub mod sync;
mod time;

pub use config::{Initialization, SinkConfig};
pub use error::{SinkError, SinkResult};
pub use handler::{static_field, Handler, Logger, Processor};
pub use insert::{build as build_insert, InsertCache, InsertStatement};
pub use layer::SinkLayer;
pub use level::{Level, ParseLevelError};
pub use projector::{project, ProjectedRow};
pub use record::{FieldValue, Fields, Record};
pub use schema::{
    Column, ColumnRole, LiveColumns, Schema, DEFAULT_COLUMNS, IDENTITY_COLUMN, TIME_COLUMN,
};
pub use sink::SqlSink;
pub use sync::{describe, diff, reconcile, ReconcileReport, SchemaChange, SchemaDiff};
pub use time::TimeEncoding;

pub use logtable_db::{BackendError, DbConnection, DbRow, DbValue, Executor};
