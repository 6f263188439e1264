//! The SQL log sink.
//!
//! A sink starts uninitialized. The first record that passes the level
//! threshold (or the constructor, with [`Initialization::Eager`]) reconciles
//! the table once; from then on every accepted record is projected onto the
//! reconciled schema and inserted. Nothing is retried: a failed
//! reconciliation leaves the sink uninitialized, so the next accepted record
//! tries again, and a failed insert leaves the state untouched.

use logtable_db::{DbConnection, Executor};
use tracing::{debug, warn};

use crate::config::{Initialization, SinkConfig};
use crate::error::{SinkError, SinkResult};
use crate::insert::InsertCache;
use crate::level::Level;
use crate::projector::project;
use crate::record::Record;
use crate::schema::{LiveColumns, Schema};
use crate::sync::{self, ReconcileReport};

/// Schema snapshot the sink writes against once initialized.
#[derive(Debug, Clone)]
struct Initialized {
    /// Effective schema; narrower than the declared one in skip mode.
    schema: Schema,
    live: LiveColumns,
    report: Option<ReconcileReport>,
}

/// Writes records into a table whose extra columns follow configuration.
#[derive(Debug)]
pub struct SqlSink<S: Executor = DbConnection> {
    storage: S,
    schema: Schema,
    threshold: Level,
    bubble: bool,
    initialization: Initialization,
    /// `None` until the table has been reconciled (or introspected in skip mode).
    state: Option<Initialized>,
    inserts: InsertCache,
}

impl SqlSink<DbConnection> {
    /// Open storage from a `sqlite:` URL and build a sink on it.
    pub fn open(url: &str, config: SinkConfig) -> SinkResult<Self> {
        let storage =
            DbConnection::open_from_url(url).map_err(|source| SinkError::Connection { source })?;
        Self::new(storage, config)
    }
}

impl<S: Executor> SqlSink<S> {
    pub fn new(storage: S, config: SinkConfig) -> SinkResult<Self> {
        let schema = config.schema()?;
        let mut sink = Self {
            storage,
            schema,
            threshold: config.level,
            bubble: config.bubble,
            initialization: config.initialization,
            state: None,
            inserts: InsertCache::new(),
        };
        if sink.initialization == Initialization::Eager {
            sink.resync()?;
        }
        Ok(sink)
    }

    pub fn is_handling(&self, level: Level) -> bool {
        level >= self.threshold
    }

    pub fn bubble(&self) -> bool {
        self.bubble
    }

    pub fn threshold(&self) -> Level {
        self.threshold
    }

    /// Store one record.
    ///
    /// Returns `Ok(false)` without touching storage when the record is below
    /// the threshold.
    pub fn handle(&mut self, record: &Record) -> SinkResult<bool> {
        if !self.is_handling(record.level) {
            return Ok(false);
        }

        let ready = Self::ready(
            &mut self.state,
            &self.storage,
            &self.schema,
            self.initialization,
        )?;
        let table = ready.schema.table();
        let row = project(record, &ready.schema);
        let statement = self.inserts.statement(table, &row);

        self.storage
            .execute_named(&statement.sql, &row.named_params())
            .map_err(|source| SinkError::Insert {
                table: table.to_string(),
                source,
            })?;

        debug!(
            table,
            channel = %record.channel,
            level = %record.level,
            "Stored log record"
        );
        Ok(true)
    }

    /// Reconcile again now, even if the sink was already initialized.
    pub fn resync(&mut self) -> SinkResult<Option<&ReconcileReport>> {
        self.state = None;
        self.inserts.invalidate();
        let ready = Self::ready(
            &mut self.state,
            &self.storage,
            &self.schema,
            self.initialization,
        )?;
        Ok(ready.report.as_ref())
    }

    pub fn is_initialized(&self) -> bool {
        self.state.is_some()
    }

    pub fn storage(&self) -> &S {
        &self.storage
    }

    pub fn into_storage(self) -> S {
        self.storage
    }

    /// Declared schema.
    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    /// Schema records are currently projected onto, once initialized.
    pub fn effective_schema(&self) -> Option<&Schema> {
        self.state.as_ref().map(|ready| &ready.schema)
    }

    pub fn live_columns(&self) -> Option<&LiveColumns> {
        self.state.as_ref().map(|ready| &ready.live)
    }

    /// Outcome of the last reconciliation; `None` before it ran or in skip mode.
    pub fn last_report(&self) -> Option<&ReconcileReport> {
        self.state.as_ref().and_then(|ready| ready.report.as_ref())
    }

    fn ready<'a>(
        state: &'a mut Option<Initialized>,
        storage: &S,
        schema: &Schema,
        initialization: Initialization,
    ) -> SinkResult<&'a Initialized> {
        let ready = match state.take() {
            Some(ready) => ready,
            None => initialize(storage, schema, initialization)?,
        };
        Ok(state.insert(ready))
    }
}

fn initialize<S: Executor>(
    storage: &S,
    schema: &Schema,
    initialization: Initialization,
) -> SinkResult<Initialized> {
    if initialization != Initialization::Skip {
        let report = sync::reconcile(schema, storage)?;
        return Ok(Initialized {
            schema: schema.clone(),
            live: report.live.clone(),
            report: Some(report),
        });
    }

    let table = schema.table();
    let live = sync::introspect(storage, table)?;
    let mut effective = schema.restricted_to(&live);

    if let Some(stored) = sync::live_time_encoding(storage, table)? {
        if stored != schema.time_encoding() {
            warn!(
                table,
                configured = %schema.time_encoding(),
                %stored,
                "Schema changes are disabled; writing time in the stored encoding"
            );
            effective = effective.with_time_encoding(stored);
        }
    }

    let skipped: Vec<&str> = schema
        .additional_columns()
        .iter()
        .filter(|c| !live.contains(c))
        .map(String::as_str)
        .collect();
    if !skipped.is_empty() {
        debug!(table, columns = ?skipped, "Declared columns missing from table are not written");
    }

    Ok(Initialized {
        schema: effective,
        live,
        report: None,
    })
}
