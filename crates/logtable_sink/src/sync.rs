//! Schema synchronizer: converge a live table onto a [`Schema`].
//!
//! The sequence is create-if-missing, introspect, drop stale columns, add
//! missing ones, and optionally recode the time column. ADD/DROP statements
//! auto-commit one by one, so a failure part way through leaves the earlier
//! changes applied. The time recode is the exception: it runs inside a single
//! transaction.

use logtable_db::{BackendError, DbValue, Executor};
use tracing::{debug, info, warn};

use crate::ddl;
use crate::error::{SinkError, SinkResult};
use crate::schema::{
    is_reserved, same_column, LiveColumns, Schema, RECODE_STAGING_COLUMN, TIME_COLUMN,
};
use crate::time::TimeEncoding;

/// Columns to drop and to add, in the order they will be applied.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SchemaDiff {
    pub removed: Vec<String>,
    pub added: Vec<String>,
}

impl SchemaDiff {
    pub fn is_empty(&self) -> bool {
        self.removed.is_empty() && self.added.is_empty()
    }
}

/// One structural change applied to the table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SchemaChange {
    DropColumn(String),
    AddColumn(String),
    RecodeTime {
        from: TimeEncoding,
        to: TimeEncoding,
        rows: u64,
    },
}

/// Outcome of one reconciliation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconcileReport {
    pub created: bool,
    pub changes: Vec<SchemaChange>,
    pub live: LiveColumns,
}

impl ReconcileReport {
    /// True when the table already matched the schema.
    pub fn is_noop(&self) -> bool {
        !self.created && self.changes.is_empty()
    }

    pub fn added(&self) -> impl Iterator<Item = &str> {
        self.changes.iter().filter_map(|change| match change {
            SchemaChange::AddColumn(c) => Some(c.as_str()),
            _ => None,
        })
    }

    pub fn removed(&self) -> impl Iterator<Item = &str> {
        self.changes.iter().filter_map(|change| match change {
            SchemaChange::DropColumn(c) => Some(c.as_str()),
            _ => None,
        })
    }
}

/// Pure column diff.
///
/// `removed` keeps the live column order, `added` keeps the declared order.
/// Default columns never appear on either side.
pub fn diff(schema: &Schema, live: &LiveColumns) -> SchemaDiff {
    let declared = schema.additional_columns();

    let removed = live
        .iter()
        .filter(|c| !is_reserved(c) && !declared.iter().any(|d| same_column(d, c)))
        .map(str::to_string)
        .collect();

    let added = declared
        .iter()
        .filter(|c| !live.contains(c))
        .cloned()
        .collect();

    SchemaDiff { removed, added }
}

pub fn table_exists<E: Executor>(exec: &E, table: &str) -> SinkResult<bool> {
    let rows = exec
        .query_all(ddl::table_exists_sql(), &[DbValue::from(table)])
        .map_err(|e| SinkError::introspection(table, e))?;
    Ok(!rows.is_empty())
}

/// Live column names, read from statement metadata of an empty select.
pub fn introspect<E: Executor>(exec: &E, table: &str) -> SinkResult<LiveColumns> {
    exec.column_names(&ddl::select_limit_zero_sql(table))
        .map(LiveColumns::new)
        .map_err(|e| SinkError::introspection(table, e))
}

/// Live columns with their declared types, in table order.
///
/// Columns declared without a type come back with an empty string.
pub fn describe<E: Executor>(exec: &E, table: &str) -> SinkResult<Vec<(String, String)>> {
    let rows = exec
        .query_all(&ddl::table_info_sql(table), &[])
        .map_err(|e| SinkError::introspection(table, e))?;
    rows.iter()
        .map(|row| -> Result<(String, String), BackendError> {
            let name: String = row.get_by_name("name")?;
            let declared: Option<String> = row.get_by_name("type")?;
            Ok((name, declared.unwrap_or_default()))
        })
        .collect::<Result<_, _>>()
        .map_err(|e| SinkError::introspection(table, e))
}

/// Encoding implied by the declared type of the live `time` column.
///
/// `None` when there is no such column or its type is not one we wrote.
pub fn live_time_encoding<E: Executor>(exec: &E, table: &str) -> SinkResult<Option<TimeEncoding>> {
    let Some((_, declared)) = describe(exec, table)?
        .into_iter()
        .find(|(name, _)| same_column(name, TIME_COLUMN))
    else {
        return Ok(None);
    };

    let encoding = TimeEncoding::from_sql_type(&declared);
    if encoding.is_none() {
        warn!(table, declared_type = %declared, "Unrecognized time column type; leaving it as is");
    }
    Ok(encoding)
}

/// Bring the live table in line with `schema`.
pub fn reconcile<E: Executor>(schema: &Schema, exec: &E) -> SinkResult<ReconcileReport> {
    let table = schema.table();
    let existed = table_exists(exec, table)?;

    if !existed {
        apply(exec, &ddl::create_table_sql(table, schema.time_encoding()))?;
        info!(table, time_encoding = %schema.time_encoding(), "Created log table");
    }

    let live = introspect(exec, table)?;
    let pending = diff(schema, &live);
    let mut changes = Vec::with_capacity(pending.removed.len() + pending.added.len());

    for column in pending.removed {
        apply(exec, &ddl::drop_column_sql(table, &column))?;
        info!(table, column = %column, "Dropped column");
        changes.push(SchemaChange::DropColumn(column));
    }

    for column in pending.added {
        apply(exec, &ddl::add_column_sql(table, &column))?;
        info!(table, column = %column, "Added column");
        changes.push(SchemaChange::AddColumn(column));
    }

    if existed {
        if let Some(from) = live_time_encoding(exec, table)? {
            let to = schema.time_encoding();
            if from != to {
                let rows = recode_time(exec, table, from, to)?;
                info!(table, %from, %to, rows, "Recoded time column");
                changes.push(SchemaChange::RecodeTime { from, to, rows });
            }
        }
    }

    let live = if changes.is_empty() {
        live
    } else {
        introspect(exec, table)?
    };

    Ok(ReconcileReport {
        created: !existed,
        changes,
        live,
    })
}

/// Rewrite every stored timestamp into a freshly typed `time` column.
///
/// SQLite cannot change a column type in place, so the values go through a
/// staging column that is renamed over the old one.
fn recode_time<E: Executor>(
    exec: &E,
    table: &str,
    from: TimeEncoding,
    to: TimeEncoding,
) -> SinkResult<u64> {
    let staging = RECODE_STAGING_COLUMN;

    exec.in_transaction(|tx| {
        let dependents = indexes_on(tx, table, TIME_COLUMN)?;
        apply(tx, &ddl::add_typed_column_sql(table, staging, to.sql_type()))?;

        let rows = tx
            .query_all(&ddl::select_time_sql(table), &[])
            .map_err(|e| SinkError::introspection(table, e))?;
        let update = ddl::update_column_by_id_sql(table, staging);
        for row in &rows {
            let [id, stored] = row.values() else {
                return Err(SinkError::time_encoding(
                    format!("{:?}", row.values()),
                    "expected (id, time)",
                ));
            };
            let recoded = to.recode_from(from, stored)?;
            tx.execute(&update, &[recoded, id.clone()])
                .map_err(|e| SinkError::ddl(update.as_str(), e))?;
        }

        for index in &dependents {
            apply(tx, &ddl::drop_index_sql(&index.name))?;
        }
        apply(tx, &ddl::drop_column_sql(table, TIME_COLUMN))?;
        apply(tx, &ddl::rename_column_sql(table, staging, TIME_COLUMN))?;
        for index in &dependents {
            apply(tx, &index.sql)?;
        }
        apply(tx, &ddl::create_index_sql(table, TIME_COLUMN))?;
        Ok(rows.len() as u64)
    })
}

/// An index that must be rebuilt when its column is replaced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnIndex {
    pub name: String,
    /// The stored `CREATE INDEX` statement.
    pub sql: String,
}

/// Indexes of `table` that cover `column`.
///
/// Indexes backing a UNIQUE or PRIMARY KEY constraint have no statement to
/// replay and cannot be dropped, so they are reported as a failed drop of the
/// column.
pub fn indexes_on<E: Executor>(
    exec: &E,
    table: &str,
    column: &str,
) -> SinkResult<Vec<ColumnIndex>> {
    let indexes = exec
        .query_all(ddl::table_indexes_sql(), &[DbValue::from(table)])
        .map_err(|e| SinkError::introspection(table, e))?;

    let mut covering = Vec::new();
    for row in &indexes {
        let name: String = row
            .get_by_name("name")
            .map_err(|e| SinkError::introspection(table, e))?;
        let sql: Option<String> = row
            .get_by_name("sql")
            .map_err(|e| SinkError::introspection(table, e))?;

        let parts = exec
            .query_all(&ddl::index_info_sql(&name), &[])
            .map_err(|e| SinkError::introspection(table, e))?;
        let covers = parts.iter().any(|part| {
            matches!(
                part.get_by_name::<Option<String>>("name"),
                Ok(Some(indexed)) if same_column(&indexed, column)
            )
        });
        if !covers {
            continue;
        }

        match sql {
            Some(sql) => covering.push(ColumnIndex { name, sql }),
            None => {
                return Err(SinkError::ddl(
                    ddl::drop_column_sql(table, column),
                    BackendError::Query(format!(
                        "index '{name}' on '{column}' belongs to a table constraint"
                    )),
                ))
            }
        }
    }
    Ok(covering)
}

fn apply<E: Executor>(exec: &E, sql: &str) -> SinkResult<()> {
    debug!(sql = %sql, "Applying schema statement");
    exec.execute_batch(sql).map_err(|e| SinkError::ddl(sql, e))
}
