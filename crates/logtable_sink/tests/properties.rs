//! Property tests for reconciliation, projection and the level gate.

use std::cell::Cell;

use logtable_sink::{
    diff, project, reconcile, BackendError, DbConnection, DbRow, DbValue, Executor, Level,
    LiveColumns, Record, Schema, SinkConfig, SqlSink, DEFAULT_COLUMNS, IDENTITY_COLUMN,
};
use proptest::prelude::*;

/// Counts every call that reaches storage.
struct Counting {
    inner: DbConnection,
    calls: Cell<usize>,
}

impl Counting {
    fn new() -> Self {
        Self {
            inner: DbConnection::open_memory().unwrap(),
            calls: Cell::new(0),
        }
    }

    fn tick(&self) {
        self.calls.set(self.calls.get() + 1);
    }
}

impl Executor for Counting {
    fn execute_batch(&self, sql: &str) -> Result<(), BackendError> {
        self.tick();
        self.inner.execute_batch(sql)
    }

    fn execute(&self, sql: &str, params: &[DbValue]) -> Result<u64, BackendError> {
        self.tick();
        self.inner.execute(sql, params)
    }

    fn execute_named(&self, sql: &str, params: &[(String, DbValue)]) -> Result<u64, BackendError> {
        self.tick();
        self.inner.execute_named(sql, params)
    }

    fn query_all(&self, sql: &str, params: &[DbValue]) -> Result<Vec<DbRow>, BackendError> {
        self.tick();
        self.inner.query_all(sql, params)
    }

    fn column_names(&self, sql: &str) -> Result<Vec<String>, BackendError> {
        self.tick();
        self.inner.column_names(sql)
    }
}

fn column_name() -> impl Strategy<Value = String> {
    "[a-z][a-z0-9_]{0,6}"
}

fn column_set() -> impl Strategy<Value = Vec<String>> {
    prop::collection::btree_set(column_name(), 0..6).prop_map(|set| set.into_iter().collect())
}

fn level() -> impl Strategy<Value = Level> {
    prop::sample::select(Level::ALL.to_vec())
}

fn create_with(conn: &DbConnection, existing: &[String]) {
    conn.execute_batch(
        "CREATE TABLE log (id INTEGER PRIMARY KEY AUTOINCREMENT, channel VARCHAR(255), \
         level INTEGER, message LONGTEXT, time INTEGER UNSIGNED);",
    )
    .unwrap();
    for column in existing.iter().filter(|c| !is_default(c)) {
        conn.execute_batch(&format!("ALTER TABLE log ADD \"{}\" TEXT;", column))
            .unwrap();
    }
}

fn is_default(name: &str) -> bool {
    name == IDENTITY_COLUMN || DEFAULT_COLUMNS.iter().any(|c| *c == name)
}

proptest! {
    #[test]
    fn test_reconcile_converges_to_declared_columns(existing in column_set(), declared in column_set()) {
        let conn = DbConnection::open_memory().unwrap();
        create_with(&conn, &existing);

        let schema = Schema::new("log", declared.clone()).unwrap();
        let report = reconcile(&schema, &conn).unwrap();

        let mut live: Vec<String> = report.live.names().to_vec();
        live.sort();
        let mut expected: Vec<String> = schema.columns().map(str::to_string).collect();
        expected.sort();
        prop_assert_eq!(live, expected);
    }

    #[test]
    fn test_second_reconcile_changes_nothing(existing in column_set(), declared in column_set()) {
        let conn = DbConnection::open_memory().unwrap();
        create_with(&conn, &existing);

        let schema = Schema::new("log", declared).unwrap();
        reconcile(&schema, &conn).unwrap();
        let again = reconcile(&schema, &conn).unwrap();
        prop_assert!(again.is_noop());
        prop_assert!(diff(&schema, &again.live).is_empty());
    }

    #[test]
    fn test_diff_never_touches_default_columns(live in column_set(), declared in column_set()) {
        let mut names: Vec<String> = ["id", "channel", "level", "message", "time"]
            .into_iter()
            .map(String::from)
            .collect();
        names.extend(live);
        let schema = Schema::new("log", declared).unwrap();

        let pending = diff(&schema, &LiveColumns::new(names));
        prop_assert!(pending.removed.iter().all(|c| !is_default(c)));
        prop_assert!(pending.added.iter().all(|c| !is_default(c)));
    }

    #[test]
    fn test_projection_is_complete_and_sound(
        declared in column_set(),
        payload in prop::collection::btree_map(column_name(), any::<i64>(), 0..8),
    ) {
        let schema = Schema::new("log", declared).unwrap();
        let mut record = Record::new("app", Level::Info, "m").with_context(IDENTITY_COLUMN, 11);
        for (key, value) in &payload {
            record = record.with_context(key.as_str(), *value);
        }

        let row = project(&record, &schema);
        for column in schema.additional_columns() {
            let expected = payload
                .get(column)
                .map(|v| DbValue::Integer(*v))
                .unwrap_or(DbValue::Null);
            prop_assert_eq!(row.get(column), Some(&expected));
        }
        for name in row.column_names() {
            prop_assert!(schema.contains(name));
            prop_assert_ne!(name, IDENTITY_COLUMN);
        }
    }

    #[test]
    fn test_below_threshold_records_never_reach_storage(threshold in level(), record_level in level()) {
        let mut sink = SqlSink::new(Counting::new(), SinkConfig::new("log").with_level(threshold)).unwrap();
        let handled = sink.handle(&Record::new("app", record_level, "m")).unwrap();

        prop_assert_eq!(handled, record_level >= threshold);
        if record_level < threshold {
            prop_assert_eq!(sink.storage().calls.get(), 0);
            prop_assert!(!sink.is_initialized());
        } else {
            prop_assert!(sink.storage().calls.get() > 0);
        }
    }
}
