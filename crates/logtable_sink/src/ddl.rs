//! SQL text for every statement the sink issues.
//!
//! Identifiers are always quoted; values never appear in the text.

use logtable_db::quote_ident;

use crate::schema::{IDENTITY_COLUMN, TIME_COLUMN};
use crate::time::TimeEncoding;

/// Columns indexed at table creation.
pub const INDEXED_COLUMNS: [&str; 3] = ["channel", "level", TIME_COLUMN];

pub fn index_name(table: &str, column: &str) -> String {
    format!("{}_{}_idx", table, column)
}

/// Table with the default columns plus its indexes.
pub fn create_table_sql(table: &str, time_encoding: TimeEncoding) -> String {
    let mut sql = format!(
        "CREATE TABLE IF NOT EXISTS {} (\n    {} INTEGER PRIMARY KEY AUTOINCREMENT,\n    channel VARCHAR(255),\n    level INTEGER,\n    message LONGTEXT,\n    {} {}\n);",
        quote_ident(table),
        IDENTITY_COLUMN,
        TIME_COLUMN,
        time_encoding.sql_type()
    );
    for column in INDEXED_COLUMNS {
        sql.push('\n');
        sql.push_str(&create_index_sql(table, column));
    }
    sql
}

pub fn create_index_sql(table: &str, column: &str) -> String {
    format!(
        "CREATE INDEX IF NOT EXISTS {} ON {} ({});",
        quote_ident(&index_name(table, column)),
        quote_ident(table),
        quote_ident(column)
    )
}

pub fn drop_index_sql(index: &str) -> String {
    format!("DROP INDEX IF EXISTS {};", quote_ident(index))
}

/// Every index of a table with its stored `CREATE INDEX` text.
///
/// `sql` is NULL for indexes SQLite creates for UNIQUE and PRIMARY KEY
/// constraints.
pub fn table_indexes_sql() -> &'static str {
    "SELECT name, sql FROM sqlite_master WHERE type = 'index' AND tbl_name = ? COLLATE NOCASE ORDER BY name"
}

pub fn index_info_sql(index: &str) -> String {
    format!("PRAGMA index_info({});", quote_ident(index))
}

pub fn table_exists_sql() -> &'static str {
    "SELECT name FROM sqlite_master WHERE type = 'table' AND name = ? COLLATE NOCASE"
}

pub fn select_limit_zero_sql(table: &str) -> String {
    format!("SELECT * FROM {} LIMIT 0;", quote_ident(table))
}

pub fn table_info_sql(table: &str) -> String {
    format!("PRAGMA table_info({});", quote_ident(table))
}

pub fn drop_column_sql(table: &str, column: &str) -> String {
    format!(
        "ALTER TABLE {} DROP {};",
        quote_ident(table),
        quote_ident(column)
    )
}

pub fn add_column_sql(table: &str, column: &str) -> String {
    format!(
        "ALTER TABLE {} ADD {} TEXT NULL DEFAULT NULL;",
        quote_ident(table),
        quote_ident(column)
    )
}

pub fn add_typed_column_sql(table: &str, column: &str, sql_type: &str) -> String {
    format!(
        "ALTER TABLE {} ADD {} {} NULL DEFAULT NULL;",
        quote_ident(table),
        quote_ident(column),
        sql_type
    )
}

pub fn rename_column_sql(table: &str, from: &str, to: &str) -> String {
    format!(
        "ALTER TABLE {} RENAME COLUMN {} TO {};",
        quote_ident(table),
        quote_ident(from),
        quote_ident(to)
    )
}

pub fn select_time_sql(table: &str) -> String {
    format!(
        "SELECT {}, {} FROM {};",
        IDENTITY_COLUMN,
        quote_ident(TIME_COLUMN),
        quote_ident(table)
    )
}

pub fn update_column_by_id_sql(table: &str, column: &str) -> String {
    format!(
        "UPDATE {} SET {} = ? WHERE {} = ?;",
        quote_ident(table),
        quote_ident(column),
        IDENTITY_COLUMN
    )
}

/// `INSERT` with one `:name` placeholder per column, in the given order.
pub fn insert_sql<'a>(table: &str, columns: impl IntoIterator<Item = &'a str>) -> String {
    let (names, placeholders): (Vec<String>, Vec<String>) = columns
        .into_iter()
        .map(|c| (quote_ident(c), format!(":{}", c)))
        .unzip();
    format!(
        "INSERT INTO {} ({}) VALUES ({});",
        quote_ident(table),
        names.join(", "),
        placeholders.join(", ")
    )
}
