//! `logtable tail`

use anyhow::{Context, Result};
use logtable_db::quote_ident;
use logtable_sink::{DbRow, DbValue, Executor, IDENTITY_COLUMN};

use super::config::Resolved;
use super::output::{format_value, print_table, to_json};

pub fn run(resolved: &Resolved, limit: usize, json: bool) -> Result<()> {
    let table = &resolved.sink.table;
    let conn = super::open_storage(&resolved.database, true)?;

    let rows = last_rows(&conn, table, limit)
        .with_context(|| format!("Failed to read from table '{}'", table))?;

    if json {
        for row in &rows {
            let object: serde_json::Map<String, serde_json::Value> = row
                .column_names()
                .iter()
                .cloned()
                .zip(row.values().iter().map(to_json))
                .collect();
            println!("{}", serde_json::Value::Object(object));
        }
        return Ok(());
    }

    let Some(first) = rows.first() else {
        println!("No records in '{}'", table);
        return Ok(());
    };
    let headers: Vec<String> = first.column_names().to_vec();
    let header_refs: Vec<&str> = headers.iter().map(String::as_str).collect();
    let body = rows
        .iter()
        .map(|row| {
            headers
                .iter()
                .zip(row.values())
                .map(|(column, value)| format_value(column, value))
                .collect()
        })
        .collect();
    print_table(&header_refs, body);
    Ok(())
}

/// Newest `limit` rows, oldest first.
pub fn last_rows<E: Executor>(conn: &E, table: &str, limit: usize) -> Result<Vec<DbRow>> {
    let sql = format!(
        "SELECT * FROM {} ORDER BY {} DESC LIMIT ?",
        quote_ident(table),
        IDENTITY_COLUMN
    );
    let limit = i64::try_from(limit).unwrap_or(i64::MAX);
    let mut rows = conn.query_all(&sql, &[DbValue::Integer(limit)])?;
    rows.reverse();
    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use logtable_sink::{DbConnection, Level, Record, SinkConfig, SqlSink};

    #[test]
    fn test_last_rows_are_oldest_first() {
        let mut sink = SqlSink::new(DbConnection::open_memory().unwrap(), SinkConfig::new("log")).unwrap();
        for message in ["one", "two", "three"] {
            sink.handle(&Record::new("app", Level::Info, message)).unwrap();
        }

        let rows = last_rows(sink.storage(), "log", 2).unwrap();
        let messages: Vec<String> = rows
            .iter()
            .map(|row| row.get_by_name::<String>("message").unwrap())
            .collect();
        assert_eq!(messages, vec!["two", "three"]);
    }
}
