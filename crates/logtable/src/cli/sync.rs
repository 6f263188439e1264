//! `logtable sync`

use anyhow::{Context, Result};
use logtable_sink::sync::{diff, introspect, reconcile, table_exists};
use logtable_sink::{SchemaChange, Schema};

use super::config::Resolved;
use super::output::print_table;

pub fn run(resolved: &Resolved, dry_run: bool) -> Result<()> {
    let schema = resolved.sink.schema()?;
    let conn = super::open_storage(&resolved.database, dry_run)?;

    if dry_run {
        return plan(&schema, &conn);
    }

    let report = reconcile(&schema, &conn)
        .with_context(|| format!("Failed to reconcile table '{}'", schema.table()))?;

    if report.created {
        println!("Created table '{}'", schema.table());
    }
    if report.changes.is_empty() {
        println!("Table '{}' is up to date", schema.table());
        return Ok(());
    }

    let rows = report
        .changes
        .iter()
        .map(|change| match change {
            SchemaChange::DropColumn(c) => vec!["drop".to_string(), c.clone()],
            SchemaChange::AddColumn(c) => vec!["add".to_string(), c.clone()],
            SchemaChange::RecodeTime { from, to, rows } => vec![
                "recode".to_string(),
                format!("time: {} -> {} ({} rows)", from, to, rows),
            ],
        })
        .collect();
    print_table(&["CHANGE", "COLUMN"], rows);
    Ok(())
}

/// Print what `sync` would do without touching the table.
fn plan(schema: &Schema, conn: &logtable_sink::DbConnection) -> Result<()> {
    if !table_exists(conn, schema.table())? {
        println!(
            "Table '{}' does not exist; it would be created with columns: {}",
            schema.table(),
            schema.columns().collect::<Vec<_>>().join(", ")
        );
        return Ok(());
    }

    let pending = diff(schema, &introspect(conn, schema.table())?);
    if pending.is_empty() {
        println!("Table '{}' is up to date", schema.table());
        return Ok(());
    }

    let rows = pending
        .removed
        .into_iter()
        .map(|c| vec!["drop".to_string(), c])
        .chain(pending.added.into_iter().map(|c| vec!["add".to_string(), c]))
        .collect();
    print_table(&["PENDING", "COLUMN"], rows);
    Ok(())
}
