//! `logtable columns`

use anyhow::{Context, Result};
use logtable_sink::sync::describe;
use logtable_sink::{Schema, DEFAULT_COLUMNS, IDENTITY_COLUMN};

use super::config::Resolved;
use super::output::print_table;

pub fn run(resolved: &Resolved) -> Result<()> {
    let schema = resolved.sink.schema()?;
    let conn = super::open_storage(&resolved.database, true)?;

    let described = describe(&conn, schema.table())
        .with_context(|| format!("Failed to describe table '{}'", schema.table()))?;
    if described.is_empty() {
        println!("Table '{}' does not exist", schema.table());
        return Ok(());
    }

    let rows = described
        .into_iter()
        .map(|(name, declared)| {
            let role = role(&schema, &name);
            vec![name, declared, role.to_string()]
        })
        .collect();
    print_table(&["COLUMN", "TYPE", "ROLE"], rows);
    Ok(())
}

fn role(schema: &Schema, name: &str) -> &'static str {
    if name.eq_ignore_ascii_case(IDENTITY_COLUMN) {
        "identity"
    } else if DEFAULT_COLUMNS.iter().any(|c| c.eq_ignore_ascii_case(name)) {
        "default"
    } else if schema
        .additional_columns()
        .iter()
        .any(|c| c.eq_ignore_ascii_case(name))
    {
        "additional"
    } else {
        "undeclared"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_roles() {
        let schema = Schema::new("log", ["username"]).unwrap();
        assert_eq!(role(&schema, "id"), "identity");
        assert_eq!(role(&schema, "time"), "default");
        assert_eq!(role(&schema, "UserName"), "additional");
        assert_eq!(role(&schema, "stale"), "undeclared");
    }
}
