//! Table and value formatting for command output.

use comfy_table::{presets::UTF8_FULL_CONDENSED, Cell, Color, ContentArrangement, Table};
use logtable_sink::{DbValue, Level};

/// Print a table with headers and rows.
pub fn print_table(headers: &[&str], rows: Vec<Vec<String>>) {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL_CONDENSED)
        .set_content_arrangement(ContentArrangement::Dynamic);

    let header_cells: Vec<Cell> = headers
        .iter()
        .map(|h| Cell::new(h).fg(Color::Cyan))
        .collect();
    table.set_header(header_cells);

    for row in rows {
        table.add_row(row);
    }

    println!("{}", table);
}

/// Cell text for a stored value. `level` columns show the level name.
pub fn format_value(column: &str, value: &DbValue) -> String {
    match (column, value) {
        (_, DbValue::Null) => String::new(),
        ("level", DbValue::Integer(v)) => Level::from_value(*v)
            .map(|level| level.name().to_string())
            .unwrap_or_else(|| v.to_string()),
        (_, other) => other.to_string(),
    }
}

pub fn to_json(value: &DbValue) -> serde_json::Value {
    match value {
        DbValue::Null => serde_json::Value::Null,
        DbValue::Integer(v) => serde_json::Value::from(*v),
        DbValue::Real(v) => serde_json::Value::from(*v),
        DbValue::Text(v) => serde_json::Value::from(v.as_str()),
        DbValue::Blob(v) => serde_json::Value::from(format!("<{} bytes>", v.len())),
    }
}
