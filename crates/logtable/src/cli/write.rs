//! `logtable write`

use anyhow::{bail, Context, Result};
use logtable_sink::{FieldValue, Initialization, Level, Record, SqlSink};

use super::config::Resolved;

/// Parse `key=value`. Values that read as JSON keep their type, anything else
/// is text.
pub fn parse_field(raw: &str) -> Result<(String, FieldValue)> {
    let Some((key, value)) = raw.split_once('=') else {
        bail!("Invalid field '{}': expected key=value", raw);
    };
    let key = key.trim();
    if key.is_empty() {
        bail!("Invalid field '{}': empty key", raw);
    }
    let value = serde_json::from_str::<serde_json::Value>(value)
        .map(FieldValue::from)
        .unwrap_or_else(|_| FieldValue::from(value));
    Ok((key.to_string(), value))
}

pub struct WriteArgs<'a> {
    pub message: &'a str,
    pub level: Level,
    pub channel: &'a str,
    pub fields: &'a [String],
    pub skip_sync: bool,
}

pub fn run(resolved: &Resolved, args: WriteArgs<'_>) -> Result<()> {
    let mut config = resolved.sink.clone();
    if args.skip_sync {
        config.initialization = Initialization::Skip;
    }

    let mut record = Record::new(args.channel, args.level, args.message);
    for raw in args.fields {
        let (key, value) = parse_field(raw)?;
        record.context.insert(key, value);
    }

    let conn = super::open_storage(&resolved.database, false)?;
    let mut sink = SqlSink::new(conn, config).context("Failed to set up log sink")?;
    let handled = sink.handle(&record).context("Failed to write record")?;

    if handled {
        if let Some(report) = sink.last_report().filter(|r| !r.is_noop()) {
            println!("Schema updated: {} change(s)", report.changes.len());
        }
        println!("Stored {} record in '{}'", record.level, sink.schema().table());
    } else {
        println!(
            "Not stored: {} is below the configured level {}",
            record.level,
            sink.threshold()
        );
    }
    Ok(())
}
