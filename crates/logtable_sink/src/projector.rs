//! Flatten a [`Record`] into one row of the log table.

use logtable_db::DbValue;

use crate::record::Record;
use crate::schema::{Schema, TIME_COLUMN};

/// Column/value pairs in insert order.
///
/// Always the four default columns, then every additional column of the
/// schema it was projected against.
#[derive(Debug, Clone, PartialEq)]
pub struct ProjectedRow {
    values: Vec<(String, DbValue)>,
}

impl ProjectedRow {
    pub fn get(&self, column: &str) -> Option<&DbValue> {
        self.values
            .iter()
            .find(|(name, _)| name == column)
            .map(|(_, value)| value)
    }

    pub fn column_names(&self) -> impl Iterator<Item = &str> {
        self.values.iter().map(|(name, _)| name.as_str())
    }

    pub fn values(&self) -> &[(String, DbValue)] {
        &self.values
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Column list joined with commas; two rows with the same signature can
    /// share one insert statement.
    pub fn signature(&self) -> String {
        self.column_names().collect::<Vec<_>>().join(",")
    }

    /// Parameters keyed the way the insert statement names them.
    pub fn named_params(&self) -> Vec<(String, DbValue)> {
        self.values
            .iter()
            .map(|(name, value)| (format!(":{}", name), value.clone()))
            .collect()
    }
}

/// Project `record` onto `schema`.
///
/// Structural fields come from the record itself, never from the payload.
/// Payload keys that are not declared additional columns are dropped, and
/// declared columns the payload lacks are bound to `NULL`.
pub fn project(record: &Record, schema: &Schema) -> ProjectedRow {
    let payload = record.payload();

    let mut values = Vec::with_capacity(4 + schema.additional_columns().len());
    values.push(("channel".to_string(), DbValue::from(record.channel.as_str())));
    values.push(("level".to_string(), DbValue::Integer(record.level.value())));
    values.push(("message".to_string(), DbValue::from(record.message.as_str())));
    values.push((
        TIME_COLUMN.to_string(),
        schema.time_encoding().encode(&record.datetime),
    ));

    for column in schema.additional_columns() {
        let value = payload
            .get(column)
            .map(|v| v.to_db_value())
            .unwrap_or(DbValue::Null);
        values.push((column.clone(), value));
    }

    ProjectedRow { values }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::level::Level;
    use crate::time::TimeEncoding;
    use chrono::{TimeZone, Utc};

    fn record() -> Record {
        Record::new("app", Level::Warning, "disk almost full")
            .at(Utc.with_ymd_and_hms(2024, 3, 9, 14, 5, 7).unwrap())
    }

    #[test]
    fn test_defaults_come_first_in_fixed_order() {
        let schema = Schema::new("log", ["username"]).unwrap();
        let row = project(&record().with_context("username", "ada"), &schema);

        assert_eq!(
            row.column_names().collect::<Vec<_>>(),
            vec!["channel", "level", "message", "time", "username"]
        );
        assert_eq!(row.get("level"), Some(&DbValue::Integer(300)));
        assert_eq!(row.get("time"), Some(&DbValue::Integer(1709993107)));
        assert_eq!(row.get("username"), Some(&DbValue::from("ada")));
    }

    #[test]
    fn test_missing_fields_are_null_and_unknown_fields_dropped() {
        let schema = Schema::new("log", ["username", "userid"]).unwrap();
        let row = project(
            &record()
                .with_context("userid", 7)
                .with_context("ip", "10.0.0.1"),
            &schema,
        );

        assert_eq!(row.get("username"), Some(&DbValue::Null));
        assert_eq!(row.get("userid"), Some(&DbValue::Integer(7)));
        assert_eq!(row.get("ip"), None);
        assert_eq!(row.len(), 6);
    }

    #[test]
    fn test_payload_cannot_override_structural_fields_or_identity() {
        let schema = Schema::new("log", Vec::<String>::new()).unwrap();
        let row = project(
            &record()
                .with_context("id", 99)
                .with_context("channel", "spoofed")
                .with_extra("message", "spoofed"),
            &schema,
        );

        assert_eq!(row.get("id"), None);
        assert_eq!(row.get("channel"), Some(&DbValue::from("app")));
        assert_eq!(row.get("message"), Some(&DbValue::from("disk almost full")));
    }

    #[test]
    fn test_payload_keys_match_declared_spelling_exactly() {
        let schema = Schema::new("log", ["userId"]).unwrap();
        let row = project(&record().with_context("userid", 1), &schema);
        assert_eq!(row.get("userId"), Some(&DbValue::Null));
    }

    #[test]
    fn test_time_follows_schema_encoding() {
        let schema = Schema::new("log", Vec::<String>::new())
            .unwrap()
            .with_time_encoding(TimeEncoding::Datetime);
        let row = project(&record(), &schema);
        assert_eq!(row.get("time"), Some(&DbValue::from("2024-03-09 14:05:07")));
        assert_eq!(row.signature(), "channel,level,message,time");
        assert_eq!(row.named_params()[0].0, ":channel");
    }
}
