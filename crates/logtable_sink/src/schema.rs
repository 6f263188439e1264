//! Desired and live column sets.
//!
//! The column set of a log table is data, not code: a [`Schema`] is the fixed
//! default columns plus an ordered list of caller-declared additional names.
//! The synchronizer, the projector and the insert builder all consume the same
//! value.
//!
//! Column names are compared ASCII case-insensitively when matching against
//! storage, because SQLite treats `UserId` and `userid` as the same column.
//! Payload keys, on the other hand, must match the declared spelling exactly.

use tracing::debug;

use crate::error::{SinkError, SinkResult};
use crate::time::TimeEncoding;

/// Auto-generated primary key; never written by the sink.
pub const IDENTITY_COLUMN: &str = "id";

/// Column holding the encoded record timestamp.
pub const TIME_COLUMN: &str = "time";

/// Structural columns every log table has, in storage order.
pub const DEFAULT_COLUMNS: [&str; 4] = ["channel", "level", "message", TIME_COLUMN];

/// Scratch column used while the time column is rewritten; never declarable.
pub const RECODE_STAGING_COLUMN: &str = "time__recode";

const TABLE_COLUMNS: [&str; 5] = [IDENTITY_COLUMN, "channel", "level", "message", TIME_COLUMN];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ColumnRole {
    Identity,
    Default,
    Additional,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Column {
    pub name: String,
    pub role: ColumnRole,
}

/// Whether two names address the same storage column.
pub fn same_column(a: &str, b: &str) -> bool {
    a.eq_ignore_ascii_case(b)
}

/// Identity or default column name, in any letter case.
pub fn is_reserved(name: &str) -> bool {
    same_column(name, IDENTITY_COLUMN) || DEFAULT_COLUMNS.iter().any(|c| same_column(c, name))
}

/// Table and column names are interpolated as quoted identifiers and reused as
/// `:name` parameters, so they are restricted to plain identifiers.
pub fn validate_identifier(name: &str) -> SinkResult<()> {
    let mut chars = name.chars();
    let valid = match chars.next() {
        Some(first) if first.is_ascii_alphabetic() || first == '_' => {
            chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
        }
        _ => false,
    };
    if valid {
        Ok(())
    } else {
        Err(SinkError::InvalidIdentifier(name.to_string()))
    }
}

/// Desired column set of one log table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Schema {
    table: String,
    additional: Vec<String>,
    time_encoding: TimeEncoding,
}

impl Schema {
    /// Build a schema, validating names.
    ///
    /// Additional names that collide with a default column, or repeat an
    /// earlier additional name, are ignored.
    pub fn new<I, S>(table: impl Into<String>, additional: I) -> SinkResult<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let table = table.into();
        validate_identifier(&table)?;

        let mut columns: Vec<String> = Vec::new();
        for name in additional {
            let name = name.into();
            validate_identifier(&name)?;
            if same_column(&name, RECODE_STAGING_COLUMN) {
                return Err(SinkError::InvalidIdentifier(name));
            }
            if is_reserved(&name) {
                debug!(column = %name, "Ignoring additional column that names a default column");
                continue;
            }
            if columns.iter().any(|c| same_column(c, &name)) {
                debug!(column = %name, "Ignoring duplicate additional column");
                continue;
            }
            columns.push(name);
        }

        Ok(Self {
            table,
            additional: columns,
            time_encoding: TimeEncoding::default(),
        })
    }

    pub fn with_time_encoding(mut self, time_encoding: TimeEncoding) -> Self {
        self.time_encoding = time_encoding;
        self
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    pub fn time_encoding(&self) -> TimeEncoding {
        self.time_encoding
    }

    pub fn additional_columns(&self) -> &[String] {
        &self.additional
    }

    /// Identity column followed by the default columns.
    pub fn default_columns() -> impl Iterator<Item = &'static str> {
        TABLE_COLUMNS.into_iter()
    }

    /// Every column name the schema declares, identity first.
    pub fn columns(&self) -> impl Iterator<Item = &str> + '_ {
        let defaults: [&str; 5] = TABLE_COLUMNS;
        defaults
            .into_iter()
            .chain(self.additional.iter().map(String::as_str))
    }

    pub fn column_defs(&self) -> Vec<Column> {
        self.columns()
            .map(|name| Column {
                name: name.to_string(),
                role: self.role_of(name).unwrap_or(ColumnRole::Additional),
            })
            .collect()
    }

    /// Role of a declared column, matched by exact spelling.
    pub fn role_of(&self, name: &str) -> Option<ColumnRole> {
        if name == IDENTITY_COLUMN {
            Some(ColumnRole::Identity)
        } else if DEFAULT_COLUMNS.iter().any(|c| *c == name) {
            Some(ColumnRole::Default)
        } else if self.additional.iter().any(|c| c == name) {
            Some(ColumnRole::Additional)
        } else {
            None
        }
    }

    pub fn contains(&self, name: &str) -> bool {
        self.role_of(name).is_some()
    }

    /// Narrow the additional columns to those present in storage.
    pub fn restricted_to(&self, live: &LiveColumns) -> Schema {
        Schema {
            table: self.table.clone(),
            additional: self
                .additional
                .iter()
                .filter(|c| live.contains(c))
                .cloned()
                .collect(),
            time_encoding: self.time_encoding,
        }
    }
}

/// Column names present in storage at one point in time, in table order.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct LiveColumns(Vec<String>);

impl LiveColumns {
    pub fn new(names: Vec<String>) -> Self {
        Self(names)
    }

    pub fn names(&self) -> &[String] {
        &self.0
    }

    pub fn contains(&self, name: &str) -> bool {
        self.0.iter().any(|c| same_column(c, name))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_columns_are_defaults_then_additional() {
        let schema = Schema::new("log", ["username", "userid"]).unwrap();
        let columns: Vec<&str> = schema.columns().collect();
        assert_eq!(
            columns,
            vec!["id", "channel", "level", "message", "time", "username", "userid"]
        );
    }

    #[test]
    fn test_default_names_and_duplicates_are_ignored() {
        let schema = Schema::new(
            "log",
            ["channel", "CORRELATION", "Level", "errorFile", "correlation", "ID"],
        )
        .unwrap();
        assert_eq!(schema.additional_columns(), &["CORRELATION", "errorFile"]);
    }

    #[test]
    fn test_rejects_non_identifiers() {
        assert!(matches!(
            Schema::new("log", ["user name"]),
            Err(SinkError::InvalidIdentifier(_))
        ));
        assert!(Schema::new("log; DROP TABLE x", Vec::<String>::new()).is_err());
        assert!(Schema::new("", Vec::<String>::new()).is_err());
        assert!(Schema::new("_log2", ["a1", "_b"]).is_ok());
    }

    #[test]
    fn test_rejects_recode_staging_column() {
        for name in ["time__recode", "TIME__Recode"] {
            assert!(matches!(
                Schema::new("log", ["username", name]),
                Err(SinkError::InvalidIdentifier(rejected)) if rejected == name
            ));
        }
    }

    #[test]
    fn test_roles_are_matched_exactly() {
        let schema = Schema::new("log", ["username"]).unwrap();
        assert_eq!(schema.role_of("id"), Some(ColumnRole::Identity));
        assert_eq!(schema.role_of("time"), Some(ColumnRole::Default));
        assert_eq!(schema.role_of("username"), Some(ColumnRole::Additional));
        assert_eq!(schema.role_of("UserName"), None);
        assert_eq!(schema.column_defs().len(), 6);
    }

    #[test]
    fn test_restricted_to_keeps_only_live_additional_columns() {
        let schema = Schema::new("log", ["username", "userid"]).unwrap();
        let live = LiveColumns::new(
            ["id", "channel", "level", "message", "time", "USERNAME"]
                .into_iter()
                .map(String::from)
                .collect(),
        );
        let narrowed = schema.restricted_to(&live);
        assert_eq!(narrowed.additional_columns(), &["username"]);
        assert_eq!(narrowed.table(), "log");
    }
}
