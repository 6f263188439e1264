//! Sink configuration.

use serde::{Deserialize, Serialize};

use crate::error::SinkResult;
use crate::level::Level;
use crate::schema::Schema;
use crate::time::TimeEncoding;

/// When the table is reconciled.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Initialization {
    /// On the first record that passes the level threshold.
    #[default]
    Lazy,
    /// While constructing the sink.
    Eager,
    /// Never alter the table; write only the columns it already has.
    Skip,
}

/// Settings for one [`SqlSink`](crate::SqlSink).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SinkConfig {
    /// Log table name.
    pub table: String,

    /// Payload keys stored as their own columns, in column order.
    #[serde(default)]
    pub additional_columns: Vec<String>,

    #[serde(default)]
    pub initialization: Initialization,

    /// Minimum level handled.
    #[serde(default)]
    pub level: Level,

    /// Whether records keep propagating to later handlers.
    #[serde(default = "default_true")]
    pub bubble: bool,

    #[serde(default)]
    pub time_encoding: TimeEncoding,
}

fn default_true() -> bool {
    true
}

impl SinkConfig {
    pub fn new(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            additional_columns: Vec::new(),
            initialization: Initialization::default(),
            level: Level::default(),
            bubble: default_true(),
            time_encoding: TimeEncoding::default(),
        }
    }

    pub fn with_columns<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.additional_columns = columns.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_initialization(mut self, initialization: Initialization) -> Self {
        self.initialization = initialization;
        self
    }

    pub fn with_level(mut self, level: Level) -> Self {
        self.level = level;
        self
    }

    pub fn with_bubble(mut self, bubble: bool) -> Self {
        self.bubble = bubble;
        self
    }

    pub fn with_time_encoding(mut self, time_encoding: TimeEncoding) -> Self {
        self.time_encoding = time_encoding;
        self
    }

    /// Validated schema for this configuration.
    pub fn schema(&self) -> SinkResult<Schema> {
        Schema::new(&self.table, &self.additional_columns)
            .map(|schema| schema.with_time_encoding(self.time_encoding))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_minimal_toml_uses_defaults() {
        let config: SinkConfig = toml::from_str(r#"table = "log""#).unwrap();
        assert_eq!(config, SinkConfig::new("log"));
        assert!(config.bubble);
        assert_eq!(config.initialization, Initialization::Lazy);
        assert_eq!(config.level, Level::Debug);
        assert_eq!(config.time_encoding, TimeEncoding::UnixSeconds);
    }

    #[test]
    fn test_numeric_level_in_toml() {
        let config: SinkConfig = toml::from_str("table = \"log\"\nlevel = 300").unwrap();
        assert_eq!(config.level, Level::Warning);

        let err = toml::from_str::<SinkConfig>("table = \"log\"\nlevel = 301");
        assert!(err.is_err());
    }

    #[test]
    fn test_full_toml() {
        let config: SinkConfig = toml::from_str(
            r#"
            table = "app_log"
            additional_columns = ["username", "userid"]
            initialization = "skip"
            level = "warning"
            bubble = false
            time_encoding = "datetime"
            "#,
        )
        .unwrap();

        assert_eq!(
            config,
            SinkConfig::new("app_log")
                .with_columns(["username", "userid"])
                .with_initialization(Initialization::Skip)
                .with_level(Level::Warning)
                .with_bubble(false)
                .with_time_encoding(TimeEncoding::Datetime)
        );
        let schema = config.schema().unwrap();
        assert_eq!(schema.additional_columns(), &["username", "userid"]);
        assert_eq!(schema.time_encoding(), TimeEncoding::Datetime);
    }

    #[test]
    fn test_schema_rejects_bad_names() {
        assert!(SinkConfig::new("bad table").schema().is_err());
    }
}
