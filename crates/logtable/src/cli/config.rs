//! Config file loading and flag overrides.
//!
//! ```toml
//! database = "/var/lib/app/log.db"
//!
//! [sink]
//! table = "log"
//! additional_columns = ["username", "userid"]
//! level = "info"
//! time_encoding = "datetime"
//! ```

use anyhow::{Context, Result};
use logtable_sink::{Initialization, Level, SinkConfig, TimeEncoding};
use serde::Deserialize;
use std::path::{Path, PathBuf};

pub const DEFAULT_TABLE: &str = "log";
const DEFAULT_DB_FILE: &str = "logtable.db";
const CONFIG_FILE: &str = "config.toml";

#[derive(Debug, Default, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct FileConfig {
    /// Path to the database file, or a `sqlite:` URL.
    pub database: Option<String>,
    #[serde(default)]
    pub sink: SinkSection,
}

/// `[sink]` table; every key is optional so flags can fill the gaps.
#[derive(Debug, Default, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct SinkSection {
    pub table: Option<String>,
    pub additional_columns: Option<Vec<String>>,
    pub initialization: Option<Initialization>,
    pub level: Option<Level>,
    pub bubble: Option<bool>,
    pub time_encoding: Option<TimeEncoding>,
}

/// Values given on the command line or through the environment.
#[derive(Debug, Default, Clone)]
pub struct Overrides {
    pub database: Option<String>,
    pub table: Option<String>,
    pub columns: Vec<String>,
    pub time_encoding: Option<TimeEncoding>,
}

#[derive(Debug, Clone)]
pub struct Resolved {
    pub database: String,
    pub sink: SinkConfig,
}

pub fn load_file(path: &Path) -> Result<FileConfig> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;
    toml::from_str(&text).with_context(|| format!("Invalid config file: {}", path.display()))
}

/// Explicit `--config`, else `$LOGTABLE_HOME/config.toml` when it exists.
pub fn load(explicit: Option<&Path>) -> Result<FileConfig> {
    if let Some(path) = explicit {
        return load_file(path);
    }
    let default_path = default_config_path()?;
    if default_path.exists() {
        load_file(&default_path)
    } else {
        Ok(FileConfig::default())
    }
}

pub fn default_config_path() -> Result<PathBuf> {
    Ok(logtable_logging::logtable_home()?.join(CONFIG_FILE))
}

pub fn default_database() -> Result<String> {
    let path = logtable_logging::logtable_home()?.join(DEFAULT_DB_FILE);
    Ok(path.display().to_string())
}

/// Flags win over the file; the file wins over built-in defaults.
pub fn resolve(file: FileConfig, overrides: &Overrides) -> Result<Resolved> {
    let database = match overrides.database.clone().or(file.database) {
        Some(database) => database,
        None => default_database()?,
    };

    let section = file.sink;
    let table = overrides
        .table
        .clone()
        .or(section.table)
        .unwrap_or_else(|| DEFAULT_TABLE.to_string());

    let mut sink = SinkConfig::new(table);
    sink.additional_columns = if overrides.columns.is_empty() {
        section.additional_columns.unwrap_or_default()
    } else {
        overrides.columns.clone()
    };
    if let Some(initialization) = section.initialization {
        sink.initialization = initialization;
    }
    if let Some(level) = section.level {
        sink.level = level;
    }
    if let Some(bubble) = section.bubble {
        sink.bubble = bubble;
    }
    if let Some(encoding) = overrides.time_encoding.or(section.time_encoding) {
        sink.time_encoding = encoding;
    }

    sink.schema().context("Invalid table or column name")?;
    Ok(Resolved { database, sink })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn overrides() -> Overrides {
        Overrides {
            database: Some("sqlite::memory:".to_string()),
            ..Overrides::default()
        }
    }

    #[test]
    fn test_file_values_are_used_when_no_flags() {
        let file: FileConfig = toml::from_str(
            r#"
            database = "/tmp/app.db"

            [sink]
            table = "app_log"
            additional_columns = ["username"]
            level = "notice"
            initialization = "eager"
            "#,
        )
        .unwrap();

        let resolved = resolve(file, &Overrides::default()).unwrap();
        assert_eq!(resolved.database, "/tmp/app.db");
        assert_eq!(resolved.sink.table, "app_log");
        assert_eq!(resolved.sink.additional_columns, vec!["username"]);
        assert_eq!(resolved.sink.level, Level::Notice);
        assert_eq!(resolved.sink.initialization, Initialization::Eager);
        assert_eq!(resolved.sink.time_encoding, TimeEncoding::UnixSeconds);
    }

    #[test]
    fn test_flags_override_file() {
        let file: FileConfig = toml::from_str(
            r#"
            [sink]
            table = "app_log"
            additional_columns = ["username"]
            time_encoding = "unix_millis"
            "#,
        )
        .unwrap();
        let flags = Overrides {
            table: Some("audit".to_string()),
            columns: vec!["actor".to_string(), "action".to_string()],
            time_encoding: Some(TimeEncoding::Datetime),
            ..overrides()
        };

        let resolved = resolve(file, &flags).unwrap();
        assert_eq!(resolved.database, "sqlite::memory:");
        assert_eq!(resolved.sink.table, "audit");
        assert_eq!(resolved.sink.additional_columns, vec!["actor", "action"]);
        assert_eq!(resolved.sink.time_encoding, TimeEncoding::Datetime);
    }

    #[test]
    fn test_defaults_without_file() {
        let resolved = resolve(FileConfig::default(), &overrides()).unwrap();
        assert_eq!(resolved.sink, SinkConfig::new(DEFAULT_TABLE));
    }

    #[test]
    fn test_unknown_keys_are_rejected() {
        assert!(toml::from_str::<FileConfig>("databse = \"x\"").is_err());
        assert!(toml::from_str::<FileConfig>("[sink]\ncolumns = []").is_err());
    }

    #[test]
    fn test_bad_names_fail_resolution() {
        let flags = Overrides {
            table: Some("my table".to_string()),
            ..overrides()
        };
        assert!(resolve(FileConfig::default(), &flags).is_err());
    }
}
