//! Storage encodings for the `time` column.

use chrono::{DateTime, NaiveDateTime, Utc};
use logtable_db::DbValue;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::{SinkError, SinkResult};

const DATETIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// How record timestamps are stored in the `time` column.
///
/// Each encoding owns a distinct declared column type, which is how the live
/// encoding of an existing table is recognized.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimeEncoding {
    /// Whole seconds since the Unix epoch.
    #[default]
    UnixSeconds,
    /// Milliseconds since the Unix epoch.
    UnixMillis,
    /// `YYYY-MM-DD HH:MM:SS` in UTC.
    Datetime,
}

impl TimeEncoding {
    pub fn sql_type(self) -> &'static str {
        match self {
            TimeEncoding::UnixSeconds => "INTEGER UNSIGNED",
            TimeEncoding::UnixMillis => "BIGINT UNSIGNED",
            TimeEncoding::Datetime => "DATETIME",
        }
    }

    /// Recognize an encoding from a declared column type.
    pub fn from_sql_type(declared: &str) -> Option<Self> {
        let normalized = declared.split_whitespace().collect::<Vec<_>>().join(" ");
        [
            TimeEncoding::UnixSeconds,
            TimeEncoding::UnixMillis,
            TimeEncoding::Datetime,
        ]
        .into_iter()
        .find(|encoding| encoding.sql_type().eq_ignore_ascii_case(&normalized))
    }

    pub fn encode(self, datetime: &DateTime<Utc>) -> DbValue {
        match self {
            TimeEncoding::UnixSeconds => DbValue::Integer(datetime.timestamp()),
            TimeEncoding::UnixMillis => DbValue::Integer(datetime.timestamp_millis()),
            TimeEncoding::Datetime => DbValue::Text(datetime.format(DATETIME_FORMAT).to_string()),
        }
    }

    /// Read back a stored value. `NULL` stays `None`.
    pub fn decode(self, value: &DbValue) -> SinkResult<Option<DateTime<Utc>>> {
        let decoded = match (self, value) {
            (_, DbValue::Null) => return Ok(None),
            (TimeEncoding::UnixSeconds, DbValue::Integer(secs)) => {
                DateTime::from_timestamp(*secs, 0)
            }
            (TimeEncoding::UnixMillis, DbValue::Integer(millis)) => {
                DateTime::from_timestamp_millis(*millis)
            }
            (TimeEncoding::Datetime, DbValue::Text(text)) => {
                NaiveDateTime::parse_from_str(text, DATETIME_FORMAT)
                    .ok()
                    .map(|naive| naive.and_utc())
            }
            // Integer-affinity columns keep numeric text as text when it does not parse cleanly.
            (TimeEncoding::UnixSeconds | TimeEncoding::UnixMillis, DbValue::Text(text)) => {
                let parsed = text.trim().parse::<i64>().map_err(|e| {
                    SinkError::time_encoding(value, format!("not an integer: {}", e))
                })?;
                return self.decode(&DbValue::Integer(parsed));
            }
            _ => {
                return Err(SinkError::time_encoding(
                    value,
                    format!("unexpected storage type for {} encoding", self),
                ))
            }
        };

        decoded
            .map(Some)
            .ok_or_else(|| SinkError::time_encoding(value, format!("out of range for {}", self)))
    }

    /// Convert a value stored as `from` into this encoding.
    pub fn recode_from(self, from: TimeEncoding, value: &DbValue) -> SinkResult<DbValue> {
        Ok(match from.decode(value)? {
            Some(datetime) => self.encode(&datetime),
            None => DbValue::Null,
        })
    }
}

impl fmt::Display for TimeEncoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            TimeEncoding::UnixSeconds => "unix_seconds",
            TimeEncoding::UnixMillis => "unix_millis",
            TimeEncoding::Datetime => "datetime",
        })
    }
}

impl FromStr for TimeEncoding {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "unix_seconds" | "unix" | "seconds" => Ok(TimeEncoding::UnixSeconds),
            "unix_millis" | "millis" => Ok(TimeEncoding::UnixMillis),
            "datetime" => Ok(TimeEncoding::Datetime),
            other => Err(format!(
                "unknown time encoding '{}' (expected unix_seconds, unix_millis or datetime)",
                other
            )),
        }
    }
}
