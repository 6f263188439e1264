//! Error types for the log sink.

use logtable_db::BackendError;
use thiserror::Error;

/// Sink operation result type.
pub type SinkResult<T> = std::result::Result<T, SinkError>;

/// Errors returned while synchronizing the table or writing a record.
///
/// Every variant is fatal to the call that produced it. Nothing is retried.
#[derive(Debug, Error)]
pub enum SinkError {
    /// The storage could not be opened or reached.
    #[error("Cannot reach log storage: {source}")]
    Connection {
        #[source]
        source: BackendError,
    },

    /// The live columns of the table could not be read.
    #[error("Cannot read columns of table '{table}': {source}")]
    SchemaIntrospection {
        table: String,
        #[source]
        source: BackendError,
    },

    /// A structural statement failed. Earlier statements stay applied.
    #[error("Schema change failed ({statement}): {source}")]
    Ddl {
        statement: String,
        #[source]
        source: BackendError,
    },

    /// The insert for one record failed.
    #[error("Insert into '{table}' failed: {source}")]
    Insert {
        table: String,
        #[source]
        source: BackendError,
    },

    /// A table or column name is not a plain SQL identifier, or is reserved.
    #[error("Invalid identifier '{0}': expected [A-Za-z_][A-Za-z0-9_]* and not a reserved name")]
    InvalidIdentifier(String),

    /// A stored time value cannot be converted to the selected encoding.
    #[error("Cannot recode time value {value}: {reason}")]
    TimeEncoding { value: String, reason: String },
}

impl SinkError {
    pub(crate) fn introspection(table: &str, source: BackendError) -> Self {
        Self::SchemaIntrospection {
            table: table.to_string(),
            source,
        }
    }

    pub(crate) fn ddl(statement: impl Into<String>, source: BackendError) -> Self {
        Self::Ddl {
            statement: statement.into(),
            source,
        }
    }

    pub(crate) fn time_encoding(value: impl ToString, reason: impl Into<String>) -> Self {
        Self::TimeEncoding {
            value: value.to_string(),
            reason: reason.into(),
        }
    }
}

// Only reached through `Executor::in_transaction` when BEGIN/COMMIT/ROLLBACK fail.
impl From<BackendError> for SinkError {
    fn from(source: BackendError) -> Self {
        Self::Ddl {
            statement: "transaction control".to_string(),
            source,
        }
    }
}
