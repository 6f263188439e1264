//! Parameterized insert statements for projected rows.

use tracing::trace;

use crate::ddl;
use crate::projector::ProjectedRow;
use crate::schema::IDENTITY_COLUMN;

/// An `INSERT` for one column set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InsertStatement {
    pub sql: String,
    pub signature: String,
}

/// Build the insert for `row`. The identity column is never written.
pub fn build(table: &str, row: &ProjectedRow) -> InsertStatement {
    let columns = row
        .column_names()
        .filter(|c| !c.eq_ignore_ascii_case(IDENTITY_COLUMN));
    InsertStatement {
        sql: ddl::insert_sql(table, columns),
        signature: row.signature(),
    }
}

/// Last built statement, reused while the row shape stays the same.
#[derive(Debug, Default)]
pub struct InsertCache {
    current: Option<InsertStatement>,
}

impl InsertCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn statement(&mut self, table: &str, row: &ProjectedRow) -> &InsertStatement {
        let signature = row.signature();
        let stale = self
            .current
            .as_ref()
            .map_or(true, |stmt| stmt.signature != signature);
        if stale {
            trace!(table, columns = %signature, "Building insert statement");
            self.current = None;
        }
        self.current.get_or_insert_with(|| build(table, row))
    }

    /// Forget the cached statement, e.g. after the table was altered.
    pub fn invalidate(&mut self) {
        self.current = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::level::Level;
    use crate::projector::project;
    use crate::record::Record;
    use crate::schema::Schema;

    #[test]
    fn test_insert_names_every_projected_column() {
        let schema = Schema::new("log", ["username", "userid"]).unwrap();
        let row = project(&Record::new("app", Level::Info, "hi"), &schema);
        let stmt = build("log", &row);

        assert_eq!(
            stmt.sql,
            "INSERT INTO \"log\" (\"channel\", \"level\", \"message\", \"time\", \"username\", \"userid\") \
             VALUES (:channel, :level, :message, :time, :username, :userid);"
        );
        assert!(!stmt.sql.contains("\"id\""));
    }

    #[test]
    fn test_cache_rebuilds_only_when_columns_change() {
        let record = Record::new("app", Level::Info, "hi");
        let narrow = Schema::new("log", ["a"]).unwrap();
        let wide = Schema::new("log", ["a", "b"]).unwrap();

        let mut cache = InsertCache::new();
        let first = cache.statement("log", &project(&record, &narrow)).clone();
        let again = cache.statement("log", &project(&record, &narrow)).clone();
        assert_eq!(first, again);

        let widened = cache.statement("log", &project(&record, &wide)).clone();
        assert_ne!(first.signature, widened.signature);
        assert!(widened.sql.contains(":b"));
    }
}
