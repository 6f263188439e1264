//! SQL text helpers shared by the backend and the schema engine.

/// Quote an identifier for SQLite, doubling embedded quotes.
pub fn quote_ident(name: &str) -> String {
    let mut escaped = String::with_capacity(name.len() + 2);
    escaped.push('"');
    for ch in name.chars() {
        if ch == '"' {
            escaped.push('"');
        }
        escaped.push(ch);
    }
    escaped.push('"');
    escaped
}

/// First keyword of a statement, used as a low-cardinality span field.
pub fn sql_op_name(sql: &str) -> &str {
    sql.split_whitespace().next().unwrap_or("unknown")
}

/// Stable short hash identifying a statement in traces.
pub fn hash_sql(sql: &str) -> String {
    // FNV-1a 64-bit
    let mut hash: u64 = 0xcbf29ce484222325;
    for byte in sql.as_bytes() {
        hash ^= *byte as u64;
        hash = hash.wrapping_mul(0x100000001b3);
    }
    format!("{:016x}", hash)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quote_ident_wraps_and_escapes() {
        assert_eq!(quote_ident("logs"), "\"logs\"");
        assert_eq!(quote_ident("we\"ird"), "\"we\"\"ird\"");
    }

    #[test]
    fn test_sql_op_name_takes_first_word() {
        assert_eq!(sql_op_name("  ALTER TABLE \"t\" ADD \"c\" TEXT"), "ALTER");
        assert_eq!(sql_op_name(""), "unknown");
    }

    #[test]
    fn test_hash_sql_is_stable_and_distinct() {
        assert_eq!(hash_sql("SELECT 1"), hash_sql("SELECT 1"));
        assert_ne!(hash_sql("SELECT 1"), hash_sql("SELECT 2"));
        assert_eq!(hash_sql("SELECT 1").len(), 16);
    }
}
