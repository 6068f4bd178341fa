//! SQL text helpers: identifier checks/quoting and literal rendering.
//!
//! Identifiers are restricted to plain `[A-Za-z_][A-Za-z0-9_]*` names, so
//! quoting never needs escaping. Literals target the Trino dialect Athena
//! speaks for DML.

use newsflow_core::Value;

/// Whether `name` is a plain SQL identifier.
pub fn is_plain_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Double-quoted identifier for DML statements.
pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Backtick-quoted identifier for Hive-style DDL statements.
pub fn quote_ddl_ident(name: &str) -> String {
    format!("`{}`", name.replace('`', "``"))
}

/// Single-quoted string literal with embedded quotes doubled.
pub fn quote_str(s: &str) -> String {
    format!("'{}'", s.replace('\'', "''"))
}

/// Render a value as a SQL literal.
pub fn literal(value: &Value) -> String {
    match value {
        Value::Null => "NULL".to_string(),
        Value::String(s) => quote_str(s),
        Value::Int64(v) => v.to_string(),
        Value::Float64(v) if v.is_nan() => "nan()".to_string(),
        Value::Float64(v) if v.is_infinite() && *v > 0.0 => "infinity()".to_string(),
        Value::Float64(v) if v.is_infinite() => "-infinity()".to_string(),
        Value::Float64(v) => format!("DOUBLE '{v}'"),
        Value::Bool(true) => "TRUE".to_string(),
        Value::Bool(false) => "FALSE".to_string(),
        Value::Timestamp(ts) => format!("TIMESTAMP '{}'", ts.format("%Y-%m-%d %H:%M:%S%.6f")),
        Value::Date(d) => format!("DATE '{}'", d.format("%Y-%m-%d")),
    }
}
