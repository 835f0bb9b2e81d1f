//! Statement-log serialization.
//!
//! A statement log is plain SQL text. Every statement ends with `;` followed
//! by a newline, and text values never contain a raw line break (newlines are
//! spelled `char(10)` / `char(13)`), so the loader can split on `;\n`.

use std::fmt::Write as _;
use std::sync::LazyLock;

use regex::Regex;

use super::tabular::{quote_identifier, SchemaObject, SqlValue};

static RE_INNER_TERMINATOR: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r";[ \t]*(?:\r\n|\n|\r)").unwrap());

/// Opening comment block of a statement log.
pub fn header(origin: &str, created: chrono::DateTime<chrono::Utc>) -> String {
    format!(
        "-- sitekeeper statement log\n-- origin: {}\n-- created: {}\n",
        origin.replace(['\n', '\r'], " "),
        created.format("%Y-%m-%d %H:%M:%S UTC")
    )
}

/// Drop-and-recreate block for one table, emitted before its rows.
pub fn schema_block(table: &str, create_sql: &str) -> String {
    format!(
        "\n-- Table structure for table {name}\n\nDROP TABLE IF EXISTS {name};\n{create};\n\n",
        name = quote_identifier(table),
        create = single_statement(create_sql)
    )
}

/// Drop-and-recreate statements for indexes, triggers and views. Emitted
/// once, after the last table. Empty when there are none.
pub fn object_block(objects: &[SchemaObject]) -> String {
    if objects.is_empty() {
        return String::new();
    }
    let mut out = String::from("\n-- Indexes, triggers and views\n\n");
    for object in objects {
        let _ = write!(
            out,
            "DROP {kind} IF EXISTS {name};\n{create};\n",
            kind = object.kind.as_sql(),
            name = quote_identifier(&object.name),
            create = single_statement(&object.sql)
        );
    }
    out
}

/// `sql` as a single log statement. Inner `;` line ends (trigger bodies)
/// are folded so the loader does not split there.
fn single_statement(sql: &str) -> String {
    let sql = sql.trim().trim_end_matches(';').trim_end();
    RE_INNER_TERMINATOR.replace_all(sql, "; ").into_owned()
}

/// One multi-row INSERT for `rows`. Empty when there are no rows.
pub fn insert_block(table: &str, rows: &[Vec<SqlValue>]) -> String {
    if rows.is_empty() {
        return String::new();
    }
    let mut out = format!("INSERT INTO {} VALUES\n", quote_identifier(table));
    for (i, row) in rows.iter().enumerate() {
        if i > 0 {
            out.push_str(",\n");
        }
        out.push('(');
        for (j, value) in row.iter().enumerate() {
            if j > 0 {
                out.push(',');
            }
            out.push_str(&format_value(value));
        }
        out.push(')');
    }
    out.push_str(";\n");
    out
}

/// SQL literal for a value.
pub fn format_value(value: &SqlValue) -> String {
    match value {
        SqlValue::Null => "NULL".to_string(),
        SqlValue::Integer(i) => i.to_string(),
        SqlValue::Real(f) if f.is_nan() => "NULL".to_string(),
        SqlValue::Real(f) if f.is_infinite() => {
            if *f > 0.0 {
                "9e999".to_string()
            } else {
                "-9e999".to_string()
            }
        }
        SqlValue::Real(f) => format!("{:?}", f),
        SqlValue::Text(s) => quote_text(s),
        SqlValue::Blob(bytes) => {
            let mut hex = String::with_capacity(bytes.len() * 2 + 3);
            hex.push_str("X'");
            for b in bytes {
                let _ = write!(hex, "{:02x}", b);
            }
            hex.push('\'');
            hex
        }
    }
}

fn quote_text(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('\'');
    for c in s.chars() {
        match c {
            '\'' => out.push_str("''"),
            '\n' => out.push_str("'||char(10)||'"),
            '\r' => out.push_str("'||char(13)||'"),
            c => out.push(c),
        }
    }
    out.push('\'');
    out
}
