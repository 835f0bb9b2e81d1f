//! Statement-log replay.

use std::path::Path;
use std::sync::LazyLock;

use regex::Regex;

use super::tabular::StatementSink;
use super::DatabaseError;

static RE_TERMINATOR: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r";[ \t]*(?:\r\n|\n|\r)").unwrap());

const STATEMENT_PREVIEW_CHARS: usize = 120;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoadReport {
    pub statements: usize,
    pub rows_affected: usize,
}

/// Splits a statement log into executable statements, in file order.
/// Whole-line `--` comments and blank chunks are dropped.
pub fn split_statements(content: &str) -> Vec<String> {
    RE_TERMINATOR
        .split(content)
        .map(|chunk| {
            chunk
                .lines()
                .filter(|line| !line.trim_start().starts_with("--"))
                .collect::<Vec<_>>()
                .join("\n")
                .trim()
                .trim_end_matches(';')
                .to_string()
        })
        .filter(|statement| !statement.is_empty())
        .collect()
}

/// Executes every statement of `content` against `sink`.
///
/// Statements affecting zero rows are fine. The first statement the sink
/// rejects stops the replay with [`DatabaseError::MalformedStatement`].
pub fn apply_statements<S>(sink: &S, content: &str) -> Result<LoadReport, DatabaseError>
where
    S: StatementSink + ?Sized,
{
    let mut report = LoadReport::default();
    for (index, statement) in split_statements(content).iter().enumerate() {
        match sink.execute(statement) {
            Ok(rows) => {
                report.statements += 1;
                report.rows_affected += rows;
            }
            Err(DatabaseError::Sqlite(source)) => {
                return Err(DatabaseError::MalformedStatement {
                    index,
                    statement: preview(statement),
                    source,
                });
            }
            Err(e) => return Err(e),
        }
    }
    log::info!(
        "Applied {} statements ({} rows affected)",
        report.statements,
        report.rows_affected
    );
    Ok(report)
}

/// Reads the whole statement log at `path` and applies it.
pub fn apply_file<S>(sink: &S, path: &Path) -> Result<LoadReport, DatabaseError>
where
    S: StatementSink + ?Sized,
{
    let content = std::fs::read_to_string(path).map_err(|e| DatabaseError::Io {
        path: path.to_path_buf(),
        source: e,
    })?;
    apply_statements(sink, &content)
}

fn preview(statement: &str) -> String {
    let mut chars = statement.chars();
    let head: String = chars.by_ref().take(STATEMENT_PREVIEW_CHARS).collect();
    if chars.next().is_some() {
        format!("{}...", head)
    } else {
        head
    }
}
