//! Tabular source and statement sink seams over the site database.

use rusqlite::types::ValueRef;

use super::{Database, DatabaseError};

/// A single column value read from a table.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    Null,
    Integer(i64),
    Real(f64),
    Text(String),
    Blob(Vec<u8>),
}

impl From<ValueRef<'_>> for SqlValue {
    fn from(value: ValueRef<'_>) -> Self {
        match value {
            ValueRef::Null => SqlValue::Null,
            ValueRef::Integer(i) => SqlValue::Integer(i),
            ValueRef::Real(f) => SqlValue::Real(f),
            ValueRef::Text(bytes) => SqlValue::Text(String::from_utf8_lossy(bytes).into_owned()),
            ValueRef::Blob(bytes) => SqlValue::Blob(bytes.to_vec()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchemaObjectKind {
    Index,
    Trigger,
    View,
}

impl SchemaObjectKind {
    fn from_type(kind: &str) -> Option<Self> {
        match kind {
            "index" => Some(Self::Index),
            "trigger" => Some(Self::Trigger),
            "view" => Some(Self::View),
            _ => None,
        }
    }

    pub fn as_sql(self) -> &'static str {
        match self {
            Self::Index => "INDEX",
            Self::Trigger => "TRIGGER",
            Self::View => "VIEW",
        }
    }
}

/// A schema object that lives beside the tables.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchemaObject {
    pub kind: SchemaObjectKind,
    pub name: String,
    pub sql: String,
}

/// Read side used by the backup data step.
pub trait TabularSource {
    /// User table names in a stable order.
    fn list_tables(&self) -> Result<Vec<String>, DatabaseError>;

    /// The statement that recreates `table`.
    fn schema_statement(&self, table: &str) -> Result<String, DatabaseError>;

    fn row_count(&self, table: &str) -> Result<u64, DatabaseError>;

    /// Explicit indexes, triggers and views, in creation order.
    fn schema_objects(&self) -> Result<Vec<SchemaObject>, DatabaseError>;

    /// Rows `offset..offset + limit` in stable (rowid or primary key) order.
    fn fetch_rows(
        &self,
        table: &str,
        offset: u64,
        limit: usize,
    ) -> Result<Vec<Vec<SqlValue>>, DatabaseError>;
}

/// Write side used by the restore database step.
pub trait StatementSink {
    /// Executes one statement and returns the number of affected rows.
    fn execute(&self, statement: &str) -> Result<usize, DatabaseError>;
}

/// Double-quoted SQL identifier.
pub fn quote_identifier(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

impl Database {
    fn create_sql(&self, table: &str) -> Result<String, DatabaseError> {
        self.with_conn(|conn| {
            let sql: String = conn.query_row(
                "SELECT sql FROM sqlite_master WHERE type = 'table' AND name = ?1",
                [table],
                |r| r.get(0),
            )?;
            Ok(sql)
        })
    }

    /// Quoted primary key columns of `table`, in key order.
    fn primary_key_columns(&self, table: &str) -> Result<Vec<String>, DatabaseError> {
        self.with_conn(|conn| {
            let mut stmt =
                conn.prepare("SELECT name FROM pragma_table_info(?1) WHERE pk > 0 ORDER BY pk")?;
            let columns = stmt
                .query_map([table], |r| r.get::<_, String>(0))?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(columns.iter().map(|c| quote_identifier(c)).collect())
        })
    }
}

impl TabularSource for Database {
    fn list_tables(&self) -> Result<Vec<String>, DatabaseError> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT name FROM sqlite_master
                 WHERE type = 'table' AND name NOT LIKE 'sqlite_%'
                 ORDER BY name",
            )?;
            let names = stmt
                .query_map([], |r| r.get::<_, String>(0))?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(names)
        })
    }

    fn schema_statement(&self, table: &str) -> Result<String, DatabaseError> {
        self.create_sql(table)
    }

    fn row_count(&self, table: &str) -> Result<u64, DatabaseError> {
        self.with_conn(|conn| {
            let count: i64 = conn.query_row(
                &format!("SELECT COUNT(*) FROM {}", quote_identifier(table)),
                [],
                |r| r.get(0),
            )?;
            Ok(count.max(0) as u64)
        })
    }

    fn schema_objects(&self) -> Result<Vec<SchemaObject>, DatabaseError> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT type, name, sql FROM sqlite_master
                 WHERE type IN ('index', 'trigger', 'view')
                   AND sql IS NOT NULL
                   AND name NOT LIKE 'sqlite_%'
                   AND tbl_name NOT LIKE 'sqlite_%'
                 ORDER BY rowid",
            )?;
            let rows = stmt
                .query_map([], |r| {
                    Ok((r.get::<_, String>(0)?, r.get::<_, String>(1)?, r.get::<_, String>(2)?))
                })?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(rows
                .into_iter()
                .filter_map(|(kind, name, sql)| {
                    SchemaObjectKind::from_type(&kind).map(|kind| SchemaObject { kind, name, sql })
                })
                .collect())
        })
    }

    fn fetch_rows(
        &self,
        table: &str,
        offset: u64,
        limit: usize,
    ) -> Result<Vec<Vec<SqlValue>>, DatabaseError> {
        let without_rowid = self
            .create_sql(table)?
            .to_ascii_uppercase()
            .contains("WITHOUT ROWID");
        let order = if without_rowid {
            let keys = self.primary_key_columns(table)?;
            if keys.is_empty() {
                String::new()
            } else {
                format!(" ORDER BY {}", keys.join(", "))
            }
        } else {
            " ORDER BY rowid".to_string()
        };
        let sql = format!(
            "SELECT * FROM {}{} LIMIT ?1 OFFSET ?2",
            quote_identifier(table),
            order
        );

        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&sql)?;
            let columns = stmt.column_count();
            let mut rows = stmt.query(rusqlite::params![limit as i64, offset as i64])?;
            let mut out = Vec::new();
            while let Some(row) = rows.next()? {
                let mut values = Vec::with_capacity(columns);
                for i in 0..columns {
                    values.push(SqlValue::from(row.get_ref(i)?));
                }
                out.push(values);
            }
            Ok(out)
        })
    }
}

impl StatementSink for Database {
    fn execute(&self, statement: &str) -> Result<usize, DatabaseError> {
        self.with_conn(|conn| Ok(conn.execute(statement, [])?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seeded() -> Database {
        let db = Database::open_in_memory().unwrap();
        db.with_conn(|conn| {
            conn.execute_batch(
                "CREATE TABLE posts (id INTEGER PRIMARY KEY, title TEXT, score REAL, body BLOB);
                 CREATE TABLE \"odd \"\"name\" (k TEXT PRIMARY KEY, v TEXT) WITHOUT ROWID;
                 INSERT INTO posts (title, score, body) VALUES ('a', 1.5, x'00ff');
                 INSERT INTO posts (title, score, body) VALUES ('b', NULL, NULL);
                 INSERT INTO posts (title, score, body) VALUES ('c', -2.0, NULL);
                 INSERT INTO \"odd \"\"name\" VALUES ('x', '1');",
            )?;
            Ok(())
        })
        .unwrap();
        db
    }

    #[test]
    fn test_list_tables_sorted() {
        let db = seeded();
        assert_eq!(db.list_tables().unwrap(), vec!["odd \"name", "posts"]);
    }

    #[test]
    fn test_schema_statement() {
        let db = seeded();
        let sql = db.schema_statement("posts").unwrap();
        assert!(sql.starts_with("CREATE TABLE posts"));
    }

    #[test]
    fn test_row_count_and_window() {
        let db = seeded();
        assert_eq!(db.row_count("posts").unwrap(), 3);

        let first = db.fetch_rows("posts", 0, 2).unwrap();
        assert_eq!(first.len(), 2);
        assert_eq!(
            first[0],
            vec![
                SqlValue::Integer(1),
                SqlValue::Text("a".to_string()),
                SqlValue::Real(1.5),
                SqlValue::Blob(vec![0x00, 0xff]),
            ]
        );
        assert_eq!(first[1][2], SqlValue::Null);

        let rest = db.fetch_rows("posts", 2, 2).unwrap();
        assert_eq!(rest.len(), 1);
        assert_eq!(rest[0][1], SqlValue::Text("c".to_string()));

        assert!(db.fetch_rows("posts", 3, 2).unwrap().is_empty());
    }

    #[test]
    fn test_fetch_without_rowid_table() {
        let db = seeded();
        let rows = db.fetch_rows("odd \"name", 0, 10).unwrap();
        assert_eq!(rows.len(), 1);
    }

    #[test]
    fn test_without_rowid_windows_follow_key_order() {
        let db = Database::open_in_memory().unwrap();
        db.with_conn(|conn| {
            conn.execute_batch(
                "CREATE TABLE pairs (a INTEGER, b TEXT, PRIMARY KEY (b, a)) WITHOUT ROWID;
                 INSERT INTO pairs VALUES (2, 'm');
                 INSERT INTO pairs VALUES (1, 'z');
                 INSERT INTO pairs VALUES (3, 'a');
                 INSERT INTO pairs VALUES (1, 'm');",
            )?;
            Ok(())
        })
        .unwrap();

        let mut seen = db.fetch_rows("pairs", 0, 3).unwrap();
        seen.extend(db.fetch_rows("pairs", 3, 3).unwrap());
        let keys: Vec<_> = seen.iter().map(|r| (r[1].clone(), r[0].clone())).collect();
        assert_eq!(
            keys,
            vec![
                (SqlValue::Text("a".to_string()), SqlValue::Integer(3)),
                (SqlValue::Text("m".to_string()), SqlValue::Integer(1)),
                (SqlValue::Text("m".to_string()), SqlValue::Integer(2)),
                (SqlValue::Text("z".to_string()), SqlValue::Integer(1)),
            ]
        );
    }

    #[test]
    fn test_schema_objects_skip_automatic_indexes() {
        let db = seeded();
        db.with_conn(|conn| {
            conn.execute_batch(
                "CREATE TABLE tags (name TEXT UNIQUE);
                 CREATE INDEX posts_title ON posts (title);
                 CREATE VIEW scored AS SELECT title FROM posts WHERE score > 0;
                 CREATE TRIGGER posts_tag AFTER INSERT ON posts BEGIN
                   INSERT INTO tags (name) VALUES (new.title);
                 END;",
            )?;
            Ok(())
        })
        .unwrap();

        let objects = db.schema_objects().unwrap();
        let summary: Vec<_> = objects.iter().map(|o| (o.kind, o.name.as_str())).collect();
        assert_eq!(
            summary,
            vec![
                (SchemaObjectKind::Index, "posts_title"),
                (SchemaObjectKind::View, "scored"),
                (SchemaObjectKind::Trigger, "posts_tag"),
            ]
        );
        assert!(objects[2].sql.contains("INSERT INTO tags"));
    }

    #[test]
    fn test_quote_identifier() {
        assert_eq!(quote_identifier("posts"), "\"posts\"");
        assert_eq!(quote_identifier("a\"b"), "\"a\"\"b\"");
    }

    #[test]
    fn test_sink_reports_affected_rows() {
        let db = seeded();
        let changed = db.execute("UPDATE posts SET score = 0").unwrap();
        assert_eq!(changed, 3);
        assert_eq!(db.execute("DELETE FROM posts WHERE id = 99").unwrap(), 0);
    }
}
