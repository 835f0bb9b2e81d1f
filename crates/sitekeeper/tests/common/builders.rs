//! Builders for backup options and table fixtures.

#![allow(dead_code)]

use sitekeeper::BackupOptions;

/// Builder for `BackupOptions`. Starts with nothing selected.
pub struct OptionsBuilder {
    options: BackupOptions,
}

impl OptionsBuilder {
    pub fn new() -> Self {
        Self {
            options: BackupOptions {
                data: false,
                uploads: false,
                themes: false,
                plugins: false,
                filename: None,
                scheduled: false,
            },
        }
    }

    pub fn everything() -> Self {
        Self::new().data().uploads().themes().plugins()
    }

    pub fn data(mut self) -> Self {
        self.options.data = true;
        self
    }

    pub fn uploads(mut self) -> Self {
        self.options.uploads = true;
        self
    }

    pub fn themes(mut self) -> Self {
        self.options.themes = true;
        self
    }

    pub fn plugins(mut self) -> Self {
        self.options.plugins = true;
        self
    }

    pub fn filename(mut self, name: &str) -> Self {
        self.options.filename = Some(name.to_string());
        self
    }

    pub fn build(self) -> BackupOptions {
        self.options
    }
}

impl Default for OptionsBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// A table with an integer key and a text column, filled with `rows` rows.
pub struct TableFixture {
    pub name: &'static str,
    pub rows: usize,
}

impl TableFixture {
    pub const fn new(name: &'static str, rows: usize) -> Self {
        Self { name, rows }
    }

    pub fn sql(&self) -> String {
        let mut sql = format!(
            "CREATE TABLE {} (id INTEGER PRIMARY KEY, label TEXT NOT NULL);\n",
            self.name
        );
        for i in 0..self.rows {
            sql.push_str(&format!(
                "INSERT INTO {} (label) VALUES ('{}-{}');\n",
                self.name, self.name, i
            ));
        }
        sql
    }
}
