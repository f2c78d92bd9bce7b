//! Typed row access per table.

pub mod audio;
pub mod beats;
pub mod measures;
pub mod pages;
pub mod singletons;

use rusqlite::Connection;
use rusqlite::types::Value;

use crate::error::StorageError;
use crate::schema::quote_ident;

/// Builds `UPDATE <table> SET ... WHERE id = ?` from the fields a caller
/// actually supplied.
pub(crate) struct UpdateBuilder {
    table: &'static str,
    sets: Vec<(&'static str, Value)>,
    touch: bool,
}

impl UpdateBuilder {
    pub fn new(table: &'static str) -> Self {
        Self {
            table,
            sets: Vec::new(),
            touch: false,
        }
    }

    /// Also bump `updated_at` when anything changes.
    pub fn touching_updated_at(mut self) -> Self {
        self.touch = true;
        self
    }

    pub fn set(&mut self, column: &'static str, value: impl Into<Value>) -> &mut Self {
        self.sets.push((column, value.into()));
        self
    }

    pub fn set_opt<V: Into<Value>>(&mut self, column: &'static str, value: Option<V>) -> &mut Self {
        if let Some(value) = value {
            self.set(column, value);
        }
        self
    }

    /// Returns false when no row has this id.
    pub fn execute(&self, conn: &Connection, id: i64) -> Result<bool, StorageError> {
        let table = quote_ident(self.table);
        if self.sets.is_empty() {
            let found = conn.query_row(
                &format!("SELECT EXISTS (SELECT 1 FROM {table} WHERE id = ?1)"),
                [id],
                |row| row.get::<_, bool>(0),
            )?;
            return Ok(found);
        }

        let mut assignments: Vec<String> = self
            .sets
            .iter()
            .enumerate()
            .map(|(i, (column, _))| format!("{} = ?{}", quote_ident(column), i + 1))
            .collect();
        if self.touch {
            assignments.push("updated_at = CURRENT_TIMESTAMP".into());
        }
        let sql = format!(
            "UPDATE {table} SET {} WHERE id = ?{}",
            assignments.join(", "),
            self.sets.len() + 1
        );

        let mut params: Vec<&dyn rusqlite::ToSql> =
            self.sets.iter().map(|(_, v)| v as &dyn rusqlite::ToSql).collect();
        params.push(&id);
        let changed = conn.execute(&sql, params.as_slice())?;
        Ok(changed > 0)
    }
}
