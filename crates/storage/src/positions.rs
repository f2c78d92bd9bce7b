//! Ordered position manager.
//!
//! Positional tables carry an `id` and a `UNIQUE` integer `position`.
//! Position 0 belongs to the sentinel row; every other row sits at 1 or
//! above. All operations run inside a savepoint, so a failure leaves the
//! table as it was.

use std::collections::BTreeSet;

use rusqlite::{Connection, OptionalExtension, params};
use serde::Serialize;

use crate::error::StorageError;
use crate::schema::{self, quote_ident};
use crate::sqlite::with_savepoint;

/// Lowest position an ordinary row may take.
pub const MIN_POSITION: i64 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PositionedRow {
    pub id: i64,
    pub position: i64,
}

/// A new row that knows how to insert itself at a given position.
pub trait PositionalInsert {
    /// Insert the row at `position` and return its id.
    fn insert_at(&self, conn: &Connection, position: i64) -> Result<i64, StorageError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PositionalTable {
    pub name: &'static str,
    /// Id of the row pinned at position 0, if the table has one.
    pub sentinel_id: Option<i64>,
}

pub const BEATS: PositionalTable = PositionalTable {
    name: schema::BEATS,
    sentinel_id: Some(0),
};

impl PositionalTable {
    pub const fn new(name: &'static str) -> Self {
        Self {
            name,
            sentinel_id: None,
        }
    }

    fn ident(&self) -> String {
        quote_ident(self.name)
    }

    /// All rows ordered by position.
    pub fn rows(&self, conn: &Connection) -> Result<Vec<PositionedRow>, StorageError> {
        self.rows_from(conn, i64::MIN)
    }

    fn rows_from(&self, conn: &Connection, start: i64) -> Result<Vec<PositionedRow>, StorageError> {
        let mut stmt = conn.prepare(&format!(
            "SELECT id, position FROM {} WHERE position >= ?1 ORDER BY position",
            self.ident()
        ))?;
        let rows = stmt
            .query_map([start], |row| {
                Ok(PositionedRow {
                    id: row.get(0)?,
                    position: row.get(1)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// Highest position in use, 0 for a table holding only its sentinel.
    pub fn max_position(&self, conn: &Connection) -> Result<i64, StorageError> {
        Ok(conn.query_row(
            &format!("SELECT COALESCE(MAX(position), 0) FROM {}", self.ident()),
            [],
            |row| row.get(0),
        )?)
    }

    fn is_sentinel(&self, id: i64) -> bool {
        self.sentinel_id == Some(id)
    }

    fn set_position(&self, conn: &Connection, id: i64, position: i64) -> Result<(), StorageError> {
        conn.execute(
            &format!("UPDATE {} SET position = ?1 WHERE id = ?2", self.ident()),
            params![position, id],
        )?;
        Ok(())
    }

    /// Move every row at or after `start` by `amount`. Returns the moved rows
    /// with their new positions.
    pub fn shift_range(
        &self,
        conn: &Connection,
        start: i64,
        amount: i64,
    ) -> Result<Vec<PositionedRow>, StorageError> {
        if amount == 0 {
            return Ok(Vec::new());
        }
        with_savepoint(conn, "shift_range", |conn| self.shift_unchecked(conn, start, amount))
    }

    fn shift_unchecked(
        &self,
        conn: &Connection,
        start: i64,
        amount: i64,
    ) -> Result<Vec<PositionedRow>, StorageError> {
        let mut rows = self.rows_from(conn, start)?;
        for row in &mut rows {
            let target = row.position.checked_add(amount).ok_or_else(|| {
                StorageError::InvalidPosition(format!("shift of {amount} overflows"))
            })?;
            if !self.is_sentinel(row.id) && target < MIN_POSITION {
                return Err(StorageError::InvalidPosition(format!(
                    "shifting row {} by {amount} would move it to position {target}",
                    row.id
                )));
            }
            row.position = target;
        }

        // Moving up, the highest row must move first; moving down, the lowest.
        if amount > 0 {
            rows.reverse();
        }
        for row in &rows {
            self.set_position(conn, row.id, row.position)?;
        }
        if amount > 0 {
            rows.reverse();
        }
        Ok(rows)
    }

    /// Insert `items` in order. Without `starting`, they go after the last
    /// row; with it, they take `starting + 1 ..` and later rows move up.
    pub fn insert<T: PositionalInsert>(
        &self,
        conn: &Connection,
        items: &[T],
        starting: Option<i64>,
    ) -> Result<Vec<PositionedRow>, StorageError> {
        if items.is_empty() {
            return Ok(Vec::new());
        }
        with_savepoint(conn, "positional_insert", |conn| {
            let max = self.max_position(conn)?;
            let first = match starting {
                None => max + 1,
                Some(p) if p < 0 || p > max => {
                    return Err(StorageError::InvalidPosition(format!(
                        "cannot insert after position {p}; positions run from 0 to {max}"
                    )));
                }
                Some(p) => {
                    self.shift_unchecked(conn, p + 1, items.len() as i64)?;
                    p + 1
                }
            };

            let mut created = Vec::with_capacity(items.len());
            for (item, position) in items.iter().zip(first..) {
                let id = item.insert_at(conn, position)?;
                created.push(PositionedRow { id, position });
            }
            Ok(created)
        })
    }

    /// Renumber ordinary rows to 1..N keeping their order. Returns the rows
    /// whose position changed.
    pub fn flatten_order(&self, conn: &Connection) -> Result<Vec<PositionedRow>, StorageError> {
        with_savepoint(conn, "flatten_order", |conn| self.flatten_unchecked(conn))
    }

    fn flatten_unchecked(&self, conn: &Connection) -> Result<Vec<PositionedRow>, StorageError> {
        let mut changed = Vec::new();
        // Ascending order only ever moves a row into a slot already vacated.
        for (row, position) in self.rows_from(conn, MIN_POSITION)?.into_iter().zip(MIN_POSITION..) {
            if row.position != position {
                self.set_position(conn, row.id, position)?;
                changed.push(PositionedRow { id: row.id, position });
            }
        }
        Ok(changed)
    }

    /// Delete rows by id and close the gaps they leave. Fails without
    /// deleting anything if any id is missing.
    pub fn delete(
        &self,
        conn: &Connection,
        ids: &BTreeSet<i64>,
    ) -> Result<Vec<PositionedRow>, StorageError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        with_savepoint(conn, "positional_delete", |conn| {
            let mut deleted = Vec::with_capacity(ids.len());
            for &id in ids {
                let position: Option<i64> = conn
                    .query_row(
                        &format!("SELECT position FROM {} WHERE id = ?1", self.ident()),
                        [id],
                        |row| row.get(0),
                    )
                    .optional()?;
                let Some(position) = position else {
                    return Err(StorageError::NotFound(format!("{} row {id}", self.name)));
                };
                conn.execute(&format!("DELETE FROM {} WHERE id = ?1", self.ident()), [id])?;
                deleted.push(PositionedRow { id, position });
            }
            self.flatten_unchecked(conn)?;
            Ok(deleted)
        })
    }
}
