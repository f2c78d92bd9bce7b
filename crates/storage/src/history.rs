//! Trigger-driven undo/redo log.
//!
//! Every tracked table gets three `AFTER` triggers that write the inverse of
//! the change (as SQL text) into `history_undo`, tagged with the current edit
//! group. Replaying a group executes those statements; while replaying, the
//! triggers route the inverse of each replayed write into the opposite log so
//! the action can be redone (or undone again).
//!
//! `history_stats.replay_mode` selects where trigger output goes:
//!
//! | mode | meaning        | undo log             | redo log          |
//! |------|----------------|----------------------|-------------------|
//! | 0    | normal edit    | current group        | cleared           |
//! | 1    | undoing        | -                    | replayed group    |
//! | 2    | redoing        | replayed group       | -                 |
//! | 3    | compensating   | -                    | -                 |
//!
//! Entries of a group are always replayed newest first. For undo that is
//! reverse chronological order. The redo log of a group is written in that
//! reversed order, so replaying it newest first reproduces the original action
//! order. Both directions therefore pass back through the same intermediate
//! row states the user action went through, which keeps `UNIQUE` columns such
//! as `beats.position` free of transient collisions.

use std::collections::BTreeSet;

use rusqlite::{Connection, OptionalExtension, params};
use serde::Serialize;
use tracing::debug;

use crate::error::StorageError;
use crate::schema::{quote_ident, quote_literal, table_columns};

pub const UNDO_TABLE: &str = "history_undo";
pub const REDO_TABLE: &str = "history_redo";
pub const STATS_TABLE: &str = "history_stats";

pub const DEFAULT_GROUP_LIMIT: i64 = 500;

const MODE_NORMAL: i64 = 0;
const MODE_UNDOING: i64 = 1;
const MODE_REDOING: i64 = 2;
const MODE_SILENT: i64 = 3;

const HISTORY_TABLES_SQL: &str = "
    CREATE TABLE IF NOT EXISTS history_undo (
        sequence      INTEGER PRIMARY KEY,
        history_group INTEGER NOT NULL,
        table_name    TEXT NOT NULL,
        sql           TEXT NOT NULL
    );
    CREATE INDEX IF NOT EXISTS history_undo_group ON history_undo (history_group);

    CREATE TABLE IF NOT EXISTS history_redo (
        sequence      INTEGER PRIMARY KEY,
        history_group INTEGER NOT NULL,
        table_name    TEXT NOT NULL,
        sql           TEXT NOT NULL
    );
    CREATE INDEX IF NOT EXISTS history_redo_group ON history_redo (history_group);

    CREATE TABLE IF NOT EXISTS history_stats (
        id             INTEGER PRIMARY KEY CHECK (id = 1),
        cur_undo_group INTEGER NOT NULL DEFAULT 0,
        group_limit    INTEGER NOT NULL DEFAULT 500,
        replay_mode    INTEGER NOT NULL DEFAULT 0,
        replay_group   INTEGER NOT NULL DEFAULT 0
    );
    INSERT OR IGNORE INTO history_stats (id) VALUES (1);
";

/// Create the log tables and the stats row if they are missing.
pub fn create_tables(conn: &Connection) -> Result<(), StorageError> {
    conn.execute_batch(HISTORY_TABLES_SQL)?;
    Ok(())
}

/// Result of replaying one group.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub enum HistoryOutcome {
    Applied {
        group: i64,
        statements: usize,
        /// Tables written by the replay, so callers know what to re-read.
        tables: BTreeSet<String>,
    },
    /// Nothing to undo or redo.
    #[default]
    Empty,
}

impl HistoryOutcome {
    pub fn is_applied(&self) -> bool {
        matches!(self, Self::Applied { .. })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct HistoryStats {
    pub current_group: i64,
    pub group_limit: i64,
    pub undo_groups: usize,
    pub redo_groups: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Direction {
    Undo,
    Redo,
}

impl Direction {
    fn source(&self) -> &'static str {
        match self {
            Self::Undo => UNDO_TABLE,
            Self::Redo => REDO_TABLE,
        }
    }

    fn mode(&self) -> i64 {
        match self {
            Self::Undo => MODE_UNDOING,
            Self::Redo => MODE_REDOING,
        }
    }
}

/// SQL for the three history triggers of `table`. Column lists are baked in,
/// so triggers must be rebuilt after any DDL touching the table.
pub fn trigger_sql(table: &str, columns: &[String]) -> String {
    let ident = quote_ident(table);
    let name = |event: &str| quote_ident(&format!("history_{table}_{event}"));

    let insert_inverse = format!(
        "{} || NEW.rowid",
        quote_literal(&format!("DELETE FROM {ident} WHERE rowid="))
    );

    let assignments = columns
        .iter()
        .enumerate()
        .map(|(i, column)| {
            let lead = if i == 0 { "" } else { "," };
            format!(
                "{} || quote(OLD.{})",
                quote_literal(&format!("{lead}{}=", quote_ident(column))),
                quote_ident(column)
            )
        })
        .collect::<Vec<_>>()
        .join(" || ");
    let update_inverse = format!(
        "{} || {assignments} || {} || NEW.rowid",
        quote_literal(&format!("UPDATE {ident} SET ")),
        quote_literal(" WHERE rowid="),
    );

    let column_list = columns
        .iter()
        .map(|c| quote_ident(c))
        .collect::<Vec<_>>()
        .join(",");
    let values = columns
        .iter()
        .map(|c| format!("quote(OLD.{})", quote_ident(c)))
        .collect::<Vec<_>>()
        .join(" || ',' || ");
    let delete_inverse = format!(
        "{} || {values} || ')'",
        quote_literal(&format!("INSERT INTO {ident} ({column_list}) VALUES ("))
    );

    [
        (name("insert"), "INSERT", insert_inverse),
        (name("update"), "UPDATE", update_inverse),
        (name("delete"), "DELETE", delete_inverse),
    ]
    .into_iter()
    .map(|(trigger, event, inverse)| log_trigger(&trigger, event, &ident, table, &inverse))
    .collect::<Vec<_>>()
    .join("\n")
}

fn log_trigger(trigger: &str, event: &str, ident: &str, table: &str, inverse: &str) -> String {
    let table_literal = quote_literal(table);
    format!(
        "CREATE TRIGGER IF NOT EXISTS {trigger} AFTER {event} ON {ident}
         BEGIN
             DELETE FROM history_redo
                 WHERE (SELECT replay_mode FROM history_stats WHERE id = 1) = {MODE_NORMAL};
             INSERT INTO history_undo (history_group, table_name, sql)
                 SELECT CASE replay_mode WHEN {MODE_NORMAL} THEN cur_undo_group ELSE replay_group END,
                        {table_literal}, {inverse}
                 FROM history_stats WHERE id = 1 AND replay_mode IN ({MODE_NORMAL}, {MODE_REDOING});
             INSERT INTO history_redo (history_group, table_name, sql)
                 SELECT replay_group, {table_literal}, {inverse}
                 FROM history_stats WHERE id = 1 AND replay_mode = {MODE_UNDOING};
         END;"
    )
}

pub fn create_triggers(conn: &Connection, table: &str) -> Result<(), StorageError> {
    let columns = table_columns(conn, "main", table)?;
    if columns.is_empty() {
        return Err(StorageError::NotFound(format!("table {table}")));
    }
    conn.execute_batch(&trigger_sql(table, &columns))?;
    Ok(())
}

/// Handle on the edit group that subsequent tracked writes are logged under.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EditGroup {
    id: i64,
    /// Highest undo sequence before this handle was taken. Compensation only
    /// touches entries written after it.
    since: i64,
    /// `cur_undo_group` before [`EditGroup::begin`] allocated this group.
    /// Restored when the group ends up logging nothing.
    previous: Option<i64>,
}

impl EditGroup {
    /// Allocate a new group number. Nothing is trimmed until
    /// [`EditGroup::finish`].
    pub fn begin(conn: &Connection) -> Result<Self, StorageError> {
        let previous: i64 = conn.query_row(
            "SELECT cur_undo_group FROM history_stats WHERE id = 1",
            [],
            |row| row.get(0),
        )?;
        conn.execute(
            "UPDATE history_stats
             SET cur_undo_group = MAX(cur_undo_group, COALESCE((SELECT MAX(history_group) FROM history_undo), 0)) + 1
             WHERE id = 1",
            [],
        )?;
        let group = Self {
            previous: Some(previous),
            ..Self::current(conn)?
        };
        debug!(group = group.id, "began edit group");
        Ok(group)
    }

    /// Join the group currently receiving writes.
    pub fn current(conn: &Connection) -> Result<Self, StorageError> {
        let id: i64 = conn.query_row(
            "SELECT cur_undo_group FROM history_stats WHERE id = 1",
            [],
            |row| row.get(0),
        )?;
        let since: i64 = conn.query_row(
            "SELECT COALESCE(MAX(sequence), 0) FROM history_undo",
            [],
            |row| row.get(0),
        )?;
        Ok(Self {
            id,
            since,
            previous: None,
        })
    }

    pub fn id(&self) -> i64 {
        self.id
    }

    /// Close out a successful action. If it logged anything, groups beyond
    /// `group_limit` are trimmed, oldest first. A begun group that logged
    /// nothing gives its number back, so a later join lands on the previous
    /// action.
    pub fn finish(&self, conn: &Connection) -> Result<(), StorageError> {
        if logged_since(conn, self.id, self.since)? {
            let trimmed = conn.execute(
                "DELETE FROM history_undo WHERE history_group IN (
                     SELECT DISTINCT history_group FROM history_undo
                     ORDER BY history_group DESC
                     LIMIT -1 OFFSET MAX((SELECT group_limit FROM history_stats WHERE id = 1), 1)
                 )",
                [],
            )?;
            if trimmed > 0 {
                debug!(group = self.id, entries = trimmed, "trimmed old undo groups");
            }
        } else {
            self.release(conn)?;
        }
        Ok(())
    }

    /// Revert every write logged under this handle, without touching either
    /// log's earlier content. Returns the number of statements replayed.
    pub fn rollback(&self, conn: &mut Connection) -> Result<usize, StorageError> {
        let tx = conn.transaction()?;
        tx.execute_batch("PRAGMA defer_foreign_keys = ON;")?;
        let statements = {
            let mut stmt = tx.prepare(
                "SELECT sql FROM history_undo
                 WHERE history_group = ?1 AND sequence > ?2
                 ORDER BY sequence DESC",
            )?;
            stmt.query_map(params![self.id, self.since], |row| row.get::<_, String>(0))?
                .collect::<Result<Vec<_>, _>>()?
        };

        set_replay(&tx, MODE_SILENT, self.id)?;
        for sql in &statements {
            tx.execute_batch(sql)?;
        }
        tx.execute(
            "DELETE FROM history_undo WHERE history_group = ?1 AND sequence > ?2",
            params![self.id, self.since],
        )?;
        set_replay(&tx, MODE_NORMAL, 0)?;
        self.release(&tx)?;
        tx.commit()?;

        debug!(group = self.id, statements = statements.len(), "rolled back edit group");
        Ok(statements.len())
    }

    /// Hand a begun group's number back if nothing is logged under it.
    fn release(&self, conn: &Connection) -> Result<(), StorageError> {
        let Some(previous) = self.previous else {
            return Ok(());
        };
        if logged_since(conn, self.id, 0)? {
            return Ok(());
        }
        conn.execute(
            "UPDATE history_stats SET cur_undo_group = ?1 WHERE id = 1 AND cur_undo_group = ?2",
            params![previous, self.id],
        )?;
        Ok(())
    }
}

fn logged_since(conn: &Connection, group: i64, since: i64) -> Result<bool, StorageError> {
    Ok(conn.query_row(
        "SELECT EXISTS (SELECT 1 FROM history_undo WHERE history_group = ?1 AND sequence > ?2)",
        params![group, since],
        |row| row.get(0),
    )?)
}

fn set_replay(conn: &Connection, mode: i64, group: i64) -> Result<(), StorageError> {
    conn.execute(
        "UPDATE history_stats SET replay_mode = ?1, replay_group = ?2 WHERE id = 1",
        params![mode, group],
    )?;
    Ok(())
}

pub fn perform_undo(conn: &mut Connection) -> Result<HistoryOutcome, StorageError> {
    replay(conn, Direction::Undo)
}

pub fn perform_redo(conn: &mut Connection) -> Result<HistoryOutcome, StorageError> {
    replay(conn, Direction::Redo)
}

fn replay(conn: &mut Connection, direction: Direction) -> Result<HistoryOutcome, StorageError> {
    let source = direction.source();
    let tx = conn.transaction()?;
    tx.execute_batch("PRAGMA defer_foreign_keys = ON;")?;

    // Most recently written group, which for redo is the last one undone.
    let group: Option<i64> = tx
        .query_row(
            &format!("SELECT history_group FROM {source} ORDER BY sequence DESC LIMIT 1"),
            [],
            |row| row.get(0),
        )
        .optional()?;
    let Some(group) = group else {
        return Ok(HistoryOutcome::Empty);
    };

    let entries = {
        let mut stmt = tx.prepare(&format!(
            "SELECT table_name, sql FROM {source} WHERE history_group = ?1 ORDER BY sequence DESC"
        ))?;
        stmt.query_map([group], |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)))?
            .collect::<Result<Vec<_>, _>>()?
    };

    set_replay(&tx, direction.mode(), group)?;
    let mut tables = BTreeSet::new();
    for (table, sql) in &entries {
        tx.execute_batch(sql)?;
        tables.insert(table.clone());
    }
    tx.execute(
        &format!("DELETE FROM {source} WHERE history_group = ?1"),
        [group],
    )?;
    set_replay(&tx, MODE_NORMAL, 0)?;
    tx.commit()?;

    debug!(?direction, group, statements = entries.len(), "replayed history group");
    Ok(HistoryOutcome::Applied {
        group,
        statements: entries.len(),
        tables,
    })
}

/// Number of groups in the undo and redo logs.
pub fn history_depth(conn: &Connection) -> Result<(usize, usize), StorageError> {
    let count = |table: &str| -> Result<usize, StorageError> {
        let n: i64 = conn.query_row(
            &format!("SELECT COUNT(DISTINCT history_group) FROM {table}"),
            [],
            |row| row.get(0),
        )?;
        Ok(n as usize)
    };
    Ok((count(UNDO_TABLE)?, count(REDO_TABLE)?))
}

pub fn stats(conn: &Connection) -> Result<HistoryStats, StorageError> {
    let (current_group, group_limit): (i64, i64) = conn.query_row(
        "SELECT cur_undo_group, group_limit FROM history_stats WHERE id = 1",
        [],
        |row| Ok((row.get(0)?, row.get(1)?)),
    )?;
    let (undo_groups, redo_groups) = history_depth(conn)?;
    Ok(HistoryStats {
        current_group,
        group_limit,
        undo_groups,
        redo_groups,
    })
}

pub fn set_group_limit(conn: &Connection, limit: i64) -> Result<(), StorageError> {
    if limit < 1 {
        return Err(StorageError::Core(cadence_core::CoreError::InvalidData(format!(
            "undo group limit must be at least 1, got {limit}"
        ))));
    }
    conn.execute(
        "UPDATE history_stats SET group_limit = ?1 WHERE id = 1",
        [limit],
    )?;
    Ok(())
}

/// Empty both logs, e.g. after seeding a new file.
pub fn clear(conn: &Connection) -> Result<(), StorageError> {
    conn.execute_batch(
        "DELETE FROM history_undo;
         DELETE FROM history_redo;
         UPDATE history_stats SET cur_undo_group = 0, replay_mode = 0, replay_group = 0 WHERE id = 1;",
    )?;
    Ok(())
}
