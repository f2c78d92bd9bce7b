use std::collections::BTreeSet;

use rusqlite::{Connection, OptionalExtension, Row, params};

use cadence_core::{BeatId, DatabaseBeat, ModifiedBeat, NewBeat};

use crate::error::StorageError;
use crate::positions::{BEATS, PositionalInsert};
use crate::sqlite::with_savepoint;
use crate::tables::UpdateBuilder;

const SELECT_BEATS: &str =
    "SELECT id, position, duration, include_in_measure, notes, created_at, updated_at FROM beats";

fn read_beat(row: &Row) -> rusqlite::Result<DatabaseBeat> {
    Ok(DatabaseBeat {
        id: BeatId::new(row.get(0)?),
        position: row.get(1)?,
        duration: row.get(2)?,
        include_in_measure: row.get(3)?,
        notes: row.get(4)?,
        created_at: row.get(5)?,
        updated_at: row.get(6)?,
    })
}

impl PositionalInsert for NewBeat {
    fn insert_at(&self, conn: &Connection, position: i64) -> Result<i64, StorageError> {
        conn.execute(
            "INSERT INTO beats (position, duration, include_in_measure, notes) VALUES (?1, ?2, ?3, ?4)",
            params![position, self.duration, self.include_in_measure, self.notes],
        )?;
        Ok(conn.last_insert_rowid())
    }
}

/// Every beat, the first beat included, ordered by position.
pub fn get_beats(conn: &Connection) -> Result<Vec<DatabaseBeat>, StorageError> {
    let mut stmt = conn.prepare(&format!("{SELECT_BEATS} ORDER BY position"))?;
    let beats = stmt
        .query_map([], read_beat)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(beats)
}

pub fn get_beat(conn: &Connection, id: BeatId) -> Result<Option<DatabaseBeat>, StorageError> {
    Ok(conn
        .query_row(&format!("{SELECT_BEATS} WHERE id = ?1"), [id.get()], read_beat)
        .optional()?)
}

fn require_beat(conn: &Connection, id: i64) -> Result<DatabaseBeat, StorageError> {
    get_beat(conn, BeatId::new(id))?.ok_or_else(|| StorageError::NotFound(format!("beat {id}")))
}

/// Insert beats in order, after the last beat or right after `starting`.
pub fn create_beats(
    conn: &Connection,
    new_beats: &[NewBeat],
    starting: Option<i64>,
) -> Result<Vec<DatabaseBeat>, StorageError> {
    for beat in new_beats {
        beat.validate()?;
    }
    let created = BEATS.insert(conn, new_beats, starting)?;
    created.iter().map(|row| require_beat(conn, row.id)).collect()
}

pub fn update_beats(
    conn: &Connection,
    modified: &[ModifiedBeat],
) -> Result<Vec<DatabaseBeat>, StorageError> {
    for beat in modified {
        beat.validate()?;
    }
    with_savepoint(conn, "update_beats", |conn| {
        let mut updated = Vec::with_capacity(modified.len());
        for beat in modified {
            let mut update = UpdateBuilder::new("beats").touching_updated_at();
            update
                .set_opt("duration", beat.duration)
                .set_opt("include_in_measure", beat.include_in_measure)
                .set_opt("notes", beat.notes.clone());
            if !update.execute(conn, beat.id.get())? {
                return Err(StorageError::NotFound(format!("beat {}", beat.id)));
            }
            updated.push(require_beat(conn, beat.id.get())?);
        }
        Ok(updated)
    })
}

/// Delete beats, then renumber the rest. Returns the deleted rows as they
/// were before deletion.
pub fn delete_beats(
    conn: &Connection,
    ids: &BTreeSet<BeatId>,
) -> Result<Vec<DatabaseBeat>, StorageError> {
    let mut deleted = Vec::with_capacity(ids.len());
    for id in ids {
        deleted.push(require_beat(conn, id.get())?);
    }
    let raw: BTreeSet<i64> = ids.iter().map(|id| id.get()).collect();
    BEATS.delete(conn, &raw)?;
    Ok(deleted)
}

/// Move beats at or after `start` by `amount`. Returns the moved beats.
pub fn shift_beats(
    conn: &Connection,
    start: i64,
    amount: i64,
) -> Result<Vec<DatabaseBeat>, StorageError> {
    let moved = BEATS.shift_range(conn, start, amount)?;
    moved.iter().map(|row| require_beat(conn, row.id)).collect()
}

/// Renumber beats to 1..N. Returns the beats whose position changed.
pub fn flatten_order(conn: &Connection) -> Result<Vec<DatabaseBeat>, StorageError> {
    let changed = BEATS.flatten_order(conn)?;
    changed.iter().map(|row| require_beat(conn, row.id)).collect()
}
