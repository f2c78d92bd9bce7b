use std::collections::BTreeSet;

use rusqlite::{Connection, OptionalExtension, Row, params};

use cadence_core::{BeatId, DatabaseMeasure, MeasureId, ModifiedMeasure, NewMeasure};

use crate::error::StorageError;
use crate::sqlite::with_savepoint;
use crate::tables::UpdateBuilder;

const SELECT_MEASURES: &str = "SELECT id, start_beat, rehearsal_mark, notes FROM measures";

fn read_measure(row: &Row) -> rusqlite::Result<DatabaseMeasure> {
    Ok(DatabaseMeasure {
        id: MeasureId::new(row.get(0)?),
        start_beat: BeatId::new(row.get(1)?),
        rehearsal_mark: row.get(2)?,
        notes: row.get(3)?,
    })
}

pub fn get_measures(conn: &Connection) -> Result<Vec<DatabaseMeasure>, StorageError> {
    let mut stmt = conn.prepare(&format!("{SELECT_MEASURES} ORDER BY id"))?;
    let measures = stmt
        .query_map([], read_measure)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(measures)
}

fn require_measure(conn: &Connection, id: i64) -> Result<DatabaseMeasure, StorageError> {
    conn.query_row(&format!("{SELECT_MEASURES} WHERE id = ?1"), [id], read_measure)
        .optional()?
        .ok_or_else(|| StorageError::NotFound(format!("measure {id}")))
}

pub fn create_measures(
    conn: &Connection,
    new_measures: &[NewMeasure],
) -> Result<Vec<DatabaseMeasure>, StorageError> {
    with_savepoint(conn, "create_measures", |conn| {
        let mut created = Vec::with_capacity(new_measures.len());
        for measure in new_measures {
            conn.execute(
                "INSERT INTO measures (start_beat, rehearsal_mark, notes) VALUES (?1, ?2, ?3)",
                params![measure.start_beat.get(), measure.rehearsal_mark, measure.notes],
            )?;
            created.push(require_measure(conn, conn.last_insert_rowid())?);
        }
        Ok(created)
    })
}

pub fn update_measures(
    conn: &Connection,
    modified: &[ModifiedMeasure],
) -> Result<Vec<DatabaseMeasure>, StorageError> {
    with_savepoint(conn, "update_measures", |conn| {
        let mut updated = Vec::with_capacity(modified.len());
        for measure in modified {
            let mut update = UpdateBuilder::new("measures").touching_updated_at();
            update
                .set_opt("start_beat", measure.start_beat.map(BeatId::get))
                .set_opt("rehearsal_mark", measure.rehearsal_mark.clone())
                .set_opt("notes", measure.notes.clone());
            if !update.execute(conn, measure.id.get())? {
                return Err(StorageError::NotFound(format!("measure {}", measure.id)));
            }
            updated.push(require_measure(conn, measure.id.get())?);
        }
        Ok(updated)
    })
}

pub fn delete_measures(
    conn: &Connection,
    ids: &BTreeSet<MeasureId>,
) -> Result<Vec<DatabaseMeasure>, StorageError> {
    with_savepoint(conn, "delete_measures", |conn| {
        let mut deleted = Vec::with_capacity(ids.len());
        for id in ids {
            deleted.push(require_measure(conn, id.get())?);
            conn.execute("DELETE FROM measures WHERE id = ?1", [id.get()])?;
        }
        Ok(deleted)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sqlite::ShowStorage;
    use crate::tables::beats::create_beats;
    use cadence_core::NewBeat;

    #[test]
    fn measures_follow_their_start_beat() -> Result<(), Box<dyn std::error::Error>> {
        let storage = ShowStorage::open_in_memory()?;
        let conn = storage.conn();
        let beats = create_beats(conn, &[NewBeat::with_duration(0.5), NewBeat::with_duration(0.5)], None)?;

        let created = create_measures(conn, &[NewMeasure::starting_at(beats[0].id)])?;
        assert_eq!(get_measures(conn)?, created);

        let err = create_measures(conn, &[NewMeasure::starting_at(beats[0].id)]).unwrap_err();
        assert!(matches!(err, StorageError::ConstraintViolation(_)));

        let mut change = ModifiedMeasure::new(created[0].id);
        change.rehearsal_mark = Some(Some("A".into()));
        assert_eq!(update_measures(conn, &[change])?[0].rehearsal_mark.as_deref(), Some("A"));

        let missing = BTreeSet::from([MeasureId::new(77)]);
        assert!(matches!(delete_measures(conn, &missing).unwrap_err(), StorageError::NotFound(_)));
        delete_measures(conn, &BTreeSet::from([created[0].id]))?;
        assert!(get_measures(conn)?.is_empty());
        Ok(())
    }
}
