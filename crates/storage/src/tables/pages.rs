use std::collections::BTreeSet;

use rusqlite::{Connection, OptionalExtension, Row, params};

use cadence_core::{BeatId, DatabasePage, ModifiedPage, NewPage, PageId};

use crate::error::StorageError;
use crate::sqlite::with_savepoint;
use crate::tables::UpdateBuilder;

const SELECT_PAGES: &str = "SELECT id, start_beat, is_subset, notes FROM pages";

fn read_page(row: &Row) -> rusqlite::Result<DatabasePage> {
    Ok(DatabasePage {
        id: PageId::new(row.get(0)?),
        start_beat: BeatId::new(row.get(1)?),
        is_subset: row.get(2)?,
        notes: row.get(3)?,
    })
}

pub fn get_pages(conn: &Connection) -> Result<Vec<DatabasePage>, StorageError> {
    let mut stmt = conn.prepare(&format!("{SELECT_PAGES} ORDER BY id"))?;
    let pages = stmt.query_map([], read_page)?.collect::<Result<Vec<_>, _>>()?;
    Ok(pages)
}

fn require_page(conn: &Connection, id: i64) -> Result<DatabasePage, StorageError> {
    conn.query_row(&format!("{SELECT_PAGES} WHERE id = ?1"), [id], read_page)
        .optional()?
        .ok_or_else(|| StorageError::NotFound(format!("page {id}")))
}

pub fn create_pages(conn: &Connection, new_pages: &[NewPage]) -> Result<Vec<DatabasePage>, StorageError> {
    with_savepoint(conn, "create_pages", |conn| {
        let mut created = Vec::with_capacity(new_pages.len());
        for page in new_pages {
            conn.execute(
                "INSERT INTO pages (start_beat, is_subset, notes) VALUES (?1, ?2, ?3)",
                params![page.start_beat.get(), page.is_subset, page.notes],
            )?;
            created.push(require_page(conn, conn.last_insert_rowid())?);
        }
        Ok(created)
    })
}

pub fn update_pages(
    conn: &Connection,
    modified: &[ModifiedPage],
) -> Result<Vec<DatabasePage>, StorageError> {
    with_savepoint(conn, "update_pages", |conn| {
        let mut updated = Vec::with_capacity(modified.len());
        for page in modified {
            let mut update = UpdateBuilder::new("pages").touching_updated_at();
            update
                .set_opt("start_beat", page.start_beat.map(BeatId::get))
                .set_opt("is_subset", page.is_subset)
                .set_opt("notes", page.notes.clone());
            if !update.execute(conn, page.id.get())? {
                return Err(StorageError::NotFound(format!("page {}", page.id)));
            }
            updated.push(require_page(conn, page.id.get())?);
        }
        Ok(updated)
    })
}

pub fn delete_pages(conn: &Connection, ids: &BTreeSet<PageId>) -> Result<Vec<DatabasePage>, StorageError> {
    with_savepoint(conn, "delete_pages", |conn| {
        let mut deleted = Vec::with_capacity(ids.len());
        for id in ids {
            deleted.push(require_page(conn, id.get())?);
            conn.execute("DELETE FROM pages WHERE id = ?1", [id.get()])?;
        }
        Ok(deleted)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sqlite::ShowStorage;
    use crate::tables::beats::{create_beats, delete_beats};
    use cadence_core::NewBeat;

    #[test]
    fn first_page_keeps_its_anchor() -> Result<(), Box<dyn std::error::Error>> {
        let storage = ShowStorage::open_in_memory()?;
        let conn = storage.conn();

        let mut notes = ModifiedPage::new(PageId::FIRST);
        notes.notes = Some(Some("opener".into()));
        update_pages(conn, &[notes])?;

        let beats = create_beats(conn, &[NewBeat::with_duration(0.5)], None)?;
        let mut moved = ModifiedPage::new(PageId::FIRST);
        moved.start_beat = Some(beats[0].id);
        assert!(matches!(update_pages(conn, &[moved]).unwrap_err(), StorageError::ConstraintViolation(_)));

        let err = delete_pages(conn, &BTreeSet::from([PageId::FIRST])).unwrap_err();
        assert_eq!(err.to_string(), "Deletion not allowed for the first page.");
        Ok(())
    }

    #[test]
    fn deleting_a_start_beat_removes_its_page() -> Result<(), Box<dyn std::error::Error>> {
        let storage = ShowStorage::open_in_memory()?;
        let conn = storage.conn();
        let beats = create_beats(conn, &[NewBeat::with_duration(0.5), NewBeat::with_duration(0.5)], None)?;
        create_pages(conn, &[NewPage::starting_at(beats[1].id)])?;
        assert_eq!(get_pages(conn)?.len(), 2);

        delete_beats(conn, &BTreeSet::from([beats[1].id]))?;
        assert_eq!(get_pages(conn)?.len(), 1);
        Ok(())
    }
}
