//! Audio files embedded in the show. This table is not tracked by history.

use rusqlite::{Connection, OptionalExtension, Row, params};

use cadence_core::{AudioFile, AudioFileId, NewAudioFile};

use crate::error::StorageError;
use crate::sqlite::with_savepoint;

const SELECT_AUDIO: &str = "SELECT id, path, nickname, selected FROM audio_files";

fn read_audio(row: &Row) -> rusqlite::Result<AudioFile> {
    Ok(AudioFile {
        id: AudioFileId::new(row.get(0)?),
        path: row.get(1)?,
        nickname: row.get(2)?,
        selected: row.get(3)?,
    })
}

/// Metadata of every audio file, without the bytes.
pub fn get_audio_files(conn: &Connection) -> Result<Vec<AudioFile>, StorageError> {
    let mut stmt = conn.prepare(&format!("{SELECT_AUDIO} ORDER BY id"))?;
    let files = stmt.query_map([], read_audio)?.collect::<Result<Vec<_>, _>>()?;
    Ok(files)
}

fn require_audio(conn: &Connection, id: AudioFileId) -> Result<AudioFile, StorageError> {
    conn.query_row(&format!("{SELECT_AUDIO} WHERE id = ?1"), [id.get()], read_audio)
        .optional()?
        .ok_or_else(|| StorageError::NotFound(format!("audio file {id}")))
}

/// Store a new audio file and make it the selected one.
pub fn create_audio_file(conn: &Connection, new_file: &NewAudioFile) -> Result<AudioFile, StorageError> {
    with_savepoint(conn, "create_audio_file", |conn| {
        conn.execute("UPDATE audio_files SET selected = 0 WHERE selected = 1", [])?;
        conn.execute(
            "INSERT INTO audio_files (path, nickname, data, selected) VALUES (?1, ?2, ?3, 1)",
            params![new_file.path, new_file.nickname, new_file.data],
        )?;
        require_audio(conn, AudioFileId::new(conn.last_insert_rowid()))
    })
}

/// Select `id` and deselect every other file.
pub fn select_audio_file(conn: &Connection, id: AudioFileId) -> Result<AudioFile, StorageError> {
    with_savepoint(conn, "select_audio_file", |conn| {
        require_audio(conn, id)?;
        conn.execute(
            "UPDATE audio_files SET selected = (id = ?1), updated_at = CURRENT_TIMESTAMP",
            [id.get()],
        )?;
        require_audio(conn, id)
    })
}

/// The selected file with its bytes, or the first file when none is selected.
pub fn get_selected_audio_data(
    conn: &Connection,
) -> Result<Option<(AudioFile, Vec<u8>)>, StorageError> {
    Ok(conn
        .query_row(
            "SELECT id, path, nickname, selected, data FROM audio_files
             ORDER BY selected DESC, id LIMIT 1",
            [],
            |row| {
                let data: Option<Vec<u8>> = row.get(4)?;
                Ok((read_audio(row)?, data.unwrap_or_default()))
            },
        )
        .optional()?)
}

pub fn delete_audio_file(conn: &Connection, id: AudioFileId) -> Result<AudioFile, StorageError> {
    let file = require_audio(conn, id)?;
    conn.execute("DELETE FROM audio_files WHERE id = ?1", [id.get()])?;
    Ok(file)
}
