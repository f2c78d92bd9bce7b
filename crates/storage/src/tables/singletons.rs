//! The one-row tables: `utility`, `field_properties`, `workspace_settings`.

use rusqlite::{Connection, OptionalExtension, params};

use cadence_core::utility::{FIELD_PROPERTIES_ID, UTILITY_ID, WORKSPACE_SETTINGS_ID};
use cadence_core::{ModifiedUtility, Utility};

use crate::error::StorageError;
use crate::schema;
use crate::tables::UpdateBuilder;

pub fn get_utility(conn: &Connection) -> Result<Utility, StorageError> {
    conn.query_row(
        "SELECT last_page_counts, default_beat_duration, show_title FROM utility WHERE id = ?1",
        [UTILITY_ID],
        |row| {
            Ok(Utility {
                last_page_counts: row.get(0)?,
                default_beat_duration: row.get(1)?,
                show_title: row.get(2)?,
            })
        },
    )
    .optional()?
    .ok_or_else(|| StorageError::NotFound("utility record".into()))
}

pub fn update_utility(conn: &Connection, modified: &ModifiedUtility) -> Result<Utility, StorageError> {
    modified.validate()?;
    let mut update = UpdateBuilder::new(schema::UTILITY);
    update
        .set_opt("last_page_counts", modified.last_page_counts)
        .set_opt("default_beat_duration", modified.default_beat_duration)
        .set_opt("show_title", modified.show_title.clone());
    if !update.execute(conn, UTILITY_ID)? {
        return Err(StorageError::NotFound("utility record".into()));
    }
    get_utility(conn)
}

fn get_json(conn: &Connection, table: &str, id: i64) -> Result<serde_json::Value, StorageError> {
    let raw: String = conn
        .query_row(
            &format!("SELECT json_data FROM {} WHERE id = ?1", schema::quote_ident(table)),
            [id],
            |row| row.get(0),
        )
        .optional()?
        .ok_or_else(|| StorageError::NotFound(format!("{table} record")))?;
    Ok(serde_json::from_str(&raw)?)
}

fn set_json(
    conn: &Connection,
    table: &str,
    id: i64,
    value: &serde_json::Value,
) -> Result<serde_json::Value, StorageError> {
    let changed = conn.execute(
        &format!("UPDATE {} SET json_data = ?1 WHERE id = ?2", schema::quote_ident(table)),
        params![serde_json::to_string(value)?, id],
    )?;
    if changed == 0 {
        return Err(StorageError::NotFound(format!("{table} record")));
    }
    get_json(conn, table, id)
}

pub fn get_field_properties(conn: &Connection) -> Result<serde_json::Value, StorageError> {
    get_json(conn, schema::FIELD_PROPERTIES, FIELD_PROPERTIES_ID)
}

pub fn update_field_properties(
    conn: &Connection,
    value: &serde_json::Value,
) -> Result<serde_json::Value, StorageError> {
    set_json(conn, schema::FIELD_PROPERTIES, FIELD_PROPERTIES_ID, value)
}

pub fn get_workspace_settings(conn: &Connection) -> Result<serde_json::Value, StorageError> {
    get_json(conn, schema::WORKSPACE_SETTINGS, WORKSPACE_SETTINGS_ID)
}

pub fn update_workspace_settings(
    conn: &Connection,
    value: &serde_json::Value,
) -> Result<serde_json::Value, StorageError> {
    set_json(conn, schema::WORKSPACE_SETTINGS, WORKSPACE_SETTINGS_ID, value)
}
