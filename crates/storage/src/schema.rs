use rusqlite::{Connection, OptionalExtension};

use crate::config::StorageConfig;
use crate::error::StorageError;
use crate::{guard, history};

/// `user_version` from which the migration ledger owns the schema. Files
/// below it are upgraded step by step by [`crate::migrate::legacy`].
pub const HANDOFF_VERSION: i32 = 5;

/// Stamped while a legacy step runs. Finding it on open means a step was
/// interrupted.
pub const MIGRATING_MARKER: i32 = -1;

pub const BEATS: &str = "beats";
pub const MEASURES: &str = "measures";
pub const PAGES: &str = "pages";
pub const UTILITY: &str = "utility";
pub const FIELD_PROPERTIES: &str = "field_properties";
pub const WORKSPACE_SETTINGS: &str = "workspace_settings";
pub const AUDIO_FILES: &str = "audio_files";

/// Tables whose writes are recorded in the history log.
pub const TRACKED_TABLES: &[&str] = &[
    BEATS,
    MEASURES,
    PAGES,
    UTILITY,
    FIELD_PROPERTIES,
    WORKSPACE_SETTINGS,
];

/// Tables that hold exactly one row.
pub const SINGLETON_TABLES: &[&str] = &[UTILITY, FIELD_PROPERTIES, WORKSPACE_SETTINGS];

pub fn apply_pragmas(conn: &Connection, config: &StorageConfig) -> Result<(), StorageError> {
    conn.execute_batch(&format!(
        "
        PRAGMA journal_mode = {};
        PRAGMA synchronous = NORMAL;
        PRAGMA foreign_keys = ON;
        PRAGMA busy_timeout = {};
    ",
        config.journal_mode.as_str(),
        config.busy_timeout_ms,
    ))?;
    Ok(())
}

pub fn set_foreign_keys(conn: &Connection, enabled: bool) -> Result<(), StorageError> {
    conn.execute_batch(if enabled {
        "PRAGMA foreign_keys = ON;"
    } else {
        "PRAGMA foreign_keys = OFF;"
    })?;
    Ok(())
}

pub fn schema_version(conn: &Connection) -> Result<i32, StorageError> {
    Ok(conn.pragma_query_value(None, "user_version", |row| row.get(0))?)
}

pub fn set_schema_version(conn: &Connection, version: i32) -> Result<(), StorageError> {
    conn.execute_batch(&format!("PRAGMA user_version = {version};"))?;
    Ok(())
}

/// Quote an identifier for interpolation into SQL text.
pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Quote a value as an SQL string literal.
pub fn quote_literal(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

/// User tables of `schema` ("main" or an attached name), sorted by name.
pub fn user_tables(conn: &Connection, schema: &str) -> Result<Vec<String>, StorageError> {
    let sql = format!(
        "SELECT name FROM {}.sqlite_master WHERE type = 'table' AND name NOT LIKE 'sqlite_%' ORDER BY name",
        quote_ident(schema)
    );
    let mut stmt = conn.prepare(&sql)?;
    let names = stmt
        .query_map([], |row| row.get(0))?
        .collect::<Result<Vec<String>, _>>()?;
    Ok(names)
}

pub fn table_exists(conn: &Connection, schema: &str, table: &str) -> Result<bool, StorageError> {
    let sql = format!(
        "SELECT 1 FROM {}.sqlite_master WHERE type = 'table' AND name = ?1",
        quote_ident(schema)
    );
    let found = conn
        .query_row(&sql, [table], |_| Ok(()))
        .optional()?;
    Ok(found.is_some())
}

/// Column names of `schema.table` in declaration order.
pub fn table_columns(
    conn: &Connection,
    schema: &str,
    table: &str,
) -> Result<Vec<String>, StorageError> {
    let mut stmt = conn.prepare("SELECT name FROM pragma_table_info(?1, ?2) ORDER BY cid")?;
    let columns = stmt
        .query_map([table, schema], |row| row.get(0))?
        .collect::<Result<Vec<String>, _>>()?;
    Ok(columns)
}

/// True when the file has no tables at all, i.e. it was just created.
pub fn is_blank(conn: &Connection) -> Result<bool, StorageError> {
    Ok(user_tables(conn, "main")?.is_empty())
}

pub fn drop_triggers(conn: &Connection) -> Result<(), StorageError> {
    let mut stmt = conn.prepare("SELECT name FROM sqlite_master WHERE type = 'trigger'")?;
    let names = stmt
        .query_map([], |row| row.get::<_, String>(0))?
        .collect::<Result<Vec<_>, _>>()?;
    for name in names {
        conn.execute_batch(&format!("DROP TRIGGER IF EXISTS {};", quote_ident(&name)))?;
    }
    Ok(())
}

/// Drop and rebuild the full trigger set: protected-row guards plus the
/// history triggers of every tracked table present in the file. Needed
/// after any DDL, since history triggers list table columns.
pub fn recreate_triggers(conn: &Connection) -> Result<(), StorageError> {
    drop_triggers(conn)?;
    guard::create_guards(conn)?;
    if table_exists(conn, "main", history::UNDO_TABLE)? {
        for table in TRACKED_TABLES {
            if table_exists(conn, "main", table)? {
                history::create_triggers(conn, table)?;
            }
        }
    }
    Ok(())
}
