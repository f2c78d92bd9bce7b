//! Schema version migrator.
//!
//! Files below [`HANDOFF_VERSION`] are upgraded by the numbered steps in
//! [`legacy`]; from the hand-off version on, schema changes are hashed SQL
//! files tracked by the ledger in [`ledger`].

pub mod ledger;
pub mod legacy;

use rusqlite::{Connection, params};
use serde::Serialize;
use tracing::info;

use cadence_core::utility::{
    DEFAULT_LAST_PAGE_COUNTS, FIELD_PROPERTIES_ID, UTILITY_ID, WORKSPACE_SETTINGS_ID,
    default_field_properties,
};

use crate::error::StorageError;
use crate::history;
use crate::schema::{self, HANDOFF_VERSION, MIGRATING_MARKER};

pub use ledger::{
    AppliedMigration, LEDGER_TABLE, MigrationFile, MigrationSet, apply_pending_migrations,
    get_applied_migrations, has_pending_migrations,
};

/// What `user_version` and the table list say about a file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileState {
    /// No tables, version 0.
    Blank,
    Legacy(i32),
    Managed,
    Interrupted,
    Unknown(i32),
}

pub fn file_state(conn: &Connection) -> Result<FileState, StorageError> {
    let version = schema::schema_version(conn)?;
    Ok(match version {
        MIGRATING_MARKER => FileState::Interrupted,
        HANDOFF_VERSION => FileState::Managed,
        0 if schema::is_blank(conn)? => FileState::Blank,
        1..HANDOFF_VERSION => FileState::Legacy(version),
        other => FileState::Unknown(other),
    })
}

/// True when opening the file will change its schema. Blank files are not
/// counted since there is nothing in them to lose.
pub fn needs_migration(conn: &Connection, set: &MigrationSet) -> Result<bool, StorageError> {
    match file_state(conn)? {
        FileState::Legacy(_) => Ok(true),
        FileState::Managed => has_pending_migrations(conn, set),
        FileState::Blank | FileState::Interrupted | FileState::Unknown(_) => Ok(false),
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MigrationReport {
    /// The file was blank and has been created from scratch.
    pub created: bool,
    pub legacy_steps: Vec<(i32, i32)>,
    pub applied_files: usize,
}

/// Bring any supported file to the current schema.
pub fn migrate_to_current(
    conn: &mut Connection,
    set: &MigrationSet,
) -> Result<MigrationReport, StorageError> {
    let mut report = MigrationReport::default();
    match file_state(conn)? {
        FileState::Blank => {
            report.applied_files = create_new(conn, set)?;
            report.created = true;
        }
        FileState::Legacy(_) => {
            report.legacy_steps = legacy::upgrade(conn, set)?;
            report.applied_files = apply_pending_migrations(conn, set)?;
        }
        FileState::Managed => {
            report.applied_files = apply_pending_migrations(conn, set)?;
        }
        FileState::Interrupted => return Err(StorageError::InterruptedMigration),
        FileState::Unknown(found) => {
            return Err(StorageError::SchemaVersion {
                found,
                expected: HANDOFF_VERSION,
            });
        }
    }
    if report != MigrationReport::default() {
        info!(
            created = report.created,
            legacy_steps = report.legacy_steps.len(),
            applied_files = report.applied_files,
            "migrated show file"
        );
    }
    Ok(report)
}

/// Build the current schema in an empty file and seed its sentinel rows.
pub fn create_new(conn: &mut Connection, set: &MigrationSet) -> Result<usize, StorageError> {
    schema::set_schema_version(conn, HANDOFF_VERSION)?;
    let applied = apply_pending_migrations(conn, set)?;
    initialize_database(conn)?;
    Ok(applied)
}

/// Insert whichever sentinel and singleton rows are missing, then clear the
/// history so the seeding cannot be undone.
pub fn initialize_database(conn: &Connection) -> Result<(), StorageError> {
    conn.execute(
        "INSERT OR IGNORE INTO beats (id, position, duration) VALUES (0, 0, 0)",
        [],
    )?;
    conn.execute(
        "INSERT OR IGNORE INTO pages (id, start_beat, is_subset) VALUES (0, 0, 0)",
        [],
    )?;
    conn.execute(
        "INSERT OR IGNORE INTO utility (id, last_page_counts) VALUES (?1, ?2)",
        params![UTILITY_ID, DEFAULT_LAST_PAGE_COUNTS],
    )?;
    conn.execute(
        "INSERT OR IGNORE INTO field_properties (id, json_data) VALUES (?1, ?2)",
        params![
            FIELD_PROPERTIES_ID,
            serde_json::to_string(&default_field_properties())?
        ],
    )?;
    conn.execute(
        "INSERT OR IGNORE INTO workspace_settings (id, json_data) VALUES (?1, '{}')",
        params![WORKSPACE_SETTINGS_ID],
    )?;
    history::clear(conn)?;
    Ok(())
}
