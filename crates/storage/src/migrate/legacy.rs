//! Numbered upgrade steps for files written before the migration ledger.
//!
//! Each step runs from exactly one `user_version` to the next. The driver
//! stamps [`MIGRATING_MARKER`] before touching the file and only stamps the
//! target version inside the step's transaction, so a crash leaves either the
//! old version or the marker behind, never a half-applied new version.

use rusqlite::{Connection, params};
use tracing::{debug, info};

use cadence_core::utility::default_field_properties;

use crate::error::StorageError;
use crate::history;
use crate::migrate::ledger::{self, MigrationSet};
use crate::schema::{self, HANDOFF_VERSION, MIGRATING_MARKER};

pub struct LegacyStep {
    pub from: i32,
    pub to: i32,
    pub description: &'static str,
    apply: fn(&Connection, &MigrationSet) -> Result<(), StorageError>,
}

impl std::fmt::Debug for LegacyStep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LegacyStep")
            .field("from", &self.from)
            .field("to", &self.to)
            .field("description", &self.description)
            .finish()
    }
}

pub const LEGACY_STEPS: &[LegacyStep] = &[
    LegacyStep {
        from: 1,
        to: 2,
        description: "add measures",
        apply: add_measures,
    },
    LegacyStep {
        from: 2,
        to: 3,
        description: "add beat measure flag and field properties",
        apply: add_field_properties,
    },
    LegacyStep {
        from: 3,
        to: 4,
        description: "add workspace settings and default beat duration",
        apply: add_workspace_settings,
    },
    LegacyStep {
        from: 4,
        to: HANDOFF_VERSION,
        description: "hand off to the migration ledger",
        apply: hand_off,
    },
];

fn add_measures(conn: &Connection, _: &MigrationSet) -> Result<(), StorageError> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS measures (
             id             INTEGER PRIMARY KEY,
             start_beat     INTEGER NOT NULL UNIQUE REFERENCES beats (id) ON DELETE CASCADE,
             rehearsal_mark TEXT,
             notes          TEXT,
             created_at     TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP,
             updated_at     TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
         );",
    )?;
    Ok(())
}

fn add_field_properties(conn: &Connection, _: &MigrationSet) -> Result<(), StorageError> {
    conn.execute_batch(
        "ALTER TABLE beats ADD COLUMN include_in_measure INTEGER NOT NULL DEFAULT 1
             CHECK (include_in_measure IN (0, 1));
         CREATE TABLE IF NOT EXISTS field_properties (
             id        INTEGER PRIMARY KEY CHECK (id = 1),
             json_data TEXT NOT NULL
         );",
    )?;
    conn.execute(
        "INSERT OR IGNORE INTO field_properties (id, json_data) VALUES (1, ?1)",
        params![serde_json::to_string(&default_field_properties())?],
    )?;
    Ok(())
}

fn add_workspace_settings(conn: &Connection, _: &MigrationSet) -> Result<(), StorageError> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS workspace_settings (
             id        INTEGER PRIMARY KEY CHECK (id = 1),
             json_data TEXT NOT NULL DEFAULT '{}'
         );
         INSERT OR IGNORE INTO workspace_settings (id, json_data) VALUES (1, '{}');
         ALTER TABLE utility ADD COLUMN default_beat_duration REAL NOT NULL DEFAULT 0.5;",
    )?;
    Ok(())
}

/// A version 4 file already has the baseline schema, so the baseline is
/// recorded as applied rather than run.
fn hand_off(conn: &Connection, set: &MigrationSet) -> Result<(), StorageError> {
    let baseline = set
        .baseline()
        .ok_or_else(|| StorageError::MissingMigrations("no baseline migration".into()))?;
    history::create_tables(conn)?;
    ledger::ensure_ledger(conn)?;
    ledger::record_applied(conn, baseline)?;
    Ok(())
}

/// Run one step. The file must be at `step.from`.
pub fn run_step(
    conn: &mut Connection,
    step: &LegacyStep,
    set: &MigrationSet,
) -> Result<(), StorageError> {
    let found = schema::schema_version(conn)?;
    if found != step.from {
        return Err(StorageError::SchemaVersion {
            found,
            expected: step.from,
        });
    }

    debug!(from = step.from, to = step.to, step = step.description, "running legacy step");
    schema::set_schema_version(conn, MIGRATING_MARKER)?;
    if let Err(err) = apply_step(conn, step, set) {
        schema::set_schema_version(conn, step.from)?;
        return Err(err);
    }
    Ok(())
}

fn apply_step(
    conn: &mut Connection,
    step: &LegacyStep,
    set: &MigrationSet,
) -> Result<(), StorageError> {
    let tx = conn.transaction()?;
    schema::drop_triggers(&tx)?;
    (step.apply)(&tx, set)?;
    schema::recreate_triggers(&tx)?;
    schema::set_schema_version(&tx, step.to)?;
    tx.commit()?;
    Ok(())
}

/// Run steps until the file reaches the hand-off version. Returns the
/// `(from, to)` pairs that ran.
pub fn upgrade(conn: &mut Connection, set: &MigrationSet) -> Result<Vec<(i32, i32)>, StorageError> {
    let mut ran = Vec::new();
    loop {
        let version = schema::schema_version(conn)?;
        if version >= HANDOFF_VERSION {
            break;
        }
        let step = LEGACY_STEPS
            .iter()
            .find(|step| step.from == version)
            .ok_or(StorageError::SchemaVersion {
                found: version,
                expected: HANDOFF_VERSION,
            })?;
        run_step(conn, step, set)?;
        ran.push((step.from, step.to));
    }
    if !ran.is_empty() {
        info!(steps = ran.len(), "upgraded legacy show file");
    }
    Ok(ran)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn steps_form_a_chain_to_the_hand_off() {
        let mut version = 1;
        for step in LEGACY_STEPS {
            assert_eq!(step.from, version);
            assert_eq!(step.to, version + 1);
            version = step.to;
        }
        assert_eq!(version, HANDOFF_VERSION);
    }

    #[test]
    fn step_refuses_the_wrong_version() -> Result<(), Box<dyn std::error::Error>> {
        let mut conn = Connection::open_in_memory()?;
        schema::set_schema_version(&conn, 2)?;
        let err = run_step(&mut conn, &LEGACY_STEPS[0], &MigrationSet::bundled()).unwrap_err();
        assert!(matches!(err, StorageError::SchemaVersion { found: 2, expected: 1 }));
        assert_eq!(schema::schema_version(&conn)?, 2);
        Ok(())
    }

    #[test]
    fn failed_step_restores_its_starting_version() -> Result<(), Box<dyn std::error::Error>> {
        let mut conn = Connection::open_in_memory()?;
        // No beats table, so adding the measure flag fails.
        schema::set_schema_version(&conn, 2)?;
        assert!(run_step(&mut conn, &LEGACY_STEPS[1], &MigrationSet::bundled()).is_err());
        assert_eq!(schema::schema_version(&conn)?, 2);
        assert!(!schema::table_exists(&conn, "main", "field_properties")?);
        Ok(())
    }
}
