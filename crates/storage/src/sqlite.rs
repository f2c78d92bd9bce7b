use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use rusqlite::Connection;
use tracing::{info, warn};

use crate::config::StorageConfig;
use crate::error::StorageError;
use crate::history;
use crate::migrate::{self, MigrationReport, MigrationSet};
use crate::schema::{self, quote_ident, quote_literal};

/// One open show file. Holds the single long-lived connection every
/// operation goes through, so pragmas and triggers stay in effect.
pub struct ShowStorage {
    conn: Connection,
    config: StorageConfig,
    path: Option<PathBuf>,
    migrations: MigrationSet,
    report: MigrationReport,
}

impl ShowStorage {
    /// Open (or create) the show at `path` and bring it to the current schema.
    /// A file with pending migrations is backed up first unless disabled.
    pub fn open(path: &Path, config: StorageConfig) -> Result<Self, StorageError> {
        let mut conn = Connection::open(path)?;
        schema::apply_pragmas(&conn, &config)?;
        let migrations = config.migrations()?;

        if config.backup_before_migrate && migrate::needs_migration(&conn, &migrations)? {
            let backup = backup_path(path, unix_seconds());
            vacuum_into(&conn, &backup)?;
            info!(backup = %backup.display(), "backed up show file before migrating");
        }

        let report = migrate::migrate_to_current(&mut conn, &migrations)?;
        history::set_group_limit(&conn, config.undo_group_limit)?;
        Ok(Self {
            conn,
            config,
            path: Some(path.to_path_buf()),
            migrations,
            report,
        })
    }

    pub fn open_in_memory() -> Result<Self, StorageError> {
        Self::open_in_memory_with(StorageConfig::default())
    }

    pub fn open_in_memory_with(config: StorageConfig) -> Result<Self, StorageError> {
        let mut conn = Connection::open_in_memory()?;
        schema::apply_pragmas(&conn, &config)?;
        let migrations = config.migrations()?;
        let report = migrate::migrate_to_current(&mut conn, &migrations)?;
        history::set_group_limit(&conn, config.undo_group_limit)?;
        Ok(Self {
            conn,
            config,
            path: None,
            migrations,
            report,
        })
    }

    pub fn conn(&self) -> &Connection {
        &self.conn
    }

    pub fn conn_mut(&mut self) -> &mut Connection {
        &mut self.conn
    }

    pub fn config(&self) -> &StorageConfig {
        &self.config
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn migrations(&self) -> &MigrationSet {
        &self.migrations
    }

    /// What opening the file did to its schema.
    pub fn migration_report(&self) -> &MigrationReport {
        &self.report
    }

    /// Write a consistent copy of the show next to it and return its path.
    pub fn backup(&self) -> Result<PathBuf, StorageError> {
        let path = self
            .path
            .as_deref()
            .ok_or_else(|| StorageError::NotFound("in-memory shows have no file to back up".into()))?;
        let backup = backup_path(path, unix_seconds());
        vacuum_into(&self.conn, &backup)?;
        Ok(backup)
    }
}

fn unix_seconds() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or_default()
}

fn vacuum_into(conn: &Connection, target: &Path) -> Result<(), StorageError> {
    conn.execute_batch(&format!(
        "VACUUM INTO {};",
        quote_literal(&target.to_string_lossy())
    ))?;
    Ok(())
}

/// `<dir>/<stem><suffix><.ext>`.
pub fn sibling_path(path: &Path, suffix: &str) -> PathBuf {
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let name = match path.extension() {
        Some(ext) => format!("{stem}{suffix}.{}", ext.to_string_lossy()),
        None => format!("{stem}{suffix}"),
    };
    path.with_file_name(name)
}

pub fn backup_path(path: &Path, unix_seconds: u64) -> PathBuf {
    sibling_path(path, &format!(" - BACKUP {unix_seconds}"))
}

/// Run `f` inside `SAVEPOINT name`. On error everything `f` wrote is rolled
/// back, including the history entries its writes logged.
pub fn with_savepoint<T>(
    conn: &Connection,
    name: &str,
    f: impl FnOnce(&Connection) -> Result<T, StorageError>,
) -> Result<T, StorageError> {
    let name = quote_ident(name);
    conn.execute_batch(&format!("SAVEPOINT {name};"))?;
    match f(conn) {
        Ok(value) => {
            conn.execute_batch(&format!("RELEASE {name};"))?;
            Ok(value)
        }
        Err(err) => {
            if let Err(rollback) = conn.execute_batch(&format!("ROLLBACK TO {name}; RELEASE {name};")) {
                warn!(savepoint = %name, error = %rollback, "savepoint rollback failed");
            }
            Err(err)
        }
    }
}
