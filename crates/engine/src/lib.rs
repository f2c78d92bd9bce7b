pub mod error;
mod settings;
mod timeline;
pub mod undo;

pub use error::EngineError;
pub use undo::GroupPolicy;

use std::path::{Path, PathBuf};

use rusqlite::Connection;

use cadence_storage::migrate::{self, AppliedMigration};
use cadence_storage::{
    HistoryOutcome, HistoryStats, MigrationReport, MigrationSet, RepairReport, ShowStorage,
    StorageConfig, StorageError, history, repair,
};

/// An open show: the typed surface UI and IPC collaborators call.
///
/// Every mutating call runs as one edit group, so it undoes as a unit, and
/// is compensated if it fails partway. Results convert into
/// [`cadence_core::DatabaseResponse`] with `.into()`.
pub struct ShowFile {
    storage: ShowStorage,
}

impl ShowFile {
    pub fn open(path: &Path, config: StorageConfig) -> Result<Self, EngineError> {
        Ok(Self::new(ShowStorage::open(path, config)?))
    }

    pub fn open_in_memory() -> Result<Self, EngineError> {
        Ok(Self::new(ShowStorage::open_in_memory()?))
    }

    pub fn new(storage: ShowStorage) -> Self {
        Self { storage }
    }

    pub fn storage(&self) -> &ShowStorage {
        &self.storage
    }

    pub fn storage_mut(&mut self) -> &mut ShowStorage {
        &mut self.storage
    }

    fn conn(&self) -> &Connection {
        self.storage.conn()
    }

    fn in_edit_group<T>(
        &mut self,
        action: &'static str,
        policy: GroupPolicy,
        f: impl FnOnce(&Connection) -> Result<T, StorageError>,
    ) -> Result<T, EngineError> {
        undo::run_in_group(&mut self.storage, action, policy, f)
    }

    // -- History --

    /// Undo the most recent edit group. `Empty` if there is nothing to undo.
    pub fn perform_undo(&mut self) -> Result<HistoryOutcome, EngineError> {
        Ok(history::perform_undo(self.storage.conn_mut())?)
    }

    /// Redo the most recently undone group. `Empty` if there is nothing to redo.
    pub fn perform_redo(&mut self) -> Result<HistoryOutcome, EngineError> {
        Ok(history::perform_redo(self.storage.conn_mut())?)
    }

    /// Start a new edit group by hand. Returns its number.
    pub fn increment_edit_group(&self) -> Result<i64, EngineError> {
        Ok(history::EditGroup::begin(self.conn())?.id())
    }

    /// `(undo groups, redo groups)`.
    pub fn history_depth(&self) -> Result<(usize, usize), EngineError> {
        Ok(history::history_depth(self.conn())?)
    }

    pub fn history_stats(&self) -> Result<HistoryStats, EngineError> {
        Ok(history::stats(self.conn())?)
    }

    // -- Migrations --

    pub fn has_pending_migrations(&self) -> Result<bool, EngineError> {
        Ok(migrate::has_pending_migrations(
            self.conn(),
            self.storage.migrations(),
        )?)
    }

    pub fn get_applied_migrations(&self) -> Result<Vec<AppliedMigration>, EngineError> {
        Ok(migrate::get_applied_migrations(self.conn())?)
    }

    /// Apply files added to the migration set since the show was opened.
    pub fn apply_pending_migrations(&mut self) -> Result<usize, EngineError> {
        let set = self.storage.migrations().clone();
        Ok(migrate::apply_pending_migrations(self.storage.conn_mut(), &set)?)
    }

    /// Same as [`Self::has_pending_migrations`] against the files in `dir`.
    pub fn has_pending_migrations_in(&self, dir: &Path) -> Result<bool, EngineError> {
        let set = MigrationSet::from_dir(dir)?;
        Ok(migrate::has_pending_migrations(self.conn(), &set)?)
    }

    pub fn apply_migrations_from(&mut self, dir: &Path) -> Result<usize, EngineError> {
        let set = MigrationSet::from_dir(dir)?;
        Ok(migrate::apply_pending_migrations(self.storage.conn_mut(), &set)?)
    }

    /// Re-seed the first beat, first page and singleton rows where missing.
    /// Clears the history.
    pub fn initialize_database(&self) -> Result<(), EngineError> {
        Ok(migrate::initialize_database(self.conn())?)
    }

    pub fn migration_report(&self) -> &MigrationReport {
        self.storage.migration_report()
    }
}

/// Rebuild `source` into `<stem> - FIXED<ext>` with the migrations `config`
/// points at. The source is never written, and any `-wal`/`-shm` files
/// reading it creates are removed again.
pub fn repair_database(source: &Path, config: &StorageConfig) -> Result<PathBuf, EngineError> {
    Ok(repair::repair_database(source, &config.migrations()?)?)
}

pub fn repair_database_with_report(
    source: &Path,
    config: &StorageConfig,
) -> Result<RepairReport, EngineError> {
    Ok(repair::repair_with_report(source, &config.migrations()?)?)
}
