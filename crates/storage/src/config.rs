use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::StorageError;
use crate::migrate::MigrationSet;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JournalMode {
    #[default]
    Wal,
    Delete,
}

impl JournalMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Wal => "WAL",
            Self::Delete => "DELETE",
        }
    }
}

/// Settings for opening a show file. Every field has a default, so a JSON
/// config only needs the keys it overrides.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub busy_timeout_ms: u64,
    pub journal_mode: JournalMode,
    /// Number of undo groups retained; older groups are trimmed.
    pub undo_group_limit: i64,
    /// Folder of `*.sql` migration files. Bundled migrations when unset.
    pub migrations_dir: Option<PathBuf>,
    /// Snapshot a file before applying pending migrations to it.
    pub backup_before_migrate: bool,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            busy_timeout_ms: 5000,
            journal_mode: JournalMode::Wal,
            undo_group_limit: 500,
            migrations_dir: None,
            backup_before_migrate: true,
        }
    }
}

impl StorageConfig {
    pub fn load(path: &Path) -> Result<Self, StorageError> {
        let raw = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&raw)?)
    }

    pub fn migrations(&self) -> Result<MigrationSet, StorageError> {
        match &self.migrations_dir {
            Some(dir) => MigrationSet::from_dir(dir),
            None => Ok(MigrationSet::bundled()),
        }
    }
}
