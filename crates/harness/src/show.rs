use std::path::{Path, PathBuf};

use cadence_core::{BeatId, DatabaseBeat, NewBeat};
use cadence_engine::{EngineError, ShowFile};
use cadence_storage::{JournalMode, StorageConfig};
use tempfile::TempDir;

/// A show file on disk in its own temporary folder.
pub struct TestShow {
    pub dir: TempDir,
    pub path: PathBuf,
    pub show: ShowFile,
}

impl TestShow {
    pub fn new() -> Result<Self, Box<dyn std::error::Error>> {
        Self::with_config(Self::config())
    }

    pub fn with_config(config: StorageConfig) -> Result<Self, Box<dyn std::error::Error>> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("show.dots");
        let show = ShowFile::open(&path, config)?;
        Ok(Self { dir, path, show })
    }

    /// DELETE journal so the file on disk is complete once the show is closed.
    pub fn config() -> StorageConfig {
        StorageConfig {
            journal_mode: JournalMode::Delete,
            ..Default::default()
        }
    }

    pub fn dir(&self) -> &Path {
        self.dir.path()
    }

    /// Append `n` beats of half a second each.
    pub fn add_beats(&mut self, n: usize) -> Result<Vec<DatabaseBeat>, EngineError> {
        self.show
            .create_beats(&vec![NewBeat::with_duration(0.5); n], None)
    }

    /// Positions of every beat except the first, in order.
    pub fn positions(&self) -> Result<Vec<i64>, EngineError> {
        Ok(self
            .show
            .get_beats()?
            .into_iter()
            .filter(|b| b.id != BeatId::FIRST)
            .map(|b| b.position)
            .collect())
    }

    /// Beat ids in position order, the first beat excluded.
    pub fn order(&self) -> Result<Vec<BeatId>, EngineError> {
        Ok(self
            .show
            .get_beats()?
            .into_iter()
            .filter(|b| b.id != BeatId::FIRST)
            .map(|b| b.id)
            .collect())
    }

    /// Close the show and open the same file again.
    pub fn reopen(self) -> Result<Self, Box<dyn std::error::Error>> {
        let Self { dir, path, show } = self;
        drop(show);
        let show = ShowFile::open(&path, Self::config())?;
        Ok(Self { dir, path, show })
    }
}
