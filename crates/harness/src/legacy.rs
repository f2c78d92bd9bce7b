//! Show files as older releases wrote them.

use std::path::{Path, PathBuf};

use rusqlite::{Connection, params};
use tempfile::TempDir;

/// A version 1 file: beats and pages only, no measures, no settings.
const V1_SCHEMA: &str = "
    CREATE TABLE beats (
        id         INTEGER PRIMARY KEY,
        position   INTEGER NOT NULL UNIQUE CHECK (position >= 0),
        duration   REAL NOT NULL CHECK (duration >= 0),
        notes      TEXT,
        created_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP,
        updated_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
    );
    CREATE TABLE pages (
        id         INTEGER PRIMARY KEY,
        start_beat INTEGER NOT NULL UNIQUE REFERENCES beats (id) ON DELETE CASCADE,
        is_subset  INTEGER NOT NULL DEFAULT 0 CHECK (is_subset IN (0, 1)),
        notes      TEXT,
        created_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP,
        updated_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
    );
    CREATE TABLE utility (
        id               INTEGER PRIMARY KEY CHECK (id = 0),
        last_page_counts INTEGER NOT NULL DEFAULT 8 CHECK (last_page_counts >= 1)
    );
    INSERT INTO beats (id, position, duration) VALUES (0, 0, 0);
    INSERT INTO pages (id, start_beat, is_subset) VALUES (0, 0, 0);
    INSERT INTO utility (id, last_page_counts) VALUES (0, 8);
";

/// A version 1 show in its own temporary folder.
pub struct LegacyShow {
    pub dir: TempDir,
    pub path: PathBuf,
}

impl LegacyShow {
    /// One beat per entry of `durations`, and a page on every beat
    /// listed in `page_starts` (1-based positions).
    pub fn v1(durations: &[f64], page_starts: &[i64]) -> Result<Self, Box<dyn std::error::Error>> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("old show.dots");
        write_legacy_v1(&path, durations, page_starts)?;
        Ok(Self { dir, path })
    }
}

/// Write a version 1 file at `path`. Beat ids equal their positions.
pub fn write_legacy_v1(
    path: &Path,
    durations: &[f64],
    page_starts: &[i64],
) -> Result<(), rusqlite::Error> {
    let mut conn = Connection::open(path)?;
    conn.execute_batch("PRAGMA journal_mode = DELETE;")?;
    let tx = conn.transaction()?;
    tx.execute_batch(V1_SCHEMA)?;
    for (i, duration) in durations.iter().enumerate() {
        let position = i as i64 + 1;
        tx.execute(
            "INSERT INTO beats (id, position, duration) VALUES (?1, ?1, ?2)",
            params![position, duration],
        )?;
    }
    for start in page_starts {
        tx.execute(
            "INSERT INTO pages (start_beat, is_subset) VALUES (?1, 0)",
            [start],
        )?;
    }
    tx.pragma_update(None, "user_version", 1)?;
    tx.commit()
}
