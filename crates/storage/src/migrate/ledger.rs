//! Hashed migration files and the ledger recording which ones a file has seen.

use std::fs;
use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};

use rusqlite::{Connection, params};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::error::StorageError;
use crate::schema::{self, HANDOFF_VERSION};

pub const LEDGER_TABLE: &str = "migration_ledger";

const BUNDLED: &[(&str, &str)] = &[
    (
        "0000_baseline.sql",
        include_str!("../../migrations/0000_baseline.sql"),
    ),
    (
        "0001_utility_show_title.sql",
        include_str!("../../migrations/0001_utility_show_title.sql"),
    ),
    (
        "0002_audio_files.sql",
        include_str!("../../migrations/0002_audio_files.sql"),
    ),
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationFile {
    pub name: String,
    pub sql: String,
    /// blake3 of `sql`, hex encoded.
    pub hash: String,
}

impl MigrationFile {
    pub fn new(name: impl Into<String>, sql: impl Into<String>) -> Self {
        let sql = sql.into();
        let hash = blake3::hash(sql.as_bytes()).to_hex().to_string();
        Self {
            name: name.into(),
            sql,
            hash,
        }
    }
}

/// Ordered list of migration files. The first file is the baseline schema
/// that legacy files are stamped with on hand-off.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationSet {
    files: Vec<MigrationFile>,
}

impl MigrationSet {
    pub fn bundled() -> Self {
        Self::from_files(
            BUNDLED
                .iter()
                .map(|(name, sql)| MigrationFile::new(*name, *sql))
                .collect(),
        )
    }

    /// Every `*.sql` file in `dir`, ordered by file name.
    pub fn from_dir(dir: &Path) -> Result<Self, StorageError> {
        let mut paths = Vec::new();
        for entry in fs::read_dir(dir)? {
            let path = entry?.path();
            if path.is_file() && path.extension().is_some_and(|ext| ext == "sql") {
                paths.push(path);
            }
        }
        paths.sort();

        let mut files = Vec::with_capacity(paths.len());
        for path in paths {
            let name = path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            files.push(MigrationFile::new(name, fs::read_to_string(&path)?));
        }
        if files.is_empty() {
            return Err(StorageError::MissingMigrations(dir.display().to_string()));
        }
        Ok(Self { files })
    }

    pub fn from_files(files: Vec<MigrationFile>) -> Self {
        Self { files }
    }

    pub fn files(&self) -> &[MigrationFile] {
        &self.files
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    pub fn baseline(&self) -> Option<&MigrationFile> {
        self.files.first()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AppliedMigration {
    pub id: i64,
    pub hash: String,
    /// Unix milliseconds.
    pub applied_at: i64,
}

pub fn ensure_ledger(conn: &Connection) -> Result<(), StorageError> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS migration_ledger (
             id         INTEGER PRIMARY KEY AUTOINCREMENT,
             hash       TEXT NOT NULL,
             applied_at INTEGER NOT NULL
         );",
    )?;
    Ok(())
}

fn now_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or_default()
}

pub fn record_applied(conn: &Connection, file: &MigrationFile) -> Result<(), StorageError> {
    conn.execute(
        "INSERT INTO migration_ledger (hash, applied_at) VALUES (?1, ?2)",
        params![file.hash, now_millis()],
    )?;
    Ok(())
}

/// Ledger rows in application order. Empty for a file without a ledger.
pub fn get_applied_migrations(conn: &Connection) -> Result<Vec<AppliedMigration>, StorageError> {
    if !schema::table_exists(conn, "main", LEDGER_TABLE)? {
        return Ok(Vec::new());
    }
    let mut stmt = conn.prepare("SELECT id, hash, applied_at FROM migration_ledger ORDER BY id")?;
    let applied = stmt
        .query_map([], |row| {
            Ok(AppliedMigration {
                id: row.get(0)?,
                hash: row.get(1)?,
                applied_at: row.get(2)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(applied)
}

pub fn has_pending_migrations(conn: &Connection, set: &MigrationSet) -> Result<bool, StorageError> {
    Ok(get_applied_migrations(conn)?.len() < set.len())
}

/// Apply every file the ledger has not seen yet, in one transaction.
///
/// Triggers are dropped and foreign keys disabled while the files run. Both
/// are restored afterwards whether or not the files applied.
pub fn apply_pending_migrations(
    conn: &mut Connection,
    set: &MigrationSet,
) -> Result<usize, StorageError> {
    let found = schema::schema_version(conn)?;
    if found != HANDOFF_VERSION {
        return Err(StorageError::SchemaVersion {
            found,
            expected: HANDOFF_VERSION,
        });
    }
    if set.is_empty() {
        return Err(StorageError::MissingMigrations("empty migration set".into()));
    }

    let applied = get_applied_migrations(conn)?;
    for (entry, file) in applied.iter().zip(set.files()) {
        if entry.hash != file.hash {
            warn!(file = %file.name, ledger_id = entry.id, "applied migration no longer matches its file");
        }
    }
    if applied.len() > set.len() {
        warn!(
            applied = applied.len(),
            available = set.len(),
            "file has seen more migrations than are available"
        );
    }
    let pending = set.files().get(applied.len()..).unwrap_or_default();
    if pending.is_empty() {
        return Ok(0);
    }

    schema::drop_triggers(conn)?;
    schema::set_foreign_keys(conn, false)?;

    let result = apply_files(conn, pending);

    let restored = schema::recreate_triggers(conn).and_then(|()| schema::set_foreign_keys(conn, true));
    match (result, restored) {
        (Ok(count), Ok(())) => {
            info!(count, "applied pending migrations");
            Ok(count)
        }
        (Err(err), Ok(())) => Err(err),
        (Err(err), Err(cleanup)) => {
            warn!(error = %cleanup, "could not restore triggers after a failed migration");
            Err(err)
        }
        (Ok(_), Err(cleanup)) => Err(cleanup),
    }
}

fn apply_files(conn: &mut Connection, files: &[MigrationFile]) -> Result<usize, StorageError> {
    let tx = conn.transaction()?;
    ensure_ledger(&tx)?;
    for file in files {
        debug!(file = %file.name, hash = %file.hash, "applying migration");
        tx.execute_batch(&file.sql)?;
        record_applied(&tx, file)?;
    }
    tx.commit()?;
    Ok(files.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::set_schema_version;

    fn managed() -> Result<Connection, StorageError> {
        let conn = Connection::open_in_memory()?;
        set_schema_version(&conn, HANDOFF_VERSION)?;
        Ok(conn)
    }

    #[test]
    fn bundled_set_is_ordered_and_hashed() {
        let set = MigrationSet::bundled();
        assert_eq!(set.len(), 3);
        assert_eq!(set.files()[0].name, "0000_baseline.sql");
        assert_eq!(set.files()[0].hash.len(), 64);
        assert_ne!(set.files()[0].hash, set.files()[1].hash);
    }

    #[test]
    fn applying_clears_pending() -> Result<(), Box<dyn std::error::Error>> {
        let mut conn = managed()?;
        let set = MigrationSet::bundled();
        assert!(has_pending_migrations(&conn, &set)?);

        assert_eq!(apply_pending_migrations(&mut conn, &set)?, 3);
        assert!(!has_pending_migrations(&conn, &set)?);
        assert_eq!(get_applied_migrations(&conn)?.len(), set.len());
        assert_eq!(apply_pending_migrations(&mut conn, &set)?, 0);

        let fk: i64 = conn.pragma_query_value(None, "foreign_keys", |r| r.get(0))?;
        assert_eq!(fk, 1);
        Ok(())
    }

    #[test]
    fn wrong_version_is_refused() -> Result<(), Box<dyn std::error::Error>> {
        let mut conn = Connection::open_in_memory()?;
        set_schema_version(&conn, 3)?;
        let err = apply_pending_migrations(&mut conn, &MigrationSet::bundled()).unwrap_err();
        assert!(matches!(err, StorageError::SchemaVersion { found: 3, expected: 5 }));
        assert!(err.to_string().contains("intermediate release"));
        Ok(())
    }

    #[test]
    fn failed_file_leaves_ledger_and_triggers_intact() -> Result<(), Box<dyn std::error::Error>> {
        let mut conn = managed()?;
        let bundled = MigrationSet::bundled();
        apply_pending_migrations(&mut conn, &bundled)?;
        let triggers_before: i64 =
            conn.query_row("SELECT COUNT(*) FROM sqlite_master WHERE type = 'trigger'", [], |r| r.get(0))?;
        assert!(triggers_before > 0);

        let mut files = bundled.files().to_vec();
        files.push(MigrationFile::new("0003_broken.sql", "CREATE TABLE ok (id INTEGER); NOT SQL;"));
        let err = apply_pending_migrations(&mut conn, &MigrationSet::from_files(files));
        assert!(err.is_err());

        assert_eq!(get_applied_migrations(&conn)?.len(), 3);
        assert!(!schema::table_exists(&conn, "main", "ok")?);
        let triggers_after: i64 =
            conn.query_row("SELECT COUNT(*) FROM sqlite_master WHERE type = 'trigger'", [], |r| r.get(0))?;
        assert_eq!(triggers_after, triggers_before);
        Ok(())
    }

    #[test]
    fn directory_sets_sort_by_name() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempfile::tempdir()?;
        fs::write(dir.path().join("0002_b.sql"), "SELECT 2;")?;
        fs::write(dir.path().join("0001_a.sql"), "SELECT 1;")?;
        fs::write(dir.path().join("README.md"), "ignored")?;

        let set = MigrationSet::from_dir(dir.path())?;
        let names: Vec<&str> = set.files().iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, vec!["0001_a.sql", "0002_b.sql"]);

        let empty = tempfile::tempdir()?;
        assert!(matches!(
            MigrationSet::from_dir(empty.path()).unwrap_err(),
            StorageError::MissingMigrations(_)
        ));
        Ok(())
    }
}
