use std::fs;
use std::path::Path;

use cadence_core::{BeatId, NewBeat, Utility};
use cadence_engine::{EngineError, ShowFile};
use cadence_harness::{LegacyShow, TestShow};
use cadence_storage::{MigrationSet, StorageConfig, StorageError};
use rusqlite::Connection;

fn user_version(path: &Path) -> Result<i32, rusqlite::Error> {
    let conn = Connection::open(path)?;
    conn.query_row("PRAGMA user_version", [], |row| row.get(0))
}

fn file_names(dir: &Path) -> Result<Vec<String>, std::io::Error> {
    let mut names: Vec<String> = fs::read_dir(dir)?
        .filter_map(Result::ok)
        .map(|e| e.file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    Ok(names)
}

/// Bundled migrations written to `dir`, so tests can add to them.
fn write_bundled(dir: &Path) -> Result<(), std::io::Error> {
    fs::create_dir_all(dir)?;
    for file in MigrationSet::bundled().files() {
        fs::write(dir.join(&file.name), &file.sql)?;
    }
    Ok(())
}

// ============================================================================
// Legacy files
// ============================================================================

#[test]
fn version_one_file_upgrades_in_place() -> Result<(), Box<dyn std::error::Error>> {
    let legacy = LegacyShow::v1(&[0.5, 0.5, 1.0, 1.0], &[3])?;
    let mut show = ShowFile::open(&legacy.path, TestShow::config())?;

    let report = show.migration_report().clone();
    assert_eq!(report.legacy_steps, vec![(1, 2), (2, 3), (3, 4), (4, 5)]);
    assert_eq!(report.applied_files, 2);
    assert!(!report.created);
    assert_eq!(show.get_applied_migrations()?.len(), 3);
    assert!(!show.has_pending_migrations()?);

    let beats = show.get_beats()?;
    let durations: Vec<f64> = beats.iter().map(|b| b.duration).collect();
    assert_eq!(durations, vec![0.0, 0.5, 0.5, 1.0, 1.0]);
    assert!(beats.iter().all(|b| b.include_in_measure));
    assert_eq!(show.get_pages()?.len(), 2);
    assert_eq!(show.get_utility()?, Utility::default());
    assert_eq!(show.get_workspace_settings()?, serde_json::json!({}));
    assert_eq!(show.get_field_properties()?["width"], 1600);

    // Guards and history arrive with the upgrade.
    assert!(show.delete_beats(&[BeatId::FIRST].into()).is_err());
    assert_eq!(show.history_depth()?, (0, 0));
    show.create_beats(&[NewBeat::with_duration(0.25)], None)?;
    show.perform_undo()?;
    assert_eq!(show.get_beats()?.len(), 5);
    drop(show);

    assert_eq!(user_version(&legacy.path)?, 5);
    let names = file_names(legacy.dir.path())?;
    assert!(
        names.iter().any(|n| n.starts_with("old show - BACKUP ") && n.ends_with(".dots")),
        "no backup among {names:?}"
    );
    Ok(())
}

#[test]
fn backup_can_be_turned_off() -> Result<(), Box<dyn std::error::Error>> {
    let legacy = LegacyShow::v1(&[0.5], &[])?;
    let config = StorageConfig {
        backup_before_migrate: false,
        ..TestShow::config()
    };
    drop(ShowFile::open(&legacy.path, config)?);
    assert_eq!(file_names(legacy.dir.path())?, vec!["old show.dots".to_string()]);
    Ok(())
}

#[test]
fn newer_file_is_refused_untouched() -> Result<(), Box<dyn std::error::Error>> {
    let legacy = LegacyShow::v1(&[0.5], &[])?;
    Connection::open(&legacy.path)?.pragma_update(None, "user_version", 6)?;
    let before = fs::read(&legacy.path)?;

    let err = ShowFile::open(&legacy.path, TestShow::config()).err().ok_or("opened")?;
    assert!(matches!(
        err,
        EngineError::Storage(StorageError::SchemaVersion { found: 6, expected: 5 })
    ));
    assert!(err.to_string().contains("intermediate release"));
    assert_eq!(fs::read(&legacy.path)?, before);
    Ok(())
}

#[test]
fn interrupted_migration_is_reported() -> Result<(), Box<dyn std::error::Error>> {
    let legacy = LegacyShow::v1(&[0.5], &[])?;
    Connection::open(&legacy.path)?.pragma_update(None, "user_version", -1)?;

    let err = ShowFile::open(&legacy.path, TestShow::config()).err().ok_or("opened")?;
    assert!(matches!(
        err,
        EngineError::Storage(StorageError::InterruptedMigration)
    ));
    assert_eq!(user_version(&legacy.path)?, -1);
    Ok(())
}

#[test]
fn version_never_goes_down() -> Result<(), Box<dyn std::error::Error>> {
    let t = TestShow::new()?;
    let path = t.path.clone();
    let t = t.reopen()?;
    drop(t.show);
    assert_eq!(user_version(&path)?, 5);
    Ok(())
}

// ============================================================================
// Ledger
// ============================================================================

#[test]
fn new_migration_file_is_applied_once() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempfile::tempdir()?;
    let migrations = dir.path().join("migrations");
    write_bundled(&migrations)?;
    let config = StorageConfig {
        migrations_dir: Some(migrations.clone()),
        ..TestShow::config()
    };
    let path = dir.path().join("show.dots");
    drop(ShowFile::open(&path, config.clone())?);

    fs::write(
        migrations.join("0003_beat_color.sql"),
        "ALTER TABLE beats ADD COLUMN color TEXT;",
    )?;
    let show = ShowFile::open(&path, config.clone())?;
    assert_eq!(show.migration_report().applied_files, 1);
    assert_eq!(show.get_applied_migrations()?.len(), 4);

    // History triggers follow the new column.
    let sql: String = show.storage().conn().query_row(
        "SELECT sql FROM sqlite_master WHERE name = 'history_beats_delete'",
        [],
        |row| row.get(0),
    )?;
    assert!(sql.contains("color"), "{sql}");
    drop(show);

    let show = ShowFile::open(&path, config)?;
    assert_eq!(show.migration_report().applied_files, 0);
    assert!(
        file_names(dir.path())?
            .iter()
            .any(|n| n.starts_with("show - BACKUP "))
    );
    Ok(())
}

#[test]
fn edited_migration_file_only_warns() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempfile::tempdir()?;
    let migrations = dir.path().join("migrations");
    write_bundled(&migrations)?;
    let config = StorageConfig {
        migrations_dir: Some(migrations.clone()),
        ..TestShow::config()
    };
    let path = dir.path().join("show.dots");
    drop(ShowFile::open(&path, config.clone())?);

    let edited = migrations.join("0001_utility_show_title.sql");
    let mut sql = fs::read_to_string(&edited)?;
    sql.push_str("\n-- reformatted\n");
    fs::write(&edited, sql)?;

    let show = ShowFile::open(&path, config)?;
    assert_eq!(show.migration_report().applied_files, 0);
    assert_eq!(show.get_applied_migrations()?.len(), 3);
    Ok(())
}

#[test]
fn empty_migrations_folder_is_an_error() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempfile::tempdir()?;
    let config = StorageConfig {
        migrations_dir: Some(dir.path().to_path_buf()),
        ..TestShow::config()
    };
    let err = ShowFile::open(&dir.path().join("show.dots"), config).err().ok_or("opened")?;
    assert!(matches!(
        err,
        EngineError::Storage(StorageError::MissingMigrations(_))
    ));
    Ok(())
}

#[test]
fn open_show_takes_migrations_from_a_folder() -> Result<(), Box<dyn std::error::Error>> {
    let mut t = TestShow::new()?;
    let migrations = t.dir().join("migrations");
    write_bundled(&migrations)?;
    assert!(!t.show.has_pending_migrations_in(&migrations)?);

    fs::write(
        migrations.join("0003_page_color.sql"),
        "ALTER TABLE pages ADD COLUMN color TEXT;",
    )?;
    assert!(t.show.has_pending_migrations_in(&migrations)?);
    assert_eq!(t.show.apply_migrations_from(&migrations)?, 1);
    assert!(!t.show.has_pending_migrations_in(&migrations)?);

    // Guards are back in place after the files ran.
    let err = t
        .show
        .delete_pages(&[cadence_core::PageId::FIRST].into())
        .unwrap_err();
    assert_eq!(err.to_string(), "Deletion not allowed for the first page.");
    Ok(())
}
