//! Repair and salvage.
//!
//! A repair builds a brand-new file at the current schema and copies into it
//! whatever the source still holds, table by table, restricted to the columns
//! both sides share. The new file is staged under a temporary name and only
//! renamed to `<stem> - FIXED<ext>` once every step has succeeded. The source
//! is only ever opened read-only. Reading a WAL-mode source makes SQLite
//! create `-wal`/`-shm` files beside it; those are deleted again afterwards
//! unless they were already there.

use std::fs;
use std::path::{Path, PathBuf};

use rusqlite::{Connection, OpenFlags};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::error::StorageError;
use crate::history;
use crate::migrate::{self, LEDGER_TABLE, MigrationSet};
use crate::schema::{self, SINGLETON_TABLES, quote_ident, quote_literal};
use crate::sqlite::{sibling_path, with_savepoint};

/// Source tables that are never copied.
pub const EXCLUDED_TABLES: &[&str] = &[
    LEDGER_TABLE,
    history::UNDO_TABLE,
    history::REDO_TABLE,
    history::STATS_TABLE,
];

const SOURCE_SCHEMA: &str = "source";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RepairReport {
    pub output: PathBuf,
    /// Tables copied, with the number of rows taken from the source.
    pub copied: Vec<(String, usize)>,
    /// Tables left out because the current schema shares no columns with them.
    pub skipped: Vec<String>,
    /// Tables whose copy failed; they keep their freshly created contents.
    pub failed: Vec<String>,
}

/// Repair `source` and return the path of the repaired file.
pub fn repair_database(source: &Path, set: &MigrationSet) -> Result<PathBuf, StorageError> {
    Ok(repair_with_report(source, set)?.output)
}

pub fn repair_with_report(source: &Path, set: &MigrationSet) -> Result<RepairReport, StorageError> {
    let output = sibling_path(source, " - FIXED");
    if output.exists() {
        fs::remove_file(&output)?;
    }

    let sidecars = Sidecars::missing(source);
    let result = build_repaired(source, set, output);
    sidecars.remove();
    let report = result?;

    info!(
        output = %report.output.display(),
        copied = report.copied.len(),
        skipped = report.skipped.len(),
        failed = report.failed.len(),
        "repaired show file"
    );
    Ok(report)
}

fn build_repaired(
    source: &Path,
    set: &MigrationSet,
    output: PathBuf,
) -> Result<RepairReport, StorageError> {
    let source_tables = read_source_tables(source)?;

    let parent = output
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or(Path::new("."));
    let staging = tempfile::Builder::new()
        .prefix(".cadence-repair-")
        .suffix(".tmp")
        .tempfile_in(parent)?;

    let mut report = RepairReport {
        output,
        ..Default::default()
    };
    {
        let mut dest = Connection::open(staging.path())?;
        dest.execute_batch("PRAGMA journal_mode = DELETE; PRAGMA foreign_keys = ON;")?;
        migrate::create_new(&mut dest, set)?;
        salvage(&dest, source, &source_tables, &mut report)?;
        dest.close().map_err(|(_, err)| StorageError::from(err))?;
    }
    staging
        .persist(&report.output)
        .map_err(|err| StorageError::Io(err.error))?;
    Ok(report)
}

/// `-wal`/`-shm` files SQLite creates beside a WAL-mode source when it is
/// opened read-only. Only the ones absent before the repair are removed.
struct Sidecars(Vec<PathBuf>);

impl Sidecars {
    fn missing(source: &Path) -> Self {
        let paths = ["-wal", "-shm"]
            .into_iter()
            .map(|suffix| {
                let mut name = source.as_os_str().to_owned();
                name.push(suffix);
                PathBuf::from(name)
            })
            .filter(|path| !path.exists())
            .collect();
        Self(paths)
    }

    /// Call once every connection to the source is closed.
    fn remove(self) {
        for path in self.0 {
            match fs::remove_file(&path) {
                Ok(()) => debug!(path = %path.display(), "removed source sidecar"),
                Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
                Err(err) => warn!(path = %path.display(), error = %err, "could not remove source sidecar"),
            }
        }
    }
}

fn read_source_tables(source: &Path) -> Result<Vec<String>, StorageError> {
    let conn = Connection::open_with_flags(
        source,
        OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_URI | OpenFlags::SQLITE_OPEN_NO_MUTEX,
    )?;
    schema::user_tables(&conn, "main").map_err(|err| {
        StorageError::Corrupt(format!("cannot read tables of {}: {err}", source.display()))
    })
}

/// `file:` URI opening `path` read-only.
fn read_only_uri(path: &Path) -> String {
    let mut uri = String::from("file:");
    for byte in path.to_string_lossy().bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'/' | b'-' | b'_' | b'.' | b'~' => {
                uri.push(byte as char)
            }
            other => uri.push_str(&format!("%{other:02X}")),
        }
    }
    uri.push_str("?mode=ro");
    uri
}

fn salvage(
    dest: &Connection,
    source: &Path,
    source_tables: &[String],
    report: &mut RepairReport,
) -> Result<(), StorageError> {
    schema::drop_triggers(dest)?;
    schema::set_foreign_keys(dest, false)?;
    dest.execute_batch(&format!(
        "ATTACH DATABASE {} AS {SOURCE_SCHEMA};",
        quote_literal(&read_only_uri(source))
    ))?;

    let copied = copy_tables(dest, source_tables, report);

    let detached = dest.execute_batch(&format!("DETACH DATABASE {SOURCE_SCHEMA};"));
    copied?;
    detached?;

    schema::recreate_triggers(dest)?;
    schema::set_foreign_keys(dest, true)?;
    migrate::initialize_database(dest)?;

    let dangling: i64 = dest.query_row("SELECT COUNT(*) FROM pragma_foreign_key_check", [], |row| {
        row.get(0)
    })?;
    if dangling > 0 {
        warn!(dangling, "repaired file has rows with dangling references");
    }
    Ok(())
}

fn copy_tables(
    dest: &Connection,
    source_tables: &[String],
    report: &mut RepairReport,
) -> Result<(), StorageError> {
    for table in source_tables {
        if EXCLUDED_TABLES.contains(&table.as_str()) {
            continue;
        }
        if !schema::table_exists(dest, "main", table)? {
            warn!(table = %table, "table is not part of the current schema, skipping");
            report.skipped.push(table.clone());
            continue;
        }

        let source_columns = schema::table_columns(dest, SOURCE_SCHEMA, table)?;
        let common: Vec<String> = schema::table_columns(dest, "main", table)?
            .into_iter()
            .filter(|column| source_columns.contains(column))
            .collect();
        if common.is_empty() {
            warn!(table = %table, "no columns in common with the current schema, skipping");
            report.skipped.push(table.clone());
            continue;
        }

        if SINGLETON_TABLES.contains(&table.as_str()) {
            copy_singleton(dest, table, &common)?;
            report.copied.push((table.clone(), 1));
            continue;
        }

        match with_savepoint(dest, "repair_table", |conn| copy_rows(conn, table, &common)) {
            Ok(rows) => report.copied.push((table.clone(), rows)),
            Err(err) => {
                warn!(table = %table, error = %err, "could not copy table, keeping defaults");
                report.failed.push(table.clone());
            }
        }
    }
    Ok(())
}

fn column_list(columns: &[String]) -> String {
    columns
        .iter()
        .map(|c| quote_ident(c))
        .collect::<Vec<_>>()
        .join(", ")
}

fn copy_rows(conn: &Connection, table: &str, columns: &[String]) -> Result<usize, StorageError> {
    let table = quote_ident(table);
    let columns = column_list(columns);
    conn.execute(&format!("DELETE FROM main.{table}"), [])?;
    let rows = conn.execute(
        &format!("INSERT INTO main.{table} ({columns}) SELECT {columns} FROM {SOURCE_SCHEMA}.{table}"),
        [],
    )?;
    Ok(rows)
}

/// Copy the one row of a singleton table. Either side holding anything but
/// exactly one row means the file is damaged.
fn copy_singleton(conn: &Connection, table: &str, columns: &[String]) -> Result<(), StorageError> {
    let ident = quote_ident(table);
    for schema_name in [SOURCE_SCHEMA, "main"] {
        let rows: i64 = conn.query_row(
            &format!("SELECT COUNT(*) FROM {schema_name}.{ident}"),
            [],
            |row| row.get(0),
        )?;
        if rows != 1 {
            return Err(StorageError::Corrupt(format!(
                "{table} should hold exactly one row but {schema_name} has {rows}"
            )));
        }
    }

    let values: Vec<String> = columns.iter().filter(|c| *c != "id").cloned().collect();
    if values.is_empty() {
        return Ok(());
    }
    let list = column_list(&values);
    conn.execute(
        &format!("UPDATE main.{ident} SET ({list}) = (SELECT {list} FROM {SOURCE_SCHEMA}.{ident})"),
        [],
    )?;
    Ok(())
}
