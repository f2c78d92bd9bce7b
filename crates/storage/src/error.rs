use thiserror::Error;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("sqlite error: {0}")]
    Sqlite(#[source] rusqlite::Error),

    /// Rejected by a constraint or guard trigger. The message is the one
    /// raised by the database and is meant for end users.
    #[error("{0}")]
    ConstraintViolation(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("invalid position: {0}")]
    InvalidPosition(String),

    #[error(
        "database is at schema version {found} but {expected} was expected; \
         open and save the file with an intermediate release to upgrade it first"
    )]
    SchemaVersion { found: i32, expected: i32 },

    #[error("a previous migration of this file was interrupted; restore a backup or repair the file")]
    InterruptedMigration,

    #[error("no migrations found in {0}")]
    MissingMigrations(String),

    #[error("corrupt database: {0}")]
    Corrupt(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("core error: {0}")]
    Core(#[from] cadence_core::CoreError),
}

impl From<rusqlite::Error> for StorageError {
    fn from(e: rusqlite::Error) -> Self {
        match e {
            rusqlite::Error::SqliteFailure(err, Some(message))
                if err.code == rusqlite::ErrorCode::ConstraintViolation =>
            {
                StorageError::ConstraintViolation(message)
            }
            other => StorageError::Sqlite(other),
        }
    }
}

impl From<serde_json::Error> for StorageError {
    fn from(e: serde_json::Error) -> Self {
        StorageError::Serialization(e.to_string())
    }
}
