pub mod config;
pub mod error;
pub mod guard;
pub mod history;
pub mod migrate;
pub mod positions;
pub mod repair;
pub mod schema;
pub mod sqlite;
pub mod tables;

pub use config::{JournalMode, StorageConfig};
pub use error::StorageError;
pub use history::{EditGroup, HistoryOutcome, HistoryStats};
pub use migrate::{AppliedMigration, MigrationFile, MigrationReport, MigrationSet};
pub use positions::{PositionalInsert, PositionalTable, PositionedRow};
pub use repair::{RepairReport, repair_database, repair_with_report};
pub use sqlite::ShowStorage;
