//! Protected-row guard.
//!
//! Sentinel rows (first beat, first page, the singleton rows) are protected by
//! `BEFORE` triggers that raise a constraint error. A rejected statement never
//! runs, so its `AFTER` history triggers never fire either.

use rusqlite::Connection;

use crate::error::StorageError;
use crate::schema::{self, quote_ident, quote_literal};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GuardEvent {
    Update,
    Delete,
}

impl GuardEvent {
    fn as_sql(&self) -> &'static str {
        match self {
            Self::Update => "UPDATE",
            Self::Delete => "DELETE",
        }
    }
}

/// One declarative rule: reject `event` on `table` when `condition` holds.
#[derive(Debug, Clone, Copy)]
pub struct Guard {
    pub name: &'static str,
    pub table: &'static str,
    pub event: GuardEvent,
    pub condition: &'static str,
    pub message: &'static str,
}

pub const GUARDS: &[Guard] = &[
    Guard {
        name: "guard_first_beat_update",
        table: schema::BEATS,
        event: GuardEvent::Update,
        condition: "OLD.id = 0",
        message: "Modification not allowed for the first beat.",
    },
    Guard {
        name: "guard_first_beat_delete",
        table: schema::BEATS,
        event: GuardEvent::Delete,
        condition: "OLD.id = 0",
        message: "Deletion not allowed for the first beat.",
    },
    // The first page may have its notes edited, but never its anchor.
    Guard {
        name: "guard_first_page_update",
        table: schema::PAGES,
        event: GuardEvent::Update,
        condition: "OLD.id = 0 AND (NEW.id IS NOT OLD.id OR NEW.start_beat IS NOT OLD.start_beat OR NEW.is_subset IS NOT OLD.is_subset)",
        message: "Modification not allowed for the first page's start beat.",
    },
    Guard {
        name: "guard_first_page_delete",
        table: schema::PAGES,
        event: GuardEvent::Delete,
        condition: "OLD.id = 0",
        message: "Deletion not allowed for the first page.",
    },
    Guard {
        name: "guard_utility_update",
        table: schema::UTILITY,
        event: GuardEvent::Update,
        condition: "NEW.id IS NOT OLD.id",
        message: "Modification of the utility record's id is not allowed.",
    },
    Guard {
        name: "guard_utility_delete",
        table: schema::UTILITY,
        event: GuardEvent::Delete,
        condition: "1",
        message: "Deletion not allowed for the utility record.",
    },
    Guard {
        name: "guard_field_properties_delete",
        table: schema::FIELD_PROPERTIES,
        event: GuardEvent::Delete,
        condition: "1",
        message: "Deletion not allowed for the field properties.",
    },
    Guard {
        name: "guard_workspace_settings_delete",
        table: schema::WORKSPACE_SETTINGS,
        event: GuardEvent::Delete,
        condition: "1",
        message: "Deletion not allowed for the workspace settings.",
    },
];

impl Guard {
    pub fn create_sql(&self) -> String {
        format!(
            "CREATE TRIGGER IF NOT EXISTS {name} BEFORE {event} ON {table}
             WHEN {condition}
             BEGIN
                 SELECT RAISE(ABORT, {message});
             END;",
            name = quote_ident(self.name),
            event = self.event.as_sql(),
            table = quote_ident(self.table),
            condition = self.condition,
            message = quote_literal(self.message),
        )
    }
}

/// Create every guard whose table exists in the file.
pub fn create_guards(conn: &Connection) -> Result<(), StorageError> {
    for guard in GUARDS {
        if schema::table_exists(conn, "main", guard.table)? {
            conn.execute_batch(&guard.create_sql())?;
        }
    }
    Ok(())
}
