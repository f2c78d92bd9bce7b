//! Edit-group bookkeeping for composite actions.
//!
//! An action's writes are logged by the storage triggers under one edit
//! group. If the action fails partway, the writes it already made are
//! replayed backwards before the error is returned, so the user sees either
//! the whole action or none of it. Only an action that succeeded and logged
//! something takes up a slot in the undo history.

use rusqlite::Connection;
use tracing::error;

use cadence_storage::{EditGroup, ShowStorage, StorageError};

use crate::error::EngineError;

/// Which edit group an action's writes belong to.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum GroupPolicy {
    /// Start a new group: the action undoes on its own.
    #[default]
    NewGroup,
    /// Extend the group of the previous action, so both undo together.
    JoinCurrent,
}

/// Run `action` under an edit group, compensating on failure.
pub(crate) fn run_in_group<T>(
    storage: &mut ShowStorage,
    name: &'static str,
    policy: GroupPolicy,
    action: impl FnOnce(&Connection) -> Result<T, StorageError>,
) -> Result<T, EngineError> {
    let group = match policy {
        GroupPolicy::NewGroup => EditGroup::begin(storage.conn())?,
        GroupPolicy::JoinCurrent => EditGroup::current(storage.conn())?,
    };

    let source = match action(storage.conn()) {
        Ok(value) => {
            group.finish(storage.conn())?;
            return Ok(value);
        }
        Err(err) => err,
    };

    match group.rollback(storage.conn_mut()) {
        Ok(_) => Err(source.into()),
        Err(rollback) => {
            error!(action = name, group = group.id(), error = %rollback, "compensating rollback failed");
            Err(EngineError::RollbackFailed {
                action: name,
                source,
                rollback,
            })
        }
    }
}
