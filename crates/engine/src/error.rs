use cadence_core::CoreError;
use cadence_storage::StorageError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Core(#[from] CoreError),

    /// The action failed and undoing its partial writes failed as well. The
    /// show may hold part of the action.
    #[error("{action} failed ({source}) and could not be rolled back: {rollback}")]
    RollbackFailed {
        action: &'static str,
        #[source]
        source: StorageError,
        rollback: StorageError,
    },
}
