use keeper_core::error::DbError;
use keeper_core::orchestrator::OrchestratorError;
use keeper_core::store::StoreError;
use keeper_resources::LockError;

/// Failure of one garbage-collection step.
///
/// Every variant is treated as transient: the failing item is left as is
/// and retried on the next cycle.
#[derive(Debug, thiserror::Error)]
pub enum GcError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Lock(#[from] LockError),

    #[error(transparent)]
    Db(#[from] DbError),

    #[error(transparent)]
    Orchestrator(#[from] OrchestratorError),
}
