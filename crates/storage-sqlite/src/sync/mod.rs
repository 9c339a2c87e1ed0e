//! SQLite storage implementation for sync (pending-operation queue, engine state).

pub mod model;
pub mod repository;

// Re-export for convenience
pub use model::{SyncEngineStateDB, SyncOutboxOperationDB};
pub use repository::{write_outbox_operation, OutboxWriteRequest, SyncRepository};

pub(crate) use repository::{
    cancel_operations_for_transaction, enum_from_db, enum_to_db, queue_delete_operation,
    queue_update_operation,
};
