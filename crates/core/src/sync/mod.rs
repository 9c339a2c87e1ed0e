//! Offline-first cloud sync: pending-operation queue draining, retry
//! classification, connectivity tracking, and the background scheduler.

mod connectivity;
mod coordinator;
mod engine;
mod model;
mod scheduler;

#[cfg(test)]
pub(crate) mod testutil;

pub use connectivity::ConnectivityMonitor;
pub use coordinator::{SyncCoordinator, SyncRuntimeState};
pub use engine::{backoff_seconds, classify_http_status, RetryClass, REAUTH_RETRY_DELAY_SECONDS};
pub use model::*;
pub use scheduler::{
    ensure_background_sync_started, stop_background_sync, SYNC_INTERVAL_JITTER_SECS,
    SYNC_PERIODIC_INTERVAL_SECS,
};
