//! Sync domain models and storage/transport contracts.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::errors::Result;
use crate::transactions::TransactionPayload;

use super::engine::RetryClass;

/// Sync lifecycle of a local transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncStatus {
    Pending,
    Synced,
    Failed,
}

/// Supported queued operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncOperation {
    Create,
    Update,
    Delete,
}

/// Queue entry lifecycle. Entries leave the queue on acknowledgement;
/// `dead` entries stay for inspection but are never drained again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutboxStatus {
    Pending,
    Dead,
}

/// A queued local mutation awaiting remote acknowledgement.
///
/// `transaction_id` is a temp identifier until the record's create has
/// been acknowledged, a remote identifier afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingOperation {
    pub event_id: String,
    pub op: SyncOperation,
    pub transaction_id: String,
    pub payload: Option<TransactionPayload>,
    pub status: OutboxStatus,
    /// Bumped every time a later local mutation folds into this entry.
    /// Acknowledgements carry the drained value so a fold that landed
    /// while the entry was in flight is never discarded.
    pub seq: i64,
    pub retry_count: i32,
    pub next_retry_at: Option<String>,
    pub last_error: Option<String>,
    pub last_error_code: Option<String>,
    pub created_at: String,
}

/// Outcome of one drain of the pending queue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncReport {
    /// `ok`, `partial`, `error`, or a skip reason (`offline`,
    /// `auth_required`, `sync_disabled`, `already_running`).
    pub status: String,
    pub success_count: usize,
    pub failed_count: usize,
    pub total_count: usize,
}

impl SyncReport {
    /// Zero-result report used when a precondition short-circuits the
    /// drain. Not an error.
    pub fn skipped(status: &str) -> Self {
        SyncReport {
            status: status.to_string(),
            success_count: 0,
            failed_count: 0,
            total_count: 0,
        }
    }
}

/// Counts derived from the local transaction set on demand.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncStats {
    pub total: i64,
    pub pending: i64,
    pub synced: i64,
    pub failed: i64,
}

/// Lightweight engine status for diagnostics surfaces.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncEngineStatus {
    pub last_synced_at: Option<String>,
    pub last_error: Option<String>,
    pub consecutive_failures: i32,
    pub next_retry_at: Option<String>,
    pub last_cycle_status: Option<String>,
    pub last_cycle_duration_ms: Option<i64>,
}

/// Device reachability as reported by the embedding application.
///
/// `Connected` means the link is up but internet reachability is not
/// confirmed (captive portal, airplane-mode races). Only `Online`
/// satisfies the coordinator's precondition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NetworkState {
    Offline,
    Connected,
    Online,
}

/// Failure surfaced by a remote store implementation, already classified
/// for the retry policy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteError {
    pub message: String,
    pub retry_class: RetryClass,
    /// HTTP status when the transport had one.
    pub status: Option<u16>,
}

impl RemoteError {
    pub fn retryable(message: impl Into<String>) -> Self {
        RemoteError {
            message: message.into(),
            retry_class: RetryClass::Retryable,
            status: None,
        }
    }

    pub fn permanent(message: impl Into<String>) -> Self {
        RemoteError {
            message: message.into(),
            retry_class: RetryClass::Permanent,
            status: None,
        }
    }

    pub fn reauth_required(message: impl Into<String>) -> Self {
        RemoteError {
            message: message.into(),
            retry_class: RetryClass::ReauthRequired,
            status: None,
        }
    }

    /// Short machine code recorded on the queue entry (`http_404`,
    /// `transport`).
    pub fn error_code(&self) -> String {
        match self.status {
            Some(status) => format!("http_{}", status),
            None => "transport".to_string(),
        }
    }
}

impl std::fmt::Display for RemoteError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

/// Remote document store for transactions. The HTTP client implements
/// this; the coordinator never sees transport details.
#[async_trait]
pub trait RemoteTransactionStore: Send + Sync {
    /// Insert a new document, returning the durable remote identifier.
    async fn create_transaction(
        &self,
        access_token: &str,
        payload: &TransactionPayload,
    ) -> std::result::Result<String, RemoteError>;

    async fn update_transaction(
        &self,
        access_token: &str,
        remote_id: &str,
        payload: &TransactionPayload,
    ) -> std::result::Result<(), RemoteError>;

    async fn delete_transaction(
        &self,
        access_token: &str,
        remote_id: &str,
    ) -> std::result::Result<(), RemoteError>;
}

/// Storage seam for the pending queue and engine state.
#[async_trait]
pub trait SyncRepositoryTrait: Send + Sync {
    /// Pending entries whose `next_retry_at` is unset or due, oldest
    /// first.
    fn list_due_operations(&self, limit: i64) -> Result<Vec<PendingOperation>>;

    /// Pending entries regardless of due time. Drives the scheduler's
    /// fast wake.
    fn count_queued_operations(&self) -> Result<i64>;

    /// Acknowledge a create drained at `seq`: rekey the local record to
    /// its remote identifier and, if the entry is unchanged, drop it and
    /// mark the record synced. A fold that landed mid-flight leaves the
    /// record pending and rewrites the entry as an update under the
    /// remote identifier; a mid-flight local delete queues a delete for
    /// the now-orphaned remote document instead.
    async fn acknowledge_create(
        &self,
        event_id: String,
        temp_id: String,
        remote_id: String,
        seq: i64,
    ) -> Result<()>;

    /// Acknowledge an update drained at `seq`: if the entry is
    /// unchanged, drop it and mark the record synced. A fold that
    /// landed mid-flight keeps the entry queued and the record pending;
    /// a vanished entry (superseded by a queued delete) is a no-op.
    async fn acknowledge_update(
        &self,
        event_id: String,
        transaction_id: String,
        seq: i64,
    ) -> Result<()>;

    /// Acknowledge a delete: drop the entry (the local row is already
    /// gone).
    async fn acknowledge_delete(&self, event_id: String) -> Result<()>;

    /// Keep the entry queued, push `next_retry_at` out by
    /// `delay_seconds`, record the failure, mark the record failed.
    async fn schedule_operation_retry(
        &self,
        event_id: String,
        delay_seconds: i64,
        error: Option<String>,
        error_code: Option<String>,
    ) -> Result<()>;

    /// Park the entry as dead and mark the record failed.
    async fn mark_operation_dead(
        &self,
        event_id: String,
        error: Option<String>,
        error_code: Option<String>,
    ) -> Result<()>;

    fn get_sync_stats(&self) -> Result<SyncStats>;

    fn get_engine_status(&self) -> Result<SyncEngineStatus>;

    /// Stamp `last_synced_at`, clear the error fields.
    async fn mark_sync_completed(&self) -> Result<()>;

    /// Record a whole-cycle failure and bump `consecutive_failures`.
    async fn mark_engine_error(&self, message: String) -> Result<()>;

    /// Record the cycle outcome fields read by diagnostics and the
    /// scheduler.
    async fn mark_cycle_outcome(
        &self,
        status: String,
        duration_ms: i64,
        next_retry_at: Option<String>,
    ) -> Result<()>;
}
