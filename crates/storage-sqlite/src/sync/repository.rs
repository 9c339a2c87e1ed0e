//! Repository for the pending-operation queue and sync engine state.
//!
//! `write_outbox_operation` runs inside the caller's write transaction,
//! so a record mutation and its queue entry commit or roll back
//! together.

use chrono::{Duration, Utc};
use diesel::dsl::count_star;
use diesel::prelude::*;
use diesel::r2d2::{self, Pool};
use diesel::sqlite::SqliteConnection;
use std::sync::Arc;
use uuid::Uuid;

use ledgerline_core::errors::Result;
use ledgerline_core::sync::{
    OutboxStatus, PendingOperation, SyncEngineStatus, SyncOperation, SyncRepositoryTrait,
    SyncStats, SyncStatus,
};
use ledgerline_core::transactions::{is_temp_transaction_id, TransactionPayload};

use crate::db::{get_connection, WriteHandle};
use crate::errors::StorageError;
use crate::schema::{sync_engine_state, sync_outbox, transactions};

use super::model::{SyncEngineStateDB, SyncOutboxOperationDB};

use async_trait::async_trait;

pub(crate) fn enum_to_db<T: serde::Serialize>(value: &T) -> Result<String> {
    Ok(serde_json::to_string(value)?.trim_matches('"').to_string())
}

pub(crate) fn enum_from_db<T: serde::de::DeserializeOwned>(value: &str) -> Result<T> {
    Ok(serde_json::from_str(&format!("\"{}\"", value))?)
}

#[derive(Debug, Clone)]
pub struct OutboxWriteRequest {
    pub event_id: Option<String>,
    pub op: SyncOperation,
    pub transaction_id: String,
    pub payload: Option<TransactionPayload>,
}

impl OutboxWriteRequest {
    pub fn create(transaction_id: impl Into<String>, payload: TransactionPayload) -> Self {
        Self {
            event_id: None,
            op: SyncOperation::Create,
            transaction_id: transaction_id.into(),
            payload: Some(payload),
        }
    }

    pub fn update(transaction_id: impl Into<String>, payload: TransactionPayload) -> Self {
        Self {
            event_id: None,
            op: SyncOperation::Update,
            transaction_id: transaction_id.into(),
            payload: Some(payload),
        }
    }

    pub fn delete(transaction_id: impl Into<String>) -> Self {
        Self {
            event_id: None,
            op: SyncOperation::Delete,
            transaction_id: transaction_id.into(),
            payload: None,
        }
    }
}

/// Insert a queue entry. The partial unique index on `transaction_id`
/// rejects a second live entry for the same record, which also fails
/// the surrounding transaction.
pub fn write_outbox_operation(
    conn: &mut SqliteConnection,
    request: OutboxWriteRequest,
) -> Result<String> {
    let event_id = request
        .event_id
        .unwrap_or_else(|| Uuid::now_v7().to_string());
    let payload = request
        .payload
        .as_ref()
        .map(serde_json::to_string)
        .transpose()?;

    let row = SyncOutboxOperationDB {
        event_id: event_id.clone(),
        op: enum_to_db(&request.op)?,
        transaction_id: request.transaction_id,
        payload,
        status: enum_to_db(&OutboxStatus::Pending)?,
        seq: 0,
        retry_count: 0,
        next_retry_at: None,
        last_error: None,
        last_error_code: None,
        created_at: Utc::now().to_rfc3339(),
    };

    diesel::insert_into(sync_outbox::table)
        .values(&row)
        .execute(conn)
        .map_err(StorageError::from)?;

    Ok(event_id)
}

pub(crate) fn find_live_operation(
    conn: &mut SqliteConnection,
    transaction_id: &str,
) -> Result<Option<SyncOutboxOperationDB>> {
    let row = sync_outbox::table
        .filter(sync_outbox::transaction_id.eq(transaction_id))
        .filter(sync_outbox::status.eq(enum_to_db(&OutboxStatus::Pending)?))
        .first::<SyncOutboxOperationDB>(conn)
        .optional()
        .map_err(StorageError::from)?;
    Ok(row)
}

/// Queue an update for `transaction_id`, folding into the live entry if
/// one exists so the queue never holds two operations for one record.
/// A queued create keeps its op with the fresher payload; the remote
/// store then only ever sees the final state. Each fold bumps `seq`, so
/// an acknowledgement for the pre-fold payload cannot drop the entry.
pub(crate) fn queue_update_operation(
    conn: &mut SqliteConnection,
    transaction_id: &str,
    payload: &TransactionPayload,
) -> Result<()> {
    match find_live_operation(conn, transaction_id)? {
        Some(live) => {
            let payload_json = serde_json::to_string(payload)?;
            diesel::update(sync_outbox::table.find(live.event_id))
                .set((
                    sync_outbox::payload.eq(Some(payload_json)),
                    sync_outbox::seq.eq(live.seq + 1),
                ))
                .execute(conn)
                .map_err(StorageError::from)?;
        }
        None => {
            // A record still under a temp id has no remote document to
            // patch; requeue it as a create.
            let request = if is_temp_transaction_id(transaction_id) {
                OutboxWriteRequest::create(transaction_id, payload.clone())
            } else {
                OutboxWriteRequest::update(transaction_id, payload.clone())
            };
            write_outbox_operation(conn, request)?;
        }
    }
    Ok(())
}

/// Queue a delete for a record the remote store already knows. Any live
/// entry is superseded by the delete.
pub(crate) fn queue_delete_operation(
    conn: &mut SqliteConnection,
    transaction_id: &str,
) -> Result<()> {
    if let Some(live) = find_live_operation(conn, transaction_id)? {
        diesel::delete(sync_outbox::table.find(live.event_id))
            .execute(conn)
            .map_err(StorageError::from)?;
    }
    write_outbox_operation(conn, OutboxWriteRequest::delete(transaction_id))?;
    Ok(())
}

/// Drop every queue entry for a record that is being discarded before
/// its create ever reached the remote store.
pub(crate) fn cancel_operations_for_transaction(
    conn: &mut SqliteConnection,
    transaction_id: &str,
) -> Result<usize> {
    let removed = diesel::delete(
        sync_outbox::table.filter(sync_outbox::transaction_id.eq(transaction_id)),
    )
    .execute(conn)
    .map_err(StorageError::from)?;
    Ok(removed)
}

fn mark_transaction_failed(conn: &mut SqliteConnection, transaction_id: &str) -> Result<()> {
    diesel::update(transactions::table.find(transaction_id))
        .set(transactions::sync_status.eq(enum_to_db(&SyncStatus::Failed)?))
        .execute(conn)
        .map_err(StorageError::from)?;
    Ok(())
}

fn to_pending_operation(row: SyncOutboxOperationDB) -> Result<PendingOperation> {
    let payload = row
        .payload
        .as_deref()
        .map(serde_json::from_str::<TransactionPayload>)
        .transpose()?;
    Ok(PendingOperation {
        event_id: row.event_id,
        op: enum_from_db(&row.op)?,
        transaction_id: row.transaction_id,
        payload,
        status: enum_from_db(&row.status)?,
        seq: row.seq,
        retry_count: row.retry_count,
        next_retry_at: row.next_retry_at,
        last_error: row.last_error,
        last_error_code: row.last_error_code,
        created_at: row.created_at,
    })
}

pub struct SyncRepository {
    pool: Arc<Pool<r2d2::ConnectionManager<SqliteConnection>>>,
    writer: WriteHandle,
}

impl SyncRepository {
    pub fn new(
        pool: Arc<Pool<r2d2::ConnectionManager<SqliteConnection>>>,
        writer: WriteHandle,
    ) -> Self {
        SyncRepository { pool, writer }
    }
}

#[async_trait]
impl SyncRepositoryTrait for SyncRepository {
    fn list_due_operations(&self, limit: i64) -> Result<Vec<PendingOperation>> {
        let mut conn = get_connection(&self.pool)?;
        let now = Utc::now().to_rfc3339();

        let rows = sync_outbox::table
            .filter(sync_outbox::status.eq(enum_to_db(&OutboxStatus::Pending)?))
            .filter(
                sync_outbox::next_retry_at
                    .is_null()
                    .or(sync_outbox::next_retry_at.le(now)),
            )
            .order(sync_outbox::created_at.asc())
            .then_order_by(sync_outbox::event_id.asc())
            .limit(limit)
            .load::<SyncOutboxOperationDB>(&mut conn)
            .map_err(StorageError::from)?;

        rows.into_iter().map(to_pending_operation).collect()
    }

    fn count_queued_operations(&self) -> Result<i64> {
        let mut conn = get_connection(&self.pool)?;
        let count = sync_outbox::table
            .filter(sync_outbox::status.eq(enum_to_db(&OutboxStatus::Pending)?))
            .select(count_star())
            .first::<i64>(&mut conn)
            .map_err(StorageError::from)?;
        Ok(count)
    }

    async fn acknowledge_create(
        &self,
        event_id: String,
        temp_id: String,
        remote_id: String,
        seq: i64,
    ) -> Result<()> {
        self.writer
            .exec(move |conn: &mut SqliteConnection| -> Result<()> {
                let entry = sync_outbox::table
                    .find(&event_id)
                    .first::<SyncOutboxOperationDB>(conn)
                    .optional()
                    .map_err(StorageError::from)?;

                let Some(entry) = entry else {
                    // The record was deleted while its create was in
                    // flight; the remote document it just produced has
                    // no local owner, so queue its delete.
                    write_outbox_operation(conn, OutboxWriteRequest::delete(remote_id))?;
                    return Ok(());
                };

                if entry.seq == seq {
                    diesel::delete(sync_outbox::table.find(&event_id))
                        .execute(conn)
                        .map_err(StorageError::from)?;
                    diesel::update(transactions::table.find(&temp_id))
                        .set((
                            transactions::id.eq(&remote_id),
                            transactions::sync_status.eq(enum_to_db(&SyncStatus::Synced)?),
                        ))
                        .execute(conn)
                        .map_err(StorageError::from)?;
                    return Ok(());
                }

                // A fold landed mid-flight. The remote now has the
                // pre-fold state under `remote_id`; keep the entry
                // queued as an update carrying the fresher payload and
                // leave the record pending.
                diesel::update(sync_outbox::table.find(&event_id))
                    .set((
                        sync_outbox::op.eq(enum_to_db(&SyncOperation::Update)?),
                        sync_outbox::transaction_id.eq(&remote_id),
                    ))
                    .execute(conn)
                    .map_err(StorageError::from)?;
                diesel::update(transactions::table.find(&temp_id))
                    .set(transactions::id.eq(&remote_id))
                    .execute(conn)
                    .map_err(StorageError::from)?;
                Ok(())
            })
            .await
    }

    async fn acknowledge_update(
        &self,
        event_id: String,
        transaction_id: String,
        seq: i64,
    ) -> Result<()> {
        self.writer
            .exec(move |conn: &mut SqliteConnection| -> Result<()> {
                let entry = sync_outbox::table
                    .find(&event_id)
                    .first::<SyncOutboxOperationDB>(conn)
                    .optional()
                    .map_err(StorageError::from)?;

                // A vanished entry was superseded by a queued delete;
                // a bumped seq means a fold landed mid-flight. Either
                // way the entry (if any) stays queued and the record is
                // not synced yet.
                let Some(entry) = entry else {
                    return Ok(());
                };
                if entry.seq != seq {
                    return Ok(());
                }

                diesel::delete(sync_outbox::table.find(&event_id))
                    .execute(conn)
                    .map_err(StorageError::from)?;
                diesel::update(transactions::table.find(&transaction_id))
                    .set(transactions::sync_status.eq(enum_to_db(&SyncStatus::Synced)?))
                    .execute(conn)
                    .map_err(StorageError::from)?;
                Ok(())
            })
            .await
    }

    async fn acknowledge_delete(&self, event_id: String) -> Result<()> {
        self.writer
            .exec(move |conn: &mut SqliteConnection| -> Result<()> {
                diesel::delete(sync_outbox::table.find(event_id))
                    .execute(conn)
                    .map_err(StorageError::from)?;
                Ok(())
            })
            .await
    }

    async fn schedule_operation_retry(
        &self,
        event_id: String,
        delay_seconds: i64,
        error: Option<String>,
        error_code: Option<String>,
    ) -> Result<()> {
        self.writer
            .exec(move |conn: &mut SqliteConnection| -> Result<()> {
                let Some(row) = sync_outbox::table
                    .find(&event_id)
                    .first::<SyncOutboxOperationDB>(conn)
                    .optional()
                    .map_err(StorageError::from)?
                else {
                    return Ok(());
                };

                let retry_at = (Utc::now() + Duration::seconds(delay_seconds)).to_rfc3339();
                diesel::update(sync_outbox::table.find(&event_id))
                    .set((
                        sync_outbox::retry_count.eq(row.retry_count + 1),
                        sync_outbox::next_retry_at.eq(Some(retry_at)),
                        sync_outbox::last_error.eq(error),
                        sync_outbox::last_error_code.eq(error_code),
                    ))
                    .execute(conn)
                    .map_err(StorageError::from)?;

                mark_transaction_failed(conn, &row.transaction_id)?;
                Ok(())
            })
            .await
    }

    async fn mark_operation_dead(
        &self,
        event_id: String,
        error: Option<String>,
        error_code: Option<String>,
    ) -> Result<()> {
        self.writer
            .exec(move |conn: &mut SqliteConnection| -> Result<()> {
                let Some(row) = sync_outbox::table
                    .find(&event_id)
                    .first::<SyncOutboxOperationDB>(conn)
                    .optional()
                    .map_err(StorageError::from)?
                else {
                    return Ok(());
                };

                diesel::update(sync_outbox::table.find(&event_id))
                    .set((
                        sync_outbox::status.eq(enum_to_db(&OutboxStatus::Dead)?),
                        sync_outbox::last_error.eq(error),
                        sync_outbox::last_error_code.eq(error_code),
                    ))
                    .execute(conn)
                    .map_err(StorageError::from)?;

                mark_transaction_failed(conn, &row.transaction_id)?;
                Ok(())
            })
            .await
    }

    fn get_sync_stats(&self) -> Result<SyncStats> {
        let mut conn = get_connection(&self.pool)?;
        let rows = transactions::table
            .group_by(transactions::sync_status)
            .select((transactions::sync_status, count_star()))
            .load::<(String, i64)>(&mut conn)
            .map_err(StorageError::from)?;

        let mut stats = SyncStats {
            total: 0,
            pending: 0,
            synced: 0,
            failed: 0,
        };
        for (status, count) in rows {
            stats.total += count;
            match enum_from_db::<SyncStatus>(&status)? {
                SyncStatus::Pending => stats.pending = count,
                SyncStatus::Synced => stats.synced = count,
                SyncStatus::Failed => stats.failed = count,
            }
        }
        Ok(stats)
    }

    fn get_engine_status(&self) -> Result<SyncEngineStatus> {
        let mut conn = get_connection(&self.pool)?;
        let engine = sync_engine_state::table
            .find(1)
            .first::<SyncEngineStateDB>(&mut conn)
            .optional()
            .map_err(StorageError::from)?;

        Ok(SyncEngineStatus {
            last_synced_at: engine.as_ref().and_then(|s| s.last_synced_at.clone()),
            last_error: engine.as_ref().and_then(|s| s.last_error.clone()),
            consecutive_failures: engine.as_ref().map(|s| s.consecutive_failures).unwrap_or(0),
            next_retry_at: engine.as_ref().and_then(|s| s.next_retry_at.clone()),
            last_cycle_status: engine.as_ref().and_then(|s| s.last_cycle_status.clone()),
            last_cycle_duration_ms: engine.and_then(|s| s.last_cycle_duration_ms),
        })
    }

    async fn mark_sync_completed(&self) -> Result<()> {
        self.writer
            .exec(move |conn: &mut SqliteConnection| -> Result<()> {
                let now = Utc::now().to_rfc3339();
                diesel::insert_into(sync_engine_state::table)
                    .values(SyncEngineStateDB {
                        id: 1,
                        last_synced_at: Some(now.clone()),
                        last_error: None,
                        consecutive_failures: 0,
                        next_retry_at: None,
                        last_cycle_status: Some("ok".to_string()),
                        last_cycle_duration_ms: None,
                    })
                    .on_conflict(sync_engine_state::id)
                    .do_update()
                    .set((
                        sync_engine_state::last_synced_at.eq(Some(now)),
                        sync_engine_state::last_error.eq::<Option<String>>(None),
                        sync_engine_state::consecutive_failures.eq(0),
                        sync_engine_state::next_retry_at.eq::<Option<String>>(None),
                    ))
                    .execute(conn)
                    .map_err(StorageError::from)?;
                Ok(())
            })
            .await
    }

    async fn mark_engine_error(&self, message: String) -> Result<()> {
        self.writer
            .exec(move |conn: &mut SqliteConnection| -> Result<()> {
                diesel::insert_into(sync_engine_state::table)
                    .values(SyncEngineStateDB {
                        id: 1,
                        last_synced_at: None,
                        last_error: Some(message.clone()),
                        consecutive_failures: 1,
                        next_retry_at: None,
                        last_cycle_status: Some("error".to_string()),
                        last_cycle_duration_ms: None,
                    })
                    .on_conflict(sync_engine_state::id)
                    .do_update()
                    .set((
                        sync_engine_state::last_error.eq(Some(message)),
                        sync_engine_state::consecutive_failures
                            .eq(sync_engine_state::consecutive_failures + 1),
                        sync_engine_state::last_cycle_status.eq(Some("error")),
                    ))
                    .execute(conn)
                    .map_err(StorageError::from)?;
                Ok(())
            })
            .await
    }

    async fn mark_cycle_outcome(
        &self,
        status: String,
        duration_ms: i64,
        next_retry_at: Option<String>,
    ) -> Result<()> {
        self.writer
            .exec(move |conn: &mut SqliteConnection| -> Result<()> {
                diesel::insert_into(sync_engine_state::table)
                    .values(SyncEngineStateDB {
                        id: 1,
                        last_synced_at: None,
                        last_error: None,
                        consecutive_failures: 0,
                        next_retry_at: next_retry_at.clone(),
                        last_cycle_status: Some(status.clone()),
                        last_cycle_duration_ms: Some(duration_ms),
                    })
                    .on_conflict(sync_engine_state::id)
                    .do_update()
                    .set((
                        sync_engine_state::last_cycle_status.eq(Some(status)),
                        sync_engine_state::last_cycle_duration_ms.eq(Some(duration_ms)),
                        sync_engine_state::next_retry_at.eq(next_retry_at),
                    ))
                    .execute(conn)
                    .map_err(StorageError::from)?;
                Ok(())
            })
            .await
    }
}
