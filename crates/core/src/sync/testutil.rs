//! In-memory fakes shared by the coordinator and scheduler tests.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex as StdMutex};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal_macros::dec;
use tokio::sync::Notify;

use crate::errors::Result;
use crate::secrets::{MemorySecretStore, SecretStore, SYNC_ACCESS_TOKEN_KEY};
use crate::settings::SettingsServiceTrait;
use crate::transactions::TransactionPayload;

use super::connectivity::ConnectivityMonitor;
use super::coordinator::{SyncCoordinator, SyncRuntimeState};
use super::model::{
    NetworkState, OutboxStatus, PendingOperation, RemoteError, RemoteTransactionStore,
    SyncEngineStatus, SyncOperation, SyncRepositoryTrait, SyncStats, SyncStatus,
};

pub fn payload(category: &str) -> TransactionPayload {
    TransactionPayload {
        amount: dec!(10.00),
        category: category.to_string(),
        txn_date: "2026-03-14".to_string(),
        notes: None,
        payment_method: None,
    }
}

pub fn operation(
    event_id: &str,
    op: SyncOperation,
    transaction_id: &str,
    with_payload: Option<&str>,
) -> PendingOperation {
    PendingOperation {
        event_id: event_id.to_string(),
        op,
        transaction_id: transaction_id.to_string(),
        payload: with_payload.map(payload),
        status: OutboxStatus::Pending,
        seq: 0,
        retry_count: 0,
        next_retry_at: None,
        last_error: None,
        last_error_code: None,
        created_at: Utc::now().to_rfc3339(),
    }
}

#[derive(Default)]
pub struct MemorySyncRepository {
    pub operations: StdMutex<Vec<PendingOperation>>,
    pub statuses: StdMutex<HashMap<String, SyncStatus>>,
    pub engine: StdMutex<SyncEngineStatus>,
    pub completed_marks: AtomicUsize,
    pub outcome_marks: AtomicUsize,
}

impl MemorySyncRepository {
    pub fn seed_operations(&self, ops: Vec<PendingOperation>) {
        for op in &ops {
            if op.op != SyncOperation::Delete {
                self.statuses
                    .lock()
                    .unwrap()
                    .insert(op.transaction_id.clone(), SyncStatus::Pending);
            }
        }
        *self.operations.lock().unwrap() = ops;
    }

    pub fn seed_statuses(&self, entries: &[(&str, SyncStatus)]) {
        let mut statuses = self.statuses.lock().unwrap();
        for (id, status) in entries {
            statuses.insert(id.to_string(), *status);
        }
    }

    pub fn queued_event_ids(&self) -> Vec<String> {
        self.operations
            .lock()
            .unwrap()
            .iter()
            .filter(|op| op.status == OutboxStatus::Pending)
            .map(|op| op.event_id.clone())
            .collect()
    }

    pub fn find(&self, event_id: &str) -> Option<PendingOperation> {
        self.operations
            .lock()
            .unwrap()
            .iter()
            .find(|op| op.event_id == event_id)
            .cloned()
    }

    pub fn status_of(&self, transaction_id: &str) -> Option<SyncStatus> {
        self.statuses.lock().unwrap().get(transaction_id).copied()
    }

    pub fn engine_snapshot(&self) -> SyncEngineStatus {
        self.engine.lock().unwrap().clone()
    }

    pub fn set_engine_next_retry_at(&self, next_retry_at: Option<String>) {
        self.engine.lock().unwrap().next_retry_at = next_retry_at;
    }

    /// Fold a fresh payload into a queued entry, as a local edit landing
    /// mid-drain would.
    pub fn fold_payload(&self, event_id: &str, category: &str) {
        let mut operations = self.operations.lock().unwrap();
        if let Some(op) = operations.iter_mut().find(|op| op.event_id == event_id) {
            op.payload = Some(payload(category));
            op.seq += 1;
        }
    }

    /// Drop a queued entry, as a local delete of a never-synced record
    /// landing mid-drain would.
    pub fn cancel_entry(&self, event_id: &str, transaction_id: &str) {
        self.operations
            .lock()
            .unwrap()
            .retain(|op| op.event_id != event_id);
        self.statuses.lock().unwrap().remove(transaction_id);
    }
}

#[async_trait]
impl SyncRepositoryTrait for MemorySyncRepository {
    fn list_due_operations(&self, limit: i64) -> Result<Vec<PendingOperation>> {
        let now = Utc::now();
        Ok(self
            .operations
            .lock()
            .unwrap()
            .iter()
            .filter(|op| op.status == OutboxStatus::Pending)
            .filter(|op| match op.next_retry_at.as_deref() {
                None => true,
                Some(at) => DateTime::parse_from_rfc3339(at)
                    .map(|at| at <= now)
                    .unwrap_or(true),
            })
            .take(limit as usize)
            .cloned()
            .collect())
    }

    fn count_queued_operations(&self) -> Result<i64> {
        Ok(self
            .operations
            .lock()
            .unwrap()
            .iter()
            .filter(|op| op.status == OutboxStatus::Pending)
            .count() as i64)
    }

    async fn acknowledge_create(
        &self,
        event_id: String,
        temp_id: String,
        remote_id: String,
        seq: i64,
    ) -> Result<()> {
        let mut operations = self.operations.lock().unwrap();
        let Some(index) = operations.iter().position(|op| op.event_id == event_id) else {
            // Deleted mid-flight; the remote document is owed a delete.
            operations.push(operation(
                &format!("ev-del-{}", remote_id),
                SyncOperation::Delete,
                &remote_id,
                None,
            ));
            return Ok(());
        };
        if operations[index].seq != seq {
            operations[index].op = SyncOperation::Update;
            operations[index].transaction_id = remote_id.clone();
            let mut statuses = self.statuses.lock().unwrap();
            statuses.remove(&temp_id);
            statuses.insert(remote_id, SyncStatus::Pending);
            return Ok(());
        }
        operations.remove(index);
        let mut statuses = self.statuses.lock().unwrap();
        statuses.remove(&temp_id);
        statuses.insert(remote_id, SyncStatus::Synced);
        Ok(())
    }

    async fn acknowledge_update(
        &self,
        event_id: String,
        transaction_id: String,
        seq: i64,
    ) -> Result<()> {
        let mut operations = self.operations.lock().unwrap();
        let Some(index) = operations.iter().position(|op| op.event_id == event_id) else {
            return Ok(());
        };
        if operations[index].seq != seq {
            return Ok(());
        }
        operations.remove(index);
        self.statuses
            .lock()
            .unwrap()
            .insert(transaction_id, SyncStatus::Synced);
        Ok(())
    }

    async fn acknowledge_delete(&self, event_id: String) -> Result<()> {
        self.operations
            .lock()
            .unwrap()
            .retain(|op| op.event_id != event_id);
        Ok(())
    }

    async fn schedule_operation_retry(
        &self,
        event_id: String,
        delay_seconds: i64,
        error: Option<String>,
        error_code: Option<String>,
    ) -> Result<()> {
        let mut operations = self.operations.lock().unwrap();
        if let Some(op) = operations.iter_mut().find(|op| op.event_id == event_id) {
            op.retry_count += 1;
            op.next_retry_at =
                Some((Utc::now() + chrono::Duration::seconds(delay_seconds)).to_rfc3339());
            op.last_error = error;
            op.last_error_code = error_code;
            self.statuses
                .lock()
                .unwrap()
                .insert(op.transaction_id.clone(), SyncStatus::Failed);
        }
        Ok(())
    }

    async fn mark_operation_dead(
        &self,
        event_id: String,
        error: Option<String>,
        error_code: Option<String>,
    ) -> Result<()> {
        let mut operations = self.operations.lock().unwrap();
        if let Some(op) = operations.iter_mut().find(|op| op.event_id == event_id) {
            op.status = OutboxStatus::Dead;
            op.last_error = error;
            op.last_error_code = error_code;
            self.statuses
                .lock()
                .unwrap()
                .insert(op.transaction_id.clone(), SyncStatus::Failed);
        }
        Ok(())
    }

    fn get_sync_stats(&self) -> Result<SyncStats> {
        let statuses = self.statuses.lock().unwrap();
        let mut stats = SyncStats {
            total: statuses.len() as i64,
            pending: 0,
            synced: 0,
            failed: 0,
        };
        for status in statuses.values() {
            match status {
                SyncStatus::Pending => stats.pending += 1,
                SyncStatus::Synced => stats.synced += 1,
                SyncStatus::Failed => stats.failed += 1,
            }
        }
        Ok(stats)
    }

    fn get_engine_status(&self) -> Result<SyncEngineStatus> {
        Ok(self.engine_snapshot())
    }

    async fn mark_sync_completed(&self) -> Result<()> {
        self.completed_marks.fetch_add(1, Ordering::SeqCst);
        let mut engine = self.engine.lock().unwrap();
        engine.last_synced_at = Some(Utc::now().to_rfc3339());
        engine.last_error = None;
        engine.consecutive_failures = 0;
        Ok(())
    }

    async fn mark_engine_error(&self, message: String) -> Result<()> {
        let mut engine = self.engine.lock().unwrap();
        engine.last_error = Some(message);
        engine.consecutive_failures += 1;
        Ok(())
    }

    async fn mark_cycle_outcome(
        &self,
        status: String,
        duration_ms: i64,
        next_retry_at: Option<String>,
    ) -> Result<()> {
        self.outcome_marks.fetch_add(1, Ordering::SeqCst);
        let mut engine = self.engine.lock().unwrap();
        engine.last_cycle_status = Some(status);
        engine.last_cycle_duration_ms = Some(duration_ms);
        engine.next_retry_at = next_retry_at;
        Ok(())
    }
}

/// Remote fake scripted by category (creates) and id (updates, deletes).
/// Optionally parks every call on a notify gate.
#[derive(Default)]
pub struct ScriptedRemote {
    pub fail_categories: HashSet<String>,
    pub fail_ids: HashSet<String>,
    pub failure: Option<RemoteError>,
    pub created: AtomicUsize,
    pub calls: StdMutex<Vec<String>>,
    pub gate: Option<Arc<Notify>>,
}

impl ScriptedRemote {
    pub fn failing_with(mut self, failure: RemoteError) -> Self {
        self.failure = Some(failure);
        self
    }

    fn failure(&self) -> RemoteError {
        self.failure
            .clone()
            .unwrap_or_else(|| RemoteError::retryable("scripted failure"))
    }

    async fn wait_gate(&self) {
        if let Some(gate) = &self.gate {
            gate.notified().await;
        }
    }

    pub fn call_log(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl RemoteTransactionStore for ScriptedRemote {
    async fn create_transaction(
        &self,
        _access_token: &str,
        payload: &TransactionPayload,
    ) -> std::result::Result<String, RemoteError> {
        self.wait_gate().await;
        self.calls
            .lock()
            .unwrap()
            .push(format!("create:{}", payload.category));
        if self.fail_categories.contains(&payload.category) {
            return Err(self.failure());
        }
        let n = self.created.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(format!("srv-{}", n))
    }

    async fn update_transaction(
        &self,
        _access_token: &str,
        remote_id: &str,
        _payload: &TransactionPayload,
    ) -> std::result::Result<(), RemoteError> {
        self.wait_gate().await;
        self.calls
            .lock()
            .unwrap()
            .push(format!("update:{}", remote_id));
        if self.fail_ids.contains(remote_id) {
            return Err(self.failure());
        }
        Ok(())
    }

    async fn delete_transaction(
        &self,
        _access_token: &str,
        remote_id: &str,
    ) -> std::result::Result<(), RemoteError> {
        self.wait_gate().await;
        self.calls
            .lock()
            .unwrap()
            .push(format!("delete:{}", remote_id));
        if self.fail_ids.contains(remote_id) {
            return Err(self.failure());
        }
        Ok(())
    }
}

pub struct StubSettings {
    pub enabled: bool,
}

#[async_trait]
impl SettingsServiceTrait for StubSettings {
    fn is_sync_enabled(&self) -> Result<bool> {
        Ok(self.enabled)
    }

    async fn set_sync_enabled(&self, _enabled: bool) -> Result<()> {
        Ok(())
    }
}

pub struct Harness {
    pub repository: Arc<MemorySyncRepository>,
    pub remote: Arc<ScriptedRemote>,
    pub connectivity: Arc<ConnectivityMonitor>,
    pub coordinator: Arc<SyncCoordinator>,
}

pub fn harness(remote: ScriptedRemote) -> Harness {
    harness_with(remote, true, Some("tok-1"), NetworkState::Online)
}

pub fn harness_with(
    remote: ScriptedRemote,
    sync_enabled: bool,
    token: Option<&str>,
    network: NetworkState,
) -> Harness {
    let repository = Arc::new(MemorySyncRepository::default());
    let remote = Arc::new(remote);
    let secrets = Arc::new(MemorySecretStore::new());
    if let Some(token) = token {
        secrets
            .set_secret(SYNC_ACCESS_TOKEN_KEY, token)
            .expect("seed token");
    }
    let connectivity = Arc::new(ConnectivityMonitor::new(network));
    let coordinator = Arc::new(SyncCoordinator::new(
        repository.clone(),
        remote.clone(),
        Arc::new(StubSettings {
            enabled: sync_enabled,
        }),
        secrets,
        connectivity.clone(),
        Arc::new(SyncRuntimeState::new()),
    ));
    Harness {
        repository,
        remote,
        connectivity,
        coordinator,
    }
}
