//! Sync coordinator: drains the pending-operation queue against the
//! remote store with per-item acknowledgement.

use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use log::{debug, info, warn};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

use crate::errors::Result;
use crate::secrets::{SecretStore, SYNC_ACCESS_TOKEN_KEY};
use crate::settings::SettingsServiceTrait;

use super::connectivity::ConnectivityMonitor;
use super::engine::{backoff_seconds, RetryClass, REAUTH_RETRY_DELAY_SECONDS};
use super::model::{
    NetworkState, PendingOperation, RemoteError, RemoteTransactionStore, SyncEngineStatus,
    SyncOperation, SyncReport, SyncRepositoryTrait, SyncStats,
};

/// Maximum queue entries attempted per drain.
const DRAIN_BATCH_LIMIT: i64 = 500;

/// Mutable runtime slots owned by one coordinator instance.
///
/// The cycle mutex is the in-flight guard: `try_lock` failure is the
/// reentrancy signal. It lives in process memory only, so a crash mid
/// drain cannot leave sync wedged.
pub struct SyncRuntimeState {
    pub cycle_mutex: Mutex<()>,
    pub background_task: Mutex<Option<JoinHandle<()>>>,
}

impl SyncRuntimeState {
    pub fn new() -> Self {
        Self {
            cycle_mutex: Mutex::new(()),
            background_task: Mutex::new(None),
        }
    }
}

impl Default for SyncRuntimeState {
    fn default() -> Self {
        Self::new()
    }
}

/// Orchestrates queue drains. All collaborators are injected; the
/// coordinator owns no storage or transport detail.
pub struct SyncCoordinator {
    sync_repository: Arc<dyn SyncRepositoryTrait>,
    remote_store: Arc<dyn RemoteTransactionStore>,
    settings_service: Arc<dyn SettingsServiceTrait>,
    secret_store: Arc<dyn SecretStore>,
    connectivity: Arc<ConnectivityMonitor>,
    runtime: Arc<SyncRuntimeState>,
}

impl SyncCoordinator {
    pub fn new(
        sync_repository: Arc<dyn SyncRepositoryTrait>,
        remote_store: Arc<dyn RemoteTransactionStore>,
        settings_service: Arc<dyn SettingsServiceTrait>,
        secret_store: Arc<dyn SecretStore>,
        connectivity: Arc<ConnectivityMonitor>,
        runtime: Arc<SyncRuntimeState>,
    ) -> Self {
        SyncCoordinator {
            sync_repository,
            remote_store,
            settings_service,
            secret_store,
            connectivity,
            runtime,
        }
    }

    pub fn sync_repository(&self) -> Arc<dyn SyncRepositoryTrait> {
        Arc::clone(&self.sync_repository)
    }

    pub fn connectivity(&self) -> Arc<ConnectivityMonitor> {
        Arc::clone(&self.connectivity)
    }

    pub fn runtime(&self) -> Arc<SyncRuntimeState> {
        Arc::clone(&self.runtime)
    }

    pub fn get_sync_stats(&self) -> Result<SyncStats> {
        self.sync_repository.get_sync_stats()
    }

    pub fn get_engine_status(&self) -> Result<SyncEngineStatus> {
        self.sync_repository.get_engine_status()
    }

    /// Drain the pending queue once.
    ///
    /// Preconditions (device online, sync enabled, access token present)
    /// short-circuit with a zero report carrying the skip reason; so
    /// does a drain that finds another one in flight. Per-item remote
    /// failures are tallied and rescheduled, never propagated; only
    /// local storage failures surface as errors.
    pub async fn sync_pending_transactions(&self) -> Result<SyncReport> {
        let Ok(_cycle_guard) = self.runtime.cycle_mutex.try_lock() else {
            debug!("[Sync] Drain already in flight");
            return Ok(SyncReport::skipped("already_running"));
        };

        if self.connectivity.current() != NetworkState::Online {
            debug!("[Sync] Skipping drain: device not online");
            return Ok(SyncReport::skipped("offline"));
        }
        if !self.settings_service.is_sync_enabled()? {
            debug!("[Sync] Skipping drain: sync disabled");
            return Ok(SyncReport::skipped("sync_disabled"));
        }
        let access_token = match self.secret_store.get_secret(SYNC_ACCESS_TOKEN_KEY)? {
            Some(token) if !token.is_empty() => token,
            _ => {
                debug!("[Sync] Skipping drain: no access token");
                return Ok(SyncReport::skipped("auth_required"));
            }
        };

        let started_at = Instant::now();
        let due = self.sync_repository.list_due_operations(DRAIN_BATCH_LIMIT)?;

        let mut success_count = 0usize;
        let mut failed_count = 0usize;
        let mut earliest_retry: Option<DateTime<Utc>> = None;
        let mut last_error: Option<String> = None;

        for operation in due {
            match self.push_operation(&access_token, &operation).await? {
                Ok(()) => success_count += 1,
                Err(remote_error) => {
                    failed_count += 1;
                    warn!(
                        "[Sync] {:?} for {} failed: {}",
                        operation.op, operation.transaction_id, remote_error
                    );
                    last_error = Some(remote_error.message.clone());
                    let error_code = Some(remote_error.error_code());

                    match remote_error.retry_class {
                        RetryClass::Retryable => {
                            let delay = backoff_seconds(operation.retry_count);
                            self.sync_repository
                                .schedule_operation_retry(
                                    operation.event_id.clone(),
                                    delay,
                                    Some(remote_error.message),
                                    error_code,
                                )
                                .await?;
                            track_earliest(&mut earliest_retry, delay);
                        }
                        RetryClass::Permanent => {
                            self.sync_repository
                                .mark_operation_dead(
                                    operation.event_id.clone(),
                                    Some(remote_error.message),
                                    error_code,
                                )
                                .await?;
                        }
                        RetryClass::ReauthRequired => {
                            self.sync_repository
                                .schedule_operation_retry(
                                    operation.event_id.clone(),
                                    REAUTH_RETRY_DELAY_SECONDS,
                                    Some(remote_error.message),
                                    error_code,
                                )
                                .await?;
                            track_earliest(&mut earliest_retry, REAUTH_RETRY_DELAY_SECONDS);
                            // Every remaining call would burn the same 401;
                            // untouched entries stay due for the next drain.
                            warn!("[Sync] Reauthentication required; aborting drain");
                            break;
                        }
                    }
                }
            }
        }

        let total_count = success_count + failed_count;
        let status = if failed_count == 0 {
            "ok"
        } else if success_count > 0 {
            "partial"
        } else {
            "error"
        };

        if success_count > 0 {
            self.sync_repository.mark_sync_completed().await?;
        }
        if failed_count > 0 && success_count == 0 {
            self.sync_repository
                .mark_engine_error(last_error.unwrap_or_else(|| "sync drain failed".to_string()))
                .await?;
        }
        self.sync_repository
            .mark_cycle_outcome(
                status.to_string(),
                started_at.elapsed().as_millis() as i64,
                earliest_retry.map(|at| at.to_rfc3339()),
            )
            .await?;

        info!(
            "[Sync] Drain complete status={} success={} failed={} total={}",
            status, success_count, failed_count, total_count
        );
        Ok(SyncReport {
            status: status.to_string(),
            success_count,
            failed_count,
            total_count,
        })
    }

    /// Push one entry and, on success, apply its acknowledgement. The
    /// outer `Result` is local storage failure; the inner one is the
    /// remote outcome.
    async fn push_operation(
        &self,
        access_token: &str,
        operation: &PendingOperation,
    ) -> Result<std::result::Result<(), RemoteError>> {
        match operation.op {
            SyncOperation::Create => {
                let Some(payload) = operation.payload.as_ref() else {
                    return Ok(Err(RemoteError::permanent(
                        "create operation is missing its payload",
                    )));
                };
                match self
                    .remote_store
                    .create_transaction(access_token, payload)
                    .await
                {
                    Ok(remote_id) => {
                        self.sync_repository
                            .acknowledge_create(
                                operation.event_id.clone(),
                                operation.transaction_id.clone(),
                                remote_id,
                                operation.seq,
                            )
                            .await?;
                        Ok(Ok(()))
                    }
                    Err(remote_error) => Ok(Err(remote_error)),
                }
            }
            SyncOperation::Update => {
                let Some(payload) = operation.payload.as_ref() else {
                    return Ok(Err(RemoteError::permanent(
                        "update operation is missing its payload",
                    )));
                };
                match self
                    .remote_store
                    .update_transaction(access_token, &operation.transaction_id, payload)
                    .await
                {
                    Ok(()) => {
                        self.sync_repository
                            .acknowledge_update(
                                operation.event_id.clone(),
                                operation.transaction_id.clone(),
                                operation.seq,
                            )
                            .await?;
                        Ok(Ok(()))
                    }
                    Err(remote_error) => Ok(Err(remote_error)),
                }
            }
            SyncOperation::Delete => {
                match self
                    .remote_store
                    .delete_transaction(access_token, &operation.transaction_id)
                    .await
                {
                    Ok(()) => {
                        self.sync_repository
                            .acknowledge_delete(operation.event_id.clone())
                            .await?;
                        Ok(Ok(()))
                    }
                    Err(remote_error) => Ok(Err(remote_error)),
                }
            }
        }
    }
}

fn track_earliest(earliest: &mut Option<DateTime<Utc>>, delay_seconds: i64) {
    let candidate = Utc::now() + chrono::Duration::seconds(delay_seconds);
    match earliest {
        Some(current) if *current <= candidate => {}
        _ => *earliest = Some(candidate),
    }
}
