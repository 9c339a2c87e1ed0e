//! Background drain loop: periodic timer with jitter, pulled forward
//! by queued work, scheduled retries, and connectivity edges.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use log::{debug, info, warn};
use tokio::time::Instant;

use super::coordinator::SyncCoordinator;
use super::model::NetworkState;

/// Baseline pause between periodic drains.
pub const SYNC_PERIODIC_INTERVAL_SECS: u64 = 45;
/// Upper bound of the jitter added to the baseline.
pub const SYNC_INTERVAL_JITTER_SECS: u64 = 5;
/// Consecutive disabled or unauthenticated cycles before the loop exits.
const MAX_CONSECUTIVE_IDLE_SKIPS: u32 = 5;

/// Spawn the background loop unless one is already running. Restarting
/// after desktop resume or re-login reuses the same slot.
pub async fn ensure_background_sync_started(coordinator: Arc<SyncCoordinator>) {
    let runtime = coordinator.runtime();
    let mut slot = runtime.background_task.lock().await;
    if let Some(handle) = slot.as_ref() {
        if !handle.is_finished() {
            debug!("[Sync] Background loop already running");
            return;
        }
    }
    info!("[Sync] Starting background sync loop");
    let task = tokio::spawn(run_background_loop(Arc::clone(&coordinator)));
    *slot = Some(task);
}

pub async fn stop_background_sync(coordinator: &SyncCoordinator) {
    let runtime = coordinator.runtime();
    let mut slot = runtime.background_task.lock().await;
    if let Some(handle) = slot.take() {
        handle.abort();
        info!("[Sync] Background sync loop stopped");
    }
}

async fn run_background_loop(coordinator: Arc<SyncCoordinator>) {
    let mut connectivity_rx = coordinator.connectivity().subscribe();
    let mut previous_state = *connectivity_rx.borrow();
    let mut consecutive_idle_skips: u32 = 0;

    loop {
        match coordinator.sync_pending_transactions().await {
            Ok(report) => {
                if is_idle_skip(&report.status) {
                    consecutive_idle_skips += 1;
                    if consecutive_idle_skips >= MAX_CONSECUTIVE_IDLE_SKIPS {
                        info!(
                            "[Sync] Background loop exiting after {} idle cycles",
                            consecutive_idle_skips
                        );
                        break;
                    }
                } else {
                    consecutive_idle_skips = 0;
                }
            }
            Err(e) => {
                warn!("[Sync] Background drain failed: {}", e);
                consecutive_idle_skips = 0;
            }
        }

        let delay_ms = next_delay_ms(&coordinator);
        let deadline = Instant::now() + Duration::from_millis(delay_ms);

        // Wait out the pause, folding in connectivity edges as they land.
        loop {
            tokio::select! {
                changed = connectivity_rx.changed() => {
                    if changed.is_err() {
                        info!("[Sync] Connectivity channel closed; stopping background loop");
                        return;
                    }
                    let state = *connectivity_rx.borrow_and_update();
                    let was_online = previous_state == NetworkState::Online;
                    previous_state = state;
                    if state == NetworkState::Online && !was_online {
                        debug!("[Sync] Connectivity restored; draining now");
                        break;
                    }
                }
                _ = tokio::time::sleep_until(deadline) => {
                    break;
                }
            }
        }
    }
}

/// Disabled and unauthenticated skips need user action to clear; the
/// other statuses resolve on their own.
fn is_idle_skip(status: &str) -> bool {
    status == "sync_disabled" || status == "auth_required"
}

fn next_delay_ms(coordinator: &SyncCoordinator) -> u64 {
    let jitter_ms =
        Utc::now().timestamp_millis().unsigned_abs() % (SYNC_INTERVAL_JITTER_SECS * 1000);
    let mut delay_ms = SYNC_PERIODIC_INTERVAL_SECS * 1000 + jitter_ms;

    let repository = coordinator.sync_repository();
    // Align the wake-up with the soonest scheduled retry.
    if let Ok(status) = repository.get_engine_status() {
        if let Some(next_retry_at) = status.next_retry_at.as_deref() {
            if let Some(until_ms) = millis_until_rfc3339(next_retry_at) {
                delay_ms = delay_ms.min(until_ms.max(1_000));
            }
        }
    }
    // A non-empty queue warrants a quick follow-up pass.
    match repository.count_queued_operations() {
        Ok(queued) if queued > 0 => delay_ms = delay_ms.min(2_000 + (jitter_ms % 500)),
        Ok(_) => {}
        Err(e) => debug!("[Sync] Could not inspect queue depth: {}", e),
    }
    delay_ms
}

fn millis_until_rfc3339(timestamp: &str) -> Option<u64> {
    let at = DateTime::parse_from_rfc3339(timestamp).ok()?;
    let millis = (at.with_timezone(&Utc) - Utc::now()).num_milliseconds();
    Some(millis.max(0) as u64)
}
