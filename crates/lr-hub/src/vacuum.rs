//! Background vacuum.
//!
//! The vacuum flag is claimed before the task is spawned, so callers see
//! `vacuumInProgress = true` as soon as `start` returns. The guard moves into
//! the task and is released when the task finishes, however it finishes.

use std::sync::Arc;
use std::time::Duration;

use lr_core::MaintenanceMode;
use lr_store::{LogStore, StoreError, VacuumReport};
use tokio::task::JoinHandle;

pub fn start(
    store: Arc<LogStore>,
    mode: &Arc<MaintenanceMode>,
    retention: Option<Duration>,
) -> lr_core::Result<JoinHandle<lr_store::Result<VacuumReport>>> {
    let guard = mode.try_begin_vacuum()?;
    tracing::info!(?retention, "Vacuum started");

    Ok(tokio::spawn(async move {
        let _guard = guard;
        let outcome = tokio::task::spawn_blocking(move || store.vacuum(retention))
            .await
            .unwrap_or_else(|e| Err(StoreError::Vacuum(format!("vacuum task aborted: {}", e))));

        match &outcome {
            Ok(report) => tracing::info!(
                expired_logs = report.expired_logs,
                pruned_resources = report.pruned_resources,
                elapsed_ms = report.elapsed.as_millis() as u64,
                "Vacuum finished"
            ),
            Err(e) => tracing::error!("Vacuum failed: {}", e),
        }
        outcome
    }))
}
