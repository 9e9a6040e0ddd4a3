// SPDX-FileCopyrightText: 2026 Tressa Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `tressa serve`: open storage, run the expiry sweeper, stop on signal.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tressa_config::TressaConfig;
use tressa_core::{HealthStatus, StorageAdapter, SystemClock, TressaError};
use tressa_rewards::ExpirySweeper;
use tressa_rewards::recording;
use tressa_storage::SqliteStorage;

use crate::shutdown;

pub async fn run_serve(config: TressaConfig) -> Result<(), TressaError> {
    info!(service = %config.service.name, "starting tressa serve");
    let cancel = shutdown::install_signal_handler();
    serve_until(config, cancel).await
}

/// Everything `serve` does after signal handling is wired up.
pub(crate) async fn serve_until(
    config: TressaConfig,
    cancel: CancellationToken,
) -> Result<(), TressaError> {
    let storage = SqliteStorage::new(config.storage.clone());
    storage.initialize().await?;
    match storage.health_check().await? {
        HealthStatus::Healthy => info!(path = %config.storage.database_path, "storage ready"),
        HealthStatus::Degraded(reason) => warn!(%reason, "storage degraded at startup"),
        HealthStatus::Unhealthy(reason) => {
            return Err(TressaError::Storage {
                source: format!("storage unhealthy at startup: {reason}").into(),
            });
        }
    }

    recording::register_metrics();

    let sweeper_task = if config.sweeper.enabled {
        let sweeper = ExpirySweeper::new(storage.database()?.clone(), Arc::new(SystemClock));
        Some(tokio::spawn(sweeper.run(config.sweeper.clone(), cancel.clone())))
    } else {
        info!("expiry sweeper disabled");
        None
    };

    cancel.cancelled().await;

    if let Some(task) = sweeper_task
        && let Err(e) = task.await
    {
        warn!(error = %e, "sweeper task ended abnormally");
    }
    storage.close().await?;

    info!("tressa serve shutdown complete");
    Ok(())
}

/// Initializes the tracing subscriber with the given log level.
pub fn init_tracing(log_level: &str) {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("tressa={log_level},warn")));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_names(false)
        .init();
}
