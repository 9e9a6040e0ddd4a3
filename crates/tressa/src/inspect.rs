// SPDX-FileCopyrightText: 2026 Tressa Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! One-shot commands: `sweep`, `migrate`, `progress` and `grants`.
//!
//! Each opens storage (applying migrations), does its work and closes it.
//! Inspection output is pretty-printed JSON on stdout.

use std::sync::Arc;

use serde::Serialize;
use tracing::info;
use tressa_config::TressaConfig;
use tressa_core::{GrantStatus, StorageAdapter, SystemClock, TressaError};
use tressa_rewards::{ExpirySweeper, RewardQueries};
use tressa_storage::SqliteStorage;

async fn open_storage(config: &TressaConfig) -> Result<SqliteStorage, TressaError> {
    let storage = SqliteStorage::new(config.storage.clone());
    storage.initialize().await?;
    Ok(storage)
}

fn print_json<T: Serialize>(value: &T) -> Result<(), TressaError> {
    let out = serde_json::to_string_pretty(value)
        .map_err(|e| TressaError::Internal(format!("failed to render output: {e}")))?;
    println!("{out}");
    Ok(())
}

pub async fn run_migrate(config: &TressaConfig) -> Result<(), TressaError> {
    let storage = open_storage(config).await?;
    storage.close().await?;
    info!(path = %config.storage.database_path, "migrations applied");
    println!("database at {} is up to date", config.storage.database_path);
    Ok(())
}

pub async fn run_sweep(config: &TressaConfig) -> Result<(), TressaError> {
    let storage = open_storage(config).await?;
    let sweeper = ExpirySweeper::new(storage.database()?.clone(), Arc::new(SystemClock));
    let report = sweeper.sweep_once().await;
    storage.close().await?;
    let report = report?;
    println!(
        "expired {} grant(s) and {} package(s)",
        report.grants_expired, report.packages_expired
    );
    Ok(())
}

pub async fn run_progress(config: &TressaConfig, user_id: &str) -> Result<(), TressaError> {
    let storage = open_storage(config).await?;
    let queries = RewardQueries::new(storage.database()?.clone(), Arc::new(SystemClock));
    let progress = queries.progress_for_user(user_id).await;
    storage.close().await?;
    print_json(&progress?)
}

/// Active grants by default; the full history when `all` is set.
pub async fn run_grants(
    config: &TressaConfig,
    user_id: &str,
    all: bool,
    status: Option<GrantStatus>,
) -> Result<(), TressaError> {
    let storage = open_storage(config).await?;
    let queries = RewardQueries::new(storage.database()?.clone(), Arc::new(SystemClock));
    let grants = if all {
        queries.grant_history(user_id, status).await
    } else {
        queries.active_grants(user_id).await
    };
    storage.close().await?;
    print_json(&grants?)
}
