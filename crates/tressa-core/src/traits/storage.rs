// SPDX-FileCopyrightText: 2026 Tressa Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Storage adapter trait for persistence backends (SQLite, etc.).

use async_trait::async_trait;

use crate::error::TressaError;
use crate::types::HealthStatus;

/// Lifecycle of a storage backend.
///
/// The reward services never see this trait; they talk to the concrete
/// database handle. The binary uses it to open, probe, and close storage.
#[async_trait]
pub trait StorageAdapter: Send + Sync + 'static {
    /// Human-readable backend name.
    fn name(&self) -> &str;

    /// Opens the backend and applies pending migrations.
    async fn initialize(&self) -> Result<(), TressaError>;

    /// Probes the backend.
    async fn health_check(&self) -> Result<HealthStatus, TressaError>;

    /// Flushes pending writes and releases the backend.
    async fn close(&self) -> Result<(), TressaError>;
}
