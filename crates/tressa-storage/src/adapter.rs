// SPDX-FileCopyrightText: 2026 Tressa Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! [`StorageAdapter`] over the rewards database.

use async_trait::async_trait;
use rusqlite::OptionalExtension;
use tokio::sync::OnceCell;
use tracing::{debug, info};

use tressa_config::model::StorageConfig;
use tressa_core::{HealthStatus, StorageAdapter, TressaError};

use crate::database::{Database, map_tr_err};

/// Owns the rewards database for the lifetime of the process.
///
/// [`StorageAdapter::initialize`] opens the file and applies migrations;
/// [`SqliteStorage::database`] then hands out clones of the shared handle.
pub struct SqliteStorage {
    config: StorageConfig,
    db: OnceCell<Database>,
}

impl SqliteStorage {
    pub fn new(config: StorageConfig) -> Self {
        Self {
            config,
            db: OnceCell::new(),
        }
    }

    /// The opened database.
    pub fn database(&self) -> Result<&Database, TressaError> {
        self.db.get().ok_or_else(|| TressaError::Storage {
            source: format!("rewards database at {} is not open", self.config.database_path).into(),
        })
    }
}

#[async_trait]
impl StorageAdapter for SqliteStorage {
    fn name(&self) -> &str {
        "sqlite"
    }

    async fn initialize(&self) -> Result<(), TressaError> {
        if self.db.initialized() {
            return Err(TressaError::Storage {
                source: "rewards database is already open".into(),
            });
        }
        let db = Database::open_with(&self.config).await?;
        self.db.set(db).map_err(|_| TressaError::Storage {
            source: "rewards database is already open".into(),
        })?;
        info!(path = %self.config.database_path, "rewards database ready");
        Ok(())
    }

    /// Healthy when the database answers and the programme settings row,
    /// which every issuance reads, is present.
    async fn health_check(&self) -> Result<HealthStatus, TressaError> {
        let settings_row = self
            .database()?
            .connection()
            .call(|conn| -> Result<Option<i64>, rusqlite::Error> {
                conn.query_row("SELECT id FROM programme_settings WHERE id = 1", [], |row| {
                    row.get(0)
                })
                .optional()
            })
            .await
            .map_err(map_tr_err)?;

        let status = match settings_row {
            Some(_) => HealthStatus::Healthy,
            None => HealthStatus::Degraded("programme settings row is missing".to_string()),
        };
        debug!(?status, "storage health checked");
        Ok(status)
    }

    async fn close(&self) -> Result<(), TressaError> {
        match self.db.get() {
            Some(db) => db.close().await,
            None => Ok(()),
        }
    }
}
