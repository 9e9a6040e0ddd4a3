// SPDX-FileCopyrightText: 2026 Tressa Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Database connection management with PRAGMA setup, WAL mode, and lifecycle.
//!
//! All writes are serialized through tokio-rusqlite's single background thread.
//! Do NOT create additional Connection instances for writes.

use std::path::Path;
use std::time::Duration;

use rusqlite::{ErrorCode, Transaction, TransactionBehavior};
use tracing::{debug, warn};
use tressa_config::model::StorageConfig;
use tressa_core::TressaError;

use crate::migrations;

/// Convert a tokio-rusqlite error into a `TressaError`.
///
/// Busy/locked failures become `Transient`; everything else is `Storage`.
pub fn map_tr_err(e: tokio_rusqlite::Error<rusqlite::Error>) -> TressaError {
    if let tokio_rusqlite::Error::Error(rusqlite::Error::SqliteFailure(failure, _)) = &e
        && matches!(
            failure.code,
            ErrorCode::DatabaseBusy | ErrorCode::DatabaseLocked
        )
    {
        return TressaError::Transient(e.to_string());
    }
    TressaError::Storage {
        source: Box::new(e),
    }
}

/// Begin a write transaction that takes the write lock up front.
///
/// A deferred transaction would read first and upgrade later, which is the
/// read-then-write split every ledger and grant transition must avoid.
pub fn begin_write(conn: &mut rusqlite::Connection) -> rusqlite::Result<Transaction<'_>> {
    conn.transaction_with_behavior(TransactionBehavior::Immediate)
}

/// Handle to the rewards database.
///
/// Cloning is cheap: clones share the same background connection thread.
#[derive(Clone)]
pub struct Database {
    conn: tokio_rusqlite::Connection,
}

impl Database {
    /// Open (or create) the database at `path` with default storage settings.
    pub async fn open(path: &str) -> Result<Self, TressaError> {
        let config = StorageConfig {
            database_path: path.to_string(),
            ..StorageConfig::default()
        };
        Self::open_with(&config).await
    }

    /// Open (or create) the database described by `config` and apply migrations.
    pub async fn open_with(config: &StorageConfig) -> Result<Self, TressaError> {
        let path = config.database_path.clone();
        if let Some(parent) = Path::new(&path).parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent).map_err(|e| TressaError::Storage {
                source: Box::new(e),
            })?;
        }

        let conn = tokio_rusqlite::Connection::open(&path)
            .await
            .map_err(|e| TressaError::Storage {
                source: Box::new(e),
            })?;
        let db = Self { conn };
        db.prepare(config.wal_mode, config.busy_timeout_ms).await?;
        debug!(path = %path, wal = config.wal_mode, "database opened");
        Ok(db)
    }

    /// Open a private in-memory database. Used by tests and dry runs.
    pub async fn open_in_memory() -> Result<Self, TressaError> {
        let conn = tokio_rusqlite::Connection::open_in_memory()
            .await
            .map_err(|e| TressaError::Storage {
                source: Box::new(e),
            })?;
        let db = Self { conn };
        db.prepare(false, 0).await?;
        Ok(db)
    }

    async fn prepare(&self, wal_mode: bool, busy_timeout_ms: u64) -> Result<(), TressaError> {
        self.conn
            .call(move |conn| -> Result<(), rusqlite::Error> {
                conn.busy_timeout(Duration::from_millis(busy_timeout_ms))?;
                conn.pragma_update(None, "foreign_keys", "ON")?;
                if wal_mode {
                    let mode: String = conn.pragma_update_and_check(
                        None,
                        "journal_mode",
                        "WAL",
                        |row| row.get(0),
                    )?;
                    debug!(mode = %mode, "journal mode set");
                }
                Ok(())
            })
            .await
            .map_err(map_tr_err)?;

        self.conn
            .call(|conn| migrations::run_migrations(conn))
            .await
            .map_err(|e| match e {
                tokio_rusqlite::Error::Error(inner) => inner,
                other => TressaError::Storage {
                    source: other.to_string().into(),
                },
            })
    }

    /// The underlying connection, for single-statement queries.
    pub fn connection(&self) -> &tokio_rusqlite::Connection {
        &self.conn
    }

    /// Run a write closure on the writer thread, retrying once on contention.
    ///
    /// The closure must be re-runnable: a failed first attempt has rolled
    /// back (its transaction was dropped uncommitted), so the second attempt
    /// starts from the same state.
    pub async fn write<F, R>(&self, op: F) -> Result<R, TressaError>
    where
        F: Fn(&mut rusqlite::Connection) -> Result<R, rusqlite::Error> + Clone + Send + 'static,
        R: Send + 'static,
    {
        match self.conn.call(op.clone()).await.map_err(map_tr_err) {
            Err(err) if err.is_transient() => {
                warn!(error = %err, "storage contention, retrying once");
                self.conn.call(op).await.map_err(map_tr_err)
            }
            other => other,
        }
    }

    /// Checkpoint the WAL. The connection thread exits once every clone is dropped.
    pub async fn close(&self) -> Result<(), TressaError> {
        self.conn
            .call(|conn| -> Result<(), rusqlite::Error> {
                conn.execute_batch("PRAGMA wal_checkpoint(TRUNCATE);")?;
                Ok(())
            })
            .await
            .map_err(map_tr_err)?;
        debug!("WAL checkpoint complete");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::tempdir;

    #[tokio::test]
    async fn open_creates_file_and_schema() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("rewards.db");
        let db = Database::open(path.to_str().unwrap()).await.unwrap();
        assert!(path.exists());

        let tables: i64 = db
            .connection()
            .call(|conn| -> Result<i64, rusqlite::Error> {
                conn.query_row(
                    "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name IN
                     ('track_definitions', 'service_track_mappings', 'category_track_mappings',
                      'user_track_progress', 'user_rewards', 'referrals', 'user_packages')",
                    [],
                    |row| row.get(0),
                )
            })
            .await
            .unwrap();
        assert_eq!(tables, 7);
        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn reopen_does_not_reapply_migrations() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("reopen.db");
        let path = path.to_str().unwrap();
        Database::open(path).await.unwrap().close().await.unwrap();
        let db = Database::open(path).await.unwrap();
        let rows: i64 = db
            .connection()
            .call(|conn| -> Result<i64, rusqlite::Error> {
                conn.query_row("SELECT COUNT(*) FROM programme_settings", [], |row| {
                    row.get(0)
                })
            })
            .await
            .unwrap();
        assert_eq!(rows, 1);
    }

    #[tokio::test]
    async fn write_retries_transient_failure_once() {
        let db = Database::open_in_memory().await.unwrap();
        let attempts = Arc::new(AtomicUsize::new(0));
        let counter = attempts.clone();

        let value = db
            .write(move |_conn| {
                if counter.fetch_add(1, Ordering::SeqCst) == 0 {
                    Err(rusqlite::Error::SqliteFailure(
                        rusqlite::ffi::Error::new(rusqlite::ffi::SQLITE_BUSY),
                        None,
                    ))
                } else {
                    Ok(7)
                }
            })
            .await
            .unwrap();

        assert_eq!(value, 7);
        assert_eq!(attempts.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn write_surfaces_transient_after_second_failure() {
        let db = Database::open_in_memory().await.unwrap();
        let attempts = Arc::new(AtomicUsize::new(0));
        let counter = attempts.clone();

        let err = db
            .write(move |_conn| -> Result<(), rusqlite::Error> {
                counter.fetch_add(1, Ordering::SeqCst);
                Err(rusqlite::Error::SqliteFailure(
                    rusqlite::ffi::Error::new(rusqlite::ffi::SQLITE_LOCKED),
                    None,
                ))
            })
            .await
            .unwrap_err();

        assert!(err.is_transient());
        assert_eq!(attempts.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn write_does_not_retry_other_errors() {
        let db = Database::open_in_memory().await.unwrap();
        let attempts = Arc::new(AtomicUsize::new(0));
        let counter = attempts.clone();

        let err = db
            .write(move |conn| -> Result<(), rusqlite::Error> {
                counter.fetch_add(1, Ordering::SeqCst);
                conn.execute("INSERT INTO no_such_table VALUES (1)", [])?;
                Ok(())
            })
            .await
            .unwrap_err();

        assert!(matches!(err, TressaError::Storage { .. }));
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }
}
