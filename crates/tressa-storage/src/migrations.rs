// SPDX-FileCopyrightText: 2026 Tressa Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Embedded database migrations using refinery.
//!
//! SQL migration files are compiled into the binary at build time via
//! `embed_migrations!`. Migrations run automatically on database open.

use tracing::info;
use tressa_core::TressaError;

mod embedded {
    use refinery::embed_migrations;
    embed_migrations!("migrations");
}

/// Run all pending migrations against the given connection.
///
/// Refinery tracks applied migrations in its own `refinery_schema_history` table.
pub fn run_migrations(conn: &mut rusqlite::Connection) -> Result<(), TressaError> {
    let report = embedded::migrations::runner()
        .run(conn)
        .map_err(|e| TressaError::Storage {
            source: Box::new(e),
        })?;
    for migration in report.applied_migrations() {
        info!(version = migration.version(), name = migration.name(), "migration applied");
    }
    Ok(())
}
