// SPDX-FileCopyrightText: 2026 Tressa Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Prepaid session packages.

use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension, Row, params};
use tressa_core::TressaError;

use crate::database::{Database, map_tr_err};
use crate::models::{UserPackage, enum_column, timestamp_column, to_db_timestamp};

const PACKAGE_COLUMNS: &str = "id, user_id, name, total_sessions, sessions_used, valid_until,
                               status, created_at, updated_at";

fn row_to_package(row: &Row<'_>) -> rusqlite::Result<UserPackage> {
    Ok(UserPackage {
        id: row.get(0)?,
        user_id: row.get(1)?,
        name: row.get(2)?,
        total_sessions: row.get(3)?,
        sessions_used: row.get(4)?,
        valid_until: timestamp_column(row, 5)?,
        status: enum_column(row, 6)?,
        created_at: timestamp_column(row, 7)?,
        updated_at: timestamp_column(row, 8)?,
    })
}

/// Look up a package inside an open connection or transaction.
pub fn by_id(conn: &Connection, id: &str) -> rusqlite::Result<Option<UserPackage>> {
    conn.query_row(
        &format!("SELECT {PACKAGE_COLUMNS} FROM user_packages WHERE id = ?1"),
        params![id],
        row_to_package,
    )
    .optional()
}

/// Use one session of an active, unexpired package owned by `user_id`.
///
/// The last session flips the package to `exhausted` in the same statement.
/// Returns `None` when the guard did not match.
pub fn consume_one(
    conn: &Connection,
    id: &str,
    user_id: &str,
    now: &DateTime<Utc>,
) -> rusqlite::Result<Option<UserPackage>> {
    conn.query_row(
        &format!(
            "UPDATE user_packages SET
                sessions_used = sessions_used + 1,
                status = CASE WHEN sessions_used + 1 >= total_sessions
                              THEN 'exhausted' ELSE 'active' END,
                updated_at = ?3
             WHERE id = ?1 AND user_id = ?2 AND status = 'active'
               AND sessions_used < total_sessions AND valid_until >= ?3
             RETURNING {PACKAGE_COLUMNS}"
        ),
        params![id, user_id, to_db_timestamp(now)],
        row_to_package,
    )
    .optional()
}

/// Expire one active package whose validity ended before `now`.
pub fn expire_if_overdue(conn: &Connection, id: &str, now: &DateTime<Utc>) -> rusqlite::Result<usize> {
    let now = to_db_timestamp(now);
    conn.execute(
        "UPDATE user_packages SET status = 'expired', updated_at = ?2
         WHERE id = ?1 AND status = 'active' AND valid_until < ?2",
        params![id, now],
    )
}

/// Expire every active package whose validity ended before `now`. Returns the ids.
pub fn expire_overdue(conn: &Connection, now: &DateTime<Utc>) -> rusqlite::Result<Vec<String>> {
    let mut stmt = conn.prepare(
        "UPDATE user_packages SET status = 'expired', updated_at = ?1
         WHERE status = 'active' AND valid_until < ?1
         RETURNING id",
    )?;
    let rows = stmt.query_map(params![to_db_timestamp(now)], |row| row.get(0))?;
    rows.collect()
}

/// Persist a new package.
pub async fn insert_package(db: &Database, package: &UserPackage) -> Result<(), TressaError> {
    let package = package.clone();
    db.write(move |conn| -> rusqlite::Result<()> {
        conn.execute(
            "INSERT INTO user_packages
                (id, user_id, name, total_sessions, sessions_used, valid_until, status,
                 created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                package.id,
                package.user_id,
                package.name,
                package.total_sessions,
                package.sessions_used,
                to_db_timestamp(&package.valid_until),
                package.status.to_string(),
                to_db_timestamp(&package.created_at),
                to_db_timestamp(&package.updated_at),
            ],
        )?;
        Ok(())
    })
    .await
}

/// Get a package by id.
pub async fn get_package(db: &Database, id: &str) -> Result<Option<UserPackage>, TressaError> {
    let id = id.to_string();
    db.connection()
        .call(move |conn| -> rusqlite::Result<Option<UserPackage>> { by_id(conn, &id) })
        .await
        .map_err(map_tr_err)
}

/// A user's packages, newest first.
pub async fn list_for_user(db: &Database, user_id: &str) -> Result<Vec<UserPackage>, TressaError> {
    let user_id = user_id.to_string();
    db.connection()
        .call(move |conn| -> rusqlite::Result<Vec<UserPackage>> {
            let mut stmt = conn.prepare(&format!(
                "SELECT {PACKAGE_COLUMNS} FROM user_packages
                 WHERE user_id = ?1 ORDER BY created_at DESC, id"
            ))?;
            let rows = stmt.query_map(params![user_id], row_to_package)?;
            rows.collect()
        })
        .await
        .map_err(map_tr_err)
}
