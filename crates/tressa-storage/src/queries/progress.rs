// SPDX-FileCopyrightText: 2026 Tressa Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Progress Ledger reads and atomic increments.
//!
//! Increments are a single upsert statement: the row is created on first
//! credit and otherwise advanced in place, and the post-increment values
//! come back through `RETURNING`. There is no read-then-write window.
//!
//! Deltas are in thousandths of a unit. The sub-unit remainder is kept in
//! `count_millis` / `amount_millis` and carried into the whole counters by
//! the same statement.

use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension, Row, params};
use tressa_core::TressaError;

use crate::database::{Database, map_tr_err};
use crate::models::{MILLIS_PER_UNIT, ProgressRow, timestamp_column, to_db_timestamp};

const PROGRESS_COLUMNS: &str = "user_id, track_name, current_count, count_millis, \
     current_amount, amount_millis, last_milestone_reached, updated_at";

fn row_to_progress(row: &Row<'_>) -> rusqlite::Result<ProgressRow> {
    Ok(ProgressRow {
        user_id: row.get(0)?,
        track_name: row.get(1)?,
        current_count: row.get(2)?,
        count_millis: row.get(3)?,
        current_amount: row.get(4)?,
        amount_millis: row.get(5)?,
        last_milestone_reached: row.get(6)?,
        updated_at: timestamp_column(row, 7)?,
    })
}

/// Record that `booking_id` has credited `track_id`.
///
/// Returns `false` when the pair was already recorded, in which case the
/// caller must not touch the ledger.
pub fn claim_credit(
    conn: &Connection,
    booking_id: &str,
    track_id: i64,
    user_id: &str,
    now: &DateTime<Utc>,
) -> rusqlite::Result<bool> {
    let inserted = conn.execute(
        "INSERT OR IGNORE INTO progress_credits (booking_id, track_id, user_id, credited_at)
         VALUES (?1, ?2, ?3, ?4)",
        params![booking_id, track_id, user_id, to_db_timestamp(now)],
    )?;
    Ok(inserted == 1)
}

/// Atomically add `count_millis` / `amount_millis` (thousandths of a visit
/// and of a minor unit, both non-negative) to a ledger entry, creating it
/// if absent. The caller keeps the totals within `i64` range.
pub fn increment(
    conn: &Connection,
    user_id: &str,
    track_name: &str,
    count_millis: i64,
    amount_millis: i64,
    now: &DateTime<Utc>,
) -> rusqlite::Result<ProgressRow> {
    let (count_whole, count_rest) = split_millis(count_millis);
    let (amount_whole, amount_rest) = split_millis(amount_millis);
    conn.query_row(
        &format!(
            "INSERT INTO user_track_progress
                (user_id, track_name, current_count, count_millis, current_amount, amount_millis,
                 last_milestone_reached, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, 0, ?7)
             ON CONFLICT (user_id, track_name) DO UPDATE SET
                current_count = current_count + excluded.current_count
                    + (count_millis + excluded.count_millis) / {MILLIS_PER_UNIT},
                count_millis = (count_millis + excluded.count_millis) % {MILLIS_PER_UNIT},
                current_amount = current_amount + excluded.current_amount
                    + (amount_millis + excluded.amount_millis) / {MILLIS_PER_UNIT},
                amount_millis = (amount_millis + excluded.amount_millis) % {MILLIS_PER_UNIT},
                updated_at = excluded.updated_at
             RETURNING {PROGRESS_COLUMNS}"
        ),
        params![
            user_id,
            track_name,
            count_whole,
            count_rest,
            amount_whole,
            amount_rest,
            to_db_timestamp(now)
        ],
        row_to_progress,
    )
}

fn split_millis(millis: i64) -> (i64, i64) {
    (millis.div_euclid(MILLIS_PER_UNIT), millis.rem_euclid(MILLIS_PER_UNIT))
}

/// Advance the milestone watermark. Never moves it backwards.
pub fn raise_watermark(
    conn: &Connection,
    user_id: &str,
    track_name: &str,
    reached: i64,
) -> rusqlite::Result<()> {
    conn.execute(
        "UPDATE user_track_progress SET last_milestone_reached = ?3
         WHERE user_id = ?1 AND track_name = ?2 AND last_milestone_reached < ?3",
        params![user_id, track_name, reached],
    )?;
    Ok(())
}

/// A single ledger entry.
pub fn entry(
    conn: &Connection,
    user_id: &str,
    track_name: &str,
) -> rusqlite::Result<Option<ProgressRow>> {
    conn.query_row(
        &format!(
            "SELECT {PROGRESS_COLUMNS} FROM user_track_progress
             WHERE user_id = ?1 AND track_name = ?2"
        ),
        params![user_id, track_name],
        row_to_progress,
    )
    .optional()
}

/// All ledger entries for a user, ordered by track name.
pub async fn get_progress(db: &Database, user_id: &str) -> Result<Vec<ProgressRow>, TressaError> {
    let user_id = user_id.to_string();
    db.connection()
        .call(move |conn| -> rusqlite::Result<Vec<ProgressRow>> {
            let mut stmt = conn.prepare(&format!(
                "SELECT {PROGRESS_COLUMNS} FROM user_track_progress
                 WHERE user_id = ?1 ORDER BY track_name"
            ))?;
            let rows = stmt.query_map(params![user_id], row_to_progress)?;
            rows.collect()
        })
        .await
        .map_err(map_tr_err)
}

/// One ledger entry, if the user has ever been credited on the track.
pub async fn get_progress_entry(
    db: &Database,
    user_id: &str,
    track_name: &str,
) -> Result<Option<ProgressRow>, TressaError> {
    let user_id = user_id.to_string();
    let track_name = track_name.to_string();
    db.connection()
        .call(move |conn| -> rusqlite::Result<Option<ProgressRow>> {
            entry(conn, &user_id, &track_name)
        })
        .await
        .map_err(map_tr_err)
}
