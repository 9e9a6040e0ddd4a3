// SPDX-FileCopyrightText: 2026 Tressa Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Referral pairs and the one-shot reward flag.

use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension, Row, params};
use tressa_core::TressaError;

use crate::database::{Database, map_tr_err};
use crate::models::{ReferralRecord, timestamp_column, to_db_timestamp};

const REFERRAL_COLUMNS: &str =
    "id, referrer_id, referee_id, first_booking_value, reward_issued, reward_grant_id, created_at";

fn row_to_referral(row: &Row<'_>) -> rusqlite::Result<ReferralRecord> {
    Ok(ReferralRecord {
        id: row.get(0)?,
        referrer_id: row.get(1)?,
        referee_id: row.get(2)?,
        first_booking_value: row.get(3)?,
        reward_issued: row.get(4)?,
        reward_grant_id: row.get(5)?,
        created_at: timestamp_column(row, 6)?,
    })
}

/// Flip `reward_issued` for the referee's pending referral.
///
/// Returns the referrer when this call won the flip, `None` when there is
/// no referral or it was already rewarded.
pub fn claim_reward(
    conn: &Connection,
    referee_id: &str,
    booking_value: i64,
) -> rusqlite::Result<Option<String>> {
    conn.query_row(
        "UPDATE referrals SET reward_issued = 1, first_booking_value = ?2
         WHERE referee_id = ?1 AND reward_issued = 0
         RETURNING referrer_id",
        params![referee_id, booking_value],
        |row| row.get(0),
    )
    .optional()
}

/// Attach the issued grant to the referral row.
pub fn attach_grant(conn: &Connection, referee_id: &str, grant_id: &str) -> rusqlite::Result<()> {
    conn.execute(
        "UPDATE referrals SET reward_grant_id = ?2 WHERE referee_id = ?1",
        params![referee_id, grant_id],
    )?;
    Ok(())
}

/// Whether the referee has a referral that has not been rewarded yet.
pub fn has_pending(conn: &Connection, referee_id: &str) -> rusqlite::Result<bool> {
    conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM referrals WHERE referee_id = ?1 AND reward_issued = 0)",
        params![referee_id],
        |row| row.get(0),
    )
}

/// Record that `referrer_id` referred `referee_id`.
///
/// Self-referral and a second referrer for the same referee are `InvalidConfig`.
pub async fn insert_referral(
    db: &Database,
    referrer_id: &str,
    referee_id: &str,
    now: DateTime<Utc>,
) -> Result<ReferralRecord, TressaError> {
    if referrer_id == referee_id {
        return Err(TressaError::InvalidConfig(
            "a user cannot refer themselves".to_string(),
        ));
    }
    let referrer = referrer_id.to_string();
    let referee = referee_id.to_string();
    let ts = to_db_timestamp(&now);
    let inserted = db
        .write(move |conn| -> rusqlite::Result<Option<ReferralRecord>> {
            conn.query_row(
                &format!(
                    "INSERT INTO referrals (referrer_id, referee_id, created_at)
                     VALUES (?1, ?2, ?3)
                     ON CONFLICT (referee_id) DO NOTHING
                     RETURNING {REFERRAL_COLUMNS}"
                ),
                params![referrer, referee, ts],
                row_to_referral,
            )
            .optional()
        })
        .await?;
    inserted.ok_or_else(|| {
        TressaError::InvalidConfig(format!("user `{referee_id}` already has a referrer"))
    })
}

/// The referral for a referee, if any.
pub async fn get_by_referee(
    db: &Database,
    referee_id: &str,
) -> Result<Option<ReferralRecord>, TressaError> {
    let referee = referee_id.to_string();
    db.connection()
        .call(move |conn| -> rusqlite::Result<Option<ReferralRecord>> {
            conn.query_row(
                &format!("SELECT {REFERRAL_COLUMNS} FROM referrals WHERE referee_id = ?1"),
                params![referee],
                row_to_referral,
            )
            .optional()
        })
        .await
        .map_err(map_tr_err)
}

/// Every referral made by a referrer, oldest first.
pub async fn list_by_referrer(
    db: &Database,
    referrer_id: &str,
) -> Result<Vec<ReferralRecord>, TressaError> {
    let referrer = referrer_id.to_string();
    db.connection()
        .call(move |conn| -> rusqlite::Result<Vec<ReferralRecord>> {
            let mut stmt = conn.prepare(&format!(
                "SELECT {REFERRAL_COLUMNS} FROM referrals WHERE referrer_id = ?1 ORDER BY id"
            ))?;
            let rows = stmt.query_map(params![referrer], row_to_referral)?;
            rows.collect()
        })
        .await
        .map_err(map_tr_err)
}
