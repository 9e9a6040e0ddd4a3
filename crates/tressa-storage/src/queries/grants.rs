// SPDX-FileCopyrightText: 2026 Tressa Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Reward grant persistence and guarded status transitions.
//!
//! Every transition out of `active` is an `UPDATE ... WHERE status = 'active'`;
//! the affected row count tells the caller whether it won.

use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension, Row, params};
use tressa_core::{GrantStatus, TressaError};

use crate::database::{Database, map_tr_err};
use crate::models::{
    BookingDiscount, RewardGrant, enum_column, opt_timestamp_column, timestamp_column,
    to_db_timestamp,
};

const GRANT_COLUMNS: &str = "id, user_id, reward_type, reward_value, source_track, description,
                             status, expires_at, redeemed_booking_id, redeemed_at, created_at";

fn row_to_grant(row: &Row<'_>) -> rusqlite::Result<RewardGrant> {
    Ok(RewardGrant {
        id: row.get(0)?,
        user_id: row.get(1)?,
        reward_type: enum_column(row, 2)?,
        reward_value: row.get(3)?,
        source_track: row.get(4)?,
        description: row.get(5)?,
        status: enum_column(row, 6)?,
        expires_at: timestamp_column(row, 7)?,
        redeemed_booking_id: row.get(8)?,
        redeemed_at: opt_timestamp_column(row, 9)?,
        created_at: timestamp_column(row, 10)?,
    })
}

/// Insert a grant row.
pub fn insert(conn: &Connection, grant: &RewardGrant) -> rusqlite::Result<()> {
    conn.execute(
        "INSERT INTO user_rewards
            (id, user_id, reward_type, reward_value, source_track, description, status,
             expires_at, redeemed_booking_id, redeemed_at, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
        params![
            grant.id,
            grant.user_id,
            grant.reward_type.to_string(),
            grant.reward_value,
            grant.source_track,
            grant.description,
            grant.status.to_string(),
            to_db_timestamp(&grant.expires_at),
            grant.redeemed_booking_id,
            grant.redeemed_at.as_ref().map(to_db_timestamp),
            to_db_timestamp(&grant.created_at),
        ],
    )?;
    Ok(())
}

/// Look up a grant inside an open connection or transaction.
pub fn by_id(conn: &Connection, id: &str) -> rusqlite::Result<Option<RewardGrant>> {
    conn.query_row(
        &format!("SELECT {GRANT_COLUMNS} FROM user_rewards WHERE id = ?1"),
        params![id],
        row_to_grant,
    )
    .optional()
}

/// Move an active grant to `redeemed` against `booking_id`.
///
/// Returns the number of rows changed: 0 means the grant was not active
/// or had already passed its expiry at `now`.
pub fn mark_redeemed(
    conn: &Connection,
    id: &str,
    booking_id: &str,
    now: &DateTime<Utc>,
) -> rusqlite::Result<usize> {
    let now = to_db_timestamp(now);
    conn.execute(
        "UPDATE user_rewards SET status = 'redeemed', redeemed_booking_id = ?2, redeemed_at = ?3
         WHERE id = ?1 AND status = 'active' AND expires_at >= ?3",
        params![id, booking_id, now],
    )
}

/// Move an active grant to a terminal status other than `redeemed`.
pub fn close_active(conn: &Connection, id: &str, to: GrantStatus) -> rusqlite::Result<usize> {
    debug_assert!(matches!(to, GrantStatus::Expired | GrantStatus::Revoked));
    conn.execute(
        "UPDATE user_rewards SET status = ?2 WHERE id = ?1 AND status = 'active'",
        params![id, to.to_string()],
    )
}

/// Expire every active grant whose expiry is strictly before `now`.
///
/// Returns `(id, source_track)` for each grant flipped.
pub fn expire_overdue(
    conn: &Connection,
    now: &DateTime<Utc>,
) -> rusqlite::Result<Vec<(String, String)>> {
    let mut stmt = conn.prepare(
        "UPDATE user_rewards SET status = 'expired'
         WHERE status = 'active' AND expires_at < ?1
         RETURNING id, source_track",
    )?;
    let rows = stmt.query_map(params![to_db_timestamp(now)], |row| {
        Ok((row.get(0)?, row.get(1)?))
    })?;
    rows.collect()
}

/// The discount already applied to a booking, if any.
pub fn discount_for_booking(
    conn: &Connection,
    booking_id: &str,
) -> rusqlite::Result<Option<BookingDiscount>> {
    conn.query_row(
        "SELECT booking_id, grant_id, discount_amount, applied_at
         FROM booking_reward_discounts WHERE booking_id = ?1",
        params![booking_id],
        |row| {
            Ok(BookingDiscount {
                booking_id: row.get(0)?,
                grant_id: row.get(1)?,
                discount_amount: row.get(2)?,
                applied_at: timestamp_column(row, 3)?,
            })
        },
    )
    .optional()
}

/// Record the discount a redemption applied to a booking.
pub fn insert_discount(conn: &Connection, discount: &BookingDiscount) -> rusqlite::Result<()> {
    conn.execute(
        "INSERT INTO booking_reward_discounts (booking_id, grant_id, discount_amount, applied_at)
         VALUES (?1, ?2, ?3, ?4)",
        params![
            discount.booking_id,
            discount.grant_id,
            discount.discount_amount,
            to_db_timestamp(&discount.applied_at),
        ],
    )?;
    Ok(())
}

/// Persist a standalone grant (manual issuance).
pub async fn insert_grant(db: &Database, grant: &RewardGrant) -> Result<(), TressaError> {
    let grant = grant.clone();
    db.write(move |conn| insert(conn, &grant)).await
}

/// Get a grant by id.
pub async fn get_grant(db: &Database, id: &str) -> Result<Option<RewardGrant>, TressaError> {
    let id = id.to_string();
    db.connection()
        .call(move |conn| -> rusqlite::Result<Option<RewardGrant>> { by_id(conn, &id) })
        .await
        .map_err(map_tr_err)
}

/// Grants that are active and not yet past expiry at `now`, soonest expiry first.
pub async fn active_for_user(
    db: &Database,
    user_id: &str,
    now: DateTime<Utc>,
) -> Result<Vec<RewardGrant>, TressaError> {
    let user_id = user_id.to_string();
    let now = to_db_timestamp(&now);
    db.connection()
        .call(move |conn| -> rusqlite::Result<Vec<RewardGrant>> {
            let mut stmt = conn.prepare(&format!(
                "SELECT {GRANT_COLUMNS} FROM user_rewards
                 WHERE user_id = ?1 AND status = 'active' AND expires_at >= ?2
                 ORDER BY expires_at ASC, created_at ASC"
            ))?;
            let rows = stmt.query_map(params![user_id, now], row_to_grant)?;
            rows.collect()
        })
        .await
        .map_err(map_tr_err)
}

/// Every grant a user has ever received, newest first, optionally filtered by status.
pub async fn history_for_user(
    db: &Database,
    user_id: &str,
    status: Option<GrantStatus>,
) -> Result<Vec<RewardGrant>, TressaError> {
    let user_id = user_id.to_string();
    db.connection()
        .call(move |conn| -> rusqlite::Result<Vec<RewardGrant>> {
            let mut stmt = conn.prepare(&format!(
                "SELECT {GRANT_COLUMNS} FROM user_rewards
                 WHERE user_id = ?1 AND (?2 IS NULL OR status = ?2)
                 ORDER BY created_at DESC, id"
            ))?;
            let rows = stmt.query_map(
                params![user_id, status.map(|s| s.to_string())],
                row_to_grant,
            )?;
            rows.collect()
        })
        .await
        .map_err(map_tr_err)
}

/// The discount recorded against a booking.
pub async fn get_booking_discount(
    db: &Database,
    booking_id: &str,
) -> Result<Option<BookingDiscount>, TressaError> {
    let booking_id = booking_id.to_string();
    db.connection()
        .call(move |conn| -> rusqlite::Result<Option<BookingDiscount>> {
            discount_for_booking(conn, &booking_id)
        })
        .await
        .map_err(map_tr_err)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use tressa_core::RewardType;

    fn grant(user: &str, created: DateTime<Utc>, ttl_days: i64) -> RewardGrant {
        RewardGrant::new_active(
            user,
            RewardType::PercentageDiscount,
            10.0,
            "visits",
            "10% off",
            created,
            created + Duration::days(ttl_days),
        )
    }

    #[tokio::test]
    async fn insert_and_fetch_round_trip_preserves_fields() {
        let db = Database::open_in_memory().await.unwrap();
        let g = grant("u1", Utc::now(), 30);
        insert_grant(&db, &g).await.unwrap();
        let stored = get_grant(&db, &g.id).await.unwrap().unwrap();
        assert_eq!(stored.id, g.id);
        assert_eq!(stored.status, GrantStatus::Active);
        assert_eq!(stored.reward_type, RewardType::PercentageDiscount);
        assert_eq!(to_db_timestamp(&stored.expires_at), to_db_timestamp(&g.expires_at));
    }

    #[tokio::test]
    async fn redeem_is_guarded_by_status_and_expiry() {
        let db = Database::open_in_memory().await.unwrap();
        let now = Utc::now();
        let fresh = grant("u1", now, 30);
        let stale = grant("u1", now - Duration::days(60), 30);
        insert_grant(&db, &fresh).await.unwrap();
        insert_grant(&db, &stale).await.unwrap();

        let (fresh_id, stale_id) = (fresh.id.clone(), stale.id.clone());
        let changed = db
            .write(move |conn| -> rusqlite::Result<(usize, usize, usize)> {
                Ok((
                    mark_redeemed(conn, &fresh_id, "b1", &now)?,
                    mark_redeemed(conn, &fresh_id, "b2", &now)?,
                    mark_redeemed(conn, &stale_id, "b3", &now)?,
                ))
            })
            .await
            .unwrap();
        assert_eq!(changed, (1, 0, 0));

        let stored = get_grant(&db, &fresh.id).await.unwrap().unwrap();
        assert_eq!(stored.status, GrantStatus::Redeemed);
        assert_eq!(stored.redeemed_booking_id.as_deref(), Some("b1"));
    }

    #[tokio::test]
    async fn expire_overdue_only_touches_active_past_expiry() {
        let db = Database::open_in_memory().await.unwrap();
        let now = Utc::now();
        let overdue = grant("u1", now - Duration::days(40), 30);
        let current = grant("u1", now, 30);
        let revoked = grant("u1", now - Duration::days(40), 30);
        for g in [&overdue, &current, &revoked] {
            insert_grant(&db, g).await.unwrap();
        }
        let revoked_id = revoked.id.clone();
        db.write(move |conn| close_active(conn, &revoked_id, GrantStatus::Revoked))
            .await
            .unwrap();

        let flipped = db.write(move |conn| expire_overdue(conn, &now)).await.unwrap();
        assert_eq!(flipped, vec![(overdue.id.clone(), "visits".to_string())]);

        let again = db.write(move |conn| expire_overdue(conn, &now)).await.unwrap();
        assert!(again.is_empty());

        let revoked = get_grant(&db, &revoked.id).await.unwrap().unwrap();
        assert_eq!(revoked.status, GrantStatus::Revoked);
    }

    #[tokio::test]
    async fn listings_order_and_filter() {
        let db = Database::open_in_memory().await.unwrap();
        let now = Utc::now();
        let older = grant("u1", now - Duration::days(2), 10);
        let newer = grant("u1", now - Duration::days(1), 5);
        insert_grant(&db, &older).await.unwrap();
        insert_grant(&db, &newer).await.unwrap();

        let active = active_for_user(&db, "u1", now).await.unwrap();
        assert_eq!(active[0].id, newer.id, "soonest expiry first");

        let history = history_for_user(&db, "u1", None).await.unwrap();
        assert_eq!(history[0].id, newer.id, "newest first");

        let redeemed = history_for_user(&db, "u1", Some(GrantStatus::Redeemed))
            .await
            .unwrap();
        assert!(redeemed.is_empty());
    }
}
