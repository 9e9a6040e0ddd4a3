// SPDX-FileCopyrightText: 2026 Tressa Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Programme settings (single row).

use chrono::{DateTime, Utc};
use rusqlite::{Connection, params};
use tressa_core::TressaError;

use crate::database::{Database, map_tr_err};
use crate::models::{ProgrammeSettings, enum_column, to_db_timestamp};

/// Read the settings row inside an open connection or transaction.
pub fn read(conn: &Connection) -> rusqlite::Result<ProgrammeSettings> {
    conn.query_row(
        "SELECT rewards_enabled, spend_tracking_enabled, legacy_spend_track,
                referral_enabled, referral_min_booking_value, referral_reward_type,
                referral_reward_value, referral_reward_expiry_days
         FROM programme_settings WHERE id = 1",
        [],
        |row| {
            Ok(ProgrammeSettings {
                rewards_enabled: row.get(0)?,
                spend_tracking_enabled: row.get(1)?,
                legacy_spend_track: row.get(2)?,
                referral_enabled: row.get(3)?,
                referral_min_booking_value: row.get(4)?,
                referral_reward_type: enum_column(row, 5)?,
                referral_reward_value: row.get(6)?,
                referral_reward_expiry_days: row.get(7)?,
            })
        },
    )
}

/// Current programme settings.
pub async fn get_settings(db: &Database) -> Result<ProgrammeSettings, TressaError> {
    db.connection()
        .call(|conn| -> rusqlite::Result<ProgrammeSettings> { read(conn) })
        .await
        .map_err(map_tr_err)
}

/// Replace the programme settings.
pub async fn update_settings(
    db: &Database,
    settings: &ProgrammeSettings,
    now: DateTime<Utc>,
) -> Result<(), TressaError> {
    let settings = settings.clone();
    let updated_at = to_db_timestamp(&now);
    db.write(move |conn| -> rusqlite::Result<()> {
        conn.execute(
            "UPDATE programme_settings SET
                rewards_enabled = ?1, spend_tracking_enabled = ?2, legacy_spend_track = ?3,
                referral_enabled = ?4, referral_min_booking_value = ?5,
                referral_reward_type = ?6, referral_reward_value = ?7,
                referral_reward_expiry_days = ?8, updated_at = ?9
             WHERE id = 1",
            params![
                settings.rewards_enabled,
                settings.spend_tracking_enabled,
                settings.legacy_spend_track,
                settings.referral_enabled,
                settings.referral_min_booking_value,
                settings.referral_reward_type.to_string(),
                settings.referral_reward_value,
                settings.referral_reward_expiry_days,
                updated_at,
            ],
        )?;
        Ok(())
    })
    .await
}
