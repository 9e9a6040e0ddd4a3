// SPDX-FileCopyrightText: 2026 Tressa Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Referral registration and the one-shot referrer reward.
//!
//! The reward check is a single guarded `UPDATE ... WHERE reward_issued = 0`
//! inside the issuance transaction, so two racing bookings by the same
//! referee cannot both reward the referrer.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use rusqlite::Connection;
use tracing::{info, warn};
use tressa_core::{Clock, TressaError};
use tressa_storage::queries::{grants, referrals};
use tressa_storage::{Database, ProgrammeSettings, ReferralRecord, RewardGrant};

use crate::expiry_after;
use crate::issuance::BookingEvent;

/// `source_track` recorded on referral grants.
pub const SOURCE_TRACK: &str = "referral";

/// Reward the referee's referrer if `event` is the referee's first qualifying booking.
///
/// A qualifying booking is paid and worth at least the configured minimum.
pub(crate) fn resolve(
    conn: &Connection,
    settings: &ProgrammeSettings,
    event: &BookingEvent,
    now: &DateTime<Utc>,
) -> rusqlite::Result<Option<RewardGrant>> {
    if !settings.referral_enabled
        || !event.payment_confirmed
        || event.paid_amount < settings.referral_min_booking_value
    {
        return Ok(None);
    }
    if !referrals::has_pending(conn, &event.user_id)? {
        return Ok(None);
    }
    let expires_at = match expiry_after(*now, settings.referral_reward_expiry_days) {
        Ok(at) => at,
        Err(e) => {
            warn!(error = %e, "referral reward expiry out of range, reward not issued");
            return Ok(None);
        }
    };
    let Some(referrer_id) = referrals::claim_reward(conn, &event.user_id, event.paid_amount)? else {
        return Ok(None);
    };

    let grant = RewardGrant::new_active(
        referrer_id,
        settings.referral_reward_type,
        settings.referral_reward_value,
        SOURCE_TRACK,
        format!("Referral reward: {} completed their first booking", event.user_id),
        *now,
        expires_at,
    );
    grants::insert(conn, &grant)?;
    referrals::attach_grant(conn, &event.user_id, &grant.id)?;
    Ok(Some(grant))
}

/// Records who referred whom.
pub struct ReferralService {
    db: Database,
    clock: Arc<dyn Clock>,
}

impl ReferralService {
    pub fn new(db: Database, clock: Arc<dyn Clock>) -> Self {
        Self { db, clock }
    }

    /// Register `referee_id` as referred by `referrer_id`.
    ///
    /// Self-referral and a second referrer for the same referee are rejected.
    pub async fn register_referral(
        &self,
        referrer_id: &str,
        referee_id: &str,
    ) -> Result<ReferralRecord, TressaError> {
        if referrer_id.trim().is_empty() || referee_id.trim().is_empty() {
            return Err(TressaError::InvalidConfig(
                "referrer and referee ids must not be empty".to_string(),
            ));
        }
        let record =
            referrals::insert_referral(&self.db, referrer_id, referee_id, self.clock.now()).await?;
        info!(referrer_id, referee_id, "referral registered");
        Ok(record)
    }

    /// The referral a user joined through, if any.
    pub async fn referral_for(&self, referee_id: &str) -> Result<Option<ReferralRecord>, TressaError> {
        referrals::get_by_referee(&self.db, referee_id).await
    }

    /// Everyone a user has referred.
    pub async fn referrals_by(&self, referrer_id: &str) -> Result<Vec<ReferralRecord>, TressaError> {
        referrals::list_by_referrer(&self.db, referrer_id).await
    }
}
