// SPDX-FileCopyrightText: 2026 Tressa Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Row types for the rewards tables and column decoding helpers.
//!
//! Timestamps are stored as fixed-width UTC text (`YYYY-MM-DDTHH:MM:SS.sssZ`),
//! so comparing the text in SQL orders rows chronologically.

use std::str::FromStr;

use chrono::{DateTime, NaiveDateTime, Utc};
use rusqlite::Row;
use rusqlite::types::Type;
use serde::{Deserialize, Serialize};
use tressa_core::{GrantStatus, PackageStatus, RewardType, TrackType};

const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.3fZ";

/// Format a timestamp the way every table stores it.
pub fn to_db_timestamp(ts: &DateTime<Utc>) -> String {
    ts.format(TIMESTAMP_FORMAT).to_string()
}

pub(crate) fn timestamp_column(row: &Row<'_>, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let raw: String = row.get(idx)?;
    NaiveDateTime::parse_from_str(&raw, TIMESTAMP_FORMAT)
        .map(|naive| naive.and_utc())
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

pub(crate) fn opt_timestamp_column(
    row: &Row<'_>,
    idx: usize,
) -> rusqlite::Result<Option<DateTime<Utc>>> {
    let raw: Option<String> = row.get(idx)?;
    raw.map(|s| {
        NaiveDateTime::parse_from_str(&s, TIMESTAMP_FORMAT)
            .map(|naive| naive.and_utc())
            .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
    })
    .transpose()
}

pub(crate) fn enum_column<T>(row: &Row<'_>, idx: usize) -> rusqlite::Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    let raw: String = row.get(idx)?;
    T::from_str(&raw)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

/// Programme-level flags, re-read on every issuance call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgrammeSettings {
    pub rewards_enabled: bool,
    pub spend_tracking_enabled: bool,
    /// Track credited with paid amounts when no explicit or category mapping matches.
    pub legacy_spend_track: String,
    pub referral_enabled: bool,
    /// Minimum paid booking value (minor units) that counts as a qualifying first booking.
    pub referral_min_booking_value: i64,
    pub referral_reward_type: RewardType,
    pub referral_reward_value: f64,
    pub referral_reward_expiry_days: i64,
}

impl Default for ProgrammeSettings {
    fn default() -> Self {
        Self {
            rewards_enabled: true,
            spend_tracking_enabled: true,
            legacy_spend_track: "spend".to_string(),
            referral_enabled: true,
            referral_min_booking_value: 0,
            referral_reward_type: RewardType::FixedDiscount,
            referral_reward_value: 1000.0,
            referral_reward_expiry_days: 90,
        }
    }
}

/// A track definition as stored. `milestones` is the raw JSON document;
/// the reward engine parses it into typed milestones.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackRow {
    pub id: i64,
    pub name: String,
    pub display_name: String,
    pub track_type: TrackType,
    pub milestones: String,
    pub reward_expiry_days: i64,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Fields for inserting or replacing a track definition.
#[derive(Debug, Clone)]
pub struct NewTrack {
    pub name: String,
    pub display_name: String,
    pub track_type: TrackType,
    pub milestones: String,
    pub reward_expiry_days: i64,
    pub is_active: bool,
}

/// Which booking attribute a mapping keys on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum MappingKey {
    Service(String),
    Category(String),
}

/// A service or category mapping onto a track.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackMapping {
    pub id: i64,
    pub key: MappingKey,
    pub track_id: i64,
    pub points_multiplier: f64,
    pub requires_payment: bool,
}

/// Sub-unit resolution of the Progress Ledger: counters accrue in
/// thousandths of a visit or of a minor currency unit.
pub const MILLIS_PER_UNIT: i64 = 1000;

/// One Progress Ledger entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressRow {
    pub user_id: String,
    pub track_name: String,
    /// Whole visits.
    pub current_count: i64,
    /// Thousandths of a visit not yet carried into `current_count`.
    pub count_millis: i64,
    /// Whole minor currency units.
    pub current_amount: i64,
    /// Thousandths of a minor unit not yet carried into `current_amount`.
    pub amount_millis: i64,
    /// Cycle count of the track's first repeating milestone; for tracks
    /// with only one-time milestones, the highest threshold reached.
    pub last_milestone_reached: i64,
    pub updated_at: DateTime<Utc>,
}

impl ProgressRow {
    /// Exact visit count in thousandths, `None` on overflow.
    pub fn count_total_millis(&self) -> Option<i64> {
        self.current_count
            .checked_mul(MILLIS_PER_UNIT)?
            .checked_add(self.count_millis)
    }

    /// Exact spend in thousandths of a minor unit, `None` on overflow.
    pub fn amount_total_millis(&self) -> Option<i64> {
        self.current_amount
            .checked_mul(MILLIS_PER_UNIT)?
            .checked_add(self.amount_millis)
    }
}

/// An issued reward instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RewardGrant {
    pub id: String,
    pub user_id: String,
    pub reward_type: RewardType,
    pub reward_value: f64,
    pub source_track: String,
    pub description: String,
    pub status: GrantStatus,
    pub expires_at: DateTime<Utc>,
    pub redeemed_booking_id: Option<String>,
    pub redeemed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl RewardGrant {
    /// A fresh active grant with a random id.
    pub fn new_active(
        user_id: impl Into<String>,
        reward_type: RewardType,
        reward_value: f64,
        source_track: impl Into<String>,
        description: impl Into<String>,
        created_at: DateTime<Utc>,
        expires_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            user_id: user_id.into(),
            reward_type,
            reward_value,
            source_track: source_track.into(),
            description: description.into(),
            status: GrantStatus::Active,
            expires_at,
            redeemed_booking_id: None,
            redeemed_at: None,
            created_at,
        }
    }
}

/// A booking's applied reward discount.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BookingDiscount {
    pub booking_id: String,
    pub grant_id: String,
    pub discount_amount: i64,
    pub applied_at: DateTime<Utc>,
}

/// A referrer/referee pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReferralRecord {
    pub id: i64,
    pub referrer_id: String,
    pub referee_id: String,
    pub first_booking_value: Option<i64>,
    pub reward_issued: bool,
    pub reward_grant_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// A prepaid bundle of sessions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserPackage {
    pub id: String,
    pub user_id: String,
    pub name: String,
    pub total_sessions: i64,
    pub sessions_used: i64,
    pub valid_until: DateTime<Utc>,
    pub status: PackageStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl UserPackage {
    pub fn sessions_remaining(&self) -> i64 {
        (self.total_sessions - self.sessions_used).max(0)
    }
}
