// SPDX-FileCopyrightText: 2026 Tressa Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Milestone tracking and reward lifecycle for the Tressa rewards engine.
//!
//! This crate provides:
//! - **Milestone engine**: pure crossing detection for one-time and repeating milestones
//! - **Issuance**: booking events to ledger increments and reward grants, once per booking and track
//! - **Redemption**: guarded `active -> redeemed` with booking discount annotation
//! - **Referrals**: one-shot referrer rewards
//! - **Packages**: prepaid session consumption
//! - **Sweeper**: periodic expiry of overdue grants and packages
//! - **Admin**: validated track, mapping and programme configuration

pub mod admin;
pub mod issuance;
pub mod milestone;
pub mod packages;
pub mod query;
pub mod recording;
pub mod redemption;
pub mod referral;
pub mod resolution;
pub mod sweeper;
pub mod track;

use std::sync::Arc;

use chrono::{DateTime, TimeDelta, Utc};
use tressa_core::{Clock, TressaError};
use tressa_storage::Database;

pub use admin::RewardsAdmin;
pub use issuance::{BookingEvent, IssuanceReport, IssuanceService, TrackOutcome};
pub use packages::PackageService;
pub use query::{RewardQueries, TrackProgress};
pub use redemption::{Redemption, RedemptionRequest, RedemptionService};
pub use referral::ReferralService;
pub use sweeper::{ExpirySweeper, SweepReport};
pub use track::{MilestoneSpec, Reward, Track, TrackDraft};

/// `now + days`, or `InvalidConfig` when the result is out of range.
pub(crate) fn expiry_after(now: DateTime<Utc>, days: i64) -> Result<DateTime<Utc>, TressaError> {
    TimeDelta::try_days(days)
        .and_then(|delta| now.checked_add_signed(delta))
        .ok_or_else(|| TressaError::InvalidConfig(format!("expiry of {days} days is out of range")))
}

/// Every reward service over one database and clock.
pub struct Rewards {
    pub issuance: IssuanceService,
    pub redemption: RedemptionService,
    pub referrals: ReferralService,
    pub packages: PackageService,
    pub queries: RewardQueries,
    pub admin: RewardsAdmin,
    pub sweeper: ExpirySweeper,
}

impl Rewards {
    pub fn new(db: Database, clock: Arc<dyn Clock>) -> Self {
        Self {
            issuance: IssuanceService::new(db.clone(), clock.clone()),
            redemption: RedemptionService::new(db.clone(), clock.clone()),
            referrals: ReferralService::new(db.clone(), clock.clone()),
            packages: PackageService::new(db.clone(), clock.clone()),
            queries: RewardQueries::new(db.clone(), clock.clone()),
            admin: RewardsAdmin::new(db.clone(), clock.clone()),
            sweeper: ExpirySweeper::new(db, clock),
        }
    }
}
