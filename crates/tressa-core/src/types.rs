// SPDX-FileCopyrightText: 2026 Tressa Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Common domain enums shared by storage and the reward services.
//!
//! Every enum round-trips through its snake_case string form, which is also
//! the representation stored in SQLite.

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// Health status reported by adapter health checks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HealthStatus {
    /// Adapter is fully operational.
    Healthy,
    /// Adapter is operational but experiencing issues.
    Degraded(String),
    /// Adapter is not operational.
    Unhealthy(String),
}

/// What a track counts.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum TrackType {
    /// One unit per qualifying booking.
    VisitCount,
    /// Cumulative paid amount in minor currency units.
    SpendAmount,
}

/// The kind of reward a milestone (or a manual grant) issues.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum RewardType {
    /// `reward_value` percent off the booking's base price.
    PercentageDiscount,
    /// `reward_value` minor units off, capped at the base price.
    FixedDiscount,
    /// The whole base price is waived.
    FreeService,
}

impl RewardType {
    /// Discount in minor units for a booking with the given base price.
    ///
    /// Never negative and never more than `base_price`.
    pub fn discount(&self, value: f64, base_price: i64) -> i64 {
        let base_price = base_price.max(0);
        let raw = match self {
            RewardType::PercentageDiscount => (base_price as f64 * value / 100.0).round() as i64,
            RewardType::FixedDiscount => value.round() as i64,
            RewardType::FreeService => base_price,
        };
        raw.clamp(0, base_price)
    }
}

/// Lifecycle of an issued reward grant.
///
/// `Active` is the only non-terminal state.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum GrantStatus {
    Active,
    Redeemed,
    Expired,
    Revoked,
}

impl GrantStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, GrantStatus::Active)
    }
}

/// Lifecycle of a prepaid session package.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum PackageStatus {
    Active,
    Exhausted,
    Expired,
}
