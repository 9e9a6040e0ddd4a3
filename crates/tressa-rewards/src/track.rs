// SPDX-FileCopyrightText: 2026 Tressa Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Typed track configuration.
//!
//! Milestones are stored as a JSON array. This module is the only place that
//! JSON is read or written: it is parsed once into [`MilestoneSpec`] values
//! and validated, and business logic only ever sees the typed form.
//!
//! Stored document shape, one object per milestone:
//!
//! ```json
//! [{"count": 5, "repeating": true, "reward_type": "percentage_discount",
//!   "reward_value": 10, "description": "10% off every 5th visit"}]
//! ```
//!
//! Visit tracks use `count`, spend tracks use `amount` (minor units).

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use tressa_core::{RewardType, TrackType, TressaError};
use tressa_storage::{MILLIS_PER_UNIT, NewTrack, ProgressRow, TrackRow};

use crate::milestone::Rule;

/// What a milestone pays out.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reward {
    pub reward_type: RewardType,
    /// Percent for percentage discounts, minor units for fixed discounts.
    pub value: f64,
    pub description: String,
}

impl Reward {
    /// Description shown on the grant; generated when none was configured.
    pub fn describe(&self, track_display_name: &str) -> String {
        if !self.description.trim().is_empty() {
            return self.description.clone();
        }
        match self.reward_type {
            RewardType::PercentageDiscount => {
                format!("{}% off ({track_display_name})", self.value)
            }
            RewardType::FixedDiscount => {
                format!("{} off ({track_display_name})", self.value.round() as i64)
            }
            RewardType::FreeService => format!("Free service ({track_display_name})"),
        }
    }
}

/// One milestone, tagged by what it counts.
#[derive(Debug, Clone, PartialEq)]
pub enum MilestoneSpec {
    Visit {
        count: i64,
        repeating: bool,
        reward: Reward,
    },
    Spend {
        amount: i64,
        repeating: bool,
        reward: Reward,
    },
}

impl MilestoneSpec {
    pub fn threshold(&self) -> i64 {
        match self {
            MilestoneSpec::Visit { count, .. } => *count,
            MilestoneSpec::Spend { amount, .. } => *amount,
        }
    }

    pub fn is_repeating(&self) -> bool {
        match self {
            MilestoneSpec::Visit { repeating, .. } | MilestoneSpec::Spend { repeating, .. } => {
                *repeating
            }
        }
    }

    pub fn reward(&self) -> &Reward {
        match self {
            MilestoneSpec::Visit { reward, .. } | MilestoneSpec::Spend { reward, .. } => reward,
        }
    }

    pub fn track_type(&self) -> TrackType {
        match self {
            MilestoneSpec::Visit { .. } => TrackType::VisitCount,
            MilestoneSpec::Spend { .. } => TrackType::SpendAmount,
        }
    }

    /// The crossing rule the milestone engine evaluates.
    pub fn rule(&self) -> Rule {
        if self.is_repeating() {
            Rule::Repeating {
                cycle: self.threshold(),
            }
        } else {
            Rule::OneTime {
                threshold: self.threshold(),
            }
        }
    }
}

/// Stored JSON form of a milestone.
#[derive(Debug, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
struct MilestoneDoc {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    count: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    amount: Option<i64>,
    #[serde(default)]
    repeating: bool,
    reward_type: RewardType,
    reward_value: f64,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    description: String,
}

impl From<&MilestoneSpec> for MilestoneDoc {
    fn from(spec: &MilestoneSpec) -> Self {
        let reward = spec.reward();
        let (count, amount) = match spec {
            MilestoneSpec::Visit { count, .. } => (Some(*count), None),
            MilestoneSpec::Spend { amount, .. } => (None, Some(*amount)),
        };
        Self {
            count,
            amount,
            repeating: spec.is_repeating(),
            reward_type: reward.reward_type,
            reward_value: reward.value,
            description: reward.description.clone(),
        }
    }
}

/// Parse and validate a stored milestone document for a track of `track_type`.
pub fn parse_milestones(track_type: TrackType, json: &str) -> Result<Vec<MilestoneSpec>, TressaError> {
    let docs: Vec<MilestoneDoc> = serde_json::from_str(json)?;
    let mut specs = Vec::with_capacity(docs.len());
    for (i, doc) in docs.into_iter().enumerate() {
        let reward = Reward {
            reward_type: doc.reward_type,
            value: doc.reward_value,
            description: doc.description,
        };
        let spec = match (track_type, doc.count, doc.amount) {
            (TrackType::VisitCount, Some(count), None) => MilestoneSpec::Visit {
                count,
                repeating: doc.repeating,
                reward,
            },
            (TrackType::SpendAmount, None, Some(amount)) => MilestoneSpec::Spend {
                amount,
                repeating: doc.repeating,
                reward,
            },
            (TrackType::VisitCount, _, _) => {
                return Err(TressaError::InvalidConfig(format!(
                    "milestone {i}: visit_count tracks take exactly one `count`"
                )));
            }
            (TrackType::SpendAmount, _, _) => {
                return Err(TressaError::InvalidConfig(format!(
                    "milestone {i}: spend_amount tracks take exactly one `amount`"
                )));
            }
        };
        specs.push(spec);
    }
    validate_milestones(track_type, &specs)?;
    Ok(specs)
}

/// Serialize milestones to the stored JSON document.
pub fn milestones_to_json(specs: &[MilestoneSpec]) -> Result<String, TressaError> {
    let docs: Vec<MilestoneDoc> = specs.iter().map(MilestoneDoc::from).collect();
    Ok(serde_json::to_string(&docs)?)
}

/// Check a reward type/value pair.
pub fn validate_reward(reward_type: RewardType, value: f64) -> Result<(), TressaError> {
    if !value.is_finite() || value < 0.0 {
        return Err(TressaError::InvalidConfig(format!(
            "reward value must be a non-negative number, got {value}"
        )));
    }
    if reward_type == RewardType::PercentageDiscount && value > 100.0 {
        return Err(TressaError::InvalidConfig(format!(
            "percentage discount cannot exceed 100, got {value}"
        )));
    }
    Ok(())
}

/// Largest points multiplier a mapping may carry.
pub const MAX_POINTS_MULTIPLIER: f64 = 1000.0;

/// A points multiplier as an exact number of thousandths.
///
/// Multipliers are limited to `0..=MAX_POINTS_MULTIPLIER` with at most
/// three decimal places, so every accrual is an exact integer delta.
pub fn multiplier_millis(multiplier: f64) -> Result<i64, TressaError> {
    if !multiplier.is_finite() || !(0.0..=MAX_POINTS_MULTIPLIER).contains(&multiplier) {
        return Err(TressaError::InvalidConfig(format!(
            "points multiplier must be between 0 and {MAX_POINTS_MULTIPLIER}, got {multiplier}"
        )));
    }
    let scaled = multiplier * MILLIS_PER_UNIT as f64;
    let millis = scaled.round();
    if (scaled - millis).abs() > 1e-6 {
        return Err(TressaError::InvalidConfig(format!(
            "points multiplier allows at most three decimal places, got {multiplier}"
        )));
    }
    // Bounded by MAX_POINTS_MULTIPLIER * 1000 above.
    Ok(millis as i64)
}

/// Check a milestone list against its track type.
///
/// One-time thresholds must be strictly increasing in list order; repeating
/// milestones must not share a cycle length.
pub fn validate_milestones(track_type: TrackType, specs: &[MilestoneSpec]) -> Result<(), TressaError> {
    let mut last_one_time: Option<i64> = None;
    let mut cycles = HashSet::new();
    for (i, spec) in specs.iter().enumerate() {
        if spec.track_type() != track_type {
            return Err(TressaError::InvalidConfig(format!(
                "milestone {i}: {} milestone on a {track_type} track",
                spec.track_type()
            )));
        }
        let threshold = spec.threshold();
        if threshold <= 0 {
            return Err(TressaError::InvalidConfig(format!(
                "milestone {i}: threshold must be positive, got {threshold}"
            )));
        }
        let reward = spec.reward();
        validate_reward(reward.reward_type, reward.value)
            .map_err(|e| TressaError::InvalidConfig(format!("milestone {i}: {e}")))?;

        if spec.is_repeating() {
            if !cycles.insert(threshold) {
                return Err(TressaError::InvalidConfig(format!(
                    "milestone {i}: duplicate repeating cycle length {threshold}"
                )));
            }
        } else {
            if let Some(previous) = last_one_time
                && threshold <= previous
            {
                return Err(TressaError::InvalidConfig(format!(
                    "milestone {i}: one-time threshold {threshold} must exceed {previous}"
                )));
            }
            last_one_time = Some(threshold);
        }
    }
    Ok(())
}

/// A track with its milestones parsed.
#[derive(Debug, Clone, PartialEq)]
pub struct Track {
    pub id: i64,
    pub name: String,
    pub display_name: String,
    pub track_type: TrackType,
    pub milestones: Vec<MilestoneSpec>,
    pub reward_expiry_days: i64,
    pub is_active: bool,
}

impl Track {
    /// Parse a stored row. A malformed milestone document is `InvalidConfig`.
    pub fn from_row(row: &TrackRow) -> Result<Self, TressaError> {
        let milestones = parse_milestones(row.track_type, &row.milestones)
            .map_err(|e| TressaError::InvalidConfig(format!("track `{}`: {e}", row.name)))?;
        Ok(Self {
            id: row.id,
            name: row.name.clone(),
            display_name: row.display_name.clone(),
            track_type: row.track_type,
            milestones,
            reward_expiry_days: row.reward_expiry_days,
            is_active: row.is_active,
        })
    }

    /// The ledger counter this track advances.
    pub fn value_of(&self, progress: &ProgressRow) -> i64 {
        match self.track_type {
            TrackType::VisitCount => progress.current_count,
            TrackType::SpendAmount => progress.current_amount,
        }
    }

    pub fn rules(&self) -> impl Iterator<Item = Rule> + '_ {
        self.milestones.iter().map(MilestoneSpec::rule)
    }
}

/// Admin input for creating or replacing a track.
#[derive(Debug, Clone, PartialEq)]
pub struct TrackDraft {
    pub name: String,
    pub display_name: String,
    pub track_type: TrackType,
    pub milestones: Vec<MilestoneSpec>,
    pub reward_expiry_days: i64,
    pub is_active: bool,
}

impl TrackDraft {
    /// Build a draft from a raw milestone JSON document, as submitted by the admin UI.
    pub fn from_json(
        name: impl Into<String>,
        display_name: impl Into<String>,
        track_type: TrackType,
        milestones_json: &str,
        reward_expiry_days: i64,
    ) -> Result<Self, TressaError> {
        Ok(Self {
            name: name.into(),
            display_name: display_name.into(),
            track_type,
            milestones: parse_milestones(track_type, milestones_json)?,
            reward_expiry_days,
            is_active: true,
        })
    }

    pub fn validate(&self) -> Result<(), TressaError> {
        if self.name.trim().is_empty() {
            return Err(TressaError::InvalidConfig(
                "track name must not be empty".to_string(),
            ));
        }
        if self.reward_expiry_days <= 0 {
            return Err(TressaError::InvalidConfig(format!(
                "reward expiry must be at least one day, got {}",
                self.reward_expiry_days
            )));
        }
        validate_milestones(self.track_type, &self.milestones)
    }

    /// Validate and convert into the storage row shape.
    pub fn to_new_track(&self) -> Result<NewTrack, TressaError> {
        self.validate()?;
        let display_name = if self.display_name.trim().is_empty() {
            self.name.clone()
        } else {
            self.display_name.clone()
        };
        Ok(NewTrack {
            name: self.name.trim().to_string(),
            display_name,
            track_type: self.track_type,
            milestones: milestones_to_json(&self.milestones)?,
            reward_expiry_days: self.reward_expiry_days,
            is_active: self.is_active,
        })
    }
}
