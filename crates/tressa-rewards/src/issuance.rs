// SPDX-FileCopyrightText: 2026 Tressa Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Reward issuance for completed and paid bookings.
//!
//! One call is one IMMEDIATE transaction: read programme settings, resolve
//! the booking's tracks, and for each track claim the `(booking, track)`
//! credit, upsert the ledger, run the milestone engine on the exact
//! before/after values of that upsert, and insert the grants it owes.
//! The referral resolver runs in the same transaction.
//!
//! A track whose stored configuration is malformed is reported as failed
//! and left untouched; the other tracks on the booking still accrue.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use tressa_core::{Clock, TrackType, TressaError};
use tressa_storage::queries::{grants, progress, settings, tracks};
use tressa_storage::{Database, MILLIS_PER_UNIT, ProgressRow, RewardGrant, begin_write};

use crate::expiry_after;
use crate::milestone;
use crate::recording;
use crate::referral;
use crate::resolution::{self, Applicable, ResolutionStrategy, TrackRef};
use crate::track::{Track, multiplier_millis};

/// A booking lifecycle event, delivered on completion and again when
/// payment is confirmed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BookingEvent {
    pub booking_id: String,
    pub user_id: String,
    pub service_id: String,
    pub category: Option<String>,
    /// Amount paid in minor units; zero until payment is confirmed.
    pub paid_amount: i64,
    pub payment_confirmed: bool,
}

/// What happened to one track for one booking.
#[derive(Debug, Clone, PartialEq)]
pub enum TrackOutcome {
    /// The ledger moved from `previous` to `current` and `grants` were issued.
    Credited {
        previous: i64,
        current: i64,
        grants: Vec<RewardGrant>,
    },
    /// The mapping requires payment and the booking is not paid yet.
    SkippedUnpaid,
    /// This booking already credited this track.
    AlreadyCredited,
    /// The multiplied delta rounded to zero.
    NoProgress,
    /// The track's configuration could not be used.
    Failed { reason: String },
}

#[derive(Debug, Clone, PartialEq)]
pub struct TrackResult {
    pub track_name: String,
    /// Resolution strategy that selected the track.
    pub source: &'static str,
    pub outcome: TrackOutcome,
}

/// Result of processing one booking event.
#[derive(Debug, Clone, PartialEq)]
pub struct IssuanceReport {
    pub booking_id: String,
    pub user_id: String,
    /// `false` when the programme is switched off; nothing else is populated.
    pub programme_enabled: bool,
    pub tracks: Vec<TrackResult>,
    /// Grant issued to this user's referrer, if this booking triggered it.
    pub referral_grant: Option<RewardGrant>,
}

impl IssuanceReport {
    fn disabled(event: &BookingEvent) -> Self {
        Self {
            booking_id: event.booking_id.clone(),
            user_id: event.user_id.clone(),
            programme_enabled: false,
            tracks: Vec::new(),
            referral_grant: None,
        }
    }

    /// Grants issued to the booking's user, across all tracks.
    pub fn grants(&self) -> impl Iterator<Item = &RewardGrant> {
        self.tracks.iter().flat_map(|t| match &t.outcome {
            TrackOutcome::Credited { grants, .. } => grants.as_slice(),
            _ => &[][..],
        })
    }

    /// Tracks that failed.
    pub fn failures(&self) -> impl Iterator<Item = &TrackResult> {
        self.tracks
            .iter()
            .filter(|t| matches!(t.outcome, TrackOutcome::Failed { .. }))
    }

    pub fn outcome_for(&self, track_name: &str) -> Option<&TrackOutcome> {
        self.tracks
            .iter()
            .find(|t| t.track_name == track_name)
            .map(|t| &t.outcome)
    }
}

/// Applies booking events to the progress ledger and issues grants.
pub struct IssuanceService {
    db: Database,
    clock: Arc<dyn Clock>,
    chain: &'static [&'static dyn ResolutionStrategy],
}

impl IssuanceService {
    pub fn new(db: Database, clock: Arc<dyn Clock>) -> Self {
        Self {
            db,
            clock,
            chain: resolution::default_chain(),
        }
    }

    /// Replace the resolution chain.
    pub fn with_chain(mut self, chain: &'static [&'static dyn ResolutionStrategy]) -> Self {
        self.chain = chain;
        self
    }

    /// Process one booking event.
    ///
    /// Safe to call more than once for the same booking: each track is
    /// credited at most once per booking, and a track skipped for missing
    /// payment is credited by the later paid delivery.
    pub async fn process_booking(&self, event: &BookingEvent) -> Result<IssuanceReport, TressaError> {
        if event.booking_id.trim().is_empty() || event.user_id.trim().is_empty() {
            return Err(TressaError::InvalidConfig(
                "booking events need a booking id and a user id".to_string(),
            ));
        }
        let event = BookingEvent {
            paid_amount: event.paid_amount.max(0),
            ..event.clone()
        };
        let now = self.clock.now();
        let chain = self.chain;

        let report = self
            .db
            .write(move |conn| {
                let tx = begin_write(conn)?;
                let programme = settings::read(&tx)?;
                if !programme.rewards_enabled {
                    return Ok(IssuanceReport::disabled(&event));
                }

                let applicable = resolution::resolve(chain, &tx, &event, &programme)?;
                let mut results = Vec::with_capacity(applicable.len());
                for entry in &applicable {
                    if let Some(result) = credit_track(&tx, &event, entry, &now)? {
                        results.push(result);
                    }
                }
                let referral_grant = referral::resolve(&tx, &programme, &event, &now)?;
                tx.commit()?;

                Ok(IssuanceReport {
                    booking_id: event.booking_id.clone(),
                    user_id: event.user_id.clone(),
                    programme_enabled: true,
                    tracks: results,
                    referral_grant,
                })
            })
            .await?;

        self.log_report(&report);
        Ok(report)
    }

    fn log_report(&self, report: &IssuanceReport) {
        if !report.programme_enabled {
            debug!(booking_id = %report.booking_id, "rewards programme disabled, booking ignored");
            return;
        }
        for track in &report.tracks {
            match &track.outcome {
                TrackOutcome::Credited {
                    previous,
                    current,
                    grants,
                } => {
                    debug!(
                        booking_id = %report.booking_id,
                        user_id = %report.user_id,
                        track = %track.track_name,
                        previous,
                        current,
                        "progress credited"
                    );
                    for grant in grants {
                        recording::record_grant_issued(&track.track_name);
                        info!(
                            user_id = %grant.user_id,
                            track = %track.track_name,
                            grant_id = %grant.id,
                            reward_type = %grant.reward_type,
                            reward_value = grant.reward_value,
                            expires_at = %grant.expires_at,
                            "reward grant issued"
                        );
                    }
                }
                TrackOutcome::Failed { reason } => {
                    recording::record_track_error();
                    warn!(
                        booking_id = %report.booking_id,
                        track = %track.track_name,
                        reason = %reason,
                        "track skipped during issuance"
                    );
                }
                other => {
                    debug!(
                        booking_id = %report.booking_id,
                        track = %track.track_name,
                        outcome = ?other,
                        "track not credited"
                    );
                }
            }
        }
        if let Some(grant) = &report.referral_grant {
            recording::record_referral_reward();
            recording::record_grant_issued(referral::SOURCE_TRACK);
            info!(
                referrer_id = %grant.user_id,
                referee_id = %report.user_id,
                grant_id = %grant.id,
                "referral reward issued"
            );
        }
    }
}

fn total_millis(track_type: TrackType, row: &ProgressRow) -> Option<i64> {
    match track_type {
        TrackType::VisitCount => row.count_total_millis(),
        TrackType::SpendAmount => row.amount_total_millis(),
    }
}

fn failed(track_name: &str, source: &'static str, reason: impl ToString) -> TrackResult {
    TrackResult {
        track_name: track_name.to_string(),
        source,
        outcome: TrackOutcome::Failed {
            reason: reason.to_string(),
        },
    }
}

/// Credit one resolved track. `None` when the track is missing or inactive.
fn credit_track(
    conn: &rusqlite::Connection,
    event: &BookingEvent,
    entry: &Applicable,
    now: &DateTime<Utc>,
) -> rusqlite::Result<Option<TrackResult>> {
    let row = match &entry.track {
        TrackRef::Id(id) => tracks::by_id(conn, *id)?,
        TrackRef::Name(name) => tracks::by_name(conn, name)?,
    };
    let Some(row) = row else {
        return Ok(None);
    };
    if !row.is_active {
        return Ok(None);
    }

    let track = match Track::from_row(&row) {
        Ok(track) => track,
        Err(e) => return Ok(Some(failed(&row.name, entry.source, e))),
    };
    let multiplier = match multiplier_millis(entry.points_multiplier) {
        Ok(millis) => millis,
        Err(e) => return Ok(Some(failed(&track.name, entry.source, e))),
    };
    let expires_at = match expiry_after(*now, track.reward_expiry_days) {
        Ok(at) => at,
        Err(e) => return Ok(Some(failed(&track.name, entry.source, e))),
    };

    let result = |outcome: TrackOutcome| -> rusqlite::Result<Option<TrackResult>> {
        Ok(Some(TrackResult {
            track_name: track.name.clone(),
            source: entry.source,
            outcome,
        }))
    };

    if entry.requires_payment && !event.payment_confirmed {
        return result(TrackOutcome::SkippedUnpaid);
    }

    // Accrual in thousandths of a unit, so fractional multipliers are exact.
    let delta = match track.track_type {
        TrackType::VisitCount => Some(multiplier),
        TrackType::SpendAmount => event.paid_amount.checked_mul(multiplier),
    };
    let Some(delta) = delta else {
        return Ok(Some(failed(&track.name, entry.source, "accrual overflows the ledger")));
    };
    if delta <= 0 {
        return result(TrackOutcome::NoProgress);
    }

    let before = progress::entry(conn, &event.user_id, &track.name)?;
    let before_total = match &before {
        Some(row) => total_millis(track.track_type, row),
        None => Some(0),
    };
    if before_total.and_then(|total| total.checked_add(delta)).is_none() {
        return Ok(Some(failed(&track.name, entry.source, "accrual overflows the ledger")));
    }

    if !progress::claim_credit(conn, &event.booking_id, track.id, &event.user_id, now)? {
        return result(TrackOutcome::AlreadyCredited);
    }

    let (count_delta, amount_delta) = match track.track_type {
        TrackType::VisitCount => (delta, 0),
        TrackType::SpendAmount => (0, delta),
    };
    let after = progress::increment(conn, &event.user_id, &track.name, count_delta, amount_delta, now)?;
    let current = track.value_of(&after);
    let previous = total_millis(track.track_type, &after)
        .map_or(current, |total| (total - delta).div_euclid(MILLIS_PER_UNIT));

    let mut issued = Vec::new();
    for crossing in milestone::evaluate(previous, current, track.rules()) {
        let reward = track.milestones[crossing.index].reward();
        for _ in 0..crossing.times {
            let grant = RewardGrant::new_active(
                &event.user_id,
                reward.reward_type,
                reward.value,
                &track.name,
                reward.describe(&track.display_name),
                *now,
                expires_at,
            );
            grants::insert(conn, &grant)?;
            issued.push(grant);
        }
    }
    if !issued.is_empty() {
        let reached = milestone::watermark(current, track.rules());
        progress::raise_watermark(conn, &event.user_id, &track.name, reached)?;
    }

    result(TrackOutcome::Credited {
        previous,
        current,
        grants: issued,
    })
}
