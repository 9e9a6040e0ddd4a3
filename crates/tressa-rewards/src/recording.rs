// SPDX-FileCopyrightText: 2026 Tressa Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Metric registration and recording helpers.
//!
//! Uses the metrics-rs facade so any installed recorder can collect these.
//! With no recorder installed every call is a no-op.

use metrics::describe_counter;

/// Register all Tressa metric descriptions.
pub fn register_metrics() {
    describe_counter!("tressa_grants_issued_total", "Reward grants issued, by source track");
    describe_counter!("tressa_grants_redeemed_total", "Reward grants redeemed against a booking");
    describe_counter!("tressa_grants_expired_total", "Reward grants expired by the sweeper or at redemption");
    describe_counter!("tressa_packages_expired_total", "Session packages expired");
    describe_counter!("tressa_referral_rewards_total", "Referral rewards issued to referrers");
    describe_counter!(
        "tressa_issuance_track_errors_total",
        "Tracks skipped during issuance because of malformed configuration"
    );
}

pub fn record_grant_issued(track: &str) {
    metrics::counter!("tressa_grants_issued_total", "track" => track.to_string()).increment(1);
}

pub fn record_grant_redeemed() {
    metrics::counter!("tressa_grants_redeemed_total").increment(1);
}

pub fn record_grants_expired(count: u64) {
    metrics::counter!("tressa_grants_expired_total").increment(count);
}

pub fn record_packages_expired(count: u64) {
    metrics::counter!("tressa_packages_expired_total").increment(count);
}

pub fn record_referral_reward() {
    metrics::counter!("tressa_referral_rewards_total").increment(1);
}

pub fn record_track_error() {
    metrics::counter!("tressa_issuance_track_errors_total").increment(1);
}
