// SPDX-FileCopyrightText: 2026 Tressa Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! End-to-end reward scenarios against a file-backed database.

use std::sync::Arc;

use chrono::{DateTime, Duration, TimeZone, Utc};
use tempfile::TempDir;
use tressa_core::{GrantStatus, ManualClock, RewardType, TrackType, TressaError};
use tressa_rewards::{BookingEvent, RedemptionRequest, Rewards, TrackDraft, TrackOutcome};
use tressa_storage::Database;

fn start() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, 2, 9, 30, 0).unwrap()
}

struct Harness {
    _dir: TempDir,
    rewards: Rewards,
    clock: Arc<ManualClock>,
}

async fn harness() -> Harness {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("rewards.db");
    let db = Database::open(path.to_str().unwrap()).await.unwrap();
    let clock = Arc::new(ManualClock::new(start()));
    let rewards = Rewards::new(db, clock.clone());
    Harness {
        _dir: dir,
        rewards,
        clock,
    }
}

fn booking(n: usize, user: &str, service: &str, paid: i64) -> BookingEvent {
    BookingEvent {
        booking_id: format!("{user}-booking-{n}"),
        user_id: user.to_string(),
        service_id: service.to_string(),
        category: Some("hair".to_string()),
        paid_amount: paid,
        payment_confirmed: true,
    }
}

async fn visits_track(h: &Harness, milestones: &str) -> i64 {
    let draft = TrackDraft::from_json("visits", "Visits", TrackType::VisitCount, milestones, 90).unwrap();
    let track = h.rewards.admin.create_track(&draft).await.unwrap();
    h.rewards.admin.map_category("hair", track.id, 1.0, false).await.unwrap();
    track.id
}

#[tokio::test]
async fn one_time_milestone_issues_exactly_one_grant() {
    let h = harness().await;
    visits_track(
        &h,
        r#"[{"count":4,"reward_type":"free_service","reward_value":0,"description":"Free treatment"}]"#,
    )
    .await;

    let mut issued = Vec::new();
    for n in 1..=5 {
        let report = h.rewards.issuance.process_booking(&booking(n, "u1", "cut", 4000)).await.unwrap();
        issued.push(report.grants().count());
    }
    assert_eq!(issued, vec![0, 0, 0, 1, 0]);
    assert_eq!(h.rewards.queries.grant_history("u1", None).await.unwrap().len(), 1);
}

#[tokio::test]
async fn visits_scenario_every_fifth_visit() {
    let h = harness().await;
    visits_track(
        &h,
        r#"[{"count":5,"repeating":true,"reward_type":"percentage_discount","reward_value":10}]"#,
    )
    .await;

    let mut grants = Vec::new();
    for n in 1..=10 {
        let report = h.rewards.issuance.process_booking(&booking(n, "u1", "cut", 4000)).await.unwrap();
        let issued: Vec<_> = report.grants().cloned().collect();
        match n {
            5 | 10 => assert_eq!(issued.len(), 1, "booking #{n}"),
            _ => assert!(issued.is_empty(), "booking #{n}"),
        }
        grants.extend(issued);
        h.clock.advance(Duration::hours(1));
    }

    let first = &grants[0];
    assert_eq!(first.status, GrantStatus::Active);
    assert_eq!(first.reward_type, RewardType::PercentageDiscount);
    assert_eq!(first.expires_at, first.created_at + Duration::days(90));

    let progress = h.rewards.queries.progress_for_user("u1").await.unwrap();
    assert_eq!(progress[0].current_count, 10);
    assert_eq!(progress[0].last_milestone_reached, 2);
    assert_eq!(progress[0].next.as_ref().unwrap().remaining, 5);

    let redemption = h
        .rewards
        .redemption
        .redeem(&RedemptionRequest {
            grant_id: first.id.clone(),
            user_id: "u1".to_string(),
            booking_id: "checkout-1".to_string(),
            base_price: 7500,
        })
        .await
        .unwrap();
    assert_eq!(redemption.discount.discount_amount, 750);
    assert_eq!(redemption.grant.status, GrantStatus::Redeemed);

    let err = h
        .rewards
        .redemption
        .redeem(&RedemptionRequest {
            grant_id: first.id.clone(),
            user_id: "u1".to_string(),
            booking_id: "checkout-2".to_string(),
            base_price: 7500,
        })
        .await
        .unwrap_err();
    assert!(matches!(err, TressaError::AlreadyRedeemed { .. }));
    assert_eq!(h.rewards.queries.active_grants("u1").await.unwrap().len(), 1);
}

#[tokio::test]
async fn track_edits_keep_customer_progress() {
    let h = harness().await;
    let every_third = r#"[{"count":3,"repeating":true,"reward_type":"percentage_discount","reward_value":10}]"#;
    let id = visits_track(&h, every_third).await;

    for n in 1..=2 {
        h.rewards.issuance.process_booking(&booking(n, "u1", "cut", 4000)).await.unwrap();
    }

    let renamed =
        TrackDraft::from_json("loyal_visits", "Loyal Visits", TrackType::VisitCount, every_third, 90).unwrap();
    assert!(matches!(
        h.rewards.admin.update_track(id, &renamed).await,
        Err(TressaError::InvalidConfig(_))
    ));
    let relabelled =
        TrackDraft::from_json("visits", "Loyal Visits", TrackType::VisitCount, every_third, 90).unwrap();
    h.rewards.admin.update_track(id, &relabelled).await.unwrap();

    let third = h.rewards.issuance.process_booking(&booking(3, "u1", "cut", 4000)).await.unwrap();
    assert_eq!(third.grants().count(), 1);

    let progress = h.rewards.queries.progress_for_user("u1").await.unwrap();
    assert_eq!(progress.len(), 1);
    assert_eq!(progress[0].track_name, "visits");
    assert_eq!(progress[0].current_count, 3);
}

#[tokio::test]
async fn repeating_jump_of_two_cycles_issues_two_grants() {
    let h = harness().await;
    let draft = TrackDraft::from_json(
        "colour",
        "Colour Club",
        TrackType::VisitCount,
        r#"[{"count":3,"repeating":true,"reward_type":"fixed_discount","reward_value":1000}]"#,
        30,
    )
    .unwrap();
    let track = h.rewards.admin.create_track(&draft).await.unwrap();
    h.rewards.admin.map_service("toner", track.id, 1.0, false).await.unwrap();
    h.rewards.admin.map_service("full-colour", track.id, 6.0, false).await.unwrap();

    h.rewards.issuance.process_booking(&booking(1, "u1", "toner", 2000)).await.unwrap();
    let report = h
        .rewards
        .issuance
        .process_booking(&booking(2, "u1", "full-colour", 12000))
        .await
        .unwrap();
    match report.outcome_for("colour") {
        Some(TrackOutcome::Credited { previous, current, grants }) => {
            assert_eq!((*previous, *current), (1, 7));
            assert_eq!(grants.len(), 2);
        }
        other => panic!("unexpected outcome {other:?}"),
    }
}

#[tokio::test]
async fn spend_scenario_crosses_on_second_booking() {
    let h = harness().await;
    let draft = TrackDraft::from_json(
        "spend",
        "Spend & Save",
        TrackType::SpendAmount,
        r#"[{"amount":1000,"repeating":true,"reward_type":"percentage_discount","reward_value":15}]"#,
        60,
    )
    .unwrap();
    h.rewards.admin.create_track(&draft).await.unwrap();

    // No mapping for this service: the legacy spend track picks it up.
    let mut event = booking(1, "u1", "retail", 600);
    event.category = None;
    let first = h.rewards.issuance.process_booking(&event).await.unwrap();
    assert!(matches!(
        first.outcome_for("spend"),
        Some(TrackOutcome::Credited { current: 600, .. })
    ));
    assert_eq!(first.grants().count(), 0);

    let mut event = booking(2, "u1", "retail", 600);
    event.category = None;
    let second = h.rewards.issuance.process_booking(&event).await.unwrap();
    let grants: Vec<_> = second.grants().collect();
    assert_eq!(grants.len(), 1);
    assert_eq!(grants[0].reward_value, 15.0);
    assert_eq!(grants[0].source_track, "spend");
}

#[tokio::test]
async fn expired_grant_fails_and_stays_expired() {
    let h = harness().await;
    let grant = h
        .rewards
        .admin
        .issue_manual_grant("u1", RewardType::FreeService, 0.0, "Birthday treat", 7)
        .await
        .unwrap();

    h.clock.advance(Duration::days(8));
    let request = RedemptionRequest {
        grant_id: grant.id.clone(),
        user_id: "u1".to_string(),
        booking_id: "b1".to_string(),
        base_price: 5000,
    };
    for _ in 0..2 {
        let err = h.rewards.redemption.redeem(&request).await.unwrap_err();
        assert!(matches!(err, TressaError::Expired { .. }));
    }
    let stored = h.rewards.queries.get_grant(&grant.id).await.unwrap().unwrap();
    assert_eq!(stored.status, GrantStatus::Expired);

    // The sweeper has nothing left to do for it.
    assert_eq!(h.rewards.sweeper.sweep_once().await.unwrap().grants_expired, 0);
}

#[tokio::test]
async fn referral_rewards_referrer_exactly_once() {
    let h = harness().await;
    visits_track(
        &h,
        r#"[{"count":5,"repeating":true,"reward_type":"percentage_discount","reward_value":10}]"#,
    )
    .await;
    let mut settings = h.rewards.admin.get_settings().await.unwrap();
    settings.referral_min_booking_value = 3000;
    h.rewards.admin.update_settings(&settings).await.unwrap();
    h.rewards.referrals.register_referral("ana", "bea").await.unwrap();

    let small = h.rewards.issuance.process_booking(&booking(1, "bea", "fringe", 1500)).await.unwrap();
    assert!(small.referral_grant.is_none());

    let first = h.rewards.issuance.process_booking(&booking(2, "bea", "cut", 4500)).await.unwrap();
    let grant = first.referral_grant.expect("referrer rewarded");
    assert_eq!(grant.user_id, "ana");

    let second = h.rewards.issuance.process_booking(&booking(3, "bea", "cut", 4500)).await.unwrap();
    assert!(second.referral_grant.is_none());

    let ana = h.rewards.queries.grant_history("ana", None).await.unwrap();
    assert_eq!(ana.len(), 1);
    let record = h.rewards.referrals.referral_for("bea").await.unwrap().unwrap();
    assert!(record.reward_issued);
    assert_eq!(record.first_booking_value, Some(4500));
}

#[tokio::test]
async fn concurrent_deliveries_of_one_booking_credit_once() {
    let h = harness().await;
    visits_track(
        &h,
        r#"[{"count":1,"repeating":true,"reward_type":"percentage_discount","reward_value":5}]"#,
    )
    .await;
    let rewards = Arc::new(h.rewards);

    let mut handles = Vec::new();
    for _ in 0..6 {
        let rewards = rewards.clone();
        handles.push(tokio::spawn(async move {
            rewards.issuance.process_booking(&booking(1, "u1", "cut", 4000)).await.unwrap()
        }));
    }
    let mut credited = 0;
    for handle in handles {
        let report = handle.await.unwrap();
        if matches!(report.outcome_for("visits"), Some(TrackOutcome::Credited { .. })) {
            credited += 1;
        }
    }
    assert_eq!(credited, 1);
    assert_eq!(rewards.queries.grant_history("u1", None).await.unwrap().len(), 1);
}

#[tokio::test]
async fn redemption_racing_the_sweeper_never_double_transitions() {
    let h = harness().await;
    let grant = h
        .rewards
        .admin
        .issue_manual_grant("u1", RewardType::FixedDiscount, 800.0, "Loyalty thanks", 1)
        .await
        .unwrap();
    h.clock.advance(Duration::days(1) + Duration::seconds(1));
    let rewards = Arc::new(h.rewards);

    let sweep = {
        let rewards = rewards.clone();
        tokio::spawn(async move { rewards.sweeper.sweep_once().await.unwrap() })
    };
    let redeem = {
        let rewards = rewards.clone();
        let id = grant.id.clone();
        tokio::spawn(async move {
            rewards
                .redemption
                .redeem(&RedemptionRequest {
                    grant_id: id,
                    user_id: "u1".to_string(),
                    booking_id: "b1".to_string(),
                    base_price: 5000,
                })
                .await
        })
    };
    let swept = sweep.await.unwrap();
    let redeemed = redeem.await.unwrap();

    assert!(matches!(redeemed, Err(TressaError::Expired { .. })));
    assert!(swept.grants_expired <= 1);
    let stored = rewards.queries.get_grant(&grant.id).await.unwrap().unwrap();
    assert_eq!(stored.status, GrantStatus::Expired);
    assert!(stored.redeemed_booking_id.is_none());
}
