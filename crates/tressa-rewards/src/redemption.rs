// SPDX-FileCopyrightText: 2026 Tressa Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Redemption of an active grant against a booking.
//!
//! This is the only path that moves a grant from `active` to `redeemed`.
//! Checks, the guarded status flip and the booking discount row share one
//! IMMEDIATE transaction. A grant found past its expiry is flipped to
//! `expired` and that change is committed before `Expired` is returned,
//! so a retry fails the same way.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::info;
use tressa_core::{Clock, GrantStatus, TressaError};
use tressa_storage::queries::grants;
use tressa_storage::{BookingDiscount, Database, RewardGrant, begin_write};

use crate::recording;

/// A checkout asking to apply a grant.
#[derive(Debug, Clone, PartialEq)]
pub struct RedemptionRequest {
    pub grant_id: String,
    /// The caller; must own the grant.
    pub user_id: String,
    pub booking_id: String,
    /// Booking price before the reward, in minor units.
    pub base_price: i64,
}

/// A successful redemption.
#[derive(Debug, Clone, PartialEq)]
pub struct Redemption {
    /// The grant after the flip.
    pub grant: RewardGrant,
    pub discount: BookingDiscount,
}

enum Attempt {
    Redeemed(Redemption),
    ExpiredNow,
    Refused(TressaError),
}

/// Applies grants to bookings.
pub struct RedemptionService {
    db: Database,
    clock: Arc<dyn Clock>,
}

impl RedemptionService {
    pub fn new(db: Database, clock: Arc<dyn Clock>) -> Self {
        Self { db, clock }
    }

    /// Redeem `request.grant_id` against `request.booking_id`.
    ///
    /// Errors, in the order they are checked:
    /// `NotFound` (unknown grant or another user's), `AlreadyRedeemed`,
    /// `Expired` (already expired, or past `expires_at` now, which also
    /// flips it), `NotActive` (revoked), `BookingAlreadyDiscounted`.
    pub async fn redeem(&self, request: &RedemptionRequest) -> Result<Redemption, TressaError> {
        if request.base_price < 0 {
            return Err(TressaError::InvalidConfig(format!(
                "base price must not be negative, got {}",
                request.base_price
            )));
        }
        let now = self.clock.now();
        let req = request.clone();

        let attempt = self
            .db
            .write(move |conn| {
                let tx = begin_write(conn)?;
                let attempt = redeem_in_tx(&tx, &req, &now)?;
                tx.commit()?;
                Ok(attempt)
            })
            .await?;

        match attempt {
            Attempt::Redeemed(redemption) => {
                recording::record_grant_redeemed();
                info!(
                    grant_id = %redemption.grant.id,
                    user_id = %redemption.grant.user_id,
                    booking_id = %redemption.discount.booking_id,
                    discount = redemption.discount.discount_amount,
                    "reward grant redeemed"
                );
                Ok(redemption)
            }
            Attempt::ExpiredNow => {
                recording::record_grants_expired(1);
                info!(grant_id = %request.grant_id, "reward grant expired at redemption");
                Err(TressaError::Expired {
                    id: request.grant_id.clone(),
                })
            }
            Attempt::Refused(err) => Err(err),
        }
    }

    /// Discount the grant would give on a booking of `base_price`, without redeeming it.
    pub async fn preview_discount(
        &self,
        grant_id: &str,
        user_id: &str,
        base_price: i64,
    ) -> Result<i64, TressaError> {
        let grant = grants::get_grant(&self.db, grant_id)
            .await?
            .filter(|g| g.user_id == user_id)
            .ok_or_else(|| TressaError::not_found("reward", grant_id))?;
        if grant.status != GrantStatus::Active || self.clock.now() > grant.expires_at {
            return Err(TressaError::NotActive {
                id: grant.id,
                status: grant.status.to_string(),
            });
        }
        Ok(grant.reward_type.discount(grant.reward_value, base_price))
    }

    /// The reward discount recorded on a booking, if any.
    pub async fn discount_for_booking(
        &self,
        booking_id: &str,
    ) -> Result<Option<BookingDiscount>, TressaError> {
        grants::get_booking_discount(&self.db, booking_id).await
    }
}

fn redeem_in_tx(
    conn: &rusqlite::Connection,
    req: &RedemptionRequest,
    now: &DateTime<Utc>,
) -> rusqlite::Result<Attempt> {
    let grant = match grants::by_id(conn, &req.grant_id)? {
        Some(grant) if grant.user_id == req.user_id => grant,
        _ => {
            return Ok(Attempt::Refused(TressaError::not_found(
                "reward",
                req.grant_id.clone(),
            )));
        }
    };

    match grant.status {
        GrantStatus::Active => {}
        GrantStatus::Redeemed => {
            return Ok(Attempt::Refused(TressaError::AlreadyRedeemed { id: grant.id }));
        }
        GrantStatus::Expired => {
            return Ok(Attempt::Refused(TressaError::Expired { id: grant.id }));
        }
        GrantStatus::Revoked => {
            return Ok(Attempt::Refused(TressaError::NotActive {
                id: grant.id,
                status: grant.status.to_string(),
            }));
        }
    }

    if *now > grant.expires_at {
        grants::close_active(conn, &grant.id, GrantStatus::Expired)?;
        return Ok(Attempt::ExpiredNow);
    }

    if grants::discount_for_booking(conn, &req.booking_id)?.is_some() {
        return Ok(Attempt::Refused(TressaError::BookingAlreadyDiscounted {
            booking_id: req.booking_id.clone(),
        }));
    }

    if grants::mark_redeemed(conn, &grant.id, &req.booking_id, now)? == 0 {
        return Ok(Attempt::Refused(TressaError::NotActive {
            id: grant.id,
            status: grant.status.to_string(),
        }));
    }

    let discount = BookingDiscount {
        booking_id: req.booking_id.clone(),
        grant_id: grant.id.clone(),
        discount_amount: grant.reward_type.discount(grant.reward_value, req.base_price),
        applied_at: *now,
    };
    grants::insert_discount(conn, &discount)?;

    let grant = RewardGrant {
        status: GrantStatus::Redeemed,
        redeemed_booking_id: Some(req.booking_id.clone()),
        redeemed_at: Some(*now),
        ..grant
    };
    Ok(Attempt::Redeemed(Redemption { grant, discount }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use tressa_core::{ManualClock, RewardType};

    fn start() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 5, 1, 9, 0, 0).unwrap()
    }

    async fn setup(reward_type: RewardType, value: f64) -> (RedemptionService, Arc<ManualClock>, Database, String) {
        let db = Database::open_in_memory().await.unwrap();
        let clock = Arc::new(ManualClock::new(start()));
        let grant = RewardGrant::new_active(
            "u1",
            reward_type,
            value,
            "visits",
            "test reward",
            start(),
            start() + Duration::days(30),
        );
        grants::insert_grant(&db, &grant).await.unwrap();
        let svc = RedemptionService::new(db.clone(), clock.clone());
        (svc, clock, db, grant.id)
    }

    fn request(grant_id: &str, booking: &str, base_price: i64) -> RedemptionRequest {
        RedemptionRequest {
            grant_id: grant_id.to_string(),
            user_id: "u1".to_string(),
            booking_id: booking.to_string(),
            base_price,
        }
    }

    #[tokio::test]
    async fn percentage_redemption_annotates_booking() {
        let (svc, _clock, db, id) = setup(RewardType::PercentageDiscount, 10.0).await;
        let done = svc.redeem(&request(&id, "b1", 6000)).await.unwrap();
        assert_eq!(done.discount.discount_amount, 600);
        assert_eq!(done.grant.status, GrantStatus::Redeemed);

        let stored = grants::get_grant(&db, &id).await.unwrap().unwrap();
        assert_eq!(stored.status, GrantStatus::Redeemed);
        assert_eq!(stored.redeemed_booking_id.as_deref(), Some("b1"));
        let discount = svc.discount_for_booking("b1").await.unwrap().unwrap();
        assert_eq!(discount.grant_id, id);
    }

    #[tokio::test]
    async fn second_redemption_is_already_redeemed() {
        let (svc, _clock, _db, id) = setup(RewardType::FixedDiscount, 500.0).await;
        svc.redeem(&request(&id, "b1", 6000)).await.unwrap();
        let err = svc.redeem(&request(&id, "b2", 6000)).await.unwrap_err();
        assert!(matches!(err, TressaError::AlreadyRedeemed { .. }));
    }

    #[tokio::test]
    async fn other_users_grant_is_not_found() {
        let (svc, _clock, _db, id) = setup(RewardType::FreeService, 0.0).await;
        let mut req = request(&id, "b1", 6000);
        req.user_id = "intruder".to_string();
        let err = svc.redeem(&req).await.unwrap_err();
        assert!(matches!(err, TressaError::NotFound { .. }));
        let err = svc.redeem(&request("missing", "b1", 6000)).await.unwrap_err();
        assert!(matches!(err, TressaError::NotFound { .. }));
    }

    #[tokio::test]
    async fn overdue_grant_flips_to_expired_and_stays_expired() {
        let (svc, clock, db, id) = setup(RewardType::PercentageDiscount, 10.0).await;
        clock.advance(Duration::days(31));

        let err = svc.redeem(&request(&id, "b1", 6000)).await.unwrap_err();
        assert!(matches!(err, TressaError::Expired { .. }));
        let stored = grants::get_grant(&db, &id).await.unwrap().unwrap();
        assert_eq!(stored.status, GrantStatus::Expired);

        let err = svc.redeem(&request(&id, "b1", 6000)).await.unwrap_err();
        assert!(matches!(err, TressaError::Expired { .. }));
        assert!(svc.discount_for_booking("b1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn one_reward_per_booking() {
        let (svc, _clock, db, first) = setup(RewardType::PercentageDiscount, 10.0).await;
        let second = RewardGrant::new_active(
            "u1",
            RewardType::FixedDiscount,
            200.0,
            "manual",
            "goodwill",
            start(),
            start() + Duration::days(30),
        );
        grants::insert_grant(&db, &second).await.unwrap();

        svc.redeem(&request(&first, "b1", 6000)).await.unwrap();
        let err = svc.redeem(&request(&second.id, "b1", 6000)).await.unwrap_err();
        assert!(matches!(err, TressaError::BookingAlreadyDiscounted { .. }));
        let untouched = grants::get_grant(&db, &second.id).await.unwrap().unwrap();
        assert_eq!(untouched.status, GrantStatus::Active);
    }

    #[tokio::test]
    async fn concurrent_redemptions_have_one_winner() {
        let (svc, _clock, _db, id) = setup(RewardType::PercentageDiscount, 10.0).await;
        let svc = Arc::new(svc);
        let mut handles = Vec::new();
        for i in 0..8 {
            let svc = svc.clone();
            let req = request(&id, &format!("b{i}"), 6000);
            handles.push(tokio::spawn(async move { svc.redeem(&req).await }));
        }
        let mut wins = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(_) => wins += 1,
                Err(err) => assert!(matches!(err, TressaError::AlreadyRedeemed { .. })),
            }
        }
        assert_eq!(wins, 1);
    }

    #[tokio::test]
    async fn preview_does_not_consume() {
        let (svc, _clock, db, id) = setup(RewardType::FixedDiscount, 9000.0).await;
        assert_eq!(svc.preview_discount(&id, "u1", 6000).await.unwrap(), 6000);
        let stored = grants::get_grant(&db, &id).await.unwrap().unwrap();
        assert_eq!(stored.status, GrantStatus::Active);
    }
}
