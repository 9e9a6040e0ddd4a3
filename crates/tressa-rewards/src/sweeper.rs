// SPDX-FileCopyrightText: 2026 Tressa Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Periodic expiry of overdue grants and packages.
//!
//! A pass is two guarded updates (`status = 'active' AND deadline < now`)
//! in one transaction. Overlapping passes, or a pass racing a redemption,
//! are safe without any extra locking: a row leaves `active` once.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use tressa_config::model::SweeperConfig;
use tressa_core::{Clock, TressaError};
use tressa_storage::queries::{grants, packages};
use tressa_storage::{Database, begin_write};

use crate::recording;

/// Counts from one sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub grants_expired: usize,
    pub packages_expired: usize,
}

/// Expires overdue grants and packages.
#[derive(Clone)]
pub struct ExpirySweeper {
    db: Database,
    clock: Arc<dyn Clock>,
}

impl ExpirySweeper {
    pub fn new(db: Database, clock: Arc<dyn Clock>) -> Self {
        Self { db, clock }
    }

    /// Run one pass.
    pub async fn sweep_once(&self) -> Result<SweepReport, TressaError> {
        let now = self.clock.now();
        let (expired_grants, expired_packages) = self
            .db
            .write(move |conn| {
                let tx = begin_write(conn)?;
                let g = grants::expire_overdue(&tx, &now)?;
                let p = packages::expire_overdue(&tx, &now)?;
                tx.commit()?;
                Ok((g, p))
            })
            .await?;

        for (grant_id, track) in &expired_grants {
            debug!(grant_id = %grant_id, track = %track, "reward grant expired");
        }
        for package_id in &expired_packages {
            debug!(package_id = %package_id, "package expired");
        }

        let report = SweepReport {
            grants_expired: expired_grants.len(),
            packages_expired: expired_packages.len(),
        };
        recording::record_grants_expired(report.grants_expired as u64);
        recording::record_packages_expired(report.packages_expired as u64);
        if report != SweepReport::default() {
            info!(
                grants = report.grants_expired,
                packages = report.packages_expired,
                "expiry sweep complete"
            );
        } else {
            debug!("expiry sweep found nothing to expire");
        }
        Ok(report)
    }

    /// Sweep on a fixed interval until `cancel` fires.
    ///
    /// A failed pass is logged and the loop carries on with the next tick.
    pub async fn run(self, config: SweeperConfig, cancel: CancellationToken) {
        let mut interval = tokio::time::interval(Duration::from_secs(config.interval_secs.max(1)));
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        // The first tick completes immediately.
        if !config.run_on_start {
            interval.tick().await;
        }
        info!(interval_secs = config.interval_secs, "expiry sweeper started");

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    if let Err(e) = self.sweep_once().await {
                        warn!(error = %e, "expiry sweep failed (non-fatal)");
                    }
                }
                _ = cancel.cancelled() => {
                    info!("expiry sweeper shutting down");
                    break;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, Duration as ChronoDuration, TimeZone, Utc};
    use tressa_core::{GrantStatus, ManualClock, PackageStatus, RewardType};
    use tressa_storage::{RewardGrant, UserPackage};

    fn start() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 9, 1, 9, 0, 0).unwrap()
    }

    async fn seed(db: &Database) -> (String, String, String) {
        let short = RewardGrant::new_active(
            "u1",
            RewardType::PercentageDiscount,
            10.0,
            "visits",
            "10% off",
            start(),
            start() + ChronoDuration::days(1),
        );
        let long = RewardGrant::new_active(
            "u1",
            RewardType::PercentageDiscount,
            10.0,
            "visits",
            "10% off",
            start(),
            start() + ChronoDuration::days(60),
        );
        grants::insert_grant(db, &short).await.unwrap();
        grants::insert_grant(db, &long).await.unwrap();

        let package = UserPackage {
            id: "pkg-1".to_string(),
            user_id: "u1".to_string(),
            name: "Trim x3".to_string(),
            total_sessions: 3,
            sessions_used: 1,
            valid_until: start() + ChronoDuration::days(2),
            status: PackageStatus::Active,
            created_at: start(),
            updated_at: start(),
        };
        packages::insert_package(db, &package).await.unwrap();
        (short.id, long.id, package.id)
    }

    #[tokio::test]
    async fn sweep_expires_only_overdue_rows_and_is_idempotent() {
        let db = Database::open_in_memory().await.unwrap();
        let clock = Arc::new(ManualClock::new(start()));
        let sweeper = ExpirySweeper::new(db.clone(), clock.clone());
        let (short, long, package) = seed(&db).await;

        assert_eq!(sweeper.sweep_once().await.unwrap(), SweepReport::default());

        clock.advance(ChronoDuration::days(3));
        let report = sweeper.sweep_once().await.unwrap();
        assert_eq!(
            report,
            SweepReport {
                grants_expired: 1,
                packages_expired: 1
            }
        );
        assert_eq!(sweeper.sweep_once().await.unwrap(), SweepReport::default());

        let short = grants::get_grant(&db, &short).await.unwrap().unwrap();
        let long = grants::get_grant(&db, &long).await.unwrap().unwrap();
        assert_eq!(short.status, GrantStatus::Expired);
        assert_eq!(long.status, GrantStatus::Active);
        let package = packages::get_package(&db, &package).await.unwrap().unwrap();
        assert_eq!(package.status, PackageStatus::Expired);
    }

    #[tokio::test]
    async fn sweep_leaves_redeemed_grants_alone() {
        let db = Database::open_in_memory().await.unwrap();
        let clock = Arc::new(ManualClock::new(start()));
        let (short, _, _) = seed(&db).await;
        let id = short.clone();
        let at = start();
        db.write(move |conn| grants::mark_redeemed(conn, &id, "b1", &at))
            .await
            .unwrap();

        clock.advance(ChronoDuration::days(30));
        let sweeper = ExpirySweeper::new(db.clone(), clock);
        sweeper.sweep_once().await.unwrap();
        let grant = grants::get_grant(&db, &short).await.unwrap().unwrap();
        assert_eq!(grant.status, GrantStatus::Redeemed);
    }

    #[tokio::test]
    async fn run_stops_on_cancel() {
        let db = Database::open_in_memory().await.unwrap();
        let sweeper = ExpirySweeper::new(db, Arc::new(ManualClock::new(start())));
        let cancel = CancellationToken::new();
        let config = SweeperConfig {
            enabled: true,
            interval_secs: 3600,
            run_on_start: true,
        };
        let handle = tokio::spawn(sweeper.run(config, cancel.clone()));
        cancel.cancel();
        tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .expect("sweeper should stop promptly")
            .unwrap();
    }
}
