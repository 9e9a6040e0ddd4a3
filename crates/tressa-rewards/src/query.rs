// SPDX-FileCopyrightText: 2026 Tressa Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Customer-facing reads: progress and grants.

use std::collections::HashMap;
use std::sync::Arc;

use serde::Serialize;
use tracing::warn;
use tressa_core::{Clock, GrantStatus, TrackType, TressaError};
use tressa_storage::queries::{grants, progress, tracks};
use tressa_storage::{Database, RewardGrant};

use crate::milestone;
use crate::track::{Reward, Track};

/// The nearest milestone still ahead on a track.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NextMilestone {
    /// Units (visits or minor currency units) still needed.
    pub remaining: i64,
    pub repeating: bool,
    pub reward: Reward,
}

/// A user's standing on one active track.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrackProgress {
    pub track_name: String,
    pub display_name: String,
    pub track_type: TrackType,
    pub current_count: i64,
    pub current_amount: i64,
    pub last_milestone_reached: i64,
    pub next: Option<NextMilestone>,
}

/// Read-only views over the ledger and the grant store.
pub struct RewardQueries {
    db: Database,
    clock: Arc<dyn Clock>,
}

impl RewardQueries {
    pub fn new(db: Database, clock: Arc<dyn Clock>) -> Self {
        Self { db, clock }
    }

    /// Counters and distance to the next milestone for every active track.
    ///
    /// Tracks the user has never been credited on are listed at zero.
    pub async fn progress_for_user(&self, user_id: &str) -> Result<Vec<TrackProgress>, TressaError> {
        let rows = tracks::list_tracks(&self.db, true).await?;
        let mut ledger: HashMap<String, _> = progress::get_progress(&self.db, user_id)
            .await?
            .into_iter()
            .map(|entry| (entry.track_name.clone(), entry))
            .collect();

        let mut out = Vec::with_capacity(rows.len());
        for row in &rows {
            let track = match Track::from_row(row) {
                Ok(track) => track,
                Err(e) => {
                    warn!(track = %row.name, error = %e, "skipping malformed track in progress view");
                    continue;
                }
            };
            let entry = ledger.remove(&track.name);
            let (count, amount, watermark) = entry
                .as_ref()
                .map(|e| (e.current_count, e.current_amount, e.last_milestone_reached))
                .unwrap_or_default();
            let value = match track.track_type {
                TrackType::VisitCount => count,
                TrackType::SpendAmount => amount,
            };
            let next = milestone::next_distance(value, track.rules()).map(|(index, remaining)| {
                let spec = &track.milestones[index];
                NextMilestone {
                    remaining,
                    repeating: spec.is_repeating(),
                    reward: spec.reward().clone(),
                }
            });
            out.push(TrackProgress {
                track_name: track.name,
                display_name: track.display_name,
                track_type: track.track_type,
                current_count: count,
                current_amount: amount,
                last_milestone_reached: watermark,
                next,
            });
        }
        Ok(out)
    }

    /// Active grants not yet past expiry, soonest expiry first.
    pub async fn active_grants(&self, user_id: &str) -> Result<Vec<RewardGrant>, TressaError> {
        grants::active_for_user(&self.db, user_id, self.clock.now()).await
    }

    /// Every grant the user has received, newest first.
    pub async fn grant_history(
        &self,
        user_id: &str,
        status: Option<GrantStatus>,
    ) -> Result<Vec<RewardGrant>, TressaError> {
        grants::history_for_user(&self.db, user_id, status).await
    }

    pub async fn get_grant(&self, grant_id: &str) -> Result<Option<RewardGrant>, TressaError> {
        grants::get_grant(&self.db, grant_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, Duration, TimeZone, Utc};
    use tressa_core::{ManualClock, RewardType};
    use tressa_storage::NewTrack;

    fn start() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 7, 1, 9, 0, 0).unwrap()
    }

    async fn seed_track(db: &Database, name: &str, kind: TrackType, milestones: &str) {
        let row = NewTrack {
            name: name.to_string(),
            display_name: name.to_uppercase(),
            track_type: kind,
            milestones: milestones.to_string(),
            reward_expiry_days: 30,
            is_active: true,
        };
        tracks::insert_track(db, &row, start()).await.unwrap();
    }

    #[tokio::test]
    async fn progress_lists_every_active_track_with_distance() {
        let db = Database::open_in_memory().await.unwrap();
        seed_track(
            &db,
            "visits",
            TrackType::VisitCount,
            r#"[{"count":5,"repeating":true,"reward_type":"percentage_discount","reward_value":10}]"#,
        )
        .await;
        seed_track(
            &db,
            "spend",
            TrackType::SpendAmount,
            r#"[{"amount":10000,"reward_type":"fixed_discount","reward_value":1500}]"#,
        )
        .await;
        seed_track(&db, "broken", TrackType::VisitCount, "oops").await;

        let at = start();
        db.write(move |conn| {
            progress::increment(conn, "u1", "visits", 3_000, 0, &at)?;
            progress::increment(conn, "u1", "spend", 0, 12_000_000, &at)
        })
        .await
        .unwrap();

        let queries = RewardQueries::new(db, Arc::new(ManualClock::new(start())));
        let view = queries.progress_for_user("u1").await.unwrap();
        assert_eq!(view.len(), 2, "malformed track is skipped");

        let visits = view.iter().find(|p| p.track_name == "visits").unwrap();
        assert_eq!(visits.current_count, 3);
        let next = visits.next.as_ref().unwrap();
        assert_eq!(next.remaining, 2);
        assert!(next.repeating);

        let spend = view.iter().find(|p| p.track_name == "spend").unwrap();
        assert_eq!(spend.current_amount, 12000);
        assert!(spend.next.is_none(), "one-time milestone already passed");
    }

    #[tokio::test]
    async fn active_grants_hide_overdue_ones() {
        let db = Database::open_in_memory().await.unwrap();
        let clock = Arc::new(ManualClock::new(start()));
        for days in [5, 20] {
            let grant = RewardGrant::new_active(
                "u1",
                RewardType::FreeService,
                0.0,
                "manual",
                "free fringe",
                start(),
                start() + Duration::days(days),
            );
            grants::insert_grant(&db, &grant).await.unwrap();
        }
        let queries = RewardQueries::new(db, clock.clone());
        assert_eq!(queries.active_grants("u1").await.unwrap().len(), 2);

        clock.advance(Duration::days(10));
        assert_eq!(queries.active_grants("u1").await.unwrap().len(), 1);
        assert_eq!(queries.grant_history("u1", None).await.unwrap().len(), 2);
    }
}
