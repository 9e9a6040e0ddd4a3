// SPDX-FileCopyrightText: 2026 Tressa Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Staff operations: tracks, mappings, programme settings, manual grants
//! and revocation.
//!
//! Every write is validated before it reaches storage, so a malformed
//! definition is rejected with `InvalidConfig` and never stored. Editing a
//! track leaves grants already issued under the old definition untouched.

use std::sync::Arc;

use tracing::{info, warn};
use tressa_core::{Clock, GrantStatus, RewardType, TressaError};
use tressa_storage::queries::{grants, mappings, settings, tracks};
use tressa_storage::{Database, MappingKey, ProgrammeSettings, RewardGrant, TrackMapping, begin_write};

use crate::expiry_after;
use crate::track::{Track, TrackDraft, multiplier_millis, validate_reward};

/// `source_track` recorded on grants issued by staff.
pub const MANUAL_SOURCE: &str = "manual";

/// Staff-facing configuration and grant management.
pub struct RewardsAdmin {
    db: Database,
    clock: Arc<dyn Clock>,
}

impl RewardsAdmin {
    pub fn new(db: Database, clock: Arc<dyn Clock>) -> Self {
        Self { db, clock }
    }

    // --- Tracks ---

    pub async fn create_track(&self, draft: &TrackDraft) -> Result<Track, TressaError> {
        let row = tracks::insert_track(&self.db, &draft.to_new_track()?, self.clock.now()).await?;
        info!(track = %row.name, id = row.id, "track created");
        Track::from_row(&row)
    }

    /// Replace a track's definition. The internal name is fixed at
    /// creation; only the display name and the rules change.
    pub async fn update_track(&self, id: i64, draft: &TrackDraft) -> Result<Track, TressaError> {
        let row = tracks::update_track(&self.db, id, &draft.to_new_track()?, self.clock.now()).await?;
        info!(track = %row.name, id, "track updated");
        Track::from_row(&row)
    }

    pub async fn set_track_active(&self, id: i64, active: bool) -> Result<(), TressaError> {
        tracks::set_active(&self.db, id, active, self.clock.now()).await?;
        info!(id, active, "track activation changed");
        Ok(())
    }

    pub async fn get_track(&self, id: i64) -> Result<Track, TressaError> {
        let row = tracks::get_track(&self.db, id)
            .await?
            .ok_or_else(|| TressaError::not_found("track", id.to_string()))?;
        Track::from_row(&row)
    }

    /// All tracks, optionally only active ones. Rows that fail to parse are
    /// logged and left out.
    pub async fn list_tracks(&self, active_only: bool) -> Result<Vec<Track>, TressaError> {
        let rows = tracks::list_tracks(&self.db, active_only).await?;
        Ok(rows
            .iter()
            .filter_map(|row| match Track::from_row(row) {
                Ok(track) => Some(track),
                Err(e) => {
                    warn!(track = %row.name, error = %e, "stored track does not parse");
                    None
                }
            })
            .collect())
    }

    // --- Mappings ---

    pub async fn map_service(
        &self,
        service_id: &str,
        track_id: i64,
        points_multiplier: f64,
        requires_payment: bool,
    ) -> Result<TrackMapping, TressaError> {
        self.map(
            MappingKey::Service(service_id.to_string()),
            track_id,
            points_multiplier,
            requires_payment,
        )
        .await
    }

    pub async fn map_category(
        &self,
        category: &str,
        track_id: i64,
        points_multiplier: f64,
        requires_payment: bool,
    ) -> Result<TrackMapping, TressaError> {
        self.map(
            MappingKey::Category(category.to_string()),
            track_id,
            points_multiplier,
            requires_payment,
        )
        .await
    }

    async fn map(
        &self,
        key: MappingKey,
        track_id: i64,
        points_multiplier: f64,
        requires_payment: bool,
    ) -> Result<TrackMapping, TressaError> {
        let (MappingKey::Service(value) | MappingKey::Category(value)) = &key;
        if value.trim().is_empty() {
            return Err(TressaError::InvalidConfig(
                "mapping key must not be empty".to_string(),
            ));
        }
        multiplier_millis(points_multiplier)?;
        let mapping =
            mappings::upsert_mapping(&self.db, &key, track_id, points_multiplier, requires_payment)
                .await?;
        info!(key = ?mapping.key, track_id, points_multiplier, requires_payment, "mapping saved");
        Ok(mapping)
    }

    /// Remove a service mapping. Returns whether one existed.
    pub async fn unmap_service(&self, service_id: &str, track_id: i64) -> Result<bool, TressaError> {
        mappings::delete_mapping(&self.db, &MappingKey::Service(service_id.to_string()), track_id)
            .await
    }

    /// Remove a category mapping. Returns whether one existed.
    pub async fn unmap_category(&self, category: &str, track_id: i64) -> Result<bool, TressaError> {
        mappings::delete_mapping(&self.db, &MappingKey::Category(category.to_string()), track_id)
            .await
    }

    pub async fn list_service_mappings(&self) -> Result<Vec<TrackMapping>, TressaError> {
        Ok(mappings::list_mappings(&self.db)
            .await?
            .into_iter()
            .filter(|m| matches!(m.key, MappingKey::Service(_)))
            .collect())
    }

    pub async fn list_category_mappings(&self) -> Result<Vec<TrackMapping>, TressaError> {
        Ok(mappings::list_mappings(&self.db)
            .await?
            .into_iter()
            .filter(|m| matches!(m.key, MappingKey::Category(_)))
            .collect())
    }

    // --- Programme settings ---

    pub async fn get_settings(&self) -> Result<ProgrammeSettings, TressaError> {
        settings::get_settings(&self.db).await
    }

    pub async fn update_settings(&self, new: &ProgrammeSettings) -> Result<(), TressaError> {
        validate_settings(new)?;
        settings::update_settings(&self.db, new, self.clock.now()).await?;
        info!(
            rewards_enabled = new.rewards_enabled,
            spend_tracking_enabled = new.spend_tracking_enabled,
            referral_enabled = new.referral_enabled,
            "programme settings updated"
        );
        Ok(())
    }

    // --- Grants ---

    /// Issue a grant by hand, outside any track.
    pub async fn issue_manual_grant(
        &self,
        user_id: &str,
        reward_type: RewardType,
        value: f64,
        description: &str,
        expiry_days: i64,
    ) -> Result<RewardGrant, TressaError> {
        if user_id.trim().is_empty() {
            return Err(TressaError::InvalidConfig("user id must not be empty".to_string()));
        }
        validate_reward(reward_type, value)?;
        if expiry_days <= 0 {
            return Err(TressaError::InvalidConfig(format!(
                "expiry must be at least one day, got {expiry_days}"
            )));
        }
        let now = self.clock.now();
        let grant = RewardGrant::new_active(
            user_id,
            reward_type,
            value,
            MANUAL_SOURCE,
            description,
            now,
            expiry_after(now, expiry_days)?,
        );
        grants::insert_grant(&self.db, &grant).await?;
        crate::recording::record_grant_issued(MANUAL_SOURCE);
        info!(user_id, grant_id = %grant.id, reward_type = %reward_type, "manual grant issued");
        Ok(grant)
    }

    /// Revoke an active grant.
    pub async fn revoke_grant(&self, grant_id: &str) -> Result<RewardGrant, TressaError> {
        let id = grant_id.to_string();
        let result = self
            .db
            .write(move |conn| {
                let tx = begin_write(conn)?;
                let Some(grant) = grants::by_id(&tx, &id)? else {
                    return Ok(Err(TressaError::not_found("reward", id.clone())));
                };
                let refused = match grant.status {
                    GrantStatus::Active => None,
                    GrantStatus::Redeemed => Some(TressaError::AlreadyRedeemed {
                        id: grant.id.clone(),
                    }),
                    other => Some(TressaError::NotActive {
                        id: grant.id.clone(),
                        status: other.to_string(),
                    }),
                };
                if let Some(err) = refused {
                    return Ok(Err(err));
                }
                grants::close_active(&tx, &grant.id, GrantStatus::Revoked)?;
                tx.commit()?;
                Ok(Ok(RewardGrant {
                    status: GrantStatus::Revoked,
                    ..grant
                }))
            })
            .await?;
        let grant = result?;
        info!(grant_id = %grant.id, user_id = %grant.user_id, "reward grant revoked");
        Ok(grant)
    }
}

/// Check programme settings before they are stored.
pub fn validate_settings(s: &ProgrammeSettings) -> Result<(), TressaError> {
    if s.referral_min_booking_value < 0 {
        return Err(TressaError::InvalidConfig(
            "referral minimum booking value must not be negative".to_string(),
        ));
    }
    if s.referral_reward_expiry_days <= 0 {
        return Err(TressaError::InvalidConfig(
            "referral reward expiry must be at least one day".to_string(),
        ));
    }
    if s.spend_tracking_enabled && s.legacy_spend_track.trim().is_empty() {
        return Err(TressaError::InvalidConfig(
            "legacy spend track name must not be empty while spend tracking is on".to_string(),
        ));
    }
    validate_reward(s.referral_reward_type, s.referral_reward_value)
}
