// SPDX-FileCopyrightText: 2026 Tressa Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Which tracks a booking credits.
//!
//! Resolution is an ordered chain of strategies; the first strategy that
//! yields any mapping wins and later strategies are not consulted:
//!
//! 1. explicit service mappings
//! 2. category mappings
//! 3. the legacy flat spend track (only while spend tracking is enabled)

use rusqlite::Connection;
use tressa_storage::ProgrammeSettings;
use tressa_storage::queries::mappings;

use crate::issuance::BookingEvent;

/// How a resolved mapping names its track.
#[derive(Debug, Clone, PartialEq)]
pub enum TrackRef {
    Id(i64),
    Name(String),
}

/// A track the booking should credit, with the mapping's parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct Applicable {
    pub track: TrackRef,
    pub points_multiplier: f64,
    pub requires_payment: bool,
    /// Name of the strategy that produced this entry.
    pub source: &'static str,
}

/// One link in the resolution chain.
pub trait ResolutionStrategy: Send + Sync {
    fn name(&self) -> &'static str;

    fn resolve(
        &self,
        conn: &Connection,
        booking: &BookingEvent,
        settings: &ProgrammeSettings,
    ) -> rusqlite::Result<Vec<Applicable>>;
}

/// Mappings keyed on the booked service.
pub struct ServiceMappings;

impl ResolutionStrategy for ServiceMappings {
    fn name(&self) -> &'static str {
        "service"
    }

    fn resolve(
        &self,
        conn: &Connection,
        booking: &BookingEvent,
        _settings: &ProgrammeSettings,
    ) -> rusqlite::Result<Vec<Applicable>> {
        Ok(mappings::for_service(conn, &booking.service_id)?
            .into_iter()
            .map(|m| Applicable {
                track: TrackRef::Id(m.track_id),
                points_multiplier: m.points_multiplier,
                requires_payment: m.requires_payment,
                source: self.name(),
            })
            .collect())
    }
}

/// Mappings keyed on the service's category.
pub struct CategoryMappings;

impl ResolutionStrategy for CategoryMappings {
    fn name(&self) -> &'static str {
        "category"
    }

    fn resolve(
        &self,
        conn: &Connection,
        booking: &BookingEvent,
        _settings: &ProgrammeSettings,
    ) -> rusqlite::Result<Vec<Applicable>> {
        let Some(category) = booking.category.as_deref() else {
            return Ok(Vec::new());
        };
        Ok(mappings::for_category(conn, category)?
            .into_iter()
            .map(|m| Applicable {
                track: TrackRef::Id(m.track_id),
                points_multiplier: m.points_multiplier,
                requires_payment: m.requires_payment,
                source: self.name(),
            })
            .collect())
    }
}

/// The programme-wide spend track, credited with the paid amount.
pub struct LegacySpendTrack;

impl ResolutionStrategy for LegacySpendTrack {
    fn name(&self) -> &'static str {
        "legacy_spend"
    }

    fn resolve(
        &self,
        _conn: &Connection,
        _booking: &BookingEvent,
        settings: &ProgrammeSettings,
    ) -> rusqlite::Result<Vec<Applicable>> {
        if !settings.spend_tracking_enabled || settings.legacy_spend_track.is_empty() {
            return Ok(Vec::new());
        }
        Ok(vec![Applicable {
            track: TrackRef::Name(settings.legacy_spend_track.clone()),
            points_multiplier: 1.0,
            requires_payment: true,
            source: self.name(),
        }])
    }
}

static DEFAULT_CHAIN: [&dyn ResolutionStrategy; 3] =
    [&ServiceMappings, &CategoryMappings, &LegacySpendTrack];

/// The standard resolution order.
pub fn default_chain() -> &'static [&'static dyn ResolutionStrategy] {
    &DEFAULT_CHAIN
}

/// Walk `chain` and return the first non-empty resolution.
pub fn resolve(
    chain: &[&dyn ResolutionStrategy],
    conn: &Connection,
    booking: &BookingEvent,
    settings: &ProgrammeSettings,
) -> rusqlite::Result<Vec<Applicable>> {
    for strategy in chain {
        let found = strategy.resolve(conn, booking, settings)?;
        if !found.is_empty() {
            return Ok(found);
        }
    }
    Ok(Vec::new())
}
