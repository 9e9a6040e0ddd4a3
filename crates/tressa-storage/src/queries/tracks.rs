// SPDX-FileCopyrightText: 2026 Tressa Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Track definition CRUD.
//!
//! Milestone JSON is stored verbatim. Validation happens before these
//! functions are called; storage only enforces uniqueness of the name.

use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension, Row, params};
use tressa_core::TressaError;

use crate::database::{Database, map_tr_err};
use crate::models::{NewTrack, TrackRow, enum_column, timestamp_column, to_db_timestamp};

const TRACK_COLUMNS: &str = "id, name, display_name, track_type, milestones, reward_expiry_days,
                             is_active, created_at, updated_at";

fn row_to_track(row: &Row<'_>) -> rusqlite::Result<TrackRow> {
    Ok(TrackRow {
        id: row.get(0)?,
        name: row.get(1)?,
        display_name: row.get(2)?,
        track_type: enum_column(row, 3)?,
        milestones: row.get(4)?,
        reward_expiry_days: row.get(5)?,
        is_active: row.get(6)?,
        created_at: timestamp_column(row, 7)?,
        updated_at: timestamp_column(row, 8)?,
    })
}

fn is_unique_violation(e: &rusqlite::Error) -> bool {
    matches!(
        e,
        rusqlite::Error::SqliteFailure(f, _) if f.code == rusqlite::ErrorCode::ConstraintViolation
    )
}

/// Look up a track inside an open connection or transaction.
pub fn by_id(conn: &Connection, id: i64) -> rusqlite::Result<Option<TrackRow>> {
    conn.query_row(
        &format!("SELECT {TRACK_COLUMNS} FROM track_definitions WHERE id = ?1"),
        params![id],
        row_to_track,
    )
    .optional()
}

/// Look up a track by its unique internal name.
pub fn by_name(conn: &Connection, name: &str) -> rusqlite::Result<Option<TrackRow>> {
    conn.query_row(
        &format!("SELECT {TRACK_COLUMNS} FROM track_definitions WHERE name = ?1"),
        params![name],
        row_to_track,
    )
    .optional()
}

/// Insert a new track. A duplicate name is `InvalidConfig`.
pub async fn insert_track(
    db: &Database,
    track: &NewTrack,
    now: DateTime<Utc>,
) -> Result<TrackRow, TressaError> {
    let track = track.clone();
    let name = track.name.clone();
    let ts = to_db_timestamp(&now);
    let inserted = db
        .write(move |conn| -> rusqlite::Result<Option<TrackRow>> {
            let result = conn.execute(
                "INSERT INTO track_definitions
                    (name, display_name, track_type, milestones, reward_expiry_days, is_active,
                     created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?7)",
                params![
                    track.name,
                    track.display_name,
                    track.track_type.to_string(),
                    track.milestones,
                    track.reward_expiry_days,
                    track.is_active,
                    ts,
                ],
            );
            match result {
                Ok(_) => by_id(conn, conn.last_insert_rowid()),
                Err(e) if is_unique_violation(&e) => Ok(None),
                Err(e) => Err(e),
            }
        })
        .await?;
    inserted.ok_or_else(|| TressaError::InvalidConfig(format!("track `{name}` already exists")))
}

/// Replace every editable field of an existing track.
///
/// The internal `name` keys the Progress Ledger and cannot be changed:
/// `track.name` must match the stored name or the update is refused.
pub async fn update_track(
    db: &Database,
    id: i64,
    track: &NewTrack,
    now: DateTime<Utc>,
) -> Result<TrackRow, TressaError> {
    let track = track.clone();
    let name = track.name.clone();
    let ts = to_db_timestamp(&now);
    let (updated, stored) = db
        .write(move |conn| -> rusqlite::Result<(Option<TrackRow>, Option<TrackRow>)> {
            let changed = conn.execute(
                "UPDATE track_definitions SET display_name = ?3, track_type = ?4,
                    milestones = ?5, reward_expiry_days = ?6, is_active = ?7, updated_at = ?8
                 WHERE id = ?1 AND name = ?2",
                params![
                    id,
                    track.name,
                    track.display_name,
                    track.track_type.to_string(),
                    track.milestones,
                    track.reward_expiry_days,
                    track.is_active,
                    ts,
                ],
            )?;
            let row = by_id(conn, id)?;
            Ok(if changed == 1 { (row, None) } else { (None, row) })
        })
        .await?;
    match (updated, stored) {
        (Some(row), _) => Ok(row),
        (None, Some(existing)) => Err(TressaError::InvalidConfig(format!(
            "track name cannot be changed from `{}` to `{name}`",
            existing.name
        ))),
        (None, None) => Err(TressaError::not_found("track", id.to_string())),
    }
}

/// Toggle whether a track accrues progress.
pub async fn set_active(
    db: &Database,
    id: i64,
    active: bool,
    now: DateTime<Utc>,
) -> Result<(), TressaError> {
    let ts = to_db_timestamp(&now);
    let changed = db
        .write(move |conn| -> rusqlite::Result<usize> {
            conn.execute(
                "UPDATE track_definitions SET is_active = ?2, updated_at = ?3 WHERE id = ?1",
                params![id, active, ts],
            )
        })
        .await?;
    if changed == 0 {
        return Err(TressaError::not_found("track", id.to_string()));
    }
    Ok(())
}

/// Get a track by id.
pub async fn get_track(db: &Database, id: i64) -> Result<Option<TrackRow>, TressaError> {
    db.connection()
        .call(move |conn| -> rusqlite::Result<Option<TrackRow>> { by_id(conn, id) })
        .await
        .map_err(map_tr_err)
}

/// Get a track by name.
pub async fn get_track_by_name(db: &Database, name: &str) -> Result<Option<TrackRow>, TressaError> {
    let name = name.to_string();
    db.connection()
        .call(move |conn| -> rusqlite::Result<Option<TrackRow>> { by_name(conn, &name) })
        .await
        .map_err(map_tr_err)
}

/// Get several tracks by id, skipping unknown ids. Order follows `ids`.
pub async fn get_tracks(db: &Database, ids: &[i64]) -> Result<Vec<TrackRow>, TressaError> {
    let ids = ids.to_vec();
    db.connection()
        .call(move |conn| -> rusqlite::Result<Vec<TrackRow>> {
            let mut tracks = Vec::with_capacity(ids.len());
            for id in ids {
                if let Some(track) = by_id(conn, id)? {
                    tracks.push(track);
                }
            }
            Ok(tracks)
        })
        .await
        .map_err(map_tr_err)
}

/// List tracks ordered by id, optionally only active ones.
pub async fn list_tracks(db: &Database, active_only: bool) -> Result<Vec<TrackRow>, TressaError> {
    db.connection()
        .call(move |conn| -> rusqlite::Result<Vec<TrackRow>> {
            let sql = if active_only {
                format!("SELECT {TRACK_COLUMNS} FROM track_definitions WHERE is_active = 1 ORDER BY id")
            } else {
                format!("SELECT {TRACK_COLUMNS} FROM track_definitions ORDER BY id")
            };
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt.query_map([], row_to_track)?;
            rows.collect()
        })
        .await
        .map_err(map_tr_err)
}
