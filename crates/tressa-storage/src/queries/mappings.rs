// SPDX-FileCopyrightText: 2026 Tressa Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Service and category mappings onto tracks.

use rusqlite::{Connection, Row, params};
use tressa_core::TressaError;

use crate::database::{Database, map_tr_err};
use crate::models::{MappingKey, TrackMapping};

fn table_for(key: &MappingKey) -> (&'static str, &'static str, &str) {
    match key {
        MappingKey::Service(id) => ("service_track_mappings", "service_id", id.as_str()),
        MappingKey::Category(name) => ("category_track_mappings", "category_name", name.as_str()),
    }
}

fn row_to_service(row: &Row<'_>) -> rusqlite::Result<TrackMapping> {
    Ok(TrackMapping {
        id: row.get(0)?,
        key: MappingKey::Service(row.get(1)?),
        track_id: row.get(2)?,
        points_multiplier: row.get(3)?,
        requires_payment: row.get(4)?,
    })
}

fn row_to_category(row: &Row<'_>) -> rusqlite::Result<TrackMapping> {
    Ok(TrackMapping {
        id: row.get(0)?,
        key: MappingKey::Category(row.get(1)?),
        track_id: row.get(2)?,
        points_multiplier: row.get(3)?,
        requires_payment: row.get(4)?,
    })
}

/// Explicit mappings for one service, in insertion order.
pub fn for_service(conn: &Connection, service_id: &str) -> rusqlite::Result<Vec<TrackMapping>> {
    let mut stmt = conn.prepare(
        "SELECT id, service_id, track_id, points_multiplier, requires_payment
         FROM service_track_mappings WHERE service_id = ?1 ORDER BY id",
    )?;
    let rows = stmt.query_map(params![service_id], row_to_service)?;
    rows.collect()
}

/// Category mappings for one category, in insertion order.
pub fn for_category(conn: &Connection, category: &str) -> rusqlite::Result<Vec<TrackMapping>> {
    let mut stmt = conn.prepare(
        "SELECT id, category_name, track_id, points_multiplier, requires_payment
         FROM category_track_mappings WHERE category_name = ?1 ORDER BY id",
    )?;
    let rows = stmt.query_map(params![category], row_to_category)?;
    rows.collect()
}

/// Create or replace the mapping from `key` to `track_id`.
///
/// The track must exist; an unknown track is `NotFound`.
pub async fn upsert_mapping(
    db: &Database,
    key: &MappingKey,
    track_id: i64,
    points_multiplier: f64,
    requires_payment: bool,
) -> Result<TrackMapping, TressaError> {
    let key = key.clone();
    let stored = db
        .write(move |conn| -> rusqlite::Result<Option<TrackMapping>> {
            let exists: bool = conn.query_row(
                "SELECT EXISTS(SELECT 1 FROM track_definitions WHERE id = ?1)",
                params![track_id],
                |row| row.get(0),
            )?;
            if !exists {
                return Ok(None);
            }
            let (table, column, value) = table_for(&key);
            let id: i64 = conn.query_row(
                &format!(
                    "INSERT INTO {table} ({column}, track_id, points_multiplier, requires_payment)
                     VALUES (?1, ?2, ?3, ?4)
                     ON CONFLICT ({column}, track_id) DO UPDATE SET
                        points_multiplier = excluded.points_multiplier,
                        requires_payment = excluded.requires_payment
                     RETURNING id"
                ),
                params![value, track_id, points_multiplier, requires_payment],
                |row| row.get(0),
            )?;
            Ok(Some(TrackMapping {
                id,
                key: key.clone(),
                track_id,
                points_multiplier,
                requires_payment,
            }))
        })
        .await?;
    stored.ok_or_else(|| TressaError::not_found("track", track_id.to_string()))
}

/// Remove a mapping. Returns whether a row was deleted.
pub async fn delete_mapping(
    db: &Database,
    key: &MappingKey,
    track_id: i64,
) -> Result<bool, TressaError> {
    let key = key.clone();
    let deleted = db
        .write(move |conn| -> rusqlite::Result<usize> {
            let (table, column, value) = table_for(&key);
            conn.execute(
                &format!("DELETE FROM {table} WHERE {column} = ?1 AND track_id = ?2"),
                params![value, track_id],
            )
        })
        .await?;
    Ok(deleted > 0)
}

/// Mappings for a single key.
pub async fn mappings_for(db: &Database, key: &MappingKey) -> Result<Vec<TrackMapping>, TressaError> {
    let key = key.clone();
    db.connection()
        .call(move |conn| -> rusqlite::Result<Vec<TrackMapping>> {
            match &key {
                MappingKey::Service(id) => for_service(conn, id),
                MappingKey::Category(name) => for_category(conn, name),
            }
        })
        .await
        .map_err(map_tr_err)
}

/// Every mapping, service mappings first.
pub async fn list_mappings(db: &Database) -> Result<Vec<TrackMapping>, TressaError> {
    db.connection()
        .call(|conn| -> rusqlite::Result<Vec<TrackMapping>> {
            let mut all = Vec::new();
            let mut stmt = conn.prepare(
                "SELECT id, service_id, track_id, points_multiplier, requires_payment
                 FROM service_track_mappings ORDER BY service_id, id",
            )?;
            for mapping in stmt.query_map([], row_to_service)? {
                all.push(mapping?);
            }
            let mut stmt = conn.prepare(
                "SELECT id, category_name, track_id, points_multiplier, requires_payment
                 FROM category_track_mappings ORDER BY category_name, id",
            )?;
            for mapping in stmt.query_map([], row_to_category)? {
                all.push(mapping?);
            }
            Ok(all)
        })
        .await
        .map_err(map_tr_err)
}
