//! SQLite-backed turn log.
//!
//! Evidence collections are stored as JSON text. `NULL` columns round-trip
//! to `None` so that "absent" stays distinct from "found zero".

use std::sync::Arc;

use chrono::{TimeZone, Utc};
use serde::de::DeserializeOwned;
use serde::Serialize;
use uuid::Uuid;

use orgscout_core::error::ScoutError;
use orgscout_core::types::{GeoPoint, OrgInfo, Turn};

use crate::db::Database;

/// Repository for completed turns.
#[derive(Clone)]
pub struct TurnRepository {
    db: Arc<Database>,
}

impl TurnRepository {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    /// Store a completed turn.
    pub fn save(&self, turn: &Turn) -> Result<(), ScoutError> {
        let citations = serde_json::to_string(&turn.citations)?;
        let locations = to_json_opt(&turn.locations)?;
        let images = to_json_opt(&turn.images)?;
        let organizations = to_json_opt(&turn.organizations)?;

        self.db.with_conn(|conn| {
            conn.execute(
                "INSERT INTO turns (id, conversation_id, user_request, enriched_query, answer,
                                    citations, locations, images, organizations, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
                rusqlite::params![
                    turn.id.to_string(),
                    turn.conversation_id,
                    turn.user_request,
                    turn.enriched_query,
                    turn.answer,
                    citations,
                    locations,
                    images,
                    organizations,
                    turn.created_at.timestamp_millis(),
                ],
            )
            .map_err(|e| ScoutError::Storage(format!("Failed to save turn: {}", e)))?;
            Ok(())
        })
    }

    /// Turns of one conversation, oldest first.
    pub fn find_by_conversation(
        &self,
        conversation_id: &str,
        limit: u64,
    ) -> Result<Vec<Turn>, ScoutError> {
        self.db.with_conn(|conn| {
            let mut stmt = conn
                .prepare(
                    "SELECT id, conversation_id, user_request, enriched_query, answer,
                            citations, locations, images, organizations, created_at
                     FROM turns
                     WHERE conversation_id = ?1
                     ORDER BY created_at ASC, rowid ASC
                     LIMIT ?2",
                )
                .map_err(|e| ScoutError::Storage(e.to_string()))?;

            let rows = stmt
                .query_map(rusqlite::params![conversation_id, limit], |row| {
                    Ok(row_to_turn(row))
                })
                .map_err(|e| ScoutError::Storage(e.to_string()))?;

            let mut turns = Vec::new();
            for row in rows {
                let turn = row.map_err(|e| ScoutError::Storage(e.to_string()))??;
                turns.push(turn);
            }
            Ok(turns)
        })
    }

    /// Number of persisted turns for one conversation.
    pub fn count_for_conversation(&self, conversation_id: &str) -> Result<u64, ScoutError> {
        self.db.with_conn(|conn| {
            let count: i64 = conn
                .query_row(
                    "SELECT COUNT(*) FROM turns WHERE conversation_id = ?1",
                    rusqlite::params![conversation_id],
                    |row| row.get(0),
                )
                .map_err(|e| ScoutError::Storage(e.to_string()))?;
            Ok(count as u64)
        })
    }
}

impl std::fmt::Debug for TurnRepository {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TurnRepository").finish()
    }
}

// ============================================================================
// Row conversion
// ============================================================================

fn to_json_opt<T: Serialize>(value: &Option<T>) -> Result<Option<String>, ScoutError> {
    value
        .as_ref()
        .map(serde_json::to_string)
        .transpose()
        .map_err(ScoutError::from)
}

fn from_json_opt<T: DeserializeOwned>(raw: Option<String>) -> Result<Option<T>, ScoutError> {
    raw.map(|s| serde_json::from_str(&s))
        .transpose()
        .map_err(ScoutError::from)
}

fn row_to_turn(row: &rusqlite::Row<'_>) -> Result<Turn, ScoutError> {
    let get_err = |e: rusqlite::Error| ScoutError::Storage(e.to_string());

    let id_str: String = row.get(0).map_err(get_err)?;
    let conversation_id: String = row.get(1).map_err(get_err)?;
    let user_request: String = row.get(2).map_err(get_err)?;
    let enriched_query: String = row.get(3).map_err(get_err)?;
    let answer: String = row.get(4).map_err(get_err)?;
    let citations: String = row.get(5).map_err(get_err)?;
    let locations: Option<String> = row.get(6).map_err(get_err)?;
    let images: Option<String> = row.get(7).map_err(get_err)?;
    let organizations: Option<String> = row.get(8).map_err(get_err)?;
    let created_ms: i64 = row.get(9).map_err(get_err)?;

    Ok(Turn {
        id: Uuid::parse_str(&id_str)
            .map_err(|e| ScoutError::Storage(format!("Invalid UUID: {}", e)))?,
        conversation_id,
        user_request,
        enriched_query,
        answer,
        citations: serde_json::from_str(&citations)?,
        locations: from_json_opt::<Vec<GeoPoint>>(locations)?,
        images: from_json_opt::<Vec<String>>(images)?,
        organizations: from_json_opt::<Vec<OrgInfo>>(organizations)?,
        created_at: Utc
            .timestamp_millis_opt(created_ms)
            .single()
            .unwrap_or_default(),
    })
}
