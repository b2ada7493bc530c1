//! Activity recorder persisting events to the `activity_log` table.

use super::{ActivityAction, ActivityEvent, ActivityRecorder};
use crate::model::board::BoardId;
use crate::repo::error::{RepoError, RepoResult};
use crate::repo::rows::{ensure_connection_ready, parse_uuid_column, ACTIVITY_LOG_TABLE};
use rusqlite::{params, Connection};
use serde_json::{Map, Value};

/// SQLite-backed activity recorder.
pub struct SqliteActivityRecorder<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteActivityRecorder<'conn> {
    pub fn try_new(conn: &'conn Connection) -> RepoResult<Self> {
        ensure_connection_ready(conn, &[ACTIVITY_LOG_TABLE])?;
        Ok(Self { conn })
    }

    /// Newest-first events of one board.
    pub fn list_for_board(
        &self,
        board_uuid: BoardId,
        limit: u32,
    ) -> RepoResult<Vec<ActivityEvent>> {
        let mut stmt = self.conn.prepare(
            "SELECT action, actor_id, entity_uuid, board_uuid, metadata
             FROM activity_log
             WHERE board_uuid = ?1
             ORDER BY created_at DESC, id DESC
             LIMIT ?2;",
        )?;
        let mut rows = stmt.query(params![board_uuid.to_string(), i64::from(limit)])?;
        let mut events = Vec::new();
        while let Some(row) = rows.next()? {
            let action_text: String = row.get("action")?;
            let action = ActivityAction::parse(&action_text).ok_or_else(|| {
                RepoError::InvalidData(format!(
                    "invalid action `{action_text}` in activity_log.action"
                ))
            })?;
            let metadata_text: String = row.get("metadata")?;
            let metadata: Map<String, Value> =
                serde_json::from_str(&metadata_text).map_err(|err| {
                    RepoError::InvalidData(format!("invalid activity_log.metadata: {err}"))
                })?;

            events.push(ActivityEvent {
                action,
                actor_id: row.get("actor_id")?,
                entity_id: parse_uuid_column(row, "entity_uuid", "activity_log.entity_uuid")?,
                board_id: parse_uuid_column(row, "board_uuid", "activity_log.board_uuid")?,
                metadata,
            });
        }
        Ok(events)
    }
}

impl ActivityRecorder for SqliteActivityRecorder<'_> {
    fn record(&self, event: &ActivityEvent) -> RepoResult<()> {
        let metadata = serde_json::to_string(&event.metadata)
            .map_err(|err| RepoError::InvalidInput(format!("unserializable metadata: {err}")))?;
        self.conn.execute(
            "INSERT INTO activity_log (action, actor_id, entity_type, entity_uuid, board_uuid, metadata)
             VALUES (?1, ?2, 'ticket', ?3, ?4, ?5);",
            params![
                event.action.as_str(),
                event.actor_id.as_str(),
                event.entity_id.to_string(),
                event.board_id.to_string(),
                metadata,
            ],
        )?;
        Ok(())
    }
}
