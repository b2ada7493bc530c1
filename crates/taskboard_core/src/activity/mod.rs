//! Activity recording for placement events.
//!
//! # Responsibility
//! - Describe what happened to a ticket in an audit-friendly event.
//! - Hand events to a recorder after the placement has committed.
//!
//! # Invariants
//! - Recording is best-effort: a recorder error never undoes a placement.
//! - Recorders never feed anything back into the placement engine.

mod sqlite;

pub use sqlite::SqliteActivityRecorder;

use crate::model::board::{ActorId, BoardId};
use crate::repo::error::RepoResult;
use log::info;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

/// Audited ticket action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ActivityAction {
    #[serde(rename = "ticket.create")]
    TicketCreate,
    #[serde(rename = "ticket.move")]
    TicketMove,
    #[serde(rename = "ticket.delete")]
    TicketDelete,
}

impl ActivityAction {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::TicketCreate => "ticket.create",
            Self::TicketMove => "ticket.move",
            Self::TicketDelete => "ticket.delete",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "ticket.create" => Some(Self::TicketCreate),
            "ticket.move" => Some(Self::TicketMove),
            "ticket.delete" => Some(Self::TicketDelete),
            _ => None,
        }
    }
}

/// One audit event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivityEvent {
    pub action: ActivityAction,
    pub actor_id: ActorId,
    pub entity_id: Uuid,
    pub board_id: BoardId,
    /// Free-form action details, e.g. `fromColumn`/`toColumn` for moves.
    pub metadata: Map<String, Value>,
}

impl ActivityEvent {
    pub fn new(
        action: ActivityAction,
        actor_id: impl Into<ActorId>,
        entity_id: Uuid,
        board_id: BoardId,
    ) -> Self {
        Self {
            action,
            actor_id: actor_id.into(),
            entity_id,
            board_id,
            metadata: Map::new(),
        }
    }

    /// Adds one metadata entry.
    pub fn with(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.metadata.insert(key.to_string(), value.into());
        self
    }
}

/// Sink for placement audit events.
pub trait ActivityRecorder {
    fn record(&self, event: &ActivityEvent) -> RepoResult<()>;
}

impl<T: ActivityRecorder + ?Sized> ActivityRecorder for &T {
    fn record(&self, event: &ActivityEvent) -> RepoResult<()> {
        (**self).record(event)
    }
}

/// Recorder that only writes the event to the log.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogActivityRecorder;

impl ActivityRecorder for LogActivityRecorder {
    fn record(&self, event: &ActivityEvent) -> RepoResult<()> {
        info!(
            "event=activity module=activity status=ok action={} actor={} entity={} board={}",
            event.action.as_str(),
            event.actor_id,
            event.entity_id,
            event.board_id
        );
        Ok(())
    }
}
