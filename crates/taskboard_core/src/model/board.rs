//! Board and column records.
//!
//! Boards own columns; columns own tickets. Column titles are free text and
//! only feed the status resolver.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Stable board identifier.
pub type BoardId = Uuid;

/// Stable column identifier.
pub type ColumnId = Uuid;

/// Opaque actor identity supplied by the authentication layer.
pub type ActorId = String;

/// Column titles a freshly created board starts with.
pub const DEFAULT_COLUMN_TITLES: [&str; 5] = ["Backlog", "Todo", "In Progress", "Review", "Done"];

/// Board read model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Board {
    pub board_uuid: BoardId,
    pub title: String,
    pub description: String,
    /// Actor that created the board. Always allowed to modify it.
    pub owner_id: ActorId,
    /// Additional actors allowed to modify tickets on this board.
    pub members: Vec<ActorId>,
    pub created_at: i64,
    pub updated_at: i64,
}

impl Board {
    /// Returns whether `actor_id` is the owner or a member.
    pub fn is_participant(&self, actor_id: &str) -> bool {
        self.owner_id == actor_id || self.members.iter().any(|member| member == actor_id)
    }
}

/// Column read model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Column {
    pub column_uuid: ColumnId,
    pub board_uuid: BoardId,
    /// User-facing label. Input to status resolution.
    pub title: String,
    /// Display order of the column within its board.
    pub position: i64,
    pub created_at: i64,
    pub updated_at: i64,
}
