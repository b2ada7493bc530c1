//! Core domain logic for the taskboard.
//! Ticket ordering and status rules live here and nowhere else.

pub mod activity;
pub mod config;
pub mod db;
pub mod logging;
pub mod model;
pub mod placement;
pub mod repo;
pub mod service;

pub use activity::{
    ActivityAction, ActivityEvent, ActivityRecorder, LogActivityRecorder, SqliteActivityRecorder,
};
pub use config::{ConfigError, CoreConfig};
pub use db::{open_db, open_db_in_memory, open_db_with_timeout, DbError};
pub use logging::init_from_config;
pub use model::board::{ActorId, Board, BoardId, Column, ColumnId};
pub use model::ticket::{
    Priority, Ticket, TicketDraft, TicketId, TicketValidationError, WorkflowStatus,
};
pub use placement::engine::PlacementEngine;
pub use placement::{Consistency, Origin, Placed, PlacementError, PlacementResult};
pub use repo::board_repo::{BoardAccess, BoardRepository, SqliteBoardRepository};
pub use repo::error::{RepoError, RepoResult};
pub use repo::ticket_repo::{SqliteTicketStore, TicketStore, WriteMode};
pub use service::ticket_service::{TicketService, TicketServiceError, TicketServiceResult};

/// Minimal health-check API for early integration.
pub fn ping() -> &'static str {
    "pong"
}

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

#[cfg(test)]
mod tests {
    use super::{core_version, ping};

    #[test]
    fn ping_returns_pong() {
        assert_eq!(ping(), "pong");
    }

    #[test]
    fn version_is_not_empty() {
        assert!(!core_version().is_empty());
    }
}
