//! Actor-scoped ticket use-case service.
//!
//! # Responsibility
//! - Check the actor may modify the board before any placement call.
//! - Delegate placement to [`PlacementEngine`] and report committed changes to
//!   the activity recorder.
//!
//! # Invariants
//! - A rejected actor causes no store mutation.
//! - Activity is recorded only after a successful placement; recorder
//!   failures are logged and never fail the call.
//! - A hard remove by an actor without hard-delete rights is applied as a
//!   soft delete.

use crate::activity::{ActivityAction, ActivityEvent, ActivityRecorder};
use crate::model::board::{ActorId, BoardId, ColumnId};
use crate::model::ticket::{Ticket, TicketDraft, TicketId};
use crate::placement::engine::PlacementEngine;
use crate::placement::{Placed, PlacementError};
use crate::repo::board_repo::BoardAccess;
use crate::repo::error::RepoError;
use crate::repo::ticket_repo::TicketStore;
use log::{info, warn};
use std::error::Error;
use std::fmt::{Display, Formatter};

/// Errors from ticket service operations.
#[derive(Debug)]
pub enum TicketServiceError {
    /// Actor is neither owner nor member of the board.
    Forbidden {
        actor_id: ActorId,
        board_uuid: BoardId,
    },
    /// Placement-level failure.
    Placement(PlacementError),
}

impl TicketServiceError {
    /// Whether the caller may retry after re-fetching the column.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Placement(err) if err.is_retryable())
    }
}

impl Display for TicketServiceError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Forbidden {
                actor_id,
                board_uuid,
            } => write!(f, "actor `{actor_id}` may not modify board {board_uuid}"),
            Self::Placement(err) => write!(f, "{err}"),
        }
    }
}

impl Error for TicketServiceError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Placement(err) => Some(err),
            Self::Forbidden { .. } => None,
        }
    }
}

impl From<PlacementError> for TicketServiceError {
    fn from(value: PlacementError) -> Self {
        Self::Placement(value)
    }
}

impl From<RepoError> for TicketServiceError {
    fn from(value: RepoError) -> Self {
        Self::Placement(value.into())
    }
}

pub type TicketServiceResult<T> = Result<T, TicketServiceError>;

/// Ticket service facade.
pub struct TicketService<S: TicketStore, A: BoardAccess, R: ActivityRecorder> {
    engine: PlacementEngine<S>,
    access: A,
    recorder: R,
}

impl<S: TicketStore, A: BoardAccess, R: ActivityRecorder> TicketService<S, A, R> {
    pub fn new(engine: PlacementEngine<S>, access: A, recorder: R) -> Self {
        Self {
            engine,
            access,
            recorder,
        }
    }

    pub fn engine(&self) -> &PlacementEngine<S> {
        &self.engine
    }

    /// Creates a ticket authored by `actor_id` at the end of `column_uuid`.
    pub fn create_ticket(
        &self,
        actor_id: &str,
        draft: TicketDraft,
        column_uuid: ColumnId,
    ) -> TicketServiceResult<Placed> {
        self.authorize(actor_id, draft.board_uuid)?;
        let draft = TicketDraft {
            created_by: actor_id.to_string(),
            ..draft
        };

        let placed = self.engine.insert(&draft, column_uuid)?;
        self.record(
            ActivityEvent::new(
                ActivityAction::TicketCreate,
                actor_id,
                placed.ticket.ticket_uuid,
                placed.ticket.board_uuid,
            )
            .with("column", column_uuid.to_string())
            .with("priority", placed.ticket.priority.as_str()),
        );
        Ok(placed)
    }

    /// Moves a ticket on behalf of `actor_id`.
    pub fn move_ticket(
        &self,
        actor_id: &str,
        ticket_uuid: TicketId,
        destination_column: ColumnId,
        destination_index: usize,
    ) -> TicketServiceResult<Placed> {
        let ticket = self.require_ticket(ticket_uuid, false)?;
        self.authorize(actor_id, ticket.board_uuid)?;

        let placed = self
            .engine
            .move_ticket(ticket_uuid, destination_column, destination_index)?;
        if let Some(origin) = placed.origin {
            let unchanged = origin.column_uuid == placed.ticket.column_uuid
                && origin.position == placed.ticket.position;
            if !unchanged {
                self.record(
                    ActivityEvent::new(
                        ActivityAction::TicketMove,
                        actor_id,
                        ticket_uuid,
                        placed.ticket.board_uuid,
                    )
                    .with("fromColumn", origin.column_uuid.to_string())
                    .with("toColumn", placed.ticket.column_uuid.to_string())
                    .with("oldIndex", origin.position)
                    .with("newIndex", placed.ticket.position),
                );
            }
        }
        Ok(placed)
    }

    /// Removes a ticket on behalf of `actor_id`.
    ///
    /// `hard` is honoured only for actors with hard-delete rights on the
    /// board; anyone else gets a soft delete.
    pub fn remove_ticket(
        &self,
        actor_id: &str,
        ticket_uuid: TicketId,
        hard: bool,
    ) -> TicketServiceResult<Ticket> {
        let ticket = self.require_ticket(ticket_uuid, hard)?;
        self.authorize(actor_id, ticket.board_uuid)?;

        let hard = hard && self.allow_hard_delete(actor_id, ticket.board_uuid)?;
        let removed = self.engine.remove(ticket_uuid, hard)?;
        self.record(
            ActivityEvent::new(
                ActivityAction::TicketDelete,
                actor_id,
                ticket_uuid,
                removed.board_uuid,
            )
            .with("isHardDelete", hard),
        );
        Ok(removed)
    }

    /// Lists live tickets of one column in display order.
    pub fn column_tickets(&self, column_uuid: ColumnId) -> TicketServiceResult<Vec<Ticket>> {
        self.engine.column_tickets(column_uuid).map_err(Into::into)
    }

    /// Re-derives ticket statuses from column titles on one board.
    pub fn resync_statuses(
        &self,
        actor_id: &str,
        board_uuid: BoardId,
    ) -> TicketServiceResult<usize> {
        self.authorize(actor_id, board_uuid)?;
        self.engine.resync_statuses(board_uuid).map_err(Into::into)
    }

    fn authorize(&self, actor_id: &str, board_uuid: BoardId) -> TicketServiceResult<()> {
        if !self.engine.store().board_exists(board_uuid)? {
            return Err(PlacementError::BoardNotFound(board_uuid).into());
        }
        if !self.access.can_modify(actor_id, board_uuid)? {
            warn!(
                "event=access_denied module=service status=error actor={} board={}",
                actor_id, board_uuid
            );
            return Err(TicketServiceError::Forbidden {
                actor_id: actor_id.to_string(),
                board_uuid,
            });
        }
        Ok(())
    }

    fn allow_hard_delete(&self, actor_id: &str, board_uuid: BoardId) -> TicketServiceResult<bool> {
        let allowed = self.access.can_hard_delete(actor_id, board_uuid)?;
        if !allowed {
            info!(
                "event=hard_delete_downgraded module=service status=ok actor={} board={}",
                actor_id, board_uuid
            );
        }
        Ok(allowed)
    }

    fn require_ticket(
        &self,
        ticket_uuid: TicketId,
        include_deleted: bool,
    ) -> TicketServiceResult<Ticket> {
        self.engine
            .store()
            .load_ticket(ticket_uuid, include_deleted)?
            .ok_or_else(|| PlacementError::TicketNotFound(ticket_uuid).into())
    }

    fn record(&self, event: ActivityEvent) {
        if let Err(err) = self.recorder.record(&event) {
            warn!(
                "event=activity_record module=service status=error action={} entity={} error={}",
                event.action.as_str(),
                event.entity_id,
                err
            );
        }
    }
}
