//! Ticket placement: ordering, status derivation and the engine tying them
//! to a ticket store.
//!
//! # Responsibility
//! - `index`: pure position arithmetic over a column's live ordering.
//! - `status`: column title to workflow status lookup.
//! - `engine`: insert, move and remove operations with conflict retry and the
//!   degraded sequential fallback.
//!
//! # Invariants
//! - Live positions of every column stay dense after each atomic commit.
//! - A failed operation in atomic mode leaves no partial mutation behind.

pub mod engine;
pub mod index;
pub mod status;

use crate::model::board::{BoardId, ColumnId};
use crate::model::ticket::{Ticket, TicketId, TicketValidationError};
use crate::repo::error::RepoError;
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};

/// How strongly a committed placement is known to be consistent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Consistency {
    /// Every write committed as one unit; column density is guaranteed.
    Atomic,
    /// Writes were applied one by one and the mover read back as intended.
    /// Neighbouring positions are not verified.
    Degraded,
}

impl Consistency {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Atomic => "atomic",
            Self::Degraded => "degraded",
        }
    }
}

/// Where a moved ticket sat before the move.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Origin {
    pub column_uuid: ColumnId,
    pub position: i64,
}

/// Successful placement result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Placed {
    pub ticket: Ticket,
    pub consistency: Consistency,
    /// `None` for a newly inserted ticket.
    pub origin: Option<Origin>,
}

pub type PlacementResult<T> = Result<T, PlacementError>;

/// Errors from placement engine operations.
#[derive(Debug)]
pub enum PlacementError {
    /// Ticket does not exist or is soft-deleted.
    TicketNotFound(TicketId),
    /// Column does not exist.
    ColumnNotFound(ColumnId),
    /// Board does not exist.
    BoardNotFound(BoardId),
    /// Destination column is on a different board than the ticket.
    InvalidTarget {
        board_uuid: BoardId,
        column_uuid: ColumnId,
    },
    /// Draft fields failed validation.
    InvalidDraft(TicketValidationError),
    /// The atomic unit could not be committed, also after one retry against
    /// a freshly loaded ordering. Re-fetch the column and retry.
    ConcurrencyConflict { column_uuids: Vec<ColumnId> },
    /// The sequential fallback failed part-way or read back a different
    /// placement. Board state may be stale; do not retry blindly.
    DegradedConsistency {
        ticket_uuid: TicketId,
        applied: usize,
        total: usize,
        reason: String,
    },
    /// Store-level failure with no mutation applied.
    Store(RepoError),
}

impl PlacementError {
    /// Whether the caller may retry after re-fetching the column ordering.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::ConcurrencyConflict { .. })
    }

    /// Whether board state is unchanged by the failed call.
    pub fn left_state_untouched(&self) -> bool {
        !matches!(self, Self::DegradedConsistency { .. })
    }
}

impl Display for PlacementError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::TicketNotFound(id) => write!(f, "ticket not found: {id}"),
            Self::ColumnNotFound(id) => write!(f, "column not found: {id}"),
            Self::BoardNotFound(id) => write!(f, "board not found: {id}"),
            Self::InvalidTarget {
                board_uuid,
                column_uuid,
            } => write!(
                f,
                "column {column_uuid} does not belong to board {board_uuid}"
            ),
            Self::InvalidDraft(err) => write!(f, "{err}"),
            Self::ConcurrencyConflict { column_uuids } => write!(
                f,
                "placement conflicted with a concurrent change in {} column(s); reload and retry",
                column_uuids.len()
            ),
            Self::DegradedConsistency {
                ticket_uuid,
                applied,
                total,
                reason,
            } => write!(
                f,
                "degraded placement of ticket {ticket_uuid} applied {applied}/{total} writes: {reason}"
            ),
            Self::Store(err) => write!(f, "{err}"),
        }
    }
}

impl Error for PlacementError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::InvalidDraft(err) => Some(err),
            Self::Store(err) => Some(err),
            _ => None,
        }
    }
}

impl From<RepoError> for PlacementError {
    fn from(value: RepoError) -> Self {
        match value {
            RepoError::Conflict { column_uuids, .. } => Self::ConcurrencyConflict { column_uuids },
            other => Self::Store(other),
        }
    }
}

impl From<TicketValidationError> for PlacementError {
    fn from(value: TicketValidationError) -> Self {
        Self::InvalidDraft(value)
    }
}
