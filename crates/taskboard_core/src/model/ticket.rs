//! Ticket domain model.
//!
//! # Responsibility
//! - Define the ticket record the placement engine moves between columns.
//! - Validate user-provided draft fields before anything is persisted.
//!
//! # Invariants
//! - `ticket_uuid` is stable and never reused for another ticket.
//! - `position` is non-negative and dense among live tickets of one column.
//! - `status` is derived from the column title at placement time.
//! - `deleted_at` is the source of truth for tombstone state.

use crate::model::board::{ActorId, BoardId, ColumnId};
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};
use uuid::Uuid;

/// Stable ticket identifier.
pub type TicketId = Uuid;

pub const TITLE_MAX_CHARS: usize = 100;
pub const DESCRIPTION_MAX_CHARS: usize = 1000;

/// Workflow state derived from the column a ticket sits in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowStatus {
    Backlog,
    Todo,
    InProgress,
    Review,
    Done,
}

impl WorkflowStatus {
    /// Storage/wire spelling.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Backlog => "backlog",
            Self::Todo => "todo",
            Self::InProgress => "in_progress",
            Self::Review => "review",
            Self::Done => "done",
        }
    }

    /// Parses the storage spelling produced by [`WorkflowStatus::as_str`].
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "backlog" => Some(Self::Backlog),
            "todo" => Some(Self::Todo),
            "in_progress" => Some(Self::InProgress),
            "review" => Some(Self::Review),
            "done" => Some(Self::Done),
            _ => None,
        }
    }
}

impl Display for WorkflowStatus {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Ticket priority.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Low,
    #[default]
    Medium,
    High,
}

impl Priority {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
        }
    }

    /// Case-insensitive parse, matching how the HTTP layer accepts it.
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "low" => Some(Self::Low),
            "medium" => Some(Self::Medium),
            "high" => Some(Self::High),
            _ => None,
        }
    }
}

/// Validation failures for user-provided ticket fields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TicketValidationError {
    /// Title is blank after trim.
    EmptyTitle,
    /// Title exceeds [`TITLE_MAX_CHARS`].
    TitleTooLong { chars: usize },
    /// Description exceeds [`DESCRIPTION_MAX_CHARS`].
    DescriptionTooLong { chars: usize },
    /// Creator identity is blank.
    MissingCreator,
}

impl Display for TicketValidationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::EmptyTitle => write!(f, "ticket title must not be blank"),
            Self::TitleTooLong { chars } => write!(
                f,
                "ticket title has {chars} characters; at most {TITLE_MAX_CHARS} allowed"
            ),
            Self::DescriptionTooLong { chars } => write!(
                f,
                "ticket description has {chars} characters; at most {DESCRIPTION_MAX_CHARS} allowed"
            ),
            Self::MissingCreator => write!(f, "ticket creator must not be blank"),
        }
    }
}

impl Error for TicketValidationError {}

/// Caller-provided fields for a ticket that has not been placed yet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TicketDraft {
    pub board_uuid: BoardId,
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub priority: Priority,
    pub created_by: ActorId,
}

impl TicketDraft {
    /// Creates a draft with medium priority and empty description.
    pub fn new(
        board_uuid: BoardId,
        title: impl Into<String>,
        created_by: impl Into<ActorId>,
    ) -> Self {
        Self {
            board_uuid,
            title: title.into(),
            description: String::new(),
            priority: Priority::default(),
            created_by: created_by.into(),
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    /// Validates and returns a copy with the title trimmed.
    pub fn normalized(&self) -> Result<Self, TicketValidationError> {
        let title = self.title.trim();
        if title.is_empty() {
            return Err(TicketValidationError::EmptyTitle);
        }
        let title_chars = title.chars().count();
        if title_chars > TITLE_MAX_CHARS {
            return Err(TicketValidationError::TitleTooLong { chars: title_chars });
        }
        let description_chars = self.description.chars().count();
        if description_chars > DESCRIPTION_MAX_CHARS {
            return Err(TicketValidationError::DescriptionTooLong {
                chars: description_chars,
            });
        }
        if self.created_by.trim().is_empty() {
            return Err(TicketValidationError::MissingCreator);
        }

        Ok(Self {
            title: title.to_string(),
            ..self.clone()
        })
    }
}

/// Persisted ticket record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ticket {
    pub ticket_uuid: TicketId,
    pub board_uuid: BoardId,
    pub column_uuid: ColumnId,
    pub title: String,
    pub description: String,
    pub priority: Priority,
    pub status: WorkflowStatus,
    /// Zero-based rank among live tickets of `column_uuid`.
    pub position: i64,
    pub created_by: ActorId,
    /// Epoch ms.
    pub created_at: i64,
    /// Epoch ms.
    pub updated_at: i64,
    /// Epoch ms soft-delete tombstone.
    pub deleted_at: Option<i64>,
}

impl Ticket {
    /// Returns whether this ticket still takes part in column ordering.
    pub fn is_live(&self) -> bool {
        self.deleted_at.is_none()
    }

    /// The `(column, position, status)` triple the engine owns.
    pub fn placement(&self) -> (ColumnId, i64, WorkflowStatus) {
        (self.column_uuid, self.position, self.status)
    }
}
