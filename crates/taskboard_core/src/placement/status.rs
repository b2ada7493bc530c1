//! Column title to workflow status lookup.
//!
//! Titles are user-editable free text, so the status is resolved once when a
//! ticket is placed and stored on the ticket. Renaming a column later does not
//! touch tickets already in it.

use crate::model::ticket::WorkflowStatus;

/// Status for any title missing from [`STATUS_TABLE`].
pub const DEFAULT_STATUS: WorkflowStatus = WorkflowStatus::Backlog;

/// Case-sensitive exact-match table. Covers both the legacy column names and
/// the titles new boards are created with.
pub const STATUS_TABLE: &[(&str, WorkflowStatus)] = &[
    ("Backlog", WorkflowStatus::Backlog),
    ("Todo", WorkflowStatus::Todo),
    ("Doing", WorkflowStatus::InProgress),
    ("In Progress", WorkflowStatus::InProgress),
    ("Reviewing", WorkflowStatus::Review),
    ("Review", WorkflowStatus::Review),
    ("Finished", WorkflowStatus::Done),
    ("Done", WorkflowStatus::Done),
];

/// Resolves the workflow status implied by a column title.
pub fn resolve_status(column_title: &str) -> WorkflowStatus {
    STATUS_TABLE
        .iter()
        .find(|(title, _)| *title == column_title)
        .map_or(DEFAULT_STATUS, |(_, status)| *status)
}
