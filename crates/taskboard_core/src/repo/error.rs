//! Error type shared by the board, ticket and activity repositories.

use crate::db::DbError;
use crate::model::board::ColumnId;
use std::error::Error;
use std::fmt::{Display, Formatter};
use uuid::Uuid;

pub type RepoResult<T> = Result<T, RepoError>;

/// Repository error for persistence and query operations.
#[derive(Debug)]
pub enum RepoError {
    /// Underlying SQLite/bootstrap error.
    Db(DbError),
    /// Rows no longer match the snapshot a mutation set was planned from,
    /// or another writer held the database past the busy timeout.
    Conflict {
        column_uuids: Vec<ColumnId>,
        detail: String,
    },
    /// Store is configured without multi-row atomic writes.
    AtomicWritesUnsupported,
    /// Target row does not exist (or is soft-deleted where that matters).
    NotFound { entity: &'static str, id: Uuid },
    /// Caller input rejected before touching storage.
    InvalidInput(String),
    /// Connection schema is not at the expected migrated version.
    UninitializedConnection {
        expected_version: u32,
        actual_version: u32,
    },
    /// Required table is missing.
    MissingRequiredTable(&'static str),
    /// Required column is missing from expected table.
    MissingRequiredColumn {
        table: &'static str,
        column: &'static str,
    },
    /// Persisted data cannot be converted to a valid read model.
    InvalidData(String),
}

impl RepoError {
    pub(crate) fn conflict(column_uuids: Vec<ColumnId>, detail: impl Into<String>) -> Self {
        Self::Conflict {
            column_uuids,
            detail: detail.into(),
        }
    }

    /// Maps lock contention onto a conflict; other errors pass through.
    pub(crate) fn busy_as_conflict(self, column_uuids: &[ColumnId]) -> Self {
        match self {
            Self::Db(err) if err.is_busy() => {
                Self::conflict(column_uuids.to_vec(), format!("database busy: {err}"))
            }
            other => other,
        }
    }
}

impl Display for RepoError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Db(err) => write!(f, "{err}"),
            Self::Conflict {
                column_uuids,
                detail,
            } => write!(
                f,
                "concurrent modification of {} column(s): {detail}",
                column_uuids.len()
            ),
            Self::AtomicWritesUnsupported => {
                write!(f, "store does not support atomic multi-row writes")
            }
            Self::NotFound { entity, id } => write!(f, "{entity} not found: {id}"),
            Self::InvalidInput(message) => write!(f, "invalid input: {message}"),
            Self::UninitializedConnection {
                expected_version,
                actual_version,
            } => write!(
                f,
                "repository requires schema version {expected_version}, got {actual_version}"
            ),
            Self::MissingRequiredTable(table) => {
                write!(f, "repository requires table `{table}`")
            }
            Self::MissingRequiredColumn { table, column } => write!(
                f,
                "repository requires column `{column}` in table `{table}`"
            ),
            Self::InvalidData(message) => write!(f, "invalid persisted data: {message}"),
        }
    }
}

impl Error for RepoError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Db(err) => Some(err),
            _ => None,
        }
    }
}

impl From<DbError> for RepoError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

impl From<rusqlite::Error> for RepoError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Db(DbError::Sqlite(value))
    }
}
