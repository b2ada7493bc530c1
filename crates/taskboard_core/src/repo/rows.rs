//! Row parsing and schema readiness checks shared by SQLite repositories.

use crate::db::migrations::latest_version;
use crate::model::board::Column;
use crate::model::ticket::{Priority, Ticket, WorkflowStatus};
use crate::repo::error::{RepoError, RepoResult};
use rusqlite::{Connection, Row};
use uuid::Uuid;

pub(crate) const TICKET_SELECT_SQL: &str = "SELECT
    ticket_uuid,
    board_uuid,
    column_uuid,
    title,
    description,
    priority,
    status,
    position,
    created_by,
    created_at,
    updated_at,
    deleted_at
FROM tickets";

pub(crate) const COLUMN_SELECT_SQL: &str = "SELECT
    column_uuid,
    board_uuid,
    title,
    position,
    created_at,
    updated_at
FROM columns";

/// Tables (and their columns) a repository needs before it can run.
pub(crate) struct TableRequirement {
    pub table: &'static str,
    pub columns: &'static [&'static str],
}

pub(crate) const TICKETS_TABLE: TableRequirement = TableRequirement {
    table: "tickets",
    columns: &[
        "ticket_uuid",
        "board_uuid",
        "column_uuid",
        "title",
        "priority",
        "status",
        "position",
        "deleted_at",
    ],
};

pub(crate) const COLUMNS_TABLE: TableRequirement = TableRequirement {
    table: "columns",
    columns: &["column_uuid", "board_uuid", "title", "position"],
};

pub(crate) const BOARDS_TABLE: TableRequirement = TableRequirement {
    table: "boards",
    columns: &["board_uuid", "title", "owner_id"],
};

pub(crate) const BOARD_MEMBERS_TABLE: TableRequirement = TableRequirement {
    table: "board_members",
    columns: &["board_uuid", "actor_id"],
};

pub(crate) const ACTIVITY_LOG_TABLE: TableRequirement = TableRequirement {
    table: "activity_log",
    columns: &[
        "action",
        "actor_id",
        "entity_uuid",
        "board_uuid",
        "metadata",
    ],
};

pub(crate) fn parse_ticket_row(row: &Row<'_>) -> RepoResult<Ticket> {
    let priority_text: String = row.get("priority")?;
    let priority = Priority::parse(&priority_text).ok_or_else(|| {
        RepoError::InvalidData(format!(
            "invalid priority `{priority_text}` in tickets.priority"
        ))
    })?;

    let status_text: String = row.get("status")?;
    let status = WorkflowStatus::parse(&status_text).ok_or_else(|| {
        RepoError::InvalidData(format!("invalid status `{status_text}` in tickets.status"))
    })?;

    let position: i64 = row.get("position")?;
    if position < 0 {
        return Err(RepoError::InvalidData(format!(
            "negative position `{position}` in tickets.position"
        )));
    }

    Ok(Ticket {
        ticket_uuid: parse_uuid_column(row, "ticket_uuid", "tickets.ticket_uuid")?,
        board_uuid: parse_uuid_column(row, "board_uuid", "tickets.board_uuid")?,
        column_uuid: parse_uuid_column(row, "column_uuid", "tickets.column_uuid")?,
        title: row.get("title")?,
        description: row.get("description")?,
        priority,
        status,
        position,
        created_by: row.get("created_by")?,
        created_at: row.get("created_at")?,
        updated_at: row.get("updated_at")?,
        deleted_at: row.get("deleted_at")?,
    })
}

pub(crate) fn parse_column_row(row: &Row<'_>) -> RepoResult<Column> {
    Ok(Column {
        column_uuid: parse_uuid_column(row, "column_uuid", "columns.column_uuid")?,
        board_uuid: parse_uuid_column(row, "board_uuid", "columns.board_uuid")?,
        title: row.get("title")?,
        position: row.get("position")?,
        created_at: row.get("created_at")?,
        updated_at: row.get("updated_at")?,
    })
}

pub(crate) fn parse_uuid_column(
    row: &Row<'_>,
    name: &str,
    column: &'static str,
) -> RepoResult<Uuid> {
    let value: String = row.get(name)?;
    parse_uuid(&value, column)
}

pub(crate) fn parse_uuid(value: &str, column: &'static str) -> RepoResult<Uuid> {
    Uuid::parse_str(value)
        .map_err(|_| RepoError::InvalidData(format!("invalid uuid `{value}` in {column}")))
}

/// Fails unless the connection is migrated and carries every required table.
pub(crate) fn ensure_connection_ready(
    conn: &Connection,
    requirements: &[TableRequirement],
) -> RepoResult<()> {
    let expected_version = latest_version();
    let actual_version: u32 = conn.query_row("PRAGMA user_version;", [], |row| row.get(0))?;
    if actual_version != expected_version {
        return Err(RepoError::UninitializedConnection {
            expected_version,
            actual_version,
        });
    }

    for requirement in requirements {
        if !table_exists(conn, requirement.table)? {
            return Err(RepoError::MissingRequiredTable(requirement.table));
        }
        for &column in requirement.columns {
            if !table_has_column(conn, requirement.table, column)? {
                return Err(RepoError::MissingRequiredColumn {
                    table: requirement.table,
                    column,
                });
            }
        }
    }

    Ok(())
}

fn table_exists(conn: &Connection, table: &str) -> RepoResult<bool> {
    let exists: i64 = conn.query_row(
        "SELECT EXISTS(
            SELECT 1
            FROM sqlite_master
            WHERE type = 'table' AND name = ?1
        );",
        [table],
        |row| row.get(0),
    )?;
    Ok(exists == 1)
}

fn table_has_column(conn: &Connection, table: &str, column: &str) -> RepoResult<bool> {
    let mut stmt = conn.prepare(&format!("PRAGMA table_info({table});"))?;
    let mut rows = stmt.query([])?;
    while let Some(row) = rows.next()? {
        let current: String = row.get(1)?;
        if current == column {
            return Ok(true);
        }
    }
    Ok(false)
}
