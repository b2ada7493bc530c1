//! Board/column repository and the board authorization check.
//!
//! # Responsibility
//! - Create boards (with their default columns), members and columns.
//! - Answer "may this actor modify tickets on this board".
//!
//! # Invariants
//! - A new column is appended: `position = current column count`.
//! - Deleting a board cascades to its columns and tickets (FK cascade).
//! - The owner is always allowed to modify; members are allowed too.
//! - Only the owner may erase tickets permanently.

use crate::model::board::{
    ActorId, Board, BoardId, Column, ColumnId, DEFAULT_COLUMN_TITLES,
};
use crate::repo::error::{RepoError, RepoResult};
use crate::repo::rows::{
    ensure_connection_ready, parse_column_row, parse_uuid_column, BOARDS_TABLE,
    BOARD_MEMBERS_TABLE, COLUMNS_TABLE, COLUMN_SELECT_SQL,
};
use log::info;
use rusqlite::{params, Connection, Transaction, TransactionBehavior};
use uuid::Uuid;

/// Authorization collaborator consulted before any placement call.
pub trait BoardAccess {
    /// Returns whether `actor_id` may modify tickets on `board_uuid`.
    ///
    /// Unknown boards report `Ok(false)`.
    fn can_modify(&self, actor_id: &str, board_uuid: BoardId) -> RepoResult<bool>;

    /// Returns whether `actor_id` may erase tickets of `board_uuid` for good.
    ///
    /// Callers without this right get a soft delete instead.
    fn can_hard_delete(&self, actor_id: &str, board_uuid: BoardId) -> RepoResult<bool>;
}

impl<T: BoardAccess + ?Sized> BoardAccess for &T {
    fn can_modify(&self, actor_id: &str, board_uuid: BoardId) -> RepoResult<bool> {
        (**self).can_modify(actor_id, board_uuid)
    }

    fn can_hard_delete(&self, actor_id: &str, board_uuid: BoardId) -> RepoResult<bool> {
        (**self).can_hard_delete(actor_id, board_uuid)
    }
}

/// Repository interface for board and column records.
pub trait BoardRepository {
    /// Creates a board owned by `owner_id` with the default columns.
    fn create_board(&self, title: &str, description: &str, owner_id: &str) -> RepoResult<Board>;
    /// Loads one board with its member list.
    fn get_board(&self, board_uuid: BoardId) -> RepoResult<Option<Board>>;
    /// Adds one member. Adding an existing member is a no-op.
    fn add_member(&self, board_uuid: BoardId, actor_id: &str) -> RepoResult<()>;
    /// Appends one column to a board.
    fn add_column(&self, board_uuid: BoardId, title: &str) -> RepoResult<Column>;
    /// Renames one column. Tickets already in it keep their status.
    fn rename_column(&self, column_uuid: ColumnId, title: &str) -> RepoResult<()>;
    /// Loads one column.
    fn get_column(&self, column_uuid: ColumnId) -> RepoResult<Option<Column>>;
    /// Lists a board's columns in display order.
    fn list_columns(&self, board_uuid: BoardId) -> RepoResult<Vec<Column>>;
    /// Deletes a board with all its columns and tickets.
    fn delete_board(&self, board_uuid: BoardId) -> RepoResult<()>;
}

/// SQLite-backed board repository.
pub struct SqliteBoardRepository<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteBoardRepository<'conn> {
    /// Creates repository from migrated connection.
    pub fn try_new(conn: &'conn Connection) -> RepoResult<Self> {
        ensure_connection_ready(conn, &[BOARDS_TABLE, BOARD_MEMBERS_TABLE, COLUMNS_TABLE])?;
        Ok(Self { conn })
    }
}

impl BoardRepository for SqliteBoardRepository<'_> {
    fn create_board(&self, title: &str, description: &str, owner_id: &str) -> RepoResult<Board> {
        let title = normalize_title(title, "board title")?;
        if owner_id.trim().is_empty() {
            return Err(RepoError::InvalidInput(
                "board owner must not be blank".to_string(),
            ));
        }

        let board_uuid = Uuid::new_v4();
        let tx = Transaction::new_unchecked(self.conn, TransactionBehavior::Immediate)?;
        tx.execute(
            "INSERT INTO boards (board_uuid, title, description, owner_id)
             VALUES (?1, ?2, ?3, ?4);",
            params![board_uuid.to_string(), title, description, owner_id],
        )?;
        for (position, column_title) in DEFAULT_COLUMN_TITLES.iter().enumerate() {
            tx.execute(
                "INSERT INTO columns (column_uuid, board_uuid, title, position)
                 VALUES (?1, ?2, ?3, ?4);",
                params![
                    Uuid::new_v4().to_string(),
                    board_uuid.to_string(),
                    column_title,
                    position as i64,
                ],
            )?;
        }
        tx.commit()?;

        info!(
            "event=board_create module=repo status=ok board={} columns={}",
            board_uuid,
            DEFAULT_COLUMN_TITLES.len()
        );
        self.get_board(board_uuid)?.ok_or(RepoError::NotFound {
            entity: "board",
            id: board_uuid,
        })
    }

    fn get_board(&self, board_uuid: BoardId) -> RepoResult<Option<Board>> {
        let mut stmt = self.conn.prepare(
            "SELECT board_uuid, title, description, owner_id, created_at, updated_at
             FROM boards
             WHERE board_uuid = ?1;",
        )?;
        let mut rows = stmt.query([board_uuid.to_string()])?;
        let Some(row) = rows.next()? else {
            return Ok(None);
        };

        let mut board = Board {
            board_uuid: parse_uuid_column(row, "board_uuid", "boards.board_uuid")?,
            title: row.get("title")?,
            description: row.get("description")?,
            owner_id: row.get("owner_id")?,
            members: Vec::new(),
            created_at: row.get("created_at")?,
            updated_at: row.get("updated_at")?,
        };
        board.members = list_members(self.conn, board_uuid)?;
        Ok(Some(board))
    }

    fn add_member(&self, board_uuid: BoardId, actor_id: &str) -> RepoResult<()> {
        if actor_id.trim().is_empty() {
            return Err(RepoError::InvalidInput(
                "member id must not be blank".to_string(),
            ));
        }
        ensure_board_exists(self.conn, board_uuid)?;
        self.conn.execute(
            "INSERT OR IGNORE INTO board_members (board_uuid, actor_id) VALUES (?1, ?2);",
            params![board_uuid.to_string(), actor_id],
        )?;
        Ok(())
    }

    fn add_column(&self, board_uuid: BoardId, title: &str) -> RepoResult<Column> {
        let title = normalize_title(title, "column title")?;
        let column_uuid = Uuid::new_v4();

        let tx = Transaction::new_unchecked(self.conn, TransactionBehavior::Immediate)?;
        ensure_board_exists(&tx, board_uuid)?;
        let position: i64 = tx.query_row(
            "SELECT COUNT(*) FROM columns WHERE board_uuid = ?1;",
            [board_uuid.to_string()],
            |row| row.get(0),
        )?;
        tx.execute(
            "INSERT INTO columns (column_uuid, board_uuid, title, position)
             VALUES (?1, ?2, ?3, ?4);",
            params![column_uuid.to_string(), board_uuid.to_string(), title, position],
        )?;
        tx.commit()?;

        self.get_column(column_uuid)?.ok_or(RepoError::NotFound {
            entity: "column",
            id: column_uuid,
        })
    }

    fn rename_column(&self, column_uuid: ColumnId, title: &str) -> RepoResult<()> {
        let title = normalize_title(title, "column title")?;
        let changed = self.conn.execute(
            "UPDATE columns
             SET title = ?2,
                 updated_at = (CAST(unixepoch('subsec') * 1000 AS INTEGER))
             WHERE column_uuid = ?1;",
            params![column_uuid.to_string(), title],
        )?;
        if changed == 0 {
            return Err(RepoError::NotFound {
                entity: "column",
                id: column_uuid,
            });
        }
        Ok(())
    }

    fn get_column(&self, column_uuid: ColumnId) -> RepoResult<Option<Column>> {
        let mut stmt = self
            .conn
            .prepare(&format!("{COLUMN_SELECT_SQL} WHERE column_uuid = ?1;"))?;
        let mut rows = stmt.query([column_uuid.to_string()])?;
        if let Some(row) = rows.next()? {
            return Ok(Some(parse_column_row(row)?));
        }
        Ok(None)
    }

    fn list_columns(&self, board_uuid: BoardId) -> RepoResult<Vec<Column>> {
        let mut stmt = self.conn.prepare(&format!(
            "{COLUMN_SELECT_SQL}
             WHERE board_uuid = ?1
             ORDER BY position ASC, column_uuid ASC;"
        ))?;
        let mut rows = stmt.query([board_uuid.to_string()])?;
        let mut columns = Vec::new();
        while let Some(row) = rows.next()? {
            columns.push(parse_column_row(row)?);
        }
        Ok(columns)
    }

    fn delete_board(&self, board_uuid: BoardId) -> RepoResult<()> {
        let changed = self.conn.execute(
            "DELETE FROM boards WHERE board_uuid = ?1;",
            [board_uuid.to_string()],
        )?;
        if changed == 0 {
            return Err(RepoError::NotFound {
                entity: "board",
                id: board_uuid,
            });
        }
        info!("event=board_delete module=repo status=ok board={board_uuid}");
        Ok(())
    }
}

impl BoardAccess for SqliteBoardRepository<'_> {
    fn can_modify(&self, actor_id: &str, board_uuid: BoardId) -> RepoResult<bool> {
        let allowed: i64 = self.conn.query_row(
            "SELECT EXISTS(
                SELECT 1
                FROM boards b
                WHERE b.board_uuid = ?1
                  AND (
                    b.owner_id = ?2
                    OR EXISTS(
                      SELECT 1
                      FROM board_members m
                      WHERE m.board_uuid = b.board_uuid
                        AND m.actor_id = ?2
                    )
                  )
            );",
            params![board_uuid.to_string(), actor_id],
            |row| row.get(0),
        )?;
        Ok(allowed == 1)
    }

    fn can_hard_delete(&self, actor_id: &str, board_uuid: BoardId) -> RepoResult<bool> {
        let owner: i64 = self.conn.query_row(
            "SELECT EXISTS(
                SELECT 1
                FROM boards
                WHERE board_uuid = ?1
                  AND owner_id = ?2
            );",
            params![board_uuid.to_string(), actor_id],
            |row| row.get(0),
        )?;
        Ok(owner == 1)
    }
}

fn list_members(conn: &Connection, board_uuid: BoardId) -> RepoResult<Vec<ActorId>> {
    let mut stmt = conn.prepare(
        "SELECT actor_id
         FROM board_members
         WHERE board_uuid = ?1
         ORDER BY actor_id ASC;",
    )?;
    let mut rows = stmt.query([board_uuid.to_string()])?;
    let mut members = Vec::new();
    while let Some(row) = rows.next()? {
        members.push(row.get(0)?);
    }
    Ok(members)
}

fn ensure_board_exists(conn: &Connection, board_uuid: BoardId) -> RepoResult<()> {
    let exists: i64 = conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM boards WHERE board_uuid = ?1);",
        [board_uuid.to_string()],
        |row| row.get(0),
    )?;
    if exists == 0 {
        return Err(RepoError::NotFound {
            entity: "board",
            id: board_uuid,
        });
    }
    Ok(())
}

fn normalize_title<'a>(value: &'a str, what: &str) -> RepoResult<&'a str> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(RepoError::InvalidInput(format!("{what} must not be blank")));
    }
    Ok(trimmed)
}
