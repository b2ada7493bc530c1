//! Ticket store contract and SQLite implementation.
//!
//! # Responsibility
//! - Load tickets, columns and live column orderings for the placement engine.
//! - Apply a planned [`MutationSet`] either atomically (one IMMEDIATE
//!   transaction with compare-and-swap checks) or sequentially (best-effort,
//!   row by row) when the store runs without multi-row atomicity.
//!
//! # Invariants
//! - Live orderings are `position ASC, ticket_uuid ASC` over `deleted_at IS NULL`.
//! - An atomic apply either commits every write of the set or none of them.
//! - An atomic apply never commits a non-dense affected column.

use crate::model::board::{ActorId, BoardId, Column, ColumnId};
use crate::model::ticket::{Priority, Ticket, TicketId, WorkflowStatus};
use crate::placement::index::{is_dense, Shift, Slot};
use crate::repo::error::{RepoError, RepoResult};
use crate::repo::rows::{
    ensure_connection_ready, parse_column_row, parse_ticket_row, parse_uuid, BOARDS_TABLE,
    COLUMNS_TABLE, COLUMN_SELECT_SQL, TICKETS_TABLE, TICKET_SELECT_SQL,
};
use rusqlite::{params, Connection, Transaction, TransactionBehavior};
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};

/// How the store applies a multi-row mutation set.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WriteMode {
    /// One transaction per set; the only mode that protects density.
    #[default]
    Atomic,
    /// Row-by-row autocommit writes. Degraded mode.
    Sequential,
}

impl WriteMode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Atomic => "atomic",
            Self::Sequential => "sequential",
        }
    }
}

/// Row written when a ticket is first placed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewTicket {
    pub ticket_uuid: TicketId,
    pub board_uuid: BoardId,
    pub column_uuid: ColumnId,
    pub title: String,
    pub description: String,
    pub priority: Priority,
    pub status: WorkflowStatus,
    pub position: i64,
    pub created_by: ActorId,
}

/// Mover half of a mutation set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MoverWrite {
    /// Insert a new ticket row.
    Insert(Box<NewTicket>),
    /// Re-place an existing ticket, guarded by where it was when planned.
    Place {
        ticket_uuid: TicketId,
        expected_column: ColumnId,
        expected_position: i64,
        column_uuid: ColumnId,
        position: i64,
        status: WorkflowStatus,
    },
}

/// Shift of one non-mover ticket inside a given column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RowShift {
    pub column_uuid: ColumnId,
    pub shift: Shift,
}

/// Live ticket count of a column at planning time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ColumnExpectation {
    pub column_uuid: ColumnId,
    pub live_count: usize,
}

/// Every write one placement needs, plus the snapshot it was planned from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MutationSet {
    pub mover: MoverWrite,
    pub shifts: Vec<RowShift>,
    pub expectations: Vec<ColumnExpectation>,
}

impl MutationSet {
    pub fn mover_uuid(&self) -> TicketId {
        match &self.mover {
            MoverWrite::Insert(ticket) => ticket.ticket_uuid,
            MoverWrite::Place { ticket_uuid, .. } => *ticket_uuid,
        }
    }

    /// `(column, position, status)` the mover must end up with.
    pub fn intended_placement(&self) -> (ColumnId, i64, WorkflowStatus) {
        match &self.mover {
            MoverWrite::Insert(ticket) => (ticket.column_uuid, ticket.position, ticket.status),
            MoverWrite::Place {
                column_uuid,
                position,
                status,
                ..
            } => (*column_uuid, *position, *status),
        }
    }

    /// Row writes in this set, mover included.
    pub fn write_count(&self) -> usize {
        self.shifts.len() + 1
    }

    /// Columns whose ordering this set touches, in expectation order.
    pub fn affected_columns(&self) -> Vec<ColumnId> {
        self.expectations
            .iter()
            .map(|expectation| expectation.column_uuid)
            .collect()
    }
}

/// Failure part-way through a sequential apply.
#[derive(Debug)]
pub struct SequentialApplyError {
    /// Writes that landed before the failure.
    pub applied: usize,
    pub total: usize,
    pub source: RepoError,
}

impl Display for SequentialApplyError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "sequential apply stopped after {}/{} writes: {}",
            self.applied, self.total, self.source
        )
    }
}

impl Error for SequentialApplyError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        Some(&self.source)
    }
}

/// Store interface consumed by the placement engine.
pub trait TicketStore {
    /// Returns whether a board row exists.
    fn board_exists(&self, board_uuid: BoardId) -> RepoResult<bool>;
    /// Loads one ticket; soft-deleted rows only when `include_deleted`.
    fn load_ticket(&self, ticket_uuid: TicketId, include_deleted: bool)
        -> RepoResult<Option<Ticket>>;
    /// Loads one column.
    fn load_column(&self, column_uuid: ColumnId) -> RepoResult<Option<Column>>;
    /// Lists live `(ticket, position)` slots of one column in column order.
    fn list_live_slots(&self, column_uuid: ColumnId) -> RepoResult<Vec<Slot>>;
    /// Lists live tickets of one column in column order.
    fn list_column_tickets(&self, column_uuid: ColumnId) -> RepoResult<Vec<Ticket>>;
    /// Lists columns of one board in display order.
    fn list_board_columns(&self, board_uuid: BoardId) -> RepoResult<Vec<Column>>;
    /// Lists live tickets of one board.
    fn list_board_tickets(&self, board_uuid: BoardId) -> RepoResult<Vec<Ticket>>;
    /// Applies every write of `set` as one unit and returns the mover.
    ///
    /// Returns [`RepoError::AtomicWritesUnsupported`] when the store cannot.
    fn apply_atomic(&self, set: &MutationSet) -> RepoResult<Ticket>;
    /// Applies the writes of `set` one by one without a surrounding unit.
    fn apply_sequential(&self, set: &MutationSet) -> Result<(), SequentialApplyError>;
    /// Sets the soft-delete tombstone on a live ticket.
    fn soft_delete(&self, ticket_uuid: TicketId) -> RepoResult<()>;
    /// Erases a ticket row, live or soft-deleted.
    fn hard_delete(&self, ticket_uuid: TicketId) -> RepoResult<()>;
    /// Overwrites the status of a live ticket. Returns whether a row changed.
    fn set_status(&self, ticket_uuid: TicketId, status: WorkflowStatus) -> RepoResult<bool>;
}

/// SQLite-backed ticket store.
pub struct SqliteTicketStore<'conn> {
    conn: &'conn Connection,
    write_mode: WriteMode,
}

impl<'conn> SqliteTicketStore<'conn> {
    /// Creates an atomic-mode store from a migrated connection.
    pub fn try_new(conn: &'conn Connection) -> RepoResult<Self> {
        ensure_connection_ready(conn, &[BOARDS_TABLE, COLUMNS_TABLE, TICKETS_TABLE])?;
        Ok(Self {
            conn,
            write_mode: WriteMode::Atomic,
        })
    }

    /// Switches how mutation sets are applied.
    pub fn with_write_mode(mut self, write_mode: WriteMode) -> Self {
        self.write_mode = write_mode;
        self
    }

    pub fn write_mode(&self) -> WriteMode {
        self.write_mode
    }
}

impl TicketStore for SqliteTicketStore<'_> {
    fn board_exists(&self, board_uuid: BoardId) -> RepoResult<bool> {
        let exists: i64 = self.conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM boards WHERE board_uuid = ?1);",
            [board_uuid.to_string()],
            |row| row.get(0),
        )?;
        Ok(exists == 1)
    }

    fn load_ticket(
        &self,
        ticket_uuid: TicketId,
        include_deleted: bool,
    ) -> RepoResult<Option<Ticket>> {
        load_ticket(self.conn, ticket_uuid, include_deleted)
    }

    fn load_column(&self, column_uuid: ColumnId) -> RepoResult<Option<Column>> {
        let mut stmt = self
            .conn
            .prepare(&format!("{COLUMN_SELECT_SQL} WHERE column_uuid = ?1;"))?;
        let mut rows = stmt.query([column_uuid.to_string()])?;
        if let Some(row) = rows.next()? {
            return Ok(Some(parse_column_row(row)?));
        }
        Ok(None)
    }

    fn list_live_slots(&self, column_uuid: ColumnId) -> RepoResult<Vec<Slot>> {
        list_live_slots(self.conn, column_uuid)
    }

    fn list_column_tickets(&self, column_uuid: ColumnId) -> RepoResult<Vec<Ticket>> {
        let mut stmt = self.conn.prepare(&format!(
            "{TICKET_SELECT_SQL}
             WHERE column_uuid = ?1
               AND deleted_at IS NULL
             ORDER BY position ASC, ticket_uuid ASC;"
        ))?;
        let mut rows = stmt.query([column_uuid.to_string()])?;
        let mut tickets = Vec::new();
        while let Some(row) = rows.next()? {
            tickets.push(parse_ticket_row(row)?);
        }
        Ok(tickets)
    }

    fn list_board_columns(&self, board_uuid: BoardId) -> RepoResult<Vec<Column>> {
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

    fn list_board_tickets(&self, board_uuid: BoardId) -> RepoResult<Vec<Ticket>> {
        let mut stmt = self.conn.prepare(&format!(
            "{TICKET_SELECT_SQL}
             WHERE board_uuid = ?1
               AND deleted_at IS NULL
             ORDER BY column_uuid ASC, position ASC, ticket_uuid ASC;"
        ))?;
        let mut rows = stmt.query([board_uuid.to_string()])?;
        let mut tickets = Vec::new();
        while let Some(row) = rows.next()? {
            tickets.push(parse_ticket_row(row)?);
        }
        Ok(tickets)
    }

    fn apply_atomic(&self, set: &MutationSet) -> RepoResult<Ticket> {
        if self.write_mode == WriteMode::Sequential {
            return Err(RepoError::AtomicWritesUnsupported);
        }

        let columns = set.affected_columns();
        let tx = Transaction::new_unchecked(self.conn, TransactionBehavior::Immediate)
            .map_err(|err| RepoError::from(err).busy_as_conflict(&columns))?;
        let ticket = apply_checked(&tx, set).map_err(|err| err.busy_as_conflict(&columns))?;
        tx.commit()
            .map_err(|err| RepoError::from(err).busy_as_conflict(&columns))?;
        Ok(ticket)
    }

    fn apply_sequential(&self, set: &MutationSet) -> Result<(), SequentialApplyError> {
        let total = set.write_count();
        let mut applied = 0;

        for row in &set.shifts {
            apply_shift_unchecked(self.conn, row).map_err(|source| SequentialApplyError {
                applied,
                total,
                source,
            })?;
            applied += 1;
        }

        write_mover(self.conn, &set.mover, false).map_err(|source| SequentialApplyError {
            applied,
            total,
            source,
        })?;
        Ok(())
    }

    fn soft_delete(&self, ticket_uuid: TicketId) -> RepoResult<()> {
        let changed = self.conn.execute(
            "UPDATE tickets
             SET deleted_at = (CAST(unixepoch('subsec') * 1000 AS INTEGER)),
                 updated_at = (CAST(unixepoch('subsec') * 1000 AS INTEGER))
             WHERE ticket_uuid = ?1
               AND deleted_at IS NULL;",
            [ticket_uuid.to_string()],
        )?;
        if changed == 0 {
            return Err(RepoError::NotFound {
                entity: "ticket",
                id: ticket_uuid,
            });
        }
        Ok(())
    }

    fn hard_delete(&self, ticket_uuid: TicketId) -> RepoResult<()> {
        let changed = self.conn.execute(
            "DELETE FROM tickets WHERE ticket_uuid = ?1;",
            [ticket_uuid.to_string()],
        )?;
        if changed == 0 {
            return Err(RepoError::NotFound {
                entity: "ticket",
                id: ticket_uuid,
            });
        }
        Ok(())
    }

    fn set_status(&self, ticket_uuid: TicketId, status: WorkflowStatus) -> RepoResult<bool> {
        let changed = self.conn.execute(
            "UPDATE tickets
             SET status = ?2,
                 updated_at = (CAST(unixepoch('subsec') * 1000 AS INTEGER))
             WHERE ticket_uuid = ?1
               AND deleted_at IS NULL
               AND status <> ?2;",
            params![ticket_uuid.to_string(), status.as_str()],
        )?;
        Ok(changed > 0)
    }
}

fn load_ticket(
    conn: &Connection,
    ticket_uuid: TicketId,
    include_deleted: bool,
) -> RepoResult<Option<Ticket>> {
    let mut stmt = conn.prepare(&format!(
        "{TICKET_SELECT_SQL}
         WHERE ticket_uuid = ?1
           AND (?2 = 1 OR deleted_at IS NULL);"
    ))?;
    let mut rows = stmt.query(params![ticket_uuid.to_string(), i64::from(include_deleted)])?;
    if let Some(row) = rows.next()? {
        return Ok(Some(parse_ticket_row(row)?));
    }
    Ok(None)
}

fn list_live_slots(conn: &Connection, column_uuid: ColumnId) -> RepoResult<Vec<Slot>> {
    let mut stmt = conn.prepare(
        "SELECT ticket_uuid, position
         FROM tickets
         WHERE column_uuid = ?1
           AND deleted_at IS NULL
         ORDER BY position ASC, ticket_uuid ASC;",
    )?;
    let mut rows = stmt.query([column_uuid.to_string()])?;
    let mut slots = Vec::new();
    while let Some(row) = rows.next()? {
        let id_text: String = row.get(0)?;
        slots.push(Slot::new(
            parse_uuid(&id_text, "tickets.ticket_uuid")?,
            row.get(1)?,
        ));
    }
    Ok(slots)
}

fn live_count(conn: &Connection, column_uuid: ColumnId) -> RepoResult<usize> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*)
         FROM tickets
         WHERE column_uuid = ?1
           AND deleted_at IS NULL;",
        [column_uuid.to_string()],
        |row| row.get(0),
    )?;
    Ok(count as usize)
}

fn apply_checked(tx: &Transaction<'_>, set: &MutationSet) -> RepoResult<Ticket> {
    let columns = set.affected_columns();

    for expectation in &set.expectations {
        let actual = live_count(tx, expectation.column_uuid)?;
        if actual != expectation.live_count {
            return Err(RepoError::conflict(
                columns,
                format!(
                    "column {} has {actual} live tickets, planned for {}",
                    expectation.column_uuid, expectation.live_count
                ),
            ));
        }
    }

    for row in &set.shifts {
        let changed = tx.execute(
            "UPDATE tickets
             SET position = ?4,
                 updated_at = (CAST(unixepoch('subsec') * 1000 AS INTEGER))
             WHERE ticket_uuid = ?1
               AND column_uuid = ?2
               AND position = ?3
               AND deleted_at IS NULL;",
            params![
                row.shift.ticket_uuid.to_string(),
                row.column_uuid.to_string(),
                row.shift.from,
                row.shift.to(),
            ],
        )?;
        if changed == 0 {
            return Err(RepoError::conflict(
                columns,
                format!(
                    "ticket {} is no longer at position {}",
                    row.shift.ticket_uuid, row.shift.from
                ),
            ));
        }
    }

    if !write_mover(tx, &set.mover, true)? {
        return Err(RepoError::conflict(
            columns,
            format!("ticket {} moved since it was loaded", set.mover_uuid()),
        ));
    }

    for column_uuid in &columns {
        let slots = list_live_slots(tx, *column_uuid)?;
        if !is_dense(slots.iter().map(|slot| slot.position)) {
            return Err(RepoError::conflict(
                columns.clone(),
                format!("column {column_uuid} would not be dense"),
            ));
        }
    }

    load_ticket(tx, set.mover_uuid(), false)?.ok_or(RepoError::NotFound {
        entity: "ticket",
        id: set.mover_uuid(),
    })
}

fn apply_shift_unchecked(conn: &Connection, row: &RowShift) -> RepoResult<()> {
    let changed = conn.execute(
        "UPDATE tickets
         SET position = position + ?2,
             updated_at = (CAST(unixepoch('subsec') * 1000 AS INTEGER))
         WHERE ticket_uuid = ?1
           AND deleted_at IS NULL;",
        params![row.shift.ticket_uuid.to_string(), row.shift.delta],
    )?;
    if changed == 0 {
        return Err(RepoError::NotFound {
            entity: "ticket",
            id: row.shift.ticket_uuid,
        });
    }
    Ok(())
}

/// Writes the mover. With `guarded`, a re-placement only lands when the row
/// is still where the plan found it; returns whether it landed.
fn write_mover(conn: &Connection, mover: &MoverWrite, guarded: bool) -> RepoResult<bool> {
    match mover {
        MoverWrite::Insert(ticket) => {
            conn.execute(
                "INSERT INTO tickets (
                    ticket_uuid,
                    board_uuid,
                    column_uuid,
                    title,
                    description,
                    priority,
                    status,
                    position,
                    created_by
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9);",
                params![
                    ticket.ticket_uuid.to_string(),
                    ticket.board_uuid.to_string(),
                    ticket.column_uuid.to_string(),
                    ticket.title.as_str(),
                    ticket.description.as_str(),
                    ticket.priority.as_str(),
                    ticket.status.as_str(),
                    ticket.position,
                    ticket.created_by.as_str(),
                ],
            )?;
            Ok(true)
        }
        MoverWrite::Place {
            ticket_uuid,
            expected_column,
            expected_position,
            column_uuid,
            position,
            status,
        } => {
            let changed = if guarded {
                conn.execute(
                    "UPDATE tickets
                     SET column_uuid = ?2,
                         position = ?3,
                         status = ?4,
                         updated_at = (CAST(unixepoch('subsec') * 1000 AS INTEGER))
                     WHERE ticket_uuid = ?1
                       AND column_uuid = ?5
                       AND position = ?6
                       AND deleted_at IS NULL;",
                    params![
                        ticket_uuid.to_string(),
                        column_uuid.to_string(),
                        position,
                        status.as_str(),
                        expected_column.to_string(),
                        expected_position,
                    ],
                )?
            } else {
                conn.execute(
                    "UPDATE tickets
                     SET column_uuid = ?2,
                         position = ?3,
                         status = ?4,
                         updated_at = (CAST(unixepoch('subsec') * 1000 AS INTEGER))
                     WHERE ticket_uuid = ?1
                       AND deleted_at IS NULL;",
                    params![
                        ticket_uuid.to_string(),
                        column_uuid.to_string(),
                        position,
                        status.as_str(),
                    ],
                )?
            };
            if changed == 0 && !guarded {
                return Err(RepoError::NotFound {
                    entity: "ticket",
                    id: *ticket_uuid,
                });
            }
            Ok(changed > 0)
        }
    }
}
