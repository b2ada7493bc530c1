//! Placement engine: insert, move and remove tickets over a [`TicketStore`].
//!
//! # Responsibility
//! - Load the current ordering, plan shifts with the position index, derive
//!   the status from the destination column title and hand the whole
//!   mutation set to the store as one unit.
//! - Retry once against a freshly loaded ordering when the store reports a
//!   concurrent change.
//! - Fall back to sequential writes, with a mover read-back, when the store
//!   cannot apply a set atomically.
//!
//! # Invariants
//! - Validation and lookup failures happen before any write.
//! - The mover is never shifted; it receives its final position directly.
//! - A same-column move to the ticket's current index writes nothing.

use crate::logging::{self, PlacementOp};
use crate::model::board::{BoardId, Column, ColumnId};
use crate::model::ticket::{Ticket, TicketDraft, TicketId, WorkflowStatus};
use crate::placement::index::{
    append_position, compaction_shifts, plan_reorder, plan_transfer, PositionPlan, Shift,
};
use crate::placement::status::resolve_status;
use crate::placement::{Consistency, Origin, Placed, PlacementError, PlacementResult};
use crate::repo::error::RepoError;
use crate::repo::ticket_repo::{
    ColumnExpectation, MoverWrite, MutationSet, NewTicket, RowShift, TicketStore,
};
use std::collections::HashMap;
use std::time::Instant;
use uuid::Uuid;

/// Extra attempts after a [`PlacementError::ConcurrencyConflict`].
pub const MAX_CONFLICT_RETRIES: u32 = 1;

/// Orchestrates ticket placement over one store.
pub struct PlacementEngine<S: TicketStore> {
    store: S,
}

impl<S: TicketStore> PlacementEngine<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Creates a ticket at the end of `column_uuid`.
    ///
    /// The status comes from the column title. Any gap already present in the
    /// column is closed in the same unit so the new position equals the live
    /// count before insert.
    pub fn insert(&self, draft: &TicketDraft, column_uuid: ColumnId) -> PlacementResult<Placed> {
        let started_at = Instant::now();
        let draft = draft.normalized()?;
        let ticket_uuid = Uuid::new_v4();

        let result = self.with_conflict_retry(PlacementOp::Insert, ticket_uuid, || {
            self.try_insert(&draft, ticket_uuid, column_uuid)
        });
        logging::placement_outcome(
            PlacementOp::Insert,
            ticket_uuid,
            &result,
            started_at.elapsed(),
        );
        result
    }

    /// Moves a ticket to `destination_index` of `destination_column`.
    ///
    /// The index is clamped to the destination's valid range. Moving within
    /// the ticket's own column reorders it; moving across columns also
    /// re-derives its status.
    pub fn move_ticket(
        &self,
        ticket_uuid: TicketId,
        destination_column: ColumnId,
        destination_index: usize,
    ) -> PlacementResult<Placed> {
        let started_at = Instant::now();
        let result = self.with_conflict_retry(PlacementOp::Move, ticket_uuid, || {
            self.try_move(ticket_uuid, destination_column, destination_index)
        });
        logging::placement_outcome(
            PlacementOp::Move,
            ticket_uuid,
            &result,
            started_at.elapsed(),
        );
        result
    }

    /// Removes a ticket and returns its last live snapshot.
    ///
    /// Soft removal only stamps the tombstone; positions of the remaining
    /// tickets are left as they are and density is restored by the next
    /// placement in that column. Hard removal also accepts a ticket that was
    /// already soft-deleted.
    pub fn remove(&self, ticket_uuid: TicketId, hard: bool) -> PlacementResult<Ticket> {
        let ticket = self
            .store
            .load_ticket(ticket_uuid, hard)?
            .ok_or(PlacementError::TicketNotFound(ticket_uuid))?;

        let deleted = if hard {
            self.store.hard_delete(ticket_uuid)
        } else {
            self.store.soft_delete(ticket_uuid)
        };
        deleted.map_err(|err| match err {
            RepoError::NotFound { .. } => PlacementError::TicketNotFound(ticket_uuid),
            other => other.into(),
        })?;

        logging::ticket_removed(&ticket, hard);
        Ok(ticket)
    }

    /// Lists live tickets of one column in display order.
    pub fn column_tickets(&self, column_uuid: ColumnId) -> PlacementResult<Vec<Ticket>> {
        self.require_column(column_uuid)?;
        Ok(self.store.list_column_tickets(column_uuid)?)
    }

    /// Re-derives every live ticket's status from its current column title.
    ///
    /// Used after columns were renamed. Returns the number of tickets whose
    /// stored status changed.
    pub fn resync_statuses(&self, board_uuid: BoardId) -> PlacementResult<usize> {
        if !self.store.board_exists(board_uuid)? {
            return Err(PlacementError::BoardNotFound(board_uuid));
        }

        let statuses: HashMap<ColumnId, WorkflowStatus> = self
            .store
            .list_board_columns(board_uuid)?
            .into_iter()
            .map(|column| (column.column_uuid, resolve_status(&column.title)))
            .collect();

        let mut changed = 0;
        for ticket in self.store.list_board_tickets(board_uuid)? {
            let Some(status) = statuses.get(&ticket.column_uuid).copied() else {
                continue;
            };
            if ticket.status != status && self.store.set_status(ticket.ticket_uuid, status)? {
                changed += 1;
            }
        }

        logging::statuses_resynced(board_uuid, changed);
        Ok(changed)
    }

    fn try_insert(
        &self,
        draft: &TicketDraft,
        ticket_uuid: TicketId,
        column_uuid: ColumnId,
    ) -> PlacementResult<Placed> {
        if !self.store.board_exists(draft.board_uuid)? {
            return Err(PlacementError::BoardNotFound(draft.board_uuid));
        }
        let column = self.require_column(column_uuid)?;
        if column.board_uuid != draft.board_uuid {
            return Err(PlacementError::InvalidTarget {
                board_uuid: draft.board_uuid,
                column_uuid,
            });
        }

        let slots = self.store.list_live_slots(column_uuid)?;
        let set = MutationSet {
            mover: MoverWrite::Insert(Box::new(NewTicket {
                ticket_uuid,
                board_uuid: draft.board_uuid,
                column_uuid,
                title: draft.title.clone(),
                description: draft.description.clone(),
                priority: draft.priority,
                status: resolve_status(&column.title),
                position: append_position(slots.len()),
                created_by: draft.created_by.clone(),
            })),
            shifts: tag_shifts(column_uuid, compaction_shifts(&slots)),
            expectations: vec![ColumnExpectation {
                column_uuid,
                live_count: slots.len(),
            }],
        };

        self.commit(&set, None)
    }

    fn try_move(
        &self,
        ticket_uuid: TicketId,
        destination_column: ColumnId,
        destination_index: usize,
    ) -> PlacementResult<Placed> {
        let ticket = self.require_ticket(ticket_uuid)?;
        let destination = self.require_column(destination_column)?;
        if destination.board_uuid != ticket.board_uuid {
            return Err(PlacementError::InvalidTarget {
                board_uuid: ticket.board_uuid,
                column_uuid: destination_column,
            });
        }

        let origin = Origin {
            column_uuid: ticket.column_uuid,
            position: ticket.position,
        };
        let destination_slots = self.store.list_live_slots(destination_column)?;
        let mut expectations = Vec::with_capacity(2);

        let plan: PositionPlan = if ticket.column_uuid == destination_column {
            let plan = plan_reorder(&destination_slots, ticket_uuid, destination_index);
            if plan.is_noop() {
                return Ok(Placed {
                    ticket,
                    consistency: Consistency::Atomic,
                    origin: Some(origin),
                });
            }
            plan
        } else {
            let source_slots = self.store.list_live_slots(ticket.column_uuid)?;
            expectations.push(ColumnExpectation {
                column_uuid: ticket.column_uuid,
                live_count: source_slots.len(),
            });
            plan_transfer(
                &source_slots,
                &destination_slots,
                ticket_uuid,
                destination_index,
            )
        };
        expectations.push(ColumnExpectation {
            column_uuid: destination_column,
            live_count: destination_slots.len(),
        });

        let mut shifts = tag_shifts(ticket.column_uuid, plan.source_shifts);
        shifts.extend(tag_shifts(destination_column, plan.destination_shifts));

        let set = MutationSet {
            mover: MoverWrite::Place {
                ticket_uuid,
                expected_column: ticket.column_uuid,
                expected_position: ticket.position,
                column_uuid: destination_column,
                position: plan.mover_position,
                status: resolve_status(&destination.title),
            },
            shifts,
            expectations,
        };

        self.commit(&set, Some(origin))
    }

    fn commit(&self, set: &MutationSet, origin: Option<Origin>) -> PlacementResult<Placed> {
        match self.store.apply_atomic(set) {
            Ok(ticket) => Ok(Placed {
                ticket,
                consistency: Consistency::Atomic,
                origin,
            }),
            Err(RepoError::AtomicWritesUnsupported) => self.commit_sequential(set, origin),
            Err(err) => Err(err.into()),
        }
    }

    fn commit_sequential(
        &self,
        set: &MutationSet,
        origin: Option<Origin>,
    ) -> PlacementResult<Placed> {
        let ticket_uuid = set.mover_uuid();
        let total = set.write_count();
        logging::placement_fallback(ticket_uuid, total);

        if let Err(err) = self.store.apply_sequential(set) {
            if err.applied == 0 {
                return Err(err.source.into());
            }
            return Err(PlacementError::DegradedConsistency {
                ticket_uuid,
                applied: err.applied,
                total,
                reason: err.source.to_string(),
            });
        }

        let degraded = |reason: String| PlacementError::DegradedConsistency {
            ticket_uuid,
            applied: total,
            total,
            reason,
        };
        let ticket = self
            .store
            .load_ticket(ticket_uuid, false)
            .map_err(|err| degraded(format!("read-back failed: {err}")))?
            .ok_or_else(|| degraded("ticket missing on read-back".to_string()))?;

        let (column_uuid, position, status) = set.intended_placement();
        if ticket.placement() != (column_uuid, position, status) {
            return Err(degraded(format!(
                "read back column={} position={} status={}, expected column={} position={} status={}",
                ticket.column_uuid,
                ticket.position,
                ticket.status,
                column_uuid,
                position,
                status
            )));
        }

        Ok(Placed {
            ticket,
            consistency: Consistency::Degraded,
            origin,
        })
    }

    fn with_conflict_retry<T>(
        &self,
        op: PlacementOp,
        ticket_uuid: TicketId,
        mut attempt: impl FnMut() -> PlacementResult<T>,
    ) -> PlacementResult<T> {
        let mut retries = 0;
        loop {
            match attempt() {
                Err(PlacementError::ConcurrencyConflict { column_uuids })
                    if retries < MAX_CONFLICT_RETRIES =>
                {
                    retries += 1;
                    logging::placement_retry(op, ticket_uuid, column_uuids.len(), retries + 1);
                }
                other => return other,
            }
        }
    }

    fn require_ticket(&self, ticket_uuid: TicketId) -> PlacementResult<Ticket> {
        self.store
            .load_ticket(ticket_uuid, false)?
            .ok_or(PlacementError::TicketNotFound(ticket_uuid))
    }

    fn require_column(&self, column_uuid: ColumnId) -> PlacementResult<Column> {
        self.store
            .load_column(column_uuid)?
            .ok_or(PlacementError::ColumnNotFound(column_uuid))
    }
}

fn tag_shifts(column_uuid: ColumnId, shifts: Vec<Shift>) -> Vec<RowShift> {
    shifts
        .into_iter()
        .map(|shift| RowShift { column_uuid, shift })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::{PlacementEngine, MAX_CONFLICT_RETRIES};
    use crate::model::board::{Column, ColumnId};
    use crate::model::ticket::{Priority, Ticket, TicketDraft, TicketId, WorkflowStatus};
    use crate::placement::index::{is_dense, Slot};
    use crate::placement::{Consistency, PlacementError};
    use crate::repo::error::{RepoError, RepoResult};
    use crate::repo::ticket_repo::{MoverWrite, MutationSet, SequentialApplyError, TicketStore};
    use std::cell::{Cell, RefCell};
    use uuid::Uuid;

    /// In-memory store that applies sets without checks and can be told to
    /// report conflicts or to stop part-way through a sequential apply.
    struct MemoryStore {
        board_uuid: Uuid,
        columns: Vec<Column>,
        tickets: RefCell<Vec<Ticket>>,
        atomic: bool,
        conflicts_left: Cell<u32>,
        atomic_calls: Cell<u32>,
        sequential_fail_at: Option<usize>,
    }

    impl MemoryStore {
        fn new(titles: &[&str]) -> Self {
            let board_uuid = Uuid::new_v4();
            let columns = titles
                .iter()
                .enumerate()
                .map(|(position, title)| Column {
                    column_uuid: Uuid::new_v4(),
                    board_uuid,
                    title: (*title).to_string(),
                    position: position as i64,
                    created_at: 0,
                    updated_at: 0,
                })
                .collect();
            Self {
                board_uuid,
                columns,
                tickets: RefCell::new(Vec::new()),
                atomic: true,
                conflicts_left: Cell::new(0),
                atomic_calls: Cell::new(0),
                sequential_fail_at: None,
            }
        }

        fn column(&self, index: usize) -> ColumnId {
            self.columns[index].column_uuid
        }

        fn seed(&self, column_uuid: ColumnId, position: i64) -> TicketId {
            let ticket_uuid = Uuid::new_v4();
            self.tickets.borrow_mut().push(Ticket {
                ticket_uuid,
                board_uuid: self.board_uuid,
                column_uuid,
                title: format!("seed {position}"),
                description: String::new(),
                priority: Priority::Medium,
                status: WorkflowStatus::Backlog,
                position,
                created_by: "alice".to_string(),
                created_at: 0,
                updated_at: 0,
                deleted_at: None,
            });
            ticket_uuid
        }

        fn positions(&self, column_uuid: ColumnId) -> Vec<i64> {
            self.list_live_slots(column_uuid)
                .expect("slots")
                .into_iter()
                .map(|slot| slot.position)
                .collect()
        }

        fn write_all(&self, set: &MutationSet, limit: usize) -> usize {
            let mut tickets = self.tickets.borrow_mut();
            let mut applied = 0;
            for row in &set.shifts {
                if applied == limit {
                    return applied;
                }
                if let Some(ticket) = tickets
                    .iter_mut()
                    .find(|ticket| ticket.ticket_uuid == row.shift.ticket_uuid)
                {
                    ticket.position += row.shift.delta;
                }
                applied += 1;
            }
            if applied == limit {
                return applied;
            }
            match &set.mover {
                MoverWrite::Insert(new) => tickets.push(Ticket {
                    ticket_uuid: new.ticket_uuid,
                    board_uuid: new.board_uuid,
                    column_uuid: new.column_uuid,
                    title: new.title.clone(),
                    description: new.description.clone(),
                    priority: new.priority,
                    status: new.status,
                    position: new.position,
                    created_by: new.created_by.clone(),
                    created_at: 0,
                    updated_at: 0,
                    deleted_at: None,
                }),
                MoverWrite::Place {
                    ticket_uuid,
                    column_uuid,
                    position,
                    status,
                    ..
                } => {
                    if let Some(ticket) = tickets
                        .iter_mut()
                        .find(|ticket| ticket.ticket_uuid == *ticket_uuid)
                    {
                        ticket.column_uuid = *column_uuid;
                        ticket.position = *position;
                        ticket.status = *status;
                    }
                }
            }
            applied + 1
        }
    }

    impl TicketStore for MemoryStore {
        fn board_exists(&self, board_uuid: Uuid) -> RepoResult<bool> {
            Ok(board_uuid == self.board_uuid)
        }

        fn load_ticket(
            &self,
            ticket_uuid: TicketId,
            include_deleted: bool,
        ) -> RepoResult<Option<Ticket>> {
            Ok(self
                .tickets
                .borrow()
                .iter()
                .find(|ticket| {
                    ticket.ticket_uuid == ticket_uuid && (include_deleted || ticket.is_live())
                })
                .cloned())
        }

        fn load_column(&self, column_uuid: ColumnId) -> RepoResult<Option<Column>> {
            Ok(self
                .columns
                .iter()
                .find(|column| column.column_uuid == column_uuid)
                .cloned())
        }

        fn list_live_slots(&self, column_uuid: ColumnId) -> RepoResult<Vec<Slot>> {
            let mut slots: Vec<Slot> = self
                .tickets
                .borrow()
                .iter()
                .filter(|ticket| ticket.column_uuid == column_uuid && ticket.is_live())
                .map(|ticket| Slot::new(ticket.ticket_uuid, ticket.position))
                .collect();
            crate::placement::index::order_slots(&mut slots);
            Ok(slots)
        }

        fn list_column_tickets(&self, column_uuid: ColumnId) -> RepoResult<Vec<Ticket>> {
            let order = self.list_live_slots(column_uuid)?;
            Ok(order
                .iter()
                .filter_map(|slot| self.load_ticket(slot.ticket_uuid, false).ok().flatten())
                .collect())
        }

        fn list_board_columns(&self, _board_uuid: Uuid) -> RepoResult<Vec<Column>> {
            Ok(self.columns.clone())
        }

        fn list_board_tickets(&self, _board_uuid: Uuid) -> RepoResult<Vec<Ticket>> {
            Ok(self
                .tickets
                .borrow()
                .iter()
                .filter(|ticket| ticket.is_live())
                .cloned()
                .collect())
        }

        fn apply_atomic(&self, set: &MutationSet) -> RepoResult<Ticket> {
            if !self.atomic {
                return Err(RepoError::AtomicWritesUnsupported);
            }
            self.atomic_calls.set(self.atomic_calls.get() + 1);
            if self.conflicts_left.get() > 0 {
                self.conflicts_left.set(self.conflicts_left.get() - 1);
                return Err(RepoError::conflict(set.affected_columns(), "injected"));
            }
            self.write_all(set, usize::MAX);
            self.load_ticket(set.mover_uuid(), false)?
                .ok_or(RepoError::InvalidData("mover missing".to_string()))
        }

        fn apply_sequential(&self, set: &MutationSet) -> Result<(), SequentialApplyError> {
            let limit = self.sequential_fail_at.unwrap_or(usize::MAX);
            let applied = self.write_all(set, limit);
            if applied < set.write_count() {
                return Err(SequentialApplyError {
                    applied,
                    total: set.write_count(),
                    source: RepoError::InvalidData("injected write failure".to_string()),
                });
            }
            Ok(())
        }

        fn soft_delete(&self, ticket_uuid: TicketId) -> RepoResult<()> {
            let mut tickets = self.tickets.borrow_mut();
            let ticket = tickets
                .iter_mut()
                .find(|ticket| ticket.ticket_uuid == ticket_uuid && ticket.is_live())
                .ok_or(RepoError::NotFound {
                    entity: "ticket",
                    id: ticket_uuid,
                })?;
            ticket.deleted_at = Some(1);
            Ok(())
        }

        fn hard_delete(&self, ticket_uuid: TicketId) -> RepoResult<()> {
            self.tickets
                .borrow_mut()
                .retain(|ticket| ticket.ticket_uuid != ticket_uuid);
            Ok(())
        }

        fn set_status(&self, ticket_uuid: TicketId, status: WorkflowStatus) -> RepoResult<bool> {
            let mut tickets = self.tickets.borrow_mut();
            match tickets
                .iter_mut()
                .find(|ticket| ticket.ticket_uuid == ticket_uuid && ticket.status != status)
            {
                Some(ticket) => {
                    ticket.status = status;
                    Ok(true)
                }
                None => Ok(false),
            }
        }
    }

    fn draft(store: &MemoryStore, title: &str) -> TicketDraft {
        TicketDraft::new(store.board_uuid, title, "alice")
    }

    #[test]
    fn single_conflict_is_retried_transparently() {
        let store = MemoryStore::new(&["Todo", "Done"]);
        let todo = store.column(0);
        let done = store.column(1);
        let moved = store.seed(todo, 0);
        store.conflicts_left.set(1);
        let engine = PlacementEngine::new(store);

        let placed = engine
            .move_ticket(moved, done, 0)
            .expect("retry should succeed");

        assert_eq!(placed.ticket.column_uuid, done);
        assert_eq!(placed.ticket.status, WorkflowStatus::Done);
        assert_eq!(engine.store().atomic_calls.get(), 2);
    }

    #[test]
    fn conflict_surfaces_after_retry_budget_is_spent() {
        let store = MemoryStore::new(&["Todo", "Done"]);
        let todo = store.column(0);
        let done = store.column(1);
        let moved = store.seed(todo, 0);
        store.conflicts_left.set(MAX_CONFLICT_RETRIES + 1);
        let engine = PlacementEngine::new(store);

        let err = engine
            .move_ticket(moved, done, 0)
            .expect_err("conflict should surface");

        assert!(err.is_retryable());
        assert!(err.left_state_untouched());
        assert_eq!(engine.store().atomic_calls.get(), MAX_CONFLICT_RETRIES + 1);
        assert_eq!(engine.store().positions(todo), vec![0]);
    }

    #[test]
    fn sequential_fallback_reports_degraded_consistency() {
        let mut store = MemoryStore::new(&["Todo"]);
        store.atomic = false;
        let todo = store.column(0);
        let first = store.seed(todo, 0);
        store.seed(todo, 1);
        let engine = PlacementEngine::new(store);

        let placed = engine
            .move_ticket(first, todo, 1)
            .expect("sequential move should succeed");

        assert_eq!(placed.consistency, Consistency::Degraded);
        assert_eq!(placed.ticket.position, 1);
        assert!(is_dense(engine.store().positions(todo)));
    }

    #[test]
    fn sequential_failure_after_some_writes_is_degraded_error() {
        let mut store = MemoryStore::new(&["Todo", "Done"]);
        store.atomic = false;
        store.sequential_fail_at = Some(1);
        let todo = store.column(0);
        let done = store.column(1);
        let moved = store.seed(todo, 0);
        store.seed(todo, 1);
        let engine = PlacementEngine::new(store);

        let err = engine
            .move_ticket(moved, done, 0)
            .expect_err("partial apply should fail");

        match err {
            PlacementError::DegradedConsistency {
                ticket_uuid,
                applied,
                total,
                ..
            } => {
                assert_eq!(ticket_uuid, moved);
                assert_eq!(applied, 1);
                assert_eq!(total, 2);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn sequential_failure_before_any_write_leaves_state_untouched() {
        let mut store = MemoryStore::new(&["Todo"]);
        store.atomic = false;
        store.sequential_fail_at = Some(0);
        let todo = store.column(0);
        let engine = PlacementEngine::new(store);

        let err = engine
            .insert(&draft(engine.store(), "first"), todo)
            .expect_err("insert should fail");

        assert!(matches!(err, PlacementError::Store(_)));
        assert!(err.left_state_untouched());
        assert!(engine.store().positions(todo).is_empty());
    }

    #[test]
    fn insert_closes_existing_gap() {
        let store = MemoryStore::new(&["Todo"]);
        let todo = store.column(0);
        store.seed(todo, 0);
        store.seed(todo, 2);
        let engine = PlacementEngine::new(store);

        let placed = engine
            .insert(&draft(engine.store(), "third"), todo)
            .expect("insert should succeed");

        assert_eq!(placed.ticket.position, 2);
        assert_eq!(placed.origin, None);
        assert_eq!(engine.store().positions(todo), vec![0, 1, 2]);
    }

    #[test]
    fn resync_updates_only_mismatched_statuses() {
        let store = MemoryStore::new(&["Todo", "Done"]);
        let done = store.column(1);
        store.seed(done, 0);
        store.seed(done, 1);
        let board_uuid = store.board_uuid;
        let engine = PlacementEngine::new(store);

        assert_eq!(engine.resync_statuses(board_uuid).expect("resync"), 2);
        assert_eq!(engine.resync_statuses(board_uuid).expect("resync"), 0);
        assert!(matches!(
            engine.resync_statuses(Uuid::new_v4()),
            Err(PlacementError::BoardNotFound(_))
        ));
    }
}
