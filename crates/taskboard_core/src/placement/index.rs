//! Position index: pure ordering arithmetic for one or two columns.
//!
//! # Responsibility
//! - Turn a column's live ordering plus a target slot into the position
//!   shifts that restore a dense `0..K-1` sequence.
//! - Stay free of I/O so the ordering rules are testable without a database.
//!
//! # Invariants
//! - Input slots are the *live* (non-deleted) tickets of a column.
//! - Ordering is `position ASC, ticket_uuid ASC`; ranks are indices into it.
//! - The mover never appears in a shift set; it gets its position directly.
//! - Applying every shift plus the mover position yields dense ranks in every
//!   affected column, even when stored positions carried gaps before.

use crate::model::ticket::TicketId;

/// One live ticket's stored position in a column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Slot {
    pub ticket_uuid: TicketId,
    pub position: i64,
}

impl Slot {
    pub fn new(ticket_uuid: TicketId, position: i64) -> Self {
        Self {
            ticket_uuid,
            position,
        }
    }
}

/// Position adjustment for a ticket that is not the mover.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Shift {
    pub ticket_uuid: TicketId,
    /// Stored position the plan was computed from.
    pub from: i64,
    pub delta: i64,
}

impl Shift {
    /// Position after the shift is applied.
    pub fn to(&self) -> i64 {
        self.from + self.delta
    }
}

/// Output of the position index for one placement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PositionPlan {
    /// Shifts in the column the mover leaves. Empty for same-column moves.
    pub source_shifts: Vec<Shift>,
    /// Shifts in the column the mover lands in.
    pub destination_shifts: Vec<Shift>,
    /// Mover's stored position before the move; `None` for a new ticket.
    pub mover_from: Option<i64>,
    /// Mover's final position in the destination column.
    pub mover_position: i64,
}

impl PositionPlan {
    /// True when applying the plan would change nothing.
    pub fn is_noop(&self) -> bool {
        self.source_shifts.is_empty()
            && self.destination_shifts.is_empty()
            && self.mover_from == Some(self.mover_position)
    }

    /// Number of row writes, mover included.
    pub fn write_count(&self) -> usize {
        self.source_shifts.len() + self.destination_shifts.len() + 1
    }
}

/// Sorts slots into canonical column order.
pub fn order_slots(slots: &mut [Slot]) {
    slots.sort_by(|left, right| {
        left.position
            .cmp(&right.position)
            .then_with(|| left.ticket_uuid.cmp(&right.ticket_uuid))
    });
}

/// Position a new ticket takes when appended to a column of `live_count`.
pub fn append_position(live_count: usize) -> i64 {
    live_count as i64
}

/// Returns whether `positions` is exactly `{0, .., n-1}` without duplicates.
pub fn is_dense(positions: impl IntoIterator<Item = i64>) -> bool {
    let mut sorted: Vec<i64> = positions.into_iter().collect();
    sorted.sort_unstable();
    sorted
        .iter()
        .enumerate()
        .all(|(rank, position)| *position == rank as i64)
}

/// Shifts that re-rank a column without moving anything in or out.
///
/// Empty for a column that is already dense.
pub fn compaction_shifts(slots: &[Slot]) -> Vec<Shift> {
    rerank(slots, None, None).0
}

/// Plans a move inside one column.
///
/// `slots` must contain the mover. When it does not, the mover is treated as
/// arriving from outside (the "new" sentinel) and only the opening shift is
/// planned.
pub fn plan_reorder(slots: &[Slot], mover: TicketId, target_index: usize) -> PositionPlan {
    let mover_from = slots
        .iter()
        .find(|slot| slot.ticket_uuid == mover)
        .map(|slot| slot.position);
    let (destination_shifts, mover_position) = rerank(slots, Some(mover), Some(target_index));

    PositionPlan {
        source_shifts: Vec::new(),
        destination_shifts,
        mover_from,
        mover_position: mover_position.unwrap_or(0),
    }
}

/// Plans a move from `source` into `destination`.
///
/// The source column closes the gap left by the mover; the destination opens
/// a slot at the clamped target index.
pub fn plan_transfer(
    source: &[Slot],
    destination: &[Slot],
    mover: TicketId,
    target_index: usize,
) -> PositionPlan {
    let mover_from = source
        .iter()
        .find(|slot| slot.ticket_uuid == mover)
        .map(|slot| slot.position);
    let (source_shifts, _) = rerank(source, Some(mover), None);
    let (destination_shifts, mover_position) =
        rerank(destination, Some(mover), Some(target_index));

    PositionPlan {
        source_shifts,
        destination_shifts,
        mover_from,
        mover_position: mover_position.unwrap_or(0),
    }
}

/// Removes `mover`, optionally re-inserts it at the clamped index, and emits a
/// shift for every other slot whose rank differs from its stored position.
fn rerank(
    slots: &[Slot],
    mover: Option<TicketId>,
    insert_at: Option<usize>,
) -> (Vec<Shift>, Option<i64>) {
    let mut ordered: Vec<Slot> = slots
        .iter()
        .copied()
        .filter(|slot| Some(slot.ticket_uuid) != mover)
        .collect();
    order_slots(&mut ordered);

    let mover_position = insert_at.map(|index| index.min(ordered.len()));
    let shifts = ordered
        .iter()
        .enumerate()
        .filter_map(|(index, slot)| {
            let rank = match mover_position {
                Some(mover_rank) if index >= mover_rank => index + 1,
                _ => index,
            } as i64;
            (rank != slot.position).then(|| Shift {
                ticket_uuid: slot.ticket_uuid,
                from: slot.position,
                delta: rank - slot.position,
            })
        })
        .collect();

    (shifts, mover_position.map(|rank| rank as i64))
}

#[cfg(test)]
mod tests {
    use super::{
        append_position, compaction_shifts, is_dense, plan_reorder, plan_transfer, PositionPlan,
        Shift, Slot,
    };
    use std::collections::HashMap;
    use uuid::Uuid;

    fn column(len: usize) -> Vec<Slot> {
        (0..len)
            .map(|position| Slot::new(Uuid::new_v4(), position as i64))
            .collect()
    }

    fn apply(slots: &[Slot], shifts: &[Shift]) -> HashMap<Uuid, i64> {
        let mut positions: HashMap<Uuid, i64> = slots
            .iter()
            .map(|slot| (slot.ticket_uuid, slot.position))
            .collect();
        for shift in shifts {
            let current = positions
                .get_mut(&shift.ticket_uuid)
                .expect("shift must target a known slot");
            assert_eq!(*current, shift.from);
            *current = shift.to();
        }
        positions
    }

    fn delta_of(plan_shifts: &[Shift], id: Uuid) -> Option<i64> {
        plan_shifts
            .iter()
            .find(|shift| shift.ticket_uuid == id)
            .map(|shift| shift.delta)
    }

    #[test]
    fn moving_down_shifts_the_half_open_range_up() {
        let slots = column(3);
        let plan = plan_reorder(&slots, slots[0].ticket_uuid, 2);

        assert_eq!(plan.mover_from, Some(0));
        assert_eq!(plan.mover_position, 2);
        assert_eq!(delta_of(&plan.destination_shifts, slots[1].ticket_uuid), Some(-1));
        assert_eq!(delta_of(&plan.destination_shifts, slots[2].ticket_uuid), Some(-1));
        assert!(delta_of(&plan.destination_shifts, slots[0].ticket_uuid).is_none());
    }

    #[test]
    fn moving_up_shifts_targets_between_new_and_old() {
        let slots = column(5);
        let plan = plan_reorder(&slots, slots[3].ticket_uuid, 1);

        assert_eq!(plan.mover_position, 1);
        assert_eq!(plan.destination_shifts.len(), 2);
        assert_eq!(delta_of(&plan.destination_shifts, slots[1].ticket_uuid), Some(1));
        assert_eq!(delta_of(&plan.destination_shifts, slots[2].ticket_uuid), Some(1));
        assert!(delta_of(&plan.destination_shifts, slots[4].ticket_uuid).is_none());
    }

    #[test]
    fn same_slot_is_noop() {
        let slots = column(4);
        let plan = plan_reorder(&slots, slots[2].ticket_uuid, 2);
        assert!(plan.is_noop());
        assert_eq!(plan.write_count(), 1);
    }

    #[test]
    fn target_beyond_end_is_clamped() {
        let slots = column(3);
        let plan = plan_reorder(&slots, slots[1].ticket_uuid, 99);
        assert_eq!(plan.mover_position, 2);

        let other = column(2);
        let plan = plan_transfer(&slots, &other, slots[0].ticket_uuid, 99);
        assert_eq!(plan.mover_position, 2);
        assert!(plan.destination_shifts.is_empty());
    }

    #[test]
    fn transfer_closes_source_gap_and_opens_destination_slot() {
        let todo = column(2);
        let doing = column(1);
        let plan = plan_transfer(&todo, &doing, todo[0].ticket_uuid, 0);

        assert_eq!(plan.mover_from, Some(0));
        assert_eq!(plan.mover_position, 0);
        assert_eq!(
            plan.source_shifts,
            vec![Shift {
                ticket_uuid: todo[1].ticket_uuid,
                from: 1,
                delta: -1
            }]
        );
        assert_eq!(
            plan.destination_shifts,
            vec![Shift {
                ticket_uuid: doing[0].ticket_uuid,
                from: 0,
                delta: 1
            }]
        );
    }

    #[test]
    fn gap_left_by_deleted_ticket_is_ignored() {
        // Live view of [T0@0, T1@1 (deleted), T2@2].
        let t0 = Slot::new(Uuid::new_v4(), 0);
        let t2 = Slot::new(Uuid::new_v4(), 2);
        let plan = plan_reorder(&[t0, t2], t2.ticket_uuid, 0);

        assert_eq!(plan.mover_position, 0);
        assert_eq!(delta_of(&plan.destination_shifts, t0.ticket_uuid), Some(1));
    }

    #[test]
    fn every_reorder_and_transfer_leaves_dense_columns() {
        for len in 1..6 {
            for from in 0..len {
                for target in 0..=len + 1 {
                    let slots = column(len);
                    let mover = slots[from].ticket_uuid;
                    let plan = plan_reorder(&slots, mover, target);
                    let mut positions = apply(&slots, &plan.destination_shifts);
                    positions.insert(mover, plan.mover_position);
                    assert!(is_dense(positions.values().copied()), "len={len} from={from} target={target}");

                    let destination = column(len - 1);
                    let plan = plan_transfer(&slots, &destination, mover, target);
                    let mut source_after = apply(&slots, &plan.source_shifts);
                    source_after.remove(&mover);
                    assert!(is_dense(source_after.values().copied()));
                    let mut destination_after = apply(&destination, &plan.destination_shifts);
                    destination_after.insert(mover, plan.mover_position);
                    assert_eq!(destination_after.len(), len);
                    assert!(is_dense(destination_after.values().copied()));
                }
            }
        }
    }

    #[test]
    fn compaction_is_empty_for_dense_columns() {
        assert!(compaction_shifts(&column(4)).is_empty());

        let a = Slot::new(Uuid::new_v4(), 0);
        let b = Slot::new(Uuid::new_v4(), 3);
        let shifts = compaction_shifts(&[b, a]);
        assert_eq!(
            shifts,
            vec![Shift {
                ticket_uuid: b.ticket_uuid,
                from: 3,
                delta: -2
            }]
        );
    }

    #[test]
    fn density_check_rejects_gaps_and_duplicates() {
        assert!(is_dense(Vec::new()));
        assert!(is_dense(vec![2, 0, 1]));
        assert!(!is_dense(vec![0, 2]));
        assert!(!is_dense(vec![0, 1, 1]));
        assert_eq!(append_position(3), 3);
    }

    #[test]
    fn unknown_mover_is_planned_as_insertion() {
        let slots = column(2);
        let plan: PositionPlan = plan_reorder(&slots, Uuid::new_v4(), 1);
        assert_eq!(plan.mover_from, None);
        assert_eq!(plan.mover_position, 1);
        assert_eq!(plan.destination_shifts.len(), 1);
        assert!(!plan.is_noop());
    }
}
