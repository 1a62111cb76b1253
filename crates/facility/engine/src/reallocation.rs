//! Capacity reduction planning.
//!
//! Pure, synchronous computation over a snapshot of one block's cells.
//! Nothing is written here; the allocator commits a finished plan in one
//! batch, or nothing at all when planning fails.
//!
//! Policy:
//! - excess occupants are taken from the target cell's placement order,
//!   newest first by default (see [`ExcessOrder`]);
//! - the candidate pool is every other cell of the same block and kind with
//!   free room, in ascending cell id;
//! - each excess occupant goes to the first candidate that still has room,
//!   and is appended to that cell's placement order.

use std::collections::BTreeSet;

use facility_types::{Cell, CellId, OccupantId};

use crate::config::ExcessOrder;
use crate::error::{EngineError, Result};

/// One occupant moving between two cells of a block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Relocation {
    pub occupant: OccupantId,
    pub from: CellId,
    pub to: CellId,
}

/// Outcome of planning a capacity change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReallocationPlan {
    /// The target cell with its new capacity and remaining occupants.
    pub target: Cell,

    /// Receiving cells with their new occupant lists, ascending by id.
    pub receivers: Vec<Cell>,

    /// Moves in the order they were decided.
    pub relocations: Vec<Relocation>,
}

impl ReallocationPlan {
    pub fn is_direct(&self) -> bool {
        self.relocations.is_empty()
    }
}

/// Plan setting `target`'s capacity to `new_capacity`.
///
/// `block_cells` is the block's full cell list; the target itself and cells
/// of other blocks or kinds in it are ignored.
pub fn plan_capacity_change(
    target: &Cell,
    block_cells: &[Cell],
    new_capacity: u32,
    order: ExcessOrder,
) -> Result<ReallocationPlan> {
    if new_capacity == 0 {
        return Err(EngineError::Validation(format!(
            "capacity of {} must be positive",
            target.id
        )));
    }

    let mut updated = target.clone();
    updated.capacity = new_capacity;

    let occupancy = target.occupancy();
    if new_capacity >= occupancy {
        return Ok(ReallocationPlan {
            target: updated,
            receivers: Vec::new(),
            relocations: Vec::new(),
        });
    }

    let required = occupancy - new_capacity;
    let excess = select_excess(&target.occupants, required as usize, order);

    let mut pool: Vec<Cell> = block_cells
        .iter()
        .filter(|c| {
            c.id != target.id
                && c.block_id == target.block_id
                && c.kind == target.kind
                && !c.is_full()
        })
        .cloned()
        .collect();
    pool.sort_by(|a, b| a.id.cmp(&b.id));

    let available: u32 = pool.iter().map(Cell::available).sum();
    if available < required {
        return Err(EngineError::CapacityUnavailable {
            cell: target.id.clone(),
            required,
            available,
        });
    }

    let mut relocations = Vec::with_capacity(excess.len());
    let mut touched = BTreeSet::new();
    let mut cursor = 0;
    for occupant in &excess {
        while pool.get(cursor).is_some_and(Cell::is_full) {
            cursor += 1;
        }
        let Some(receiver) = pool.get_mut(cursor) else {
            // Unreachable after the feasibility check above.
            return Err(EngineError::CapacityUnavailable {
                cell: target.id.clone(),
                required,
                available,
            });
        };
        receiver.occupants.push(occupant.clone());
        touched.insert(cursor);
        relocations.push(Relocation {
            occupant: occupant.clone(),
            from: target.id.clone(),
            to: receiver.id.clone(),
        });
    }

    updated.occupants.retain(|o| !excess.contains(o));

    let receivers = pool
        .into_iter()
        .enumerate()
        .filter(|(i, _)| touched.contains(i))
        .map(|(_, c)| c)
        .collect();

    Ok(ReallocationPlan {
        target: updated,
        receivers,
        relocations,
    })
}

fn select_excess(occupants: &[OccupantId], count: usize, order: ExcessOrder) -> Vec<OccupantId> {
    match order {
        ExcessOrder::NewestFirst => occupants.iter().rev().take(count).cloned().collect(),
        ExcessOrder::OldestFirst => occupants.iter().take(count).cloned().collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use facility_types::BlockId;

    fn cell(id: &str, kind: &str, capacity: u32, occupants: &[&str]) -> Cell {
        let mut cell = Cell::new(CellId::new(id), BlockId::new("B"), kind, capacity);
        cell.occupants = occupants.iter().map(|o| OccupantId::new(*o)).collect();
        cell
    }

    fn ids(cell: &Cell) -> Vec<&str> {
        cell.occupants.iter().map(|o| o.as_str()).collect()
    }

    #[test]
    fn test_growing_capacity_is_direct() {
        let target = cell("A", "standard", 2, &["p1", "p2"]);
        let plan =
            plan_capacity_change(&target, &[target.clone()], 4, ExcessOrder::NewestFirst).unwrap();
        assert!(plan.is_direct());
        assert_eq!(plan.target.capacity, 4);
        assert_eq!(ids(&plan.target), vec!["p1", "p2"]);
    }

    #[test]
    fn test_newest_occupants_move_first() {
        let a = cell("A", "standard", 3, &["p1", "p2", "p3"]);
        let c = cell("C", "standard", 2, &["p4"]);
        let d = cell("D", "standard", 2, &[]);

        let plan = plan_capacity_change(
            &a,
            &[a.clone(), c.clone(), d.clone()],
            1,
            ExcessOrder::NewestFirst,
        )
        .unwrap();

        // C takes p3 and is then full, so p2 spills over into D.
        assert_eq!(ids(&plan.target), vec!["p1"]);
        let receivers: Vec<_> = plan.receivers.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(receivers, vec!["C", "D"]);
        assert_eq!(ids(&plan.receivers[0]), vec!["p4", "p3"]);
        assert_eq!(ids(&plan.receivers[1]), vec!["p2"]);
        assert_eq!(
            plan.relocations
                .iter()
                .map(|r| r.occupant.as_str())
                .collect::<Vec<_>>(),
            vec!["p3", "p2"]
        );
    }

    #[test]
    fn test_oldest_first_policy() {
        let a = cell("A", "standard", 3, &["p1", "p2", "p3"]);
        let c = cell("C", "standard", 3, &[]);
        let plan =
            plan_capacity_change(&a, &[a.clone(), c], 2, ExcessOrder::OldestFirst).unwrap();
        assert_eq!(ids(&plan.target), vec!["p2", "p3"]);
        assert_eq!(ids(&plan.receivers[0]), vec!["p1"]);
    }

    #[test]
    fn test_candidates_fill_in_id_order_and_spill_over() {
        let a = cell("A", "standard", 4, &["p1", "p2", "p3", "p4"]);
        let z = cell("Z", "standard", 5, &[]);
        let b = cell("B", "standard", 2, &["q1"]);
        let c = cell("C", "standard", 2, &["q2", "q3"]);

        let plan = plan_capacity_change(
            &a,
            &[z.clone(), c.clone(), a.clone(), b.clone()],
            1,
            ExcessOrder::NewestFirst,
        )
        .unwrap();

        // B has one place, C is full and skipped, Z takes the rest.
        let receivers: Vec<_> = plan.receivers.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(receivers, vec!["B", "Z"]);
        assert_eq!(ids(&plan.receivers[0]), vec!["q1", "p4"]);
        assert_eq!(ids(&plan.receivers[1]), vec!["p3", "p2"]);
    }

    #[test]
    fn test_other_kinds_and_blocks_are_not_candidates() {
        let a = cell("A", "standard", 2, &["p1", "p2"]);
        let solitary = cell("S", "solitary", 5, &[]);
        let mut elsewhere = cell("E", "standard", 5, &[]);
        elsewhere.block_id = BlockId::new("other");

        let result = plan_capacity_change(
            &a,
            &[a.clone(), solitary, elsewhere],
            1,
            ExcessOrder::NewestFirst,
        );
        assert!(matches!(
            result,
            Err(EngineError::CapacityUnavailable {
                required: 1,
                available: 0,
                ..
            })
        ));
    }

    #[test]
    fn test_partial_room_is_still_infeasible() {
        let a = cell("A", "standard", 3, &["p1", "p2", "p3"]);
        let tight = cell("C", "standard", 1, &[]);
        let result = plan_capacity_change(&a, &[a.clone(), tight], 1, ExcessOrder::NewestFirst);
        assert!(matches!(
            result,
            Err(EngineError::CapacityUnavailable {
                required: 2,
                available: 1,
                ..
            })
        ));
    }

    #[test]
    fn test_zero_capacity_is_rejected() {
        let a = cell("A", "standard", 1, &[]);
        let result = plan_capacity_change(&a, &[a.clone()], 0, ExcessOrder::NewestFirst);
        assert!(matches!(result, Err(EngineError::Validation(_))));
    }
}
