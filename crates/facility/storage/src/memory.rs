//! In-memory reference implementation of the facility storage traits.
//!
//! This adapter is deterministic and test-friendly: tables are ordered maps
//! and a commit stages the batch on a copy of the tables, validates
//! referential existence, then swaps the copy in. Production deployments
//! should put a transactional backend behind the same traits.
//!
//! Cost: every commit clones the full table set and re-checks every
//! reference, so a write is O(store size). Fine for tests and small
//! fixtures; not meant for large data sets.

use crate::batch::{RecordKey, WriteBatch, WriteOp};
use crate::traits::{
    AssignmentStore, BatchStore, BlockStore, CellStore, FirearmStore, OccupantStore, StaffStore,
    SupervisionStore,
};
use crate::{StorageError, StorageResult};
use async_trait::async_trait;
use facility_types::{
    AssignmentId, Block, BlockId, Cell, CellId, Firearm, FirearmSerial, HolderAssignment, Occupant,
    OccupantId, Staff, StaffId, SupervisionEdge,
};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::RwLock;
use tracing::debug;

#[derive(Debug, Clone, Default)]
struct Tables {
    blocks: BTreeMap<BlockId, Block>,
    cells: BTreeMap<CellId, Cell>,
    occupants: BTreeMap<OccupantId, Occupant>,
    firearms: BTreeMap<FirearmSerial, Firearm>,
    assignments: BTreeMap<AssignmentId, HolderAssignment>,
    staff: BTreeMap<StaffId, Staff>,
    edges: BTreeMap<StaffId, SupervisionEdge>,
}

impl Tables {
    fn contains(&self, key: &RecordKey) -> bool {
        match key {
            RecordKey::Block(id) => self.blocks.contains_key(id),
            RecordKey::Cell(id) => self.cells.contains_key(id),
            RecordKey::Occupant(id) => self.occupants.contains_key(id),
            RecordKey::Firearm(id) => self.firearms.contains_key(id),
            RecordKey::Assignment(id) => self.assignments.contains_key(id),
            RecordKey::Staff(id) => self.staff.contains_key(id),
        }
    }

    fn apply(&mut self, op: WriteOp) -> StorageResult<()> {
        match op {
            WriteOp::ExpectAbsent(key) => {
                if self.contains(&key) {
                    return Err(StorageError::Conflict(format!("{key} already exists")));
                }
            }
            WriteOp::PutBlock(block) => {
                self.blocks.insert(block.id.clone(), block);
            }
            WriteOp::DeleteBlock(id) => {
                self.blocks.remove(&id);
            }
            WriteOp::PutCell(cell) => {
                self.cells.insert(cell.id.clone(), cell);
            }
            WriteOp::DeleteCell(id) => {
                self.cells.remove(&id);
            }
            WriteOp::PutOccupant(occupant) => {
                self.occupants.insert(occupant.id.clone(), occupant);
            }
            WriteOp::DeleteOccupant(id) => {
                self.occupants.remove(&id);
            }
            WriteOp::PutFirearm(firearm) => {
                self.firearms.insert(firearm.serial.clone(), firearm);
            }
            WriteOp::DeleteFirearm(serial) => {
                self.firearms.remove(&serial);
            }
            WriteOp::PutAssignment(assignment) => {
                self.assignments.insert(assignment.id.clone(), assignment);
            }
            WriteOp::DeleteAssignment(id) => {
                self.assignments.remove(&id);
            }
            WriteOp::PutStaff(staff) => {
                self.staff.insert(staff.id.clone(), staff);
            }
            WriteOp::DeleteStaff(id) => {
                self.staff.remove(&id);
            }
            WriteOp::PutEdge(edge) => {
                self.edges.insert(edge.subordinate.clone(), edge);
            }
            WriteOp::DeleteEdge { subordinate } => {
                self.edges.remove(&subordinate);
            }
        }
        Ok(())
    }

    /// Referential existence only; cardinality and acyclicity are the
    /// engine's business.
    fn check_references(&self) -> StorageResult<()> {
        for cell in self.cells.values() {
            if !self.blocks.contains_key(&cell.block_id) {
                return Err(StorageError::ForeignKey(format!(
                    "{} references missing {}",
                    cell.id, cell.block_id
                )));
            }
            if let Some(missing) = cell
                .occupants
                .iter()
                .find(|o| !self.occupants.contains_key(*o))
            {
                return Err(StorageError::ForeignKey(format!(
                    "{} references missing {}",
                    cell.id, missing
                )));
            }
        }

        for occupant in self.occupants.values() {
            if let Some(cell_id) = &occupant.cell_id {
                if !self.cells.contains_key(cell_id) {
                    return Err(StorageError::ForeignKey(format!(
                        "{} references missing {}",
                        occupant.id, cell_id
                    )));
                }
            }
        }

        for assignment in self.assignments.values() {
            if !self.firearms.contains_key(assignment.firearm()) {
                return Err(StorageError::ForeignKey(format!(
                    "{} references missing {}",
                    assignment.id,
                    assignment.firearm()
                )));
            }
            if !self.staff.contains_key(assignment.holder()) {
                return Err(StorageError::ForeignKey(format!(
                    "{} references missing {}",
                    assignment.id,
                    assignment.holder()
                )));
            }
        }

        for edge in self.edges.values() {
            for end in [&edge.supervisor, &edge.subordinate] {
                if !self.staff.contains_key(end) {
                    return Err(StorageError::ForeignKey(format!(
                        "supervision edge {} -> {} references missing {}",
                        edge.supervisor, edge.subordinate, end
                    )));
                }
            }
        }

        Ok(())
    }
}

/// In-memory facility storage adapter.
#[derive(Default)]
pub struct InMemoryFacilityStorage {
    tables: RwLock<Tables>,
    commits: AtomicU64,
}

impl InMemoryFacilityStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of batches committed successfully so far.
    pub fn commit_count(&self) -> u64 {
        self.commits.load(Ordering::SeqCst)
    }

    fn read<T>(&self, f: impl FnOnce(&Tables) -> T) -> StorageResult<T> {
        let guard = self
            .tables
            .read()
            .map_err(|_| StorageError::Backend("tables lock poisoned".to_string()))?;
        Ok(f(&guard))
    }
}

#[async_trait]
impl BlockStore for InMemoryFacilityStorage {
    async fn get_block(&self, id: &BlockId) -> StorageResult<Option<Block>> {
        self.read(|t| t.blocks.get(id).cloned())
    }
}

#[async_trait]
impl CellStore for InMemoryFacilityStorage {
    async fn get_cell(&self, id: &CellId) -> StorageResult<Option<Cell>> {
        self.read(|t| t.cells.get(id).cloned())
    }

    async fn cells_in_block(&self, block_id: &BlockId) -> StorageResult<Vec<Cell>> {
        self.read(|t| {
            t.cells
                .values()
                .filter(|c| &c.block_id == block_id)
                .cloned()
                .collect()
        })
    }
}

#[async_trait]
impl OccupantStore for InMemoryFacilityStorage {
    async fn get_occupant(&self, id: &OccupantId) -> StorageResult<Option<Occupant>> {
        self.read(|t| t.occupants.get(id).cloned())
    }
}

#[async_trait]
impl FirearmStore for InMemoryFacilityStorage {
    async fn get_firearm(&self, serial: &FirearmSerial) -> StorageResult<Option<Firearm>> {
        self.read(|t| t.firearms.get(serial).cloned())
    }
}

#[async_trait]
impl AssignmentStore for InMemoryFacilityStorage {
    async fn assignments_for_firearm(
        &self,
        serial: &FirearmSerial,
    ) -> StorageResult<Vec<HolderAssignment>> {
        self.read(|t| {
            let mut values = t
                .assignments
                .values()
                .filter(|a| a.firearm() == serial)
                .cloned()
                .collect::<Vec<_>>();
            values.sort_by_key(|a| a.id.issue);
            values
        })
    }

    async fn assignments_for_holder(
        &self,
        holder: &StaffId,
    ) -> StorageResult<Vec<HolderAssignment>> {
        self.read(|t| {
            t.assignments
                .values()
                .filter(|a| a.holder() == holder)
                .cloned()
                .collect()
        })
    }

    async fn active_assignments_for_firearm(
        &self,
        serial: &FirearmSerial,
    ) -> StorageResult<Vec<HolderAssignment>> {
        let all = self.assignments_for_firearm(serial).await?;
        Ok(all.into_iter().filter(|a| a.is_active()).collect())
    }
}

#[async_trait]
impl StaffStore for InMemoryFacilityStorage {
    async fn get_staff(&self, id: &StaffId) -> StorageResult<Option<Staff>> {
        self.read(|t| t.staff.get(id).cloned())
    }

    async fn staff_count(&self) -> StorageResult<usize> {
        self.read(|t| t.staff.len())
    }
}

#[async_trait]
impl SupervisionStore for InMemoryFacilityStorage {
    async fn supervisor_edge(
        &self,
        subordinate: &StaffId,
    ) -> StorageResult<Option<SupervisionEdge>> {
        self.read(|t| t.edges.get(subordinate).cloned())
    }

    async fn edges_by_supervisor(
        &self,
        supervisor: &StaffId,
    ) -> StorageResult<Vec<SupervisionEdge>> {
        self.read(|t| {
            t.edges
                .values()
                .filter(|e| &e.supervisor == supervisor)
                .cloned()
                .collect()
        })
    }
}

#[async_trait]
impl BatchStore for InMemoryFacilityStorage {
    async fn commit(&self, batch: WriteBatch) -> StorageResult<()> {
        let mut guard = self
            .tables
            .write()
            .map_err(|_| StorageError::Backend("tables lock poisoned".to_string()))?;

        let op_count = batch.len();
        let mut staged = guard.clone();
        for op in batch.into_ops() {
            staged.apply(op)?;
        }
        staged.check_references()?;

        *guard = staged;
        self.commits.fetch_add(1, Ordering::SeqCst);
        debug!(ops = op_count, "committed write batch");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use facility_types::PrisonId;

    fn block(id: &str) -> Block {
        Block::new(BlockId::new(id), "general", PrisonId::new("north"))
    }

    #[tokio::test]
    async fn commit_applies_all_writes() {
        let storage = InMemoryFacilityStorage::new();
        let mut batch = WriteBatch::new();
        batch
            .put_block(block("B"))
            .put_cell(Cell::new(CellId::new("B-2"), BlockId::new("B"), "standard", 2))
            .put_cell(Cell::new(CellId::new("B-1"), BlockId::new("B"), "standard", 1));
        storage.commit(batch).await.unwrap();

        let cells = storage.cells_in_block(&BlockId::new("B")).await.unwrap();
        let ids: Vec<_> = cells.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids, vec!["B-1", "B-2"]);
        assert_eq!(storage.commit_count(), 1);
    }

    #[tokio::test]
    async fn dangling_reference_rejects_whole_batch() {
        let storage = InMemoryFacilityStorage::new();
        let mut batch = WriteBatch::new();
        batch
            .put_block(block("B"))
            .put_cell(Cell::new(CellId::new("X-1"), BlockId::new("missing"), "standard", 1));

        let result = storage.commit(batch).await;
        assert!(matches!(result, Err(StorageError::ForeignKey(_))));
        assert!(storage.get_block(&BlockId::new("B")).await.unwrap().is_none());
        assert_eq!(storage.commit_count(), 0);
    }

    #[tokio::test]
    async fn expect_absent_guards_duplicates() {
        let storage = InMemoryFacilityStorage::new();
        let mut first = WriteBatch::new();
        first
            .expect_absent(RecordKey::Block(BlockId::new("B")))
            .put_block(block("B"));
        storage.commit(first.clone()).await.unwrap();

        let result = storage.commit(first).await;
        assert!(matches!(result, Err(StorageError::Conflict(_))));
    }

    #[tokio::test]
    async fn active_assignments_are_filtered_by_status() {
        let storage = InMemoryFacilityStorage::new();
        let serial = FirearmSerial::new("SN1");
        let holder = StaffId::new("s1");

        let mut returned = HolderAssignment::issue(
            AssignmentId::new(serial.clone(), holder.clone(), 1),
            Utc::now(),
        );
        returned.returned = true;
        let active =
            HolderAssignment::issue(AssignmentId::new(serial.clone(), holder.clone(), 2), Utc::now());

        let mut batch = WriteBatch::new();
        batch
            .put_firearm(Firearm::new(serial.clone(), "pistol"))
            .put_staff(Staff::new(holder.clone(), "Ada", "officer"))
            .put_assignment(active)
            .put_assignment(returned);
        storage.commit(batch).await.unwrap();

        let all = storage.assignments_for_firearm(&serial).await.unwrap();
        assert_eq!(all.iter().map(|a| a.id.issue).collect::<Vec<_>>(), vec![1, 2]);

        let active = storage.active_assignments_for_firearm(&serial).await.unwrap();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].id.issue, 2);
    }

    #[tokio::test]
    async fn edges_are_keyed_by_subordinate() {
        let storage = InMemoryFacilityStorage::new();
        let mut batch = WriteBatch::new();
        for id in ["s1", "s2", "s3"] {
            batch.put_staff(Staff::new(StaffId::new(id), id, "officer"));
        }
        batch.put_edge(SupervisionEdge {
            supervisor: StaffId::new("s1"),
            subordinate: StaffId::new("s3"),
            since: Utc::now(),
        });
        batch.put_edge(SupervisionEdge {
            supervisor: StaffId::new("s2"),
            subordinate: StaffId::new("s3"),
            since: Utc::now(),
        });
        storage.commit(batch).await.unwrap();

        let edge = storage
            .supervisor_edge(&StaffId::new("s3"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(edge.supervisor, StaffId::new("s2"));
        assert!(storage
            .edges_by_supervisor(&StaffId::new("s1"))
            .await
            .unwrap()
            .is_empty());
    }
}
