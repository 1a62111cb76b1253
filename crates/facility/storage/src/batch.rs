//! Atomic write batches.
//!
//! Engine operations stage every write in a [`WriteBatch`] and hand it to
//! [`BatchStore::commit`](crate::BatchStore::commit) once all checks passed.
//! A backend applies a batch entirely or not at all.

use facility_types::{
    AssignmentId, Block, BlockId, Cell, CellId, Firearm, FirearmSerial, HolderAssignment, Occupant,
    OccupantId, Staff, StaffId, SupervisionEdge,
};
use serde::{Deserialize, Serialize};

/// Key of a record that can be guarded with [`WriteOp::ExpectAbsent`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RecordKey {
    Block(BlockId),
    Cell(CellId),
    Occupant(OccupantId),
    Firearm(FirearmSerial),
    Assignment(AssignmentId),
    Staff(StaffId),
}

impl std::fmt::Display for RecordKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RecordKey::Block(id) => write!(f, "{id}"),
            RecordKey::Cell(id) => write!(f, "{id}"),
            RecordKey::Occupant(id) => write!(f, "{id}"),
            RecordKey::Firearm(id) => write!(f, "{id}"),
            RecordKey::Assignment(id) => write!(f, "{id}"),
            RecordKey::Staff(id) => write!(f, "{id}"),
        }
    }
}

/// A single staged write.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum WriteOp {
    /// Fail the whole batch with a conflict if the record already exists.
    ExpectAbsent(RecordKey),
    PutBlock(Block),
    DeleteBlock(BlockId),
    PutCell(Cell),
    DeleteCell(CellId),
    PutOccupant(Occupant),
    DeleteOccupant(OccupantId),
    PutFirearm(Firearm),
    DeleteFirearm(FirearmSerial),
    PutAssignment(HolderAssignment),
    DeleteAssignment(AssignmentId),
    PutStaff(Staff),
    DeleteStaff(StaffId),
    /// Edges are keyed by subordinate, so a put replaces any previous edge.
    PutEdge(SupervisionEdge),
    DeleteEdge { subordinate: StaffId },
}

/// Ordered set of writes committed as one unit.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WriteBatch {
    ops: Vec<WriteOp>,
}

impl WriteBatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, op: WriteOp) -> &mut Self {
        self.ops.push(op);
        self
    }

    pub fn expect_absent(&mut self, key: RecordKey) -> &mut Self {
        self.push(WriteOp::ExpectAbsent(key))
    }

    pub fn put_block(&mut self, block: Block) -> &mut Self {
        self.push(WriteOp::PutBlock(block))
    }

    pub fn put_cell(&mut self, cell: Cell) -> &mut Self {
        self.push(WriteOp::PutCell(cell))
    }

    pub fn delete_cell(&mut self, id: CellId) -> &mut Self {
        self.push(WriteOp::DeleteCell(id))
    }

    pub fn put_occupant(&mut self, occupant: Occupant) -> &mut Self {
        self.push(WriteOp::PutOccupant(occupant))
    }

    pub fn delete_occupant(&mut self, id: OccupantId) -> &mut Self {
        self.push(WriteOp::DeleteOccupant(id))
    }

    pub fn put_firearm(&mut self, firearm: Firearm) -> &mut Self {
        self.push(WriteOp::PutFirearm(firearm))
    }

    pub fn delete_firearm(&mut self, serial: FirearmSerial) -> &mut Self {
        self.push(WriteOp::DeleteFirearm(serial))
    }

    pub fn put_assignment(&mut self, assignment: HolderAssignment) -> &mut Self {
        self.push(WriteOp::PutAssignment(assignment))
    }

    pub fn delete_assignment(&mut self, id: AssignmentId) -> &mut Self {
        self.push(WriteOp::DeleteAssignment(id))
    }

    pub fn put_staff(&mut self, staff: Staff) -> &mut Self {
        self.push(WriteOp::PutStaff(staff))
    }

    pub fn delete_staff(&mut self, id: StaffId) -> &mut Self {
        self.push(WriteOp::DeleteStaff(id))
    }

    pub fn put_edge(&mut self, edge: SupervisionEdge) -> &mut Self {
        self.push(WriteOp::PutEdge(edge))
    }

    pub fn delete_edge(&mut self, subordinate: StaffId) -> &mut Self {
        self.push(WriteOp::DeleteEdge { subordinate })
    }

    pub fn ops(&self) -> &[WriteOp] {
        &self.ops
    }

    pub fn into_ops(self) -> Vec<WriteOp> {
        self.ops
    }

    pub fn len(&self) -> usize {
        self.ops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }
}
