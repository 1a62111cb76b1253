use crate::batch::WriteBatch;
use crate::StorageResult;
use async_trait::async_trait;
use facility_types::{
    Block, BlockId, Cell, CellId, Firearm, FirearmSerial, HolderAssignment, Occupant, OccupantId,
    Staff, StaffId, SupervisionEdge,
};

/// Read access to blocks.
#[async_trait]
pub trait BlockStore: Send + Sync {
    async fn get_block(&self, id: &BlockId) -> StorageResult<Option<Block>>;
}

/// Read access to cells.
#[async_trait]
pub trait CellStore: Send + Sync {
    async fn get_cell(&self, id: &CellId) -> StorageResult<Option<Cell>>;

    /// All cells of a block, ascending by cell id.
    async fn cells_in_block(&self, block_id: &BlockId) -> StorageResult<Vec<Cell>>;
}

/// Read access to occupants.
#[async_trait]
pub trait OccupantStore: Send + Sync {
    async fn get_occupant(&self, id: &OccupantId) -> StorageResult<Option<Occupant>>;
}

/// Read access to firearms.
#[async_trait]
pub trait FirearmStore: Send + Sync {
    async fn get_firearm(&self, serial: &FirearmSerial) -> StorageResult<Option<Firearm>>;
}

/// Read access to holder assignments.
#[async_trait]
pub trait AssignmentStore: Send + Sync {
    /// Every assignment of a firearm, ascending by issue ordinal.
    async fn assignments_for_firearm(
        &self,
        serial: &FirearmSerial,
    ) -> StorageResult<Vec<HolderAssignment>>;

    /// Every assignment ever made to a holder, in no particular order.
    async fn assignments_for_holder(&self, holder: &StaffId)
        -> StorageResult<Vec<HolderAssignment>>;

    /// Assignments of a firearm with `returned = false`.
    async fn active_assignments_for_firearm(
        &self,
        serial: &FirearmSerial,
    ) -> StorageResult<Vec<HolderAssignment>>;
}

/// Read access to staff.
#[async_trait]
pub trait StaffStore: Send + Sync {
    async fn get_staff(&self, id: &StaffId) -> StorageResult<Option<Staff>>;

    /// Number of staff records.
    async fn staff_count(&self) -> StorageResult<usize>;
}

/// Read access to supervision edges.
#[async_trait]
pub trait SupervisionStore: Send + Sync {
    /// The edge whose subordinate is `subordinate`, if any.
    async fn supervisor_edge(&self, subordinate: &StaffId)
        -> StorageResult<Option<SupervisionEdge>>;

    /// Edges whose supervisor is `supervisor`, ascending by subordinate id.
    async fn edges_by_supervisor(&self, supervisor: &StaffId)
        -> StorageResult<Vec<SupervisionEdge>>;
}

/// Atomic writes.
#[async_trait]
pub trait BatchStore: Send + Sync {
    /// Apply every write of the batch, or none of them.
    ///
    /// Backends validate referential existence of the resulting state and
    /// reject the batch with [`StorageError::ForeignKey`](crate::StorageError::ForeignKey)
    /// if a reference dangles. No other constraint is checked here.
    async fn commit(&self, batch: WriteBatch) -> StorageResult<()>;
}

/// Unified storage bundle used by the engine.
pub trait FacilityStorage:
    BlockStore
    + CellStore
    + OccupantStore
    + FirearmStore
    + AssignmentStore
    + StaffStore
    + SupervisionStore
    + BatchStore
    + Send
    + Sync
{
}

impl<T> FacilityStorage for T where
    T: BlockStore
        + CellStore
        + OccupantStore
        + FirearmStore
        + AssignmentStore
        + StaffStore
        + SupervisionStore
        + BatchStore
        + Send
        + Sync
{
}
