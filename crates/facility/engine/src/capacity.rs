//! Capacity Allocator.
//!
//! Keeps `|occupants| ≤ capacity` for every cell. Owns the cell side of the
//! occupant placement edge and keeps each occupant's back-reference in step.
//!
//! Locking: operations that change an occupant's placement take that
//! occupant's lock first, then the lock of every block whose cells they
//! touch. Capacity changes take only the block lock; while it is held, an
//! occupant housed in that block can only move within the block.

use std::sync::Arc;

use facility_storage::{FacilityStorage, RecordKey, WriteBatch};
use facility_types::{Block, BlockId, Cell, CellId, Occupant, OccupantId};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument};

use crate::config::{LockConfig, ReallocationConfig};
use crate::error::{EngineError, Result};
use crate::locks::KeyedLocks;
use crate::reallocation::{plan_capacity_change, ReallocationPlan};

/// Occupancy of one cell.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CellOccupancy {
    pub cell_id: CellId,
    pub kind: String,
    pub capacity: u32,
    pub occupied: u32,
}

/// Occupancy of a block, cells ascending by id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockOccupancy {
    pub block_id: BlockId,
    pub cells: Vec<CellOccupancy>,
}

impl BlockOccupancy {
    pub fn total_capacity(&self) -> u32 {
        self.cells.iter().map(|c| c.capacity).sum()
    }

    pub fn total_occupied(&self) -> u32 {
        self.cells.iter().map(|c| c.occupied).sum()
    }
}

/// Capacity Allocator.
pub struct CapacityAllocator {
    storage: Arc<dyn FacilityStorage>,
    block_locks: KeyedLocks<BlockId>,
    occupant_locks: KeyedLocks<OccupantId>,
    config: ReallocationConfig,
}

impl CapacityAllocator {
    pub fn new(
        storage: Arc<dyn FacilityStorage>,
        config: ReallocationConfig,
        locks: &LockConfig,
    ) -> Self {
        Self {
            storage,
            block_locks: KeyedLocks::new("block", locks.acquire_timeout()),
            occupant_locks: KeyedLocks::new("occupant", locks.acquire_timeout()),
            config,
        }
    }

    /// Register a new block.
    #[instrument(skip_all, fields(block_id = %block.id))]
    pub async fn create_block(&self, block: Block) -> Result<Block> {
        if block.kind.trim().is_empty() {
            return Err(EngineError::Validation(format!(
                "{} must have a kind",
                block.id
            )));
        }

        let _guard = self.block_locks.acquire(&block.id).await?;
        if self.storage.get_block(&block.id).await?.is_some() {
            return Err(EngineError::Validation(format!(
                "{} already exists",
                block.id
            )));
        }

        let mut batch = WriteBatch::new();
        batch
            .expect_absent(RecordKey::Block(block.id.clone()))
            .put_block(block.clone());
        self.storage.commit(batch).await?;

        info!(block_id = %block.id, kind = %block.kind, "block created");
        Ok(block)
    }

    /// Create an empty cell with a generated id.
    pub async fn create_cell(
        &self,
        block_id: &BlockId,
        kind: &str,
        capacity: u32,
    ) -> Result<Cell> {
        self.create_cell_with_id(CellId::generate(), block_id, kind, capacity)
            .await
    }

    /// Create an empty cell.
    #[instrument(skip_all, fields(cell_id = %id, block_id = %block_id, capacity = capacity))]
    pub async fn create_cell_with_id(
        &self,
        id: CellId,
        block_id: &BlockId,
        kind: &str,
        capacity: u32,
    ) -> Result<Cell> {
        if capacity == 0 {
            return Err(EngineError::Validation(format!(
                "capacity of {id} must be positive"
            )));
        }
        if kind.trim().is_empty() {
            return Err(EngineError::Validation(format!("{id} must have a kind")));
        }

        let _guard = self.block_locks.acquire(block_id).await?;
        if self.storage.get_block(block_id).await?.is_none() {
            return Err(EngineError::not_found("block", block_id));
        }
        if self.storage.get_cell(&id).await?.is_some() {
            return Err(EngineError::Validation(format!("{id} already exists")));
        }

        let cell = Cell::new(id, block_id.clone(), kind, capacity);
        let mut batch = WriteBatch::new();
        batch
            .expect_absent(RecordKey::Cell(cell.id.clone()))
            .put_cell(cell.clone());
        self.storage.commit(batch).await?;

        info!(cell_id = %cell.id, block_id = %block_id, kind, capacity, "cell created");
        Ok(cell)
    }

    /// Register an unhoused occupant with a generated id.
    pub async fn admit_occupant(&self, name: &str) -> Result<Occupant> {
        self.admit_occupant_with_id(OccupantId::generate(), name)
            .await
    }

    /// Register an unhoused occupant.
    #[instrument(skip_all, fields(occupant_id = %id))]
    pub async fn admit_occupant_with_id(&self, id: OccupantId, name: &str) -> Result<Occupant> {
        if name.trim().is_empty() {
            return Err(EngineError::Validation(format!("{id} must have a name")));
        }

        let _guard = self.occupant_locks.acquire(&id).await?;
        if self.storage.get_occupant(&id).await?.is_some() {
            return Err(EngineError::Validation(format!("{id} already exists")));
        }

        let occupant = Occupant::new(id, name);
        let mut batch = WriteBatch::new();
        batch
            .expect_absent(RecordKey::Occupant(occupant.id.clone()))
            .put_occupant(occupant.clone());
        self.storage.commit(batch).await?;

        debug!(occupant_id = %occupant.id, "occupant admitted");
        Ok(occupant)
    }

    /// Change a cell's capacity, relocating excess occupants if it shrinks.
    ///
    /// Relocation is all-or-nothing: when the block cannot absorb every
    /// excess occupant the call fails with `CapacityUnavailable` and no
    /// record changes.
    #[instrument(skip_all, fields(cell_id = %cell_id, new_capacity = new_capacity))]
    pub async fn set_capacity(&self, cell_id: &CellId, new_capacity: u32) -> Result<Cell> {
        if new_capacity == 0 {
            return Err(EngineError::Validation(format!(
                "capacity of {cell_id} must be positive"
            )));
        }

        let block_id = self.load_cell(cell_id).await?.block_id;
        let _guard = self.block_locks.acquire(&block_id).await?;

        let target = self.load_cell(cell_id).await?;
        let block_cells = self.storage.cells_in_block(&block_id).await?;
        let plan = plan_capacity_change(
            &target,
            &block_cells,
            new_capacity,
            self.config.excess_order,
        )?;

        let batch = self.plan_batch(&plan).await?;
        self.storage.commit(batch).await?;

        if plan.is_direct() {
            debug!(cell_id = %cell_id, new_capacity, "capacity updated");
        } else {
            info!(
                cell_id = %cell_id,
                new_capacity,
                relocated = plan.relocations.len(),
                "capacity reduced with relocation"
            );
        }
        Ok(plan.target)
    }

    async fn plan_batch(&self, plan: &ReallocationPlan) -> Result<WriteBatch> {
        let mut batch = WriteBatch::new();
        batch.put_cell(plan.target.clone());
        for receiver in &plan.receivers {
            batch.put_cell(receiver.clone());
        }
        for relocation in &plan.relocations {
            let mut occupant = self.load_occupant(&relocation.occupant).await?;
            occupant.cell_id = Some(relocation.to.clone());
            batch.put_occupant(occupant);
        }
        Ok(batch)
    }

    /// House an unhoused occupant in a cell.
    #[instrument(skip_all, fields(cell_id = %cell_id, occupant_id = %occupant_id))]
    pub async fn add_occupant(&self, cell_id: &CellId, occupant_id: &OccupantId) -> Result<()> {
        let _occupant_guard = self.occupant_locks.acquire(occupant_id).await?;
        let block_id = self.load_cell(cell_id).await?.block_id;
        let _block_guard = self.block_locks.acquire(&block_id).await?;

        let mut cell = self.load_cell(cell_id).await?;
        let mut occupant = self.load_occupant(occupant_id).await?;

        if let Some(current) = &occupant.cell_id {
            return Err(EngineError::OccupantAlreadyHoused {
                occupant: occupant_id.clone(),
                cell: current.clone(),
            });
        }
        if cell.is_full() {
            return Err(EngineError::CellFull {
                cell: cell_id.clone(),
                capacity: cell.capacity,
            });
        }

        cell.occupants.push(occupant_id.clone());
        occupant.cell_id = Some(cell_id.clone());

        let mut batch = WriteBatch::new();
        batch.put_cell(cell).put_occupant(occupant);
        self.storage.commit(batch).await?;

        debug!(cell_id = %cell_id, occupant_id = %occupant_id, "occupant added");
        Ok(())
    }

    /// Take an occupant out of a cell, leaving them unhoused.
    #[instrument(skip_all, fields(cell_id = %cell_id, occupant_id = %occupant_id))]
    pub async fn remove_occupant(&self, cell_id: &CellId, occupant_id: &OccupantId) -> Result<()> {
        let _occupant_guard = self.occupant_locks.acquire(occupant_id).await?;
        let block_id = self.load_cell(cell_id).await?.block_id;
        let _block_guard = self.block_locks.acquire(&block_id).await?;

        let mut cell = self.load_cell(cell_id).await?;
        if !cell.contains(occupant_id) {
            return Err(EngineError::NotPresent {
                cell: cell_id.clone(),
                occupant: occupant_id.clone(),
            });
        }
        let mut occupant = self.load_occupant(occupant_id).await?;

        cell.occupants.retain(|o| o != occupant_id);
        occupant.cell_id = None;

        let mut batch = WriteBatch::new();
        batch.put_cell(cell).put_occupant(occupant);
        self.storage.commit(batch).await?;

        debug!(cell_id = %cell_id, occupant_id = %occupant_id, "occupant removed");
        Ok(())
    }

    /// Move a housed occupant to another cell, in any block.
    #[instrument(skip_all, fields(occupant_id = %occupant_id, to = %to_cell))]
    pub async fn transfer_occupant(&self, occupant_id: &OccupantId, to_cell: &CellId) -> Result<()> {
        let _occupant_guard = self.occupant_locks.acquire(occupant_id).await?;

        let occupant = self.load_occupant(occupant_id).await?;
        let Some(from_id) = occupant.cell_id.clone() else {
            return Err(EngineError::Validation(format!(
                "{occupant_id} is not housed; use add_occupant"
            )));
        };
        let from_block = self.load_cell(&from_id).await?.block_id;
        let to_block = self.load_cell(to_cell).await?.block_id;
        let _block_guards = self.block_locks.acquire_all([from_block, to_block]).await?;

        // A capacity change in the source block may have moved the occupant
        // to a sibling cell before the block lock was taken.
        let mut occupant = self.load_occupant(occupant_id).await?;
        let Some(from_id) = occupant.cell_id.clone() else {
            return Err(EngineError::Validation(format!(
                "{occupant_id} is not housed; use add_occupant"
            )));
        };
        if &from_id == to_cell {
            debug!(occupant_id = %occupant_id, "transfer to current cell ignored");
            return Ok(());
        }

        let mut from = self.load_cell(&from_id).await?;
        let mut to = self.load_cell(to_cell).await?;
        if to.is_full() {
            return Err(EngineError::CellFull {
                cell: to.id.clone(),
                capacity: to.capacity,
            });
        }

        from.occupants.retain(|o| o != occupant_id);
        to.occupants.push(occupant_id.clone());
        occupant.cell_id = Some(to.id.clone());

        let mut batch = WriteBatch::new();
        batch.put_cell(from).put_cell(to).put_occupant(occupant);
        self.storage.commit(batch).await?;

        info!(occupant_id = %occupant_id, from = %from_id, to = %to_cell, "occupant transferred");
        Ok(())
    }

    /// Remove an occupant from the facility, vacating their cell first.
    #[instrument(skip_all, fields(occupant_id = %occupant_id))]
    pub async fn release_occupant(&self, occupant_id: &OccupantId) -> Result<()> {
        let _occupant_guard = self.occupant_locks.acquire(occupant_id).await?;

        let occupant = self.load_occupant(occupant_id).await?;
        let mut batch = WriteBatch::new();
        let _block_guard = match &occupant.cell_id {
            Some(cell_id) => {
                let block_id = self.load_cell(cell_id).await?.block_id;
                let guard = self.block_locks.acquire(&block_id).await?;

                let occupant = self.load_occupant(occupant_id).await?;
                if let Some(cell_id) = &occupant.cell_id {
                    let mut cell = self.load_cell(cell_id).await?;
                    cell.occupants.retain(|o| o != occupant_id);
                    batch.put_cell(cell);
                }
                Some(guard)
            }
            None => None,
        };
        batch.delete_occupant(occupant_id.clone());
        self.storage.commit(batch).await?;

        info!(occupant_id = %occupant_id, "occupant released");
        Ok(())
    }

    /// Delete an empty cell.
    #[instrument(skip_all, fields(cell_id = %cell_id))]
    pub async fn decommission_cell(&self, cell_id: &CellId) -> Result<()> {
        let block_id = self.load_cell(cell_id).await?.block_id;
        let _guard = self.block_locks.acquire(&block_id).await?;

        let cell = self.load_cell(cell_id).await?;
        if !cell.occupants.is_empty() {
            return Err(EngineError::Validation(format!(
                "{} still houses {} occupant(s)",
                cell_id,
                cell.occupancy()
            )));
        }

        let mut batch = WriteBatch::new();
        batch.delete_cell(cell_id.clone());
        self.storage.commit(batch).await?;

        info!(cell_id = %cell_id, "cell decommissioned");
        Ok(())
    }

    /// Free places in a cell.
    pub async fn available_capacity(&self, cell_id: &CellId) -> Result<u32> {
        Ok(self.load_cell(cell_id).await?.available())
    }

    /// Capacity and occupancy of every cell in a block.
    pub async fn block_occupancy(&self, block_id: &BlockId) -> Result<BlockOccupancy> {
        if self.storage.get_block(block_id).await?.is_none() {
            return Err(EngineError::not_found("block", block_id));
        }
        let mut cells = self.storage.cells_in_block(block_id).await?;
        cells.sort_by(|a, b| a.id.cmp(&b.id));

        Ok(BlockOccupancy {
            block_id: block_id.clone(),
            cells: cells
                .into_iter()
                .map(|c| CellOccupancy {
                    occupied: c.occupancy(),
                    cell_id: c.id,
                    kind: c.kind,
                    capacity: c.capacity,
                })
                .collect(),
        })
    }

    async fn load_cell(&self, id: &CellId) -> Result<Cell> {
        self.storage
            .get_cell(id)
            .await?
            .ok_or_else(|| EngineError::not_found("cell", id))
    }

    async fn load_occupant(&self, id: &OccupantId) -> Result<Occupant> {
        self.storage
            .get_occupant(id)
            .await?
            .ok_or_else(|| EngineError::not_found("occupant", id))
    }
}
