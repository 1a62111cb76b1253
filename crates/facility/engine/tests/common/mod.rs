//! Shared fixtures for the engine integration tests.

#![allow(dead_code)]

use std::sync::Arc;

use facility_engine::{EngineConfig, FacilityEngine};
use facility_storage::memory::InMemoryFacilityStorage;
use facility_storage::CellStore;
use facility_types::{Block, BlockId, Cell, CellId, OccupantId, PrisonId, StaffId};

/// Route engine logs to the test harness. Honors `RUST_LOG`.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

pub struct Harness {
    pub storage: Arc<InMemoryFacilityStorage>,
    pub engine: FacilityEngine,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_config(EngineConfig::default())
    }

    pub fn with_config(config: EngineConfig) -> Self {
        init_tracing();
        let storage = Arc::new(InMemoryFacilityStorage::new());
        let engine = FacilityEngine::new(storage.clone(), config);
        Self { storage, engine }
    }

    pub async fn block(&self, id: &str) -> BlockId {
        self.engine
            .capacity()
            .create_block(Block::new(BlockId::new(id), "general", PrisonId::new("north")))
            .await
            .unwrap()
            .id
    }

    pub async fn cell(&self, block: &BlockId, id: &str, kind: &str, capacity: u32) -> CellId {
        self.engine
            .capacity()
            .create_cell_with_id(CellId::new(id), block, kind, capacity)
            .await
            .unwrap()
            .id
    }

    /// Admit and house occupants in order.
    pub async fn house(&self, cell: &CellId, occupants: &[&str]) {
        for id in occupants {
            let occupant = OccupantId::new(*id);
            self.engine
                .capacity()
                .admit_occupant_with_id(occupant.clone(), id)
                .await
                .unwrap();
            self.engine
                .capacity()
                .add_occupant(cell, &occupant)
                .await
                .unwrap();
        }
    }

    pub async fn staff(&self, ids: &[&str]) {
        for id in ids {
            self.engine
                .supervision()
                .register_staff_with_id(StaffId::new(*id), id, "officer")
                .await
                .unwrap();
        }
    }

    pub async fn load_cell(&self, id: &str) -> Cell {
        self.storage
            .get_cell(&CellId::new(id))
            .await
            .unwrap()
            .unwrap()
    }

    pub async fn occupants(&self, id: &str) -> Vec<String> {
        self.load_cell(id)
            .await
            .occupants
            .iter()
            .map(|o| o.as_str().to_string())
            .collect()
    }
}
