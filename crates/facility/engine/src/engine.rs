//! Facility engine facade.

use std::sync::Arc;

use facility_storage::memory::InMemoryFacilityStorage;
use facility_storage::{FacilityStorage, WriteBatch};
use facility_types::StaffId;
use tracing::{info, instrument};

use crate::capacity::CapacityAllocator;
use crate::config::EngineConfig;
use crate::error::{EngineError, Result};
use crate::holders::HolderRegistry;
use crate::supervision::SupervisionGraph;

/// The three managers over one shared store.
pub struct FacilityEngine {
    storage: Arc<dyn FacilityStorage>,
    config: EngineConfig,
    capacity: CapacityAllocator,
    holders: HolderRegistry,
    supervision: SupervisionGraph,
}

impl FacilityEngine {
    pub fn new(storage: Arc<dyn FacilityStorage>, config: EngineConfig) -> Self {
        let capacity = CapacityAllocator::new(
            storage.clone(),
            config.reallocation.clone(),
            &config.locks,
        );
        let holders = HolderRegistry::new(storage.clone(), &config.locks);
        let supervision = SupervisionGraph::new(storage.clone(), &config.locks);

        Self {
            storage,
            config,
            capacity,
            holders,
            supervision,
        }
    }

    /// An engine over a fresh in-memory store with default configuration.
    pub fn in_memory() -> Self {
        Self::new(
            Arc::new(InMemoryFacilityStorage::new()),
            EngineConfig::default(),
        )
    }

    pub fn capacity(&self) -> &CapacityAllocator {
        &self.capacity
    }

    pub fn holders(&self) -> &HolderRegistry {
        &self.holders
    }

    pub fn supervision(&self) -> &SupervisionGraph {
        &self.supervision
    }

    pub fn storage(&self) -> &Arc<dyn FacilityStorage> {
        &self.storage
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Remove a staff member.
    ///
    /// Fails with `StaffHoldsFirearm` while they have a firearm checked out.
    /// Otherwise their supervisor edge, the edges of their direct
    /// subordinates and their returned assignments go with them.
    #[instrument(skip_all, fields(staff_id = %staff_id))]
    pub async fn remove_staff(&self, staff_id: &StaffId) -> Result<()> {
        let _holder = self.holders.holder_locks.acquire(staff_id).await?;
        let _graph = self.supervision.lock_graph().await?;

        if self.storage.get_staff(staff_id).await?.is_none() {
            return Err(EngineError::not_found("staff", staff_id));
        }

        let assignments = self.storage.assignments_for_holder(staff_id).await?;
        if let Some(active) = assignments.iter().find(|a| a.is_active()) {
            return Err(EngineError::StaffHoldsFirearm {
                staff: staff_id.clone(),
                firearm: active.firearm().clone(),
            });
        }

        let mut batch = WriteBatch::new();
        if self.storage.supervisor_edge(staff_id).await?.is_some() {
            batch.delete_edge(staff_id.clone());
        }
        let subordinates = self.storage.edges_by_supervisor(staff_id).await?;
        for edge in &subordinates {
            batch.delete_edge(edge.subordinate.clone());
        }
        for assignment in &assignments {
            batch.delete_assignment(assignment.id.clone());
        }
        batch.delete_staff(staff_id.clone());
        self.storage.commit(batch).await?;

        info!(
            staff_id = %staff_id,
            orphaned = subordinates.len(),
            history = assignments.len(),
            "staff removed"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use facility_types::FirearmSerial;

    #[tokio::test]
    async fn test_remove_staff_detaches_edges() {
        let engine = FacilityEngine::in_memory();
        let graph = engine.supervision();
        for id in ["chief", "lead", "guard"] {
            graph
                .register_staff_with_id(StaffId::new(id), id, "officer")
                .await
                .unwrap();
        }
        graph
            .assign_supervisor(&StaffId::new("lead"), &StaffId::new("chief"))
            .await
            .unwrap();
        graph
            .assign_supervisor(&StaffId::new("guard"), &StaffId::new("lead"))
            .await
            .unwrap();

        engine.remove_staff(&StaffId::new("lead")).await.unwrap();

        assert!(graph
            .subordinates(&StaffId::new("chief"))
            .await
            .unwrap()
            .is_empty());
        assert_eq!(
            graph.supervisor_of(&StaffId::new("guard")).await.unwrap(),
            None
        );
        let err = graph
            .supervisor_of(&StaffId::new("lead"))
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_remove_staff_blocked_by_checkout() {
        let engine = FacilityEngine::in_memory();
        let staff = engine
            .supervision()
            .register_staff("Dana", "armorer")
            .await
            .unwrap();
        let serial = FirearmSerial::new("SN123");
        engine
            .holders()
            .register_firearm(serial.clone(), "pistol")
            .await
            .unwrap();
        engine.holders().assign(&serial, &staff.id).await.unwrap();

        let err = engine.remove_staff(&staff.id).await.unwrap_err();
        assert!(matches!(err, EngineError::StaffHoldsFirearm { .. }));

        engine.holders().return_firearm(&serial).await.unwrap();
        engine.remove_staff(&staff.id).await.unwrap();
        assert!(engine
            .holders()
            .history_for_firearm(&serial)
            .await
            .unwrap()
            .is_empty());
    }
}
