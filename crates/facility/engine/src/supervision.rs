//! Supervision Graph Manager.
//!
//! Edges run supervisor → subordinate and are stored keyed by subordinate,
//! so each staff member has at most one supervisor. The relation is kept a
//! forest: no self-loops and no cycles.
//!
//! All edits serialize on one graph-wide lock.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::Utc;
use facility_storage::{FacilityStorage, RecordKey, WriteBatch};
use facility_types::{Staff, StaffId, SupervisionEdge};
use tokio::sync::MutexGuard;
use tracing::{debug, info, instrument, warn};

use crate::config::LockConfig;
use crate::error::{EngineError, Result};
use crate::locks::TimedLock;

/// Supervision Graph Manager.
pub struct SupervisionGraph {
    storage: Arc<dyn FacilityStorage>,
    graph_lock: TimedLock,
}

impl SupervisionGraph {
    pub fn new(storage: Arc<dyn FacilityStorage>, locks: &LockConfig) -> Self {
        Self {
            storage,
            graph_lock: TimedLock::new("supervision graph", locks.acquire_timeout()),
        }
    }

    pub(crate) async fn lock_graph(&self) -> Result<MutexGuard<'_, ()>> {
        self.graph_lock.acquire().await
    }

    /// Register a staff member with a generated id.
    pub async fn register_staff(&self, name: &str, role: &str) -> Result<Staff> {
        self.register_staff_with_id(StaffId::generate(), name, role)
            .await
    }

    /// Register a staff member.
    #[instrument(skip_all, fields(staff_id = %id))]
    pub async fn register_staff_with_id(&self, id: StaffId, name: &str, role: &str) -> Result<Staff> {
        if name.trim().is_empty() {
            return Err(EngineError::Validation(format!("{id} must have a name")));
        }

        let _graph = self.lock_graph().await?;
        if self.storage.get_staff(&id).await?.is_some() {
            return Err(EngineError::Validation(format!("{id} already exists")));
        }

        let staff = Staff::new(id, name, role);
        let mut batch = WriteBatch::new();
        batch
            .expect_absent(RecordKey::Staff(staff.id.clone()))
            .put_staff(staff.clone());
        self.storage.commit(batch).await?;

        info!(staff_id = %staff.id, role, "staff registered");
        Ok(staff)
    }

    /// Place `subordinate` under `supervisor`, replacing any previous
    /// supervisor.
    #[instrument(skip_all, fields(subordinate = %subordinate, supervisor = %supervisor))]
    pub async fn assign_supervisor(
        &self,
        subordinate: &StaffId,
        supervisor: &StaffId,
    ) -> Result<SupervisionEdge> {
        if subordinate == supervisor {
            return Err(EngineError::SelfSupervision(subordinate.clone()));
        }

        let _graph = self.lock_graph().await?;
        self.ensure_staff(subordinate).await?;
        self.ensure_staff(supervisor).await?;

        let existing = self.storage.supervisor_edge(subordinate).await?;
        if let Some(edge) = &existing {
            if &edge.supervisor == supervisor {
                debug!("supervisor unchanged");
                return Ok(edge.clone());
            }
        }

        self.check_acyclic(subordinate, supervisor).await?;

        let edge = SupervisionEdge {
            supervisor: supervisor.clone(),
            subordinate: subordinate.clone(),
            since: Utc::now(),
        };
        let mut batch = WriteBatch::new();
        if existing.is_some() {
            batch.delete_edge(subordinate.clone());
        }
        batch.put_edge(edge.clone());
        self.storage.commit(batch).await?;

        match existing {
            Some(old) => info!(
                subordinate = %subordinate,
                supervisor = %supervisor,
                previous = %old.supervisor,
                "supervisor replaced"
            ),
            None => info!(subordinate = %subordinate, supervisor = %supervisor, "supervisor assigned"),
        }
        Ok(edge)
    }

    /// Walk the chain upward from `supervisor`. Reaching `subordinate` means
    /// the new edge would close a cycle.
    ///
    /// The walk visits each staff member at most once and stops after as
    /// many steps as there are staff, so a corrupt store cannot make it loop.
    async fn check_acyclic(&self, subordinate: &StaffId, supervisor: &StaffId) -> Result<()> {
        let bound = self.storage.staff_count().await?;
        let cycle = || EngineError::CycleDetected {
            subordinate: subordinate.clone(),
            supervisor: supervisor.clone(),
        };

        let mut visited = HashSet::new();
        let mut current = supervisor.clone();
        loop {
            if &current == subordinate {
                return Err(cycle());
            }
            if !visited.insert(current.clone()) || visited.len() > bound {
                warn!(at = %current, "existing supervision chain is cyclic");
                return Err(cycle());
            }
            match self.storage.supervisor_edge(&current).await? {
                Some(edge) => current = edge.supervisor,
                None => return Ok(()),
            }
        }
    }

    /// Detach `subordinate` from their supervisor. Does nothing if they
    /// have none.
    #[instrument(skip_all, fields(subordinate = %subordinate))]
    pub async fn remove_supervisor(&self, subordinate: &StaffId) -> Result<()> {
        let _graph = self.lock_graph().await?;

        let Some(edge) = self.storage.supervisor_edge(subordinate).await? else {
            debug!("no supervisor to remove");
            return Ok(());
        };

        let mut batch = WriteBatch::new();
        batch.delete_edge(subordinate.clone());
        self.storage.commit(batch).await?;

        info!(subordinate = %subordinate, supervisor = %edge.supervisor, "supervisor removed");
        Ok(())
    }

    /// Direct subordinates, ascending by id.
    pub async fn subordinates(&self, supervisor: &StaffId) -> Result<Vec<Staff>> {
        self.ensure_staff(supervisor).await?;

        let mut ids: Vec<StaffId> = self
            .storage
            .edges_by_supervisor(supervisor)
            .await?
            .into_iter()
            .map(|e| e.subordinate)
            .collect();
        ids.sort();

        let mut staff = Vec::with_capacity(ids.len());
        for id in &ids {
            staff.push(self.ensure_staff(id).await?);
        }
        Ok(staff)
    }

    pub async fn supervisor_of(&self, subordinate: &StaffId) -> Result<Option<StaffId>> {
        self.ensure_staff(subordinate).await?;
        Ok(self
            .storage
            .supervisor_edge(subordinate)
            .await?
            .map(|e| e.supervisor))
    }

    async fn ensure_staff(&self, id: &StaffId) -> Result<Staff> {
        self.storage
            .get_staff(id)
            .await?
            .ok_or_else(|| EngineError::not_found("staff", id))
    }
}
