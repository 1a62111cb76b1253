//! Exclusive Holder Registry.
//!
//! A firearm has at most one active (unreturned) assignment at any time.
//! Returned assignments are kept as custody history.
//!
//! "Active assignments" are always a status-filtered store query; the
//! registry holds no assignment state of its own.

use std::sync::Arc;

use chrono::Utc;
use facility_storage::{FacilityStorage, RecordKey, WriteBatch};
use facility_types::{AssignmentId, Firearm, FirearmSerial, HolderAssignment, StaffId};
use tracing::{debug, info, instrument, warn};

use crate::config::LockConfig;
use crate::error::{EngineError, Result};
use crate::locks::KeyedLocks;

/// Exclusive Holder Registry.
pub struct HolderRegistry {
    storage: Arc<dyn FacilityStorage>,
    firearm_locks: KeyedLocks<FirearmSerial>,
    pub(crate) holder_locks: KeyedLocks<StaffId>,
}

impl HolderRegistry {
    pub fn new(storage: Arc<dyn FacilityStorage>, locks: &LockConfig) -> Self {
        Self {
            storage,
            firearm_locks: KeyedLocks::new("firearm", locks.acquire_timeout()),
            holder_locks: KeyedLocks::new("holder", locks.acquire_timeout()),
        }
    }

    /// Add a firearm to the armory.
    #[instrument(skip_all, fields(serial = %serial))]
    pub async fn register_firearm(&self, serial: FirearmSerial, kind: &str) -> Result<Firearm> {
        if serial.as_str().trim().is_empty() {
            return Err(EngineError::Validation(
                "firearm serial must not be empty".to_string(),
            ));
        }
        if kind.trim().is_empty() {
            return Err(EngineError::Validation(format!("{serial} must have a kind")));
        }

        let _guard = self.firearm_locks.acquire(&serial).await?;
        if self.storage.get_firearm(&serial).await?.is_some() {
            return Err(EngineError::Validation(format!("{serial} already exists")));
        }

        let firearm = Firearm::new(serial, kind);
        let mut batch = WriteBatch::new();
        batch
            .expect_absent(RecordKey::Firearm(firearm.serial.clone()))
            .put_firearm(firearm.clone());
        self.storage.commit(batch).await?;

        info!(serial = %firearm.serial, kind, "firearm registered");
        Ok(firearm)
    }

    /// Issue a firearm to a holder.
    #[instrument(skip_all, fields(serial = %serial, holder = %holder))]
    pub async fn assign(&self, serial: &FirearmSerial, holder: &StaffId) -> Result<HolderAssignment> {
        let _firearm_guard = self.firearm_locks.acquire(serial).await?;
        let _holder_guard = self.holder_locks.acquire(holder).await?;

        self.ensure_firearm(serial).await?;
        if self.storage.get_staff(holder).await?.is_none() {
            return Err(EngineError::not_found("staff", holder));
        }

        if let Some(active) = self.find_active(serial).await? {
            return Err(if active.holder() == holder {
                EngineError::AlreadyAssigned {
                    firearm: serial.clone(),
                    holder: holder.clone(),
                }
            } else {
                EngineError::FirearmNotAvailable {
                    firearm: serial.clone(),
                    holder: active.holder().clone(),
                }
            });
        }

        let issue = self
            .storage
            .assignments_for_firearm(serial)
            .await?
            .iter()
            .map(|a| a.id.issue)
            .max()
            .unwrap_or(0)
            + 1;
        let assignment = HolderAssignment::issue(
            AssignmentId::new(serial.clone(), holder.clone(), issue),
            Utc::now(),
        );

        let mut batch = WriteBatch::new();
        batch
            .expect_absent(RecordKey::Assignment(assignment.id.clone()))
            .put_assignment(assignment.clone());
        self.storage.commit(batch).await?;

        info!(serial = %serial, holder = %holder, issue, "firearm assigned");
        Ok(assignment)
    }

    /// Check a firearm back in, closing its active assignment.
    #[instrument(skip_all, fields(serial = %serial))]
    pub async fn return_firearm(&self, serial: &FirearmSerial) -> Result<HolderAssignment> {
        let _guard = self.firearm_locks.acquire(serial).await?;
        self.ensure_firearm(serial).await?;

        let mut active = self.storage.active_assignments_for_firearm(serial).await?;
        if active.len() > 1 {
            warn!(
                serial = %serial,
                count = active.len(),
                "multiple active assignments found, returning all"
            );
        }
        active.sort_by_key(|a| a.id.issue);

        let now = Utc::now();
        let mut batch = WriteBatch::new();
        let mut closed = None;
        for mut assignment in active {
            assignment.returned = true;
            assignment.returned_at = Some(now);
            batch.put_assignment(assignment.clone());
            closed = Some(assignment);
        }
        let Some(closed) = closed else {
            return Err(EngineError::NoActiveAssignment(serial.clone()));
        };
        self.storage.commit(batch).await?;

        info!(serial = %serial, holder = %closed.holder(), "firearm returned");
        Ok(closed)
    }

    /// The firearm's active assignment, if checked out.
    pub async fn active_assignment(&self, serial: &FirearmSerial) -> Result<Option<HolderAssignment>> {
        self.ensure_firearm(serial).await?;
        self.find_active(serial).await
    }

    async fn find_active(&self, serial: &FirearmSerial) -> Result<Option<HolderAssignment>> {
        let active = self.storage.active_assignments_for_firearm(serial).await?;
        if active.len() > 1 {
            warn!(
                serial = %serial,
                count = active.len(),
                "multiple active assignments found, using the newest"
            );
        }
        Ok(active.into_iter().max_by_key(|a| a.id.issue))
    }

    /// Every assignment of a firearm, oldest first.
    pub async fn history_for_firearm(&self, serial: &FirearmSerial) -> Result<Vec<HolderAssignment>> {
        self.ensure_firearm(serial).await?;
        let mut history = self.storage.assignments_for_firearm(serial).await?;
        history.sort_by_key(|a| a.id.issue);
        Ok(history)
    }

    /// Every assignment issued to a holder, oldest first.
    pub async fn history_for_holder(&self, holder: &StaffId) -> Result<Vec<HolderAssignment>> {
        if self.storage.get_staff(holder).await?.is_none() {
            return Err(EngineError::not_found("staff", holder));
        }
        let mut history = self.storage.assignments_for_holder(holder).await?;
        sort_by_issue_time(&mut history);
        Ok(history)
    }

    /// Firearms a holder currently has checked out.
    pub async fn active_assignments_for_holder(
        &self,
        holder: &StaffId,
    ) -> Result<Vec<HolderAssignment>> {
        let mut active = self.history_for_holder(holder).await?;
        active.retain(HolderAssignment::is_active);
        Ok(active)
    }

    /// Remove a firearm and its custody history from the armory.
    #[instrument(skip_all, fields(serial = %serial))]
    pub async fn retire_firearm(&self, serial: &FirearmSerial) -> Result<()> {
        let _guard = self.firearm_locks.acquire(serial).await?;
        self.ensure_firearm(serial).await?;

        if let Some(active) = self.find_active(serial).await? {
            return Err(EngineError::FirearmNotAvailable {
                firearm: serial.clone(),
                holder: active.holder().clone(),
            });
        }

        let history = self.storage.assignments_for_firearm(serial).await?;
        let mut batch = WriteBatch::new();
        for assignment in &history {
            batch.delete_assignment(assignment.id.clone());
        }
        batch.delete_firearm(serial.clone());
        self.storage.commit(batch).await?;

        debug!(serial = %serial, records = history.len(), "custody history dropped");
        info!(serial = %serial, "firearm retired");
        Ok(())
    }

    async fn ensure_firearm(&self, serial: &FirearmSerial) -> Result<()> {
        match self.storage.get_firearm(serial).await? {
            Some(_) => Ok(()),
            None => Err(EngineError::not_found("firearm", serial)),
        }
    }
}

fn sort_by_issue_time(assignments: &mut [HolderAssignment]) {
    assignments.sort_by(|a, b| {
        a.issued_at
            .cmp(&b.issued_at)
            .then_with(|| a.id.firearm.cmp(&b.id.firearm))
            .then_with(|| a.id.issue.cmp(&b.id.issue))
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use facility_storage::memory::InMemoryFacilityStorage;
    use facility_storage::BatchStore;
    use facility_types::Staff;

    async fn registry_with_staff(staff: &[&str]) -> (Arc<InMemoryFacilityStorage>, HolderRegistry) {
        let storage = Arc::new(InMemoryFacilityStorage::new());
        let mut batch = WriteBatch::new();
        for id in staff {
            batch.put_staff(Staff::new(StaffId::new(*id), *id, "officer"));
        }
        storage.commit(batch).await.unwrap();

        let registry = HolderRegistry::new(storage.clone(), &LockConfig::default());
        registry
            .register_firearm(FirearmSerial::new("SN123"), "pistol")
            .await
            .unwrap();
        (storage, registry)
    }

    #[tokio::test]
    async fn test_firearm_has_one_active_holder() {
        let (_, registry) = registry_with_staff(&["s7", "s8"]).await;
        let serial = FirearmSerial::new("SN123");

        let first = registry.assign(&serial, &StaffId::new("s7")).await.unwrap();
        assert_eq!(first.id.issue, 1);
        assert!(first.is_active());

        let err = registry
            .assign(&serial, &StaffId::new("s8"))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            EngineError::FirearmNotAvailable { ref holder, .. } if holder == &StaffId::new("s7")
        ));

        let err = registry
            .assign(&serial, &StaffId::new("s7"))
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::AlreadyAssigned { .. }));
    }

    #[tokio::test]
    async fn test_return_keeps_history() {
        let (_, registry) = registry_with_staff(&["s7", "s8"]).await;
        let serial = FirearmSerial::new("SN123");

        registry.assign(&serial, &StaffId::new("s7")).await.unwrap();
        let returned = registry.return_firearm(&serial).await.unwrap();
        assert!(returned.returned);
        assert!(returned.returned_at.is_some());
        assert!(registry.active_assignment(&serial).await.unwrap().is_none());

        let second = registry.assign(&serial, &StaffId::new("s8")).await.unwrap();
        assert_eq!(second.id.issue, 2);

        let history = registry.history_for_firearm(&serial).await.unwrap();
        assert_eq!(history.len(), 2);
        assert!(history[0].returned);
        assert_eq!(history[1].holder(), &StaffId::new("s8"));
    }

    #[tokio::test]
    async fn test_return_without_assignment() {
        let (_, registry) = registry_with_staff(&[]).await;
        let err = registry
            .return_firearm(&FirearmSerial::new("SN123"))
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::NoActiveAssignment(_)));
    }

    #[tokio::test]
    async fn test_unknown_firearm_or_holder() {
        let (_, registry) = registry_with_staff(&["s7"]).await;

        let err = registry
            .assign(&FirearmSerial::new("SN999"), &StaffId::new("s7"))
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::NotFound { entity: "firearm", .. }));

        let err = registry
            .assign(&FirearmSerial::new("SN123"), &StaffId::new("ghost"))
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::NotFound { entity: "staff", .. }));
    }

    #[tokio::test]
    async fn test_corrupt_double_assignment_prefers_newest() {
        let (storage, registry) = registry_with_staff(&["s7", "s8"]).await;
        let serial = FirearmSerial::new("SN123");

        // Written around the registry to simulate a store that lost the invariant.
        let mut batch = WriteBatch::new();
        batch
            .put_assignment(HolderAssignment::issue(
                AssignmentId::new(serial.clone(), StaffId::new("s7"), 1),
                Utc::now(),
            ))
            .put_assignment(HolderAssignment::issue(
                AssignmentId::new(serial.clone(), StaffId::new("s8"), 2),
                Utc::now(),
            ));
        storage.commit(batch).await.unwrap();

        let active = registry.active_assignment(&serial).await.unwrap().unwrap();
        assert_eq!(active.holder(), &StaffId::new("s8"));

        registry.return_firearm(&serial).await.unwrap();
        assert!(registry.active_assignment(&serial).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_holder_history_and_active_set() {
        let (_, registry) = registry_with_staff(&["s7"]).await;
        registry
            .register_firearm(FirearmSerial::new("SN200"), "rifle")
            .await
            .unwrap();
        let holder = StaffId::new("s7");

        registry
            .assign(&FirearmSerial::new("SN123"), &holder)
            .await
            .unwrap();
        registry
            .return_firearm(&FirearmSerial::new("SN123"))
            .await
            .unwrap();
        registry
            .assign(&FirearmSerial::new("SN200"), &holder)
            .await
            .unwrap();

        let history = registry.history_for_holder(&holder).await.unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].firearm(), &FirearmSerial::new("SN123"));

        let active = registry.active_assignments_for_holder(&holder).await.unwrap();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].firearm(), &FirearmSerial::new("SN200"));
    }

    #[tokio::test]
    async fn test_retire_requires_return() {
        let (_, registry) = registry_with_staff(&["s7"]).await;
        let serial = FirearmSerial::new("SN123");
        registry.assign(&serial, &StaffId::new("s7")).await.unwrap();

        let err = registry.retire_firearm(&serial).await.unwrap_err();
        assert!(matches!(err, EngineError::FirearmNotAvailable { .. }));

        registry.return_firearm(&serial).await.unwrap();
        registry.retire_firearm(&serial).await.unwrap();

        let err = registry.history_for_firearm(&serial).await.unwrap_err();
        assert!(matches!(err, EngineError::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_register_rejects_duplicates() {
        let (_, registry) = registry_with_staff(&[]).await;
        let err = registry
            .register_firearm(FirearmSerial::new("SN123"), "pistol")
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::Validation(_)));
    }
}
