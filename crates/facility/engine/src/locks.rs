//! Keyed async locks.
//!
//! Each mutation holds the lock of every resource it touches for the whole
//! read-check-commit sequence. Acquisition order across lock families is
//! fixed to rule out deadlocks:
//!
//! 1. occupant
//! 2. block(s), ascending id
//! 3. firearm
//! 4. holder
//! 5. supervision graph
//!
//! An operation may skip levels but never acquires a lower level while
//! holding a higher one.

use std::collections::BTreeSet;
use std::fmt::Display;
use std::hash::Hash;
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use tokio::sync::{Mutex, MutexGuard, OwnedMutexGuard};

use crate::error::{EngineError, Result};

/// A family of mutexes addressed by key.
///
/// A key's mutex exists only while someone holds or waits for it; the last
/// guard to go removes the entry.
pub struct KeyedLocks<K>
where
    K: Eq + Hash,
{
    family: &'static str,
    locks: DashMap<K, Arc<Mutex<()>>>,
    timeout: Duration,
}

/// Guard for one key of a [`KeyedLocks`] table.
pub struct KeyedGuard<'a, K>
where
    K: Eq + Hash + Ord + Clone + Display,
{
    locks: &'a KeyedLocks<K>,
    key: K,
    guard: Option<OwnedMutexGuard<()>>,
}

impl<K> Drop for KeyedGuard<'_, K>
where
    K: Eq + Hash + Ord + Clone + Display,
{
    fn drop(&mut self) {
        self.guard.take();
        self.locks.evict_if_unused(&self.key);
    }
}

impl<K> KeyedLocks<K>
where
    K: Eq + Hash + Ord + Clone + Display,
{
    pub fn new(family: &'static str, timeout: Duration) -> Self {
        Self {
            family,
            locks: DashMap::new(),
            timeout,
        }
    }

    /// Acquire the lock for `key`.
    pub async fn acquire(&self, key: &K) -> Result<KeyedGuard<'_, K>> {
        let mutex = self.locks.entry(key.clone()).or_default().clone();
        match tokio::time::timeout(self.timeout, mutex.lock_owned()).await {
            Ok(guard) => Ok(KeyedGuard {
                locks: self,
                key: key.clone(),
                guard: Some(guard),
            }),
            Err(_) => {
                self.evict_if_unused(key);
                Err(EngineError::LockTimeout {
                    resource: format!("{} {}", self.family, key),
                })
            }
        }
    }

    /// Acquire the locks for all `keys`, deduplicated, in ascending order.
    pub async fn acquire_all(
        &self,
        keys: impl IntoIterator<Item = K>,
    ) -> Result<Vec<KeyedGuard<'_, K>>> {
        let ordered: BTreeSet<K> = keys.into_iter().collect();
        let mut guards = Vec::with_capacity(ordered.len());
        for key in &ordered {
            guards.push(self.acquire(key).await?);
        }
        Ok(guards)
    }

    /// Drop the entry for `key` unless a guard or a waiter still shares it.
    /// The table's own handle is the only one left when the count is 1.
    fn evict_if_unused(&self, key: &K) {
        self.locks
            .remove_if(key, |_, mutex| Arc::strong_count(mutex) == 1);
    }

    /// Number of keys currently held or waited on.
    pub fn len(&self) -> usize {
        self.locks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.locks.is_empty()
    }
}

/// A single mutex with the same timeout behavior as [`KeyedLocks`].
pub struct TimedLock {
    name: &'static str,
    mutex: Mutex<()>,
    timeout: Duration,
}

impl TimedLock {
    pub fn new(name: &'static str, timeout: Duration) -> Self {
        Self {
            name,
            mutex: Mutex::new(()),
            timeout,
        }
    }

    pub async fn acquire(&self) -> Result<MutexGuard<'_, ()>> {
        tokio::time::timeout(self.timeout, self.mutex.lock())
            .await
            .map_err(|_| EngineError::LockTimeout {
                resource: self.name.to_string(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use facility_types::{BlockId, FirearmSerial};

    #[tokio::test(start_paused = true)]
    async fn test_same_key_is_exclusive() {
        let locks = KeyedLocks::new("block", Duration::from_secs(5));
        let key = BlockId::new("B");

        let _held = locks.acquire(&key).await.unwrap();
        let second = locks.acquire(&key).await;
        assert!(matches!(second, Err(EngineError::LockTimeout { .. })));
    }

    #[tokio::test]
    async fn test_distinct_keys_do_not_block() {
        let locks = KeyedLocks::new("block", Duration::from_millis(20));
        let _a = locks.acquire(&BlockId::new("A")).await.unwrap();
        let _b = locks.acquire(&BlockId::new("B")).await.unwrap();
        assert_eq!(locks.len(), 2);
    }

    #[tokio::test]
    async fn test_acquire_all_deduplicates() {
        let locks = KeyedLocks::new("block", Duration::from_millis(20));
        let guards = locks
            .acquire_all([BlockId::new("B"), BlockId::new("A"), BlockId::new("B")])
            .await
            .unwrap();
        assert_eq!(guards.len(), 2);
        drop(guards);
        assert!(locks.is_empty());
    }

    #[tokio::test]
    async fn test_released_lock_can_be_reacquired() {
        let locks = KeyedLocks::new("block", Duration::from_millis(20));
        let key = BlockId::new("B");
        drop(locks.acquire(&key).await.unwrap());
        assert!(locks.acquire(&key).await.is_ok());
    }

    #[tokio::test]
    async fn test_released_keys_leave_no_entries() {
        let locks = KeyedLocks::new("firearm", Duration::from_millis(20));
        for i in 0..10_000 {
            let guard = locks.acquire(&FirearmSerial::new(format!("SN{i}"))).await;
            drop(guard);
        }
        assert_eq!(locks.len(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timed_out_waiter_leaves_holder_entry() {
        let locks = KeyedLocks::new("block", Duration::from_secs(5));
        let key = BlockId::new("B");

        let held = locks.acquire(&key).await.unwrap();
        assert!(locks.acquire(&key).await.is_err());
        assert_eq!(locks.len(), 1);

        drop(held);
        assert!(locks.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_waiter_gets_lock_after_release() {
        let locks = Arc::new(KeyedLocks::new("block", Duration::from_secs(5)));
        let key = BlockId::new("B");
        let held = locks.acquire(&key).await.unwrap();

        let waiter = {
            let locks = locks.clone();
            let key = key.clone();
            tokio::spawn(async move { locks.acquire(&key).await.is_ok() })
        };
        tokio::time::sleep(Duration::from_secs(1)).await;
        drop(held);

        assert!(waiter.await.unwrap());
        assert!(locks.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_timed_lock_times_out() {
        let lock = TimedLock::new("supervision graph", Duration::from_secs(5));
        let _held = lock.acquire().await.unwrap();
        let err = lock.acquire().await.unwrap_err();
        assert_eq!(
            err.to_string(),
            "timed out acquiring lock on supervision graph"
        );
    }
}
