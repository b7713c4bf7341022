//! Worker pool — bounded, concurrency-safe checkout of live sessions.
//!
//! A fixed arena of [`WorkerSlot`]s (one per CPU declared per host)
//! behind a semaphore. [`WorkerPool::acquire`] blocks until a slot is
//! free and returns a guard that puts the slot back on drop, so every
//! exit path of a job execution releases exactly once. The pool never
//! destroys or reconnects a slot; transport recovery is the executor's
//! concern.

use std::collections::VecDeque;
use std::ops::{Deref, DerefMut};
use std::sync::{Arc, Mutex, MutexGuard};

use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio::task::JoinSet;
use tracing::{debug, info};

use caravan_core::Host;
use caravan_session::{ConnectionError, Connector, RemoteSession};

use crate::error::{SchedulerError, SchedulerResult};

/// One live session plus the host it belongs to.
///
/// Owned by the pool; checked out to exactly one job execution at a
/// time.
pub struct WorkerSlot {
    pub host: Host,
    pub session: Box<dyn RemoteSession>,
}

struct PoolInner {
    slots: Mutex<VecDeque<WorkerSlot>>,
    semaphore: Arc<Semaphore>,
    capacity: usize,
}

impl PoolInner {
    fn slots(&self) -> MutexGuard<'_, VecDeque<WorkerSlot>> {
        // A slot must make it back into the queue even if a panicking
        // job execution poisoned the mutex mid-unwind.
        self.slots.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Fixed-size pool of worker slots with semaphore-bounded checkout.
#[derive(Clone)]
pub struct WorkerPool {
    inner: Arc<PoolInner>,
}

impl std::fmt::Debug for WorkerPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerPool")
            .field("capacity", &self.inner.capacity)
            .finish_non_exhaustive()
    }
}

impl WorkerPool {
    /// Establish `cpu_count` sessions per host, all in parallel, and
    /// build the pool.
    ///
    /// Any single connection failure aborts the whole build (and cancels
    /// the outstanding connects): a silently smaller pool would break
    /// the capacity guarantee callers size their runs by.
    pub async fn build(hosts: &[Host], connector: Arc<dyn Connector>) -> SchedulerResult<Self> {
        let capacity: usize = hosts.iter().map(|h| h.cpu_count as usize).sum();

        let mut connects = JoinSet::new();
        for host in hosts {
            for _ in 0..host.cpu_count {
                let host = host.clone();
                let connector = Arc::clone(&connector);
                connects.spawn(async move {
                    let session = connector.connect(&host).await?;
                    Ok::<WorkerSlot, ConnectionError>(WorkerSlot { host, session })
                });
            }
        }

        let mut slots = VecDeque::with_capacity(capacity);
        while let Some(joined) = connects.join_next().await {
            let slot = joined.map_err(|e| SchedulerError::Task(e.to_string()))??;
            debug!(hostname = %slot.host.hostname, "worker session established");
            slots.push_back(slot);
        }

        info!(capacity, hosts = hosts.len(), "worker pool ready");
        Ok(Self {
            inner: Arc::new(PoolInner {
                slots: Mutex::new(slots),
                semaphore: Arc::new(Semaphore::new(capacity)),
                capacity,
            }),
        })
    }

    /// Total slot count, `== sum(host.cpu_count)`, fixed for the pool's
    /// lifetime.
    pub fn capacity(&self) -> usize {
        self.inner.capacity
    }

    /// Slots currently checked in.
    pub fn available(&self) -> usize {
        self.inner.slots().len()
    }

    /// Check out a slot, waiting until one is free.
    ///
    /// The guard returns the slot on drop; no explicit release call
    /// exists to forget.
    pub async fn acquire(&self) -> SchedulerResult<SlotGuard> {
        let permit = Arc::clone(&self.inner.semaphore)
            .acquire_owned()
            .await
            .map_err(|_| SchedulerError::PoolClosed)?;
        // Holding a permit guarantees a checked-in slot.
        let slot = self.inner.slots().pop_front().ok_or(SchedulerError::PoolClosed)?;
        Ok(SlotGuard {
            slot: Some(slot),
            inner: Arc::clone(&self.inner),
            _permit: permit,
        })
    }
}

/// A checked-out [`WorkerSlot`], returned to the pool when dropped.
pub struct SlotGuard {
    slot: Option<WorkerSlot>,
    inner: Arc<PoolInner>,
    _permit: OwnedSemaphorePermit,
}

impl Deref for SlotGuard {
    type Target = WorkerSlot;

    fn deref(&self) -> &WorkerSlot {
        // Invariant: Some until Drop takes it.
        self.slot.as_ref().expect("slot taken before drop")
    }
}

impl DerefMut for SlotGuard {
    fn deref_mut(&mut self) -> &mut WorkerSlot {
        self.slot.as_mut().expect("slot taken before drop")
    }
}

impl Drop for SlotGuard {
    fn drop(&mut self) {
        if let Some(slot) = self.slot.take() {
            self.inner.slots().push_back(slot);
        }
        // The permit drops after this body, so the next acquire only
        // wakes once the slot is back in the queue.
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use caravan_core::Credentials;
    use caravan_session::testing::MemoryConnector;

    fn host(hostname: &str, cpu_count: u32) -> Host {
        Host {
            hostname: hostname.to_string(),
            username: "u".to_string(),
            cpu_count,
            credentials: Credentials::Default,
        }
    }

    #[tokio::test]
    async fn capacity_matches_declared_cpus() {
        let connector = Arc::new(MemoryConnector::new());
        let hosts = [host("w1", 2), host("w2", 3)];
        let pool = WorkerPool::build(&hosts, connector.clone()).await.unwrap();
        assert_eq!(pool.capacity(), 5);
        assert_eq!(pool.available(), 5);
        assert_eq!(connector.connect_count(), 5);
    }

    #[tokio::test]
    async fn any_connect_failure_aborts_build() {
        let connector = Arc::new(MemoryConnector::new());
        connector.fail_connect("w2");
        let hosts = [host("w1", 2), host("w2", 1)];
        let err = WorkerPool::build(&hosts, connector).await.unwrap_err();
        assert!(matches!(err, SchedulerError::Connection(_)));
    }

    #[tokio::test]
    async fn acquire_blocks_at_capacity_until_release() {
        let connector = Arc::new(MemoryConnector::new());
        let pool = WorkerPool::build(&[host("w1", 2)], connector).await.unwrap();

        let a = pool.acquire().await.unwrap();
        let _b = pool.acquire().await.unwrap();
        assert_eq!(pool.available(), 0);

        // Third acquire must block while both slots are out.
        let pending = tokio::time::timeout(Duration::from_millis(20), pool.acquire()).await;
        assert!(pending.is_err());

        drop(a);
        let c = tokio::time::timeout(Duration::from_millis(100), pool.acquire())
            .await
            .expect("acquire should complete after a release")
            .unwrap();
        assert_eq!(c.host.hostname, "w1");
    }

    #[tokio::test]
    async fn at_most_capacity_slots_held_concurrently() {
        let connector = Arc::new(MemoryConnector::new());
        let pool = WorkerPool::build(&[host("w1", 2)], connector).await.unwrap();

        let held = Arc::new(AtomicUsize::new(0));
        let max_held = Arc::new(AtomicUsize::new(0));

        let mut tasks = JoinSet::new();
        for _ in 0..8 {
            let pool = pool.clone();
            let held = Arc::clone(&held);
            let max_held = Arc::clone(&max_held);
            tasks.spawn(async move {
                let _guard = pool.acquire().await.unwrap();
                let now = held.fetch_add(1, Ordering::SeqCst) + 1;
                max_held.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(5)).await;
                held.fetch_sub(1, Ordering::SeqCst);
            });
        }
        while tasks.join_next().await.is_some() {}

        assert!(max_held.load(Ordering::SeqCst) <= 2);
        assert_eq!(pool.available(), 2);
    }

    #[tokio::test]
    async fn slot_returns_even_when_holder_panics() {
        let connector = Arc::new(MemoryConnector::new());
        let pool = WorkerPool::build(&[host("w1", 1)], connector).await.unwrap();

        let panicking = {
            let pool = pool.clone();
            tokio::spawn(async move {
                let _guard = pool.acquire().await.unwrap();
                panic!("job blew up");
            })
        };
        assert!(panicking.await.is_err());

        // The slot must be back despite the panic.
        let guard = tokio::time::timeout(Duration::from_millis(100), pool.acquire())
            .await
            .expect("slot should have been released by the panicking task")
            .unwrap();
        assert_eq!(guard.host.hostname, "w1");
    }
}
