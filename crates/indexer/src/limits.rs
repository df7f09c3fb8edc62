use insight_vector_store::Fingerprint;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::{OwnedMutexGuard, OwnedSemaphorePermit, Semaphore};

const MAX_MATERIALIZE_CONCURRENCY: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConcurrencySnapshot {
    pub limit: usize,
    pub in_flight: usize,
    pub waiters: usize,
}

/// Bounds how many resources are archived and have their maps fetched at
/// once. Waiters are served in arrival order.
#[derive(Debug)]
pub struct MaterializeLimiter {
    limit: usize,
    semaphore: Arc<Semaphore>,
    counters: Arc<Counters>,
}

#[derive(Debug, Default)]
struct Counters {
    in_flight: AtomicUsize,
    waiters: AtomicUsize,
}

pub(crate) struct MaterializePermit {
    #[allow(dead_code)]
    permit: OwnedSemaphorePermit,
    counters: Arc<Counters>,
}

impl Drop for MaterializePermit {
    fn drop(&mut self) {
        self.counters.in_flight.fetch_sub(1, Ordering::Relaxed);
    }
}

struct WaiterGuard<'a>(&'a Counters);

impl<'a> WaiterGuard<'a> {
    fn new(counters: &'a Counters) -> Self {
        counters.waiters.fetch_add(1, Ordering::Relaxed);
        Self(counters)
    }
}

impl Drop for WaiterGuard<'_> {
    fn drop(&mut self) {
        self.0.waiters.fetch_sub(1, Ordering::Relaxed);
    }
}

impl MaterializeLimiter {
    pub fn new(limit: usize) -> Self {
        let limit = limit.clamp(1, MAX_MATERIALIZE_CONCURRENCY);
        Self {
            limit,
            semaphore: Arc::new(Semaphore::new(limit)),
            counters: Arc::new(Counters::default()),
        }
    }

    pub fn snapshot(&self) -> ConcurrencySnapshot {
        ConcurrencySnapshot {
            limit: self.limit,
            in_flight: self.counters.in_flight.load(Ordering::Relaxed),
            waiters: self.counters.waiters.load(Ordering::Relaxed),
        }
    }

    pub(crate) async fn acquire(&self) -> MaterializePermit {
        // The semaphore is never closed; acquire failures are not expected.
        let waiter = WaiterGuard::new(&self.counters);
        let permit = self
            .semaphore
            .clone()
            .acquire_owned()
            .await
            .unwrap_or_else(|_| unreachable!("materialize semaphore closed"));
        drop(waiter);
        self.counters.in_flight.fetch_add(1, Ordering::Relaxed);
        MaterializePermit {
            permit,
            counters: self.counters.clone(),
        }
    }
}

/// One async mutex per fingerprint, so a fingerprint is indexed by one
/// capture at a time. Tokio mutexes queue waiters fairly, so the first
/// caller to ask wins.
#[derive(Debug, Default)]
pub struct FingerprintLocks {
    locks: Mutex<HashMap<Fingerprint, Arc<tokio::sync::Mutex<()>>>>,
}

impl FingerprintLocks {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn lock(&self, fingerprint: &Fingerprint) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
            locks.retain(|_, lock| Arc::strong_count(lock) > 1);
            locks.entry(fingerprint.clone()).or_default().clone()
        };
        lock.lock_owned().await
    }

    /// Fingerprints currently held or waited on
    pub fn active(&self) -> usize {
        let locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        locks.values().filter(|lock| Arc::strong_count(lock) > 1).count()
    }
}
