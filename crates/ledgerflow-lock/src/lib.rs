//! LedgerFlow Lock - Keyed mutual exclusion for payment finalization
//!
//! The lock is the only serialization point between reconciliation runs:
//! whoever holds the key for a payment hash owns the right to finalize it.
//!
//! - **[`DistributedLock`]**: acquire a key, get a [`LockGuard`]
//! - **[`LockGuard`]**: releases the key when dropped, on every exit path
//! - **[`with_lock`]**: run a critical section while holding a key
//! - **[`InMemoryLockService`]**: in-process implementation with an
//!   acquisition timeout

use std::any::Any;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use tokio::sync::Mutex;
use tracing::{debug, trace};

use ledgerflow_types::{LedgerFlowError, PaymentHash, Result};

/// Proof of ownership of a lock key
///
/// Whatever the backend needs to release the key lives in `_release`;
/// dropping the guard drops it.
pub struct LockGuard {
    key: String,
    _release: Box<dyn Any + Send + Sync>,
}

impl LockGuard {
    pub fn new(key: impl Into<String>, release: Box<dyn Any + Send + Sync>) -> Self {
        Self {
            key: key.into(),
            _release: release,
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }
}

impl fmt::Debug for LockGuard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LockGuard").field("key", &self.key).finish()
    }
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        trace!(key = %self.key, "Released lock");
    }
}

/// Mutual exclusion by key across every caller sharing the backend
///
/// Acquisition must fail with an error rather than wait forever, and must
/// never hand the same key to two owners at once.
#[async_trait]
pub trait DistributedLock: Send + Sync {
    async fn acquire(&self, key: &str) -> Result<LockGuard>;
}

/// Run `body` while holding `key`
///
/// The guard is dropped when `body` completes, fails or unwinds.
pub async fn with_lock<L, F, Fut, T>(lock: &L, key: &str, body: F) -> Result<T>
where
    L: DistributedLock + ?Sized,
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let guard = lock.acquire(key).await?;
    debug!(key = %guard.key(), "Acquired lock");
    let result = body().await;
    drop(guard);
    result
}

/// Run `body` while holding the lock for a payment hash
pub async fn with_payment_hash_lock<L, F, Fut, T>(lock: &L, payment_hash: &PaymentHash, body: F) -> Result<T>
where
    L: DistributedLock + ?Sized,
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    with_lock(lock, &payment_hash.lock_key(), body).await
}

/// In-process lock service
///
/// One async mutex per key. Clones share the same keys.
#[derive(Clone)]
pub struct InMemoryLockService {
    locks: Arc<DashMap<String, Arc<Mutex<()>>>>,
    acquire_timeout: Duration,
}

impl InMemoryLockService {
    pub fn new(acquire_timeout: Duration) -> Self {
        Self {
            locks: Arc::new(DashMap::new()),
            acquire_timeout,
        }
    }

    /// Forget keys nobody holds or waits for
    pub fn prune(&self) -> usize {
        let before = self.locks.len();
        self.locks.retain(|_, mutex| Arc::strong_count(mutex) > 1);
        before.saturating_sub(self.locks.len())
    }

    pub fn key_count(&self) -> usize {
        self.locks.len()
    }
}

impl Default for InMemoryLockService {
    fn default() -> Self {
        Self::new(Duration::from_secs(30))
    }
}

#[async_trait]
impl DistributedLock for InMemoryLockService {
    async fn acquire(&self, key: &str) -> Result<LockGuard> {
        let mutex = Arc::clone(self.locks.entry(key.to_string()).or_default().value());

        let owned = tokio::time::timeout(self.acquire_timeout, mutex.lock_owned())
            .await
            .map_err(|_| LedgerFlowError::LockAcquisitionTimeout {
                key: key.to_string(),
                waited_ms: self.acquire_timeout.as_millis() as u64,
            })?;

        Ok(LockGuard::new(key, Box::new(owned)))
    }
}
