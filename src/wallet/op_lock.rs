//! Per-wallet operation mutex
//!
//! Every transaction-building or sending operation on a wallet runs under this
//! lock. Acquisition never waits: a second caller gets `WalletLocked` right
//! away. A holder that outlives the stale timeout can be displaced, after
//! which its guard no longer releases anything.

use std::future::Future;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::time::Duration;

use tokio::time::Instant;

use crate::wallet::WalletError;

/// Default age after which a held lock may be reclaimed
pub const DEFAULT_STALE_TIMEOUT: Duration = Duration::from_secs(120);

const FREE: u64 = 0;

// Lock state packs the holder token (high half) with the acquisition time in
// seconds since `epoch` (low half), so both change in one atomic step.
fn pack(token: u32, since: u32) -> u64 {
    (u64::from(token) << 32) | u64::from(since)
}

fn acquired_at(state: u64) -> u32 {
    state as u32
}

#[derive(Debug)]
pub struct OperationLock {
    state: AtomicU64,
    next_token: AtomicU32,
    epoch: Instant,
    stale_after: Duration,
}

impl Default for OperationLock {
    fn default() -> Self {
        Self::new(DEFAULT_STALE_TIMEOUT)
    }
}

impl OperationLock {
    pub fn new(stale_after: Duration) -> Self {
        Self {
            state: AtomicU64::new(FREE),
            next_token: AtomicU32::new(1),
            epoch: Instant::now(),
            stale_after,
        }
    }

    fn elapsed_secs(&self) -> u32 {
        Instant::now().duration_since(self.epoch).as_secs() as u32
    }

    fn is_stale(&self, state: u64) -> bool {
        let held_for = self.elapsed_secs().saturating_sub(acquired_at(state));
        u64::from(held_for) >= self.stale_after.as_secs()
    }

    pub fn is_locked(&self) -> bool {
        let state = self.state.load(Ordering::Acquire);
        state != FREE && !self.is_stale(state)
    }

    /// Take the lock or fail immediately with `WalletLocked`
    pub fn try_acquire(&self) -> Result<OperationGuard<'_>, WalletError> {
        let token = self.next_token.fetch_add(1, Ordering::Relaxed).max(1);
        let ours = pack(token, self.elapsed_secs());

        match self
            .state
            .compare_exchange(FREE, ours, Ordering::AcqRel, Ordering::Acquire)
        {
            Ok(_) => Ok(OperationGuard { lock: self, state: ours }),
            Err(current) if self.is_stale(current) => {
                self.state
                    .compare_exchange(current, ours, Ordering::AcqRel, Ordering::Acquire)
                    .map_err(|_| WalletError::WalletLocked)?;
                log::warn!(
                    "Reclaimed operation lock held for more than {:?}",
                    self.stale_after
                );
                Ok(OperationGuard { lock: self, state: ours })
            }
            Err(_) => Err(WalletError::WalletLocked),
        }
    }

    /// Run `operation` while holding the lock
    pub async fn with_lock<F, T>(&self, operation: F) -> Result<T, WalletError>
    where
        F: Future<Output = Result<T, WalletError>>,
    {
        let _guard = self.try_acquire()?;
        operation.await
    }
}

/// Held operation lock; dropping it releases the lock if still ours
#[must_use = "the lock is released as soon as the guard is dropped"]
#[derive(Debug)]
pub struct OperationGuard<'a> {
    lock: &'a OperationLock,
    state: u64,
}

impl Drop for OperationGuard<'_> {
    fn drop(&mut self) {
        let _ = self.lock.state.compare_exchange(
            self.state,
            FREE,
            Ordering::AcqRel,
            Ordering::Acquire,
        );
    }
}
