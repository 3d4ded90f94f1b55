//! Per-wallet UTXO lock table
//!
//! Records which outputs are currently "selected as input" so concurrent or
//! successive operations never pick the same output twice. Entries may carry
//! an expiry; an expired entry reads as unlocked and is purged on the next
//! read, so no background sweeper is needed.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use serde::Serialize;
use tokio::time::Instant;

use crate::utxo::UtxoRef;

/// A reservation of one output
#[derive(Debug, Clone)]
struct LockEntry {
    expires_at: Option<Instant>,
}

impl LockEntry {
    fn is_expired(&self, now: Instant) -> bool {
        matches!(self.expires_at, Some(at) if at <= now)
    }
}

/// Locked output indexes of one transaction
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LockedOutputs {
    pub tx_id: String,
    pub outputs: Vec<u32>,
}

#[derive(Debug, Default)]
pub struct UtxoLockTable {
    entries: Mutex<HashMap<UtxoRef, LockEntry>>,
}

impl UtxoLockTable {
    pub fn new() -> Self {
        Self::default()
    }

    fn entries(&self) -> MutexGuard<'_, HashMap<UtxoRef, LockEntry>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Lock (optionally until `ttl` elapses) or unlock an output
    pub fn mark_selected(&self, utxo: &UtxoRef, locked: bool, ttl: Option<Duration>) {
        let mut entries = self.entries();
        if locked {
            let expires_at = ttl.map(|ttl| Instant::now() + ttl);
            entries.insert(utxo.clone(), LockEntry { expires_at });
            log::debug!("UTXO {} selected as input (ttl: {:?})", utxo, ttl);
        } else if entries.remove(utxo).is_some() {
            log::debug!("UTXO {} released", utxo);
        }
    }

    pub fn is_locked(&self, utxo: &UtxoRef) -> bool {
        let now = Instant::now();
        let mut entries = self.entries();
        match entries.get(utxo) {
            Some(entry) if entry.is_expired(now) => {
                entries.remove(utxo);
                false
            }
            Some(_) => true,
            None => false,
        }
    }

    /// Release every given output, returning how many were locked
    pub fn unlock_many<'a>(&self, utxos: impl IntoIterator<Item = &'a UtxoRef>) -> usize {
        let now = Instant::now();
        let mut entries = self.entries();
        utxos
            .into_iter()
            .filter_map(|utxo| entries.remove(utxo))
            .filter(|entry| !entry.is_expired(now))
            .count()
    }

    /// Lock all `utxos`, handing back a guard that releases them unless committed
    pub fn reserve(&self, utxos: Vec<UtxoRef>, ttl: Option<Duration>) -> Reservation<'_> {
        for utxo in &utxos {
            self.mark_selected(utxo, true, ttl);
        }
        Reservation {
            table: self,
            utxos,
            committed: false,
        }
    }

    /// Currently locked outputs, sorted
    pub fn locked(&self) -> Vec<UtxoRef> {
        let now = Instant::now();
        let mut entries = self.entries();
        entries.retain(|_, entry| !entry.is_expired(now));
        let mut refs: Vec<UtxoRef> = entries.keys().cloned().collect();
        refs.sort();
        refs
    }

    /// Locked outputs grouped by transaction
    pub fn locked_utxos(&self) -> Vec<LockedOutputs> {
        let mut grouped: BTreeMap<String, Vec<u32>> = BTreeMap::new();
        for utxo in self.locked() {
            grouped.entry(utxo.tx_id).or_default().push(utxo.index);
        }
        grouped
            .into_iter()
            .map(|(tx_id, outputs)| LockedOutputs { tx_id, outputs })
            .collect()
    }

    pub fn clear(&self) {
        self.entries().clear();
    }

    pub fn len(&self) -> usize {
        self.locked().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Outputs locked on behalf of one in-flight operation
///
/// Dropping an uncommitted reservation releases its outputs, which covers
/// early returns, errors and cancelled futures alike.
#[must_use = "dropping a reservation releases its outputs"]
pub struct Reservation<'a> {
    table: &'a UtxoLockTable,
    utxos: Vec<UtxoRef>,
    committed: bool,
}

impl Reservation<'_> {
    pub fn utxos(&self) -> &[UtxoRef] {
        &self.utxos
    }

    /// Keep the outputs locked after this reservation goes away
    pub fn commit(mut self) {
        self.committed = true;
    }

    /// Release now (same as dropping, but explicit at call sites)
    pub fn release(self) {}
}

impl Drop for Reservation<'_> {
    fn drop(&mut self) {
        if !self.committed && !self.utxos.is_empty() {
            let released = self.table.unlock_many(&self.utxos);
            log::debug!("Rolled back reservation of {} UTXOs", released);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mark_and_unmark() {
        let table = UtxoLockTable::new();
        let utxo = UtxoRef::new("tx1", 0);

        table.mark_selected(&utxo, true, None);
        assert!(table.is_locked(&utxo));

        table.mark_selected(&utxo, false, None);
        assert!(!table.is_locked(&utxo));

        // unlocking an unknown output is a no-op
        table.mark_selected(&UtxoRef::new("tx9", 9), false, None);
        assert!(table.is_empty());
    }

    #[test]
    fn test_single_entry_per_reference() {
        let table = UtxoLockTable::new();
        let utxo = UtxoRef::new("tx1", 0);
        table.mark_selected(&utxo, true, Some(Duration::from_secs(5)));
        table.mark_selected(&utxo, true, None);
        assert_eq!(table.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_ttl_expires_lazily() {
        let table = UtxoLockTable::new();
        let utxo = UtxoRef::new("tx1", 0);
        table.mark_selected(&utxo, true, Some(Duration::from_secs(1)));
        assert!(table.is_locked(&utxo));

        tokio::time::advance(Duration::from_secs(2)).await;
        assert!(!table.is_locked(&utxo));
        assert!(table.locked_utxos().is_empty());
    }

    #[test]
    fn test_grouped_by_transaction() {
        let table = UtxoLockTable::new();
        for (tx, index) in [("b", 1), ("a", 2), ("a", 0)] {
            table.mark_selected(&UtxoRef::new(tx, index), true, None);
        }
        assert_eq!(
            table.locked_utxos(),
            vec![
                LockedOutputs {
                    tx_id: "a".to_string(),
                    outputs: vec![0, 2]
                },
                LockedOutputs {
                    tx_id: "b".to_string(),
                    outputs: vec![1]
                },
            ]
        );
    }

    #[test]
    fn test_reservation_rolls_back_on_drop() {
        let table = UtxoLockTable::new();
        let utxos = vec![UtxoRef::new("tx1", 0), UtxoRef::new("tx1", 1)];

        {
            let reservation = table.reserve(utxos.clone(), None);
            assert_eq!(reservation.utxos().len(), 2);
            assert_eq!(table.len(), 2);
        }
        assert!(table.is_empty());

        table.reserve(utxos, None).commit();
        assert_eq!(table.len(), 2);
    }
}
