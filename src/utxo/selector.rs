//! Deterministic coin selection
//!
//! Candidates are ordered by amount (largest first, ties by reference). When
//! one output alone is larger than the target, the smallest single output that
//! still covers it is taken; otherwise outputs accumulate largest-first.

use crate::utxo::{UtxoFilter, UtxoLockTable, Utxo};
use crate::wallet::{WalletBackend, WalletError};

/// Outputs chosen to cover an amount
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UtxoSelection {
    pub utxos: Vec<Utxo>,
    /// Sum of every unlocked candidate, not only the chosen ones
    pub total_available: u64,
}

impl UtxoSelection {
    fn total(&self) -> u128 {
        self.utxos.iter().map(|u| u128::from(u.amount)).sum()
    }

    /// Sum of the chosen outputs, capped at `u64::MAX`
    pub fn amount(&self) -> u64 {
        u64::try_from(self.total()).unwrap_or(u64::MAX)
    }

    /// What's left over after paying `amount`
    pub fn change(&self, amount: u64) -> u64 {
        let change = self.total().saturating_sub(u128::from(amount));
        u64::try_from(change).unwrap_or(u64::MAX)
    }
}

fn sort_candidates(candidates: &mut [Utxo]) {
    candidates.sort_by(|a, b| b.amount.cmp(&a.amount).then_with(|| a.utxo.cmp(&b.utxo)));
}

/// Pick outputs from `candidates` (already ordered) covering `amount`
pub fn choose_utxos(candidates: &[Utxo], amount: u64) -> Option<Vec<Utxo>> {
    let largest = candidates.first()?;

    if largest.amount > amount {
        return candidates
            .iter()
            .filter(|u| u.amount >= amount)
            .min_by(|a, b| a.amount.cmp(&b.amount).then_with(|| a.utxo.cmp(&b.utxo)))
            .map(|u| vec![u.clone()]);
    }

    let mut chosen = Vec::new();
    let mut filled = 0u64;
    for utxo in candidates {
        chosen.push(utxo.clone());
        filled = filled.saturating_add(utxo.amount);
        if filled >= amount {
            return Some(chosen);
        }
    }
    None
}

/// Select unlocked outputs of `token` covering `amount`
///
/// Never returns an output the lock table currently holds. Running short is
/// reported as `InsufficientFunds` with the missing amount.
pub async fn select_utxos(
    backend: &dyn WalletBackend,
    locks: &UtxoLockTable,
    token: &str,
    amount: u64,
    filter: &UtxoFilter,
) -> Result<UtxoSelection, WalletError> {
    if amount == 0 {
        return Err(WalletError::validation("Amount must be greater than zero"));
    }

    let mut candidates: Vec<Utxo> = backend
        .available_utxos(token, filter)
        .await?
        .into_iter()
        .filter(|u| u.token == token && u.authorities.is_empty())
        .filter(|u| filter.matches(u) && !locks.is_locked(&u.utxo))
        .collect();
    sort_candidates(&mut candidates);
    if let Some(max) = filter.max_utxos {
        candidates.truncate(max);
    }

    let total_available = candidates
        .iter()
        .fold(0u64, |total, u| total.saturating_add(u.amount));
    let utxos = choose_utxos(&candidates, amount).ok_or_else(|| WalletError::InsufficientFunds {
        token: token.to_string(),
        shortfall: amount.saturating_sub(total_available),
    })?;

    log::debug!(
        "Selected {} outputs of token {} for {} ({} available)",
        utxos.len(),
        token,
        amount,
        total_available
    );

    Ok(UtxoSelection {
        utxos,
        total_available,
    })
}
