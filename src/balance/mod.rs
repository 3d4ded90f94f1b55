//! Balance delta calculator
//!
//! Computes, per token, how a transaction moves a wallet's locked/unlocked
//! amounts and mint/melt authority counts. Pure: nothing is read from or
//! written to the ledger, so it runs concurrently for any number of
//! transactions.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::core::{Authorities, TOKEN_AUTHORITY_MASK};

/// Wallet-side ownership check
pub trait AddressOwnership {
    fn is_address_mine(&self, address: &str) -> bool;
}

// =============================================================================
// Observed transactions
// =============================================================================

/// An input with the output it spends already resolved
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObservedInput {
    pub tx_id: String,
    pub index: u32,
    pub value: u64,
    pub token: String,
    pub token_data: u8,
    pub address: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObservedOutput {
    pub value: u64,
    pub token: String,
    pub token_data: u8,
    /// `None` for scripts that don't pay to an address
    pub address: Option<String>,
    pub timelock: Option<u32>,
}

fn is_authority(token_data: u8) -> bool {
    token_data & TOKEN_AUTHORITY_MASK != 0
}

/// Transaction as the ledger feed delivers it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObservedTransaction {
    pub tx_id: String,
    pub inputs: Vec<ObservedInput>,
    pub outputs: Vec<ObservedOutput>,
    /// Block height, set for block rewards
    pub height: Option<u64>,
}

/// Chain state the lock classification depends on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChainContext {
    pub current_height: u64,
    /// Unix seconds
    pub now: i64,
    pub reward_spend_min_blocks: u64,
}

impl ChainContext {
    /// Either a future timelock or an immature reward height locks an output
    pub fn is_output_locked(&self, output: &ObservedOutput, height: Option<u64>) -> bool {
        let time_locked = output
            .timelock
            .is_some_and(|timelock| i64::from(timelock) > self.now);
        let height_locked = height.is_some_and(|height| {
            self.current_height < height.saturating_add(self.reward_spend_min_blocks)
        });
        time_locked || height_locked
    }
}

// =============================================================================
// Balance delta
// =============================================================================

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AmountDelta {
    pub locked: i64,
    pub unlocked: i64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthorityCounts {
    pub mint: i64,
    pub melt: i64,
}

impl AuthorityCounts {
    fn apply(&mut self, authorities: Authorities, sign: i64) {
        self.mint += sign * authorities.count(Authorities::MINT);
        self.melt += sign * authorities.count(Authorities::MELT);
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthorityDelta {
    pub locked: AuthorityCounts,
    pub unlocked: AuthorityCounts,
}

/// Net effect of one transaction on one token of a wallet
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BalanceDelta {
    pub tokens: AmountDelta,
    pub authorities: AuthorityDelta,
}

impl BalanceDelta {
    pub fn is_zero(&self) -> bool {
        *self == BalanceDelta::default()
    }
}

/// Per-token balance change `tx` causes for `wallet`
///
/// Tokens the wallet touches with a net-zero effect stay in the map; a
/// transaction unrelated to the wallet yields an empty map.
pub fn compute_balance<W: AddressOwnership + ?Sized>(
    wallet: &W,
    ctx: &ChainContext,
    tx: &ObservedTransaction,
) -> BTreeMap<String, BalanceDelta> {
    let mut deltas: BTreeMap<String, BalanceDelta> = BTreeMap::new();

    for input in &tx.inputs {
        if !wallet.is_address_mine(&input.address) {
            continue;
        }
        let delta = deltas.entry(input.token.clone()).or_default();
        if is_authority(input.token_data) {
            let authorities = Authorities::from_bits_truncate(input.value as u8);
            delta.authorities.unlocked.apply(authorities, -1);
        } else {
            delta.tokens.unlocked -= input.value as i64;
        }
    }

    for output in &tx.outputs {
        let Some(address) = output.address.as_deref() else {
            continue;
        };
        if !wallet.is_address_mine(address) {
            continue;
        }
        let locked = ctx.is_output_locked(output, tx.height);
        let delta = deltas.entry(output.token.clone()).or_default();
        if is_authority(output.token_data) {
            let authorities = Authorities::from_bits_truncate(output.value as u8);
            let counts = if locked {
                &mut delta.authorities.locked
            } else {
                &mut delta.authorities.unlocked
            };
            counts.apply(authorities, 1);
        } else if locked {
            delta.tokens.locked += output.value as i64;
        } else {
            delta.tokens.unlocked += output.value as i64;
        }
    }

    deltas
}
