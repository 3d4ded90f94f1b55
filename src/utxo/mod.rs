//! UTXO selection and reservation
//!
//! - `UtxoLockTable`: per-wallet record of outputs selected as inputs, with
//!   optional lazy expiry
//! - `select_utxos`: deterministic coin selection over the unlocked outputs
//!   the ledger reports as available

pub mod lock_table;
pub mod selector;

pub use lock_table::{LockedOutputs, Reservation, UtxoLockTable};
pub use selector::{choose_utxos, select_utxos, UtxoSelection};

use crate::core::Authorities;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Identity of a transaction output: `(tx_id, index)`
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct UtxoRef {
    #[serde(rename = "txId")]
    pub tx_id: String,
    pub index: u32,
}

impl UtxoRef {
    pub fn new(tx_id: &str, index: u32) -> Self {
        Self {
            tx_id: tx_id.to_string(),
            index,
        }
    }
}

impl fmt::Display for UtxoRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.tx_id, self.index)
    }
}

/// A spendable output as the ledger reports it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Utxo {
    pub utxo: UtxoRef,
    pub token: String,
    pub authorities: Authorities,
    pub amount: u64,
    pub address: String,
    pub timelock: Option<u32>,
}

/// Optional constraints on which outputs may be selected
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UtxoFilter {
    /// Only outputs paying to this address
    #[serde(default, rename = "filter_address")]
    pub address: Option<String>,
    /// Inclusive lower bound on the amount
    #[serde(default)]
    pub amount_bigger_than: Option<u64>,
    /// Inclusive upper bound on the amount
    #[serde(default)]
    pub amount_smaller_than: Option<u64>,
    #[serde(default)]
    pub max_utxos: Option<usize>,
    /// Restrict selection to exactly these outputs
    #[serde(default, skip)]
    pub only: Option<Vec<UtxoRef>>,
    /// Never select these outputs
    #[serde(default, skip)]
    pub exclude: Vec<UtxoRef>,
}

impl UtxoFilter {
    pub fn only(refs: Vec<UtxoRef>) -> Self {
        Self {
            only: Some(refs),
            ..Default::default()
        }
    }

    pub fn excluding(mut self, refs: impl IntoIterator<Item = UtxoRef>) -> Self {
        self.exclude.extend(refs);
        self
    }

    pub fn matches(&self, utxo: &Utxo) -> bool {
        if let Some(address) = &self.address {
            if &utxo.address != address {
                return false;
            }
        }
        if let Some(min) = self.amount_bigger_than {
            if utxo.amount < min {
                return false;
            }
        }
        if let Some(max) = self.amount_smaller_than {
            if utxo.amount > max {
                return false;
            }
        }
        if let Some(only) = &self.only {
            if !only.contains(&utxo.utxo) {
                return false;
            }
        }
        !self.exclude.contains(&utxo.utxo)
    }
}
