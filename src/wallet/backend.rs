//! Ledger capability consumed by the wallet core
//!
//! Key management, address derivation and the full-node protocol live behind
//! this trait. The service ships one implementation, `ledger::MemoryLedger`.

use async_trait::async_trait;
use thiserror::Error;

use crate::balance::AddressOwnership;
use crate::core::{InputData, NetworkParams, Transaction, TransactionError};
use crate::utxo::{Utxo, UtxoFilter, UtxoRef};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BackendError {
    #[error("Ledger unavailable: {0}")]
    Unavailable(String),
    /// Submission refused; the message is the ledger's own
    #[error("{0}")]
    Rejected(String),
    #[error("Signing failed: {0}")]
    Signing(String),
}

/// A transaction as the ledger knows it, with spend tracking
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LedgerTransaction {
    pub tx: Transaction,
    /// Spending tx id per output, `None` while unspent
    pub spent_by: Vec<Option<String>>,
    /// Height of the block confirming the transaction
    pub height: Option<u64>,
}

impl LedgerTransaction {
    pub fn output_spent_by(&self, index: u32) -> Option<&str> {
        self.spent_by
            .get(index as usize)
            .and_then(|spent| spent.as_deref())
    }

    /// Output `index` in the shape coin selection works with
    pub fn utxo(&self, index: u32) -> Result<Option<Utxo>, TransactionError> {
        let Some(output) = self.tx.outputs.get(index as usize) else {
            return Ok(None);
        };
        let script = output.decoded_script()?;
        Ok(Some(Utxo {
            utxo: UtxoRef::new(&self.tx.id(), index),
            token: self.tx.token_uid(output)?,
            authorities: output.authorities(),
            amount: if output.is_authority() { 0 } else { output.value },
            address: script.address,
            timelock: script.timelock,
        }))
    }
}

#[async_trait]
pub trait WalletBackend: AddressOwnership + Send + Sync {
    fn network(&self) -> &NetworkParams;

    /// Unspent, unlocked outputs of `token` owned by the wallet
    async fn available_utxos(
        &self,
        token: &str,
        filter: &UtxoFilter,
    ) -> Result<Vec<Utxo>, BackendError>;

    async fn current_address(&self) -> Result<String, BackendError>;

    async fn change_address(&self) -> Result<String, BackendError>;

    async fn current_height(&self) -> Result<u64, BackendError>;

    async fn get_transaction(&self, tx_id: &str)
        -> Result<Option<LedgerTransaction>, BackendError>;

    /// Sign `digest` with the key behind `address`; `None` if the key isn't ours
    async fn sign_input(
        &self,
        address: &str,
        digest: &[u8],
    ) -> Result<Option<InputData>, BackendError>;

    /// Push a fully signed transaction, returning its id
    async fn submit(&self, tx: &Transaction) -> Result<String, BackendError>;
}
