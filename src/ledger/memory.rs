//! In-process ledger
//!
//! A single-node ledger that confirms every accepted transaction in its own
//! block. It backs the development server and the test suite: wallets are
//! plain key sets over a shared `MemoryLedger`, and every accepted
//! transaction is published on a broadcast feed for balance notifications.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::{broadcast, RwLock};

use crate::balance::{AddressOwnership, ObservedInput, ObservedOutput, ObservedTransaction};
use crate::core::{
    token_data, Authorities, InputData, NetworkParams, OutputScript, Transaction, TxOutput,
    NATIVE_TOKEN_UID,
};
use crate::crypto::{address_from_public_key, verify_digest, KeyPair};
use crate::utxo::{Utxo, UtxoFilter};
use crate::wallet::{BackendError, LedgerTransaction, WalletBackend};

/// Buffered feed events per subscriber
const FEED_CAPACITY: usize = 256;

#[derive(Default)]
struct LedgerState {
    transactions: HashMap<String, LedgerTransaction>,
    height: u64,
}

impl LedgerState {
    fn spent_output(&self, tx_id: &str, index: u32) -> Result<(&LedgerTransaction, &TxOutput), BackendError> {
        let spent = self
            .transactions
            .get(tx_id)
            .ok_or_else(|| BackendError::Rejected(format!("Input {}:{} not found", tx_id, index)))?;
        let output = spent
            .tx
            .outputs
            .get(index as usize)
            .ok_or_else(|| BackendError::Rejected(format!("Input {}:{} not found", tx_id, index)))?;
        Ok((spent, output))
    }

    fn observe(&self, tx: &Transaction) -> ObservedTransaction {
        let inputs = tx
            .inputs
            .iter()
            .filter_map(|input| {
                let (spent, output) = self.spent_output(&input.tx_id, input.index).ok()?;
                Some(ObservedInput {
                    tx_id: input.tx_id.clone(),
                    index: input.index,
                    value: output.value,
                    token: spent.tx.token_uid(output).ok()?,
                    token_data: output.token_data,
                    address: output.decoded_script().ok()?.address,
                })
            })
            .collect();
        let outputs = tx
            .outputs
            .iter()
            .map(|output| {
                let script = output.decoded_script().ok();
                ObservedOutput {
                    value: output.value,
                    token: tx
                        .token_uid(output)
                        .unwrap_or_else(|_| NATIVE_TOKEN_UID.to_string()),
                    token_data: output.token_data,
                    address: script.as_ref().map(|s| s.address.clone()),
                    timelock: script.and_then(|s| s.timelock),
                }
            })
            .collect();
        ObservedTransaction {
            tx_id: tx.id(),
            inputs,
            outputs,
            height: None,
        }
    }

    fn confirm(&mut self, tx: &Transaction) -> String {
        self.height += 1;
        let tx_id = tx.id();
        self.transactions.insert(
            tx_id.clone(),
            LedgerTransaction {
                tx: tx.clone(),
                spent_by: vec![None; tx.outputs.len()],
                height: Some(self.height),
            },
        );
        tx_id
    }
}

// ===== Ledger =====

pub struct MemoryLedger {
    network: NetworkParams,
    state: RwLock<LedgerState>,
    feed: broadcast::Sender<ObservedTransaction>,
}

impl MemoryLedger {
    pub fn new(network: NetworkParams) -> Self {
        let (feed, _) = broadcast::channel(FEED_CAPACITY);
        Self {
            network,
            state: RwLock::new(LedgerState::default()),
            feed,
        }
    }

    pub fn network(&self) -> &NetworkParams {
        &self.network
    }

    /// Accepted transactions, with their inputs resolved
    pub fn subscribe(&self) -> broadcast::Receiver<ObservedTransaction> {
        self.feed.subscribe()
    }

    pub async fn height(&self) -> u64 {
        self.state.read().await.height
    }

    pub async fn get(&self, tx_id: &str) -> Option<LedgerTransaction> {
        self.state.read().await.transactions.get(tx_id).cloned()
    }

    /// Create new `token` value out of thin air, one output per allocation
    pub async fn mint(&self, token: &str, allocations: &[(&str, u64)]) -> String {
        let (tokens, data) = if token == NATIVE_TOKEN_UID {
            (Vec::new(), token_data(0, false))
        } else {
            (vec![token.to_string()], token_data(1, false))
        };
        let outputs = allocations
            .iter()
            .map(|(address, amount)| TxOutput::new(*amount, data, &OutputScript::new(address, None)))
            .collect();
        self.insert_genesis(Transaction::new(tokens, Vec::new(), outputs))
            .await
    }

    /// Create a mint/melt authority output for a custom token
    pub async fn mint_authority(&self, token: &str, address: &str, authorities: Authorities) -> String {
        let output = TxOutput::new(
            authorities.bits() as u64,
            token_data(1, true),
            &OutputScript::new(address, None),
        );
        self.insert_genesis(Transaction::new(vec![token.to_string()], Vec::new(), vec![output]))
            .await
    }

    async fn insert_genesis(&self, mut tx: Transaction) -> String {
        let mut state = self.state.write().await;
        // identical allocations within one second would otherwise share an id
        while state.transactions.contains_key(&tx.id()) {
            tx.timestamp += 1;
        }
        let observed = state.observe(&tx);
        let tx_id = state.confirm(&tx);
        drop(state);

        log::debug!("Ledger genesis tx {}", tx_id);
        let _ = self.feed.send(observed);
        tx_id
    }

    /// Unspent, spendable outputs whose address satisfies `owns`
    pub async fn utxos(&self, owns: impl Fn(&str) -> bool, token: &str) -> Vec<Utxo> {
        let now = Utc::now().timestamp();
        let state = self.state.read().await;
        let mut utxos = Vec::new();
        for entry in state.transactions.values() {
            for index in 0..entry.tx.outputs.len() as u32 {
                if entry.output_spent_by(index).is_some() {
                    continue;
                }
                let Ok(Some(utxo)) = entry.utxo(index) else {
                    continue;
                };
                if utxo.token != token
                    || !owns(&utxo.address)
                    || utxo.timelock.is_some_and(|t| i64::from(t) > now)
                {
                    continue;
                }
                utxos.push(utxo);
            }
        }
        utxos.sort_by(|a, b| a.utxo.cmp(&b.utxo));
        utxos
    }

    /// Validate and confirm a signed transaction
    pub async fn submit(&self, tx: &Transaction) -> Result<String, BackendError> {
        tx.check_limits()
            .map_err(|e| BackendError::Rejected(e.to_string()))?;
        if tx.inputs.is_empty() || tx.outputs.is_empty() {
            return Err(BackendError::Rejected(
                "Transaction must have inputs and outputs".to_string(),
            ));
        }

        let mut state = self.state.write().await;
        let digest = tx.data_to_sign();
        let mut balances: BTreeMap<String, (i128, Authorities)> = BTreeMap::new();

        for (i, input) in tx.inputs.iter().enumerate() {
            if tx.inputs[..i]
                .iter()
                .any(|other| other.tx_id == input.tx_id && other.index == input.index)
            {
                return Err(BackendError::Rejected(format!("Input {} used twice", i)));
            }
            let (spent, output) = state.spent_output(&input.tx_id, input.index)?;
            if let Some(spender) = spent.output_spent_by(input.index) {
                return Err(BackendError::Rejected(format!(
                    "Input {}:{} already spent by {}",
                    input.tx_id, input.index, spender
                )));
            }
            let address = output
                .decoded_script()
                .map_err(|e| BackendError::Rejected(e.to_string()))?
                .address;
            check_input_signature(i, &input.data, &address, &digest)?;

            let token = spent
                .tx
                .token_uid(output)
                .map_err(|e| BackendError::Rejected(e.to_string()))?;
            let entry = balances.entry(token).or_default();
            if output.is_authority() {
                entry.1 |= output.authorities();
            } else {
                entry.0 -= i128::from(output.value);
            }
        }

        let mut created: BTreeMap<String, (i128, Authorities)> = BTreeMap::new();
        for output in &tx.outputs {
            let token = tx
                .token_uid(output)
                .map_err(|e| BackendError::Rejected(e.to_string()))?;
            let entry = created.entry(token).or_default();
            if output.is_authority() {
                entry.1 |= output.authorities();
            } else {
                entry.0 += i128::from(output.value);
            }
        }
        for (token, (value_out, authorities_out)) in created {
            let (value_in, authorities_in) = balances.remove(&token).unwrap_or_default();
            check_token_balance(&token, value_in, authorities_in, value_out, authorities_out)?;
        }
        for (token, (value_in, authorities_in)) in balances {
            check_token_balance(&token, value_in, authorities_in, 0, Authorities::empty())?;
        }

        let tx_id = tx.id();
        for input in &tx.inputs {
            if let Some(spent) = state.transactions.get_mut(&input.tx_id) {
                spent.spent_by[input.index as usize] = Some(tx_id.clone());
            }
        }
        let observed = state.observe(tx);
        state.confirm(tx);
        drop(state);

        log::info!("Ledger accepted tx {} ({} inputs)", tx_id, tx.inputs.len());
        let _ = self.feed.send(observed);
        Ok(tx_id)
    }
}

fn check_input_signature(
    index: usize,
    data: &[u8],
    address: &str,
    digest: &[u8],
) -> Result<(), BackendError> {
    let rejected = |reason: &str| BackendError::Rejected(format!("Input {}: {}", index, reason));
    let input_data = InputData::from_bytes(data).map_err(|_| rejected("missing or malformed signature"))?;
    if address_from_public_key(&input_data.public_key) != address {
        return Err(rejected("public key does not match spent address"));
    }
    match verify_digest(&input_data.public_key, digest, &input_data.signature) {
        Ok(true) => Ok(()),
        _ => Err(rejected("invalid signature")),
    }
}

// Spent value is negative on the input side, so `value_in` is `-sum(inputs)`
fn check_token_balance(
    token: &str,
    value_in: i128,
    authorities_in: Authorities,
    value_out: i128,
    authorities_out: Authorities,
) -> Result<(), BackendError> {
    if !authorities_in.contains(authorities_out) {
        return Err(BackendError::Rejected(format!(
            "Token {}: authority outputs without matching authority inputs",
            token
        )));
    }
    let diff = value_out + value_in;
    let allowed = diff == 0
        || (diff > 0 && authorities_in.contains(Authorities::MINT))
        || (diff < 0 && authorities_in.contains(Authorities::MELT));
    if !allowed {
        return Err(BackendError::Rejected(format!(
            "Token {}: inputs and outputs don't balance ({:+})",
            token, diff
        )));
    }
    Ok(())
}

// ===== Wallet =====

/// Key set over a `MemoryLedger`
pub struct MemoryWallet {
    ledger: Arc<MemoryLedger>,
    addresses: Vec<String>,
    keys: HashMap<String, KeyPair>,
}

impl MemoryWallet {
    /// Wallet over `keys`; a fresh key is generated when none are given
    pub fn new(ledger: Arc<MemoryLedger>, mut keys: Vec<KeyPair>) -> Self {
        if keys.is_empty() {
            keys.push(KeyPair::generate());
        }
        let addresses: Vec<String> = keys.iter().map(KeyPair::address).collect();
        let keys = addresses.iter().cloned().zip(keys).collect();
        Self {
            ledger,
            addresses,
            keys,
        }
    }

    pub fn generate(ledger: Arc<MemoryLedger>, count: usize) -> Self {
        Self::new(ledger, (0..count).map(|_| KeyPair::generate()).collect())
    }

    pub fn addresses(&self) -> &[String] {
        &self.addresses
    }

    pub fn ledger(&self) -> &Arc<MemoryLedger> {
        &self.ledger
    }
}

impl AddressOwnership for MemoryWallet {
    fn is_address_mine(&self, address: &str) -> bool {
        self.keys.contains_key(address)
    }
}

#[async_trait]
impl WalletBackend for MemoryWallet {
    fn network(&self) -> &NetworkParams {
        self.ledger.network()
    }

    async fn available_utxos(
        &self,
        token: &str,
        filter: &UtxoFilter,
    ) -> Result<Vec<Utxo>, BackendError> {
        let utxos = self
            .ledger
            .utxos(|address| self.is_address_mine(address), token)
            .await;
        Ok(utxos.into_iter().filter(|u| filter.matches(u)).collect())
    }

    async fn current_address(&self) -> Result<String, BackendError> {
        self.addresses
            .first()
            .cloned()
            .ok_or_else(|| BackendError::Unavailable("wallet has no addresses".to_string()))
    }

    async fn change_address(&self) -> Result<String, BackendError> {
        self.addresses
            .last()
            .cloned()
            .ok_or_else(|| BackendError::Unavailable("wallet has no addresses".to_string()))
    }

    async fn current_height(&self) -> Result<u64, BackendError> {
        Ok(self.ledger.height().await)
    }

    async fn get_transaction(
        &self,
        tx_id: &str,
    ) -> Result<Option<LedgerTransaction>, BackendError> {
        Ok(self.ledger.get(tx_id).await)
    }

    async fn sign_input(
        &self,
        address: &str,
        digest: &[u8],
    ) -> Result<Option<InputData>, BackendError> {
        let Some(key) = self.keys.get(address) else {
            return Ok(None);
        };
        let signature = key
            .sign_digest(digest)
            .map_err(|e| BackendError::Signing(e.to_string()))?;
        Ok(Some(InputData::new(signature, key.public_key_bytes().to_vec())))
    }

    async fn submit(&self, tx: &Transaction) -> Result<String, BackendError> {
        self.ledger.submit(tx).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::TxInput;

    async fn setup() -> (Arc<MemoryLedger>, MemoryWallet, String) {
        let ledger = Arc::new(MemoryLedger::new(NetworkParams::new("testnet")));
        let wallet = MemoryWallet::generate(ledger.clone(), 1);
        let funding = ledger
            .mint(NATIVE_TOKEN_UID, &[(wallet.addresses()[0].as_str(), 50)])
            .await;
        (ledger, wallet, funding)
    }

    async fn signed_spend(wallet: &MemoryWallet, funding: &str, to: &str, amount: u64) -> Transaction {
        let mut tx = Transaction::new(
            Vec::new(),
            vec![TxInput::new(funding, 0)],
            vec![TxOutput::new(amount, 0, &OutputScript::new(to, None))],
        );
        let data = wallet
            .sign_input(&wallet.addresses()[0], &tx.data_to_sign())
            .await
            .unwrap()
            .unwrap();
        tx.inputs[0].data = data.to_bytes();
        tx
    }

    #[tokio::test]
    async fn test_submit_spends_and_publishes() {
        let (ledger, wallet, funding) = setup().await;
        let mut feed = ledger.subscribe();

        let tx = signed_spend(&wallet, &funding, "Wsomeone", 50).await;
        let tx_id = wallet.submit(&tx).await.unwrap();

        let stored = ledger.get(&funding).await.unwrap();
        assert_eq!(stored.output_spent_by(0), Some(tx_id.as_str()));
        assert_eq!(ledger.height().await, 2);

        let observed = feed.recv().await.unwrap();
        assert_eq!(observed.tx_id, tx_id);
        assert_eq!(observed.inputs[0].value, 50);
        assert_eq!(observed.inputs[0].address, wallet.addresses()[0]);

        let err = wallet.submit(&tx).await.unwrap_err();
        assert!(matches!(err, BackendError::Rejected(msg) if msg.contains("already spent")));
    }

    #[tokio::test]
    async fn test_submit_rejects_bad_transactions() {
        let (_ledger, wallet, funding) = setup().await;

        let unbalanced = signed_spend(&wallet, &funding, "Wsomeone", 40).await;
        assert!(wallet.submit(&unbalanced).await.is_err());

        let mut unsigned = signed_spend(&wallet, &funding, "Wsomeone", 50).await;
        unsigned.inputs[0].data.clear();
        assert!(wallet.submit(&unsigned).await.is_err());

        let stranger = MemoryWallet::generate(wallet.ledger().clone(), 1);
        let mut forged = Transaction::new(
            Vec::new(),
            vec![TxInput::new(&funding, 0)],
            vec![TxOutput::new(50, 0, &OutputScript::new("Wthief", None))],
        );
        let data = stranger
            .sign_input(&stranger.addresses()[0], &forged.data_to_sign())
            .await
            .unwrap()
            .unwrap();
        forged.inputs[0].data = data.to_bytes();
        assert!(wallet.submit(&forged).await.is_err());
    }

    #[tokio::test]
    async fn test_available_utxos_by_token_and_owner() {
        let (ledger, wallet, _funding) = setup().await;
        ledger.mint("t1", &[(wallet.addresses()[0].as_str(), 7)]).await;
        ledger.mint(NATIVE_TOKEN_UID, &[("Wother", 9)]).await;
        ledger
            .mint_authority("t1", &wallet.addresses()[0], Authorities::MINT)
            .await;

        let native = wallet
            .available_utxos(NATIVE_TOKEN_UID, &UtxoFilter::default())
            .await
            .unwrap();
        assert_eq!(native.len(), 1);
        assert_eq!(native[0].amount, 50);

        let custom = wallet
            .available_utxos("t1", &UtxoFilter::default())
            .await
            .unwrap();
        assert_eq!(custom.len(), 2);
        assert!(custom
            .iter()
            .any(|u| u.authorities == Authorities::MINT && u.amount == 0));
    }

    #[tokio::test]
    async fn test_sign_input_for_unknown_address() {
        let (_ledger, wallet, _funding) = setup().await;
        let signed = wallet.sign_input("Wnotmine", &[0; 32]).await.unwrap();
        assert!(signed.is_none());
    }
}
