//! Unilateral sends
//!
//! A send names its outputs and optionally how to fund them: explicit
//! outputs to spend, per-token selection queries, or nothing (automatic
//! selection). Change goes back to the wallet. Building keeps the chosen
//! outputs reserved so the caller can sign and push later; sending signs,
//! submits and releases them in one step.

use std::collections::BTreeMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::balance::AddressOwnership;
use crate::core::{OutputScript, Transaction, NATIVE_TOKEN_UID};
use crate::proposal::{
    assemble, get_my_signatures, PartialTx, ProposalInput, ProposalOutput, PushedTransaction,
};
use crate::utxo::{select_utxos, Reservation, Utxo, UtxoFilter, UtxoRef};
use crate::wallet::{WalletError, WalletHandle};

// =============================================================================
// Requests
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SendOutput {
    pub address: String,
    pub value: u64,
    #[serde(default)]
    pub token: Option<String>,
    #[serde(default)]
    pub timelock: Option<u32>,
}

impl SendOutput {
    pub fn token(&self) -> &str {
        self.token.as_deref().unwrap_or(NATIVE_TOKEN_UID)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QueryTag {
    Query,
}

/// Selection constraints for one token
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InputQuery {
    #[serde(rename = "type")]
    pub tag: QueryTag,
    #[serde(default)]
    pub token: Option<String>,
    #[serde(flatten)]
    pub filter: UtxoFilter,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum InputSpec {
    Query(InputQuery),
    Utxo { hash: String, index: u32 },
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SendRequest {
    pub outputs: Vec<SendOutput>,
    #[serde(default)]
    pub inputs: Vec<InputSpec>,
    #[serde(default)]
    pub change_address: Option<String>,
}

enum Funding<'a> {
    Automatic,
    Queries(Vec<&'a InputQuery>),
    Explicit(Vec<UtxoRef>),
}

impl SendRequest {
    /// Structural checks, run before any lock is taken
    pub fn validate(&self) -> Result<(), WalletError> {
        if self.outputs.is_empty() {
            return Err(WalletError::validation("Should have at least one output"));
        }
        for (index, output) in self.outputs.iter().enumerate() {
            if output.address.trim().is_empty() {
                return Err(WalletError::validation(format!(
                    "Output {} has no address",
                    index
                )));
            }
            if output.value == 0 {
                return Err(WalletError::validation(format!(
                    "Output {} value must be greater than zero",
                    index
                )));
            }
        }
        self.required()?;
        self.funding().map(|_| ())
    }

    fn funding(&self) -> Result<Funding<'_>, WalletError> {
        let queries: Vec<&InputQuery> = self
            .inputs
            .iter()
            .filter_map(|input| match input {
                InputSpec::Query(query) => Some(query),
                InputSpec::Utxo { .. } => None,
            })
            .collect();
        let refs: Vec<UtxoRef> = self
            .inputs
            .iter()
            .filter_map(|input| match input {
                InputSpec::Utxo { hash, index } => Some(UtxoRef::new(hash, *index)),
                InputSpec::Query(_) => None,
            })
            .collect();

        match (queries.is_empty(), refs.is_empty()) {
            (true, true) => Ok(Funding::Automatic),
            (false, true) => Ok(Funding::Queries(queries)),
            (true, false) => {
                if refs.iter().any(|r| r.tx_id.trim().is_empty()) {
                    return Err(WalletError::validation("Input hash is required"));
                }
                let mut sorted = refs.clone();
                sorted.sort();
                sorted.dedup();
                if sorted.len() != refs.len() {
                    return Err(WalletError::validation("Duplicate input in the request"));
                }
                Ok(Funding::Explicit(refs))
            }
            (false, false) => Err(WalletError::validation(
                "Inputs must be all queries or all explicit outputs",
            )),
        }
    }

    /// Requested value per token
    fn required(&self) -> Result<BTreeMap<String, u64>, WalletError> {
        let mut required: BTreeMap<String, u64> = BTreeMap::new();
        for output in &self.outputs {
            add_amount(&mut required, output.token(), output.value)?;
        }
        Ok(required)
    }
}

fn add_amount(
    totals: &mut BTreeMap<String, u64>,
    token: &str,
    amount: u64,
) -> Result<(), WalletError> {
    let total = totals.entry(token.to_string()).or_default();
    *total = total.checked_add(amount).ok_or_else(|| {
        WalletError::validation(format!("Total value of token {} overflows", token))
    })?;
    Ok(())
}

// =============================================================================
// Input resolution
// =============================================================================

/// Look up an output this wallet wants to spend explicitly
///
/// It must exist, be unspent, belong to the wallet and not be reserved by
/// another operation.
pub(crate) async fn resolve_utxo(
    handle: &WalletHandle,
    utxo: &UtxoRef,
) -> Result<Utxo, WalletError> {
    if handle.utxo_locks.is_locked(utxo) {
        return Err(WalletError::validation(format!(
            "Output {} is already selected as input",
            utxo
        )));
    }
    let ledger_tx = handle
        .backend
        .get_transaction(&utxo.tx_id)
        .await?
        .ok_or_else(|| WalletError::validation(format!("Output {} not found", utxo)))?;
    if let Some(spender) = ledger_tx.output_spent_by(utxo.index) {
        return Err(WalletError::validation(format!(
            "Output {} already spent by {}",
            utxo, spender
        )));
    }
    let resolved = ledger_tx
        .utxo(utxo.index)?
        .ok_or_else(|| WalletError::validation(format!("Output {} not found", utxo)))?;
    if !handle.backend.is_address_mine(&resolved.address) {
        return Err(WalletError::validation(format!(
            "Output {} does not belong to this wallet",
            utxo
        )));
    }
    if resolved.authorities.is_empty() {
        Ok(resolved)
    } else {
        Err(WalletError::validation(format!(
            "Output {} is an authority",
            utxo
        )))
    }
}

/// Outputs covering `required`, with the change owed per token
async fn collect_inputs(
    handle: &WalletHandle,
    request: &SendRequest,
    required: &BTreeMap<String, u64>,
) -> Result<(Vec<Utxo>, BTreeMap<String, u64>), WalletError> {
    let mut inputs = Vec::new();
    let mut change = BTreeMap::new();

    match request.funding()? {
        Funding::Explicit(refs) => {
            let mut available: BTreeMap<String, u64> = BTreeMap::new();
            for utxo in &refs {
                let resolved = resolve_utxo(handle, utxo).await?;
                add_amount(&mut available, &resolved.token, resolved.amount)?;
                inputs.push(resolved);
            }
            for (token, need) in required {
                let have = available.get(token).copied().unwrap_or(0);
                if have < *need {
                    return Err(WalletError::InsufficientFunds {
                        token: token.clone(),
                        shortfall: need - have,
                    });
                }
            }
            for (token, have) in available {
                let need = required.get(&token).copied().unwrap_or(0);
                change.insert(token, have - need);
            }
        }
        Funding::Queries(queries) => {
            select_per_token(handle, required, &queries, &mut inputs, &mut change).await?
        }
        Funding::Automatic => {
            select_per_token(handle, required, &[], &mut inputs, &mut change).await?
        }
    }
    Ok((inputs, change))
}

async fn select_per_token(
    handle: &WalletHandle,
    required: &BTreeMap<String, u64>,
    queries: &[&InputQuery],
    inputs: &mut Vec<Utxo>,
    change: &mut BTreeMap<String, u64>,
) -> Result<(), WalletError> {
    for (token, need) in required {
        let filter = queries
            .iter()
            .find(|q| q.token.as_deref().unwrap_or(NATIVE_TOKEN_UID) == token)
            .map(|q| q.filter.clone())
            .unwrap_or_default();
        let selection =
            select_utxos(handle.backend(), &handle.utxo_locks, token, *need, &filter).await?;
        change.insert(token.clone(), selection.change(*need));
        inputs.extend(selection.utxos);
    }
    Ok(())
}

pub(crate) fn proposal_input(utxo: &Utxo) -> ProposalInput {
    ProposalInput {
        tx_id: utxo.utxo.tx_id.clone(),
        index: utxo.utxo.index,
        token: utxo.token.clone(),
        authorities: utxo.authorities,
        amount: utxo.amount,
        address: utxo.address.clone(),
    }
}

/// Fund and balance `request`, reserving the chosen outputs
///
/// Must run under the wallet's operation lock.
async fn prepare<'a>(
    handle: &'a WalletHandle,
    request: &SendRequest,
    ttl: Option<Duration>,
) -> Result<(PartialTx, Reservation<'a>), WalletError> {
    let required = request.required()?;
    let (inputs, change) = collect_inputs(handle, request, &required).await?;

    let mut partial = PartialTx::new(&handle.backend.network().name);
    for utxo in &inputs {
        partial.add_input(proposal_input(utxo))?;
    }
    for output in &request.outputs {
        let script = OutputScript::new(&output.address, output.timelock);
        partial.add_output(ProposalOutput::value(
            output.value,
            &script,
            output.token(),
            false,
        ))?;
    }
    if change.values().any(|amount| *amount > 0) {
        let change_address = match &request.change_address {
            Some(address) => address.clone(),
            None => handle.backend.change_address().await?,
        };
        let script = OutputScript::new(&change_address, None);
        for (token, amount) in change.iter().filter(|(_, amount)| **amount > 0) {
            partial.add_output(ProposalOutput::value(*amount, &script, token, true))?;
        }
    }

    let reservation = handle
        .utxo_locks
        .reserve(inputs.iter().map(|u| u.utxo.clone()).collect(), ttl);
    Ok((partial, reservation))
}

// =============================================================================
// Flows
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BuiltTransaction {
    pub tx_id: String,
    pub tx_hex: String,
    pub inputs: Vec<UtxoRef>,
}

/// Build an unsigned transaction, keeping its inputs reserved
///
/// Reservations expire after the wallet's reservation TTL unless the
/// transaction is pushed or the outputs are unmarked first.
pub async fn build_transaction(
    handle: &WalletHandle,
    request: &SendRequest,
) -> Result<BuiltTransaction, WalletError> {
    request.validate()?;
    handle
        .op_lock
        .with_lock(async {
            let (partial, reservation) = prepare(handle, request, handle.reservation_ttl).await?;
            let tx = partial.to_transaction()?;
            let inputs = reservation.utxos().to_vec();
            reservation.commit();
            log::info!(
                "Wallet {} built transaction {} with {} inputs",
                handle.id,
                tx.id(),
                inputs.len()
            );
            Ok::<_, WalletError>(BuiltTransaction {
                tx_id: tx.id(),
                tx_hex: tx.to_hex(),
                inputs,
            })
        })
        .await
}

/// Build, sign and submit in one step
pub async fn send_transaction(
    handle: &WalletHandle,
    request: &SendRequest,
) -> Result<PushedTransaction, WalletError> {
    request.validate()?;
    handle
        .op_lock
        .with_lock(async {
            let (partial, reservation) = prepare(handle, request, None).await?;
            let signatures = get_my_signatures(&partial, handle.backend()).await?;
            let tx = assemble(&partial, &[signatures])?;
            let tx_id = handle.backend.submit(&tx).await?;
            reservation.release();
            log::info!("Wallet {} sent transaction {}", handle.id, tx_id);
            Ok::<_, WalletError>(PushedTransaction {
                tx_id,
                tx_hex: tx.to_hex(),
            })
        })
        .await
}

/// Outputs to mark or unmark, given directly or as the inputs of a tx
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum UtxoTarget {
    TxHex { tx_hex: String },
    Refs { utxos: Vec<UtxoRef> },
}

impl UtxoTarget {
    fn refs(&self) -> Result<Vec<UtxoRef>, WalletError> {
        let refs: Vec<UtxoRef> = match self {
            UtxoTarget::TxHex { tx_hex } => Transaction::from_hex(tx_hex)?
                .inputs
                .iter()
                .map(|input| UtxoRef::new(&input.tx_id, input.index))
                .collect(),
            UtxoTarget::Refs { utxos } => utxos.clone(),
        };
        if refs.is_empty() {
            return Err(WalletError::validation("No outputs to mark"));
        }
        Ok(refs)
    }
}

/// Mark (or unmark) outputs as selected, returning the affected refs
pub fn mark_utxos_selected(
    handle: &WalletHandle,
    target: &UtxoTarget,
    mark: bool,
    ttl: Option<Duration>,
) -> Result<Vec<UtxoRef>, WalletError> {
    let refs = target.refs()?;
    for utxo in &refs {
        handle.utxo_locks.mark_selected(utxo, mark, ttl);
    }
    log::debug!(
        "Wallet {} {} {} outputs",
        handle.id,
        if mark { "marked" } else { "unmarked" },
        refs.len()
    );
    Ok(refs)
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WalletInput {
    pub tx_id: String,
    pub index: u32,
    pub token: String,
    pub amount: u64,
    pub address: String,
}

/// Inputs of `tx_hex` spending outputs this wallet owns
pub async fn wallet_inputs(
    handle: &WalletHandle,
    tx_hex: &str,
) -> Result<Vec<WalletInput>, WalletError> {
    let tx = Transaction::from_hex(tx_hex)?;
    let mut mine = Vec::new();
    for input in &tx.inputs {
        let Some(ledger_tx) = handle.backend.get_transaction(&input.tx_id).await? else {
            continue;
        };
        let Some(utxo) = ledger_tx.utxo(input.index)? else {
            continue;
        };
        if handle.backend.is_address_mine(&utxo.address) {
            mine.push(WalletInput {
                tx_id: input.tx_id.clone(),
                index: input.index,
                token: utxo.token,
                amount: utxo.amount,
                address: utxo.address,
            });
        }
    }
    Ok(mine)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{InputData, NetworkParams};
    use crate::ledger::{funded_wallet, MemoryWallet};
    use crate::wallet::{BackendError, LedgerTransaction, WalletBackend, WalletSettings};
    use async_trait::async_trait;
    use std::sync::Arc;

    fn pay(address: &str, value: u64) -> SendRequest {
        SendRequest {
            outputs: vec![SendOutput {
                address: address.to_string(),
                value,
                token: None,
                timelock: None,
            }],
            ..Default::default()
        }
    }

    async fn handle(amounts: &[u64]) -> WalletHandle {
        let (_ledger, wallet) = funded_wallet(amounts).await;
        WalletHandle::new("w1", wallet, WalletSettings::default())
    }

    #[test]
    fn test_request_json_shapes() {
        let request: SendRequest = serde_json::from_str(
            r#"{
                "outputs": [{"address": "Wdest", "value": 5}],
                "inputs": [{"type": "query", "filter_address": "Wmine", "max_utxos": 2}]
            }"#,
        )
        .unwrap();
        let InputSpec::Query(query) = &request.inputs[0] else {
            panic!("expected a query input");
        };
        assert_eq!(query.filter.address.as_deref(), Some("Wmine"));
        assert_eq!(query.filter.max_utxos, Some(2));

        let explicit: SendRequest = serde_json::from_str(
            r#"{"outputs": [{"address": "Wdest", "value": 5}], "inputs": [{"hash": "aa", "index": 1}]}"#,
        )
        .unwrap();
        assert_eq!(
            explicit.inputs,
            vec![InputSpec::Utxo {
                hash: "aa".to_string(),
                index: 1
            }]
        );
    }

    #[test]
    fn test_structural_errors() {
        assert!(SendRequest::default().validate().is_err());
        assert!(pay("Wdest", 0).validate().is_err());
        assert!(pay(" ", 1).validate().is_err());

        let mut mixed = pay("Wdest", 1);
        mixed.inputs = vec![
            InputSpec::Utxo {
                hash: "aa".to_string(),
                index: 0,
            },
            InputSpec::Query(InputQuery {
                tag: QueryTag::Query,
                token: None,
                filter: UtxoFilter::default(),
            }),
        ];
        assert!(mixed.validate().is_err());
    }

    #[tokio::test]
    async fn test_build_reserves_inputs_until_pushed() {
        let handle = handle(&[10, 20]).await;

        let built = build_transaction(&handle, &pay("Wdest", 15)).await.unwrap();
        assert_eq!(built.inputs.len(), 1);
        assert!(handle.utxo_locks.is_locked(&built.inputs[0]));

        let tx = Transaction::from_hex(&built.tx_hex).unwrap();
        assert_eq!(tx.outputs.len(), 2);
        assert_eq!(tx.outputs[1].value, 5);

        // the reserved output is not offered twice
        let second = build_transaction(&handle, &pay("Wdest", 10)).await.unwrap();
        assert_ne!(second.inputs, built.inputs);
        assert!(matches!(
            build_transaction(&handle, &pay("Wdest", 1)).await,
            Err(WalletError::InsufficientFunds { .. })
        ));
    }

    #[tokio::test]
    async fn test_send_submits_and_releases() {
        let handle = handle(&[10, 20]).await;
        let pushed = send_transaction(&handle, &pay("Wdest", 25)).await.unwrap();
        assert!(!pushed.tx_id.is_empty());
        assert!(handle.utxo_locks.is_empty());

        let left = handle
            .backend
            .available_utxos(NATIVE_TOKEN_UID, &UtxoFilter::default())
            .await
            .unwrap();
        assert_eq!(left.iter().map(|u| u.amount).collect::<Vec<_>>(), vec![5]);
    }

    /// In-memory wallet behind a node that can be slow or refuse pushes
    struct StubLedger {
        wallet: Arc<MemoryWallet>,
        lookup_delay: Duration,
        reject_submit: bool,
    }

    impl StubLedger {
        fn rejecting(wallet: Arc<MemoryWallet>) -> Self {
            Self {
                wallet,
                lookup_delay: Duration::ZERO,
                reject_submit: true,
            }
        }

        fn slow(wallet: Arc<MemoryWallet>, lookup_delay: Duration) -> Self {
            Self {
                wallet,
                lookup_delay,
                reject_submit: false,
            }
        }
    }

    impl AddressOwnership for StubLedger {
        fn is_address_mine(&self, address: &str) -> bool {
            self.wallet.is_address_mine(address)
        }
    }

    #[async_trait]
    impl WalletBackend for StubLedger {
        fn network(&self) -> &NetworkParams {
            self.wallet.network()
        }

        async fn available_utxos(
            &self,
            token: &str,
            filter: &UtxoFilter,
        ) -> Result<Vec<Utxo>, BackendError> {
            tokio::time::sleep(self.lookup_delay).await;
            self.wallet.available_utxos(token, filter).await
        }

        async fn current_address(&self) -> Result<String, BackendError> {
            self.wallet.current_address().await
        }

        async fn change_address(&self) -> Result<String, BackendError> {
            self.wallet.change_address().await
        }

        async fn current_height(&self) -> Result<u64, BackendError> {
            self.wallet.current_height().await
        }

        async fn get_transaction(
            &self,
            tx_id: &str,
        ) -> Result<Option<LedgerTransaction>, BackendError> {
            self.wallet.get_transaction(tx_id).await
        }

        async fn sign_input(
            &self,
            address: &str,
            digest: &[u8],
        ) -> Result<Option<InputData>, BackendError> {
            self.wallet.sign_input(address, digest).await
        }

        async fn submit(&self, tx: &Transaction) -> Result<String, BackendError> {
            if self.reject_submit {
                return Err(BackendError::Rejected("node is syncing".to_string()));
            }
            self.wallet.submit(tx).await
        }
    }

    #[tokio::test]
    async fn test_failed_send_releases_reservations() {
        let (_ledger, wallet) = funded_wallet(&[10]).await;
        let handle = WalletHandle::new(
            "w1",
            Arc::new(StubLedger::rejecting(wallet)),
            WalletSettings::default(),
        );

        assert_eq!(
            send_transaction(&handle, &pay("Wdest", 5)).await.unwrap_err(),
            WalletError::ExternalService("node is syncing".to_string())
        );
        assert!(handle.utxo_locks.is_empty());
        assert!(!handle.op_lock.is_locked());
    }

    #[tokio::test]
    async fn test_concurrent_builds_one_rejected() {
        let (_ledger, wallet) = funded_wallet(&[10, 20]).await;
        let handle = WalletHandle::new(
            "w1",
            Arc::new(StubLedger::slow(wallet, Duration::from_millis(50))),
            WalletSettings::default(),
        );
        let first = pay("Wdest", 5);
        let second = pay("Wother", 5);

        let (a, b) = tokio::join!(
            build_transaction(&handle, &first),
            build_transaction(&handle, &second)
        );
        let (winner, loser) = match (a, b) {
            (Ok(built), Err(err)) | (Err(err), Ok(built)) => (built, err),
            other => panic!("expected exactly one build to succeed: {:?}", other),
        };
        assert_eq!(loser, WalletError::WalletLocked);
        assert_eq!(handle.utxo_locks.locked(), winner.inputs);
        assert!(!handle.op_lock.is_locked());

        // the lock is free again once the winner is done
        let next = build_transaction(&handle, &second).await.unwrap();
        assert_ne!(next.inputs, winner.inputs);
    }

    #[tokio::test]
    async fn test_concurrent_sends_one_rejected() {
        let (_ledger, wallet) = funded_wallet(&[10, 20]).await;
        let handle = WalletHandle::new(
            "w1",
            Arc::new(StubLedger::slow(wallet, Duration::from_millis(50))),
            WalletSettings::default(),
        );
        let request = pay("Wdest", 5);

        let (a, b) = tokio::join!(
            send_transaction(&handle, &request),
            send_transaction(&handle, &request)
        );
        let (pushed, loser) = match (a, b) {
            (Ok(pushed), Err(err)) | (Err(err), Ok(pushed)) => (pushed, err),
            other => panic!("expected exactly one send to succeed: {:?}", other),
        };
        assert_eq!(loser, WalletError::WalletLocked);
        assert!(!pushed.tx_id.is_empty());
        assert!(handle.utxo_locks.is_empty());
    }

    #[test]
    fn test_requested_total_overflow_rejected() {
        let mut request = pay("Wdest", u64::MAX);
        request.outputs.push(SendOutput {
            address: "Wother".to_string(),
            value: u64::MAX,
            token: None,
            timelock: None,
        });
        assert!(matches!(request.validate(), Err(WalletError::Validation(_))));

        // separate tokens are summed separately
        request.outputs[1].token = Some("t1".to_string());
        assert!(request.validate().is_ok());
    }

    #[tokio::test]
    async fn test_explicit_inputs_overflow_rejected() {
        let handle = handle(&[u64::MAX, 1]).await;
        let utxos = handle
            .backend
            .available_utxos(NATIVE_TOKEN_UID, &UtxoFilter::default())
            .await
            .unwrap();

        let mut request = pay("Wdest", 5);
        request.inputs = utxos
            .iter()
            .map(|u| InputSpec::Utxo {
                hash: u.utxo.tx_id.clone(),
                index: u.utxo.index,
            })
            .collect();
        assert!(matches!(
            build_transaction(&handle, &request).await,
            Err(WalletError::Validation(msg)) if msg.contains("overflows")
        ));
        assert!(handle.utxo_locks.is_empty());
        assert!(!handle.op_lock.is_locked());
    }

    #[tokio::test]
    async fn test_explicit_inputs() {
        let handle = handle(&[10, 20]).await;
        let utxos = handle
            .backend
            .available_utxos(NATIVE_TOKEN_UID, &UtxoFilter::default())
            .await
            .unwrap();
        let small = utxos.iter().find(|u| u.amount == 10).unwrap().utxo.clone();

        let mut request = pay("Wdest", 15);
        request.inputs = vec![InputSpec::Utxo {
            hash: small.tx_id.clone(),
            index: small.index,
        }];
        assert_eq!(
            build_transaction(&handle, &request).await.unwrap_err(),
            WalletError::InsufficientFunds {
                token: NATIVE_TOKEN_UID.to_string(),
                shortfall: 5
            }
        );

        let mut request = pay("Wdest", 4);
        request.inputs = vec![InputSpec::Utxo {
            hash: small.tx_id.clone(),
            index: small.index,
        }];
        let built = build_transaction(&handle, &request).await.unwrap();
        assert_eq!(built.inputs, vec![small]);

        // already reserved now
        assert!(matches!(
            build_transaction(&handle, &request).await,
            Err(WalletError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn test_mark_and_wallet_inputs() {
        let handle = handle(&[10]).await;
        let built = build_transaction(&handle, &pay("Wdest", 3)).await.unwrap();

        let mine = wallet_inputs(&handle, &built.tx_hex).await.unwrap();
        assert_eq!(mine.len(), 1);
        assert_eq!(mine[0].amount, 10);

        let target = UtxoTarget::TxHex {
            tx_hex: built.tx_hex.clone(),
        };
        let refs = mark_utxos_selected(&handle, &target, false, None).unwrap();
        assert_eq!(refs, built.inputs);
        assert!(handle.utxo_locks.is_empty());

        let empty = UtxoTarget::Refs { utxos: Vec::new() };
        assert!(mark_utxos_selected(&handle, &empty, true, None).is_err());
    }

    #[tokio::test]
    async fn test_other_wallet_outputs_are_not_mine() {
        let (ledger, wallet) = funded_wallet(&[10]).await;
        let stranger = Arc::new(MemoryWallet::generate(ledger, 1));
        let owner = WalletHandle::new("owner", wallet, WalletSettings::default());
        let other = WalletHandle::new("other", stranger, WalletSettings::default());

        let built = build_transaction(&owner, &pay("Wdest", 3)).await.unwrap();
        assert!(wallet_inputs(&other, &built.tx_hex).await.unwrap().is_empty());

        let mut request = pay("Wdest", 3);
        request.inputs = vec![InputSpec::Utxo {
            hash: built.inputs[0].tx_id.clone(),
            index: built.inputs[0].index,
        }];
        assert!(matches!(
            build_transaction(&other, &request).await,
            Err(WalletError::Validation(_))
        ));
    }
}
