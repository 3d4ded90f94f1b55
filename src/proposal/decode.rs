//! Decode a transaction or partial transaction for display, marking which
//! inputs and outputs belong to the wallet.

use serde::{Deserialize, Serialize};

use crate::balance::AddressOwnership;
use crate::core::Transaction;
use crate::proposal::PartialTx;
use crate::wallet::{WalletError, WalletHandle};

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct DecodeRequest {
    #[serde(default)]
    pub tx_hex: Option<String>,
    #[serde(default)]
    pub partial_tx: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DecodedInput {
    pub tx_id: String,
    pub index: u32,
    /// Unknown when the spent output isn't on the ledger
    pub token: Option<String>,
    pub value: Option<u64>,
    pub address: Option<String>,
    pub signed: bool,
    pub mine: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DecodedOutput {
    pub value: u64,
    pub token: String,
    pub authorities: u8,
    pub address: Option<String>,
    pub timelock: Option<u32>,
    pub mine: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DecodedTransaction {
    pub tokens: Vec<String>,
    pub inputs: Vec<DecodedInput>,
    pub outputs: Vec<DecodedOutput>,
    /// Set for partial transactions
    pub is_complete: Option<bool>,
}

pub async fn decode(
    handle: &WalletHandle,
    request: &DecodeRequest,
) -> Result<DecodedTransaction, WalletError> {
    match (&request.tx_hex, &request.partial_tx) {
        (Some(tx_hex), None) => decode_tx(handle, tx_hex).await,
        (None, Some(partial_tx)) => decode_partial(handle, partial_tx).await,
        _ => Err(WalletError::validation(
            "Required only one of tx_hex or partial_tx",
        )),
    }
}

async fn decode_tx(handle: &WalletHandle, tx_hex: &str) -> Result<DecodedTransaction, WalletError> {
    let tx = Transaction::from_hex(tx_hex)?;
    let backend = handle.backend();

    let mut inputs = Vec::with_capacity(tx.inputs.len());
    for input in &tx.inputs {
        let spent = match backend.get_transaction(&input.tx_id).await? {
            Some(ledger_tx) => ledger_tx.utxo(input.index)?,
            None => None,
        };
        let mine = spent
            .as_ref()
            .is_some_and(|utxo| backend.is_address_mine(&utxo.address));
        inputs.push(DecodedInput {
            tx_id: input.tx_id.clone(),
            index: input.index,
            token: spent.as_ref().map(|u| u.token.clone()),
            value: spent.as_ref().map(|u| u.amount),
            address: spent.map(|u| u.address),
            signed: input.is_signed(),
            mine,
        });
    }

    let mut outputs = Vec::with_capacity(tx.outputs.len());
    for output in &tx.outputs {
        let script = output.decoded_script().ok();
        let address = script.as_ref().map(|s| s.address.clone());
        outputs.push(DecodedOutput {
            value: output.value,
            token: tx.token_uid(output)?,
            authorities: output.authorities().bits(),
            mine: address
                .as_deref()
                .is_some_and(|a| backend.is_address_mine(a)),
            address,
            timelock: script.and_then(|s| s.timelock),
        });
    }

    Ok(DecodedTransaction {
        tokens: tx.tokens.clone(),
        inputs,
        outputs,
        is_complete: None,
    })
}

/// Partial transactions are checked against the ledger before decoding
async fn decode_partial(
    handle: &WalletHandle,
    partial_tx: &str,
) -> Result<DecodedTransaction, WalletError> {
    let backend = handle.backend();
    let partial = PartialTx::deserialize_for(partial_tx, &backend.network().name)?;
    partial.validate(backend).await?.into_result()?;

    let inputs = partial
        .inputs()
        .iter()
        .map(|input| DecodedInput {
            tx_id: input.tx_id.clone(),
            index: input.index,
            token: Some(input.token.clone()),
            value: Some(input.amount),
            address: Some(input.address.clone()),
            signed: false,
            mine: backend.is_address_mine(&input.address),
        })
        .collect();

    let mut outputs = Vec::with_capacity(partial.outputs().len());
    for output in partial.outputs() {
        let script = output.decoded_script()?;
        outputs.push(DecodedOutput {
            value: output.amount,
            token: output.token.clone(),
            authorities: output.authorities.bits(),
            mine: backend.is_address_mine(&script.address),
            address: Some(script.address),
            timelock: script.timelock,
        });
    }

    Ok(DecodedTransaction {
        tokens: partial.to_transaction()?.tokens,
        inputs,
        outputs,
        is_complete: Some(partial.is_complete()),
    })
}
