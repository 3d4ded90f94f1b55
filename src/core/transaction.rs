//! Transaction model and binary codec
//!
//! Token-aware UTXO transactions as the ledger layer submits them:
//! - tokens are referenced by a per-transaction token list (`token_data` index)
//! - authority outputs carry mint/melt bits in their value
//! - inputs carry a signature + public key once signed
//!
//! The hex form is a length-prefixed big-endian encoding. The transaction id
//! covers everything except input data, so a transaction keeps its id while
//! signatures are collected. The digest parties sign additionally leaves out
//! the timestamp: parties materializing the same partial transaction at
//! different moments still sign the same bytes.

use bytes::{Buf, BufMut};
use chrono::Utc;
use thiserror::Error;

use crate::core::network::{
    token_data, Authorities, NATIVE_TOKEN_UID, TOKEN_AUTHORITY_MASK, TOKEN_INDEX_MASK, TX_VERSION,
};
use crate::core::script::{InputData, OutputScript};
use crate::crypto::{sha256, sha256_hex};

// =============================================================================
// Constants
// =============================================================================

/// Maximum inputs or outputs in one transaction
pub const MAX_TX_IO: usize = 255;

/// Maximum number of custom tokens referenced by one transaction
pub const MAX_TX_TOKENS: usize = TOKEN_INDEX_MASK as usize;

// =============================================================================
// Error Types
// =============================================================================

/// Transaction-related errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransactionError {
    #[error("Invalid transaction hex")]
    InvalidHex,
    #[error("Malformed transaction: {0}")]
    Decode(String),
    #[error("Too many {kind}: {count} (max {max})")]
    TooMany {
        kind: &'static str,
        count: usize,
        max: usize,
    },
    #[error("Output {0} references unknown token index")]
    UnknownTokenIndex(usize),
}

// =============================================================================
// Inputs & Outputs
// =============================================================================

/// Reference to a previous output plus the data unlocking it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxInput {
    pub tx_id: String,
    pub index: u32,
    /// Encoded `InputData`; empty while unsigned
    pub data: Vec<u8>,
}

impl TxInput {
    pub fn new(tx_id: &str, index: u32) -> Self {
        Self {
            tx_id: tx_id.to_string(),
            index,
            data: Vec::new(),
        }
    }

    pub fn is_signed(&self) -> bool {
        !self.data.is_empty()
    }

    pub fn input_data(&self) -> Result<InputData, TransactionError> {
        InputData::from_bytes(&self.data)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxOutput {
    /// Token amount, or authority bits for authority outputs
    pub value: u64,
    pub token_data: u8,
    pub script: Vec<u8>,
}

impl TxOutput {
    pub fn new(value: u64, token_data: u8, script: &OutputScript) -> Self {
        Self {
            value,
            token_data,
            script: script.to_bytes(),
        }
    }

    pub fn is_authority(&self) -> bool {
        self.token_data & TOKEN_AUTHORITY_MASK != 0
    }

    /// 1-based index into the transaction token list, 0 for the native token
    pub fn token_index(&self) -> usize {
        (self.token_data & TOKEN_INDEX_MASK) as usize
    }

    /// Authority bits of an authority output, empty otherwise
    pub fn authorities(&self) -> Authorities {
        if self.is_authority() {
            Authorities::from_bits_truncate(self.value as u8)
        } else {
            Authorities::empty()
        }
    }

    pub fn decoded_script(&self) -> Result<OutputScript, TransactionError> {
        OutputScript::from_bytes(&self.script)
    }
}

// =============================================================================
// Transaction
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transaction {
    pub version: u16,
    pub timestamp: u32,
    /// Custom token uids; the native token is implicit
    pub tokens: Vec<String>,
    pub inputs: Vec<TxInput>,
    pub outputs: Vec<TxOutput>,
}

impl Transaction {
    pub fn new(tokens: Vec<String>, inputs: Vec<TxInput>, outputs: Vec<TxOutput>) -> Self {
        Self {
            version: TX_VERSION,
            timestamp: Utc::now().timestamp() as u32,
            tokens,
            inputs,
            outputs,
        }
    }

    /// Uid of the token an output moves
    pub fn token_uid(&self, output: &TxOutput) -> Result<String, TransactionError> {
        match output.token_index() {
            0 => Ok(NATIVE_TOKEN_UID.to_string()),
            i => self
                .tokens
                .get(i - 1)
                .cloned()
                .ok_or(TransactionError::UnknownTokenIndex(i)),
        }
    }

    /// `token_data` byte for `token` within this transaction's token list
    pub fn token_data_for(&self, token: &str, authority: bool) -> Option<u8> {
        if token == NATIVE_TOKEN_UID {
            return Some(token_data(0, authority));
        }
        self.tokens
            .iter()
            .position(|t| t == token)
            .map(|i| token_data((i + 1) as u8, authority))
    }

    /// Digest every party signs (timestamp and input data excluded)
    pub fn data_to_sign(&self) -> Vec<u8> {
        sha256(&self.encode(false, false))
    }

    /// Transaction id, stable across signing
    pub fn id(&self) -> String {
        sha256_hex(&self.encode(true, false))
    }

    pub fn is_fully_signed(&self) -> bool {
        self.inputs.iter().all(TxInput::is_signed)
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.encode(true, true))
    }

    pub fn from_hex(tx_hex: &str) -> Result<Self, TransactionError> {
        let bytes = hex::decode(tx_hex).map_err(|_| TransactionError::InvalidHex)?;
        Self::decode(&bytes)
    }

    /// Structural limits the encoding can represent
    pub fn check_limits(&self) -> Result<(), TransactionError> {
        for (kind, count, max) in [
            ("inputs", self.inputs.len(), MAX_TX_IO),
            ("outputs", self.outputs.len(), MAX_TX_IO),
            ("tokens", self.tokens.len(), MAX_TX_TOKENS),
        ] {
            if count > max {
                return Err(TransactionError::TooMany { kind, count, max });
            }
        }
        for (i, output) in self.outputs.iter().enumerate() {
            if output.token_index() > self.tokens.len() {
                return Err(TransactionError::UnknownTokenIndex(i));
            }
        }
        Ok(())
    }

    fn encode(&self, with_timestamp: bool, with_input_data: bool) -> Vec<u8> {
        let mut buf = Vec::new();
        buf.put_u16(self.version);
        if with_timestamp {
            buf.put_u32(self.timestamp);
        }

        buf.put_u8(self.tokens.len() as u8);
        for token in &self.tokens {
            put_bytes(&mut buf, token.as_bytes());
        }

        buf.put_u8(self.inputs.len() as u8);
        for input in &self.inputs {
            put_bytes(&mut buf, input.tx_id.as_bytes());
            buf.put_u32(input.index);
            if with_input_data {
                put_bytes(&mut buf, &input.data);
            } else {
                buf.put_u16(0);
            }
        }

        buf.put_u8(self.outputs.len() as u8);
        for output in &self.outputs {
            buf.put_u64(output.value);
            buf.put_u8(output.token_data);
            put_bytes(&mut buf, &output.script);
        }
        buf
    }

    fn decode(mut bytes: &[u8]) -> Result<Self, TransactionError> {
        let buf = &mut bytes;
        need(buf, 6)?;
        let version = buf.get_u16();
        let timestamp = buf.get_u32();

        need(buf, 1)?;
        let token_count = buf.get_u8() as usize;
        let mut tokens = Vec::with_capacity(token_count);
        for _ in 0..token_count {
            tokens.push(get_string(buf)?);
        }

        need(buf, 1)?;
        let input_count = buf.get_u8() as usize;
        let mut inputs = Vec::with_capacity(input_count);
        for _ in 0..input_count {
            let tx_id = get_string(buf)?;
            need(buf, 4)?;
            let index = buf.get_u32();
            let data = get_bytes(buf)?;
            inputs.push(TxInput { tx_id, index, data });
        }

        need(buf, 1)?;
        let output_count = buf.get_u8() as usize;
        let mut outputs = Vec::with_capacity(output_count);
        for _ in 0..output_count {
            need(buf, 9)?;
            let value = buf.get_u64();
            let token_data = buf.get_u8();
            let script = get_bytes(buf)?;
            outputs.push(TxOutput {
                value,
                token_data,
                script,
            });
        }

        if buf.has_remaining() {
            return Err(TransactionError::Decode(format!(
                "{} trailing bytes",
                buf.remaining()
            )));
        }

        let tx = Self {
            version,
            timestamp,
            tokens,
            inputs,
            outputs,
        };
        tx.check_limits()?;
        Ok(tx)
    }
}

fn put_bytes(buf: &mut Vec<u8>, bytes: &[u8]) {
    buf.put_u16(bytes.len() as u16);
    buf.put_slice(bytes);
}

fn need(buf: &&[u8], len: usize) -> Result<(), TransactionError> {
    if buf.remaining() < len {
        return Err(TransactionError::Decode(format!(
            "unexpected end of data: need {} bytes, have {}",
            len,
            buf.remaining()
        )));
    }
    Ok(())
}

fn get_bytes(buf: &mut &[u8]) -> Result<Vec<u8>, TransactionError> {
    need(buf, 2)?;
    let len = buf.get_u16() as usize;
    need(buf, len)?;
    let bytes = buf[..len].to_vec();
    buf.advance(len);
    Ok(bytes)
}

fn get_string(buf: &mut &[u8]) -> Result<String, TransactionError> {
    String::from_utf8(get_bytes(buf)?)
        .map_err(|_| TransactionError::Decode("string field is not utf-8".to_string()))
}

// =============================================================================
// Tests
// =============================================================================
