//! Core ledger types
//!
//! This module contains the pieces every other module speaks in:
//! - Transactions (token list, inputs, outputs, binary hex codec)
//! - Output scripts and input data
//! - Ledger constants and network parameters

pub mod network;
pub mod script;
pub mod transaction;

pub use network::{
    token_data, Authorities, NetworkParams, DEFAULT_REWARD_SPEND_MIN_BLOCKS, NATIVE_TOKEN_UID,
    TOKEN_AUTHORITY_MASK, TOKEN_INDEX_MASK, TX_VERSION,
};
pub use script::{InputData, OutputScript};
pub use transaction::{Transaction, TransactionError, TxInput, TxOutput, MAX_TX_IO};
