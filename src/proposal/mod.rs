//! Multi-party transaction proposals
//!
//! This module contains:
//! - `PartialTx`: a transaction built up by several parties, with its text form
//! - `InputDataSet`: signatures collected for a partial transaction
//! - Assembly of signed transactions and the swap proposal builder
//! - Decoding for display

pub mod assembler;
pub mod builder;
pub mod decode;
pub mod input_data;
pub mod partial_tx;

pub use assembler::{
    assemble, get_my_signatures, parse_signature_sets, sign_and_push, PushedTransaction,
};
pub use builder::{
    build_swap_proposal, locked_utxos, unlock_inputs, BuiltProposal, ReceiveSide, ReceiveToken,
    SendSide, SendToken, ServiceOptions, SwapProposalRequest,
};
pub use decode::{decode, DecodeRequest, DecodedInput, DecodedOutput, DecodedTransaction};
pub use input_data::{extract_input_data, InputDataSet, SignatureSetError, INPUT_DATA_PREFIX};
pub use partial_tx::{
    AuthorityBurn, InputIssue, InputValidation, PartialTx, PartialTxError, ProposalInput,
    ProposalOutput, TokenBalance, ValidationReport, PARTIAL_TX_PREFIX, PARTIAL_TX_VERSION,
};
