//! Atomic-swap mediator
//!
//! The mediator is a shared store where the parties of a swap exchange a
//! proposal until everyone has signed:
//! - `MediatorClient`: transport trait, `HttpMediator` is the JSON/HTTP one
//! - `SwapService`: per-wallet bookkeeping of listened proposals, gated by the
//!   service toggle

pub mod client;
pub mod service;
pub mod types;

pub use client::{HttpMediator, MediatorClient, AUTH_PASSWORD_HEADER};
pub use service::{SwapService, MIN_PASSWORD_LEN};
pub use types::{
    ListenedProposal, ListenedProposals, ProposalHistoryEntry, ProposalRecord, UpdateOutcome,
};

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MediatorError {
    #[error("Network error: {0}")]
    Network(String),
    #[error("Proposal not found")]
    NotFound,
    #[error("{message}")]
    Http { status: u16, message: String },
    #[error("{0}")]
    Rejected(String),
    #[error("Invalid mediator response: {0}")]
    InvalidPayload(String),
}

impl MediatorError {
    /// Message to surface to the wallet's caller
    ///
    /// Errors the mediator reported itself are passed on verbatim.
    pub fn upstream_message(&self) -> String {
        match self {
            MediatorError::Http { message, .. } if !message.is_empty() => message.clone(),
            MediatorError::Http { status, .. } => format!("Mediator answered status {}", status),
            other => other.to_string(),
        }
    }
}
