use thiserror::Error;

use crate::core::TransactionError;
use crate::wallet::backend::BackendError;

/// Wallet service errors
///
/// `InsufficientFunds`, `IncompleteTransaction` and `InvalidSignature` are
/// ordinary outcomes callers are expected to branch on.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum WalletError {
    #[error("{0}")]
    Validation(String),
    #[error("Wallet is busy with another operation, try again later")]
    WalletLocked,
    #[error("Insufficient amount of token {token}: missing {shortfall}")]
    InsufficientFunds { token: String, shortfall: u64 },
    #[error("Transaction is not complete")]
    IncompleteTransaction,
    #[error("Invalid signature for input {index}")]
    InvalidSignature { index: usize },
    #[error("Proposal is not registered, register it first")]
    ProposalNotRegistered,
    #[error("Proposal not found")]
    ProposalNotFound,
    #[error("Method not allowed")]
    MediatorUnavailable,
    #[error("{0}")]
    ExternalService(String),
    #[error("Wallet not started: {0}")]
    WalletNotStarted(String),
    #[error("Wallet already started: {0}")]
    WalletAlreadyStarted(String),
    #[error("Internal error: {0}")]
    Internal(String),
}

impl WalletError {
    pub fn validation(message: impl Into<String>) -> Self {
        WalletError::Validation(message.into())
    }
}

impl From<TransactionError> for WalletError {
    fn from(err: TransactionError) -> Self {
        WalletError::Validation(err.to_string())
    }
}

impl From<BackendError> for WalletError {
    fn from(err: BackendError) -> Self {
        WalletError::ExternalService(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_upstream_message_kept_verbatim() {
        let err: WalletError = BackendError::Rejected("double spend".to_string()).into();
        assert_eq!(err, WalletError::ExternalService("double spend".to_string()));
        assert_eq!(err.to_string(), "double spend");
    }

    #[test]
    fn test_decode_errors_are_validation() {
        let err: WalletError = TransactionError::InvalidHex.into();
        assert!(matches!(err, WalletError::Validation(_)));
    }
}
