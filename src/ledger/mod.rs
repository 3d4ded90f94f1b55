//! Ledger backends
//!
//! `MemoryLedger` is a single-process ledger used by the development server
//! and the tests; production deployments plug their own `WalletBackend`.

pub mod memory;

pub use memory::{MemoryLedger, MemoryWallet};

#[cfg(test)]
pub(crate) async fn funded_wallet(
    amounts: &[u64],
) -> (std::sync::Arc<MemoryLedger>, std::sync::Arc<MemoryWallet>) {
    use crate::core::{NetworkParams, NATIVE_TOKEN_UID};
    use std::sync::Arc;

    let ledger = Arc::new(MemoryLedger::new(NetworkParams::new("testnet")));
    let wallet = MemoryWallet::generate(ledger.clone(), 2);
    let address = wallet.addresses()[0].clone();
    let allocations: Vec<(&str, u64)> = amounts.iter().map(|a| (address.as_str(), *a)).collect();
    ledger.mint(NATIVE_TOKEN_UID, &allocations).await;
    (ledger, Arc::new(wallet))
}
