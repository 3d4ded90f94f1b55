//! swap-wallet: transaction assembly and concurrency core of a wallet service
//!
//! This crate provides:
//! - Deterministic UTXO selection with a per-wallet reservation table
//! - A per-wallet operation lock that fails fast instead of queueing
//! - Partial transactions that several parties extend independently
//! - Signature collection and assembly into a pushable transaction
//! - A client for the proposal mediator with optimistic versioning
//! - Per-token balance deltas for observed transactions
//! - An HTTP/WebSocket surface over an in-process development ledger
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use swap_wallet::core::NetworkParams;
//! use swap_wallet::ledger::{MemoryLedger, MemoryWallet};
//! use swap_wallet::wallet::WalletRegistry;
//!
//! # async fn run() -> Result<(), swap_wallet::wallet::WalletError> {
//! let ledger = Arc::new(MemoryLedger::new(NetworkParams::new("testnet")));
//! let wallet = Arc::new(MemoryWallet::generate(ledger.clone(), 1));
//!
//! let registry = WalletRegistry::default();
//! let handle = registry.start("alice", wallet).await?;
//! println!("Started {}", handle.id);
//! # Ok(())
//! # }
//! ```

pub mod api;
pub mod balance;
pub mod config;
pub mod core;
pub mod crypto;
pub mod ledger;
pub mod mediator;
pub mod proposal;
pub mod utxo;
pub mod wallet;

// Re-export commonly used types
pub use api::{create_router, ApiState};
pub use balance::{compute_balance, BalanceDelta, ObservedTransaction};
pub use config::ServiceConfig;
pub use core::{NetworkParams, Transaction};
pub use crypto::KeyPair;
pub use mediator::{HttpMediator, MediatorClient, SwapService};
pub use proposal::{InputDataSet, PartialTx};
pub use utxo::{UtxoLockTable, UtxoRef};
pub use wallet::{WalletBackend, WalletError, WalletHandle, WalletRegistry};
