//! Started wallets and their per-wallet concurrency state
//!
//! - `WalletRegistry` owns one `WalletHandle` per started wallet id
//! - `OperationLock` serializes the operations that reserve or spend outputs
//! - `send` builds and pushes unilateral transactions

pub mod backend;
pub mod error;
pub mod handle;
pub mod op_lock;
pub mod registry;
pub mod send;

pub use backend::{BackendError, LedgerTransaction, WalletBackend};
pub use error::WalletError;
pub use handle::{WalletHandle, WalletSettings, DEFAULT_RESERVATION_TTL_SECS};
pub use op_lock::{OperationGuard, OperationLock, DEFAULT_STALE_TIMEOUT};
pub use registry::WalletRegistry;
pub use send::{
    build_transaction, mark_utxos_selected, send_transaction, wallet_inputs, BuiltTransaction,
    InputQuery, InputSpec, SendOutput, SendRequest, UtxoTarget, WalletInput,
};
