use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::balance::ChainContext;
use crate::mediator::ListenedProposals;
use crate::utxo::UtxoLockTable;
use crate::wallet::{OperationLock, WalletBackend, WalletError, DEFAULT_STALE_TIMEOUT};

/// Per-wallet timing knobs, shared by every wallet the registry starts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WalletSettings {
    /// Age after which a held operation lock may be reclaimed
    pub stale_after: Duration,
    /// How long reservations made while building a transaction survive
    /// without being sent; `None` keeps them until released
    pub reservation_ttl: Option<Duration>,
}

impl Default for WalletSettings {
    fn default() -> Self {
        Self {
            stale_after: DEFAULT_STALE_TIMEOUT,
            reservation_ttl: Some(Duration::from_secs(DEFAULT_RESERVATION_TTL_SECS)),
        }
    }
}

pub const DEFAULT_RESERVATION_TTL_SECS: u64 = 300;

/// A started wallet and the per-wallet state the service keeps for it
///
/// Lock table and listened proposals live exactly as long as the handle.
pub struct WalletHandle {
    pub id: String,
    pub backend: Arc<dyn WalletBackend>,
    pub utxo_locks: UtxoLockTable,
    pub op_lock: OperationLock,
    pub proposals: ListenedProposals,
    pub reservation_ttl: Option<Duration>,
    pub started_at: DateTime<Utc>,
}

impl WalletHandle {
    pub fn new(id: &str, backend: Arc<dyn WalletBackend>, settings: WalletSettings) -> Self {
        Self {
            id: id.to_string(),
            backend,
            utxo_locks: UtxoLockTable::new(),
            op_lock: OperationLock::new(settings.stale_after),
            proposals: ListenedProposals::default(),
            reservation_ttl: settings.reservation_ttl,
            started_at: Utc::now(),
        }
    }

    pub fn backend(&self) -> &dyn WalletBackend {
        self.backend.as_ref()
    }

    /// Current chain state for balance classification
    pub async fn chain_context(&self) -> Result<ChainContext, WalletError> {
        Ok(ChainContext {
            current_height: self.backend.current_height().await?,
            now: Utc::now().timestamp(),
            reward_spend_min_blocks: self.backend.network().reward_spend_min_blocks,
        })
    }

    /// Drop all per-wallet state
    pub(crate) fn discard_state(&self) {
        self.utxo_locks.clear();
        self.proposals.clear();
    }
}

impl std::fmt::Debug for WalletHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WalletHandle")
            .field("id", &self.id)
            .field("network", &self.backend.network().name)
            .field("started_at", &self.started_at)
            .finish()
    }
}
