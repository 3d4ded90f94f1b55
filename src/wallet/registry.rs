//! Registry of started wallets, keyed by wallet id
//!
//! Owned by the process and handed to the HTTP layer through `ApiState`.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;

use crate::wallet::{WalletBackend, WalletError, WalletHandle, WalletSettings};

pub struct WalletRegistry {
    wallets: RwLock<HashMap<String, Arc<WalletHandle>>>,
    settings: WalletSettings,
}

impl Default for WalletRegistry {
    fn default() -> Self {
        Self::new(WalletSettings::default())
    }
}

impl WalletRegistry {
    pub fn new(settings: WalletSettings) -> Self {
        Self {
            wallets: RwLock::new(HashMap::new()),
            settings,
        }
    }

    pub fn settings(&self) -> WalletSettings {
        self.settings
    }

    pub async fn start(
        &self,
        wallet_id: &str,
        backend: Arc<dyn WalletBackend>,
    ) -> Result<Arc<WalletHandle>, WalletError> {
        if wallet_id.trim().is_empty() {
            return Err(WalletError::validation("Parameter 'wallet-id' is required"));
        }

        let mut wallets = self.wallets.write().await;
        if wallets.contains_key(wallet_id) {
            return Err(WalletError::WalletAlreadyStarted(wallet_id.to_string()));
        }
        let handle = Arc::new(WalletHandle::new(wallet_id, backend, self.settings));
        wallets.insert(wallet_id.to_string(), handle.clone());

        log::info!(
            "Wallet {} started on {}",
            wallet_id,
            handle.backend.network().name
        );
        Ok(handle)
    }

    /// Stop a wallet, discarding its reservations and listened proposals
    pub async fn stop(&self, wallet_id: &str) -> Result<(), WalletError> {
        let handle = self
            .wallets
            .write()
            .await
            .remove(wallet_id)
            .ok_or_else(|| WalletError::WalletNotStarted(wallet_id.to_string()))?;
        handle.discard_state();
        log::info!("Wallet {} stopped", wallet_id);
        Ok(())
    }

    pub async fn get(&self, wallet_id: &str) -> Result<Arc<WalletHandle>, WalletError> {
        self.wallets
            .read()
            .await
            .get(wallet_id)
            .cloned()
            .ok_or_else(|| WalletError::WalletNotStarted(wallet_id.to_string()))
    }

    pub async fn handles(&self) -> Vec<Arc<WalletHandle>> {
        self.wallets.read().await.values().cloned().collect()
    }

    pub async fn len(&self) -> usize {
        self.wallets.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}
