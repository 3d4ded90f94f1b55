//! WebSocket support for real-time wallet updates
//!
//! Every transaction the ledger accepts is run through the balance delta
//! calculator for each started wallet; non-empty results are pushed to
//! connected clients.

use std::collections::BTreeMap;
use std::sync::Arc;

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::IntoResponse,
};
use futures::{SinkExt, StreamExt};
use serde::Serialize;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

use crate::balance::{compute_balance, BalanceDelta, ObservedTransaction};
use crate::wallet::WalletRegistry;

/// Maximum number of events to buffer per subscriber
const BROADCAST_CAPACITY: usize = 100;

/// WebSocket events that can be broadcast to clients
#[derive(Clone, Debug, Serialize)]
#[serde(tag = "type", content = "data")]
pub enum WsEvent {
    /// A transaction changed the balance of a started wallet
    WalletBalance {
        wallet_id: String,
        tx_id: String,
        balance: BTreeMap<String, BalanceDelta>,
    },
    /// Connection established
    Connected { message: String },
}

/// Broadcaster for WebSocket events
#[derive(Debug)]
pub struct WsBroadcaster {
    sender: broadcast::Sender<WsEvent>,
}

impl WsBroadcaster {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(BROADCAST_CAPACITY);
        Self { sender }
    }

    /// Broadcast an event to all connected clients
    pub fn broadcast(&self, event: WsEvent) {
        // no subscribers is fine
        let _ = self.sender.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<WsEvent> {
        self.sender.subscribe()
    }
}

impl Default for WsBroadcaster {
    fn default() -> Self {
        Self::new()
    }
}

/// Balance notifications for one observed transaction, one per affected wallet
pub async fn balance_events(registry: &WalletRegistry, tx: &ObservedTransaction) -> Vec<WsEvent> {
    let mut events = Vec::new();
    for handle in registry.handles().await {
        let ctx = match handle.chain_context().await {
            Ok(ctx) => ctx,
            Err(e) => {
                log::warn!("Skipping balance for wallet {}: {}", handle.id, e);
                continue;
            }
        };
        let balance = compute_balance(handle.backend(), &ctx, tx);
        if !balance.is_empty() {
            events.push(WsEvent::WalletBalance {
                wallet_id: handle.id.clone(),
                tx_id: tx.tx_id.clone(),
                balance,
            });
        }
    }
    events
}

/// Forward ledger transactions to WebSocket clients as balance events
pub fn spawn_balance_feed(
    registry: Arc<WalletRegistry>,
    mut feed: broadcast::Receiver<ObservedTransaction>,
    broadcaster: Arc<WsBroadcaster>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            match feed.recv().await {
                Ok(tx) => {
                    for event in balance_events(&registry, &tx).await {
                        broadcaster.broadcast(event);
                    }
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    log::warn!("Balance feed lagged, {} transactions skipped", skipped);
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
        log::info!("Balance feed stopped");
    })
}

/// WebSocket upgrade handler
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<crate::api::handlers::ApiState>,
) -> impl IntoResponse {
    let broadcaster = state.ws_broadcaster.clone();
    ws.on_upgrade(move |socket| handle_socket(socket, broadcaster))
}

async fn handle_socket(socket: WebSocket, broadcaster: Arc<WsBroadcaster>) {
    let (mut sender, mut receiver) = socket.split();
    let mut rx = broadcaster.subscribe();

    let welcome = WsEvent::Connected {
        message: "Connected to swap-wallet WebSocket".to_string(),
    };
    if let Ok(json) = serde_json::to_string(&welcome) {
        let _ = sender.send(Message::Text(json.into())).await;
    }

    let mut send_task = tokio::spawn(async move {
        loop {
            match rx.recv().await {
                Ok(event) => {
                    if let Ok(json) = serde_json::to_string(&event) {
                        if sender.send(Message::Text(json.into())).await.is_err() {
                            break;
                        }
                    }
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    log::warn!("WebSocket client lagged, {} events dropped", skipped);
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    });

    let mut recv_task = tokio::spawn(async move {
        while let Some(msg) = receiver.next().await {
            match msg {
                Ok(Message::Close(_)) => break,
                Ok(Message::Text(text)) => {
                    log::debug!("Received text message: {}", text);
                }
                Err(e) => {
                    log::warn!("WebSocket error: {}", e);
                    break;
                }
                _ => {}
            }
        }
    });

    tokio::select! {
        _ = &mut send_task => {
            recv_task.abort();
        }
        _ = &mut recv_task => {
            send_task.abort();
        }
    }

    log::info!("WebSocket connection closed");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{NetworkParams, NATIVE_TOKEN_UID};
    use crate::ledger::{MemoryLedger, MemoryWallet};
    use crate::wallet::WalletSettings;
    use std::time::Duration;

    #[tokio::test]
    async fn test_broadcast_reaches_current_subscribers() {
        let broadcaster = WsBroadcaster::new();
        // nobody listening yet
        broadcaster.broadcast(WsEvent::Connected {
            message: "early".to_string(),
        });

        let mut rx = broadcaster.subscribe();
        broadcaster.broadcast(WsEvent::Connected {
            message: "hello".to_string(),
        });
        match rx.recv().await.unwrap() {
            WsEvent::Connected { message } => assert_eq!(message, "hello"),
            other => panic!("unexpected event {:?}", other),
        }
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_event_serialization() {
        let mut balance = BTreeMap::new();
        balance.insert(NATIVE_TOKEN_UID.to_string(), BalanceDelta::default());
        let event = WsEvent::WalletBalance {
            wallet_id: "w1".to_string(),
            tx_id: "abc123".to_string(),
            balance,
        };

        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "WalletBalance");
        assert_eq!(json["data"]["tx_id"], "abc123");
        assert_eq!(json["data"]["balance"]["00"]["tokens"]["unlocked"], 0);
    }

    #[tokio::test]
    async fn test_feed_notifies_only_affected_wallets() {
        let ledger = Arc::new(MemoryLedger::new(NetworkParams::new("testnet")));
        let alice = Arc::new(MemoryWallet::generate(ledger.clone(), 1));
        let bob = Arc::new(MemoryWallet::generate(ledger.clone(), 1));
        let registry = Arc::new(WalletRegistry::new(WalletSettings::default()));
        registry.start("alice", alice.clone()).await.unwrap();
        registry.start("bob", bob).await.unwrap();

        let broadcaster = Arc::new(WsBroadcaster::new());
        let mut events = broadcaster.subscribe();
        let feed = spawn_balance_feed(registry, ledger.subscribe(), broadcaster.clone());

        let address = alice.addresses()[0].clone();
        ledger.mint(NATIVE_TOKEN_UID, &[(address.as_str(), 25)]).await;

        let event = tokio::time::timeout(Duration::from_secs(5), events.recv())
            .await
            .unwrap()
            .unwrap();
        match event {
            WsEvent::WalletBalance {
                wallet_id, balance, ..
            } => {
                assert_eq!(wallet_id, "alice");
                assert_eq!(balance[NATIVE_TOKEN_UID].tokens.unlocked, 25);
            }
            other => panic!("unexpected event {:?}", other),
        }
        assert!(events.try_recv().is_err());
        feed.abort();
    }
}
