//! REST API module
//!
//! HTTP surface over the wallet core. The wallet is selected with the
//! `x-wallet-id` header.
//!
//! # Endpoints
//!
//! ## Wallets
//! - `POST /start` - Start a wallet on the development ledger
//! - `POST /wallet/stop` - Stop a wallet
//!
//! ## Transactions
//! - `POST /wallet/tx-proposal` - Build an unsigned transaction
//! - `POST /wallet/send-tx` - Build, sign and push
//! - `PUT /wallet/utxos-selected-as-input` - Mark or unmark outputs
//! - `POST /wallet/decode` - Decode a tx hex or partial tx
//! - `POST /wallet/tx-inputs` - Inputs spending this wallet's outputs
//!
//! ## Atomic swaps (`/wallet/atomic-swap/tx-proposal`)
//! - `POST /` - Create or extend a proposal
//! - `POST /unlock`, `GET /get-locked-utxos`
//! - `POST /get-my-signatures`, `POST /sign`, `POST /sign-and-push`, `POST /get-input-data`
//! - `POST /fetch`, `POST /register/:id`, `POST /update`, `GET /list`, `DELETE /delete/:id`
//!
//! ## WebSocket
//! - `GET /ws` - Balance updates (WalletBalance)

pub mod handlers;
pub mod routes;
pub mod websocket;

pub use handlers::ApiState;
pub use routes::create_router;
pub use websocket::{spawn_balance_feed, WsBroadcaster, WsEvent};
