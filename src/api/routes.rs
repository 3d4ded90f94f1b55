//! REST API routes configuration

use crate::api::handlers::{self, ApiState};
use crate::api::websocket::ws_handler;
use axum::{
    routing::{delete, get, post, put},
    Router,
};
use tower_http::cors::{Any, CorsLayer};

/// Create the API router with all routes
pub fn create_router(state: ApiState) -> Router {
    // Configure CORS for browser access
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let atomic_swap = Router::new()
        .route("/", post(handlers::swap_proposal))
        .route("/unlock", post(handlers::unlock))
        .route("/get-locked-utxos", get(handlers::locked_utxos))
        .route("/get-my-signatures", post(handlers::my_signatures))
        .route("/sign", post(handlers::sign))
        .route("/sign-and-push", post(handlers::sign_push))
        .route("/get-input-data", post(handlers::input_data))
        // Mediator
        .route("/fetch", post(handlers::fetch_proposal))
        .route("/register/{proposal_id}", post(handlers::register_proposal))
        .route("/update", post(handlers::update_proposal))
        .route("/list", get(handlers::list_proposals))
        .route("/delete/{proposal_id}", delete(handlers::delete_proposal));

    Router::new()
        // Health check
        .route("/health", get(handlers::health_check))
        // WebSocket for balance updates
        .route("/ws", get(ws_handler))
        // Wallet lifecycle
        .route("/start", post(handlers::start_wallet))
        .route("/wallet/stop", post(handlers::stop_wallet))
        // Unilateral transactions
        .route("/wallet/tx-proposal", post(handlers::build_tx))
        .route("/wallet/send-tx", post(handlers::send_tx))
        .route(
            "/wallet/utxos-selected-as-input",
            put(handlers::mark_utxos),
        )
        .route("/wallet/decode", post(handlers::decode))
        .route("/wallet/tx-inputs", post(handlers::tx_inputs))
        // Atomic swaps
        .nest("/wallet/atomic-swap/tx-proposal", atomic_swap)
        .with_state(state)
        .layer(cors)
}
