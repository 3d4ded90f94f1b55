//! REST API handlers for wallet and atomic-swap operations
//!
//! The started wallet is chosen by the `x-wallet-id` header. Successful
//! responses carry `success: true`; failures carry `success: false` and the
//! error message, with the status code picked by `reject`.

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    Json,
};
use serde::{Deserialize, Serialize};

use crate::api::websocket::WsBroadcaster;
use crate::config::ServiceConfig;
use crate::crypto::KeyPair;
use crate::ledger::{MemoryLedger, MemoryWallet};
use crate::mediator::{ProposalHistoryEntry, ProposalRecord, SwapService, UpdateOutcome};
use crate::proposal::{
    self, assemble, extract_input_data, get_my_signatures, parse_signature_sets, sign_and_push,
    BuiltProposal, DecodeRequest, DecodedTransaction, PartialTx, PushedTransaction,
    SwapProposalRequest,
};
use crate::utxo::{LockedOutputs, UtxoRef};
use crate::wallet::{
    self, BuiltTransaction, SendRequest, UtxoTarget, WalletError, WalletHandle, WalletInput,
    WalletRegistry,
};

pub const WALLET_ID_HEADER: &str = "x-wallet-id";

/// Shared application state for API handlers
#[derive(Clone)]
pub struct ApiState {
    pub registry: Arc<WalletRegistry>,
    pub ledger: Arc<MemoryLedger>,
    pub swap_service: Arc<SwapService>,
    pub ws_broadcaster: Arc<WsBroadcaster>,
    pub config: Arc<ServiceConfig>,
}

impl ApiState {
    pub fn new(config: ServiceConfig, ledger: Arc<MemoryLedger>, swap_service: SwapService) -> Self {
        Self {
            registry: Arc::new(WalletRegistry::new(config.wallet_settings())),
            ledger,
            swap_service: Arc::new(swap_service),
            ws_broadcaster: Arc::new(WsBroadcaster::new()),
            config: Arc::new(config),
        }
    }
}

// ============================================================================
// Errors
// ============================================================================

#[derive(Debug, Serialize)]
pub struct ApiError {
    pub success: bool,
    pub error: String,
}

pub type Rejection = (StatusCode, Json<ApiError>);
pub type ApiResult<T> = Result<Json<T>, Rejection>;

/// Malformed requests and unknown wallets are client errors, a disabled
/// mediator is 405; every other failure is reported in a 200 body.
pub fn status_for(err: &WalletError) -> StatusCode {
    match err {
        WalletError::Validation(_) | WalletError::WalletNotStarted(_) => StatusCode::BAD_REQUEST,
        WalletError::MediatorUnavailable => StatusCode::METHOD_NOT_ALLOWED,
        _ => StatusCode::OK,
    }
}

pub fn reject(err: WalletError) -> Rejection {
    let status = status_for(&err);
    log::debug!("Request failed ({}): {}", status, err);
    (
        status,
        Json(ApiError {
            success: false,
            error: err.to_string(),
        }),
    )
}

async fn started_wallet(
    state: &ApiState,
    headers: &HeaderMap,
) -> Result<Arc<WalletHandle>, Rejection> {
    let wallet_id = headers
        .get(WALLET_ID_HEADER)
        .and_then(|value| value.to_str().ok())
        .filter(|value| !value.is_empty())
        .ok_or_else(|| reject(WalletError::validation("Header 'X-Wallet-Id' is required")))?;
    state.registry.get(wallet_id).await.map_err(reject)
}

// ============================================================================
// Request / Response Types
// ============================================================================

/// `success: true` merged with the fields of `data`
#[derive(Debug, Serialize)]
pub struct Success<T> {
    pub success: bool,
    #[serde(flatten)]
    pub data: T,
}

fn success<T>(data: T) -> Json<Success<T>> {
    Json(Success {
        success: true,
        data,
    })
}

#[derive(Debug, Serialize)]
pub struct Done {
    pub success: bool,
}

fn done() -> Json<Done> {
    Json(Done { success: true })
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub wallets: usize,
    pub swap_service: bool,
}

#[derive(Debug, Deserialize)]
pub struct StartRequest {
    #[serde(alias = "wallet-id")]
    pub wallet_id: String,
    /// Hex secp256k1 keys; a fresh key is generated when empty
    #[serde(default)]
    pub private_keys: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct StartResponse {
    pub success: bool,
    pub wallet_id: String,
    pub addresses: Vec<String>,
}

fn default_mark() -> bool {
    true
}

#[derive(Debug, Deserialize)]
pub struct MarkUtxosRequest {
    #[serde(flatten)]
    pub target: UtxoTarget,
    #[serde(default = "default_mark")]
    pub mark_as: bool,
    /// Seconds until the mark expires; no expiry when absent
    #[serde(default)]
    pub ttl: Option<u64>,
}

#[derive(Debug, Serialize)]
pub struct MarkUtxosResponse {
    pub success: bool,
    pub utxos: Vec<UtxoRef>,
}

#[derive(Debug, Deserialize)]
pub struct TxHexRequest {
    #[serde(alias = "txHex")]
    pub tx_hex: String,
}

#[derive(Debug, Serialize)]
pub struct TxInputsResponse {
    pub success: bool,
    pub inputs: Vec<WalletInput>,
}

#[derive(Debug, Deserialize)]
pub struct PartialTxRequest {
    pub partial_tx: String,
}

#[derive(Debug, Serialize)]
pub struct UnlockResponse {
    pub success: bool,
    pub released: usize,
}

#[derive(Debug, Serialize)]
pub struct LockedUtxosResponse {
    pub success: bool,
    pub locked_utxos: Vec<LockedOutputs>,
}

#[derive(Debug, Serialize)]
pub struct SignaturesResponse {
    pub success: bool,
    pub signatures: String,
}

#[derive(Debug, Deserialize)]
pub struct SignRequest {
    pub partial_tx: String,
    #[serde(default)]
    pub signatures: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct SignResponse {
    pub success: bool,
    #[serde(rename = "txHex")]
    pub tx_hex: String,
}

#[derive(Debug, Deserialize)]
pub struct ProposalIdRequest {
    #[serde(alias = "proposalId")]
    pub proposal_id: String,
}

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct UpdateProposalRequest {
    #[serde(alias = "proposalId")]
    pub proposal_id: String,
    #[serde(default)]
    pub version: Option<u64>,
    pub partial_tx: String,
}

#[derive(Debug, Serialize)]
pub struct UpdateResponse {
    pub success: bool,
    #[serde(flatten)]
    pub outcome: UpdateOutcome,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProposalResponse {
    pub success: bool,
    pub proposal_id: String,
    pub version: u64,
    pub timestamp: Option<String>,
    pub partial_tx: String,
    pub signatures: Option<String>,
    pub is_complete: bool,
    pub history: Vec<ProposalHistoryEntry>,
}

impl From<ProposalRecord> for ProposalResponse {
    fn from(record: ProposalRecord) -> Self {
        Self {
            success: true,
            is_complete: record.partial_tx.is_complete(),
            partial_tx: record.partial_tx.serialize(),
            signatures: record.signatures.as_ref().map(|s| s.serialize()),
            proposal_id: record.proposal_id,
            version: record.version,
            timestamp: record.timestamp,
            history: record.history,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ProposalListResponse {
    pub success: bool,
    pub proposals: Vec<String>,
}

// ============================================================================
// Service Handlers
// ============================================================================

/// GET /health - Liveness and service summary
pub async fn health_check(State(state): State<ApiState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        wallets: state.registry.len().await,
        swap_service: state.swap_service.is_enabled(),
    })
}

/// POST /start - Start a wallet over the development ledger
pub async fn start_wallet(
    State(state): State<ApiState>,
    Json(req): Json<StartRequest>,
) -> ApiResult<StartResponse> {
    let keys = req
        .private_keys
        .iter()
        .map(|key| KeyPair::from_private_key_hex(key))
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| reject(WalletError::validation(format!("Invalid private key: {}", e))))?;

    let wallet = MemoryWallet::new(state.ledger.clone(), keys);
    let addresses = wallet.addresses().to_vec();
    state
        .registry
        .start(&req.wallet_id, Arc::new(wallet))
        .await
        .map_err(reject)?;

    Ok(Json(StartResponse {
        success: true,
        wallet_id: req.wallet_id,
        addresses,
    }))
}

/// POST /wallet/stop - Stop the wallet, dropping its reservations
pub async fn stop_wallet(State(state): State<ApiState>, headers: HeaderMap) -> ApiResult<Done> {
    let handle = started_wallet(&state, &headers).await?;
    state.registry.stop(&handle.id).await.map_err(reject)?;
    Ok(done())
}

// ============================================================================
// Wallet Handlers
// ============================================================================

/// POST /wallet/tx-proposal - Build an unsigned transaction, reserving its inputs
pub async fn build_tx(
    State(state): State<ApiState>,
    headers: HeaderMap,
    Json(req): Json<SendRequest>,
) -> ApiResult<Success<BuiltTransaction>> {
    let handle = started_wallet(&state, &headers).await?;
    let built = wallet::build_transaction(&handle, &req)
        .await
        .map_err(reject)?;
    Ok(success(built))
}

/// POST /wallet/send-tx - Build, sign and push a transaction
pub async fn send_tx(
    State(state): State<ApiState>,
    headers: HeaderMap,
    Json(req): Json<SendRequest>,
) -> ApiResult<Success<PushedTransaction>> {
    let handle = started_wallet(&state, &headers).await?;
    let pushed = wallet::send_transaction(&handle, &req)
        .await
        .map_err(reject)?;
    Ok(success(pushed))
}

/// PUT /wallet/utxos-selected-as-input - Mark or unmark outputs as selected
pub async fn mark_utxos(
    State(state): State<ApiState>,
    headers: HeaderMap,
    Json(req): Json<MarkUtxosRequest>,
) -> ApiResult<MarkUtxosResponse> {
    let handle = started_wallet(&state, &headers).await?;
    let ttl = req.ttl.map(std::time::Duration::from_secs);
    let utxos =
        wallet::mark_utxos_selected(&handle, &req.target, req.mark_as, ttl).map_err(reject)?;
    Ok(Json(MarkUtxosResponse {
        success: true,
        utxos,
    }))
}

/// POST /wallet/decode - Decode a tx hex or a partial tx
pub async fn decode(
    State(state): State<ApiState>,
    headers: HeaderMap,
    Json(req): Json<DecodeRequest>,
) -> ApiResult<Success<DecodedTransaction>> {
    let handle = started_wallet(&state, &headers).await?;
    let decoded = proposal::decode(&handle, &req).await.map_err(reject)?;
    Ok(success(decoded))
}

/// POST /wallet/tx-inputs - Inputs of a transaction that spend this wallet's outputs
pub async fn tx_inputs(
    State(state): State<ApiState>,
    headers: HeaderMap,
    Json(req): Json<TxHexRequest>,
) -> ApiResult<TxInputsResponse> {
    let handle = started_wallet(&state, &headers).await?;
    let inputs = wallet::wallet_inputs(&handle, &req.tx_hex)
        .await
        .map_err(reject)?;
    Ok(Json(TxInputsResponse {
        success: true,
        inputs,
    }))
}

// ============================================================================
// Atomic Swap Handlers
// ============================================================================

/// POST /wallet/atomic-swap/tx-proposal - Create or extend a swap proposal
pub async fn swap_proposal(
    State(state): State<ApiState>,
    headers: HeaderMap,
    Json(req): Json<SwapProposalRequest>,
) -> ApiResult<Success<BuiltProposal>> {
    let handle = started_wallet(&state, &headers).await?;
    let built = proposal::build_swap_proposal(&handle, &state.swap_service, &req)
        .await
        .map_err(reject)?;
    Ok(success(built))
}

/// POST /wallet/atomic-swap/tx-proposal/unlock - Release a proposal's inputs
pub async fn unlock(
    State(state): State<ApiState>,
    headers: HeaderMap,
    Json(req): Json<PartialTxRequest>,
) -> ApiResult<UnlockResponse> {
    let handle = started_wallet(&state, &headers).await?;
    let released = proposal::unlock_inputs(&handle, &req.partial_tx)
        .await
        .map_err(reject)?;
    Ok(Json(UnlockResponse {
        success: true,
        released,
    }))
}

/// GET /wallet/atomic-swap/tx-proposal/get-locked-utxos
pub async fn locked_utxos(
    State(state): State<ApiState>,
    headers: HeaderMap,
) -> ApiResult<LockedUtxosResponse> {
    let handle = started_wallet(&state, &headers).await?;
    Ok(Json(LockedUtxosResponse {
        success: true,
        locked_utxos: proposal::locked_utxos(&handle),
    }))
}

/// POST /wallet/atomic-swap/tx-proposal/get-my-signatures
pub async fn my_signatures(
    State(state): State<ApiState>,
    headers: HeaderMap,
    Json(req): Json<PartialTxRequest>,
) -> ApiResult<SignaturesResponse> {
    let handle = started_wallet(&state, &headers).await?;
    let partial = PartialTx::deserialize_for(&req.partial_tx, &handle.backend.network().name)
        .map_err(|e| reject(e.into()))?;
    let signatures = get_my_signatures(&partial, handle.backend())
        .await
        .map_err(reject)?;
    Ok(Json(SignaturesResponse {
        success: true,
        signatures: signatures.serialize(),
    }))
}

/// POST /wallet/atomic-swap/tx-proposal/sign - Assemble the signed tx hex
pub async fn sign(
    State(state): State<ApiState>,
    headers: HeaderMap,
    Json(req): Json<SignRequest>,
) -> ApiResult<SignResponse> {
    let handle = started_wallet(&state, &headers).await?;
    let partial = PartialTx::deserialize_for(&req.partial_tx, &handle.backend.network().name)
        .map_err(|e| reject(e.into()))?;
    let sets = parse_signature_sets(&req.signatures).map_err(reject)?;
    let tx = assemble(&partial, &sets).map_err(reject)?;
    Ok(Json(SignResponse {
        success: true,
        tx_hex: tx.to_hex(),
    }))
}

/// POST /wallet/atomic-swap/tx-proposal/sign-and-push
pub async fn sign_push(
    State(state): State<ApiState>,
    headers: HeaderMap,
    Json(req): Json<SignRequest>,
) -> ApiResult<Success<PushedTransaction>> {
    let handle = started_wallet(&state, &headers).await?;
    let pushed = sign_and_push(&handle, &req.partial_tx, &req.signatures)
        .await
        .map_err(reject)?;
    Ok(success(pushed))
}

/// POST /wallet/atomic-swap/tx-proposal/get-input-data - Signatures carried by a tx hex
pub async fn input_data(
    State(state): State<ApiState>,
    headers: HeaderMap,
    Json(req): Json<TxHexRequest>,
) -> ApiResult<SignaturesResponse> {
    started_wallet(&state, &headers).await?;
    let signatures = extract_input_data(&req.tx_hex).map_err(reject)?;
    Ok(Json(SignaturesResponse {
        success: true,
        signatures: signatures.serialize(),
    }))
}

// ============================================================================
// Mediator Handlers
// ============================================================================

/// POST /wallet/atomic-swap/tx-proposal/fetch - Latest state of a listened proposal
pub async fn fetch_proposal(
    State(state): State<ApiState>,
    headers: HeaderMap,
    Json(req): Json<ProposalIdRequest>,
) -> ApiResult<ProposalResponse> {
    let handle = started_wallet(&state, &headers).await?;
    let record = state
        .swap_service
        .fetch(&handle, &req.proposal_id)
        .await
        .map_err(reject)?;
    Ok(Json(record.into()))
}

/// POST /wallet/atomic-swap/tx-proposal/register/{id} - Start listening to a proposal
pub async fn register_proposal(
    State(state): State<ApiState>,
    headers: HeaderMap,
    Path(proposal_id): Path<String>,
    Json(req): Json<RegisterRequest>,
) -> ApiResult<ProposalResponse> {
    let handle = started_wallet(&state, &headers).await?;
    let record = state
        .swap_service
        .register(&handle, &proposal_id, &req.password)
        .await
        .map_err(reject)?;
    Ok(Json(record.into()))
}

/// POST /wallet/atomic-swap/tx-proposal/update - Replace a proposal at a known version
pub async fn update_proposal(
    State(state): State<ApiState>,
    headers: HeaderMap,
    Json(req): Json<UpdateProposalRequest>,
) -> ApiResult<UpdateResponse> {
    let handle = started_wallet(&state, &headers).await?;
    let outcome = state
        .swap_service
        .update(&handle, &req.proposal_id, req.version, &req.partial_tx)
        .await
        .map_err(reject)?;
    Ok(Json(UpdateResponse {
        success: matches!(outcome, UpdateOutcome::Updated { .. }),
        outcome,
    }))
}

/// GET /wallet/atomic-swap/tx-proposal/list - Listened proposal ids
pub async fn list_proposals(
    State(state): State<ApiState>,
    headers: HeaderMap,
) -> ApiResult<ProposalListResponse> {
    let handle = started_wallet(&state, &headers).await?;
    Ok(Json(ProposalListResponse {
        success: true,
        proposals: state.swap_service.list(&handle),
    }))
}

/// DELETE /wallet/atomic-swap/tx-proposal/delete/{id} - Stop listening to a proposal
pub async fn delete_proposal(
    State(state): State<ApiState>,
    headers: HeaderMap,
    Path(proposal_id): Path<String>,
) -> ApiResult<Done> {
    let handle = started_wallet(&state, &headers).await?;
    state.swap_service.remove(&handle, &proposal_id);
    Ok(done())
}
