//! Mediator transport
//!
//! The mediator stores a serialized proposal, its signatures and a version
//! counter. `HttpMediator` speaks its JSON protocol:
//!
//! - `POST /` `{partialTx, authPassword}` creates a proposal
//! - `GET /{id}` with `X-Auth-Password` fetches it
//! - `PUT /{id}` `{partialTx, version, authPassword}` replaces it if `version`
//!   is still current; a stale version answers `409` with the current one

use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};

use crate::mediator::types::RawProposalRecord;
use crate::mediator::{MediatorError, ProposalRecord, UpdateOutcome};

pub const AUTH_PASSWORD_HEADER: &str = "X-Auth-Password";

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

#[async_trait]
pub trait MediatorClient: Send + Sync {
    /// Store a new proposal, returning its id
    async fn create(&self, partial_tx: &str, password: &str) -> Result<String, MediatorError>;

    async fn fetch(&self, proposal_id: &str, password: &str)
        -> Result<ProposalRecord, MediatorError>;

    /// Replace the proposal if `version` is still the current one
    async fn update(
        &self,
        proposal_id: &str,
        version: u64,
        partial_tx: &str,
        password: &str,
    ) -> Result<UpdateOutcome, MediatorError>;
}

// ===== Wire payloads =====

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct CreateRequest<'a> {
    partial_tx: &'a str,
    auth_password: &'a str,
}

#[derive(Deserialize)]
struct CreateResponse {
    #[serde(default)]
    success: bool,
    #[serde(default)]
    id: Option<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct UpdateRequest<'a> {
    partial_tx: &'a str,
    version: u64,
    auth_password: &'a str,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct UpdateResponse {
    #[serde(default)]
    success: bool,
    #[serde(default)]
    new_version: Option<u64>,
    #[serde(default)]
    current_version: Option<u64>,
}

#[derive(Deserialize)]
struct ErrorBody {
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

// ===== HTTP client =====

pub struct HttpMediator {
    client: reqwest::Client,
    base_url: String,
}

impl HttpMediator {
    pub fn new(base_url: &str) -> Result<Self, MediatorError> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| MediatorError::Network(e.to_string()))?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, proposal_id: Option<&str>) -> String {
        match proposal_id {
            Some(id) => format!("{}/{}", self.base_url, id),
            None => format!("{}/", self.base_url),
        }
    }
}

fn network_error(err: reqwest::Error) -> MediatorError {
    MediatorError::Network(err.to_string())
}

/// Non-success status into an error, keeping the mediator's own message
async fn status_error(response: reqwest::Response) -> MediatorError {
    let status = response.status();
    if status == StatusCode::NOT_FOUND {
        return MediatorError::NotFound;
    }
    let text = response.text().await.unwrap_or_default();
    let message = serde_json::from_str::<ErrorBody>(&text)
        .ok()
        .and_then(|body| body.error.or(body.message))
        .unwrap_or_else(|| text.trim().to_string());
    MediatorError::Http {
        status: status.as_u16(),
        message,
    }
}

async fn json_body<T: for<'de> Deserialize<'de>>(
    response: reqwest::Response,
) -> Result<T, MediatorError> {
    response
        .json::<T>()
        .await
        .map_err(|e| MediatorError::InvalidPayload(e.to_string()))
}

#[async_trait]
impl MediatorClient for HttpMediator {
    async fn create(&self, partial_tx: &str, password: &str) -> Result<String, MediatorError> {
        let response = self
            .client
            .post(self.url(None))
            .json(&CreateRequest {
                partial_tx,
                auth_password: password,
            })
            .send()
            .await
            .map_err(network_error)?;
        if !response.status().is_success() {
            return Err(status_error(response).await);
        }

        let body: CreateResponse = json_body(response).await?;
        match (body.success, body.id) {
            (true, Some(id)) if !id.is_empty() => Ok(id),
            (true, _) => Err(MediatorError::InvalidPayload("missing id".to_string())),
            (false, _) => Err(MediatorError::Rejected(
                "Unable to create the proposal on the Atomic Swap Service".to_string(),
            )),
        }
    }

    async fn fetch(
        &self,
        proposal_id: &str,
        password: &str,
    ) -> Result<ProposalRecord, MediatorError> {
        let response = self
            .client
            .get(self.url(Some(proposal_id)))
            .header(AUTH_PASSWORD_HEADER, password)
            .send()
            .await
            .map_err(network_error)?;
        if !response.status().is_success() {
            return Err(status_error(response).await);
        }

        let raw: RawProposalRecord = json_body(response).await?;
        ProposalRecord::try_from(raw)
    }

    async fn update(
        &self,
        proposal_id: &str,
        version: u64,
        partial_tx: &str,
        password: &str,
    ) -> Result<UpdateOutcome, MediatorError> {
        let response = self
            .client
            .put(self.url(Some(proposal_id)))
            .json(&UpdateRequest {
                partial_tx,
                version,
                auth_password: password,
            })
            .send()
            .await
            .map_err(network_error)?;

        let status = response.status();
        if status == StatusCode::CONFLICT {
            let body: UpdateResponse = json_body(response).await?;
            let current = body.current_version.ok_or_else(|| {
                MediatorError::InvalidPayload("conflict without currentVersion".to_string())
            })?;
            return Ok(UpdateOutcome::VersionConflict {
                expected: version,
                current,
            });
        }
        if !status.is_success() {
            return Err(status_error(response).await);
        }

        let body: UpdateResponse = json_body(response).await?;
        if !body.success {
            return Err(MediatorError::Rejected(
                "Unable to update the proposal on the Atomic Swap Service".to_string(),
            ));
        }
        Ok(UpdateOutcome::Updated {
            version: body.new_version.unwrap_or(version + 1),
        })
    }
}
