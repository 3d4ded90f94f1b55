//! Atomic-swap proposal coordination
//!
//! Each wallet keeps its own view of the proposals it follows:
//!
//! ```text
//! Unregistered --create/register--> Registered <--update--> Registered(v+1)
//!      Registered --remove / mediator 404 / wallet stop--> Removed
//! ```
//!
//! Inputs are validated before anything goes over the wire, and a disabled
//! service never touches the network at all.

use std::sync::Arc;

use crate::mediator::{MediatorClient, MediatorError, ProposalRecord, UpdateOutcome};
use crate::proposal::PartialTx;
use crate::wallet::{WalletError, WalletHandle};

pub const MIN_PASSWORD_LEN: usize = 3;

pub struct SwapService {
    enabled: bool,
    client: Option<Arc<dyn MediatorClient>>,
}

impl SwapService {
    pub fn new(enabled: bool, client: Option<Arc<dyn MediatorClient>>) -> Self {
        Self { enabled, client }
    }

    pub fn disabled() -> Self {
        Self::new(false, None)
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled && self.client.is_some()
    }

    fn client(&self) -> Result<&dyn MediatorClient, WalletError> {
        match &self.client {
            Some(client) if self.enabled => Ok(client.as_ref()),
            _ => Err(WalletError::MediatorUnavailable),
        }
    }

    /// Store a new proposal on the mediator and start listening to it
    pub async fn create(
        &self,
        handle: &WalletHandle,
        partial_tx: &str,
        password: &str,
    ) -> Result<String, WalletError> {
        let client = self.client()?;
        check_partial_tx(partial_tx)?;
        check_password(password)?;

        let proposal_id = client
            .create(partial_tx, password)
            .await
            .map_err(upstream)?;
        handle.proposals.listen(&proposal_id, password, Some(0));
        log::info!("Wallet {} created proposal {}", handle.id, proposal_id);
        Ok(proposal_id)
    }

    /// Start listening to an existing proposal, checking access first
    pub async fn register(
        &self,
        handle: &WalletHandle,
        proposal_id: &str,
        password: &str,
    ) -> Result<ProposalRecord, WalletError> {
        let client = self.client()?;
        check_proposal_id(proposal_id)?;
        check_password(password)?;

        let record = client
            .fetch(proposal_id, password)
            .await
            .map_err(|err| match err {
                MediatorError::NotFound => WalletError::ProposalNotFound,
                other => upstream(other),
            })?;
        handle
            .proposals
            .listen(proposal_id, password, Some(record.version));
        log::info!("Wallet {} registered proposal {}", handle.id, proposal_id);
        Ok(record)
    }

    /// Latest state of a listened proposal
    ///
    /// A proposal the mediator no longer knows is dropped from the wallet's
    /// listened set.
    pub async fn fetch(
        &self,
        handle: &WalletHandle,
        proposal_id: &str,
    ) -> Result<ProposalRecord, WalletError> {
        let client = self.client()?;
        let listened = handle
            .proposals
            .get(proposal_id)
            .ok_or(WalletError::ProposalNotRegistered)?;

        match client.fetch(proposal_id, &listened.password).await {
            Ok(record) => {
                handle.proposals.set_version(proposal_id, record.version);
                Ok(record)
            }
            Err(MediatorError::NotFound) => {
                handle.proposals.remove(proposal_id);
                log::warn!(
                    "Proposal {} is gone from the mediator, stopped listening",
                    proposal_id
                );
                Err(WalletError::ProposalNotFound)
            }
            Err(other) => Err(upstream(other)),
        }
    }

    /// Replace a listened proposal if `version` is still current
    ///
    /// A version conflict is returned as an outcome, never retried.
    pub async fn update(
        &self,
        handle: &WalletHandle,
        proposal_id: &str,
        version: Option<u64>,
        partial_tx: &str,
    ) -> Result<UpdateOutcome, WalletError> {
        let client = self.client()?;
        let listened = handle
            .proposals
            .get(proposal_id)
            .ok_or(WalletError::ProposalNotRegistered)?;
        check_partial_tx(partial_tx)?;
        let version = version.ok_or_else(|| WalletError::validation("Version is required"))?;

        let outcome = client
            .update(proposal_id, version, partial_tx, &listened.password)
            .await
            .map_err(upstream)?;
        match outcome {
            UpdateOutcome::Updated { version } => {
                handle.proposals.set_version(proposal_id, version);
                log::info!("Proposal {} now at version {}", proposal_id, version);
            }
            UpdateOutcome::VersionConflict { expected, current } => {
                log::warn!(
                    "Proposal {} update rejected: expected version {}, mediator has {}",
                    proposal_id,
                    expected,
                    current
                );
            }
        }
        Ok(outcome)
    }

    /// Stop listening; succeeds whether or not the proposal was listened
    pub fn remove(&self, handle: &WalletHandle, proposal_id: &str) {
        if handle.proposals.remove(proposal_id) {
            log::info!("Wallet {} stopped listening to {}", handle.id, proposal_id);
        }
    }

    pub fn list(&self, handle: &WalletHandle) -> Vec<String> {
        handle.proposals.ids()
    }
}

fn upstream(err: MediatorError) -> WalletError {
    WalletError::ExternalService(err.upstream_message())
}

fn check_partial_tx(partial_tx: &str) -> Result<(), WalletError> {
    if partial_tx.trim().is_empty() || PartialTx::deserialize(partial_tx).is_err() {
        return Err(WalletError::validation("Invalid PartialTx"));
    }
    Ok(())
}

pub(crate) fn check_password(password: &str) -> Result<(), WalletError> {
    if password.chars().count() < MIN_PASSWORD_LEN {
        return Err(WalletError::validation(
            "Password must have at least 3 characters",
        ));
    }
    Ok(())
}

fn check_proposal_id(proposal_id: &str) -> Result<(), WalletError> {
    if proposal_id.trim().is_empty() {
        return Err(WalletError::validation("Invalid proposal id"));
    }
    Ok(())
}
