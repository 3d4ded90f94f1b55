//! Swap proposal builder
//!
//! Extends a partial transaction with this wallet's side of a swap: what it
//! sends (selected outputs plus change) and what it expects to receive.
//! Everything runs under the wallet's operation lock; outputs selected here
//! stay reserved afterwards only when the caller asks for it.

use serde::{Deserialize, Serialize};

use crate::core::{OutputScript, NATIVE_TOKEN_UID};
use crate::mediator::SwapService;
use crate::proposal::{PartialTx, ProposalOutput};
use crate::utxo::{select_utxos, LockedOutputs, Reservation, UtxoFilter, UtxoRef};
use crate::wallet::send::{proposal_input, resolve_utxo};
use crate::wallet::{WalletError, WalletHandle};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SendToken {
    #[serde(default)]
    pub token: Option<String>,
    pub value: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SendSide {
    #[serde(default)]
    pub tokens: Vec<SendToken>,
    /// Restrict selection to these outputs
    #[serde(default)]
    pub utxos: Vec<UtxoRef>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReceiveToken {
    #[serde(default)]
    pub token: Option<String>,
    pub value: u64,
    #[serde(default)]
    pub timelock: Option<u32>,
    #[serde(default)]
    pub address: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReceiveSide {
    #[serde(default)]
    pub tokens: Vec<ReceiveToken>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceOptions {
    pub password: String,
    #[serde(default)]
    pub is_new: bool,
}

fn default_lock() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SwapProposalRequest {
    #[serde(default)]
    pub partial_tx: Option<String>,
    #[serde(default)]
    pub send: SendSide,
    #[serde(default)]
    pub receive: ReceiveSide,
    #[serde(default)]
    pub change_address: Option<String>,
    /// Keep the selected outputs reserved after the call
    #[serde(default = "default_lock")]
    pub lock: bool,
    #[serde(default)]
    pub service: Option<ServiceOptions>,
}

impl Default for SwapProposalRequest {
    fn default() -> Self {
        Self {
            partial_tx: None,
            send: SendSide::default(),
            receive: ReceiveSide::default(),
            change_address: None,
            lock: true,
            service: None,
        }
    }
}

impl SwapProposalRequest {
    fn validate(&self) -> Result<(), WalletError> {
        if self.send.tokens.is_empty() && self.receive.tokens.is_empty() {
            return Err(WalletError::validation("Should have at least one operation"));
        }
        let values = self
            .send
            .tokens
            .iter()
            .map(|t| t.value)
            .chain(self.receive.tokens.iter().map(|t| t.value));
        for value in values {
            if value == 0 {
                return Err(WalletError::validation("Value must be greater than zero"));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BuiltProposal {
    pub data: String,
    pub is_complete: bool,
    pub created_proposal_id: Option<String>,
}

fn token_or_native(token: &Option<String>) -> &str {
    token.as_deref().unwrap_or(NATIVE_TOKEN_UID)
}

/// Outputs of `refs` this wallet can spend right now
async fn usable_utxos(handle: &WalletHandle, refs: &[UtxoRef]) -> Result<Vec<UtxoRef>, WalletError> {
    let mut usable = Vec::new();
    for utxo in refs {
        match resolve_utxo(handle, utxo).await {
            Ok(resolved) => usable.push(resolved.utxo),
            Err(WalletError::Validation(reason)) => {
                log::debug!("Skipping {}: {}", utxo, reason);
            }
            Err(other) => return Err(other),
        }
    }
    if usable.is_empty() {
        return Err(WalletError::validation("Could not use any of the utxos."));
    }
    Ok(usable)
}

/// Add this wallet's sends and receives to a (possibly new) partial tx
///
/// With `service.is_new` the result is also stored on the mediator; if that
/// fails, every output reserved during the call is released before the
/// error is returned.
pub async fn build_swap_proposal(
    handle: &WalletHandle,
    service: &SwapService,
    request: &SwapProposalRequest,
) -> Result<BuiltProposal, WalletError> {
    request.validate()?;
    let network = handle.backend.network().name.clone();
    let mut partial = match &request.partial_tx {
        Some(text) => PartialTx::deserialize_for(text, &network)?,
        None => PartialTx::new(&network),
    };
    let create_on_mediator = request
        .service
        .as_ref()
        .filter(|options| options.is_new && service.is_enabled());
    if let Some(options) = create_on_mediator {
        crate::mediator::service::check_password(&options.password)?;
    }

    handle
        .op_lock
        .with_lock(async {
            let mut reservations: Vec<Reservation<'_>> = Vec::new();

            let filter = if request.send.utxos.is_empty() {
                UtxoFilter::default()
            } else {
                UtxoFilter::only(usable_utxos(handle, &request.send.utxos).await?)
            }
            .excluding(partial.utxos());
            for send in &request.send.tokens {
                let token = token_or_native(&send.token);
                let selection =
                    select_utxos(handle.backend(), &handle.utxo_locks, token, send.value, &filter)
                        .await?;
                reservations.push(
                    handle
                        .utxo_locks
                        .reserve(selection.utxos.iter().map(|u| u.utxo.clone()).collect(), None),
                );
                for utxo in &selection.utxos {
                    partial.add_input(proposal_input(utxo))?;
                }
                let change = selection.change(send.value);
                if change > 0 {
                    let address = match &request.change_address {
                        Some(address) => address.clone(),
                        None => handle.backend.change_address().await?,
                    };
                    partial.add_output(ProposalOutput::value(
                        change,
                        &OutputScript::new(&address, None),
                        token,
                        true,
                    ))?;
                }
            }

            for receive in &request.receive.tokens {
                let address = match &receive.address {
                    Some(address) => address.clone(),
                    None => handle.backend.current_address().await?,
                };
                partial.add_output(ProposalOutput::value(
                    receive.value,
                    &OutputScript::new(&address, receive.timelock),
                    token_or_native(&receive.token),
                    false,
                ))?;
            }

            let data = partial.serialize();
            let created_proposal_id = match create_on_mediator {
                Some(options) => Some(service.create(handle, &data, &options.password).await?),
                None => None,
            };

            for reservation in reservations {
                if request.lock {
                    reservation.commit();
                } else {
                    reservation.release();
                }
            }
            log::info!(
                "Wallet {} extended proposal to {} inputs, {} outputs",
                handle.id,
                partial.inputs().len(),
                partial.outputs().len()
            );
            Ok::<_, WalletError>(BuiltProposal {
                data,
                is_complete: partial.is_complete(),
                created_proposal_id,
            })
        })
        .await
}

/// Release this wallet's reservations of the inputs of `partial_tx`
pub async fn unlock_inputs(handle: &WalletHandle, partial_tx: &str) -> Result<usize, WalletError> {
    let partial = PartialTx::deserialize_for(partial_tx, &handle.backend.network().name)?;
    handle
        .op_lock
        .with_lock(async {
            let released = handle.utxo_locks.unlock_many(&partial.utxos());
            log::info!("Wallet {} released {} outputs", handle.id, released);
            Ok::<_, WalletError>(released)
        })
        .await
}

pub fn locked_utxos(handle: &WalletHandle) -> Vec<LockedOutputs> {
    handle.utxo_locks.locked_utxos()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::funded_wallet;
    use crate::mediator::service::fake::RecordingMediator;
    use crate::mediator::MediatorError;
    use crate::proposal::{assemble, get_my_signatures};
    use crate::wallet::WalletSettings;
    use std::sync::Arc;

    async fn handle(amounts: &[u64]) -> WalletHandle {
        let (_ledger, wallet) = funded_wallet(amounts).await;
        WalletHandle::new("w1", wallet, WalletSettings::default())
    }

    fn send(value: u64) -> SwapProposalRequest {
        SwapProposalRequest {
            send: SendSide {
                tokens: vec![SendToken { token: None, value }],
                utxos: Vec::new(),
            },
            ..Default::default()
        }
    }

    #[test]
    fn test_request_defaults() {
        let request: SwapProposalRequest =
            serde_json::from_str(r#"{"receive": {"tokens": [{"token": "t1", "value": 5}]}}"#)
                .unwrap();
        assert!(request.lock);
        assert!(request.send.tokens.is_empty());
        assert_eq!(request.receive.tokens[0].value, 5);
    }

    #[tokio::test]
    async fn test_needs_an_operation() {
        let handle = handle(&[10]).await;
        let err = build_swap_proposal(&handle, &SwapService::disabled(), &Default::default())
            .await
            .unwrap_err();
        assert_eq!(
            err,
            WalletError::Validation("Should have at least one operation".to_string())
        );
    }

    #[tokio::test]
    async fn test_send_and_receive() {
        let handle = handle(&[10, 3]).await;
        let mut request = send(4);
        request.receive.tokens.push(ReceiveToken {
            token: Some("t1".to_string()),
            value: 7,
            timelock: Some(2_000_000_000),
            address: None,
        });

        let built = build_swap_proposal(&handle, &SwapService::disabled(), &request)
            .await
            .unwrap();
        assert!(!built.is_complete);
        assert!(built.created_proposal_id.is_none());

        let partial = PartialTx::deserialize(&built.data).unwrap();
        assert_eq!(partial.inputs().len(), 1);
        assert_eq!(partial.inputs()[0].amount, 10);
        let change = &partial.outputs()[0];
        assert!(change.is_change);
        assert_eq!(change.amount, 6);
        let receive = partial.outputs()[1].decoded_script().unwrap();
        assert_eq!(receive.timelock, Some(2_000_000_000));

        // lock defaults on
        assert!(handle.utxo_locks.is_locked(&partial.inputs()[0].utxo()));
        assert_eq!(unlock_inputs(&handle, &built.data).await.unwrap(), 1);
        assert!(locked_utxos(&handle).is_empty());
    }

    #[tokio::test]
    async fn test_two_party_swap_completes() {
        let handle = handle(&[10]).await;
        let mut request = send(10);
        request.receive.tokens.push(ReceiveToken {
            token: None,
            value: 10,
            timelock: None,
            address: None,
        });
        request.lock = false;

        let built = build_swap_proposal(&handle, &SwapService::disabled(), &request)
            .await
            .unwrap();
        assert!(built.is_complete);
        assert!(handle.utxo_locks.is_empty());

        let partial = PartialTx::deserialize(&built.data).unwrap();
        let signatures = get_my_signatures(&partial, handle.backend()).await.unwrap();
        assert!(assemble(&partial, &[signatures]).unwrap().is_fully_signed());
    }

    #[tokio::test]
    async fn test_extends_existing_proposal() {
        let handle = handle(&[10]).await;
        let first = build_swap_proposal(&handle, &SwapService::disabled(), &send(5))
            .await
            .unwrap();

        let mut request = send(1);
        request.partial_tx = Some(first.data.clone());
        assert!(matches!(
            build_swap_proposal(&handle, &SwapService::disabled(), &request).await,
            Err(WalletError::InsufficientFunds { .. })
        ));

        let mut receive_only = SwapProposalRequest {
            partial_tx: Some(first.data),
            ..Default::default()
        };
        receive_only.receive.tokens.push(ReceiveToken {
            token: Some("t9".to_string()),
            value: 2,
            timelock: None,
            address: Some("Wpeer".to_string()),
        });
        let second = build_swap_proposal(&handle, &SwapService::disabled(), &receive_only)
            .await
            .unwrap();
        let partial = PartialTx::deserialize(&second.data).unwrap();
        assert_eq!(partial.inputs().len(), 1);
        assert_eq!(partial.outputs().len(), 2);
    }

    #[tokio::test]
    async fn test_extension_skips_inputs_already_in_proposal() {
        let handle = handle(&[10, 20]).await;
        let mut request = send(5);
        request.lock = false;
        let first = build_swap_proposal(&handle, &SwapService::disabled(), &request)
            .await
            .unwrap();
        let first_input = PartialTx::deserialize(&first.data).unwrap().inputs()[0].clone();
        assert_eq!(first_input.amount, 10);
        assert!(handle.utxo_locks.is_empty());

        request.partial_tx = Some(first.data);
        let second = build_swap_proposal(&handle, &SwapService::disabled(), &request)
            .await
            .unwrap();
        let partial = PartialTx::deserialize(&second.data).unwrap();
        let amounts: Vec<u64> = partial.inputs().iter().map(|i| i.amount).collect();
        assert_eq!(amounts, vec![10, 20]);
        assert_eq!(partial.inputs()[0], first_input);
    }

    #[tokio::test]
    async fn test_unusable_utxos_rejected() {
        let handle = handle(&[10]).await;
        let mut request = send(5);
        request.send.utxos = vec![UtxoRef::new(&"ab".repeat(32), 0)];
        assert_eq!(
            build_swap_proposal(&handle, &SwapService::disabled(), &request)
                .await
                .unwrap_err(),
            WalletError::Validation("Could not use any of the utxos.".to_string())
        );
    }

    #[tokio::test]
    async fn test_mediator_failure_releases_reservations() {
        let handle = handle(&[10]).await;
        let mediator = Arc::new(RecordingMediator::default());
        let service = SwapService::new(true, Some(mediator.clone()));

        let mut request = send(5);
        request.service = Some(ServiceOptions {
            password: "pw1".to_string(),
            is_new: true,
        });

        mediator.fail_next(MediatorError::Network("connection refused".to_string()));
        assert!(matches!(
            build_swap_proposal(&handle, &service, &request).await,
            Err(WalletError::ExternalService(_))
        ));
        assert!(handle.utxo_locks.is_empty());
        assert!(!handle.op_lock.is_locked());

        let built = build_swap_proposal(&handle, &service, &request).await.unwrap();
        let id = built.created_proposal_id.unwrap();
        assert_eq!(handle.proposals.ids(), vec![id]);
        assert!(!handle.utxo_locks.is_empty());
    }

    #[tokio::test]
    async fn test_disabled_service_skips_creation() {
        let handle = handle(&[10]).await;
        let mediator = Arc::new(RecordingMediator::default());
        let service = SwapService::new(false, Some(mediator.clone()));

        let mut request = send(5);
        request.service = Some(ServiceOptions {
            password: "x".to_string(),
            is_new: true,
        });
        let built = build_swap_proposal(&handle, &service, &request).await.unwrap();
        assert!(built.created_proposal_id.is_none());
        assert!(mediator.calls().is_empty());
    }
}
