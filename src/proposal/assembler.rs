//! Signature assembly
//!
//! Turns a complete partial transaction plus the signature sets collected
//! from its parties into a signed ledger transaction, checking each
//! signature against the input it claims to unlock.

use serde::Serialize;

use crate::balance::AddressOwnership;
use crate::core::{InputData, Transaction};
use crate::crypto::{address_from_public_key, verify_digest};
use crate::proposal::{InputDataSet, PartialTx};
use crate::wallet::{WalletBackend, WalletError, WalletHandle};

/// Combine `partial` with signature sets into a fully signed transaction
///
/// An incomplete partial transaction is rejected before any signature is
/// looked at. Sets may overlap as long as they agree; input order is that of
/// the partial transaction.
pub fn assemble(partial: &PartialTx, sets: &[InputDataSet]) -> Result<Transaction, WalletError> {
    if !partial.is_complete() {
        return Err(WalletError::IncompleteTransaction);
    }
    let mut tx = partial.to_transaction()?;

    let mut merged = InputDataSet::for_transaction(&tx);
    for set in sets {
        if !set.is_bound_to(&tx) {
            let index = set.iter().next().map(|(i, _)| i).unwrap_or(0);
            return Err(WalletError::InvalidSignature { index });
        }
        merged.merge(set)?;
    }

    let digest = tx.data_to_sign();
    for (index, input) in partial.inputs().iter().enumerate() {
        let data = merged
            .get(index)
            .ok_or(WalletError::IncompleteTransaction)?;
        let unlocking =
            InputData::from_bytes(data).map_err(|_| WalletError::InvalidSignature { index })?;
        if address_from_public_key(&unlocking.public_key) != input.address {
            return Err(WalletError::InvalidSignature { index });
        }
        match verify_digest(&unlocking.public_key, &digest, &unlocking.signature) {
            Ok(true) => tx.inputs[index].data = data.to_vec(),
            _ => return Err(WalletError::InvalidSignature { index }),
        }
    }
    Ok(tx)
}

/// Parse serialized signature sets as received from callers
pub fn parse_signature_sets(texts: &[String]) -> Result<Vec<InputDataSet>, WalletError> {
    texts
        .iter()
        .map(|text| InputDataSet::deserialize(text).map_err(WalletError::from))
        .collect()
}

/// Sign the inputs of `partial` that belong to this wallet
///
/// Inputs owned by other parties are left alone; nothing is reserved or
/// recorded.
pub async fn get_my_signatures(
    partial: &PartialTx,
    backend: &dyn WalletBackend,
) -> Result<InputDataSet, WalletError> {
    let tx = partial.to_transaction()?;
    let digest = tx.data_to_sign();
    let mut signatures = InputDataSet::for_transaction(&tx);

    for (index, input) in partial.inputs().iter().enumerate() {
        if !backend.is_address_mine(&input.address) {
            continue;
        }
        if let Some(data) = backend.sign_input(&input.address, &digest).await? {
            signatures.add(index, data.to_bytes())?;
        }
    }
    log::debug!(
        "Signed {} of {} inputs",
        signatures.len(),
        partial.inputs().len()
    );
    Ok(signatures)
}

#[derive(Debug, Clone, Serialize)]
pub struct PushedTransaction {
    pub tx_id: String,
    pub tx_hex: String,
}

/// Assemble and submit under the wallet's operation lock
///
/// The wallet's reservations of the pushed inputs are released once the
/// ledger accepts the transaction.
pub async fn sign_and_push(
    handle: &WalletHandle,
    partial_tx: &str,
    signatures: &[String],
) -> Result<PushedTransaction, WalletError> {
    let network = &handle.backend.network().name;
    let partial = PartialTx::deserialize_for(partial_tx, network)?;
    let sets = parse_signature_sets(signatures)?;

    handle
        .op_lock
        .with_lock(async {
            let tx = assemble(&partial, &sets)?;
            let tx_id = handle.backend.submit(&tx).await?;
            handle.utxo_locks.unlock_many(&partial.utxos());
            log::info!("Wallet {} pushed swap transaction {}", handle.id, tx_id);
            Ok::<_, WalletError>(PushedTransaction {
                tx_id,
                tx_hex: tx.to_hex(),
            })
        })
        .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{Authorities, NetworkParams, OutputScript, NATIVE_TOKEN_UID};
    use crate::ledger::{MemoryLedger, MemoryWallet};
    use crate::proposal::{ProposalInput, ProposalOutput};
    use crate::utxo::UtxoFilter;
    use crate::wallet::WalletSettings;
    use std::sync::Arc;

    struct Swap {
        alice: Arc<MemoryWallet>,
        bob: Arc<MemoryWallet>,
        partial: PartialTx,
    }

    // alice pays 10 native for bob's 5 of t1
    async fn swap() -> Swap {
        let ledger = Arc::new(MemoryLedger::new(NetworkParams::new("testnet")));
        let alice = Arc::new(MemoryWallet::generate(ledger.clone(), 1));
        let bob = Arc::new(MemoryWallet::generate(ledger.clone(), 1));
        let alice_addr = alice.addresses()[0].clone();
        let bob_addr = bob.addresses()[0].clone();
        let native = ledger.mint(NATIVE_TOKEN_UID, &[(alice_addr.as_str(), 10)]).await;
        let token = ledger.mint("t1", &[(bob_addr.as_str(), 5)]).await;

        let mut partial = PartialTx::new("testnet");
        partial
            .add_input(ProposalInput {
                tx_id: native,
                index: 0,
                token: NATIVE_TOKEN_UID.to_string(),
                authorities: Authorities::empty(),
                amount: 10,
                address: alice_addr.clone(),
            })
            .unwrap();
        partial
            .add_output(ProposalOutput::value(10, &OutputScript::new(&bob_addr, None), NATIVE_TOKEN_UID, false))
            .unwrap();
        partial
            .add_input(ProposalInput {
                tx_id: token,
                index: 0,
                token: "t1".to_string(),
                authorities: Authorities::empty(),
                amount: 5,
                address: bob_addr,
            })
            .unwrap();
        partial
            .add_output(ProposalOutput::value(5, &OutputScript::new(&alice_addr, None), "t1", false))
            .unwrap();

        Swap {
            alice,
            bob,
            partial,
        }
    }

    #[tokio::test]
    async fn test_each_party_signs_only_its_inputs() {
        let Swap {
            alice,
            bob,
            partial,
        } = swap().await;

        let alice_sigs = get_my_signatures(&partial, &*alice).await.unwrap();
        let bob_sigs = get_my_signatures(&partial, &*bob).await.unwrap();
        assert_eq!(alice_sigs.iter().map(|(i, _)| i).collect::<Vec<_>>(), vec![0]);
        assert_eq!(bob_sigs.iter().map(|(i, _)| i).collect::<Vec<_>>(), vec![1]);

        // disjoint sets merge; repeating one is harmless
        let tx = assemble(&partial, &[bob_sigs.clone(), alice_sigs, bob_sigs]).unwrap();
        assert!(tx.is_fully_signed());
        assert_eq!(tx.inputs[0].tx_id, partial.inputs()[0].tx_id);

        let tx_id = alice.submit(&tx).await.unwrap();
        assert_eq!(tx_id, tx.id());
    }

    #[tokio::test]
    async fn test_incomplete_rejected_regardless_of_signatures() {
        let Swap { alice, partial, .. } = swap().await;
        let sigs = get_my_signatures(&partial, &*alice).await.unwrap();

        let mut unbalanced = partial.clone();
        unbalanced
            .add_output(ProposalOutput::value(1, &OutputScript::new("Wextra", None), NATIVE_TOKEN_UID, false))
            .unwrap();
        assert_eq!(
            assemble(&unbalanced, &[sigs.clone()]).unwrap_err(),
            WalletError::IncompleteTransaction
        );

        // complete but missing bob's signature
        assert_eq!(
            assemble(&partial, &[sigs]).unwrap_err(),
            WalletError::IncompleteTransaction
        );
    }

    #[tokio::test]
    async fn test_signature_for_wrong_input_rejected() {
        let Swap {
            alice,
            bob,
            partial,
        } = swap().await;
        let bob_sigs = get_my_signatures(&partial, &*bob).await.unwrap();
        let alice_sigs = get_my_signatures(&partial, &*alice).await.unwrap();

        // alice's signature claimed for bob's input
        let tx = partial.to_transaction().unwrap();
        let mut forged = InputDataSet::for_transaction(&tx);
        forged.add(0, alice_sigs.get(0).unwrap().to_vec()).unwrap();
        forged.add(1, alice_sigs.get(0).unwrap().to_vec()).unwrap();
        assert_eq!(
            assemble(&partial, &[forged]).unwrap_err(),
            WalletError::InvalidSignature { index: 1 }
        );

        // set bound to another transaction
        let stray = InputDataSet::new(&"ab".repeat(32), 2);
        assert!(matches!(
            assemble(&partial, &[alice_sigs, bob_sigs, stray]),
            Err(WalletError::InvalidSignature { .. })
        ));
    }

    #[tokio::test]
    async fn test_sign_and_push_releases_reservations() {
        let Swap {
            alice,
            bob,
            partial,
        } = swap().await;
        let handle = WalletHandle::new("alice", alice.clone(), WalletSettings::default());
        let mine = partial.inputs()[0].utxo();
        handle.utxo_locks.mark_selected(&mine, true, None);

        let signatures = vec![
            get_my_signatures(&partial, &*alice).await.unwrap().serialize(),
            get_my_signatures(&partial, &*bob).await.unwrap().serialize(),
        ];

        let guard = handle.op_lock.try_acquire().unwrap();
        assert_eq!(
            sign_and_push(&handle, &partial.serialize(), &signatures)
                .await
                .unwrap_err(),
            WalletError::WalletLocked
        );
        drop(guard);

        let pushed = sign_and_push(&handle, &partial.serialize(), &signatures)
            .await
            .unwrap();
        assert!(!handle.utxo_locks.is_locked(&mine));
        assert!(!pushed.tx_hex.is_empty());

        let left = alice
            .available_utxos(NATIVE_TOKEN_UID, &UtxoFilter::default())
            .await
            .unwrap();
        assert!(left.iter().all(|u| u.utxo != mine));
    }
}
