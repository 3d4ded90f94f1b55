//! Mediator wire types
//!
//! Payloads coming back from the mediator are untyped JSON. They are parsed
//! into `Raw*` structs and converted into checked records before anything
//! downstream looks at them.

use std::sync::{Mutex, MutexGuard, PoisonError};

use serde::{Deserialize, Serialize};

use crate::mediator::MediatorError;
use crate::proposal::{InputDataSet, PartialTx};

// =============================================================================
// Records
// =============================================================================

/// One past state of a proposal
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProposalHistoryEntry {
    #[serde(rename = "partialTx")]
    pub partial_tx: String,
    #[serde(default)]
    pub timestamp: Option<String>,
}

/// Proposal as stored by the mediator, validated
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProposalRecord {
    pub proposal_id: String,
    pub version: u64,
    pub timestamp: Option<String>,
    pub partial_tx: PartialTx,
    pub signatures: Option<InputDataSet>,
    pub history: Vec<ProposalHistoryEntry>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct RawProposalRecord {
    #[serde(default)]
    pub success: Option<bool>,
    #[serde(default)]
    pub proposal_id: Option<String>,
    #[serde(default)]
    pub version: Option<u64>,
    #[serde(default)]
    pub timestamp: Option<String>,
    #[serde(default)]
    pub partial_tx: Option<String>,
    #[serde(default)]
    pub signatures: Option<String>,
    #[serde(default)]
    pub history: Vec<ProposalHistoryEntry>,
}

impl TryFrom<RawProposalRecord> for ProposalRecord {
    type Error = MediatorError;

    fn try_from(raw: RawProposalRecord) -> Result<Self, Self::Error> {
        if raw.success == Some(false) {
            return Err(MediatorError::Rejected("mediator reported failure".to_string()));
        }
        let proposal_id = raw
            .proposal_id
            .filter(|id| !id.is_empty())
            .ok_or_else(|| MediatorError::InvalidPayload("missing proposalId".to_string()))?;
        let version = raw
            .version
            .ok_or_else(|| MediatorError::InvalidPayload("missing version".to_string()))?;
        let partial_tx = raw
            .partial_tx
            .as_deref()
            .ok_or_else(|| MediatorError::InvalidPayload("missing partialTx".to_string()))
            .and_then(|text| {
                PartialTx::deserialize(text)
                    .map_err(|e| MediatorError::InvalidPayload(format!("partialTx: {}", e)))
            })?;
        let signatures = match raw.signatures.as_deref() {
            None | Some("") => None,
            Some(text) => Some(
                InputDataSet::deserialize(text)
                    .map_err(|e| MediatorError::InvalidPayload(format!("signatures: {}", e)))?,
            ),
        };

        Ok(ProposalRecord {
            proposal_id,
            version,
            timestamp: raw.timestamp,
            partial_tx,
            signatures,
            history: raw.history,
        })
    }
}

/// Result of a compare-and-swap update
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum UpdateOutcome {
    Updated { version: u64 },
    VersionConflict { expected: u64, current: u64 },
}

// =============================================================================
// Listened proposals
// =============================================================================

/// A proposal this wallet follows on the mediator
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListenedProposal {
    pub proposal_id: String,
    pub password: String,
    /// Last version seen or written
    pub version: Option<u64>,
}

/// Listened proposals of one wallet, in registration order
#[derive(Debug, Default)]
pub struct ListenedProposals {
    entries: Mutex<Vec<ListenedProposal>>,
}

impl ListenedProposals {
    fn entries(&self) -> MutexGuard<'_, Vec<ListenedProposal>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Add or refresh an entry; an existing entry keeps its position
    pub fn listen(&self, proposal_id: &str, password: &str, version: Option<u64>) {
        let mut entries = self.entries();
        let entry = ListenedProposal {
            proposal_id: proposal_id.to_string(),
            password: password.to_string(),
            version,
        };
        match entries.iter_mut().find(|e| e.proposal_id == proposal_id) {
            Some(existing) => *existing = entry,
            None => entries.push(entry),
        }
    }

    pub fn get(&self, proposal_id: &str) -> Option<ListenedProposal> {
        self.entries()
            .iter()
            .find(|e| e.proposal_id == proposal_id)
            .cloned()
    }

    pub fn set_version(&self, proposal_id: &str, version: u64) {
        if let Some(entry) = self
            .entries()
            .iter_mut()
            .find(|e| e.proposal_id == proposal_id)
        {
            entry.version = Some(version);
        }
    }

    /// Returns whether an entry was present
    pub fn remove(&self, proposal_id: &str) -> bool {
        let mut entries = self.entries();
        let before = entries.len();
        entries.retain(|e| e.proposal_id != proposal_id);
        entries.len() != before
    }

    pub fn ids(&self) -> Vec<String> {
        self.entries()
            .iter()
            .map(|e| e.proposal_id.clone())
            .collect()
    }

    pub fn clear(&self) {
        self.entries().clear();
    }
}
