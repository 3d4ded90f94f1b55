//! Partial transactions
//!
//! A transaction under construction. Each party appends its own inputs and
//! outputs, possibly over several rounds and through different channels, so
//! the model carries everything needed to judge completeness without a ledger
//! lookup: input amounts, tokens, authorities and owning addresses.
//!
//! Text form:
//!
//! ```text
//! PartialTx|v1|<network>|<inputs>|<outputs>|<destroyed>
//! input:     <tx_id>,<index>,<token>,<authorities>,<amount>,<address>
//! output:    <amount>,<script hex>,<token>,<authorities>,<is_change>
//! destroyed: <token>,<authorities>
//! ```
//!
//! Records within a section are separated by `;`.

use std::collections::{BTreeMap, BTreeSet};

use serde::Serialize;
use thiserror::Error;

use crate::core::{
    Authorities, OutputScript, Transaction, TransactionError, TxInput, TxOutput, MAX_TX_IO,
    NATIVE_TOKEN_UID,
};
use crate::utxo::UtxoRef;
use crate::wallet::{WalletBackend, WalletError};

pub const PARTIAL_TX_PREFIX: &str = "PartialTx";
pub const PARTIAL_TX_VERSION: &str = "v1";

const SECTION_SEP: char = '|';
const RECORD_SEP: char = ';';
const FIELD_SEP: char = ',';

// =============================================================================
// Errors
// =============================================================================

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PartialTxError {
    #[error("Invalid PartialTx: {0}")]
    Malformed(String),
    #[error("Unsupported PartialTx version {0}")]
    UnsupportedVersion(String),
    #[error("PartialTx is for network {found}, expected {expected}")]
    NetworkMismatch { expected: String, found: String },
    #[error("Input {0} already in the transaction")]
    DuplicateInput(UtxoRef),
    #[error("Too many {0} in the transaction")]
    TooMany(&'static str),
    #[error("Invalid field: {0}")]
    InvalidField(String),
    #[error("Total value of token {0} overflows")]
    AmountOverflow(String),
    #[error(transparent)]
    Transaction(#[from] TransactionError),
}

impl From<PartialTxError> for WalletError {
    fn from(err: PartialTxError) -> Self {
        WalletError::Validation(err.to_string())
    }
}

// =============================================================================
// Inputs & Outputs
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProposalInput {
    pub tx_id: String,
    pub index: u32,
    pub token: String,
    /// Non-empty for authority inputs
    pub authorities: Authorities,
    pub amount: u64,
    pub address: String,
}

impl ProposalInput {
    pub fn utxo(&self) -> UtxoRef {
        UtxoRef::new(&self.tx_id, self.index)
    }

    pub fn is_authority(&self) -> bool {
        !self.authorities.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProposalOutput {
    pub amount: u64,
    pub script: Vec<u8>,
    pub token: String,
    /// Non-empty for authority outputs, whose amount is then zero
    pub authorities: Authorities,
    pub is_change: bool,
}

impl ProposalOutput {
    pub fn value(amount: u64, script: &OutputScript, token: &str, is_change: bool) -> Self {
        Self {
            amount,
            script: script.to_bytes(),
            token: token.to_string(),
            authorities: Authorities::empty(),
            is_change,
        }
    }

    pub fn authority(authorities: Authorities, script: &OutputScript, token: &str) -> Self {
        Self {
            amount: 0,
            script: script.to_bytes(),
            token: token.to_string(),
            authorities,
            is_change: false,
        }
    }

    pub fn is_authority(&self) -> bool {
        !self.authorities.is_empty()
    }

    pub fn decoded_script(&self) -> Result<OutputScript, TransactionError> {
        OutputScript::from_bytes(&self.script)
    }
}

/// Authorities spent on purpose without being passed on
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthorityBurn {
    pub token: String,
    pub authorities: Authorities,
}

// =============================================================================
// Partial Transaction
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartialTx {
    network: String,
    inputs: Vec<ProposalInput>,
    outputs: Vec<ProposalOutput>,
    destroyed: Vec<AuthorityBurn>,
}

/// Value flowing in and out of a token
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TokenBalance {
    pub inputs: u64,
    pub outputs: u64,
}

fn check_text_field(name: &str, value: &str) -> Result<(), PartialTxError> {
    if value.is_empty() {
        return Err(PartialTxError::InvalidField(format!("{} is empty", name)));
    }
    if value.contains(&[SECTION_SEP, RECORD_SEP, FIELD_SEP][..]) {
        return Err(PartialTxError::InvalidField(format!(
            "{} contains a reserved character",
            name
        )));
    }
    Ok(())
}

impl PartialTx {
    pub fn new(network: &str) -> Self {
        Self {
            network: network.to_string(),
            inputs: Vec::new(),
            outputs: Vec::new(),
            destroyed: Vec::new(),
        }
    }

    pub fn network(&self) -> &str {
        &self.network
    }

    pub fn inputs(&self) -> &[ProposalInput] {
        &self.inputs
    }

    pub fn outputs(&self) -> &[ProposalOutput] {
        &self.outputs
    }

    pub fn destroyed(&self) -> &[AuthorityBurn] {
        &self.destroyed
    }

    pub fn is_empty(&self) -> bool {
        self.inputs.is_empty() && self.outputs.is_empty() && self.destroyed.is_empty()
    }

    pub fn utxos(&self) -> Vec<UtxoRef> {
        self.inputs.iter().map(ProposalInput::utxo).collect()
    }

    pub fn add_input(&mut self, input: ProposalInput) -> Result<(), PartialTxError> {
        check_text_field("tx_id", &input.tx_id)?;
        check_text_field("token", &input.token)?;
        check_text_field("address", &input.address)?;
        if self.inputs.len() >= MAX_TX_IO {
            return Err(PartialTxError::TooMany("inputs"));
        }
        if self
            .inputs
            .iter()
            .any(|i| i.tx_id == input.tx_id && i.index == input.index)
        {
            return Err(PartialTxError::DuplicateInput(input.utxo()));
        }
        if !input.is_authority() {
            checked_total(
                self.inputs
                    .iter()
                    .filter(|i| !i.is_authority() && i.token == input.token)
                    .map(|i| i.amount),
                input.amount,
                &input.token,
            )?;
        }
        self.inputs.push(input);
        Ok(())
    }

    pub fn add_output(&mut self, output: ProposalOutput) -> Result<(), PartialTxError> {
        check_text_field("token", &output.token)?;
        if self.outputs.len() >= MAX_TX_IO {
            return Err(PartialTxError::TooMany("outputs"));
        }
        if output.is_authority() {
            if output.token == NATIVE_TOKEN_UID {
                return Err(PartialTxError::InvalidField(
                    "native token has no authorities".to_string(),
                ));
            }
            if output.amount != 0 {
                return Err(PartialTxError::InvalidField(
                    "authority output with an amount".to_string(),
                ));
            }
        } else if output.amount == 0 {
            return Err(PartialTxError::InvalidField("output amount is zero".to_string()));
        } else {
            checked_total(
                self.outputs
                    .iter()
                    .filter(|o| !o.is_authority() && o.token == output.token)
                    .map(|o| o.amount),
                output.amount,
                &output.token,
            )?;
        }
        output.decoded_script()?;
        self.outputs.push(output);
        Ok(())
    }

    /// Record that `authorities` of `token` are spent without being recreated
    pub fn destroy_authority(
        &mut self,
        token: &str,
        authorities: Authorities,
    ) -> Result<(), PartialTxError> {
        check_text_field("token", token)?;
        if authorities.is_empty() {
            return Err(PartialTxError::InvalidField(
                "nothing to destroy".to_string(),
            ));
        }
        self.destroyed.push(AuthorityBurn {
            token: token.to_string(),
            authorities,
        });
        Ok(())
    }

    /// Value in and out per token, authorities excluded
    ///
    /// `add_input` and `add_output` keep every total within `u64`.
    pub fn balances(&self) -> BTreeMap<String, TokenBalance> {
        let mut balances: BTreeMap<String, TokenBalance> = BTreeMap::new();
        for input in self.inputs.iter().filter(|i| !i.is_authority()) {
            let entry = balances.entry(input.token.clone()).or_default();
            entry.inputs = entry.inputs.saturating_add(input.amount);
        }
        for output in self.outputs.iter().filter(|o| !o.is_authority()) {
            let entry = balances.entry(output.token.clone()).or_default();
            entry.outputs = entry.outputs.saturating_add(output.amount);
        }
        balances
    }

    fn authority_counts(&self) -> BTreeMap<(String, u8), (usize, usize)> {
        let mut counts: BTreeMap<(String, u8), (usize, usize)> = BTreeMap::new();
        for flag in [Authorities::MINT, Authorities::MELT] {
            for input in self.inputs.iter().filter(|i| i.authorities.contains(flag)) {
                counts.entry((input.token.clone(), flag.bits())).or_default().0 += 1;
            }
            for output in self.outputs.iter().filter(|o| o.authorities.contains(flag)) {
                counts.entry((output.token.clone(), flag.bits())).or_default().1 += 1;
            }
            for burn in self.destroyed.iter().filter(|b| b.authorities.contains(flag)) {
                counts.entry((burn.token.clone(), flag.bits())).or_default().1 += 1;
            }
        }
        counts
    }

    /// Every token balances, and every authority spent is passed on or destroyed
    ///
    /// Value and authorities are checked independently per token.
    pub fn is_complete(&self) -> bool {
        let value_balanced = self
            .balances()
            .values()
            .all(|b| b.inputs == b.outputs);
        let authorities_balanced = self
            .authority_counts()
            .values()
            .all(|(spent, kept)| spent == kept);
        value_balanced && authorities_balanced
    }

    /// Materialize as a ledger transaction (unsigned)
    ///
    /// The token list is the sorted set of custom tokens involved, so every
    /// party materializing the same partial transaction gets the same digest.
    pub fn to_transaction(&self) -> Result<Transaction, PartialTxError> {
        let tokens: Vec<String> = self
            .inputs
            .iter()
            .map(|i| &i.token)
            .chain(self.outputs.iter().map(|o| &o.token))
            .filter(|t| t.as_str() != NATIVE_TOKEN_UID)
            .cloned()
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();

        let mut tx = Transaction::new(
            tokens,
            self.inputs
                .iter()
                .map(|i| TxInput::new(&i.tx_id, i.index))
                .collect(),
            Vec::with_capacity(self.outputs.len()),
        );
        for output in &self.outputs {
            let token_data = tx
                .token_data_for(&output.token, output.is_authority())
                .ok_or_else(|| PartialTxError::InvalidField(format!("token {}", output.token)))?;
            let value = if output.is_authority() {
                u64::from(output.authorities.bits())
            } else {
                output.amount
            };
            tx.outputs.push(TxOutput {
                value,
                token_data,
                script: output.script.clone(),
            });
        }
        tx.check_limits()?;
        Ok(tx)
    }

    // ===== Text form =====

    pub fn serialize(&self) -> String {
        let inputs: Vec<String> = self
            .inputs
            .iter()
            .map(|i| {
                format!(
                    "{},{},{},{},{},{}",
                    i.tx_id,
                    i.index,
                    i.token,
                    i.authorities.bits(),
                    i.amount,
                    i.address
                )
            })
            .collect();
        let outputs: Vec<String> = self
            .outputs
            .iter()
            .map(|o| {
                format!(
                    "{},{},{},{},{}",
                    o.amount,
                    hex::encode(&o.script),
                    o.token,
                    o.authorities.bits(),
                    u8::from(o.is_change)
                )
            })
            .collect();
        let destroyed: Vec<String> = self
            .destroyed
            .iter()
            .map(|b| format!("{},{}", b.token, b.authorities.bits()))
            .collect();

        [
            PARTIAL_TX_PREFIX.to_string(),
            PARTIAL_TX_VERSION.to_string(),
            self.network.clone(),
            inputs.join(";"),
            outputs.join(";"),
            destroyed.join(";"),
        ]
        .join("|")
    }

    pub fn deserialize(text: &str) -> Result<Self, PartialTxError> {
        let sections: Vec<&str> = text.trim().split(SECTION_SEP).collect();
        let [prefix, version, network, inputs, outputs, destroyed] = sections.as_slice() else {
            return Err(PartialTxError::Malformed(format!(
                "expected 6 sections, found {}",
                sections.len()
            )));
        };
        if *prefix != PARTIAL_TX_PREFIX {
            return Err(PartialTxError::Malformed("missing PartialTx prefix".to_string()));
        }
        if *version != PARTIAL_TX_VERSION {
            return Err(PartialTxError::UnsupportedVersion(version.to_string()));
        }
        check_text_field("network", network)?;

        let mut partial = PartialTx::new(network);
        for fields in records(inputs) {
            let [tx_id, index, token, authorities, amount, address] = fields.as_slice() else {
                return Err(PartialTxError::Malformed("input record".to_string()));
            };
            partial.add_input(ProposalInput {
                tx_id: tx_id.to_string(),
                index: parse_number(index, "input index")?,
                token: token.to_string(),
                authorities: parse_authorities(authorities)?,
                amount: parse_number(amount, "input amount")?,
                address: address.to_string(),
            })?;
        }
        for fields in records(outputs) {
            let [amount, script, token, authorities, is_change] = fields.as_slice() else {
                return Err(PartialTxError::Malformed("output record".to_string()));
            };
            let is_change = match *is_change {
                "0" => false,
                "1" => true,
                other => {
                    return Err(PartialTxError::Malformed(format!("change flag {}", other)))
                }
            };
            partial.add_output(ProposalOutput {
                amount: parse_number(amount, "output amount")?,
                script: hex::decode(script)
                    .map_err(|_| PartialTxError::Malformed("output script hex".to_string()))?,
                token: token.to_string(),
                authorities: parse_authorities(authorities)?,
                is_change,
            })?;
        }
        for fields in records(destroyed) {
            let [token, authorities] = fields.as_slice() else {
                return Err(PartialTxError::Malformed("destroyed record".to_string()));
            };
            partial.destroy_authority(token, parse_authorities(authorities)?)?;
        }
        Ok(partial)
    }

    /// Parse and check the network in one step
    pub fn deserialize_for(text: &str, network: &str) -> Result<Self, PartialTxError> {
        let partial = Self::deserialize(text)?;
        if partial.network != network {
            return Err(PartialTxError::NetworkMismatch {
                expected: network.to_string(),
                found: partial.network,
            });
        }
        Ok(partial)
    }

    // ===== Ledger validation =====

    /// Check every input against the ledger
    ///
    /// Problems with individual inputs are collected in the report; only a
    /// failure to reach the ledger is an error.
    pub async fn validate(&self, backend: &dyn WalletBackend) -> Result<ValidationReport, WalletError> {
        let mut issues = Vec::new();
        for (index, input) in self.inputs.iter().enumerate() {
            let issue = match backend.get_transaction(&input.tx_id).await? {
                None => Some(InputIssue::NotFound),
                Some(ledger_tx) => match ledger_tx.tx.outputs.get(input.index as usize) {
                    None => Some(InputIssue::NotFound),
                    Some(output) => match ledger_tx.output_spent_by(input.index) {
                        Some(spender) => Some(InputIssue::AlreadySpent {
                            spent_by: spender.to_string(),
                        }),
                        None => compare_with_ledger(input, &ledger_tx.tx, output),
                    },
                },
            };
            if let Some(issue) = issue {
                issues.push(InputValidation {
                    index,
                    utxo: input.utxo(),
                    issue,
                });
            }
        }
        Ok(ValidationReport { issues })
    }
}

/// Sum of `existing` plus `amount`, rejecting a total past `u64::MAX`
fn checked_total(
    mut existing: impl Iterator<Item = u64>,
    amount: u64,
    token: &str,
) -> Result<u64, PartialTxError> {
    existing
        .try_fold(amount, u64::checked_add)
        .ok_or_else(|| PartialTxError::AmountOverflow(token.to_string()))
}

fn compare_with_ledger(input: &ProposalInput, tx: &Transaction, output: &TxOutput) -> Option<InputIssue> {
    let mismatch = |field: &str| {
        Some(InputIssue::Mismatch {
            field: field.to_string(),
        })
    };
    match tx.token_uid(output) {
        Ok(token) if token == input.token => {}
        _ => return mismatch("token"),
    }
    if output.authorities() != input.authorities {
        return mismatch("authorities");
    }
    if !output.is_authority() && output.value != input.amount {
        return mismatch("amount");
    }
    match output.decoded_script() {
        Ok(script) if script.address == input.address => None,
        _ => mismatch("address"),
    }
}

fn records(section: &str) -> impl Iterator<Item = Vec<&str>> {
    section
        .split(RECORD_SEP)
        .filter(|r| !r.is_empty())
        .map(|r| r.split(FIELD_SEP).collect())
}

fn parse_number<T: std::str::FromStr>(text: &str, what: &str) -> Result<T, PartialTxError> {
    text.parse()
        .map_err(|_| PartialTxError::Malformed(format!("{}: {}", what, text)))
}

fn parse_authorities(text: &str) -> Result<Authorities, PartialTxError> {
    let bits: u8 = parse_number(text, "authorities")?;
    Authorities::from_bits(bits)
        .ok_or_else(|| PartialTxError::Malformed(format!("authority bits {}", bits)))
}

// =============================================================================
// Validation report
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "issue", rename_all = "snake_case")]
pub enum InputIssue {
    NotFound,
    AlreadySpent { spent_by: String },
    /// Input claims differ from the ledger's output
    Mismatch { field: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InputValidation {
    pub index: usize,
    pub utxo: UtxoRef,
    #[serde(flatten)]
    pub issue: InputIssue,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ValidationReport {
    pub issues: Vec<InputValidation>,
}

impl ValidationReport {
    pub fn is_valid(&self) -> bool {
        self.issues.is_empty()
    }

    /// First issue as a user-facing error
    pub fn into_result(self) -> Result<(), WalletError> {
        match self.issues.into_iter().next() {
            None => Ok(()),
            Some(problem) => Err(WalletError::validation(format!(
                "Invalid PartialTx: input {} ({}) {}",
                problem.index,
                problem.utxo,
                match problem.issue {
                    InputIssue::NotFound => "not found".to_string(),
                    InputIssue::AlreadySpent { spent_by } => format!("already spent by {}", spent_by),
                    InputIssue::Mismatch { field } => {
                        format!("does not match the ledger ({})", field)
                    }
                }
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::funded_wallet;
    use crate::utxo::UtxoFilter;

    fn input(tx: &str, index: u32, token: &str, amount: u64) -> ProposalInput {
        ProposalInput {
            tx_id: tx.to_string(),
            index,
            token: token.to_string(),
            authorities: Authorities::empty(),
            amount,
            address: "WaddrA".to_string(),
        }
    }

    fn authority_input(tx: &str, token: &str, authorities: Authorities) -> ProposalInput {
        ProposalInput {
            authorities,
            amount: 0,
            ..input(tx, 0, token, 0)
        }
    }

    fn script() -> OutputScript {
        OutputScript::new("WaddrB", None)
    }

    fn sample() -> PartialTx {
        let mut partial = PartialTx::new("testnet");
        partial.add_input(input("aa", 0, NATIVE_TOKEN_UID, 10)).unwrap();
        partial
            .add_input(authority_input("bb", "t1", Authorities::MINT | Authorities::MELT))
            .unwrap();
        partial
            .add_output(ProposalOutput::value(10, &OutputScript::new("WaddrB", Some(99)), NATIVE_TOKEN_UID, true))
            .unwrap();
        partial
            .add_output(ProposalOutput::authority(Authorities::MINT, &script(), "t1"))
            .unwrap();
        partial.destroy_authority("t1", Authorities::MELT).unwrap();
        partial
    }

    #[test]
    fn test_text_form_preserves_partial_tx() {
        let partial = sample();
        let text = partial.serialize();
        assert!(text.starts_with("PartialTx|v1|testnet|"));
        assert_eq!(PartialTx::deserialize(&text).unwrap(), partial);

        let empty = PartialTx::new("testnet");
        assert_eq!(empty.serialize(), "PartialTx|v1|testnet|||");
        assert_eq!(PartialTx::deserialize(&empty.serialize()).unwrap(), empty);
    }

    #[test]
    fn test_deserialize_rejects_garbage() {
        for text in [
            "",
            "PartialTx|v1|testnet",
            "Nope|v1|testnet|||",
            "PartialTx|v1|testnet|aa,x,00,0,1,W|||",
            "PartialTx|v1|testnet||5,zz,00,0,0||",
            "PartialTx|v1|testnet|||t1,9",
        ] {
            assert!(PartialTx::deserialize(text).is_err(), "{}", text);
        }
        assert!(matches!(
            PartialTx::deserialize("PartialTx|v9|testnet|||"),
            Err(PartialTxError::UnsupportedVersion(_))
        ));
        assert!(matches!(
            PartialTx::deserialize_for("PartialTx|v1|mainnet|||", "testnet"),
            Err(PartialTxError::NetworkMismatch { .. })
        ));
    }

    #[test]
    fn test_value_completeness() {
        let mut partial = PartialTx::new("testnet");
        assert!(partial.is_complete());

        partial.add_input(input("aa", 0, "t1", 10)).unwrap();
        assert!(!partial.is_complete());

        let mut half = partial.clone();
        half.add_output(ProposalOutput::value(5, &script(), "t1", false)).unwrap();
        assert!(!half.is_complete());

        partial
            .add_output(ProposalOutput::value(10, &script(), "t1", false))
            .unwrap();
        assert!(partial.is_complete());
    }

    #[test]
    fn test_authority_completeness() {
        let mut partial = PartialTx::new("testnet");
        partial
            .add_input(authority_input("aa", "t1", Authorities::MINT | Authorities::MELT))
            .unwrap();
        partial
            .add_output(ProposalOutput::authority(Authorities::MINT, &script(), "t1"))
            .unwrap();
        assert!(!partial.is_complete());

        partial.destroy_authority("t1", Authorities::MELT).unwrap();
        assert!(partial.is_complete());

        // value balance is judged separately from authorities
        partial.add_input(input("bb", 1, "t1", 3)).unwrap();
        assert!(!partial.is_complete());
    }

    #[test]
    fn test_outputs_cannot_create_authorities() {
        let mut partial = PartialTx::new("testnet");
        partial
            .add_output(ProposalOutput::authority(Authorities::MINT, &script(), "t1"))
            .unwrap();
        assert!(!partial.is_complete());
    }

    #[test]
    fn test_add_rejects_invalid_parts() {
        let mut partial = sample();
        assert!(matches!(
            partial.add_input(input("aa", 0, NATIVE_TOKEN_UID, 10)),
            Err(PartialTxError::DuplicateInput(_))
        ));
        assert!(partial
            .add_output(ProposalOutput::value(0, &script(), NATIVE_TOKEN_UID, false))
            .is_err());
        assert!(partial
            .add_output(ProposalOutput::authority(Authorities::MINT, &script(), NATIVE_TOKEN_UID))
            .is_err());
        let mut bad = input("cc", 0, NATIVE_TOKEN_UID, 1);
        bad.address = "W,1".to_string();
        assert!(partial.add_input(bad).is_err());
    }

    #[test]
    fn test_to_transaction_encodes_token_data() {
        let mut partial = sample();
        partial.add_input(input("cc", 0, "t0", 4)).unwrap();
        partial
            .add_output(ProposalOutput::value(4, &script(), "t0", false))
            .unwrap();

        let tx = partial.to_transaction().unwrap();
        assert_eq!(tx.tokens, vec!["t0".to_string(), "t1".to_string()]);
        assert_eq!(tx.inputs.len(), 3);
        assert_eq!(tx.outputs[0].token_data, 0);
        assert_eq!(tx.outputs[1].token_data, 0x82);
        assert_eq!(tx.outputs[1].value, 1);
        assert_eq!(tx.outputs[2].token_data, 1);
        assert_eq!(tx.token_uid(&tx.outputs[2]).unwrap(), "t0");

        // same parts, same digest
        let again = PartialTx::deserialize(&partial.serialize()).unwrap();
        assert_eq!(again.to_transaction().unwrap().data_to_sign(), tx.data_to_sign());
    }

    #[tokio::test]
    async fn test_validate_reports_each_problem() {
        let (ledger, wallet) = funded_wallet(&[10, 20]).await;
        let utxos = wallet
            .available_utxos(NATIVE_TOKEN_UID, &UtxoFilter::default())
            .await
            .unwrap();
        let funding = &utxos[0].utxo.tx_id;
        let address = utxos[0].address.clone();

        let mut partial = PartialTx::new("testnet");
        let mut good = input(funding, 0, NATIVE_TOKEN_UID, 10);
        good.address = address.clone();
        partial.add_input(good).unwrap();
        let mut wrong_amount = input(funding, 1, NATIVE_TOKEN_UID, 99);
        wrong_amount.address = address;
        partial.add_input(wrong_amount).unwrap();
        partial.add_input(input(&"f".repeat(64), 0, NATIVE_TOKEN_UID, 1)).unwrap();

        let report = partial.validate(&*wallet).await.unwrap();
        assert!(!report.is_valid());
        assert_eq!(report.issues.len(), 2);
        assert_eq!(report.issues[0].index, 1);
        assert_eq!(
            report.issues[0].issue,
            InputIssue::Mismatch {
                field: "amount".to_string()
            }
        );
        assert_eq!(report.issues[1].issue, InputIssue::NotFound);
        assert!(report.into_result().is_err());
        drop(ledger);
    }

    #[tokio::test]
    async fn test_validate_reports_spent_inputs() {
        use crate::proposal::{assemble, get_my_signatures};

        let (ledger, wallet) = funded_wallet(&[10]).await;
        let utxo = wallet
            .available_utxos(NATIVE_TOKEN_UID, &UtxoFilter::default())
            .await
            .unwrap()
            .remove(0);

        let mut partial = PartialTx::new("testnet");
        let mut spent = input(&utxo.utxo.tx_id, utxo.utxo.index, NATIVE_TOKEN_UID, 10);
        spent.address = utxo.address.clone();
        partial.add_input(spent).unwrap();
        partial
            .add_output(ProposalOutput::value(10, &script(), NATIVE_TOKEN_UID, false))
            .unwrap();
        assert!(partial.validate(&*wallet).await.unwrap().is_valid());

        let signatures = get_my_signatures(&partial, &*wallet).await.unwrap();
        let tx = assemble(&partial, &[signatures]).unwrap();
        let spender = ledger.submit(&tx).await.unwrap();

        let report = partial.validate(&*wallet).await.unwrap();
        assert_eq!(report.issues.len(), 1);
        assert_eq!(report.issues[0].utxo, utxo.utxo);
        assert_eq!(
            report.issues[0].issue,
            InputIssue::AlreadySpent {
                spent_by: spender.clone()
            }
        );
        let err = report.into_result().unwrap_err();
        assert!(err.to_string().contains(&spender));
    }

    #[test]
    fn test_token_totals_cannot_overflow() {
        let mut partial = PartialTx::new("testnet");
        partial.add_input(input("aa", 0, "t1", u64::MAX)).unwrap();
        assert_eq!(
            partial.add_input(input("bb", 0, "t1", 2)),
            Err(PartialTxError::AmountOverflow("t1".to_string()))
        );
        // other tokens keep their own totals
        partial.add_input(input("bb", 0, "t2", 2)).unwrap();

        partial
            .add_output(ProposalOutput::value(u64::MAX, &script(), "t1", false))
            .unwrap();
        assert_eq!(
            partial.add_output(ProposalOutput::value(1, &script(), "t1", true)),
            Err(PartialTxError::AmountOverflow("t1".to_string()))
        );
        assert_eq!(partial.balances()["t1"].inputs, u64::MAX);
        assert_eq!(partial.outputs().len(), 1);

        // a wrapping total would have made this unbalanced text look complete
        let text = format!(
            "PartialTx|v1|testnet|aa,0,t1,0,{},Wa;bb,0,t1,0,2,Wa|1,{},t1,0,0|",
            u64::MAX,
            hex::encode(script().to_bytes())
        );
        assert_eq!(
            PartialTx::deserialize(&text),
            Err(PartialTxError::AmountOverflow("t1".to_string()))
        );
    }
}
