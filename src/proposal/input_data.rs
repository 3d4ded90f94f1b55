//! Signature sets
//!
//! The input data one or more parties produced for a transaction, keyed by
//! input index and bound to the digest they signed:
//!
//! ```text
//! PartialTxInputData|<digest hex>|<input count>|<index>:<data hex>;...
//! ```

use std::collections::BTreeMap;

use thiserror::Error;

use crate::core::Transaction;
use crate::wallet::WalletError;

pub const INPUT_DATA_PREFIX: &str = "PartialTxInputData";

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SignatureSetError {
    #[error("Invalid signature set: {0}")]
    Malformed(String),
    #[error("Signature set is for another transaction")]
    HashMismatch,
    #[error("Signature for input {index} out of range")]
    IndexOutOfRange { index: usize },
    #[error("Conflicting signatures for input {index}")]
    Conflict { index: usize },
}

impl From<SignatureSetError> for WalletError {
    fn from(err: SignatureSetError) -> Self {
        match err {
            SignatureSetError::Malformed(_) => WalletError::Validation(err.to_string()),
            SignatureSetError::HashMismatch => WalletError::InvalidSignature { index: 0 },
            SignatureSetError::IndexOutOfRange { index } | SignatureSetError::Conflict { index } => {
                WalletError::InvalidSignature { index }
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InputDataSet {
    hash: String,
    input_count: usize,
    data: BTreeMap<usize, Vec<u8>>,
}

impl InputDataSet {
    pub fn new(hash: &str, input_count: usize) -> Self {
        Self {
            hash: hash.to_string(),
            input_count,
            data: BTreeMap::new(),
        }
    }

    /// Empty set bound to `tx`'s signing digest
    pub fn for_transaction(tx: &Transaction) -> Self {
        Self::new(&hex::encode(tx.data_to_sign()), tx.inputs.len())
    }

    /// Input data already present on a (partially) signed transaction
    pub fn from_signed_transaction(tx: &Transaction) -> Self {
        let mut set = Self::for_transaction(tx);
        for (index, input) in tx.inputs.iter().enumerate() {
            if input.is_signed() {
                set.data.insert(index, input.data.clone());
            }
        }
        set
    }

    pub fn hash(&self) -> &str {
        &self.hash
    }

    pub fn input_count(&self) -> usize {
        self.input_count
    }

    pub fn get(&self, index: usize) -> Option<&[u8]> {
        self.data.get(&index).map(Vec::as_slice)
    }

    pub fn iter(&self) -> impl Iterator<Item = (usize, &[u8])> {
        self.data.iter().map(|(i, d)| (*i, d.as_slice()))
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn is_bound_to(&self, tx: &Transaction) -> bool {
        self.hash == hex::encode(tx.data_to_sign()) && self.input_count == tx.inputs.len()
    }

    /// Add data for one input; re-adding identical data is a no-op
    pub fn add(&mut self, index: usize, data: Vec<u8>) -> Result<(), SignatureSetError> {
        if index >= self.input_count {
            return Err(SignatureSetError::IndexOutOfRange { index });
        }
        match self.data.get(&index) {
            Some(existing) if *existing != data => Err(SignatureSetError::Conflict { index }),
            Some(_) => Ok(()),
            None => {
                self.data.insert(index, data);
                Ok(())
            }
        }
    }

    /// Merge another party's set for the same transaction
    pub fn merge(&mut self, other: &InputDataSet) -> Result<(), SignatureSetError> {
        if other.hash != self.hash || other.input_count != self.input_count {
            return Err(SignatureSetError::HashMismatch);
        }
        for (index, data) in &other.data {
            self.add(*index, data.clone())?;
        }
        Ok(())
    }

    pub fn serialize(&self) -> String {
        let entries: Vec<String> = self
            .data
            .iter()
            .map(|(index, data)| format!("{}:{}", index, hex::encode(data)))
            .collect();
        format!(
            "{}|{}|{}|{}",
            INPUT_DATA_PREFIX,
            self.hash,
            self.input_count,
            entries.join(";")
        )
    }

    pub fn deserialize(text: &str) -> Result<Self, SignatureSetError> {
        let malformed = |what: &str| SignatureSetError::Malformed(what.to_string());
        let sections: Vec<&str> = text.trim().split('|').collect();
        let [prefix, hash, count, entries] = sections.as_slice() else {
            return Err(malformed("expected 4 sections"));
        };
        if *prefix != INPUT_DATA_PREFIX {
            return Err(malformed("missing PartialTxInputData prefix"));
        }
        if !matches!(hex::decode(hash), Ok(digest) if digest.len() == 32) {
            return Err(malformed("hash"));
        }
        let input_count: usize = count.parse().map_err(|_| malformed("input count"))?;

        let mut set = Self::new(hash, input_count);
        for entry in entries.split(';').filter(|e| !e.is_empty()) {
            let (index, data) = entry.split_once(':').ok_or_else(|| malformed("entry"))?;
            let index: usize = index.parse().map_err(|_| malformed("input index"))?;
            let data = hex::decode(data).map_err(|_| malformed("input data hex"))?;
            if data.is_empty() {
                return Err(malformed("empty input data"));
            }
            set.add(index, data)?;
        }
        Ok(set)
    }
}

/// Signature set carried by a (partially) signed transaction's hex
pub fn extract_input_data(tx_hex: &str) -> Result<InputDataSet, WalletError> {
    let tx = Transaction::from_hex(tx_hex)?;
    Ok(InputDataSet::from_signed_transaction(&tx))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{OutputScript, TxInput, TxOutput};

    fn tx() -> Transaction {
        Transaction::new(
            Vec::new(),
            vec![TxInput::new("aa", 0), TxInput::new("bb", 1), TxInput::new("cc", 2)],
            vec![TxOutput::new(5, 0, &OutputScript::new("Wdest", None))],
        )
    }

    #[test]
    fn test_text_form() {
        let mut set = InputDataSet::for_transaction(&tx());
        set.add(2, vec![0xab, 0xcd]).unwrap();
        set.add(0, vec![0x01]).unwrap();
        let text = set.serialize();
        assert!(text.ends_with("|3|0:01;2:abcd"));
        assert_eq!(InputDataSet::deserialize(&text).unwrap(), set);

        assert!(InputDataSet::deserialize("PartialTxInputData|zz|1|").is_err());
        assert!(InputDataSet::deserialize(&text.replace("|3|", "|2|")).is_err());
    }

    #[test]
    fn test_merge_disjoint_and_idempotent() {
        let tx = tx();
        let mut alice = InputDataSet::for_transaction(&tx);
        alice.add(0, vec![1]).unwrap();
        let mut bob = InputDataSet::for_transaction(&tx);
        bob.add(2, vec![3]).unwrap();

        let mut merged = alice.clone();
        merged.merge(&bob).unwrap();
        merged.merge(&bob).unwrap();
        merged.merge(&alice).unwrap();
        assert_eq!(merged.len(), 2);
        assert_eq!(merged.get(2), Some(&[3u8][..]));
    }

    #[test]
    fn test_merge_rejects_conflicts() {
        let tx = tx();
        let mut a = InputDataSet::for_transaction(&tx);
        a.add(1, vec![1]).unwrap();
        let mut b = InputDataSet::for_transaction(&tx);
        b.add(1, vec![2]).unwrap();
        assert_eq!(a.merge(&b), Err(SignatureSetError::Conflict { index: 1 }));

        let other = InputDataSet::new(&"00".repeat(32), 3);
        assert_eq!(a.merge(&other), Err(SignatureSetError::HashMismatch));
        assert_eq!(
            a.add(3, vec![1]),
            Err(SignatureSetError::IndexOutOfRange { index: 3 })
        );
    }

    #[test]
    fn test_extract_from_signed_hex() {
        let mut tx = tx();
        tx.inputs[1].data = vec![9, 9];
        let set = extract_input_data(&tx.to_hex()).unwrap();
        assert!(set.is_bound_to(&tx));
        assert_eq!(set.len(), 1);
        assert_eq!(set.get(1), Some(&[9u8, 9][..]));
        assert!(extract_input_data("xyz").is_err());
    }
}
