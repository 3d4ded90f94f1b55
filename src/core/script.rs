//! Output scripts and input data
//!
//! Script construction belongs to the ledger layer; this module only knows
//! the two shapes the wallet core has to read: a pay-to-address output with an
//! optional timelock, and the signature + public key an input carries.

use bytes::{Buf, BufMut};

use crate::core::transaction::TransactionError;

const FLAG_TIMELOCK: u8 = 0x01;

/// Compressed secp256k1 public key length
const PUBKEY_LEN: usize = 33;

/// Pay-to-address output script
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputScript {
    pub address: String,
    /// Unix timestamp before which the output cannot be spent
    pub timelock: Option<u32>,
}

impl OutputScript {
    pub fn new(address: &str, timelock: Option<u32>) -> Self {
        Self {
            address: address.to_string(),
            timelock,
        }
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(self.address.len() + 5);
        match self.timelock {
            Some(timelock) => {
                buf.put_u8(FLAG_TIMELOCK);
                buf.put_u32(timelock);
            }
            None => buf.put_u8(0),
        }
        buf.put_slice(self.address.as_bytes());
        buf
    }

    pub fn from_bytes(mut bytes: &[u8]) -> Result<Self, TransactionError> {
        if !bytes.has_remaining() {
            return Err(TransactionError::Decode("empty output script".to_string()));
        }
        let flags = bytes.get_u8();
        let timelock = if flags & FLAG_TIMELOCK != 0 {
            if bytes.remaining() < 4 {
                return Err(TransactionError::Decode("truncated timelock".to_string()));
            }
            Some(bytes.get_u32())
        } else {
            None
        };
        let address = std::str::from_utf8(bytes)
            .map_err(|_| TransactionError::Decode("script address is not utf-8".to_string()))?;
        if address.is_empty() {
            return Err(TransactionError::Decode("script without address".to_string()));
        }
        Ok(Self::new(address, timelock))
    }
}

/// Signature and public key unlocking a pay-to-address output
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InputData {
    pub signature: Vec<u8>,
    pub public_key: Vec<u8>,
}

impl InputData {
    pub fn new(signature: Vec<u8>, public_key: Vec<u8>) -> Self {
        Self {
            signature,
            public_key,
        }
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(1 + self.signature.len() + self.public_key.len());
        buf.put_u8(self.signature.len() as u8);
        buf.put_slice(&self.signature);
        buf.put_slice(&self.public_key);
        buf
    }

    pub fn from_bytes(mut bytes: &[u8]) -> Result<Self, TransactionError> {
        if !bytes.has_remaining() {
            return Err(TransactionError::Decode("empty input data".to_string()));
        }
        let sig_len = bytes.get_u8() as usize;
        if bytes.remaining() != sig_len + PUBKEY_LEN {
            return Err(TransactionError::Decode(format!(
                "input data length mismatch: {} bytes after a {} byte signature",
                bytes.remaining(),
                sig_len
            )));
        }
        let signature = bytes[..sig_len].to_vec();
        let public_key = bytes[sig_len..].to_vec();
        Ok(Self::new(signature, public_key))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_script_with_timelock() {
        let script = OutputScript::new("WaddressA", Some(1_700_000_000));
        let decoded = OutputScript::from_bytes(&script.to_bytes()).unwrap();
        assert_eq!(decoded, script);
    }

    #[test]
    fn test_script_rejects_garbage() {
        assert!(OutputScript::from_bytes(&[]).is_err());
        assert!(OutputScript::from_bytes(&[FLAG_TIMELOCK, 0x00]).is_err());
        assert!(OutputScript::from_bytes(&[0]).is_err());
    }

    #[test]
    fn test_input_data_layout() {
        let data = InputData::new(vec![7; 64], vec![2; 33]);
        let bytes = data.to_bytes();
        assert_eq!(bytes.len(), 1 + 64 + 33);
        assert_eq!(InputData::from_bytes(&bytes).unwrap(), data);
        assert!(InputData::from_bytes(&bytes[..50]).is_err());
    }
}
