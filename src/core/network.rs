//! Ledger constants and network parameters

use bitflags::bitflags;
use serde::{Deserialize, Serialize};

/// Uid of the ledger's native token
pub const NATIVE_TOKEN_UID: &str = "00";

/// `token_data` bit marking an authority output
pub const TOKEN_AUTHORITY_MASK: u8 = 0x80;

/// `token_data` bits holding the 1-based token index (0 = native token)
pub const TOKEN_INDEX_MASK: u8 = 0x7f;

/// Blocks a reward output stays locked after the block that created it
pub const DEFAULT_REWARD_SPEND_MIN_BLOCKS: u64 = 300;

/// Current transaction encoding version
pub const TX_VERSION: u16 = 1;

bitflags! {
    /// Authority bits carried in the value of an authority output
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, PartialOrd, Ord)]
    pub struct Authorities: u8 {
        const MINT = 0x01;
        const MELT = 0x02;
    }
}

impl Authorities {
    /// Number of `flag` authorities (0 or 1) this mask carries
    pub fn count(self, flag: Authorities) -> i64 {
        i64::from(self.contains(flag))
    }
}

/// Build a `token_data` byte from a 1-based token index and authority flag
pub fn token_data(token_index: u8, authority: bool) -> u8 {
    let index = token_index & TOKEN_INDEX_MASK;
    if authority {
        index | TOKEN_AUTHORITY_MASK
    } else {
        index
    }
}

/// Network parameters the wallet core depends on
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct NetworkParams {
    /// Network name, embedded in serialized partial transactions
    pub name: String,
    /// Reward spend-lock window in blocks
    #[serde(default = "default_reward_window")]
    pub reward_spend_min_blocks: u64,
}

fn default_reward_window() -> u64 {
    DEFAULT_REWARD_SPEND_MIN_BLOCKS
}

impl NetworkParams {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            reward_spend_min_blocks: DEFAULT_REWARD_SPEND_MIN_BLOCKS,
        }
    }
}

impl Default for NetworkParams {
    fn default() -> Self {
        Self::new("mainnet")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_data_encoding() {
        assert_eq!(token_data(0, false), 0);
        assert_eq!(token_data(2, false), 2);
        assert_eq!(token_data(1, true), 0x81);
    }

    #[test]
    fn test_authority_count() {
        let both = Authorities::MINT | Authorities::MELT;
        assert_eq!(both.count(Authorities::MINT), 1);
        assert_eq!(Authorities::MELT.count(Authorities::MINT), 0);
    }
}
