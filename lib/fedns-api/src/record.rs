//! Records stored in the naming maps and results relayed to callers

use parity_scale_codec::{Decode, Encode};
use serde::{Deserialize, Serialize};
use std::fmt;

/// 32-byte ledger account identifier
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize, Encode, Decode,
)]
pub struct AccountId(pub [u8; 32]);

impl AccountId {
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl fmt::Display for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

/// Entry of the root registry's top-level map
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, Encode, Decode)]
pub struct RegistryRecord {
    /// Descriptor URL of the second-level registry
    pub endpoint: String,
}

/// Entry of a second-level registry's domain map.
///
/// Field order is the SCALE layout of the ledger's storage value.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, Encode, Decode)]
pub struct DomainRecord {
    pub creator: AccountId,
    /// Descriptor URL of the deployment the domain points at
    pub endpoint: String,
    pub maintainer: String,
    pub available: bool,
}

/// One completed operation reported on a result channel.
///
/// `value` is an elapsed time or a block height depending on the producer.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PendingAssetResult {
    pub label: String,
    pub value: u64,
}

impl PendingAssetResult {
    pub fn new(label: impl Into<String>, value: u64) -> Self {
        Self {
            label: label.into(),
            value,
        }
    }

    /// Request index carried in the label's trailing digits ("asset12" -> 12)
    pub fn index(&self) -> Option<u64> {
        let digits = self.label.len()
            - self
                .label
                .chars()
                .rev()
                .take_while(|c| c.is_ascii_digit())
                .count();
        self.label[digits..].parse().ok()
    }
}
