//! Domain lifecycle events deposited by the naming registries

use crate::AccountId;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum DomainEvent {
    /// A provider asked the validators to check its claim on a domain
    DomainValidationRequested {
        requester: AccountId,
        domain: String,
        timestamp: String,
    },
    /// An asset was registered for a domain at `block`
    AssetRegisteredForDomain {
        asset_label: String,
        domain: String,
        block: u64,
    },
    /// Pending validation requests past their lifetime were dropped
    ExpiredRequestsRemoved,
    AssetProviderRevoked { domain: String },
    /// A second-level registry stored a new domain record
    DomainRegistered { domain: String, creator: AccountId },
}

impl DomainEvent {
    pub fn name(&self) -> &'static str {
        match self {
            DomainEvent::DomainValidationRequested { .. } => "DomainValidationRequested",
            DomainEvent::AssetRegisteredForDomain { .. } => "AssetRegisteredForDomain",
            DomainEvent::ExpiredRequestsRemoved => "ExpiredRequestsRemoved",
            DomainEvent::AssetProviderRevoked { .. } => "AssetProviderRevoked",
            DomainEvent::DomainRegistered { .. } => "DomainRegistered",
        }
    }
}
