//! Data types shared across the fedns resolution engine
//!
//! This crate defines:
//! - Registry descriptors as served by the descriptor server
//! - Records stored in the root and second-level naming maps
//! - Domain lifecycle events relayed from the root registry
pub mod event;
pub mod record;
pub mod spec;

pub use event::DomainEvent;
pub use record::{AccountId, DomainRecord, PendingAssetResult, RegistryRecord};
pub use spec::{RegistryRole, RegistrySpec};
