//! Core connection management for the fedns resolution engine
//!
//! This library provides:
//! - Connection pooling per (registry, entry point)
//! - Per-registry schema caching
//! - Per-scope round-robin rotation over entry points
//! - Role-keyed descriptor slots for relaxed-freshness lookups
//! - The transport seams the RPC collaborator plugs into

pub mod codec;
pub mod endpoint;
pub mod error;
pub mod memory;
pub mod names;
pub mod pool;
pub mod rotator;
pub mod schema;
pub mod specs;
pub mod transport;

pub use endpoint::EntryPoint;
pub use error::{CoreError, RegistrationStage, Result};
pub use pool::ConnectionPool;
pub use rotator::{EndpointRotator, Scope};
pub use schema::{SchemaCache, SchemaDescriptor};
pub use specs::{SpecFetcher, SpecSlots};
pub use transport::{
    ConnectionHandle, RegistryConnection, RegistryTransport, StorageKey, TransportError,
    TxSigner, TxStatus,
};
