//! Seams for the RPC/codec collaborator that talks to registry nodes
//!
//! The engine never speaks the node protocol itself. It hands storage keys
//! and calls to a [`RegistryConnection`] and consumes what comes back.

use crate::schema::SchemaDescriptor;
use async_trait::async_trait;
use fedns_api::{AccountId, DomainEvent};
use std::fmt;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::mpsc;

pub type TransportResult<T> = std::result::Result<T, TransportError>;

/// Errors raised by the RPC collaborator
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("connect failed: {0}")]
    Connect(String),

    #[error("rpc call failed: {0}")]
    Rpc(String),

    #[error("decode failed: {0}")]
    Decode(String),

    #[error("subscription closed")]
    SubscriptionClosed,
}

/// Address of a storage entry: module, map and the encoded map key if any
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct StorageKey {
    pub module: String,
    pub map: String,
    pub key: Option<Vec<u8>>,
}

impl StorageKey {
    pub fn plain(module: impl Into<String>, map: impl Into<String>) -> Self {
        Self {
            module: module.into(),
            map: map.into(),
            key: None,
        }
    }

    pub fn map(module: impl Into<String>, map: impl Into<String>, key: Vec<u8>) -> Self {
        Self {
            module: module.into(),
            map: map.into(),
            key: Some(key),
        }
    }
}

impl fmt::Display for StorageKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.key {
            Some(key) => write!(f, "{}.{}(0x{})", self.module, self.map, hex::encode(key)),
            None => write!(f, "{}.{}", self.module, self.map),
        }
    }
}

/// A dispatchable call with SCALE-encoded arguments
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Call {
    pub module: String,
    pub name: String,
    pub args: Vec<Vec<u8>>,
}

impl Call {
    /// "Module.call_name"
    pub fn qualified_name(&self) -> String {
        format!("{}.{}", self.module, self.name)
    }
}

/// Chain parameters a signature commits to
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SigningContext {
    pub genesis_hash: BlockHash,
    pub spec_version: u32,
    pub transaction_version: u32,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SignedTransaction {
    pub call: Call,
    pub signer: AccountId,
    pub nonce: u32,
    pub signature: Vec<u8>,
}

pub type BlockHash = [u8; 32];

/// Lifecycle of a submitted transaction as reported by the node
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TxStatus {
    Ready,
    Broadcast,
    InBlock(BlockHash),
    Finalized(BlockHash),
    Usurped,
    Dropped,
    Invalid,
}

/// Status stream of one submitted transaction; dropping it unsubscribes.
pub type TxWatch = mpsc::Receiver<TxStatus>;

/// One storage change notification
#[derive(Clone, Debug)]
pub struct StorageChange {
    pub key: StorageKey,
    pub data: Vec<u8>,
}

/// Change stream of a storage subscription; dropping it unsubscribes.
pub type StorageSubscription = mpsc::Receiver<StorageChange>;

/// An open channel to one entry point of one registry
#[async_trait]
pub trait RegistryConnection: Send + Sync {
    /// URI the connection was opened against
    fn uri(&self) -> &str;

    async fn fetch_schema(&self) -> TransportResult<SchemaDescriptor>;

    /// Raw value at `key` in the latest block, `None` when absent
    async fn read_storage(&self, key: &StorageKey) -> TransportResult<Option<Vec<u8>>>;

    async fn signing_context(&self) -> TransportResult<SigningContext>;

    async fn submit_and_watch(&self, tx: SignedTransaction) -> TransportResult<TxWatch>;

    async fn block_number(&self, hash: BlockHash) -> TransportResult<u64>;

    async fn subscribe_storage(&self, keys: Vec<StorageKey>) -> TransportResult<StorageSubscription>;

    /// Decode a raw event record set into the domain events it contains.
    /// Events of other modules are skipped.
    fn decode_events(
        &self,
        schema: &SchemaDescriptor,
        raw: &[u8],
    ) -> TransportResult<Vec<DomainEvent>>;

    async fn close(&self);
}

pub type ConnectionHandle = Arc<dyn RegistryConnection>;

/// Opens connections to registry entry points
#[async_trait]
pub trait RegistryTransport: Send + Sync {
    async fn connect(&self, uri: &str) -> TransportResult<ConnectionHandle>;
}

/// Signs calls on behalf of one account
pub trait TxSigner: Send + Sync {
    fn account(&self) -> AccountId;

    fn sign(
        &self,
        call: Call,
        nonce: u32,
        context: &SigningContext,
    ) -> TransportResult<SignedTransaction>;
}
