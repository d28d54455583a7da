//! In-memory federation implementing the transport and descriptor seams
//!
//! Every registry lives in process: descriptors are served by URL, entry
//! points by their `ws://host:port` URI, and storage is a plain map holding
//! SCALE-encoded values. Counters record every round trip so callers can
//! assert how much network traffic an operation would have caused.

use crate::codec::{self, AccountInfo};
use crate::endpoint::connection_uri;
use crate::names::*;
use crate::schema::SchemaDescriptor;
use crate::specs::SpecFetcher;
use crate::transport::{
    BlockHash, Call, ConnectionHandle, RegistryConnection, RegistryTransport, SignedTransaction,
    SigningContext, StorageChange, StorageKey, StorageSubscription, TransportError,
    TransportResult, TxSigner, TxStatus, TxWatch,
};
use crate::{CoreError, Result};
use async_trait::async_trait;
use fedns_api::{AccountId, DomainEvent, DomainRecord, RegistryRecord, RegistrySpec};
use parity_scale_codec::Encode;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, warn};

/// Schema of a root registry
pub fn root_schema() -> SchemaDescriptor {
    SchemaDescriptor::default()
        .with_storage(ROOT_MODULE, TLD_MAP, true)
        .with_storage(SYSTEM_MODULE, ACCOUNT_MAP, true)
        .with_storage(SYSTEM_MODULE, EVENTS_MAP, false)
        .with_call(ROOT_MODULE, REGISTER_TLD_CALL, 2)
        .with_call(ASSET_MODULE, REGISTER_ASSET_CALL, 2)
}

/// Schema of a second-level registry
pub fn second_level_schema() -> SchemaDescriptor {
    SchemaDescriptor::default()
        .with_storage(TLD_MODULE, DOMAIN_MAP, true)
        .with_storage(SYSTEM_MODULE, ACCOUNT_MAP, true)
        .with_storage(SYSTEM_MODULE, EVENTS_MAP, false)
        .with_call(TLD_MODULE, REGISTER_DOMAIN_CALL, 3)
}

/// Snapshot of the federation's round-trip counters
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct FederationStats {
    pub connects: usize,
    pub closes: usize,
    pub spec_fetches: usize,
    pub schema_fetches: usize,
    pub storage_reads: usize,
    pub submissions: usize,
}

#[derive(Default)]
struct Counters {
    connects: AtomicUsize,
    closes: AtomicUsize,
    spec_fetches: AtomicUsize,
    schema_fetches: AtomicUsize,
    storage_reads: AtomicUsize,
    submissions: AtomicUsize,
}

fn bump(counter: &AtomicUsize) {
    counter.fetch_add(1, Ordering::SeqCst);
}

/// One simulated registry ledger
pub struct MemoryRegistry {
    spec: RegistrySpec,
    schema: SchemaDescriptor,
    storage: Mutex<HashMap<StorageKey, Vec<u8>>>,
    used_nonces: Mutex<HashSet<(AccountId, u32)>>,
    block: AtomicU64,
    subscribers: Mutex<Vec<(Vec<StorageKey>, mpsc::Sender<StorageChange>)>>,
}

impl MemoryRegistry {
    fn new(spec: RegistrySpec, schema: SchemaDescriptor) -> Self {
        Self {
            spec,
            schema,
            storage: Mutex::new(HashMap::new()),
            used_nonces: Mutex::new(HashSet::new()),
            block: AtomicU64::new(0),
            subscribers: Mutex::new(Vec::new()),
        }
    }

    pub fn id(&self) -> &str {
        &self.spec.id
    }

    pub fn spec(&self) -> &RegistrySpec {
        &self.spec
    }

    fn put(&self, key: StorageKey, value: Vec<u8>) {
        self.storage
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key, value);
    }

    fn read(&self, key: &StorageKey) -> Option<Vec<u8>> {
        self.storage
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned()
    }

    /// Point top-level label `tld` at the descriptor URL of its registry
    pub fn insert_tld(&self, tld: &str, endpoint: &str) {
        let record = RegistryRecord {
            endpoint: endpoint.to_string(),
        };
        self.put(tld_key(tld), record.encode());
    }

    pub fn insert_domain(&self, domain: &str, record: &DomainRecord) {
        self.put(domain_key(domain), record.encode());
    }

    pub fn tld(&self, tld: &str) -> Option<RegistryRecord> {
        self.read(&tld_key(tld))
            .and_then(|raw| codec::decode(&raw).ok())
    }

    pub fn domain(&self, domain: &str) -> Option<DomainRecord> {
        self.read(&domain_key(domain))
            .and_then(|raw| codec::decode(&raw).ok())
    }

    pub fn block_height(&self) -> u64 {
        self.block.load(Ordering::SeqCst)
    }

    /// Next nonce the ledger expects from `account`
    pub fn nonce(&self, account: &AccountId) -> u32 {
        self.read(&account_key(account))
            .and_then(|info| codec::decode_account_nonce(&info).ok())
            .unwrap_or(0)
    }

    /// Deposit events into the current block and notify event subscribers
    pub fn emit_events(&self, events: &[DomainEvent]) {
        match serde_json::to_vec(events) {
            Ok(raw) => self.emit_raw(raw),
            Err(e) => warn!("Failed to encode events for {}: {}", self.spec.id, e),
        }
    }

    /// Deposit an already encoded event record set
    pub fn emit_raw(&self, raw: Vec<u8>) {
        let key = StorageKey::plain(SYSTEM_MODULE, EVENTS_MAP);
        self.put(key.clone(), raw.clone());

        let mut subscribers = self
            .subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        subscribers.retain(|(keys, sender)| {
            if !keys.contains(&key) {
                return !sender.is_closed();
            }
            let change = StorageChange {
                key: key.clone(),
                data: raw.clone(),
            };
            match sender.try_send(change) {
                Ok(()) => true,
                Err(mpsc::error::TrySendError::Full(_)) => {
                    warn!("Dropping event notification for slow subscriber");
                    true
                }
                Err(mpsc::error::TrySendError::Closed(_)) => false,
            }
        });
    }

    /// Live storage subscriptions
    pub fn subscriber_count(&self) -> usize {
        let mut subscribers = self
            .subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        subscribers.retain(|(_, sender)| !sender.is_closed());
        subscribers.len()
    }

    fn subscribe(&self, keys: Vec<StorageKey>) -> StorageSubscription {
        let (sender, receiver) = mpsc::channel(256);
        self.subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((keys, sender));
        receiver
    }

    /// Include a registration in a new block
    fn apply(&self, tx: &SignedTransaction) -> std::result::Result<u64, TxStatus> {
        let call = &tx.call;
        if tx.signature.is_empty()
            || self
                .schema
                .call(&call.module, &call.name, call.args.clone())
                .is_err()
        {
            return Err(TxStatus::Invalid);
        }

        let args = call
            .args
            .iter()
            .map(|arg| codec::decode_text(arg))
            .collect::<Result<Vec<_>>>()
            .map_err(|_| TxStatus::Invalid)?;

        // serializes transactions
        let mut used = self
            .used_nonces
            .lock()
            .unwrap_or_else(PoisonError::into_inner);

        let write = match (call.module.as_str(), call.name.as_str(), args.as_slice()) {
            (ASSET_MODULE, REGISTER_ASSET_CALL, [domain, asset_label]) => Write::Asset {
                domain: domain.clone(),
                asset_label: asset_label.clone(),
            },
            (ROOT_MODULE, REGISTER_TLD_CALL, [tld, endpoint]) => {
                if self.read(&tld_key(tld)).is_some() {
                    debug!("Top-level {} is already registered in {}", tld, self.spec.id);
                    return Err(TxStatus::Invalid);
                }
                Write::Tld {
                    tld: tld.clone(),
                    record: RegistryRecord {
                        endpoint: endpoint.clone(),
                    },
                }
            }
            (TLD_MODULE, REGISTER_DOMAIN_CALL, [domain, endpoint, maintainer]) => {
                if self.domain(domain).is_some_and(|record| !record.available) {
                    debug!("Domain {} is not available in {}", domain, self.spec.id);
                    return Err(TxStatus::Invalid);
                }
                Write::Domain {
                    domain: domain.clone(),
                    record: DomainRecord {
                        creator: tx.signer,
                        endpoint: endpoint.clone(),
                        maintainer: maintainer.clone(),
                        available: false,
                    },
                }
            }
            _ => return Err(TxStatus::Invalid),
        };

        if !used.insert((tx.signer, tx.nonce)) {
            return Err(TxStatus::Invalid);
        }

        let next_nonce = self.nonce(&tx.signer).max(tx.nonce.saturating_add(1));
        self.put(
            account_key(&tx.signer),
            AccountInfo::with_nonce(next_nonce).encode(),
        );

        let block = self.block.fetch_add(1, Ordering::SeqCst) + 1;
        match write {
            Write::Asset {
                domain,
                asset_label,
            } => self.emit_events(&[DomainEvent::AssetRegisteredForDomain {
                asset_label,
                domain,
                block,
            }]),
            Write::Tld { tld, record } => self.put(tld_key(&tld), record.encode()),
            Write::Domain { domain, record } => {
                let creator = record.creator;
                self.put(domain_key(&domain), record.encode());
                self.emit_events(&[DomainEvent::DomainRegistered { domain, creator }]);
            }
        }
        Ok(block)
    }
}

/// State change of an accepted transaction
enum Write {
    Asset { domain: String, asset_label: String },
    Tld { tld: String, record: RegistryRecord },
    Domain { domain: String, record: DomainRecord },
}

fn tld_key(tld: &str) -> StorageKey {
    StorageKey::map(ROOT_MODULE, TLD_MAP, codec::text(tld))
}

fn domain_key(domain: &str) -> StorageKey {
    StorageKey::map(TLD_MODULE, DOMAIN_MAP, codec::text(domain))
}

fn account_key(account: &AccountId) -> StorageKey {
    StorageKey::map(SYSTEM_MODULE, ACCOUNT_MAP, account.as_bytes().to_vec())
}

fn block_hash(block: u64) -> BlockHash {
    let mut hash = [0u8; 32];
    hash[..8].copy_from_slice(&block.to_le_bytes());
    hash
}

struct FederationState {
    by_url: RwLock<HashMap<String, Arc<MemoryRegistry>>>,
    by_uri: RwLock<HashMap<String, Arc<MemoryRegistry>>>,
    unreachable: RwLock<HashSet<String>>,
    failing_reads: RwLock<HashSet<String>>,
    latency: Duration,
    counters: Counters,
}

impl FederationState {
    async fn delay(&self) {
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
    }
}

/// A set of simulated registries reachable by descriptor URL and entry point URI
#[derive(Clone)]
pub struct MemoryFederation {
    state: Arc<FederationState>,
}

impl MemoryFederation {
    pub fn new() -> Self {
        Self::with_latency(Duration::ZERO)
    }

    /// Federation whose every round trip takes `latency`
    pub fn with_latency(latency: Duration) -> Self {
        Self {
            state: Arc::new(FederationState {
                by_url: RwLock::new(HashMap::new()),
                by_uri: RwLock::new(HashMap::new()),
                unreachable: RwLock::new(HashSet::new()),
                failing_reads: RwLock::new(HashSet::new()),
                latency,
                counters: Counters::default(),
            }),
        }
    }

    /// Serve `spec` at `url` and listen on each of its entry points
    pub fn add_registry(
        &self,
        url: &str,
        spec: RegistrySpec,
        schema: SchemaDescriptor,
    ) -> Arc<MemoryRegistry> {
        let registry = Arc::new(MemoryRegistry::new(spec, schema));

        let mut by_uri = self
            .state
            .by_uri
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        for address in &registry.spec.boot_nodes {
            match connection_uri(address) {
                Ok(uri) => {
                    by_uri.insert(uri, registry.clone());
                }
                Err(e) => warn!("Registry {} entry point not served: {}", registry.id(), e),
            }
        }

        self.state
            .by_url
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(url.to_string(), registry.clone());
        registry
    }

    /// Registry by identity
    pub fn registry(&self, id: &str) -> Option<Arc<MemoryRegistry>> {
        self.state
            .by_url
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .find(|registry| registry.id() == id)
            .cloned()
    }

    /// Refuse connections to `uri`
    pub fn set_unreachable(&self, uri: &str, unreachable: bool) {
        toggle(&self.state.unreachable, uri, unreachable);
    }

    /// Fail storage reads made through connections to `uri`
    pub fn set_failing_reads(&self, uri: &str, failing: bool) {
        toggle(&self.state.failing_reads, uri, failing);
    }

    pub fn stats(&self) -> FederationStats {
        let counters = &self.state.counters;
        FederationStats {
            connects: counters.connects.load(Ordering::SeqCst),
            closes: counters.closes.load(Ordering::SeqCst),
            spec_fetches: counters.spec_fetches.load(Ordering::SeqCst),
            schema_fetches: counters.schema_fetches.load(Ordering::SeqCst),
            storage_reads: counters.storage_reads.load(Ordering::SeqCst),
            submissions: counters.submissions.load(Ordering::SeqCst),
        }
    }

    /// Build a federation from a fixture description
    pub fn from_fixture(fixture: &FederationFixture) -> Result<Self> {
        let federation = Self::with_latency(Duration::from_millis(fixture.latency_ms));

        crate::specs::validate_spec(&fixture.root.spec)?;
        let root = federation.add_registry(&fixture.root.url, fixture.root.spec.clone(), root_schema());
        for (tld, endpoint) in &fixture.root.tlds {
            root.insert_tld(tld, endpoint);
        }

        for entry in &fixture.registries {
            crate::specs::validate_spec(&entry.spec)?;
            let registry =
                federation.add_registry(&entry.url, entry.spec.clone(), second_level_schema());
            for (domain, record) in &entry.domains {
                registry.insert_domain(
                    domain,
                    &DomainRecord {
                        creator: AccountId::default(),
                        endpoint: record.endpoint.clone(),
                        maintainer: record.maintainer.clone(),
                        available: record.available,
                    },
                );
            }
        }

        debug!(
            "Loaded federation fixture with {} second-level registries",
            fixture.registries.len()
        );
        Ok(federation)
    }
}

impl Default for MemoryFederation {
    fn default() -> Self {
        Self::new()
    }
}

fn toggle(set: &RwLock<HashSet<String>>, uri: &str, on: bool) {
    let mut set = set.write().unwrap_or_else(PoisonError::into_inner);
    if on {
        set.insert(uri.to_string());
    } else {
        set.remove(uri);
    }
}

fn contains(set: &RwLock<HashSet<String>>, uri: &str) -> bool {
    set.read()
        .unwrap_or_else(PoisonError::into_inner)
        .contains(uri)
}

#[async_trait]
impl RegistryTransport for MemoryFederation {
    async fn connect(&self, uri: &str) -> TransportResult<ConnectionHandle> {
        self.state.delay().await;

        if contains(&self.state.unreachable, uri) {
            return Err(TransportError::Connect(format!("{} refused the connection", uri)));
        }

        let registry = self
            .state
            .by_uri
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(uri)
            .cloned()
            .ok_or_else(|| TransportError::Connect(format!("no node listening on {}", uri)))?;

        bump(&self.state.counters.connects);
        Ok(Arc::new(MemoryConnection {
            uri: uri.to_string(),
            registry,
            state: self.state.clone(),
            closed: AtomicBool::new(false),
        }))
    }
}

#[async_trait]
impl SpecFetcher for MemoryFederation {
    async fn fetch(&self, url: &str) -> Result<RegistrySpec> {
        self.state.delay().await;
        bump(&self.state.counters.spec_fetches);

        self.state
            .by_url
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(url)
            .map(|registry| registry.spec.clone())
            .ok_or_else(|| CoreError::SpecFetch {
                url: url.to_string(),
                reason: "404 Not Found".to_string(),
            })
    }
}

/// Connection to one entry point of a [`MemoryRegistry`]
pub struct MemoryConnection {
    uri: String,
    registry: Arc<MemoryRegistry>,
    state: Arc<FederationState>,
    closed: AtomicBool,
}

impl MemoryConnection {
    fn ensure_open(&self) -> TransportResult<()> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(TransportError::Rpc(format!("connection to {} is closed", self.uri)));
        }
        Ok(())
    }
}

#[async_trait]
impl RegistryConnection for MemoryConnection {
    fn uri(&self) -> &str {
        &self.uri
    }

    async fn fetch_schema(&self) -> TransportResult<SchemaDescriptor> {
        self.ensure_open()?;
        self.state.delay().await;
        bump(&self.state.counters.schema_fetches);
        Ok(self.registry.schema.clone())
    }

    async fn read_storage(&self, key: &StorageKey) -> TransportResult<Option<Vec<u8>>> {
        self.ensure_open()?;
        self.state.delay().await;
        if contains(&self.state.failing_reads, &self.uri) {
            return Err(TransportError::Rpc(format!("state_getStorage failed on {}", self.uri)));
        }
        bump(&self.state.counters.storage_reads);
        Ok(self.registry.read(key))
    }

    async fn signing_context(&self) -> TransportResult<SigningContext> {
        self.ensure_open()?;
        let digest = Sha256::digest(self.registry.id().as_bytes());
        let mut genesis_hash = [0u8; 32];
        genesis_hash.copy_from_slice(&digest);
        Ok(SigningContext {
            genesis_hash,
            spec_version: 100,
            transaction_version: 1,
        })
    }

    async fn submit_and_watch(&self, tx: SignedTransaction) -> TransportResult<TxWatch> {
        self.ensure_open()?;
        self.state.delay().await;
        bump(&self.state.counters.submissions);

        let (sender, watch) = mpsc::channel(4);
        let statuses = match self.registry.apply(&tx) {
            Ok(block) => vec![TxStatus::Ready, TxStatus::InBlock(block_hash(block))],
            Err(status) => vec![status],
        };
        for status in statuses {
            let _ = sender.try_send(status);
        }
        Ok(watch)
    }

    async fn block_number(&self, hash: BlockHash) -> TransportResult<u64> {
        self.ensure_open()?;
        let mut number = [0u8; 8];
        number.copy_from_slice(&hash[..8]);
        let number = u64::from_le_bytes(number);
        if number == 0 || number > self.registry.block_height() {
            return Err(TransportError::Rpc(format!("unknown block {}", hex::encode(hash))));
        }
        Ok(number)
    }

    async fn subscribe_storage(&self, keys: Vec<StorageKey>) -> TransportResult<StorageSubscription> {
        self.ensure_open()?;
        Ok(self.registry.subscribe(keys))
    }

    fn decode_events(
        &self,
        schema: &SchemaDescriptor,
        raw: &[u8],
    ) -> TransportResult<Vec<DomainEvent>> {
        schema
            .storage_key(SYSTEM_MODULE, EVENTS_MAP, None)
            .map_err(|e| TransportError::Decode(e.to_string()))?;
        serde_json::from_slice(raw).map_err(|e| TransportError::Decode(e.to_string()))
    }

    async fn close(&self) {
        if !self.closed.swap(true, Ordering::SeqCst) {
            bump(&self.state.counters.closes);
        }
    }
}

/// Development signer deriving its account from a seed phrase
pub struct DevSigner {
    account: AccountId,
}

impl DevSigner {
    pub fn new(seed: &str) -> Self {
        let digest = Sha256::digest(seed.as_bytes());
        let mut account = [0u8; 32];
        account.copy_from_slice(&digest);
        Self {
            account: AccountId(account),
        }
    }
}

impl TxSigner for DevSigner {
    fn account(&self) -> AccountId {
        self.account
    }

    fn sign(
        &self,
        call: Call,
        nonce: u32,
        context: &SigningContext,
    ) -> TransportResult<SignedTransaction> {
        let mut hasher = Sha256::new();
        hasher.update(call.qualified_name().as_bytes());
        for arg in &call.args {
            hasher.update(arg);
        }
        hasher.update(nonce.to_le_bytes());
        hasher.update(context.genesis_hash);
        hasher.update(context.spec_version.to_le_bytes());
        hasher.update(self.account.as_bytes());

        Ok(SignedTransaction {
            call,
            signer: self.account,
            nonce,
            signature: hasher.finalize().to_vec(),
        })
    }
}

/// Federation description loaded from JSON
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct FederationFixture {
    pub root: RootFixture,
    #[serde(default)]
    pub registries: Vec<RegistryFixture>,
    /// Simulated round-trip latency
    #[serde(default)]
    pub latency_ms: u64,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RootFixture {
    pub url: String,
    pub spec: RegistrySpec,
    /// Top-level label to second-level descriptor URL
    #[serde(default)]
    pub tlds: BTreeMap<String, String>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RegistryFixture {
    pub url: String,
    pub spec: RegistrySpec,
    #[serde(default)]
    pub domains: BTreeMap<String, DomainFixture>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DomainFixture {
    pub endpoint: String,
    #[serde(default)]
    pub maintainer: String,
    #[serde(default = "default_available")]
    pub available: bool,
}

fn default_available() -> bool {
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    const FIXTURE: &str = r#"{
        "root": {
            "url": "http://json_server:3000/json/rootSpec.json",
            "spec": { "id": "root", "bootNodes": ["/ip4/10.0.0.1/tcp/9944/p2p/a"] },
            "tlds": { "com": "http://json_server:3000/json/comSpec.json" }
        },
        "registries": [{
            "url": "http://json_server:3000/json/comSpec.json",
            "spec": { "id": "com", "bootNodes": ["/ip4/10.0.1.1/tcp/9944/p2p/c"] },
            "domains": { "example.com": { "endpoint": "http://json_server:3000/json/exampleSpec.json" } }
        }]
    }"#;

    #[tokio::test]
    async fn test_fixture_round_trip_through_transport() {
        let fixture: FederationFixture = serde_json::from_str(FIXTURE).unwrap();
        let federation = MemoryFederation::from_fixture(&fixture).unwrap();

        let spec = federation
            .fetch("http://json_server:3000/json/comSpec.json")
            .await
            .unwrap();
        assert_eq!(spec.id, "com");

        let handle = federation.connect("ws://10.0.1.1:9944").await.unwrap();
        let key = domain_key("example.com");
        let raw = handle.read_storage(&key).await.unwrap().expect("domain stored");
        let record: DomainRecord = codec::decode(&raw).unwrap();
        assert_eq!(record.endpoint, "http://json_server:3000/json/exampleSpec.json");
        assert!(record.available);
    }

    #[tokio::test]
    async fn test_closed_connection_rejects_calls() {
        let federation = MemoryFederation::new();
        federation.add_registry(
            "http://localhost/root.json",
            RegistrySpec::new("root", vec!["/ip4/10.0.0.1/tcp/9944/p2p/a".to_string()]),
            root_schema(),
        );
        let handle = federation.connect("ws://10.0.0.1:9944").await.unwrap();
        handle.close().await;
        handle.close().await;

        assert!(handle.fetch_schema().await.is_err());
        assert_eq!(federation.stats().closes, 1);
    }

    #[tokio::test]
    async fn test_unknown_uri_refuses_connection() {
        let federation = MemoryFederation::new();
        assert!(matches!(
            federation.connect("ws://10.9.9.9:9944").await,
            Err(TransportError::Connect(_))
        ));
    }

    #[tokio::test]
    async fn test_duplicate_nonce_is_invalid() {
        let federation = MemoryFederation::new();
        federation.add_registry(
            "http://localhost/root.json",
            RegistrySpec::new("root", vec!["/ip4/10.0.0.1/tcp/9944/p2p/a".to_string()]),
            root_schema(),
        );
        let handle = federation.connect("ws://10.0.0.1:9944").await.unwrap();
        let signer = DevSigner::new("//Alice");
        let context = handle.signing_context().await.unwrap();
        let call = root_schema()
            .call(
                ASSET_MODULE,
                REGISTER_ASSET_CALL,
                vec![codec::text("example.com"), codec::text("asset0")],
            )
            .unwrap();

        let tx = signer.sign(call, 0, &context).unwrap();
        let mut watch = handle.submit_and_watch(tx.clone()).await.unwrap();
        assert_eq!(watch.recv().await, Some(TxStatus::Ready));
        assert_eq!(watch.recv().await, Some(TxStatus::InBlock(block_hash(1))));

        let mut watch = handle.submit_and_watch(tx).await.unwrap();
        assert_eq!(watch.recv().await, Some(TxStatus::Invalid));

        let registry = federation.registry("root").unwrap();
        assert_eq!(registry.nonce(&signer.account()), 1);
        assert_eq!(registry.block_height(), 1);
    }

    async fn com_federation() -> (MemoryFederation, ConnectionHandle) {
        let federation = MemoryFederation::new();
        federation.add_registry(
            "http://localhost/com.json",
            RegistrySpec::new("com", vec!["/ip4/10.0.1.1/tcp/9944/p2p/c".to_string()]),
            second_level_schema(),
        );
        let handle = federation.connect("ws://10.0.1.1:9944").await.unwrap();
        (federation, handle)
    }

    async fn submit(
        handle: &ConnectionHandle,
        signer: &DevSigner,
        call: Call,
        nonce: u32,
    ) -> Vec<TxStatus> {
        let context = handle.signing_context().await.unwrap();
        let tx = signer.sign(call, nonce, &context).unwrap();
        let mut watch = handle.submit_and_watch(tx).await.unwrap();
        let mut statuses = Vec::new();
        while let Some(status) = watch.recv().await {
            statuses.push(status);
        }
        statuses
    }

    fn register_domain(maintainer: &str) -> Call {
        second_level_schema()
            .call(
                TLD_MODULE,
                REGISTER_DOMAIN_CALL,
                vec![
                    codec::text("example.com"),
                    codec::text("http://localhost/example.json"),
                    codec::text(maintainer),
                ],
            )
            .unwrap()
    }

    #[tokio::test]
    async fn test_domain_registration_claims_the_name() {
        let (federation, handle) = com_federation().await;
        let registry = federation.registry("com").unwrap();
        let mut events = registry.subscribe(vec![StorageKey::plain(SYSTEM_MODULE, EVENTS_MAP)]);
        let signer = DevSigner::new("//Alice");

        let statuses = submit(&handle, &signer, register_domain("node-1"), 0).await;
        assert_eq!(statuses, vec![TxStatus::Ready, TxStatus::InBlock(block_hash(1))]);

        let record = registry.domain("example.com").unwrap();
        assert_eq!(record.creator, signer.account());
        assert!(!record.available);

        let change = events.recv().await.unwrap();
        let decoded: Vec<DomainEvent> = serde_json::from_slice(&change.data).unwrap();
        assert_eq!(
            decoded,
            vec![DomainEvent::DomainRegistered {
                domain: "example.com".to_string(),
                creator: signer.account(),
            }]
        );

        // claimed names stay with their creator, the nonce is not consumed
        let statuses = submit(&handle, &signer, register_domain("node-2"), 1).await;
        assert_eq!(statuses, vec![TxStatus::Invalid]);
        assert_eq!(registry.nonce(&signer.account()), 1);
        assert_eq!(registry.domain("example.com").unwrap().maintainer, "node-1");
    }

    #[tokio::test]
    async fn test_available_domain_can_be_claimed_again() {
        let (federation, handle) = com_federation().await;
        let registry = federation.registry("com").unwrap();
        let record = DomainRecord {
            creator: AccountId([9; 32]),
            endpoint: "http://localhost/old.json".to_string(),
            maintainer: "old".to_string(),
            available: true,
        };
        registry.insert_domain("example.com", &record);

        let signer = DevSigner::new("//Bob");
        let statuses = submit(&handle, &signer, register_domain("node-1"), 0).await;
        assert_eq!(statuses.last(), Some(&TxStatus::InBlock(block_hash(1))));

        let claimed = registry.domain("example.com").unwrap();
        assert_eq!(claimed.creator, signer.account());
        assert_eq!(claimed.endpoint, "http://localhost/example.json");
    }

    #[tokio::test]
    async fn test_calls_outside_the_schema_are_invalid() {
        let (federation, handle) = com_federation().await;
        let signer = DevSigner::new("//Alice");
        let call = Call {
            module: ROOT_MODULE.to_string(),
            name: REGISTER_TLD_CALL.to_string(),
            args: vec![codec::text("com"), codec::text("http://localhost/com.json")],
        };

        let statuses = submit(&handle, &signer, call, 0).await;
        assert_eq!(statuses, vec![TxStatus::Invalid]);
        assert_eq!(federation.registry("com").unwrap().block_height(), 0);
    }
}
