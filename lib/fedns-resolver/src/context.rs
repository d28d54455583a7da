//! Shared pooling, caching and rotation state

use crate::metrics::EngineMetrics;
use fedns_api::{RegistryRecord, RegistryRole, RegistrySpec};
use fedns_core::codec;
use fedns_core::names::{ROOT_MODULE, TLD_MAP};
use fedns_core::{
    ConnectionHandle, ConnectionPool, CoreError, EndpointRotator, RegistryTransport, Result,
    SchemaCache, Scope, SpecFetcher, SpecSlots,
};
use std::sync::Arc;
use tracing::debug;

pub const DEFAULT_ROOT_SPEC_URL: &str = "http://localhost:3000/json/rootSpec.json";

/// Client configuration
#[derive(Clone, Debug)]
pub struct ClientConfig {
    /// Descriptor URL of the root registry
    pub root_spec_url: String,
    /// Keep connections open and share them between calls
    pub use_cache: bool,
    /// Asset label that primes a nonce without producing a result
    pub sentinel_label: String,
    /// Prefix stripped from relayed asset labels
    pub asset_prefix: String,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            root_spec_url: DEFAULT_ROOT_SPEC_URL.to_string(),
            use_cache: false,
            sentinel_label: "asset-1".to_string(),
            asset_prefix: "asset".to_string(),
        }
    }
}

/// State shared by the resolver, registrar and listener of one client.
///
/// Each structure carries its own lock; a schema is always fetched through
/// a connection obtained beforehand, never under a combined lock.
pub struct RegistryContext {
    config: ClientConfig,
    fetcher: Arc<dyn SpecFetcher>,
    pool: ConnectionPool,
    schemas: SchemaCache,
    rotator: EndpointRotator,
    specs: SpecSlots,
    metrics: EngineMetrics,
}

impl RegistryContext {
    pub fn new(
        config: ClientConfig,
        fetcher: Arc<dyn SpecFetcher>,
        transport: Arc<dyn RegistryTransport>,
    ) -> Result<Self> {
        let metrics = EngineMetrics::new()
            .map_err(|e| CoreError::Internal(format!("failed to create metrics: {}", e)))?;

        Ok(Self {
            config,
            fetcher,
            pool: ConnectionPool::new(transport),
            schemas: SchemaCache::new(),
            rotator: EndpointRotator::new(),
            specs: SpecSlots::new(),
            metrics,
        })
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn pool(&self) -> &ConnectionPool {
        &self.pool
    }

    pub fn schemas(&self) -> &SchemaCache {
        &self.schemas
    }

    pub fn rotator(&self) -> &EndpointRotator {
        &self.rotator
    }

    pub fn specs(&self) -> &SpecSlots {
        &self.specs
    }

    pub fn metrics(&self) -> &EngineMetrics {
        &self.metrics
    }

    /// Descriptor for `role`, reusing the last one fetched when `reuse` is set
    pub async fn spec(&self, role: RegistryRole, url: &str, reuse: bool) -> Result<Arc<RegistrySpec>> {
        self.specs.obtain(self.fetcher.as_ref(), role, url, reuse).await
    }

    /// Root registry descriptor, fetched only while its slot is empty
    pub async fn root_spec(&self) -> Result<Arc<RegistrySpec>> {
        self.spec(RegistryRole::Root, &self.config.root_spec_url, true)
            .await
    }

    /// Second-level registry serving `top_level`, read from the root registry
    pub async fn registry_record(&self, top_level: &str, reuse: bool) -> Result<RegistryRecord> {
        let root = self
            .spec(RegistryRole::Root, &self.config.root_spec_url, reuse)
            .await?;

        let raw = self
            .lookup(&root, Scope::Root, ROOT_MODULE, TLD_MAP, top_level)
            .await?;
        let record: RegistryRecord = codec::decode(&raw)?;
        debug!("Top-level {} is served by {}", top_level, record.endpoint);
        Ok(record)
    }

    /// Connection to the entry point `scope` currently points at.
    ///
    /// The scope advances exactly once, whether or not the connection opens.
    pub async fn checkout(&self, spec: &RegistrySpec, scope: &Scope) -> Result<ConnectionHandle> {
        let count = spec.entry_point_count();
        let index = self.rotator.current_index(scope, count).await?;
        let address = spec.entry_point(index).ok_or_else(|| {
            CoreError::Configuration(format!("registry {} has no entry point {}", spec.id, index))
        })?;

        let handle = self
            .pool
            .get(&spec.id, index, address, self.config.use_cache)
            .await;
        let next = self.rotator.next_index(scope, count).await?;
        debug!("Scope {} used entry point {}, next is {}", scope, index, next);

        handle
    }

    /// Read `module.map[key]` from `spec` through the scope's current entry point
    pub async fn lookup(
        &self,
        spec: &RegistrySpec,
        scope: Scope,
        module: &str,
        map: &str,
        key: &str,
    ) -> Result<Vec<u8>> {
        let label = match scope {
            Scope::Root => "root",
            Scope::Registry(_) => "second_level",
        };
        self.metrics.lookups_total.with_label_values(&[label]).inc();

        let result = self.lookup_once(spec, &scope, module, map, key).await;
        if result.is_err() {
            self.metrics
                .lookup_failures_total
                .with_label_values(&[label])
                .inc();
        }
        result
    }

    async fn lookup_once(
        &self,
        spec: &RegistrySpec,
        scope: &Scope,
        module: &str,
        map: &str,
        key: &str,
    ) -> Result<Vec<u8>> {
        let handle = self.checkout(spec, scope).await?;

        let value = async {
            let schema = self.schemas.get_schema(&spec.id, &handle).await?;
            let storage_key = schema.text_key(module, map, key)?;
            debug!("Querying {} via {}", storage_key, handle.uri());
            Ok::<_, CoreError>(handle.read_storage(&storage_key).await?)
        }
        .await;

        self.pool.release(handle, self.config.use_cache).await;

        value?.ok_or_else(|| CoreError::NotFound {
            registry: spec.id.clone(),
            key: key.to_string(),
        })
    }
}
