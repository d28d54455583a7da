//! Registry schema descriptors and the per-registry schema cache

use crate::codec;
use crate::transport::{Call, ConnectionHandle, StorageKey};
use crate::{CoreError, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::{Mutex, OnceCell};
use tracing::debug;

/// A storage entry declared by a registry
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageEntry {
    pub module: String,
    pub name: String,
    /// Whether the entry is a map that needs a key
    pub keyed: bool,
}

/// A callable operation declared by a registry
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallEntry {
    pub module: String,
    pub name: String,
    pub arity: usize,
}

/// Decoded structural metadata of one registry
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemaDescriptor {
    pub storage: Vec<StorageEntry>,
    pub calls: Vec<CallEntry>,
}

impl SchemaDescriptor {
    pub fn with_storage(mut self, module: &str, name: &str, keyed: bool) -> Self {
        self.storage.push(StorageEntry {
            module: module.to_string(),
            name: name.to_string(),
            keyed,
        });
        self
    }

    pub fn with_call(mut self, module: &str, name: &str, arity: usize) -> Self {
        self.calls.push(CallEntry {
            module: module.to_string(),
            name: name.to_string(),
            arity,
        });
        self
    }

    fn storage_entry(&self, module: &str, name: &str) -> Option<&StorageEntry> {
        self.storage
            .iter()
            .find(|entry| entry.module == module && entry.name == name)
    }

    /// Key for `module.map`, with `key` already SCALE encoded.
    pub fn storage_key(&self, module: &str, map: &str, key: Option<Vec<u8>>) -> Result<StorageKey> {
        let entry = self
            .storage_entry(module, map)
            .ok_or_else(|| CoreError::Schema(format!("no storage entry {}.{}", module, map)))?;

        match (entry.keyed, key) {
            (true, Some(key)) => Ok(StorageKey::map(module, map, key)),
            (false, None) => Ok(StorageKey::plain(module, map)),
            (true, None) => Err(CoreError::Schema(format!(
                "{}.{} is a map and needs a key",
                module, map
            ))),
            (false, Some(_)) => Err(CoreError::Schema(format!(
                "{}.{} is a plain value and takes no key",
                module, map
            ))),
        }
    }

    /// Key for a map keyed by a byte string such as a label or domain name
    pub fn text_key(&self, module: &str, map: &str, text: &str) -> Result<StorageKey> {
        self.storage_key(module, map, Some(codec::text(text)))
    }

    pub fn call(&self, module: &str, name: &str, args: Vec<Vec<u8>>) -> Result<Call> {
        let entry = self
            .calls
            .iter()
            .find(|entry| entry.module == module && entry.name == name)
            .ok_or_else(|| CoreError::Schema(format!("no call {}.{}", module, name)))?;

        if entry.arity != args.len() {
            return Err(CoreError::Schema(format!(
                "{}.{} takes {} arguments, got {}",
                module,
                name,
                entry.arity,
                args.len()
            )));
        }

        Ok(Call {
            module: module.to_string(),
            name: name.to_string(),
            args,
        })
    }
}

/// Schema descriptors keyed by registry identity.
///
/// Each identity is fetched at most once for the life of the cache, whichever
/// entry point or handle asks first. Entries are never invalidated.
pub struct SchemaCache {
    schemas: Mutex<HashMap<String, Arc<OnceCell<Arc<SchemaDescriptor>>>>>,
    fetches: AtomicUsize,
}

impl SchemaCache {
    pub fn new() -> Self {
        Self {
            schemas: Mutex::new(HashMap::new()),
            fetches: AtomicUsize::new(0),
        }
    }

    /// Schema of `identity`, fetched over `handle` on first request
    pub async fn get_schema(
        &self,
        identity: &str,
        handle: &ConnectionHandle,
    ) -> Result<Arc<SchemaDescriptor>> {
        let cell = {
            let mut schemas = self.schemas.lock().await;
            schemas.entry(identity.to_string()).or_default().clone()
        };

        let schema = cell
            .get_or_try_init(|| async {
                debug!("Fetching schema for registry {} via {}", identity, handle.uri());
                self.fetches.fetch_add(1, Ordering::SeqCst);
                handle
                    .fetch_schema()
                    .await
                    .map(Arc::new)
                    .map_err(CoreError::from)
            })
            .await?;

        Ok(schema.clone())
    }

    /// Whether a schema is stored for `identity`
    pub async fn contains(&self, identity: &str) -> bool {
        let schemas = self.schemas.lock().await;
        schemas
            .get(identity)
            .map(|cell| cell.initialized())
            .unwrap_or(false)
    }

    /// Number of schema fetches issued so far
    pub fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }
}

impl Default for SchemaCache {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::{root_schema, MemoryFederation};
    use crate::transport::RegistryTransport;
    use fedns_api::RegistrySpec;

    #[test]
    fn test_storage_key_checks_schema() {
        let schema = root_schema();
        let key = schema.text_key("RootDNSModule", "TLDMap", "com").unwrap();
        assert_eq!(key.key, Some(vec![0x0c, b'c', b'o', b'm']));

        assert!(schema.storage_key("System", "Events", None).is_ok());
        assert!(matches!(
            schema.storage_key("System", "Events", Some(vec![1])),
            Err(CoreError::Schema(_))
        ));
        assert!(schema.storage_key("RootDNSModule", "TLDMap", None).is_err());
        assert!(schema.text_key("TldModule", "DomainMap", "a.com").is_err());
    }

    #[test]
    fn test_call_checks_arity() {
        let schema = root_schema();
        let call = schema
            .call(
                "AssetDiscoveryModule",
                "register_asset_for_domain",
                vec![vec![0], vec![0]],
            )
            .unwrap();
        assert_eq!(call.args.len(), 2);
        assert!(schema
            .call("AssetDiscoveryModule", "register_asset_for_domain", vec![])
            .is_err());
        assert!(schema.call("Balances", "transfer", vec![]).is_err());
    }

    #[tokio::test]
    async fn test_schema_fetched_once_per_identity() {
        let federation = MemoryFederation::new();
        federation.add_registry(
            "http://localhost:3000/json/rootSpec.json",
            RegistrySpec::new(
                "root",
                vec![
                    "/ip4/10.0.0.1/tcp/9944/p2p/a".to_string(),
                    "/ip4/10.0.0.2/tcp/9944/p2p/b".to_string(),
                ],
            ),
            root_schema(),
        );

        let first = federation.connect("ws://10.0.0.1:9944").await.unwrap();
        let second = federation.connect("ws://10.0.0.2:9944").await.unwrap();

        let cache = SchemaCache::new();
        assert!(!cache.contains("root").await);

        let a = cache.get_schema("root", &first).await.unwrap();
        let b = cache.get_schema("root", &second).await.unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert!(cache.contains("root").await);
        assert_eq!(cache.fetch_count(), 1);
        assert_eq!(federation.stats().schema_fetches, 1);
    }

    #[tokio::test]
    async fn test_concurrent_first_access_fetches_once() {
        let federation = MemoryFederation::new();
        federation.add_registry(
            "http://localhost:3000/json/rootSpec.json",
            RegistrySpec::new("root", vec!["/ip4/10.0.0.1/tcp/9944/p2p/a".to_string()]),
            root_schema(),
        );
        let handle = federation.connect("ws://10.0.0.1:9944").await.unwrap();
        let cache = Arc::new(SchemaCache::new());

        let tasks: Vec<_> = (0..16)
            .map(|_| {
                let cache = cache.clone();
                let handle = handle.clone();
                tokio::spawn(async move { cache.get_schema("root", &handle).await.map(|_| ()) })
            })
            .collect();

        for result in futures::future::join_all(tasks).await {
            result.expect("task panicked").expect("schema fetch failed");
        }
        assert_eq!(cache.fetch_count(), 1);
    }
}
