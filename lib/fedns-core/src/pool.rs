//! Connection pool keyed by (registry identity, entry-point index)

use crate::endpoint::connection_uri;
use crate::transport::{ConnectionHandle, RegistryTransport};
use crate::{CoreError, Result};
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::debug;

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct PoolKey {
    pub identity: String,
    pub index: usize,
}

impl fmt::Display for PoolKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.identity, self.index)
    }
}

/// ConnectionPool hands out connections to registry entry points.
///
/// With caching enabled a handle lives for the rest of the process and is
/// shared by every caller asking for the same key. Without caching each call
/// opens a fresh handle the caller must [`release`](Self::release).
pub struct ConnectionPool {
    transport: Arc<dyn RegistryTransport>,
    // The lock spans lookup, open and insert so one key is never opened twice.
    connections: Mutex<HashMap<PoolKey, ConnectionHandle>>,
    opened: AtomicUsize,
}

impl ConnectionPool {
    pub fn new(transport: Arc<dyn RegistryTransport>) -> Self {
        Self {
            transport,
            connections: Mutex::new(HashMap::new()),
            opened: AtomicUsize::new(0),
        }
    }

    /// Connection to entry point `index` of registry `identity`.
    ///
    /// `address` is the entry point's boot node address. Open failures are
    /// returned as is; no other entry point is tried.
    pub async fn get(
        &self,
        identity: &str,
        index: usize,
        address: &str,
        caching: bool,
    ) -> Result<ConnectionHandle> {
        let key = PoolKey {
            identity: identity.to_string(),
            index,
        };

        let mut connections = self.connections.lock().await;
        if caching {
            if let Some(handle) = connections.get(&key) {
                return Ok(handle.clone());
            }
        }

        let handle = self.open(address).await?;
        if caching {
            debug!("Created new connection for {}", key);
            connections.insert(key, handle.clone());
        }

        Ok(handle)
    }

    /// Open an unpooled connection to a boot node address
    pub async fn open(&self, address: &str) -> Result<ConnectionHandle> {
        let uri = connection_uri(address)?;
        let handle = self
            .transport
            .connect(&uri)
            .await
            .map_err(|source| CoreError::Connection {
                address: uri.clone(),
                source,
            })?;

        self.opened.fetch_add(1, Ordering::SeqCst);
        debug!("Opened connection to {}", uri);
        Ok(handle)
    }

    /// Hand a connection back after its single operation.
    ///
    /// Pooled handles stay open; uncached ones are closed here.
    pub async fn release(&self, handle: ConnectionHandle, caching: bool) {
        if !caching {
            debug!("Closing connection to {}", handle.uri());
            handle.close().await;
        }
    }

    /// Number of pooled handles
    pub async fn len(&self) -> usize {
        self.connections.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Connections opened since creation, pooled or not
    pub fn opened_count(&self) -> usize {
        self.opened.load(Ordering::SeqCst)
    }
}
