//! Registry descriptor fetching and the role-keyed descriptor slots

use crate::{CoreError, Result};
use async_trait::async_trait;
use fedns_api::{RegistryRole, RegistrySpec};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;

/// Fetches a registry descriptor from its URL
#[async_trait]
pub trait SpecFetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<RegistrySpec>;
}

/// Reject descriptors the engine cannot rotate over
pub fn validate_spec(spec: &RegistrySpec) -> Result<()> {
    if spec.id.is_empty() {
        return Err(CoreError::Configuration(
            "registry spec has an empty id".to_string(),
        ));
    }
    if spec.boot_nodes.is_empty() {
        return Err(CoreError::Configuration(format!(
            "registry spec {} lists no boot nodes",
            spec.id
        )));
    }
    Ok(())
}

/// Last fetched descriptor per role.
///
/// A slot is filled by the first successful fetch for its role and read back
/// whenever the caller allows reuse. Slots are keyed by role, not identity:
/// only the most recent second-level descriptor is remembered.
#[derive(Default)]
pub struct SpecSlots {
    root: RwLock<Option<Arc<RegistrySpec>>>,
    second_level: RwLock<Option<Arc<RegistrySpec>>>,
}

impl SpecSlots {
    pub fn new() -> Self {
        Self::default()
    }

    fn slot(&self, role: RegistryRole) -> &RwLock<Option<Arc<RegistrySpec>>> {
        match role {
            RegistryRole::Root => &self.root,
            RegistryRole::SecondLevel => &self.second_level,
        }
    }

    pub async fn get(&self, role: RegistryRole) -> Option<Arc<RegistrySpec>> {
        self.slot(role).read().await.clone()
    }

    pub async fn store(&self, role: RegistryRole, spec: Arc<RegistrySpec>) {
        *self.slot(role).write().await = Some(spec);
    }

    /// Descriptor for `role`: the stored one when `reuse` is set and the slot
    /// is filled, otherwise fetched from `url` and stored.
    pub async fn obtain(
        &self,
        fetcher: &dyn SpecFetcher,
        role: RegistryRole,
        url: &str,
        reuse: bool,
    ) -> Result<Arc<RegistrySpec>> {
        if reuse {
            if let Some(spec) = self.get(role).await {
                debug!("Reusing {} registry spec {}", role, spec.id);
                return Ok(spec);
            }
        }

        let spec = fetcher.fetch(url).await?;
        validate_spec(&spec)?;
        debug!(
            "Fetched {} registry spec {} with {} entry points",
            role,
            spec.id,
            spec.entry_point_count()
        );

        let spec = Arc::new(spec);
        self.store(role, spec.clone()).await;
        Ok(spec)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::{root_schema, MemoryFederation};

    const ROOT_URL: &str = "http://localhost:3000/json/rootSpec.json";

    fn federation() -> MemoryFederation {
        let federation = MemoryFederation::new();
        federation.add_registry(
            ROOT_URL,
            RegistrySpec::new("root", vec!["/ip4/10.0.0.1/tcp/9944/p2p/a".to_string()]),
            root_schema(),
        );
        federation
    }

    #[tokio::test]
    async fn test_reuse_skips_fetch_once_filled() {
        let federation = federation();
        let slots = SpecSlots::new();

        let first = slots
            .obtain(&federation, RegistryRole::Root, ROOT_URL, true)
            .await
            .unwrap();
        let second = slots
            .obtain(&federation, RegistryRole::Root, ROOT_URL, true)
            .await
            .unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(federation.stats().spec_fetches, 1);
    }

    #[tokio::test]
    async fn test_fresh_fetch_every_time_without_reuse() {
        let federation = federation();
        let slots = SpecSlots::new();

        for _ in 0..3 {
            slots
                .obtain(&federation, RegistryRole::Root, ROOT_URL, false)
                .await
                .unwrap();
        }
        assert_eq!(federation.stats().spec_fetches, 3);
        assert!(slots.get(RegistryRole::Root).await.is_some());
        assert!(slots.get(RegistryRole::SecondLevel).await.is_none());
    }

    #[tokio::test]
    async fn test_failed_fetch_leaves_slot_empty() {
        let federation = federation();
        let slots = SpecSlots::new();

        let err = slots
            .obtain(&federation, RegistryRole::Root, "http://localhost:3000/json/nope.json", true)
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::SpecFetch { .. }));
        assert!(slots.get(RegistryRole::Root).await.is_none());
    }

    #[test]
    fn test_validate_spec() {
        assert!(validate_spec(&RegistrySpec::new("root", vec![])).is_err());
        assert!(validate_spec(&RegistrySpec::new("", vec!["/ip4/a/tcp/1".to_string()])).is_err());
        assert!(validate_spec(&RegistrySpec::new("root", vec!["/ip4/a/tcp/1".to_string()])).is_ok());
    }
}
