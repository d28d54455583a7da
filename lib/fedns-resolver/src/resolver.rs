//! Two-hop domain resolution across the root and second-level registries

use crate::context::RegistryContext;
use fedns_api::{DomainRecord, RegistryRole};
use fedns_core::codec;
use fedns_core::names::{DOMAIN_MAP, TLD_MODULE};
use fedns_core::{CoreError, Result, Scope};
use std::sync::Arc;
use std::time::Instant;
use tracing::debug;

/// Split a domain into its label and top-level label.
///
/// Only the first two components are used; "api.example.com" yields
/// ("api", "example").
pub fn parse_domain(domain: &str) -> Result<(&str, &str)> {
    let mut parts = domain.split('.');
    match (parts.next(), parts.next()) {
        (Some(label), Some(top_level)) if !label.is_empty() && !top_level.is_empty() => {
            Ok((label, top_level))
        }
        _ => Err(CoreError::InvalidDomain(domain.to_string())),
    }
}

/// Resolver maps domain names to the endpoint their second-level registry stores
pub struct Resolver {
    ctx: Arc<RegistryContext>,
}

impl Resolver {
    pub fn new(ctx: Arc<RegistryContext>) -> Self {
        Self { ctx }
    }

    pub fn context(&self) -> &Arc<RegistryContext> {
        &self.ctx
    }

    /// Endpoint registered for `domain`.
    ///
    /// With `relax_freshness` the last fetched descriptors are reused instead
    /// of being fetched again.
    pub async fn resolve(&self, domain: &str, relax_freshness: bool) -> Result<String> {
        self.resolve_record(domain, relax_freshness)
            .await
            .map(|record| record.endpoint)
    }

    /// Full domain record for `domain`
    pub async fn resolve_record(&self, domain: &str, relax_freshness: bool) -> Result<DomainRecord> {
        let (_, top_level) = parse_domain(domain)?;
        let start = Instant::now();

        let result = async {
            let registry = self.ctx.registry_record(top_level, relax_freshness).await?;
            self.lookup_domain(&registry.endpoint, domain, relax_freshness)
                .await
        }
        .await
        .map_err(|e| CoreError::resolution(domain, e));

        self.ctx
            .metrics()
            .resolve_duration_seconds
            .observe(start.elapsed().as_secs_f64());
        result
    }

    async fn lookup_domain(
        &self,
        registry_url: &str,
        domain: &str,
        relax_freshness: bool,
    ) -> Result<DomainRecord> {
        let registry = self
            .ctx
            .spec(RegistryRole::SecondLevel, registry_url, relax_freshness)
            .await?;

        let raw = self
            .ctx
            .lookup(
                &registry,
                Scope::Registry(registry.id.clone()),
                TLD_MODULE,
                DOMAIN_MAP,
                domain,
            )
            .await?;
        let record: DomainRecord = codec::decode(&raw)?;
        debug!("Domain {} resolves to {}", domain, record.endpoint);
        Ok(record)
    }
}
