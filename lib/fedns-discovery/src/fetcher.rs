//! Fetches registry descriptors from the descriptor server

use crate::client::DescriptorClient;
use async_trait::async_trait;
use fedns_api::RegistrySpec;
use fedns_core::{CoreError, Result, SpecFetcher};
use std::time::Duration;
use tracing::debug;

/// HttpSpecFetcher resolves descriptor URLs with a plain HTTP GET.
///
/// Descriptor URLs stored on-ledger may name hosts only resolvable inside the
/// test network (e.g. `json_server`); a host rewrite maps them to one the
/// caller can reach.
pub struct HttpSpecFetcher {
    client: DescriptorClient,
    host_rewrite: Option<(String, String)>,
}

impl HttpSpecFetcher {
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = DescriptorClient::new(timeout)
            .map_err(|e| CoreError::Internal(format!("failed to build HTTP client: {}", e)))?;
        Ok(Self {
            client,
            host_rewrite: None,
        })
    }

    /// Replace the first occurrence of `from` in every URL with `to`
    pub fn with_host_rewrite(mut self, from: impl Into<String>, to: impl Into<String>) -> Self {
        self.host_rewrite = Some((from.into(), to.into()));
        self
    }

    /// URL actually requested for `url`
    pub fn rewrite_url(&self, url: &str) -> String {
        match &self.host_rewrite {
            Some((from, to)) => url.replacen(from.as_str(), to, 1),
            None => url.to_string(),
        }
    }
}

/// Parse a descriptor body
pub fn parse_spec(url: &str, body: &str) -> Result<RegistrySpec> {
    serde_json::from_str(body).map_err(|e| CoreError::SpecFetch {
        url: url.to_string(),
        reason: format!("malformed descriptor: {}", e),
    })
}

#[async_trait]
impl SpecFetcher for HttpSpecFetcher {
    async fn fetch(&self, url: &str) -> Result<RegistrySpec> {
        let target = self.rewrite_url(url);
        debug!("Fetching registry spec from {}", target);

        let spec_fetch_error = |reason: String| CoreError::SpecFetch {
            url: target.clone(),
            reason,
        };

        let response = self
            .client
            .inner()
            .get(&target)
            .send()
            .await
            .map_err(|e| spec_fetch_error(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(spec_fetch_error(format!("server answered {}", status)));
        }

        let body = response
            .text()
            .await
            .map_err(|e| spec_fetch_error(e.to_string()))?;

        parse_spec(&target, &body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rewrite_url() {
        let fetcher = HttpSpecFetcher::new(Duration::from_secs(5))
            .unwrap()
            .with_host_rewrite("json_server", "localhost");
        assert_eq!(
            fetcher.rewrite_url("http://json_server:3000/json/comSpec.json"),
            "http://localhost:3000/json/comSpec.json"
        );
        assert_eq!(
            fetcher.rewrite_url("http://10.0.0.5:3000/json/comSpec.json"),
            "http://10.0.0.5:3000/json/comSpec.json"
        );
    }

    #[test]
    fn test_rewrite_url_without_rule() {
        let fetcher = HttpSpecFetcher::new(Duration::from_secs(5)).unwrap();
        assert_eq!(
            fetcher.rewrite_url("http://json_server:3000/json/rootSpec.json"),
            "http://json_server:3000/json/rootSpec.json"
        );
    }

    #[test]
    fn test_parse_spec() {
        let spec = parse_spec(
            "http://localhost:3000/json/rootSpec.json",
            r#"{"id":"root","bootNodes":["/ip4/127.0.0.1/tcp/30333/p2p/a"],"protocolId":"dot"}"#,
        )
        .unwrap();
        assert_eq!(spec.id, "root");
        assert_eq!(spec.boot_nodes.len(), 1);
    }

    #[test]
    fn test_parse_spec_rejects_missing_fields() {
        let err = parse_spec("http://localhost:3000/json/x.json", r#"{"error":"File not found"}"#)
            .unwrap_err();
        assert!(matches!(err, CoreError::SpecFetch { .. }));
    }

    #[tokio::test]
    async fn test_unreachable_server_is_spec_fetch_error() {
        let fetcher = HttpSpecFetcher::new(Duration::from_millis(500)).unwrap();
        let err = fetcher
            .fetch("http://127.0.0.1:1/json/rootSpec.json")
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::SpecFetch { .. }));
    }
}
