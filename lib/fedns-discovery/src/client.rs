//! HTTP client for the registry descriptor server

use std::time::Duration;

/// DescriptorClient wraps the HTTP client used to reach the descriptor server
#[derive(Clone)]
pub struct DescriptorClient {
    client: reqwest::Client,
}

impl DescriptorClient {
    /// Create a new descriptor client with a per-request timeout
    pub fn new(timeout: Duration) -> reqwest::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .pool_idle_timeout(Duration::from_secs(30))
            .build()?;
        Ok(Self { client })
    }

    /// Get the underlying HTTP client
    pub fn inner(&self) -> &reqwest::Client {
        &self.client
    }
}
