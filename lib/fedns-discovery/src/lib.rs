//! Registry descriptor discovery over HTTP
pub mod client;
pub mod fetcher;

pub use client::DescriptorClient;
pub use fetcher::HttpSpecFetcher;
