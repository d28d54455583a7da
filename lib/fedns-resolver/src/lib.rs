//! Two-hop name resolution, registration writes and event relay
pub mod context;
pub mod listener;
pub mod metrics;
pub mod registrar;
pub mod resolver;

pub use context::{ClientConfig, RegistryContext};
pub use listener::EventListener;
pub use metrics::EngineMetrics;
pub use registrar::{AssetRegistrar, Inclusion};
pub use resolver::Resolver;
