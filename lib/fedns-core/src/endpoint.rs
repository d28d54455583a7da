//! Entry-point addressing

use crate::{CoreError, Result};
use serde::{Deserialize, Serialize};

/// Host and port extracted from a boot node multiaddress
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntryPoint {
    pub host: String,
    pub port: u16,
}

impl EntryPoint {
    /// Parse "/ip4/10.0.0.1/tcp/30333/p2p/<peer>".
    ///
    /// Host and port are taken positionally from segments 2 and 4.
    pub fn parse(address: &str) -> Result<Self> {
        let segments: Vec<&str> = address.split('/').collect();
        let (host, port) = match (segments.get(2), segments.get(4)) {
            (Some(host), Some(port)) if !host.is_empty() => (*host, *port),
            _ => {
                return Err(CoreError::Configuration(format!(
                    "malformed entry point address: {}",
                    address
                )))
            }
        };

        let port = port.parse::<u16>().map_err(|_| {
            CoreError::Configuration(format!("invalid port in entry point address: {}", address))
        })?;

        Ok(Self {
            host: host.to_string(),
            port,
        })
    }

    /// WebSocket URI the RPC collaborator connects to
    pub fn ws_uri(&self) -> String {
        format!("ws://{}:{}", self.host, self.port)
    }
}

/// Connection URI for a boot node address
pub fn connection_uri(address: &str) -> Result<String> {
    EntryPoint::parse(address).map(|entry| entry.ws_uri())
}
