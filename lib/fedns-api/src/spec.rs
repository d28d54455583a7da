//! Registry descriptors

use serde::{Deserialize, Serialize};
use std::fmt;

/// Descriptor of one registry: its identity and the entry points it can be reached through.
///
/// The descriptor server returns a full chain spec document; only `id` and
/// `bootNodes` are read, everything else is ignored.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistrySpec {
    pub id: String,
    #[serde(rename = "bootNodes")]
    pub boot_nodes: Vec<String>,
}

impl RegistrySpec {
    pub fn new(id: impl Into<String>, boot_nodes: Vec<String>) -> Self {
        Self {
            id: id.into(),
            boot_nodes,
        }
    }

    /// Number of entry points
    pub fn entry_point_count(&self) -> usize {
        self.boot_nodes.len()
    }

    /// Entry point address at `index`
    pub fn entry_point(&self, index: usize) -> Option<&str> {
        self.boot_nodes.get(index).map(String::as_str)
    }
}

/// Role a descriptor plays in the federation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum RegistryRole {
    /// Maps top-level labels to second-level registries
    Root,
    /// Maps full domain names to endpoint records
    SecondLevel,
}

impl fmt::Display for RegistryRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RegistryRole::Root => write!(f, "root"),
            RegistryRole::SecondLevel => write!(f, "second-level"),
        }
    }
}
