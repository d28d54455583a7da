//! Round-robin rotation over a registry's entry points

use crate::{CoreError, Result};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;

/// Rotation context: the root registry, or one second-level registry identity
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum Scope {
    Root,
    Registry(String),
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scope::Root => write!(f, "root"),
            Scope::Registry(id) => write!(f, "registry:{}", id),
        }
    }
}

/// EndpointRotator keeps one rotating index per scope.
///
/// Picking the current index and advancing it are separate critical
/// sections, so concurrent callers may briefly share an index before it moves
/// on. Second-level scopes are created on first use and never removed.
pub struct EndpointRotator {
    root: Arc<RwLock<usize>>,
    scopes: RwLock<HashMap<String, Arc<RwLock<usize>>>>,
}

impl EndpointRotator {
    pub fn new() -> Self {
        Self {
            root: Arc::new(RwLock::new(0)),
            scopes: RwLock::new(HashMap::new()),
        }
    }

    async fn state(&self, scope: &Scope) -> Arc<RwLock<usize>> {
        let id = match scope {
            Scope::Root => return self.root.clone(),
            Scope::Registry(id) => id,
        };

        if let Some(state) = self.scopes.read().await.get(id) {
            return state.clone();
        }

        let mut scopes = self.scopes.write().await;
        scopes
            .entry(id.clone())
            .or_insert_with(|| {
                debug!("Created rotation scope for registry {}", id);
                Arc::new(RwLock::new(0))
            })
            .clone()
    }

    /// Index to use for the next request in `scope`, without advancing
    pub async fn current_index(&self, scope: &Scope, entry_points: usize) -> Result<usize> {
        check_entry_points(scope, entry_points)?;
        let state = self.state(scope).await;
        let current = *state.read().await;
        Ok(current % entry_points)
    }

    /// Advance `scope` by one and return the new index
    pub async fn next_index(&self, scope: &Scope, entry_points: usize) -> Result<usize> {
        check_entry_points(scope, entry_points)?;
        let state = self.state(scope).await;
        let mut current = state.write().await;
        *current = (*current + 1) % entry_points;
        Ok(*current)
    }

    /// Whether a second-level scope exists for `identity`
    pub async fn has_scope(&self, identity: &str) -> bool {
        self.scopes.read().await.contains_key(identity)
    }

    /// Number of second-level scopes created so far
    pub async fn scope_count(&self) -> usize {
        self.scopes.read().await.len()
    }
}

impl Default for EndpointRotator {
    fn default() -> Self {
        Self::new()
    }
}

fn check_entry_points(scope: &Scope, entry_points: usize) -> Result<()> {
    if entry_points == 0 {
        return Err(CoreError::Configuration(format!(
            "scope {} has no entry points",
            scope
        )));
    }
    Ok(())
}
