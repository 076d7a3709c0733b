use crate::auth::{Identity, Role};
use dashmap::DashMap;
use std::collections::HashSet;


/// Mapping agentId → owning sub-admin, maintained by the admin subsystem.
/// Read-only from this service.
pub trait AgentOwnership: Send + Sync {
    /// The set of agent ids created by (and visible to) the given sub-admin.
    fn owned_agents(&self, admin_id: &str) -> HashSet<String>;
}

/// Visibility scope for store queries.
#[derive(Clone, Debug, PartialEq)]
pub enum Scope {
    /// MASTER: no restriction
    All,
    /// ADMIN: restricted to the owned-agent set
    Ids(HashSet<String>),
}

impl Scope {
    pub fn permits(&self, agent_id: &str) -> bool {
        match self {
            Scope::All => true,
            Scope::Ids(ids) => ids.contains(agent_id),
        }
    }

    /// Intersect this scope with an optional caller-requested id set.
    ///
    /// Returns the effective id set, or None for "everything". Snapshot pulls
    /// and counts both go through this, so the two can never disagree.
    pub fn restrict(&self, requested: Option<HashSet<String>>) -> Option<HashSet<String>> {
        match (self, requested) {
            (Scope::All, requested) => requested,
            (Scope::Ids(owned), None) => Some(owned.clone()),
            (Scope::Ids(owned), Some(requested)) => {
                Some(requested.intersection(owned).cloned().collect())
            }
        }
    }
}

/// Scoping errors
#[derive(Debug, Clone, PartialEq)]
pub enum ScopeError {
    /// The caller's role has no access to the query interface
    Forbidden,
}

impl std::fmt::Display for ScopeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ScopeError::Forbidden => write!(f, "role is not permitted to query agent locations"),
        }
    }
}

impl std::error::Error for ScopeError {}

/// Resolve the visibility scope for a requesting identity.
///
/// MASTER bypasses scoping entirely; ADMIN is restricted to the owned set;
/// AGENT has no access to the dashboard query surface.
pub fn resolve_scope(
    identity: &Identity,
    ownership: &dyn AgentOwnership,
) -> Result<Scope, ScopeError> {
    match identity.role {
        Role::Master => Ok(Scope::All),
        Role::Admin => Ok(Scope::Ids(ownership.owned_agents(&identity.agent_id))),
        Role::Agent => Err(ScopeError::Forbidden),
    }
}

/// In-memory ownership mapping (tests, standalone runs).
pub struct InMemoryOwnership {
    owned: DashMap<String, HashSet<String>>,
}

impl InMemoryOwnership {
    pub fn new() -> Self {
        Self {
            owned: DashMap::new(),
        }
    }

    pub fn assign(&self, admin_id: &str, agent_id: &str) {
        self.owned
            .entry(admin_id.to_string())
            .or_default()
            .insert(agent_id.to_string());
    }
}

impl Default for InMemoryOwnership {
    fn default() -> Self {
        Self::new()
    }
}

impl AgentOwnership for InMemoryOwnership {
    fn owned_agents(&self, admin_id: &str) -> HashSet<String> {
        self.owned
            .get(admin_id)
            .map(|set| set.clone())
            .unwrap_or_default()
    }
}
