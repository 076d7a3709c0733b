use anyhow::Result;
use dashmap::DashMap;

/// Display fields for an agent, owned by the admin subsystem.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct AgentProfile {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub mobile: Option<String>,
}

/// Read-mostly view of the external agent profile store.
///
/// `cache_last_location` is a best-effort write-through into the profile's
/// last-known-location cache; a failure here never fails an ingest.
pub trait AgentDirectory: Send + Sync {
    fn profile(&self, agent_id: &str) -> Option<AgentProfile>;

    fn cache_last_location(&self, agent_id: &str, latitude: f64, longitude: f64) -> Result<()>;
}

/// In-memory directory.
///
/// The production deployment backs this trait with the admin database; the
/// in-memory form serves standalone runs and tests.
pub struct InMemoryDirectory {
    profiles: DashMap<String, AgentProfile>,
    last_locations: DashMap<String, (f64, f64)>,
}

impl InMemoryDirectory {
    pub fn new() -> Self {
        Self {
            profiles: DashMap::new(),
            last_locations: DashMap::new(),
        }
    }

    pub fn insert_profile(&self, agent_id: &str, profile: AgentProfile) {
        self.profiles.insert(agent_id.to_string(), profile);
    }

    pub fn cached_location(&self, agent_id: &str) -> Option<(f64, f64)> {
        self.last_locations.get(agent_id).map(|v| *v)
    }
}

impl Default for InMemoryDirectory {
    fn default() -> Self {
        Self::new()
    }
}

impl AgentDirectory for InMemoryDirectory {
    fn profile(&self, agent_id: &str) -> Option<AgentProfile> {
        self.profiles.get(agent_id).map(|p| p.clone())
    }

    fn cache_last_location(&self, agent_id: &str, latitude: f64, longitude: f64) -> Result<()> {
        self.last_locations
            .insert(agent_id.to_string(), (latitude, longitude));
        Ok(())
    }
}
