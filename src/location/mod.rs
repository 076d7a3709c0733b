use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

mod validation;

pub use validation::{validate_update, ValidationError};

/// Connectivity classification of an agent.
///
/// Wire representation matches the mobile client ("ONLINE" etc.).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConnectionStatus {
    #[serde(rename = "ONLINE")]
    Online,
    #[serde(rename = "OFFLINE")]
    Offline,
    #[serde(rename = "DISCONNECTED")]
    Disconnected,
}

impl ConnectionStatus {
    pub fn is_online(&self) -> bool {
        matches!(self, ConnectionStatus::Online)
    }
}

impl std::fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConnectionStatus::Online => write!(f, "ONLINE"),
            ConnectionStatus::Offline => write!(f, "OFFLINE"),
            ConnectionStatus::Disconnected => write!(f, "DISCONNECTED"),
        }
    }
}

/// The single latest known position/status record for one agent.
///
/// At most one live row exists per agent id. Rows are created on the agent's
/// first location ingest, never deleted, only overwritten in place. Every
/// mutation refreshes `last_update`.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CurrentLocation {
    pub agent_id: String,
    pub latitude: f64,
    pub longitude: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub accuracy: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub altitude: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub speed: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bearing: Option<f64>,
    /// Reverse-geocoded text, if the client supplied one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub battery_level: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_charging: Option<bool>,
    pub connection_status: ConnectionStatus,
    pub last_update: DateTime<Utc>,
}

/// Inbound location update payload from an agent client.
///
/// Identity is NOT part of this payload — the agent id always comes from the
/// authenticated session, never from client-asserted fields.
#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LocationUpdate {
    pub latitude: f64,
    pub longitude: f64,
    /// Reverse-geocoded address text.
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub accuracy: Option<f64>,
    #[serde(default)]
    pub altitude: Option<f64>,
    #[serde(default)]
    pub speed: Option<f64>,
    #[serde(default)]
    pub bearing: Option<f64>,
    #[serde(default)]
    pub battery_level: Option<u8>,
    #[serde(default)]
    pub is_charging: Option<bool>,
}
