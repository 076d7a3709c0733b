use serde::Deserialize;
use std::time::Duration;

/// Complete fieldtrack configuration
#[derive(Debug, Clone, Deserialize, Default)]
pub struct FieldtrackConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub auth: AuthConfig,
    #[serde(default)]
    pub presence: PresenceConfig,
    #[serde(default)]
    pub storage: StorageConfig,
}

/// Server configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,
    /// WebSocket keep-alive ping interval (seconds). Keeps idle-but-alive
    /// connections from being mistaken for failures by the transport layer.
    #[serde(default = "default_heartbeat_interval")]
    pub heartbeat_interval_seconds: u64,
}

fn default_bind_addr() -> String {
    "0.0.0.0:8090".to_string()
}

fn default_heartbeat_interval() -> u64 {
    20
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: default_bind_addr(),
            heartbeat_interval_seconds: default_heartbeat_interval(),
        }
    }
}

/// Auth configuration
#[derive(Debug, Clone, Deserialize)]
pub struct AuthConfig {
    /// HS256 signing secret shared with the token-issuing admin subsystem.
    /// Overridable via FIELDTRACK_JWT_SECRET.
    #[serde(default = "default_jwt_secret")]
    pub jwt_secret: String,
}

fn default_jwt_secret() -> String {
    "change-me".to_string()
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            jwt_secret: default_jwt_secret(),
        }
    }
}

/// Presence configuration
#[derive(Debug, Clone, Deserialize)]
pub struct PresenceConfig {
    /// ONLINE rows older than this are demoted to OFFLINE by the sweeper.
    /// Must be strictly greater than the expected agent update interval.
    #[serde(default = "default_stale_after")]
    pub stale_after_seconds: i64,
    /// How often the sweeper scans for stale rows (seconds)
    #[serde(default = "default_sweep_interval")]
    pub sweep_interval_seconds: u64,
}

fn default_stale_after() -> i64 {
    15
}

fn default_sweep_interval() -> u64 {
    30
}

impl Default for PresenceConfig {
    fn default() -> Self {
        Self {
            stale_after_seconds: default_stale_after(),
            sweep_interval_seconds: default_sweep_interval(),
        }
    }
}

impl PresenceConfig {
    pub fn stale_after(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.stale_after_seconds)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_seconds)
    }
}

/// Storage configuration
#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    #[serde(default = "default_db_path")]
    pub db_path: String,
}

fn default_db_path() -> String {
    "fieldtrack.db".to_string()
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
        }
    }
}

/// Load configuration from TOML file
pub fn load_config(path: &str) -> Result<FieldtrackConfig, Box<dyn std::error::Error>> {
    let contents = std::fs::read_to_string(path)?;
    let config: FieldtrackConfig = toml::from_str(&contents)?;
    Ok(config)
}
