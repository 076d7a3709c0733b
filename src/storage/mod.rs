//! Durable current-location rows backed by SQLite.
//!
//! The in-memory store is authoritative while the process runs; this layer
//! keeps one durable row per agent so state survives restarts. The backing
//! store is a collaborator behind [`LocationRepository`] — the rest of the
//! service never touches SQL.

use crate::location::{ConnectionStatus, CurrentLocation};
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection};
use std::path::Path;
use std::sync::Mutex;

/// Backing store for current-location rows (one row per agent).
pub trait LocationRepository: Send + Sync {
    /// Persist the row, replacing any previous row for the same agent.
    fn save(&self, row: &CurrentLocation) -> Result<()>;

    /// Load every persisted row (used once at startup).
    fn load_all(&self) -> Result<Vec<CurrentLocation>>;
}

/// SQLite-backed repository.
///
/// # Schema
/// ```sql
/// CREATE TABLE agent_locations (
///     agent_id TEXT PRIMARY KEY,
///     latitude REAL NOT NULL,
///     longitude REAL NOT NULL,
///     accuracy REAL,
///     altitude REAL,
///     speed REAL,
///     bearing REAL,
///     address TEXT,
///     battery_level INTEGER,
///     is_charging INTEGER,
///     connection_status TEXT NOT NULL,
///     last_update TEXT NOT NULL       -- ISO 8601 timestamp
/// );
/// ```
///
/// # Thread Safety
/// - Connection is wrapped in Mutex for safe concurrent access
/// - SQLite itself is thread-safe with serialized mode
pub struct SqliteLocationRepository {
    conn: Mutex<Connection>,
}

impl SqliteLocationRepository {
    /// Creates or opens the repository at `db_path`.
    pub fn new<P: AsRef<Path>>(db_path: P) -> Result<Self> {
        let conn = Connection::open(db_path).context("Failed to open database")?;

        conn.execute(
            r#"
            CREATE TABLE IF NOT EXISTS agent_locations (
                agent_id TEXT PRIMARY KEY,
                latitude REAL NOT NULL,
                longitude REAL NOT NULL,
                accuracy REAL,
                altitude REAL,
                speed REAL,
                bearing REAL,
                address TEXT,
                battery_level INTEGER,
                is_charging INTEGER,
                connection_status TEXT NOT NULL,
                last_update TEXT NOT NULL
            )
            "#,
            [],
        )
        .context("Failed to create agent_locations table")?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// In-memory database, for tests.
    pub fn in_memory() -> Result<Self> {
        Self::new(":memory:")
    }
}

impl LocationRepository for SqliteLocationRepository {
    fn save(&self, row: &CurrentLocation) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            r#"
            INSERT INTO agent_locations (
                agent_id, latitude, longitude, accuracy, altitude, speed,
                bearing, address, battery_level, is_charging,
                connection_status, last_update
            )
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)
            ON CONFLICT(agent_id) DO UPDATE SET
                latitude = excluded.latitude,
                longitude = excluded.longitude,
                accuracy = excluded.accuracy,
                altitude = excluded.altitude,
                speed = excluded.speed,
                bearing = excluded.bearing,
                address = excluded.address,
                battery_level = excluded.battery_level,
                is_charging = excluded.is_charging,
                connection_status = excluded.connection_status,
                last_update = excluded.last_update
            "#,
            params![
                row.agent_id,
                row.latitude,
                row.longitude,
                row.accuracy,
                row.altitude,
                row.speed,
                row.bearing,
                row.address,
                row.battery_level,
                row.is_charging,
                status_to_str(row.connection_status),
                row.last_update.to_rfc3339(),
            ],
        )
        .context("Failed to persist location row")?;

        Ok(())
    }

    fn load_all(&self) -> Result<Vec<CurrentLocation>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn
            .prepare(
                r#"
                SELECT agent_id, latitude, longitude, accuracy, altitude, speed,
                       bearing, address, battery_level, is_charging,
                       connection_status, last_update
                FROM agent_locations
                "#,
            )
            .context("Failed to prepare load query")?;

        let rows = stmt
            .query_map([], |row| {
                let status: String = row.get(10)?;
                let last_update: String = row.get(11)?;
                Ok(CurrentLocation {
                    agent_id: row.get(0)?,
                    latitude: row.get(1)?,
                    longitude: row.get(2)?,
                    accuracy: row.get(3)?,
                    altitude: row.get(4)?,
                    speed: row.get(5)?,
                    bearing: row.get(6)?,
                    address: row.get(7)?,
                    battery_level: row.get(8)?,
                    is_charging: row.get(9)?,
                    connection_status: status_from_str(&status),
                    last_update: parse_timestamp(&last_update),
                })
            })
            .context("Failed to query location rows")?;

        let mut locations = Vec::new();
        for row in rows {
            locations.push(row.context("Failed to read location row")?);
        }

        Ok(locations)
    }
}

fn status_to_str(status: ConnectionStatus) -> &'static str {
    match status {
        ConnectionStatus::Online => "ONLINE",
        ConnectionStatus::Offline => "OFFLINE",
        ConnectionStatus::Disconnected => "DISCONNECTED",
    }
}

/// Unknown strings map to DISCONNECTED rather than failing the whole load.
fn status_from_str(s: &str) -> ConnectionStatus {
    match s {
        "ONLINE" => ConnectionStatus::Online,
        "OFFLINE" => ConnectionStatus::Offline,
        _ => ConnectionStatus::Disconnected,
    }
}

fn parse_timestamp(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(agent_id: &str, lat: f64, lon: f64, status: ConnectionStatus) -> CurrentLocation {
        CurrentLocation {
            agent_id: agent_id.to_string(),
            latitude: lat,
            longitude: lon,
            accuracy: Some(5.0),
            altitude: None,
            speed: None,
            bearing: Some(270.0),
            address: Some("MG Road".to_string()),
            battery_level: Some(55),
            is_charging: Some(true),
            connection_status: status,
            last_update: Utc::now(),
        }
    }

    #[test]
    fn test_save_and_load_round_trip() {
        let repo = SqliteLocationRepository::in_memory().unwrap();
        repo.save(&row("A001", 19.076, 72.8777, ConnectionStatus::Online))
            .unwrap();

        let loaded = repo.load_all().unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].agent_id, "A001");
        assert_eq!(loaded[0].latitude, 19.076);
        assert_eq!(loaded[0].longitude, 72.8777);
        assert_eq!(loaded[0].battery_level, Some(55));
        assert_eq!(loaded[0].connection_status, ConnectionStatus::Online);
    }

    #[test]
    fn test_save_overwrites_existing_row() {
        let repo = SqliteLocationRepository::in_memory().unwrap();
        repo.save(&row("A001", 19.076, 72.8777, ConnectionStatus::Online))
            .unwrap();
        repo.save(&row("A001", 18.52, 73.8567, ConnectionStatus::Offline))
            .unwrap();

        let loaded = repo.load_all().unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].latitude, 18.52);
        assert_eq!(loaded[0].connection_status, ConnectionStatus::Offline);
    }

    #[test]
    fn test_one_row_per_agent() {
        let repo = SqliteLocationRepository::in_memory().unwrap();
        repo.save(&row("A001", 19.0, 72.0, ConnectionStatus::Online))
            .unwrap();
        repo.save(&row("A002", 28.6, 77.2, ConnectionStatus::Online))
            .unwrap();

        let loaded = repo.load_all().unwrap();
        assert_eq!(loaded.len(), 2);
    }

    #[test]
    fn test_persists_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("locations.db");

        {
            let repo = SqliteLocationRepository::new(&path).unwrap();
            repo.save(&row("A001", 19.076, 72.8777, ConnectionStatus::Online))
                .unwrap();
        }

        let repo = SqliteLocationRepository::new(&path).unwrap();
        let loaded = repo.load_all().unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].agent_id, "A001");
    }
}
