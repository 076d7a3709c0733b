use crate::location::{ConnectionStatus, CurrentLocation, LocationUpdate};
use crate::storage::LocationRepository;
use anyhow::Result;
use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::info;


/// Result of a store mutation.
#[derive(Clone, Debug)]
pub struct UpsertOutcome {
    /// The row as it now stands
    pub row: CurrentLocation,
    /// Status before the mutation; None when the row was just created
    pub previous_status: Option<ConnectionStatus>,
}

impl UpsertOutcome {
    /// True when connection_status actually changed (including first creation),
    /// i.e. a presence-change event is due.
    pub fn transitioned(&self) -> bool {
        self.previous_status != Some(self.row.connection_status)
    }
}

/// Keyed single-row-per-agent store of latest position + presence state.
///
/// The DashMap gives per-row entry locking: concurrent upserts for different
/// agents never contend, and concurrent upserts for the same agent resolve
/// last-writer-wins in server receipt order. There is no global lock anywhere.
///
/// Rows are written through to the durable repository inside the entry lock,
/// so the in-memory and persisted row can never disagree on a per-agent basis.
/// Rows are created on an agent's first update and never deleted.
pub struct LocationStore {
    rows: DashMap<String, CurrentLocation>,
    repo: Option<Arc<dyn LocationRepository>>,
}

impl LocationStore {
    /// Memory-only store (tests, ephemeral runs).
    pub fn new() -> Self {
        Self {
            rows: DashMap::new(),
            repo: None,
        }
    }

    /// Store with durable write-through.
    pub fn with_repository(repo: Arc<dyn LocationRepository>) -> Self {
        Self {
            rows: DashMap::new(),
            repo: Some(repo),
        }
    }

    /// Reload persisted rows at startup. Stale ONLINE rows are left as-is —
    /// the sweeper demotes them on its first pass.
    pub fn load_persisted(&self) -> Result<usize> {
        let Some(repo) = &self.repo else {
            return Ok(0);
        };

        let rows = repo.load_all()?;
        let count = rows.len();
        for row in rows {
            self.rows.insert(row.agent_id.clone(), row);
        }

        info!(rows = count, "Loaded persisted location rows");
        Ok(count)
    }

    fn persist(&self, row: &CurrentLocation) -> Result<()> {
        if let Some(repo) = &self.repo {
            repo.save(row)?;
        }
        Ok(())
    }

    /// Apply a validated location update: overwrite the agent's row, mark it
    /// ONLINE, refresh last_update. Creates the row on first ingest.
    ///
    /// Single atomic entry operation — never mark-then-insert.
    pub fn upsert(&self, agent_id: &str, update: &LocationUpdate) -> Result<UpsertOutcome> {
        let now = Utc::now();
        let row = CurrentLocation {
            agent_id: agent_id.to_string(),
            latitude: update.latitude,
            longitude: update.longitude,
            accuracy: update.accuracy,
            altitude: update.altitude,
            speed: update.speed,
            bearing: update.bearing,
            address: update.location.clone(),
            battery_level: update.battery_level,
            is_charging: update.is_charging,
            connection_status: ConnectionStatus::Online,
            last_update: now,
        };

        match self.rows.entry(agent_id.to_string()) {
            Entry::Occupied(mut occupied) => {
                let previous_status = occupied.get().connection_status;
                self.persist(&row)?;
                *occupied.get_mut() = row.clone();
                Ok(UpsertOutcome {
                    row,
                    previous_status: Some(previous_status),
                })
            }
            Entry::Vacant(vacant) => {
                self.persist(&row)?;
                vacant.insert(row.clone());
                Ok(UpsertOutcome {
                    row,
                    previous_status: None,
                })
            }
        }
    }

    /// Apply an explicit status message.
    ///
    /// Returns None when there is nothing to apply (no row and the status is
    /// not ONLINE). A status frame may precede the agent's first fix; in that
    /// case the row starts at the origin until a location update arrives.
    pub fn record_status(
        &self,
        agent_id: &str,
        status: ConnectionStatus,
    ) -> Result<Option<UpsertOutcome>> {
        let now = Utc::now();

        match self.rows.entry(agent_id.to_string()) {
            Entry::Occupied(mut occupied) => {
                let previous_status = occupied.get().connection_status;
                let mut row = occupied.get().clone();
                row.connection_status = status;
                row.last_update = now;
                self.persist(&row)?;
                *occupied.get_mut() = row.clone();
                Ok(Some(UpsertOutcome {
                    row,
                    previous_status: Some(previous_status),
                }))
            }
            Entry::Vacant(vacant) => {
                if status != ConnectionStatus::Online {
                    return Ok(None);
                }
                let row = CurrentLocation {
                    agent_id: agent_id.to_string(),
                    latitude: 0.0,
                    longitude: 0.0,
                    accuracy: None,
                    altitude: None,
                    speed: None,
                    bearing: None,
                    address: None,
                    battery_level: None,
                    is_charging: None,
                    connection_status: ConnectionStatus::Online,
                    last_update: now,
                };
                self.persist(&row)?;
                vacant.insert(row.clone());
                Ok(Some(UpsertOutcome {
                    row,
                    previous_status: None,
                }))
            }
        }
    }

    /// Apply a ping: refresh last_update, promoting OFFLINE/DISCONNECTED back
    /// to ONLINE. A ping does not assert a location, so it cannot create a row;
    /// pings for unknown agents return None.
    pub fn record_ping(&self, agent_id: &str) -> Result<Option<UpsertOutcome>> {
        let Some(mut entry) = self.rows.get_mut(agent_id) else {
            return Ok(None);
        };

        let previous_status = entry.connection_status;
        let mut row = entry.clone();
        row.connection_status = ConnectionStatus::Online;
        row.last_update = Utc::now();
        self.persist(&row)?;
        *entry = row.clone();

        Ok(Some(UpsertOutcome {
            row,
            previous_status: Some(previous_status),
        }))
    }

    /// Compare-and-set demotion used by the sweeper.
    ///
    /// Demotes to OFFLINE only when the row is still ONLINE *and* last_update
    /// still equals the timestamp observed at scan time. A location update that
    /// raced in between leaves the row untouched — the fresh update wins.
    pub fn demote_if_stale(
        &self,
        agent_id: &str,
        observed_at: DateTime<Utc>,
    ) -> Result<Option<CurrentLocation>> {
        let Some(mut entry) = self.rows.get_mut(agent_id) else {
            return Ok(None);
        };

        if entry.connection_status != ConnectionStatus::Online || entry.last_update != observed_at {
            return Ok(None);
        }

        let mut row = entry.clone();
        row.connection_status = ConnectionStatus::Offline;
        row.last_update = Utc::now();
        self.persist(&row)?;
        *entry = row.clone();

        Ok(Some(row))
    }

    // ── snapshot queries ─────────────────────────────────────────────────────

    pub fn get(&self, agent_id: &str) -> Option<CurrentLocation> {
        self.rows.get(agent_id).map(|r| r.clone())
    }

    /// Rows for exactly the requested set; unknown ids are ignored.
    pub fn get_many(&self, ids: &HashSet<String>) -> Vec<CurrentLocation> {
        ids.iter()
            .filter_map(|id| self.rows.get(id).map(|r| r.clone()))
            .collect()
    }

    pub fn get_all(&self) -> Vec<CurrentLocation> {
        self.rows.iter().map(|r| r.value().clone()).collect()
    }

    pub fn get_online(&self) -> Vec<CurrentLocation> {
        self.rows
            .iter()
            .filter(|r| r.connection_status.is_online())
            .map(|r| r.value().clone())
            .collect()
    }

    pub fn get_online_many(&self, ids: &HashSet<String>) -> Vec<CurrentLocation> {
        ids.iter()
            .filter_map(|id| self.rows.get(id).map(|r| r.clone()))
            .filter(|r| r.connection_status.is_online())
            .collect()
    }

    pub fn count_online(&self) -> usize {
        self.rows
            .iter()
            .filter(|r| r.connection_status.is_online())
            .count()
    }

    pub fn count_online_many(&self, ids: &HashSet<String>) -> usize {
        ids.iter()
            .filter(|id| {
                self.rows
                    .get(*id)
                    .map(|r| r.connection_status.is_online())
                    .unwrap_or(false)
            })
            .count()
    }

    /// (agent_id, last_update) pairs for rows currently ONLINE. The sweeper
    /// scans this snapshot without holding any store-wide lock.
    pub fn online_snapshot(&self) -> Vec<(String, DateTime<Utc>)> {
        self.rows
            .iter()
            .filter(|r| r.connection_status.is_online())
            .map(|r| (r.key().clone(), r.last_update))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

impl Default for LocationStore {
    fn default() -> Self {
        Self::new()
    }
}
