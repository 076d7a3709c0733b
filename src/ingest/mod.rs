use crate::directory::AgentDirectory;
use crate::fanout::{FanoutHub, PositionTick, UnicastReply};
use crate::location::{validate_update, ConnectionStatus, LocationUpdate, ValidationError};
use crate::session::Session;
use crate::store::{LocationStore, UpsertOutcome};
use crate::auth::Role;
use std::sync::Arc;
use tracing::{info, warn};


/// Ingest failures
#[derive(Debug)]
pub enum IngestError {
    /// Message arrived on a missing or non-AGENT session. Silently dropped:
    /// no store mutation, no broadcast, no unicast reply.
    Unauthorized,
    /// Out-of-range coordinates; the sender gets a unicast error.
    Validation(ValidationError),
    /// Backing store unavailable; the sender gets a unicast error and the
    /// connection stays open for the next tick.
    Persistence(String),
}

impl std::fmt::Display for IngestError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            IngestError::Unauthorized => write!(f, "unauthorized"),
            IngestError::Validation(e) => write!(f, "{}", e),
            IngestError::Persistence(msg) => write!(f, "failed to persist location: {}", msg),
        }
    }
}

impl std::error::Error for IngestError {}

/// Applies inbound agent messages against the store and drives fan-out.
///
/// Identity always comes from the resolved session; payload-supplied identity
/// fields are never consulted.
pub struct IngestHandler {
    store: Arc<LocationStore>,
    hub: Arc<FanoutHub>,
    directory: Arc<dyn AgentDirectory>,
}

impl IngestHandler {
    pub fn new(
        store: Arc<LocationStore>,
        hub: Arc<FanoutHub>,
        directory: Arc<dyn AgentDirectory>,
    ) -> Self {
        Self {
            store,
            hub,
            directory,
        }
    }

    /// Require a live AGENT session; anything else is a silent drop.
    fn require_agent<'a>(&self, session: Option<&'a Session>) -> Result<&'a Session, IngestError> {
        let Some(session) = session else {
            warn!("Dropping message from unauthenticated connection");
            return Err(IngestError::Unauthorized);
        };
        match session.role {
            Role::Agent => Ok(session),
            Role::Master | Role::Admin => {
                warn!(
                    agent_id = %session.agent_id,
                    role = ?session.role,
                    "Dropping ingest message from non-agent session"
                );
                Err(IngestError::Unauthorized)
            }
        }
    }

    /// Handle a location update frame.
    ///
    /// On success the store is upserted (status ONLINE, fresh timestamp), the
    /// coordinates are mirrored into the agent directory (best-effort), the
    /// merged record is fanned out, and the sender gets a unicast confirmation.
    pub fn handle_location(
        &self,
        session: Option<&Session>,
        update: &LocationUpdate,
    ) -> Result<UpsertOutcome, IngestError> {
        let session = self.require_agent(session)?;
        let agent_id = session.agent_id.as_str();

        if let Err(e) = validate_update(update) {
            warn!(agent_id = %agent_id, error = %e, "Rejecting invalid location update");
            self.hub.send_to_agent(
                agent_id,
                UnicastReply::Error {
                    error: e.to_string(),
                },
            );
            return Err(IngestError::Validation(e));
        }

        let outcome = match self.store.upsert(agent_id, update) {
            Ok(outcome) => outcome,
            Err(e) => {
                warn!(agent_id = %agent_id, error = %e, "Location upsert failed");
                self.hub.send_to_agent(
                    agent_id,
                    UnicastReply::Error {
                        error: "failed to persist location".to_string(),
                    },
                );
                return Err(IngestError::Persistence(e.to_string()));
            }
        };

        // Write-through into the agent profile's last-known-location cache.
        // Best-effort: a directory failure never fails the ingest.
        if let Err(e) = self
            .directory
            .cache_last_location(agent_id, update.latitude, update.longitude)
        {
            warn!(agent_id = %agent_id, error = %e, "Failed to mirror location into directory");
        }

        info!(
            agent_id = %agent_id,
            latitude = update.latitude,
            longitude = update.longitude,
            "Ingested location update"
        );

        self.fan_out(&outcome);
        self.hub.send_to_agent(
            agent_id,
            UnicastReply::Ack {
                message: "location updated".to_string(),
            },
        );

        Ok(outcome)
    }

    /// Handle an explicit status frame (ONLINE / OFFLINE / DISCONNECTED).
    pub fn handle_status(
        &self,
        session: Option<&Session>,
        status: ConnectionStatus,
    ) -> Result<(), IngestError> {
        let session = self.require_agent(session)?;
        let agent_id = session.agent_id.as_str();

        match self.store.record_status(agent_id, status) {
            Ok(Some(outcome)) => {
                info!(agent_id = %agent_id, status = %status, "Applied status message");
                self.fan_out_presence_only(&outcome);
                Ok(())
            }
            Ok(None) => Ok(()),
            Err(e) => {
                warn!(agent_id = %agent_id, error = %e, "Status update failed");
                Err(IngestError::Persistence(e.to_string()))
            }
        }
    }

    /// Handle a ping frame: refresh the timestamp (promoting a non-ONLINE
    /// agent back to ONLINE) and reply with a pong.
    pub fn handle_ping(&self, session: Option<&Session>) -> Result<(), IngestError> {
        let session = self.require_agent(session)?;
        let agent_id = session.agent_id.as_str();

        match self.store.record_ping(agent_id) {
            Ok(Some(outcome)) => self.fan_out_presence_only(&outcome),
            Ok(None) => {} // no row yet; nothing to refresh
            Err(e) => {
                warn!(agent_id = %agent_id, error = %e, "Ping refresh failed");
            }
        }

        self.hub.send_to_agent(agent_id, UnicastReply::Pong);
        Ok(())
    }

    /// Transport-level disconnect detected by the gateway: an agent still
    /// marked ONLINE transitions to DISCONNECTED.
    pub fn handle_disconnect(&self, session: &Session) {
        if session.role != Role::Agent {
            return;
        }
        let agent_id = session.agent_id.as_str();

        let currently_online = self
            .store
            .get(agent_id)
            .map(|row| row.connection_status.is_online())
            .unwrap_or(false);
        if !currently_online {
            return;
        }

        match self
            .store
            .record_status(agent_id, ConnectionStatus::Disconnected)
        {
            Ok(Some(outcome)) => {
                info!(agent_id = %agent_id, "Agent disconnected");
                self.fan_out_presence_only(&outcome);
            }
            Ok(None) => {}
            Err(e) => {
                warn!(agent_id = %agent_id, error = %e, "Failed to record disconnect");
            }
        }
    }

    /// Publish the merged record on the position-tick topic and, when the
    /// status actually changed, on the presence-change topic as well.
    fn fan_out(&self, outcome: &UpsertOutcome) {
        let profile = self.directory.profile(&outcome.row.agent_id);
        let tick = PositionTick::merge(&outcome.row, profile.as_ref());

        self.hub.publish_position(tick.clone());
        if outcome.transitioned() {
            self.hub.publish_presence(tick);
        }
    }

    /// Presence-change publication without a position tick (status/ping paths
    /// mutate presence, not position).
    fn fan_out_presence_only(&self, outcome: &UpsertOutcome) {
        if !outcome.transitioned() {
            return;
        }
        let profile = self.directory.profile(&outcome.row.agent_id);
        self.hub
            .publish_presence(PositionTick::merge(&outcome.row, profile.as_ref()));
    }
}
