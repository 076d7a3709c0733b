use crate::directory::AgentProfile;
use crate::location::{ConnectionStatus, CurrentLocation};
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::Serialize;
use tokio::sync::{broadcast, mpsc};


/// Merged record published on the position-tick and presence-change topics:
/// the agent's current location plus display fields from the agent directory.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PositionTick {
    pub agent_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub agent_first_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub agent_last_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub agent_mobile: Option<String>,
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
    #[serde(skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    pub connection_status: ConnectionStatus,
    pub last_update: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub battery_level: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_charging: Option<bool>,
    pub is_online: bool,
}

impl PositionTick {
    /// Merge a store row with directory display fields.
    pub fn merge(row: &CurrentLocation, profile: Option<&AgentProfile>) -> Self {
        Self {
            agent_id: row.agent_id.clone(),
            agent_first_name: profile.and_then(|p| p.first_name.clone()),
            agent_last_name: profile.and_then(|p| p.last_name.clone()),
            agent_mobile: profile.and_then(|p| p.mobile.clone()),
            latitude: row.latitude,
            longitude: row.longitude,
            accuracy: row.accuracy,
            altitude: row.altitude,
            speed: row.speed,
            bearing: row.bearing,
            address: row.address.clone(),
            connection_status: row.connection_status,
            last_update: row.last_update,
            battery_level: row.battery_level,
            is_charging: row.is_charging,
            is_online: row.connection_status.is_online(),
        }
    }
}

/// Server → Client unicast reply, addressed to one resolved agent identity.
#[derive(Clone, Debug, Serialize)]
#[serde(tag = "type")]
pub enum UnicastReply {
    /// Ingest confirmation
    #[serde(rename = "ack")]
    Ack { message: String },
    /// Ingest rejection (validation or persistence failure)
    #[serde(rename = "error")]
    Error { error: String },
    /// Ping reply
    #[serde(rename = "pong")]
    Pong,
}

/// Broadcast topics plus the unicast reply registry.
///
/// Publication is fire-and-forget: a full, lagging, or absent subscriber never
/// blocks or fails the ingest path. Late subscribers see only future ticks —
/// there is no replay.
pub struct FanoutHub {
    /// Every successful ingest's merged record, at-most-once
    position_tx: broadcast::Sender<PositionTick>,
    /// Emitted only when connection_status actually transitions
    presence_tx: broadcast::Sender<PositionTick>,
    /// agent_id → reply channel for that agent's live connection
    unicast: DashMap<String, mpsc::UnboundedSender<UnicastReply>>,
}

impl FanoutHub {
    pub fn new() -> Self {
        let (position_tx, _) = broadcast::channel(1000);
        let (presence_tx, _) = broadcast::channel(100);

        Self {
            position_tx,
            presence_tx,
            unicast: DashMap::new(),
        }
    }

    pub fn subscribe_positions(&self) -> broadcast::Receiver<PositionTick> {
        self.position_tx.subscribe()
    }

    pub fn subscribe_presence(&self) -> broadcast::Receiver<PositionTick> {
        self.presence_tx.subscribe()
    }

    /// Publish a position tick. Send errors (no subscribers) are ignored.
    pub fn publish_position(&self, tick: PositionTick) {
        let _ = self.position_tx.send(tick);
    }

    /// Publish a presence-change event. Send errors are ignored.
    pub fn publish_presence(&self, tick: PositionTick) {
        let _ = self.presence_tx.send(tick);
    }

    /// Register the unicast reply channel for an agent's connection.
    ///
    /// A reconnecting agent replaces the previous channel; the stale channel's
    /// receiver is dropped with its connection and sends to it fail silently.
    /// The returned sender handle is only used to identify this registration
    /// at unregister time.
    pub fn register_unicast(
        &self,
        agent_id: &str,
    ) -> (
        mpsc::UnboundedSender<UnicastReply>,
        mpsc::UnboundedReceiver<UnicastReply>,
    ) {
        let (tx, rx) = mpsc::unbounded_channel();
        self.unicast.insert(agent_id.to_string(), tx.clone());
        (tx, rx)
    }

    /// Drop an agent's unicast channel, but only if it is still the one
    /// registered by this connection — a reconnect may already have replaced it.
    pub fn unregister_unicast(&self, agent_id: &str, tx: &mpsc::UnboundedSender<UnicastReply>) {
        self.unicast
            .remove_if(agent_id, |_, current| current.same_channel(tx));
    }

    /// Best-effort unicast to one agent. Returns false when the agent has no
    /// live connection or the connection is tearing down.
    pub fn send_to_agent(&self, agent_id: &str, reply: UnicastReply) -> bool {
        match self.unicast.get(agent_id) {
            Some(tx) => tx.send(reply).is_ok(),
            None => false,
        }
    }

    pub fn connected_agents(&self) -> usize {
        self.unicast.len()
    }
}

impl Default for FanoutHub {
    fn default() -> Self {
        Self::new()
    }
}
