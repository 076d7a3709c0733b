use crate::auth::{Identity, Role};
use crate::fanout::{FanoutHub, PositionTick, UnicastReply};
use crate::ingest::IngestHandler;
use crate::location::{ConnectionStatus, LocationUpdate};
use crate::scope::{resolve_scope, AgentOwnership, Scope};
use crate::session::{Session, SessionRegistry};
use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    http::StatusCode,
    middleware,
    response::{IntoResponse, Response},
    routing::get,
    Extension, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::{error, info, warn};

use super::auth_middleware::{authenticate, AuthLayerState};

/// Client → Server frames on the agent socket
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type")]
pub enum ClientFrame {
    #[serde(rename = "location")]
    Location(LocationUpdate),
    #[serde(rename = "status")]
    Status { status: ConnectionStatus },
    #[serde(rename = "ping")]
    Ping,
}

/// Server → Client frames on the dashboard socket
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type")]
pub enum DashboardFrame {
    /// Every successful ingest's merged record
    #[serde(rename = "position")]
    Position(PositionTick),
    /// Emitted only on an actual presence transition
    #[serde(rename = "presence")]
    Presence(PositionTick),
}

/// Shared state for the WebSocket gateway
pub struct GatewayState {
    pub sessions: Arc<SessionRegistry>,
    pub hub: Arc<FanoutHub>,
    pub ingest: Arc<IngestHandler>,
    pub ownership: Arc<dyn AgentOwnership>,
    /// Keep-alive ping interval for agent sockets
    pub heartbeat_interval: Duration,
}

/// Create the gateway router with the bearer-auth layer applied.
///
/// Auth runs as a tower layer BEFORE WebSocket upgrade extraction, so a
/// missing or invalid token is refused with 401 and no session is created.
pub fn create_gateway_router(state: Arc<GatewayState>, auth: Arc<AuthLayerState>) -> Router {
    Router::new()
        .route("/api/agent/ws", get(agent_ws_handler))
        .route("/api/dashboard/ws", get(dashboard_ws_handler))
        .route_layer(middleware::from_fn_with_state(auth, authenticate))
        .with_state(state)
}

/// GET /api/agent/ws - agent connection upgrade
async fn agent_ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<GatewayState>>,
    Extension(identity): Extension<Identity>,
) -> Response {
    match identity.role {
        Role::Agent => {}
        Role::Master | Role::Admin => {
            return (StatusCode::FORBIDDEN, "agent endpoint requires AGENT role").into_response();
        }
    }

    info!(agent_id = %identity.agent_id, "Agent WebSocket upgrade");
    ws.on_upgrade(move |socket| handle_agent_socket(socket, state, identity))
}

/// GET /api/dashboard/ws - dashboard subscriber upgrade
async fn dashboard_ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<GatewayState>>,
    Extension(identity): Extension<Identity>,
) -> Response {
    let scope = match resolve_scope(&identity, state.ownership.as_ref()) {
        Ok(scope) => scope,
        Err(e) => return (StatusCode::FORBIDDEN, e.to_string()).into_response(),
    };

    info!(subscriber = %identity.agent_id, "Dashboard WebSocket upgrade");
    ws.on_upgrade(move |socket| handle_dashboard_socket(socket, state, scope))
}

/// Per-connection loop for an authenticated agent.
///
/// The session is created from the verified token before the first frame and
/// torn down when the socket closes; an in-flight ingest completing after
/// close still lands in the store, only the unicast reply is lost.
async fn handle_agent_socket(mut socket: WebSocket, state: Arc<GatewayState>, identity: Identity) {
    let agent_id = identity.agent_id.clone();
    let conn = state.sessions.next_connection_id();
    state.sessions.insert(conn, Session::from(identity));

    let (unicast_tx, mut unicast_rx) = state.hub.register_unicast(&agent_id);

    let mut heartbeat = tokio::time::interval(state.heartbeat_interval);
    heartbeat.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    heartbeat.tick().await; // first tick completes immediately

    loop {
        tokio::select! {
            msg = socket.recv() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        // Identity is resolved through the registry on every
                        // frame, never taken from the payload
                        let session = state.sessions.get(conn);
                        dispatch_frame(&state.ingest, session.as_ref(), &text);
                    }
                    Some(Ok(Message::Close(_))) | None => {
                        info!(agent_id = %agent_id, "Agent disconnected");
                        break;
                    }
                    Some(Ok(Message::Ping(data))) => {
                        if socket.send(Message::Pong(data)).await.is_err() {
                            break;
                        }
                    }
                    Some(Ok(_)) => {
                        // Ignore binary, pong messages
                    }
                    Some(Err(e)) => {
                        warn!(agent_id = %agent_id, error = %e, "WebSocket error");
                        break;
                    }
                }
            }

            reply = unicast_rx.recv() => {
                match reply {
                    Some(reply) => {
                        match serde_json::to_string(&reply) {
                            Ok(json) => {
                                if socket.send(Message::Text(json)).await.is_err() {
                                    break;
                                }
                            }
                            Err(e) => error!(error = %e, "Failed to serialize unicast reply"),
                        }
                    }
                    None => break,
                }
            }

            _ = heartbeat.tick() => {
                if socket.send(Message::Ping(Vec::new())).await.is_err() {
                    warn!(agent_id = %agent_id, "Keep-alive ping failed");
                    break;
                }
            }
        }
    }

    // Teardown: session entry first, then the presence transition
    if let Some(session) = state.sessions.remove(conn) {
        state.ingest.handle_disconnect(&session);
    }
    state.hub.unregister_unicast(&agent_id, &unicast_tx);
}

/// Parse and route one inbound agent frame.
fn dispatch_frame(ingest: &IngestHandler, session: Option<&Session>, text: &str) {
    let frame: ClientFrame = match serde_json::from_str(text) {
        Ok(frame) => frame,
        Err(e) => {
            warn!(error = %e, "Dropping malformed client frame");
            return;
        }
    };

    // Handlers log and unicast their own failures; dropped/unauthorized
    // frames are deliberately silent on the wire.
    let _ = match frame {
        ClientFrame::Location(update) => ingest
            .handle_location(session, &update)
            .map(|_| ()),
        ClientFrame::Status { status } => ingest.handle_status(session, status),
        ClientFrame::Ping => ingest.handle_ping(session),
    };
}

/// Per-connection loop for a dashboard subscriber: forwards position ticks
/// and presence changes the subscriber's scope permits.
async fn handle_dashboard_socket(mut socket: WebSocket, state: Arc<GatewayState>, scope: Scope) {
    let mut positions = state.hub.subscribe_positions();
    let mut presence = state.hub.subscribe_presence();

    loop {
        tokio::select! {
            msg = socket.recv() => {
                match msg {
                    Some(Ok(Message::Close(_))) | None => {
                        info!("Dashboard subscriber disconnected");
                        break;
                    }
                    Some(Ok(Message::Ping(data))) => {
                        if socket.send(Message::Pong(data)).await.is_err() {
                            break;
                        }
                    }
                    Some(Ok(_)) => {
                        // Dashboards only listen; inbound text is ignored
                    }
                    Some(Err(e)) => {
                        warn!(error = %e, "Dashboard WebSocket error");
                        break;
                    }
                }
            }

            tick = positions.recv() => {
                if !forward(&mut socket, tick, &scope, DashboardFrame::Position).await {
                    break;
                }
            }

            event = presence.recv() => {
                if !forward(&mut socket, event, &scope, DashboardFrame::Presence).await {
                    break;
                }
            }
        }
    }
}

/// Forward one broadcast item if the scope permits it. Returns false when the
/// connection should be torn down.
async fn forward(
    socket: &mut WebSocket,
    received: Result<PositionTick, broadcast::error::RecvError>,
    scope: &Scope,
    wrap: fn(PositionTick) -> DashboardFrame,
) -> bool {
    match received {
        Ok(tick) => {
            if !scope.permits(&tick.agent_id) {
                return true;
            }
            let frame = wrap(tick);
            match serde_json::to_string(&frame) {
                Ok(json) => socket.send(Message::Text(json)).await.is_ok(),
                Err(e) => {
                    error!(error = %e, "Failed to serialize dashboard frame");
                    true
                }
            }
        }
        Err(broadcast::error::RecvError::Lagged(skipped)) => {
            // Dashboards see gaps, not error signals, when they fall behind
            warn!(skipped = skipped, "Dashboard subscriber lagged, skipped updates");
            true
        }
        Err(broadcast::error::RecvError::Closed) => {
            error!("Broadcast topic closed");
            false
        }
    }
}
