use crate::auth::{Identity, Role};
use crate::ingest::{IngestError, IngestHandler};
use crate::location::LocationUpdate;
use crate::session::Session;
use axum::{
    extract::State,
    http::StatusCode,
    middleware,
    response::{IntoResponse, Json, Response},
    routing::post,
    Extension, Router,
};
use serde::Serialize;
use std::sync::Arc;
use tracing::info;

use super::auth_middleware::{authenticate, AuthLayerState};

/// Shared state for the fallback ingest API
pub struct IngestAppState {
    pub ingest: Arc<IngestHandler>,
}

/// Success response for a fallback ingest
#[derive(Serialize)]
struct AckResponse {
    message: String,
}

/// Error response
#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}

/// Create the framed-fallback ingest router.
///
/// Clients that cannot hold a long-lived socket POST the same location
/// payload here; the HTTP response body carries what would have been the
/// unicast reply on the socket.
pub fn create_ingest_router(state: Arc<IngestAppState>, auth: Arc<AuthLayerState>) -> Router {
    Router::new()
        .route("/api/agent/location", post(submit_location))
        .route_layer(middleware::from_fn_with_state(auth, authenticate))
        .with_state(state)
}

/// POST /api/agent/location - one-shot location update
async fn submit_location(
    State(state): State<Arc<IngestAppState>>,
    Extension(identity): Extension<Identity>,
    Json(update): Json<LocationUpdate>,
) -> Result<Json<AckResponse>, AppError> {
    match identity.role {
        Role::Agent => {}
        Role::Master | Role::Admin => return Err(AppError::Forbidden),
    }

    // A one-shot request gets an ephemeral session derived from the verified
    // token — same invariant as the socket path: identity never comes from
    // the payload.
    let session = Session::from(identity);

    info!(agent_id = %session.agent_id, "Fallback location submission");

    state
        .ingest
        .handle_location(Some(&session), &update)
        .map_err(AppError::from)?;

    Ok(Json(AckResponse {
        message: "location updated".to_string(),
    }))
}

/// Application error types
enum AppError {
    Forbidden,
    Validation(String),
    Persistence(String),
}

impl From<IngestError> for AppError {
    fn from(e: IngestError) -> Self {
        match e {
            IngestError::Unauthorized => AppError::Forbidden,
            IngestError::Validation(e) => AppError::Validation(e.to_string()),
            IngestError::Persistence(msg) => AppError::Persistence(msg),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error) = match self {
            AppError::Forbidden => (
                StatusCode::FORBIDDEN,
                "location ingest requires AGENT role".to_string(),
            ),
            AppError::Validation(msg) => (StatusCode::BAD_REQUEST, msg),
            AppError::Persistence(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
        };
        (status, Json(ErrorResponse { error })).into_response()
    }
}
