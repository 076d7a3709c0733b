use crate::auth::{extract_bearer_token, Identity, TokenVerifier};
use axum::{
    extract::{Request, State},
    http::StatusCode,
    middleware::Next,
    response::{IntoResponse, Response},
};
use std::sync::Arc;
use tracing::debug;


/// State for the bearer-auth layer
pub struct AuthLayerState {
    pub verifier: Arc<dyn TokenVerifier>,
}

/// Bearer-token middleware shared by the gateway, fallback ingest, and query
/// routers.
///
/// Extracts `Authorization: Bearer <token>` from the request headers,
/// verifies signature and expiry, and stashes the resolved [`Identity`] in the
/// request extensions for the handler. Runs BEFORE WebSocket upgrade
/// extraction so 401 can be returned cleanly with no partial handshake — and
/// no partial session ever exists.
pub async fn authenticate(
    State(state): State<Arc<AuthLayerState>>,
    mut req: Request,
    next: Next,
) -> Response {
    let token = match extract_bearer_token(req.headers()) {
        Ok(token) => token,
        Err(e) => {
            debug!(error = %e, "Rejecting connection without bearer token");
            return (StatusCode::UNAUTHORIZED, e.to_string()).into_response();
        }
    };

    let identity = match state.verifier.verify(&token) {
        Ok(identity) => identity,
        Err(e) => {
            debug!(error = %e, "Rejecting connection with invalid token");
            return (StatusCode::UNAUTHORIZED, e.to_string()).into_response();
        }
    };

    req.extensions_mut().insert(identity);
    next.run(req).await
}
