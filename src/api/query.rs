use crate::auth::Identity;
use crate::location::CurrentLocation;
use crate::scope::{resolve_scope, AgentOwnership, ScopeError};
use crate::store::LocationStore;
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    middleware,
    response::{IntoResponse, Json, Response},
    routing::get,
    Extension, Router,
};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;
use tower_http::cors::CorsLayer;

use super::auth_middleware::{authenticate, AuthLayerState};

/// Shared state for the pull-style query API
pub struct QueryAppState {
    pub store: Arc<LocationStore>,
    pub ownership: Arc<dyn AgentOwnership>,
}

/// Query parameters for location listings
#[derive(Deserialize)]
pub struct LocationQueryParams {
    /// Comma-separated agent ids (e.g., ?ids=A001,A002)
    pub ids: Option<String>,
}

/// Count response
#[derive(Serialize)]
struct CountResponse {
    online: usize,
}

/// Error response
#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}

/// Create the query API router (consumed by the admin/dashboard layer).
///
/// Every route resolves the caller's scope the same way, so a snapshot pull
/// and its matching count can never disagree.
pub fn create_query_router(state: Arc<QueryAppState>, auth: Arc<AuthLayerState>) -> Router {
    Router::new()
        .route("/api/agents/locations", get(list_locations))
        .route("/api/agents/locations/:id", get(get_location))
        .route("/api/agents/online", get(list_online))
        .route("/api/agents/online/count", get(count_online))
        .route_layer(middleware::from_fn_with_state(auth, authenticate))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

fn parse_ids(params: &LocationQueryParams) -> Option<HashSet<String>> {
    params.ids.as_ref().map(|raw| {
        raw.split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect()
    })
}

/// GET /api/agents/locations - all current rows in scope (optionally ?ids=)
async fn list_locations(
    State(state): State<Arc<QueryAppState>>,
    Extension(identity): Extension<Identity>,
    Query(params): Query<LocationQueryParams>,
) -> Result<Json<Vec<CurrentLocation>>, QueryError> {
    let scope = resolve_scope(&identity, state.ownership.as_ref())?;

    let rows = match scope.restrict(parse_ids(&params)) {
        None => state.store.get_all(),
        Some(ids) => state.store.get_many(&ids),
    };

    Ok(Json(rows))
}

/// GET /api/agents/locations/:id - one agent's current row
async fn get_location(
    State(state): State<Arc<QueryAppState>>,
    Extension(identity): Extension<Identity>,
    Path(id): Path<String>,
) -> Result<Json<CurrentLocation>, QueryError> {
    let scope = resolve_scope(&identity, state.ownership.as_ref())?;

    // Out-of-scope ids read as absent, same as unknown ids
    if !scope.permits(&id) {
        return Err(QueryError::NotFound);
    }

    let row = state.store.get(&id).ok_or(QueryError::NotFound)?;
    Ok(Json(row))
}

/// GET /api/agents/online - ONLINE rows in scope (optionally ?ids=)
async fn list_online(
    State(state): State<Arc<QueryAppState>>,
    Extension(identity): Extension<Identity>,
    Query(params): Query<LocationQueryParams>,
) -> Result<Json<Vec<CurrentLocation>>, QueryError> {
    let scope = resolve_scope(&identity, state.ownership.as_ref())?;

    let rows = match scope.restrict(parse_ids(&params)) {
        None => state.store.get_online(),
        Some(ids) => state.store.get_online_many(&ids),
    };

    Ok(Json(rows))
}

/// GET /api/agents/online/count - ONLINE count in scope (optionally ?ids=)
async fn count_online(
    State(state): State<Arc<QueryAppState>>,
    Extension(identity): Extension<Identity>,
    Query(params): Query<LocationQueryParams>,
) -> Result<Json<CountResponse>, QueryError> {
    let scope = resolve_scope(&identity, state.ownership.as_ref())?;

    let online = match scope.restrict(parse_ids(&params)) {
        None => state.store.count_online(),
        Some(ids) => state.store.count_online_many(&ids),
    };

    Ok(Json(CountResponse { online }))
}

/// Query error types
#[derive(Debug)]
enum QueryError {
    NotFound,
    Forbidden,
}

impl From<ScopeError> for QueryError {
    fn from(e: ScopeError) -> Self {
        match e {
            ScopeError::Forbidden => QueryError::Forbidden,
        }
    }
}

impl IntoResponse for QueryError {
    fn into_response(self) -> Response {
        let (status, error) = match self {
            QueryError::NotFound => (StatusCode::NOT_FOUND, "agent not found".to_string()),
            QueryError::Forbidden => (
                StatusCode::FORBIDDEN,
                "role is not permitted to query agent locations".to_string(),
            ),
        };
        (status, Json(ErrorResponse { error })).into_response()
    }
}
