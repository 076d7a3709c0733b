// Integration tests for the scoped pull-query API
//
// MASTER sees everything; ADMIN is restricted to the owned-agent set; AGENT
// has no access. Snapshot pulls and counts resolve scope through the same
// path, so they can never disagree.

use axum::{
    body::{to_bytes, Body},
    http::{Request, StatusCode},
    Router,
};
use fieldtrack::{
    api::{create_query_router, AuthLayerState, QueryAppState},
    auth::{Claims, JwtVerifier, Role},
    location::LocationUpdate,
    scope::InMemoryOwnership,
    store::LocationStore,
};
use jsonwebtoken::{encode, EncodingKey, Header};
use serde_json::Value;
use std::sync::Arc;
use tower::ServiceExt;

const SECRET: &str = "query-test-secret";

fn make_token(sub: &str, role: Role) -> String {
    let claims = Claims {
        sub: sub.to_string(),
        role,
        mobile: None,
        first_name: None,
        last_name: None,
        exp: chrono::Utc::now().timestamp() + 3600,
    };
    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(SECRET.as_bytes()),
    )
    .unwrap()
}

fn update(lat: f64, lon: f64) -> LocationUpdate {
    LocationUpdate {
        latitude: lat,
        longitude: lon,
        location: None,
        accuracy: None,
        altitude: None,
        speed: None,
        bearing: None,
        battery_level: None,
        is_charging: None,
    }
}

/// Three agents: SA01 owns A001 + A002 (A002 offline), SA02 owns B001.
fn make_router() -> (Router, Arc<LocationStore>) {
    let store = Arc::new(LocationStore::new());
    store.upsert("A001", &update(19.076, 72.8777)).unwrap();
    store.upsert("A002", &update(18.52, 73.8567)).unwrap();
    store.upsert("B001", &update(28.6, 77.2)).unwrap();
    store
        .record_status("A002", fieldtrack::location::ConnectionStatus::Offline)
        .unwrap();

    let ownership = Arc::new(InMemoryOwnership::new());
    ownership.assign("SA01", "A001");
    ownership.assign("SA01", "A002");
    ownership.assign("SA02", "B001");

    let auth = Arc::new(AuthLayerState {
        verifier: Arc::new(JwtVerifier::new(SECRET)),
    });
    let app = create_query_router(
        Arc::new(QueryAppState {
            store: Arc::clone(&store),
            ownership,
        }),
        auth,
    );
    (app, store)
}

async fn get_json(app: Router, uri: &str, token: &str) -> (StatusCode, Value) {
    let resp = app
        .oneshot(
            Request::builder()
                .uri(uri)
                .header("authorization", format!("Bearer {}", token))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    let status = resp.status();
    let bytes = to_bytes(resp.into_body(), 64 * 1024).await.unwrap();
    let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, value)
}

fn agent_ids(value: &Value) -> Vec<String> {
    value
        .as_array()
        .unwrap()
        .iter()
        .map(|v| v["agentId"].as_str().unwrap().to_string())
        .collect()
}

#[tokio::test]
async fn test_master_sees_all_agents() {
    let (app, _) = make_router();
    let token = make_token("M001", Role::Master);
    let (status, value) = get_json(app, "/api/agents/locations", &token).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(value.as_array().unwrap().len(), 3);
}

#[tokio::test]
async fn test_admin_sees_only_owned_agents() {
    let (app, _) = make_router();
    let token = make_token("SA01", Role::Admin);
    let (status, value) = get_json(app, "/api/agents/locations", &token).await;
    assert_eq!(status, StatusCode::OK);

    let mut ids = agent_ids(&value);
    ids.sort();
    assert_eq!(ids, vec!["A001", "A002"]);
}

#[tokio::test]
async fn test_requested_ids_intersected_with_scope() {
    let (app, _) = make_router();
    let token = make_token("SA01", Role::Admin);
    // B001 is outside SA01's scope and is silently dropped
    let (status, value) =
        get_json(app, "/api/agents/locations?ids=A001,B001", &token).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(agent_ids(&value), vec!["A001"]);
}

#[tokio::test]
async fn test_online_listing_respects_scope_and_status() {
    let (app, _) = make_router();
    let token = make_token("SA01", Role::Admin);
    let (status, value) = get_json(app, "/api/agents/online", &token).await;
    assert_eq!(status, StatusCode::OK);
    // A002 is OFFLINE, B001 out of scope
    assert_eq!(agent_ids(&value), vec!["A001"]);
}

#[tokio::test]
async fn test_count_matches_online_listing() {
    let (app, _) = make_router();
    let token = make_token("SA01", Role::Admin);

    let (_, listing) = get_json(app.clone(), "/api/agents/online", &token).await;
    let (status, count) = get_json(app, "/api/agents/online/count", &token).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        count["online"].as_u64().unwrap() as usize,
        listing.as_array().unwrap().len()
    );
}

#[tokio::test]
async fn test_count_by_ids_unaffected_by_agents_outside_set() {
    let (app, _) = make_router();
    let token = make_token("M001", Role::Master);
    let (status, count) =
        get_json(app, "/api/agents/online/count?ids=A001,A002", &token).await;
    assert_eq!(status, StatusCode::OK);
    // A001 online, A002 offline; B001 plays no part
    assert_eq!(count["online"], 1);
}

#[tokio::test]
async fn test_get_single_agent_in_scope() {
    let (app, _) = make_router();
    let token = make_token("SA01", Role::Admin);
    let (status, value) = get_json(app, "/api/agents/locations/A001", &token).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(value["agentId"], "A001");
    assert_eq!(value["latitude"], 19.076);
}

#[tokio::test]
async fn test_get_single_agent_out_of_scope_reads_as_absent() {
    let (app, _) = make_router();
    let token = make_token("SA01", Role::Admin);
    let (status, _) = get_json(app, "/api/agents/locations/B001", &token).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_unknown_agent_not_found() {
    let (app, _) = make_router();
    let token = make_token("M001", Role::Master);
    let (status, _) = get_json(app, "/api/agents/locations/ZZZ", &token).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_agent_role_forbidden() {
    let (app, _) = make_router();
    let token = make_token("A001", Role::Agent);
    let (status, _) = get_json(app, "/api/agents/locations", &token).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_no_token_unauthorized() {
    let (app, _) = make_router();
    let resp = app
        .oneshot(
            Request::builder()
                .uri("/api/agents/locations")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
}
