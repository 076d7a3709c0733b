// Integration tests for the framed-fallback ingest path
//
// POST /api/agent/location carries the same payload an agent would send on
// the socket; the HTTP response body stands in for the unicast reply.

use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use fieldtrack::{
    api::{create_ingest_router, AuthLayerState, IngestAppState},
    auth::{Claims, JwtVerifier, Role},
    directory::{AgentProfile, InMemoryDirectory},
    fanout::FanoutHub,
    ingest::IngestHandler,
    location::ConnectionStatus,
    store::LocationStore,
};
use jsonwebtoken::{encode, EncodingKey, Header};
use serde_json::{json, Value};
use std::sync::Arc;
use tower::ServiceExt;

const SECRET: &str = "ingest-test-secret";

fn make_token(sub: &str, role: Role) -> String {
    let claims = Claims {
        sub: sub.to_string(),
        role,
        mobile: Some("+919800000001".to_string()),
        first_name: Some("Asha".to_string()),
        last_name: Some("Patil".to_string()),
        exp: chrono::Utc::now().timestamp() + 3600,
    };
    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(SECRET.as_bytes()),
    )
    .unwrap()
}

struct Fixture {
    app: Router,
    store: Arc<LocationStore>,
    hub: Arc<FanoutHub>,
    directory: Arc<InMemoryDirectory>,
}

fn fixture() -> Fixture {
    let store = Arc::new(LocationStore::new());
    let hub = Arc::new(FanoutHub::new());
    let directory = Arc::new(InMemoryDirectory::new());
    directory.insert_profile(
        "A001",
        AgentProfile {
            first_name: Some("Asha".to_string()),
            last_name: Some("Patil".to_string()),
            mobile: Some("+919800000001".to_string()),
        },
    );
    let ingest = Arc::new(IngestHandler::new(
        Arc::clone(&store),
        Arc::clone(&hub),
        Arc::clone(&directory) as Arc<dyn fieldtrack::directory::AgentDirectory>,
    ));
    let auth = Arc::new(AuthLayerState {
        verifier: Arc::new(JwtVerifier::new(SECRET)),
    });
    let app = create_ingest_router(Arc::new(IngestAppState { ingest }), auth);

    Fixture {
        app,
        store,
        hub,
        directory,
    }
}

fn post_location(token: Option<&str>, payload: Value) -> Request<Body> {
    let mut builder = Request::builder()
        .method("POST")
        .uri("/api/agent/location")
        .header("content-type", "application/json");
    if let Some(token) = token {
        builder = builder.header("authorization", format!("Bearer {}", token));
    }
    builder.body(Body::from(payload.to_string())).unwrap()
}

#[tokio::test]
async fn test_valid_submission_creates_online_row() {
    let fx = fixture();
    let token = make_token("A001", Role::Agent);
    let mut positions = fx.hub.subscribe_positions();

    let resp = fx
        .app
        .oneshot(post_location(
            Some(&token),
            json!({"latitude": 19.076, "longitude": 72.8777, "batteryLevel": 77}),
        ))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);

    // Row keyed by the token subject, ONLINE, matching fields
    let row = fx.store.get("A001").unwrap();
    assert_eq!(row.latitude, 19.076);
    assert_eq!(row.longitude, 72.8777);
    assert_eq!(row.battery_level, Some(77));
    assert_eq!(row.connection_status, ConnectionStatus::Online);

    // Fan-out fired with the merged record
    let tick = positions.try_recv().unwrap();
    assert_eq!(tick.agent_id, "A001");
    assert_eq!(tick.agent_first_name.as_deref(), Some("Asha"));

    // Write-through into the directory cache
    assert_eq!(fx.directory.cached_location("A001"), Some((19.076, 72.8777)));
}

#[tokio::test]
async fn test_out_of_range_latitude_rejected() {
    let fx = fixture();
    let token = make_token("A001", Role::Agent);

    let resp = fx
        .app
        .oneshot(post_location(
            Some(&token),
            json!({"latitude": 200.0, "longitude": 72.0}),
        ))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

    // Store untouched — the row remains absent
    assert!(fx.store.get("A001").is_none());
}

#[tokio::test]
async fn test_rejection_preserves_previous_row() {
    let fx = fixture();
    let token = make_token("A001", Role::Agent);

    let resp = fx
        .app
        .clone()
        .oneshot(post_location(
            Some(&token),
            json!({"latitude": 19.076, "longitude": 72.8777}),
        ))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);

    let resp = fx
        .app
        .oneshot(post_location(
            Some(&token),
            json!({"latitude": 19.0, "longitude": -181.0}),
        ))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

    let row = fx.store.get("A001").unwrap();
    assert_eq!(row.latitude, 19.076);
    assert_eq!(row.longitude, 72.8777);
}

#[tokio::test]
async fn test_non_agent_role_forbidden_store_unchanged() {
    let fx = fixture();
    let token = make_token("SA01", Role::Admin);

    let resp = fx
        .app
        .oneshot(post_location(
            Some(&token),
            json!({"latitude": 19.0, "longitude": 72.0}),
        ))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::FORBIDDEN);
    assert!(fx.store.is_empty());
}

#[tokio::test]
async fn test_missing_token_unauthorized() {
    let fx = fixture();
    let resp = fx
        .app
        .oneshot(post_location(
            None,
            json!({"latitude": 19.0, "longitude": 72.0}),
        ))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    assert!(fx.store.is_empty());
}

#[tokio::test]
async fn test_second_submission_overwrites_row() {
    let fx = fixture();
    let token = make_token("A001", Role::Agent);

    fx.app
        .clone()
        .oneshot(post_location(
            Some(&token),
            json!({"latitude": 19.076, "longitude": 72.8777}),
        ))
        .await
        .unwrap();
    fx.app
        .oneshot(post_location(
            Some(&token),
            json!({"latitude": 18.52, "longitude": 73.8567}),
        ))
        .await
        .unwrap();

    assert_eq!(fx.store.len(), 1);
    let row = fx.store.get("A001").unwrap();
    assert_eq!(row.latitude, 18.52);
}
