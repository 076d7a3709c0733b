use anyhow::{Context, Result};
use fieldtrack::api::{
    create_gateway_router, create_ingest_router, create_query_router, AuthLayerState,
    GatewayState, IngestAppState, QueryAppState,
};
use fieldtrack::auth::JwtVerifier;
use fieldtrack::config::load_config;
use fieldtrack::directory::InMemoryDirectory;
use fieldtrack::fanout::FanoutHub;
use fieldtrack::ingest::IngestHandler;
use fieldtrack::presence::run_presence_sweeper;
use fieldtrack::scope::InMemoryOwnership;
use fieldtrack::session::SessionRegistry;
use fieldtrack::storage::SqliteLocationRepository;
use fieldtrack::store::LocationStore;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing subscriber
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "fieldtrack=info".into()),
        )
        .init();

    info!("fieldtrack starting...");

    let config_path =
        std::env::var("FIELDTRACK_CONFIG").unwrap_or_else(|_| "fieldtrack.toml".to_string());
    let config = match load_config(&config_path) {
        Ok(config) => config,
        Err(e) => {
            info!(path = %config_path, error = %e, "No config file, using defaults");
            fieldtrack::config::FieldtrackConfig::default()
        }
    };

    let jwt_secret =
        std::env::var("FIELDTRACK_JWT_SECRET").unwrap_or_else(|_| config.auth.jwt_secret.clone());

    // Explicitly constructed services, injected into every component —
    // no process-wide singletons
    let repo = Arc::new(
        SqliteLocationRepository::new(&config.storage.db_path)
            .context("Failed to open location database")?,
    );
    let store = Arc::new(LocationStore::with_repository(repo));
    store
        .load_persisted()
        .context("Failed to load persisted locations")?;

    let sessions = Arc::new(SessionRegistry::new());
    let hub = Arc::new(FanoutHub::new());
    let directory: Arc<dyn fieldtrack::directory::AgentDirectory> =
        Arc::new(InMemoryDirectory::new());
    let ownership: Arc<dyn fieldtrack::scope::AgentOwnership> =
        Arc::new(InMemoryOwnership::new());
    let ingest = Arc::new(IngestHandler::new(
        Arc::clone(&store),
        Arc::clone(&hub),
        Arc::clone(&directory),
    ));
    let auth = Arc::new(AuthLayerState {
        verifier: Arc::new(JwtVerifier::new(&jwt_secret)),
    });

    // Presence sweeper runs independently of ingest traffic
    tokio::spawn(run_presence_sweeper(
        Arc::clone(&store),
        Arc::clone(&hub),
        Arc::clone(&directory),
        config.presence.sweep_interval(),
        config.presence.stale_after(),
    ));

    let gateway_state = Arc::new(GatewayState {
        sessions,
        hub: Arc::clone(&hub),
        ingest: Arc::clone(&ingest),
        ownership: Arc::clone(&ownership),
        heartbeat_interval: Duration::from_secs(config.server.heartbeat_interval_seconds),
    });
    let ingest_state = Arc::new(IngestAppState { ingest });
    let query_state = Arc::new(QueryAppState {
        store,
        ownership,
    });

    let app = create_gateway_router(gateway_state, Arc::clone(&auth))
        .merge(create_ingest_router(ingest_state, Arc::clone(&auth)))
        .merge(create_query_router(query_state, auth));

    let listener = tokio::net::TcpListener::bind(&config.server.bind_addr)
        .await
        .with_context(|| format!("Failed to bind {}", config.server.bind_addr))?;
    info!(addr = %config.server.bind_addr, "Listening");

    axum::serve(listener, app)
        .await
        .context("Server error")?;

    Ok(())
}
