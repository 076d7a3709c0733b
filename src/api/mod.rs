// HTTP and WebSocket surface: gateway, fallback ingest, pull queries

pub mod auth_middleware;
pub mod ingest;
pub mod query;
pub mod websocket;

pub use auth_middleware::{authenticate, AuthLayerState};
pub use ingest::{create_ingest_router, IngestAppState};
pub use query::{create_query_router, QueryAppState};
pub use websocket::{create_gateway_router, GatewayState};
