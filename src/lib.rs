// Token verification and roles
pub mod auth;

// Per-connection session registry
pub mod session;

// Location model and validation
pub mod location;

// Current-location store (one row per agent)
pub mod store;

// Durable row persistence
pub mod storage;

// Broadcast topics and unicast replies
pub mod fanout;

// Location/status/ping ingest
pub mod ingest;

// Presence sweeper
pub mod presence;

// Ownership-scoped visibility
pub mod scope;

// Agent profile directory collaborator
pub mod directory;

// HTTP and WebSocket APIs
pub mod api;

// Configuration
pub mod config;
