use crate::auth::{Identity, Role};
use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};

#[cfg(test)]
mod tests;

/// Opaque handle for one persistent connection.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ConnectionId(u64);

/// Identity bound to a connection at handshake time.
///
/// Derived once from a verified token, immutable for the connection's
/// lifetime, destroyed when the connection closes. Never reconstructed from
/// client payload fields.
#[derive(Clone, Debug)]
pub struct Session {
    pub agent_id: String,
    pub role: Role,
    pub mobile: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
}

impl From<Identity> for Session {
    fn from(identity: Identity) -> Self {
        Self {
            agent_id: identity.agent_id,
            role: identity.role,
            mobile: identity.mobile,
            first_name: identity.first_name,
            last_name: identity.last_name,
        }
    }
}

/// Per-connection session store.
///
/// All downstream handlers resolve identity exclusively through this registry;
/// a lookup miss means the connection is unauthenticated and its messages are
/// dropped. Entries are per-connection and unshared, so a plain DashMap
/// suffices — there is no cross-entry coordination.
pub struct SessionRegistry {
    sessions: DashMap<ConnectionId, Session>,
    next_id: AtomicU64,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self {
            sessions: DashMap::new(),
            next_id: AtomicU64::new(1),
        }
    }

    /// Allocate a fresh connection handle.
    pub fn next_connection_id(&self) -> ConnectionId {
        ConnectionId(self.next_id.fetch_add(1, Ordering::Relaxed))
    }

    /// Bind a verified identity to a connection handle.
    pub fn insert(&self, conn: ConnectionId, session: Session) {
        self.sessions.insert(conn, session);
    }

    /// Resolve the identity for a connection, or None if unauthenticated.
    pub fn get(&self, conn: ConnectionId) -> Option<Session> {
        self.sessions.get(&conn).map(|s| s.clone())
    }

    /// Tear down a connection's session. Returns the removed session, if any.
    pub fn remove(&self, conn: ConnectionId) -> Option<Session> {
        self.sessions.remove(&conn).map(|(_, s)| s)
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

impl Default for SessionRegistry {
    fn default() -> Self {
        Self::new()
    }
}
