use super::*;

fn agent_session(agent_id: &str) -> Session {
    Session {
        agent_id: agent_id.to_string(),
        role: Role::Agent,
        mobile: Some("+919800000001".to_string()),
        first_name: Some("Asha".to_string()),
        last_name: Some("Patil".to_string()),
    }
}

#[test]
fn test_insert_and_lookup() {
    let registry = SessionRegistry::new();
    let conn = registry.next_connection_id();

    registry.insert(conn, agent_session("A001"));

    let session = registry.get(conn).unwrap();
    assert_eq!(session.agent_id, "A001");
    assert_eq!(session.role, Role::Agent);
}

#[test]
fn test_lookup_unauthenticated_connection_is_none() {
    let registry = SessionRegistry::new();
    let conn = registry.next_connection_id();
    assert!(registry.get(conn).is_none());
}

#[test]
fn test_remove_on_close() {
    let registry = SessionRegistry::new();
    let conn = registry.next_connection_id();
    registry.insert(conn, agent_session("A001"));

    let removed = registry.remove(conn).unwrap();
    assert_eq!(removed.agent_id, "A001");
    assert!(registry.get(conn).is_none());
    assert!(registry.is_empty());
}

#[test]
fn test_connection_ids_are_unique() {
    let registry = SessionRegistry::new();
    let a = registry.next_connection_id();
    let b = registry.next_connection_id();
    assert_ne!(a, b);

    registry.insert(a, agent_session("A001"));
    registry.insert(b, agent_session("A002"));
    assert_eq!(registry.len(), 2);
    assert_eq!(registry.get(a).unwrap().agent_id, "A001");
    assert_eq!(registry.get(b).unwrap().agent_id, "A002");
}
