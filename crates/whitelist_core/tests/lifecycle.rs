//! Integration tests for the connection lifecycle
//!
//! These tests drive managers through the registry against the in-memory
//! transport and check the observable effects: transport calls, state
//! transitions and event log entries.

use std::sync::Arc;
use std::time::Duration;
use whitelist_core::testing::MockTransport;
use whitelist_core::{
    AddOutcome, ConnectionRegistry, ConnectionSettings, ConnectionState, Credential, LogLevel,
    RemoveOutcome, ServerAddress, ServerRecord, TransportError,
};

fn setup() -> (MockTransport, ConnectionRegistry) {
    let transport = MockTransport::new();
    let registry = ConnectionRegistry::new(Arc::new(transport.clone()), ConnectionSettings::default());
    (transport, registry)
}

fn survival() -> ServerRecord {
    ServerRecord::new("survival", "203.0.113.10", 25575, "secret")
}

/// Lets spawned supervisors run.
async fn settle() {
    tokio::time::sleep(Duration::from_millis(10)).await;
}

#[tokio::test]
async fn test_unsafe_targets_are_never_contacted() {
    let (transport, registry) = setup();

    for host in [
        "10.0.0.5",
        "127.0.0.1",
        "172.20.0.1",
        "192.168.1.1",
        "::1",
        "not-an-ip",
        "mc.example.com",
    ] {
        let connection = registry.get_or_create(&ServerRecord::new(host, host, 25575, "secret"));
        connection.create_connection().await;

        let entries = connection.log().entries();
        assert_eq!(entries.len(), 1, "host {host}");
        assert_eq!(entries[0].level, LogLevel::Error, "host {host}");
        assert!(!connection.is_authenticated());
    }

    assert_eq!(transport.connect_calls(), 0);
}

#[tokio::test]
async fn test_destroy_frees_identifier() {
    let (transport, registry) = setup();

    let first = registry.get_or_create(&survival());
    first.create_connection().await;
    first.destroy().await;

    assert!(registry.get("survival").is_none());
    assert_eq!(first.state(), ConnectionState::Closed);
    assert_eq!(transport.close_calls(), 1);

    let second = registry.get_or_create(&survival());
    assert!(!Arc::ptr_eq(&first, &second));
    second.create_connection().await;
    assert!(second.is_authenticated());
    assert_eq!(transport.connect_calls(), 2);
}

#[tokio::test]
async fn test_whitelisting_twice() {
    let (transport, registry) = setup();
    let connection = registry.get_or_create(&survival());
    connection.create_connection().await;

    assert_eq!(connection.whitelist_player("Alice").await, AddOutcome::Added);
    assert_eq!(connection.whitelist_player("Alice").await, AddOutcome::AlreadyPresent);
    assert_eq!(connection.log().last().unwrap().level, LogLevel::Warning);
    assert_eq!(transport.whitelist(), vec!["Alice".to_string()]);
    assert_eq!(
        transport.commands(),
        vec!["whitelist add Alice".to_string(), "whitelist add Alice".to_string()]
    );
}

#[tokio::test]
async fn test_unwhitelisting() {
    let (transport, registry) = setup();
    transport.seed_whitelist(["Alice"]);
    let connection = registry.get_or_create(&survival());
    connection.create_connection().await;

    assert_eq!(connection.unwhitelist_player("Alice").await, RemoveOutcome::Removed);
    assert_eq!(connection.unwhitelist_player("Alice").await, RemoveOutcome::AlreadyAbsent);
    assert_eq!(connection.log().last().unwrap().level, LogLevel::Warning);

    transport.script_reply(Ok("Unknown or incomplete command".to_string()));
    assert_eq!(connection.unwhitelist_player("Alice").await, RemoveOutcome::Failed);
    assert!(connection.log().last().unwrap().is_error());
}

#[tokio::test]
async fn test_unrecognized_and_failed_add_replies() {
    let (transport, registry) = setup();
    let connection = registry.get_or_create(&survival());
    connection.create_connection().await;

    transport.script_reply(Ok("That player does not exist".to_string()));
    assert_eq!(connection.whitelist_player("Ghost").await, AddOutcome::Failed);

    transport.script_reply(Err(TransportError::Closed));
    assert_eq!(connection.whitelist_player("Ghost").await, AddOutcome::Failed);
    assert!(connection.log().last().unwrap().is_error());
}

#[tokio::test]
async fn test_list_parsing() {
    let (transport, registry) = setup();
    let connection = registry.get_or_create(&survival());
    connection.create_connection().await;

    transport.script_reply(Ok("There are 2 whitelisted players: Alice, Bob".to_string()));
    assert_eq!(connection.get_whitelisted_players().await, vec!["Alice", "Bob"]);

    transport.script_reply(Ok("There are no whitelisted players".to_string()));
    assert!(connection.get_whitelisted_players().await.is_empty());
    assert_eq!(connection.log().last().unwrap().level, LogLevel::Warning);

    transport.script_reply(Err(TransportError::Timeout {
        operation: "command",
        timeout: Duration::from_secs(5),
    }));
    assert!(connection.get_whitelisted_players().await.is_empty());
    assert!(connection.log().last().unwrap().is_error());

    transport.seed_whitelist(["Steve", "Alex"]);
    assert_eq!(connection.get_whitelisted_players().await, vec!["Alex", "Steve"]);
}

#[tokio::test]
async fn test_identical_update_is_a_no_op() {
    let (transport, registry) = setup();
    let connection = registry.get_or_create(&survival());
    connection.create_connection().await;
    let entries_before = connection.log().len();

    connection
        .update_server_data(ServerAddress::new("203.0.113.10", 25575), Credential::new("secret"))
        .await;

    assert_eq!(connection.log().len(), entries_before);
    assert_eq!(connection.session_generation().await, 0);
    assert!(connection.is_authenticated());
    assert_eq!(transport.close_calls(), 0);
}

#[tokio::test]
async fn test_any_changed_field_rebuilds_session() {
    let (transport, registry) = setup();
    let connection = registry.get_or_create(&survival());

    let changes = [
        (ServerAddress::new("203.0.113.11", 25575), Credential::new("secret")),
        (ServerAddress::new("203.0.113.11", 25576), Credential::new("secret")),
        (ServerAddress::new("203.0.113.11", 25576), Credential::new("rotated")),
    ];

    for (round, (address, credential)) in changes.into_iter().enumerate() {
        connection.create_connection().await;
        assert!(connection.is_authenticated());

        connection.update_server_data(address.clone(), credential).await;

        assert_eq!(connection.session_generation().await, round as u64 + 1);
        assert_eq!(connection.state(), ConnectionState::Idle);
        assert_eq!(connection.address(), address);
        assert_eq!(transport.close_calls(), round + 1);
    }

    connection.create_connection().await;
    assert_eq!(
        transport.connected_addresses().last(),
        Some(&ServerAddress::new("203.0.113.11", 25576))
    );
}

#[tokio::test]
async fn test_registry_update_routes_to_manager() {
    let (_transport, registry) = setup();
    let connection = registry.get_or_create(&survival());

    let edited = ServerRecord::new("survival", "198.51.100.7", 25575, "secret");
    assert!(registry.update_server(&edited).await);
    assert_eq!(connection.address(), ServerAddress::new("198.51.100.7", 25575));

    assert!(registry.remove_server("survival").await);
    assert!(!registry.contains("survival"));
}

#[tokio::test]
async fn test_replacement_stops_previous_manager() {
    let (transport, registry) = setup();

    let previous = registry.create(&survival()).await;
    previous.create_connection().await;

    let current = registry.create(&survival()).await;

    assert!(Arc::ptr_eq(&registry.get("survival").unwrap(), &current));
    assert_eq!(previous.state(), ConnectionState::Closed);
    assert_eq!(transport.close_calls(), 1);

    previous.create_connection().await;
    assert_eq!(transport.connect_calls(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_timed_connection_defers_reconnect() {
    let (transport, registry) = setup();
    let connection = registry.get_or_create(&survival());

    connection.create_timed_connection(Duration::from_millis(1000)).await;
    assert!(connection.is_authenticated());

    assert!(transport.force_close());
    settle().await;

    assert_eq!(connection.state(), ConnectionState::Closed);
    assert_eq!(transport.connect_calls(), 1);

    tokio::time::advance(Duration::from_millis(1500)).await;
    settle().await;
    assert_eq!(transport.connect_calls(), 1);

    // Once the window is over, remote closes reconnect again.
    connection.create_connection().await;
    assert!(transport.force_close());
    settle().await;

    assert_eq!(transport.connect_calls(), 3);
    assert!(connection.is_authenticated());
}

#[tokio::test(start_paused = true)]
async fn test_remote_error_reconnects() {
    let (transport, registry) = setup();
    let connection = registry.get_or_create(&survival());
    connection.create_connection().await;

    assert!(transport.force_error(TransportError::MalformedPacket("garbage".to_string())));
    settle().await;

    assert!(connection.is_authenticated());
    assert_eq!(transport.connect_calls(), 2);
    assert!(connection
        .log()
        .entries()
        .iter()
        .any(|entry| entry.is_error() && entry.message.contains("garbage")));
}

#[tokio::test(start_paused = true)]
async fn test_stop_waits_for_in_flight_connect() {
    let (transport, registry) = setup();
    transport.set_connect_delay(Some(Duration::from_millis(100)));
    let connection = registry.get_or_create(&survival());

    let pending = {
        let connection = connection.clone();
        tokio::spawn(async move { connection.create_connection().await })
    };
    settle().await;
    assert_eq!(connection.state(), ConnectionState::Connecting);

    connection.stop().await;
    pending.await.unwrap();

    assert_eq!(connection.state(), ConnectionState::Closed);
    assert_eq!(transport.close_calls(), 1);

    // A late remote close of the stopped session is ignored.
    transport.force_close();
    settle().await;
    assert_eq!(transport.connect_calls(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_ensure_session_reports_freshness() {
    let (transport, registry) = setup();
    let connection = registry.get_or_create(&survival());

    assert!(connection.ensure_session(Duration::from_secs(1)).await);

    connection.stop().await;
    transport.set_reachable(false);
    tokio::time::advance(Duration::from_secs(5)).await;

    assert!(!connection.ensure_session(Duration::from_secs(1)).await);
    assert!(connection.ensure_session(Duration::from_secs(10)).await);
}

#[tokio::test]
async fn test_verification_connection_is_cleaned_up() {
    let (transport, registry) = setup();
    let address = ServerAddress::new("203.0.113.10", 25575);

    assert!(registry.verify("alice", &address, &Credential::new("secret")).await);
    assert!(registry.is_empty());

    transport.set_reject_auth(true);
    assert!(!registry.verify("alice", &address, &Credential::new("secret")).await);
    assert!(registry.is_empty());

    let connects = transport.connect_calls();
    let private = ServerAddress::new("192.168.0.10", 25575);
    assert!(!registry.verify("alice", &private, &Credential::new("secret")).await);
    assert_eq!(transport.connect_calls(), connects);
}
