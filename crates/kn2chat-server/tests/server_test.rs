//! End-to-end tests over real TCP connections.
//!
//! Each test starts a server on an ephemeral port, drives raw protocol
//! clients against it, and stops it through the same path a termination
//! signal takes.

mod common;

use std::{sync::Arc, time::Duration};

use common::{Client, LogCapture, Running, config, signing_key};
use kn2chat_core::{PublicKey, REJECTION_MESSAGE, UnknownIdentityPolicy};
use kn2chat_server::{SHUTDOWN_NOTICE, ShutdownReport};

const ESC: &[u8] = b"\x1b";

const GRACE_ELAPSED: &str = "shutdown grace period elapsed";

#[tokio::test]
async fn message_reaches_every_connected_client() {
    let server = Running::start(config(UnknownIdentityPolicy::Admit, Duration::from_secs(5))).await;

    let mut alice = Client::login(server.addr, "broemp", Some(&signing_key(1))).await;
    alice.wait_for("KN2 Chat").await;
    let mut guest = Client::login(server.addr, "guest", None).await;
    guest.wait_for("KN2 Chat").await;
    server.wait_for_sessions(2).await;

    alice.send(b"hello\r").await;
    guest.wait_for("broemp: hello").await;
    alice.wait_for("broemp: hello").await;

    alice.send(ESC).await;
    guest.send(ESC).await;
    alice.wait_for_close().await;
    guest.wait_for_close().await;
    assert!(guest.screen.contains("Bye!"));

    let report = server.signal().await.unwrap();
    assert_eq!(report, ShutdownReport::default());
}

#[tokio::test]
async fn wrong_key_for_reserved_identity_is_rejected() {
    let server = Running::start(config(UnknownIdentityPolicy::Admit, Duration::from_secs(5))).await;

    let mut impostor = Client::login(server.addr, "broemp", Some(&signing_key(2))).await;
    assert_eq!(impostor.read_line().await.as_deref(), Some(REJECTION_MESSAGE));
    impostor.wait_for_close().await;

    let mut keyless = Client::login(server.addr, "broemp", None).await;
    assert_eq!(keyless.read_line().await.as_deref(), Some(REJECTION_MESSAGE));
    keyless.wait_for_close().await;

    assert_eq!(server.registry.session_count(), 0);
    server.signal().await.unwrap();
}

#[tokio::test]
async fn unknown_identity_follows_policy() {
    let server = Running::start(config(UnknownIdentityPolicy::Deny, Duration::from_secs(5))).await;

    let mut guest = Client::login(server.addr, "guest", None).await;
    assert_eq!(guest.read_line().await.as_deref(), Some(REJECTION_MESSAGE));
    guest.wait_for_close().await;

    let mut owner = Client::login(server.addr, "broemp", Some(&signing_key(1))).await;
    owner.wait_for("KN2 Chat").await;
    owner.send(ESC).await;
    owner.wait_for_close().await;

    server.signal().await.unwrap();
}

#[tokio::test]
async fn unsigned_key_counts_as_no_key() {
    let server = Running::start(config(UnknownIdentityPolicy::Admit, Duration::from_secs(5))).await;
    let blob = PublicKey::from_verifying_key(signing_key(1).verifying_key()).to_base64();

    let (mut owner, _challenge) = Client::connect(server.addr).await;
    owner.send_line(&format!("AUTH broemp ssh-ed25519 {blob}")).await;
    assert_eq!(owner.read_line().await.as_deref(), Some(REJECTION_MESSAGE));
    owner.wait_for_close().await;

    let (mut guest, _challenge) = Client::connect(server.addr).await;
    guest.send_line(&format!("AUTH guest ssh-ed25519 {blob}")).await;
    guest.wait_for("KN2 Chat").await;
    server.wait_for_sessions(1).await;
    assert_eq!(server.registry.identities(), ["guest"]);

    guest.send(ESC).await;
    guest.wait_for_close().await;
    server.signal().await.unwrap();
}

#[tokio::test]
async fn malformed_auth_line_gets_an_error() {
    let server = Running::start(config(UnknownIdentityPolicy::Admit, Duration::from_secs(5))).await;

    let (mut client, _challenge) = Client::connect(server.addr).await;
    client.send_line("HELLO there").await;
    let reply = client.read_line().await.unwrap();
    assert!(reply.starts_with("error: "), "unexpected reply {reply:?}");
    client.wait_for_close().await;

    server.signal().await.unwrap();
}

#[tokio::test]
async fn shutdown_waits_for_clients_to_leave() {
    let (logs, _guard) = LogCapture::install();
    let server = Running::start(config(UnknownIdentityPolicy::Admit, Duration::from_secs(5))).await;

    let mut clients = Vec::new();
    for name in ["a", "b", "c"] {
        let mut client = Client::login(server.addr, name, None).await;
        client.wait_for("KN2 Chat").await;
        clients.push(client);
    }
    server.wait_for_sessions(3).await;

    let stopping = server.signal();
    for client in &mut clients {
        client.wait_for(SHUTDOWN_NOTICE).await;
        client.send(ESC).await;
    }

    let report = stopping.await.unwrap();
    assert_eq!(report, ShutdownReport { timed_out: false, forced: 0 });
    assert_eq!(logs.count(GRACE_ELAPSED), 0);
}

#[tokio::test]
async fn stuck_session_is_closed_after_grace_period() {
    let (logs, _guard) = LogCapture::install();
    let server =
        Running::start(config(UnknownIdentityPolicy::Admit, Duration::from_millis(300))).await;

    let mut leavers = Vec::new();
    for name in ["a", "b"] {
        let mut client = Client::login(server.addr, name, None).await;
        client.wait_for("KN2 Chat").await;
        leavers.push(client);
    }
    let mut stuck = Client::login(server.addr, "stuck", None).await;
    stuck.wait_for("KN2 Chat").await;
    server.wait_for_sessions(3).await;
    let registry = Arc::clone(&server.registry);

    let stopping = server.signal();
    for client in &mut leavers {
        client.wait_for(SHUTDOWN_NOTICE).await;
        client.send(ESC).await;
        client.wait_for_close().await;
    }

    let report = tokio::time::timeout(common::WAIT, stopping).await.unwrap().unwrap();
    assert_eq!(report, ShutdownReport { timed_out: true, forced: 1 });
    assert_eq!(registry.session_count(), 0);
    assert_eq!(logs.count(GRACE_ELAPSED), 1);

    stuck.wait_for_close().await;
}

#[tokio::test]
async fn handshake_in_progress_sees_shutdown_notice() {
    let server = Running::start(config(UnknownIdentityPolicy::Admit, Duration::from_secs(5))).await;

    let (mut client, _challenge) = Client::connect(server.addr).await;
    let stopping = server.signal();

    assert_eq!(client.read_line().await.as_deref(), Some(SHUTDOWN_NOTICE));
    client.wait_for_close().await;

    let report = stopping.await.unwrap();
    assert!(!report.timed_out);
}
