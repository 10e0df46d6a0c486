// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::time::Duration;

use tokio::time::timeout;

use super::*;
use crate::protocol::Event;
use crate::server::{Server, ServerConfig};

fn config(client_id: &str, port: u16) -> ClientConfig {
    ClientConfig { client_id: client_id.to_owned(), host: "127.0.0.1".to_owned(), port }
}

async fn next_message(events: &mut mpsc::UnboundedReceiver<ClientEvent>) -> Event {
    loop {
        match timeout(Duration::from_secs(5), events.recv()).await.expect("timed out").expect("closed")
        {
            ClientEvent::Message(event) => return event,
            _ => continue,
        }
    }
}

async fn wait_for(events: &mut mpsc::UnboundedReceiver<ClientEvent>, want: impl Fn(&ClientEvent) -> bool) {
    loop {
        let event =
            timeout(Duration::from_secs(5), events.recv()).await.expect("timed out").expect("closed");
        if want(&event) {
            return;
        }
    }
}

/// S1 — two clients connect and start; a broadcast reaches both with the
/// server's identity stamped on.
#[tokio::test]
async fn two_clients_receive_an_identical_broadcast() {
    let server = Server::new(ServerConfig { server_id: Some("S".to_owned()) });
    let addr = server.listen("127.0.0.1:0").await.expect("listen");

    let (client_a, mut events_a) = Client::new(config("a", addr.port()));
    let (client_b, mut events_b) = Client::new(config("b", addr.port()));
    client_a.connect();
    client_b.connect();
    wait_for(&mut events_a, |e| matches!(e, ClientEvent::Connect)).await;
    wait_for(&mut events_b, |e| matches!(e, ClientEvent::Connect)).await;
    client_a.start();
    client_b.start();
    wait_for(&mut events_a, |e| matches!(e, ClientEvent::Start)).await;
    wait_for(&mut events_b, |e| matches!(e, ClientEvent::Start)).await;

    server
        .send(Event::new("update_name", serde_json::json!("foo")).with_id(4).with_req_id("R"))
        .await;

    for events in [&mut events_a, &mut events_b] {
        let msg = next_message(events).await;
        assert_eq!(msg.id, Some(4));
        assert_eq!(msg.req_id.as_deref(), Some("R"));
        assert_eq!(msg.name, "update_name");
        assert_eq!(msg.value, serde_json::json!("foo"));
        assert_eq!(msg.server_id.as_deref(), Some("S"));
    }

    client_a.close();
    client_b.close();
    server.close().await;
}

/// S2 — a ping against a live, started client completes without error.
#[tokio::test]
async fn ping_against_a_running_server_succeeds() {
    let server = Server::new(ServerConfig::default());
    let addr = server.listen("127.0.0.1:0").await.expect("listen");

    let (client, mut events) = Client::new(config("pinger", addr.port()));
    client.connect();
    wait_for(&mut events, |e| matches!(e, ClientEvent::Connect)).await;

    assert_eq!(client.ping().await, Ok(()));

    client.close();
    server.close().await;
}

/// S3 — pinging a client constructed for an unreachable port yields the
/// exact `stream not connected` error, and `close()` still emits `Close`.
#[tokio::test]
async fn ping_on_an_unreachable_client_reports_not_connected() {
    let closed_port = {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.expect("bind");
        listener.local_addr().expect("addr").port()
    };
    let (client, mut events) = Client::new(config("unreachable", closed_port));
    client.connect();

    let result = client.ping().await;
    assert_eq!(result, Err(PingError::not_connected()));

    client.close();
    wait_for(&mut events, |e| matches!(e, ClientEvent::Close)).await;
}

/// S4 — after a client closes, a new client reusing its `client_id`
/// receives broadcasts normally (the server evicted the stale entry).
#[tokio::test]
async fn a_new_client_can_reuse_a_closed_clients_id() {
    let server = Server::new(ServerConfig::default());
    let addr = server.listen("127.0.0.1:0").await.expect("listen");

    let (first, mut first_events) = Client::new(config("C", addr.port()));
    first.connect();
    wait_for(&mut first_events, |e| matches!(e, ClientEvent::Connect)).await;
    first.start();
    wait_for(&mut first_events, |e| matches!(e, ClientEvent::Start)).await;
    first.close();
    wait_for(&mut first_events, |e| matches!(e, ClientEvent::Close)).await;

    let (second, mut second_events) = Client::new(config("C", addr.port()));
    second.connect();
    wait_for(&mut second_events, |e| matches!(e, ClientEvent::Connect)).await;
    second.start();
    wait_for(&mut second_events, |e| matches!(e, ClientEvent::Start)).await;

    server
        .send(
            Event::new("informational", serde_json::json!({"a": 5, "b": "12"}))
                .with_id(5)
                .with_req_id("R2"),
        )
        .await;

    let msg = next_message(&mut second_events).await;
    assert_eq!(msg.id, Some(5));
    assert_eq!(msg.name, "informational");
    assert!(msg.server_id.is_some());

    second.close();
    server.close().await;
}
