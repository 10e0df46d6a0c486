// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! A one-to-many event-broadcast service over a small framed-RPC transport.
//!
//! [`server::Server`] fans arbitrary events out to every client currently
//! holding a `messages` subscription; [`client::Client`] maintains one such
//! subscription as a durable, auto-reconnecting finite state machine so a
//! restart of either side is recovered transparently. See [`protocol`] for
//! the wire contract the two sides share and [`transport`] for the concrete
//! TCP encoding that carries it.

pub mod client;
pub mod config;
pub mod error;
pub mod protocol;
pub mod server;
pub mod transport;

pub use client::{Client, ClientConfig, ClientEvent, ClientState};
pub use error::{PingError, RpcError};
pub use protocol::{Event, SyncRecord, PROTOCOL_VERSION};
pub use server::{Server, ServerConfig};

use tokio::sync::mpsc;

use crate::config::ServeArgs;

/// Bind and run a [`Server`] until `ctrl_c`, per the `serve` subcommand.
pub async fn run_server(args: ServeArgs) -> anyhow::Result<()> {
    let server = Server::new(ServerConfig { server_id: args.server_id });
    let addr = server.listen((args.host.as_str(), args.port)).await?;
    tracing::info!(%addr, "event bus listening");

    tokio::signal::ctrl_c().await?;
    tracing::info!("shutting down");
    server.close().await;
    Ok(())
}

/// Connect a [`Client`], request streaming, and print every received event
/// as a line of JSON until `ctrl_c`, per the `client` subcommand.
pub async fn run_client(config: ClientConfig) -> anyhow::Result<()> {
    let (client, mut events) = Client::new(config);
    client.connect();

    let mut shutdown = std::pin::pin!(tokio::signal::ctrl_c());
    loop {
        tokio::select! {
            result = &mut shutdown => {
                result?;
                client.close();
                drain_until_close(&mut events).await;
                return Ok(());
            }
            event = events.recv() => match event {
                Some(ClientEvent::Connect) => client.start(),
                Some(ClientEvent::Start) => tracing::info!("streaming started"),
                Some(ClientEvent::Message(event)) => {
                    println!("{}", serde_json::to_string(&event)?);
                }
                Some(ClientEvent::StateChanged(state)) => tracing::debug!(%state, "state changed"),
                Some(ClientEvent::Close) | None => return Ok(()),
            },
        }
    }
}

async fn drain_until_close(events: &mut mpsc::UnboundedReceiver<ClientEvent>) {
    while let Some(event) = events.recv().await {
        if matches!(event, ClientEvent::Close) {
            return;
        }
    }
}
