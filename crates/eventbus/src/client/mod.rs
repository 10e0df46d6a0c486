// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The streaming client's public surface: a handle that drives the FSM in
//! [`fsm`] from its own task and a channel of [`ClientEvent`]s the consumer
//! drains at its own pace.

mod backoff;
mod fsm;

use tokio::sync::{mpsc, oneshot};

use crate::error::PingError;
pub use fsm::{ClientEvent, ClientState};
use fsm::Command;

/// Constructor configuration for [`Client`].
#[derive(Debug, Clone, clap::Args)]
pub struct ClientConfig {
    /// Identity this client registers under. The server evicts any existing
    /// subscription with the same id.
    #[arg(long, env = "EVENTBUS_CLIENT_ID")]
    pub client_id: String,
    /// Server host to connect to.
    #[arg(long, default_value = "127.0.0.1", env = "EVENTBUS_HOST")]
    pub host: String,
    /// Server port to connect to.
    #[arg(long, default_value_t = 9800, env = "EVENTBUS_PORT")]
    pub port: u16,
}

/// A handle to one client FSM, running on its own task.
///
/// Every method here posts a [`Command`] into the FSM's queue rather than
/// touching its state directly — see [`fsm::run_fsm`] for why that's the
/// only thing that keeps transitions serialised.
pub struct Client {
    cmd_tx: mpsc::UnboundedSender<Command>,
}

impl Client {
    /// Spawn the FSM task for `config` and return a handle to it alongside
    /// the channel of [`ClientEvent`]s it emits. The FSM starts in
    /// `stopped`; call [`Client::connect`] to begin.
    pub fn new(config: ClientConfig) -> (Self, mpsc::UnboundedReceiver<ClientEvent>) {
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        tokio::spawn(fsm::run_fsm(config, cmd_rx, event_tx));
        (Self { cmd_tx }, event_rx)
    }

    /// Begin connecting. Permitted only while `stopped`; calling this
    /// again before a `close()` is a programming error and the FSM task
    /// panics on receipt, per `connect()`'s "asserts otherwise" contract.
    pub fn connect(&self) {
        let _ = self.cmd_tx.send(Command::Connect);
    }

    /// Request the `messages` subscription. Permitted only while
    /// `connected`. Sticky across reconnects: once requested, the FSM
    /// re-enters `started` automatically after any `restart`.
    pub fn start(&self) {
        let _ = self.cmd_tx.send(Command::Start);
    }

    /// Tear the client down. Permitted in any state but `stopped`;
    /// preempts any in-flight connect, backoff, or RPC.
    pub fn close(&self) {
        let _ = self.cmd_tx.send(Command::Close);
    }

    /// Issue a one-shot liveness probe. Resolves with
    /// [`PingError::not_connected`] if the FSM hasn't reached `connected`
    /// yet; otherwise resolves once the server acknowledges (or the
    /// connection ends first).
    pub async fn ping(&self) -> Result<(), PingError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        if self.cmd_tx.send(Command::Ping(reply_tx)).is_err() {
            return Err(PingError::connection_ended());
        }
        reply_rx.await.unwrap_or_else(|_| Err(PingError::connection_ended()))
    }
}

#[cfg(test)]
#[path = "client_tests.rs"]
mod tests;
