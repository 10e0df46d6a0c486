// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The streaming client's finite state machine. One task owns all of this
//! state; every external call and socket callback funnels through the
//! `Command` queue so no two transitions ever run concurrently.

use std::collections::HashMap;
use std::io;
use std::time::Duration;

use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

use crate::client::backoff;
use crate::client::ClientConfig;
use crate::error::PingError;
use crate::protocol::{Event, MessagesArgs, PingArgs, METHOD_MESSAGES, METHOD_PING, PROTOCOL_VERSION};
use crate::transport::{self, FastWriter, WireFrame};

type PendingPings = HashMap<u64, oneshot::Sender<Result<(), PingError>>>;

/// Commands injected into the FSM's owning task. Every public [`Client`]
/// method and every socket callback is realised as one of these.
pub(crate) enum Command {
    Connect,
    Start,
    Close,
    Ping(oneshot::Sender<Result<(), PingError>>),
}

/// Notifications the FSM emits to its consumer.
#[derive(Debug, Clone)]
pub enum ClientEvent {
    /// Fires once, the first time the FSM enters `connected`.
    Connect,
    /// Fires once, the first time the FSM enters `started.ready`.
    Start,
    /// One event delivered while `started.ready`.
    Message(Event),
    /// Fires exactly once, on entering `stopped` via `closing`.
    Close,
    /// Fires on every state entry, named per the dotted state table.
    StateChanged(String),
}

/// The client FSM's states. Sub-states (`connecting.error`,
/// `started.waiting`, `started.ready`) are distinguished by [`ClientState::name`]
/// rather than by further enum nesting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientState {
    Stopped,
    Connecting,
    ConnectingError,
    Connected,
    Started,
    StartedWaiting,
    StartedReady,
    Restart,
    Closing,
}

impl ClientState {
    pub fn name(self) -> &'static str {
        match self {
            Self::Stopped => "stopped",
            Self::Connecting => "connecting",
            Self::ConnectingError => "connecting.error",
            Self::Connected => "connected",
            Self::Started => "started",
            Self::StartedWaiting => "started.waiting",
            Self::StartedReady => "started.ready",
            Self::Restart => "restart",
            Self::Closing => "closing",
        }
    }
}

/// An established TCP connection, split into an owned writer and a
/// background reader task that forwards frames over an mpsc channel. This
/// lets the FSM task hold the connection by plain `&mut` without any
/// aliasing between the read and write halves.
struct Connection {
    writer: FastWriter,
    frame_rx: mpsc::UnboundedReceiver<io::Result<WireFrame>>,
    reader_task: JoinHandle<()>,
}

impl Connection {
    fn new(stream: TcpStream) -> Self {
        let (reader, writer) = transport::split(stream);
        let (tx, rx) = mpsc::unbounded_channel();
        let reader_task = tokio::spawn(run_reader(reader, tx));
        Self { writer, frame_rx: rx, reader_task }
    }

    async fn recv(&mut self) -> Option<io::Result<WireFrame>> {
        self.frame_rx.recv().await
    }

    async fn send(&mut self, frame: &WireFrame) -> io::Result<()> {
        self.writer.send(frame).await
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        self.reader_task.abort();
    }
}

async fn run_reader(mut reader: transport::FastReader, tx: mpsc::UnboundedSender<io::Result<WireFrame>>) {
    loop {
        match reader.recv().await {
            Ok(Some(frame)) => {
                if tx.send(Ok(frame)).is_err() {
                    return;
                }
            }
            Ok(None) => {
                let _ = tx.send(Err(io::Error::new(io::ErrorKind::UnexpectedEof, "connection closed")));
                return;
            }
            Err(e) => {
                let _ = tx.send(Err(e));
                return;
            }
        }
    }
}

fn apply_keepalive(stream: &TcpStream) -> io::Result<()> {
    let sock_ref = socket2::SockRef::from(stream);
    let keepalive = socket2::TcpKeepalive::new().with_time(Duration::from_secs(10));
    sock_ref.set_tcp_keepalive(&keepalive)
}

fn connection_or_bug(conn: &mut Option<Connection>) -> &mut Connection {
    match conn {
        Some(conn) => conn,
        None => unreachable!("FSM reached connected/started without an open connection"),
    }
}

fn fail_all_pending(pending: &mut PendingPings) {
    for (_, reply) in pending.drain() {
        let _ = reply.send(Err(PingError::connection_ended()));
    }
}

fn complete_ping(call_id: u64, result: Result<(), PingError>, pending: &mut PendingPings) {
    if let Some(reply) = pending.remove(&call_id) {
        let _ = reply.send(result);
    }
}

async fn issue_ping(
    conn: &mut Connection,
    next_call_id: &mut u64,
    pending: &mut PendingPings,
    reply: oneshot::Sender<Result<(), PingError>>,
) {
    let call_id = *next_call_id;
    *next_call_id += 1;
    let args = PingArgs::default();
    let frame = WireFrame::Call {
        call_id,
        method: METHOD_PING.to_owned(),
        args: vec![serde_json::to_value(&args).unwrap_or(serde_json::Value::Null)],
    };
    if conn.send(&frame).await.is_err() {
        let _ = reply.send(Err(PingError::connection_ended()));
        return;
    }
    pending.insert(call_id, reply);
}

fn emit(event_tx: &mpsc::UnboundedSender<ClientEvent>, event: ClientEvent) {
    let _ = event_tx.send(event);
}

fn emit_state(event_tx: &mpsc::UnboundedSender<ClientEvent>, state: ClientState) {
    emit(event_tx, ClientEvent::StateChanged(state.name().to_owned()));
}

enum ConnectingOutcome {
    Connected(TcpStream),
    Failed(io::Error),
    Closing,
}

async fn run_connecting(
    config: &ClientConfig,
    cmd_rx: &mut mpsc::UnboundedReceiver<Command>,
) -> ConnectingOutcome {
    let connect_fut = TcpStream::connect((config.host.as_str(), config.port));
    tokio::pin!(connect_fut);
    loop {
        tokio::select! {
            result = &mut connect_fut => {
                return match result {
                    Ok(stream) => ConnectingOutcome::Connected(stream),
                    Err(e) => ConnectingOutcome::Failed(e),
                };
            }
            cmd = cmd_rx.recv() => {
                match cmd {
                    Some(Command::Close) | None => return ConnectingOutcome::Closing,
                    Some(Command::Ping(reply)) => {
                        let _ = reply.send(Err(PingError::not_connected()));
                    }
                    Some(Command::Connect) => assert!(false, "connect() called while already connecting"),
                    Some(Command::Start) => assert!(false, "start() called outside connected"),
                }
            }
        }
    }
}

enum ConnectingErrorOutcome {
    Retry,
    Closing,
}

async fn run_connecting_error(
    attempt: u32,
    cmd_rx: &mut mpsc::UnboundedReceiver<Command>,
) -> ConnectingErrorOutcome {
    let (delay, _) = backoff::backoff_for(attempt);
    let sleep = tokio::time::sleep(delay);
    tokio::pin!(sleep);
    loop {
        tokio::select! {
            _ = &mut sleep => return ConnectingErrorOutcome::Retry,
            cmd = cmd_rx.recv() => {
                match cmd {
                    Some(Command::Close) | None => return ConnectingErrorOutcome::Closing,
                    Some(Command::Ping(reply)) => {
                        let _ = reply.send(Err(PingError::not_connected()));
                    }
                    Some(Command::Connect) => assert!(false, "connect() called while reconnecting"),
                    Some(Command::Start) => assert!(false, "start() called outside connected"),
                }
            }
        }
    }
}

enum ConnectedOutcome {
    Start,
    Closing,
    Restart,
}

async fn wait_in_connected(
    conn: &mut Connection,
    next_call_id: &mut u64,
    pending: &mut PendingPings,
    cmd_rx: &mut mpsc::UnboundedReceiver<Command>,
) -> ConnectedOutcome {
    loop {
        tokio::select! {
            cmd = cmd_rx.recv() => {
                match cmd {
                    Some(Command::Start) => return ConnectedOutcome::Start,
                    Some(Command::Close) | None => return ConnectedOutcome::Closing,
                    Some(Command::Ping(reply)) => issue_ping(conn, next_call_id, pending, reply).await,
                    Some(Command::Connect) => assert!(false, "connect() called while already connected"),
                }
            }
            frame = conn.recv() => {
                match frame {
                    Some(Ok(WireFrame::Reply { call_id, ok, error })) => {
                        let result = if ok { Ok(()) } else { Err(PingError(error.unwrap_or_default())) };
                        complete_ping(call_id, result, pending);
                    }
                    Some(Ok(WireFrame::End { call_id })) => complete_ping(call_id, Ok(()), pending),
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        tracing::debug!(err = %e, "transport error while connected, reconnecting");
                        return ConnectedOutcome::Restart;
                    }
                    None => return ConnectedOutcome::Restart,
                }
            }
        }
    }
}

enum StreamOutcome {
    Restart,
    Closing,
}

async fn run_started(
    config: &ClientConfig,
    conn: &mut Connection,
    emitted_start: &mut bool,
    next_call_id: &mut u64,
    pending: &mut PendingPings,
    event_tx: &mpsc::UnboundedSender<ClientEvent>,
    cmd_rx: &mut mpsc::UnboundedReceiver<Command>,
) -> StreamOutcome {
    let call_id = *next_call_id;
    *next_call_id += 1;
    let args = MessagesArgs { client_id: config.client_id.clone(), version: Some(PROTOCOL_VERSION) };
    let frame = WireFrame::Call {
        call_id,
        method: METHOD_MESSAGES.to_owned(),
        args: vec![serde_json::to_value(&args).unwrap_or(serde_json::Value::Null)],
    };
    if conn.send(&frame).await.is_err() {
        return StreamOutcome::Restart;
    }

    emit_state(event_tx, ClientState::StartedWaiting);

    // The first frame on this call is the sync record; stash it and move on
    // to started.ready without emitting it as a message.
    loop {
        tokio::select! {
            cmd = cmd_rx.recv() => {
                match dispatch_streaming_command(cmd, conn, next_call_id, pending).await {
                    Some(outcome) => return outcome,
                    None => {}
                }
            }
            frame = conn.recv() => {
                match frame {
                    Some(Ok(WireFrame::Data { call_id: c, .. })) if c == call_id => break,
                    Some(Ok(WireFrame::End { call_id: c })) if c == call_id => return StreamOutcome::Restart,
                    Some(Ok(WireFrame::Reply { call_id: c, ok, error })) if pending.contains_key(&c) => {
                        let result = if ok { Ok(()) } else { Err(PingError(error.unwrap_or_default())) };
                        complete_ping(c, result, pending);
                    }
                    Some(Ok(WireFrame::End { call_id: c })) if pending.contains_key(&c) => {
                        complete_ping(c, Ok(()), pending);
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        tracing::debug!(err = %e, "transport error while awaiting sync, reconnecting");
                        return StreamOutcome::Restart;
                    }
                    None => return StreamOutcome::Restart,
                }
            }
        }
    }

    emit_state(event_tx, ClientState::StartedReady);
    if !*emitted_start {
        *emitted_start = true;
        emit(event_tx, ClientEvent::Start);
    }

    loop {
        tokio::select! {
            cmd = cmd_rx.recv() => {
                match dispatch_streaming_command(cmd, conn, next_call_id, pending).await {
                    Some(outcome) => return outcome,
                    None => {}
                }
            }
            frame = conn.recv() => {
                match frame {
                    Some(Ok(WireFrame::Data { call_id: c, payload })) if c == call_id => {
                        match serde_json::from_value::<Event>(payload) {
                            Ok(event) => emit(event_tx, ClientEvent::Message(event)),
                            Err(e) => tracing::warn!(err = %e, "failed to decode event frame"),
                        }
                    }
                    Some(Ok(WireFrame::End { call_id: c })) if c == call_id => return StreamOutcome::Restart,
                    Some(Ok(WireFrame::Reply { call_id: c, ok, error })) if pending.contains_key(&c) => {
                        let result = if ok { Ok(()) } else { Err(PingError(error.unwrap_or_default())) };
                        complete_ping(c, result, pending);
                    }
                    Some(Ok(WireFrame::End { call_id: c })) if pending.contains_key(&c) => {
                        complete_ping(c, Ok(()), pending);
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        tracing::debug!(err = %e, "transport error, reconnecting");
                        return StreamOutcome::Restart;
                    }
                    None => return StreamOutcome::Restart,
                }
            }
        }
    }
}

/// Handle a `Command` arriving while `started.waiting`/`started.ready` is
/// selecting concurrently on inbound frames. Returns `Some(outcome)` when
/// the command ends the streaming loop, `None` to keep looping.
async fn dispatch_streaming_command(
    cmd: Option<Command>,
    conn: &mut Connection,
    next_call_id: &mut u64,
    pending: &mut PendingPings,
) -> Option<StreamOutcome> {
    match cmd {
        Some(Command::Close) | None => Some(StreamOutcome::Closing),
        Some(Command::Ping(reply)) => {
            issue_ping(conn, next_call_id, pending, reply).await;
            None
        }
        Some(Command::Connect) => assert!(false, "connect() called while already connected"),
        Some(Command::Start) => assert!(false, "start() called while already started"),
    }
}

pub(crate) async fn run_fsm(
    config: ClientConfig,
    mut cmd_rx: mpsc::UnboundedReceiver<Command>,
    event_tx: mpsc::UnboundedSender<ClientEvent>,
) {
    let mut state = ClientState::Stopped;
    let mut attempt: u32 = 0;
    let mut emitted_connect = false;
    let mut emitted_start = false;
    let mut conn: Option<Connection> = None;
    let mut next_call_id: u64 = 1;
    let mut pending: PendingPings = HashMap::new();

    loop {
        emit_state(&event_tx, state);

        state = match state {
            ClientState::Stopped => match cmd_rx.recv().await {
                Some(Command::Connect) => ClientState::Connecting,
                Some(Command::Start) => assert!(false, "start() called while stopped"),
                Some(Command::Close) => assert!(false, "close() called while already stopped"),
                Some(Command::Ping(_)) => assert!(false, "ping() called while stopped"),
                None => return,
            },

            ClientState::Connecting => {
                attempt += 1;
                match run_connecting(&config, &mut cmd_rx).await {
                    ConnectingOutcome::Connected(stream) => {
                        if let Err(e) = apply_keepalive(&stream) {
                            tracing::debug!(err = %e, "failed to set tcp keepalive");
                        }
                        conn = Some(Connection::new(stream));
                        ClientState::Connected
                    }
                    ConnectingOutcome::Failed(err) => {
                        let (delay, _) = backoff::backoff_for(attempt);
                        backoff::log_connect_failure(&config.client_id, attempt, delay, &err);
                        ClientState::ConnectingError
                    }
                    ConnectingOutcome::Closing => ClientState::Closing,
                }
            }

            ClientState::ConnectingError => match run_connecting_error(attempt, &mut cmd_rx).await {
                ConnectingErrorOutcome::Retry => ClientState::Connecting,
                ConnectingErrorOutcome::Closing => ClientState::Closing,
            },

            ClientState::Connected if emitted_connect => ClientState::Started,
            ClientState::Connected => {
                emitted_connect = true;
                emit(&event_tx, ClientEvent::Connect);
                let c = connection_or_bug(&mut conn);
                match wait_in_connected(c, &mut next_call_id, &mut pending, &mut cmd_rx).await {
                    ConnectedOutcome::Start => ClientState::Started,
                    ConnectedOutcome::Closing => ClientState::Closing,
                    ConnectedOutcome::Restart => ClientState::Restart,
                }
            }

            ClientState::Started => {
                let c = connection_or_bug(&mut conn);
                match run_started(
                    &config,
                    c,
                    &mut emitted_start,
                    &mut next_call_id,
                    &mut pending,
                    &event_tx,
                    &mut cmd_rx,
                )
                .await
                {
                    StreamOutcome::Restart => ClientState::Restart,
                    StreamOutcome::Closing => ClientState::Closing,
                }
            }

            ClientState::StartedWaiting | ClientState::StartedReady => {
                unreachable!("started.waiting/.ready are only visited from within run_started")
            }

            ClientState::Restart => {
                conn = None;
                fail_all_pending(&mut pending);
                attempt = 0;
                ClientState::Connecting
            }

            ClientState::Closing => {
                conn = None;
                fail_all_pending(&mut pending);
                emit(&event_tx, ClientEvent::Close);
                ClientState::Stopped
            }
        };
    }
}

#[cfg(test)]
#[path = "fsm_tests.rs"]
mod tests;
