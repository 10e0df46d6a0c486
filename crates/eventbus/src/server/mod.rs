// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The subscription server: accepts Fast-transport connections, registers
//! one `messages` subscription per `client_id`, and fans broadcast events
//! out to every live subscription.

pub mod registry;
pub mod rpc;

use std::io;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use serde_json::Value;
use tokio::net::{TcpListener, TcpStream, ToSocketAddrs};
use tokio::sync::{mpsc, Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::protocol::{Event, SyncRecord, METHOD_MESSAGES, METHOD_PING};
use crate::server::registry::Registry;
use crate::server::rpc::{validate_messages_args, validate_ping_args};
use crate::transport::{self, FastWriter, WireFrame};

/// Constructor configuration for [`Server`].
#[derive(Debug, Clone, Default, clap::Args)]
pub struct ServerConfig {
    /// Server identity stamped on every outbound event. A UUID v4 is
    /// generated when absent.
    #[arg(long, env = "EVENTBUS_SERVER_ID")]
    pub server_id: Option<String>,
}

struct Inner {
    server_id: String,
    registry: RwLock<Registry>,
    last_req_id: RwLock<Option<String>>,
    last_id: RwLock<Option<i64>>,
    next_req_id: AtomicU64,
    cancel: CancellationToken,
    accept_task: Mutex<Option<JoinHandle<()>>>,
}

/// A one-to-many event broadcaster over the Fast transport.
///
/// Cheaply `Clone`-able; every clone shares the same registry and
/// listening socket.
#[derive(Clone)]
pub struct Server {
    inner: Arc<Inner>,
}

impl Server {
    pub fn new(config: ServerConfig) -> Self {
        let server_id = config.server_id.unwrap_or_else(|| Uuid::new_v4().to_string());
        Self {
            inner: Arc::new(Inner {
                server_id,
                registry: RwLock::new(Registry::new()),
                last_req_id: RwLock::new(None),
                last_id: RwLock::new(None),
                next_req_id: AtomicU64::new(0),
                cancel: CancellationToken::new(),
                accept_task: Mutex::new(None),
            }),
        }
    }

    pub fn server_id(&self) -> &str {
        &self.inner.server_id
    }

    /// Bind and start accepting Fast-transport connections.
    pub async fn listen(&self, addr: impl ToSocketAddrs) -> io::Result<SocketAddr> {
        let listener = TcpListener::bind(addr).await?;
        let local_addr = listener.local_addr()?;
        let inner = Arc::clone(&self.inner);
        let handle = tokio::spawn(accept_loop(inner, listener));
        *self.inner.accept_task.lock().await = Some(handle);
        tracing::info!(server_id = %self.inner.server_id, %local_addr, "event bus listening");
        Ok(local_addr)
    }

    /// Broadcast `event` to every live subscription. `req_id` is assigned
    /// if absent; `server_id` is always overwritten.
    ///
    /// `event.name` must be non-empty; violating that is a caller bug and
    /// fails loudly rather than broadcasting a malformed event.
    pub async fn send(&self, mut event: Event) {
        assert!(!event.name.is_empty(), "event.name must be non-empty");
        if event.req_id.is_none() {
            let seq = self.inner.next_req_id.fetch_add(1, Ordering::Relaxed);
            event.req_id = Some(format!("{}-{seq}", self.inner.server_id));
        }
        event.server_id = Some(self.inner.server_id.clone());

        *self.inner.last_req_id.write().await = event.req_id.clone();
        if event.id.is_some() {
            *self.inner.last_id.write().await = event.id;
        }

        let payload = match serde_json::to_value(&event) {
            Ok(payload) => payload,
            Err(e) => {
                tracing::warn!(err = %e, "failed to encode event, dropping broadcast");
                return;
            }
        };

        let subscriptions = self.inner.registry.read().await.snapshot();
        for sub in subscriptions {
            if !sub.send_event(payload.clone()) {
                tracing::warn!(client_id = %sub.client_id, "subscription write failed");
            }
        }
    }

    /// Number of currently registered subscriptions.
    pub async fn client_count(&self) -> usize {
        self.inner.registry.read().await.len()
    }

    /// Registered client ids, in registration order.
    pub async fn client_ids(&self) -> Vec<String> {
        self.inner.registry.read().await.client_ids()
    }

    /// End every subscription, stop accepting new connections, and wait
    /// for the listening socket to close.
    pub async fn close(&self) {
        self.inner.cancel.cancel();
        let subscriptions = self.inner.registry.write().await.clear();
        for sub in subscriptions {
            sub.end();
        }
        if let Some(handle) = self.inner.accept_task.lock().await.take() {
            let _ = handle.await;
        }
    }

    /// Like [`Server::close`], invoking `callback` once the listening
    /// socket has closed.
    pub async fn close_then(&self, callback: impl FnOnce()) {
        self.close().await;
        callback();
    }
}

async fn accept_loop(inner: Arc<Inner>, listener: TcpListener) {
    loop {
        tokio::select! {
            _ = inner.cancel.cancelled() => {
                tracing::debug!("server closed, no longer accepting connections");
                return;
            }
            accepted = listener.accept() => {
                match accepted {
                    Ok((stream, peer)) => {
                        let inner = Arc::clone(&inner);
                        tokio::spawn(async move {
                            if let Err(e) = handle_connection(Arc::clone(&inner), stream).await {
                                tracing::debug!(%peer, err = %e, "connection ended");
                            }
                        });
                    }
                    Err(e) => tracing::warn!(err = %e, "accept failed"),
                }
            }
        }
    }
}

async fn handle_connection(inner: Arc<Inner>, stream: TcpStream) -> io::Result<()> {
    let (mut reader, writer) = transport::split(stream);
    let (writer_tx, writer_rx) = mpsc::unbounded_channel();
    tokio::spawn(run_writer(writer, writer_rx));

    // The `messages` subscription this connection currently owns, if any.
    let mut registration: Option<(String, u64)> = None;

    loop {
        match reader.recv().await? {
            Some(WireFrame::Call { call_id, method, args }) => {
                dispatch_call(&inner, &writer_tx, &mut registration, call_id, &method, args)
                    .await;
            }
            Some(WireFrame::End { .. }) => {
                if let Some((client_id, generation)) = registration.take() {
                    inner.registry.write().await.remove_if_same(&client_id, generation);
                }
            }
            Some(_) => {} // a well-behaved client never sends Reply/Data
            None => break,
        }
    }

    if let Some((client_id, generation)) = registration {
        inner.registry.write().await.remove_if_same(&client_id, generation);
    }
    Ok(())
}

async fn dispatch_call(
    inner: &Arc<Inner>,
    writer_tx: &mpsc::UnboundedSender<WireFrame>,
    registration: &mut Option<(String, u64)>,
    call_id: u64,
    method: &str,
    args: Vec<Value>,
) {
    match method {
        METHOD_MESSAGES => match validate_messages_args(&args) {
            Ok(parsed) => {
                if let Some((old_id, old_generation)) = registration.take() {
                    inner.registry.write().await.remove_if_same(&old_id, old_generation);
                }
                let version = parsed.version.unwrap_or(0);
                let (generation, evicted) = inner.registry.write().await.register(
                    parsed.client_id.clone(),
                    version,
                    call_id,
                    writer_tx.clone(),
                );
                if let Some(evicted) = evicted {
                    tracing::warn!(client_id = %parsed.client_id, "evicting duplicate subscription");
                    evicted.end();
                }
                *registration = Some((parsed.client_id, generation));

                if version >= 1 {
                    let last_req_id = inner.last_req_id.read().await.clone();
                    let last_id = *inner.last_id.read().await;
                    let sync = SyncRecord::new(inner.server_id.clone(), last_req_id, last_id);
                    match serde_json::to_value(&sync) {
                        Ok(payload) => {
                            let _ = writer_tx.send(WireFrame::Data { call_id, payload });
                        }
                        Err(e) => tracing::warn!(err = %e, "failed to encode sync record"),
                    }
                }
            }
            Err(e) => {
                let _ = writer_tx.send(WireFrame::Reply {
                    call_id,
                    ok: false,
                    error: Some(e.message().to_owned()),
                });
            }
        },
        METHOD_PING => match validate_ping_args(&args) {
            Ok(parsed) => {
                let req_id = parsed.req_id.unwrap_or_else(|| Uuid::new_v4().to_string());
                tracing::debug!(req_id = %req_id, "ping");
                let _ = writer_tx.send(WireFrame::End { call_id });
            }
            Err(e) => {
                let _ = writer_tx.send(WireFrame::Reply {
                    call_id,
                    ok: false,
                    error: Some(e.message().to_owned()),
                });
            }
        },
        other => {
            let _ = writer_tx.send(WireFrame::Reply {
                call_id,
                ok: false,
                error: Some(format!("unknown method \"{other}\"")),
            });
        }
    }
}

async fn run_writer(mut writer: FastWriter, mut rx: mpsc::UnboundedReceiver<WireFrame>) {
    while let Some(frame) = rx.recv().await {
        if let Err(e) = writer.send(&frame).await {
            tracing::debug!(err = %e, "connection write failed, dropping it");
            break;
        }
    }
}

#[cfg(test)]
#[path = "mod_tests.rs"]
mod tests;
