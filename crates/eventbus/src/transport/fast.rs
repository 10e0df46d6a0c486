// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Concrete realization of the "Fast" framed-RPC transport over a raw TCP
//! socket: `tokio_util`'s length-delimited codec carrying JSON-encoded
//! [`WireFrame`]s, multiplexed by `call_id`. This is the wire-level
//! encoding, not the cross-system contract in `crate::protocol` — it is
//! the concrete choice made to carry that contract over TCP in the
//! absence of an external "Fast" transport library.

use std::io;

use futures_util::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio_util::codec::{FramedRead, FramedWrite, LengthDelimitedCodec};

/// One multiplexed frame on a Fast connection. A single TCP connection
/// carries any number of concurrent calls, distinguished by `call_id`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum WireFrame {
    /// Open a call. `args` mirrors Fast's variadic argument list — most
    /// validation here turns on its length, not just its contents.
    Call { call_id: u64, method: String, args: Vec<serde_json::Value> },
    /// Unary completion: `ping`'s reply, or a `messages` call rejected
    /// before any data was streamed.
    Reply {
        call_id: u64,
        ok: bool,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },
    /// One streamed payload (a sync record or an event) for a `messages`
    /// call.
    Data { call_id: u64, payload: serde_json::Value },
    /// End-of-stream, in either direction: the server closes a `messages`
    /// call, or the client signals it no longer wants one.
    End { call_id: u64 },
}

fn encode(frame: &WireFrame) -> io::Result<Vec<u8>> {
    serde_json::to_vec(frame).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
}

fn decode(bytes: &[u8]) -> io::Result<WireFrame> {
    serde_json::from_slice(bytes).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
}

/// Read half of a Fast connection.
pub struct FastReader {
    inner: FramedRead<OwnedReadHalf, LengthDelimitedCodec>,
}

impl FastReader {
    /// Read the next frame, or `None` on a clean end-of-stream.
    pub async fn recv(&mut self) -> io::Result<Option<WireFrame>> {
        match self.inner.next().await {
            Some(Ok(bytes)) => Ok(Some(decode(&bytes)?)),
            Some(Err(e)) => Err(e),
            None => Ok(None),
        }
    }
}

/// Write half of a Fast connection.
pub struct FastWriter {
    inner: FramedWrite<OwnedWriteHalf, LengthDelimitedCodec>,
}

impl FastWriter {
    pub async fn send(&mut self, frame: &WireFrame) -> io::Result<()> {
        let bytes = encode(frame)?;
        self.inner.send(bytes.into()).await
    }
}

/// Split an accepted or connected TCP socket into independent Fast
/// read/write halves so reads and writes can proceed concurrently.
pub fn split(stream: TcpStream) -> (FastReader, FastWriter) {
    let (read_half, write_half) = stream.into_split();
    let reader = FastReader { inner: FramedRead::new(read_half, LengthDelimitedCodec::new()) };
    let writer = FastWriter { inner: FramedWrite::new(write_half, LengthDelimitedCodec::new()) };
    (reader, writer)
}

#[cfg(test)]
#[path = "fast_tests.rs"]
mod tests;
