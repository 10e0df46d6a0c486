// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Error types for the event bus: RPC argument validation and client ping
//! failures. Both carry the exact diagnostic strings required at the wire
//! boundary; neither mutates state before being raised.

use std::fmt;

/// Argument-validation failure for an incoming RPC call. Raised at the
/// boundary before any registry mutation; the message text is part of the
/// wire contract and must not change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RpcError {
    MessagesExpectsOneArgument,
    MessagesExpectsOptionsObject,
    MessagesMissingClientId,
    PingExpectsOneArgument,
    PingExpectsOptionsObject,
    PingReqIdNotString,
}

impl RpcError {
    pub fn message(&self) -> &'static str {
        match self {
            Self::MessagesExpectsOneArgument => "\"messages\" RPC expects one argument",
            Self::MessagesExpectsOptionsObject => "\"messages\" RPC expects an options object",
            Self::MessagesMissingClientId => "clients must provide their \"client_id\"",
            Self::PingExpectsOneArgument => "\"ping\" RPC expects one argument",
            Self::PingExpectsOptionsObject => "\"ping\" RPC expects an options object",
            Self::PingReqIdNotString => "\"req_id\" must be a string if provided",
        }
    }
}

impl fmt::Display for RpcError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.message())
    }
}

impl std::error::Error for RpcError {}

/// The exact message a client's `ping()` callback receives when invoked
/// before the RPC client exists (i.e. before `connected` or later).
pub const STREAM_NOT_CONNECTED: &str = "stream not connected";

/// Error returned from [`crate::client::Client::ping`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PingError(pub String);

impl PingError {
    pub fn not_connected() -> Self {
        Self(STREAM_NOT_CONNECTED.to_owned())
    }

    /// Returned to an in-flight `ping()` whose connection tore down (close
    /// or transport failure) before the server replied.
    pub fn connection_ended() -> Self {
        Self("connection ended".to_owned())
    }
}

impl fmt::Display for PingError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::error::Error for PingError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rpc_error_messages_match_wire_contract() {
        assert_eq!(
            RpcError::MessagesExpectsOneArgument.message(),
            "\"messages\" RPC expects one argument"
        );
        assert_eq!(
            RpcError::MessagesExpectsOptionsObject.message(),
            "\"messages\" RPC expects an options object"
        );
        assert_eq!(
            RpcError::MessagesMissingClientId.message(),
            "clients must provide their \"client_id\""
        );
        assert_eq!(RpcError::PingExpectsOneArgument.message(), "\"ping\" RPC expects one argument");
        assert_eq!(
            RpcError::PingExpectsOptionsObject.message(),
            "\"ping\" RPC expects an options object"
        );
        assert_eq!(RpcError::PingReqIdNotString.message(), "\"req_id\" must be a string if provided");
    }

    #[test]
    fn ping_error_not_connected_matches_exact_string() {
        assert_eq!(PingError::not_connected().to_string(), "stream not connected");
    }
}
