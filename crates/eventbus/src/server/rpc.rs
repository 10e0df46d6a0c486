// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Argument validation for the two RPC methods the server exposes. Rejected
//! here, before any registry mutation — see the exact wire strings in
//! [`crate::error::RpcError`].

use serde_json::Value;

use crate::error::RpcError;
use crate::protocol::{MessagesArgs, PingArgs};

/// Validate a `messages` call's argument list.
pub fn validate_messages_args(args: &[Value]) -> Result<MessagesArgs, RpcError> {
    let [arg] = args else {
        return Err(RpcError::MessagesExpectsOneArgument);
    };
    let obj = arg.as_object().ok_or(RpcError::MessagesExpectsOptionsObject)?;
    let client_id = obj
        .get("client_id")
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .ok_or(RpcError::MessagesMissingClientId)?;
    let version = obj.get("version").and_then(Value::as_u64).map(|v| v as u32);
    Ok(MessagesArgs { client_id: client_id.to_owned(), version })
}

/// Validate a `ping` call's argument list.
pub fn validate_ping_args(args: &[Value]) -> Result<PingArgs, RpcError> {
    let [arg] = args else {
        return Err(RpcError::PingExpectsOneArgument);
    };
    let obj = arg.as_object().ok_or(RpcError::PingExpectsOptionsObject)?;
    let req_id = match obj.get("req_id") {
        None | Some(Value::Null) => None,
        Some(Value::String(s)) => Some(s.clone()),
        Some(_) => return Err(RpcError::PingReqIdNotString),
    };
    Ok(PingArgs { req_id })
}
