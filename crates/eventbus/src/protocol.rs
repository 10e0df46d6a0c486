// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Wire contract shared by the server and client: the two RPC methods and
//! the payload shapes carried inside them. The concrete framing that moves
//! these payloads over a TCP socket lives in [`crate::transport`].

use serde::{Deserialize, Serialize};

/// Protocol version advertised by this crate's client. The server only
/// writes a sync frame when the client declares a version `>= 1`.
pub const PROTOCOL_VERSION: u32 = 1;

/// RPC method name for the long-lived broadcast subscription.
pub const METHOD_MESSAGES: &str = "messages";
/// RPC method name for the one-shot liveness probe.
pub const METHOD_PING: &str = "ping";

/// Argument object for the `messages` RPC.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessagesArgs {
    pub client_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<u32>,
}

/// Argument object for the `ping` RPC.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PingArgs {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub req_id: Option<String>,
}

/// An event broadcast by the server to every current subscription.
///
/// `req_id` and `server_id` are filled in by the server before the event
/// reaches the wire; callers of [`crate::server::Server::send`] may omit
/// `req_id` (the server assigns one) but never `server_id` (the server
/// always overwrites it).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    pub name: String,
    pub value: serde_json::Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub req_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub server_id: Option<String>,
}

impl Event {
    /// Construct an event with only the fields a caller of `send` provides.
    pub fn new(name: impl Into<String>, value: serde_json::Value) -> Self {
        Self { id: None, name: name.into(), value, req_id: None, server_id: None }
    }

    /// Attach a monotonic sequence number.
    pub fn with_id(mut self, id: i64) -> Self {
        self.id = Some(id);
        self
    }

    /// Attach a caller-supplied correlation id. If omitted, the server
    /// assigns one.
    pub fn with_req_id(mut self, req_id: impl Into<String>) -> Self {
        self.req_id = Some(req_id.into());
        self
    }
}

/// The leading frame on a subscription opened with `version >= 1`, carrying
/// the server's last broadcast identifiers at the moment of subscribe.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncRecord {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_req_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_id: Option<i64>,
    pub server_id: String,
    pub version: u32,
}

impl SyncRecord {
    pub fn new(server_id: String, last_req_id: Option<String>, last_id: Option<i64>) -> Self {
        Self { name: "sync".to_owned(), last_req_id, last_id, server_id, version: PROTOCOL_VERSION }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_omits_absent_fields_on_the_wire() {
        let event = Event::new("update_name", serde_json::json!("foo"));
        let value = serde_json::to_value(&event).expect("serialize");
        let obj = value.as_object().expect("object");
        assert!(!obj.contains_key("id"));
        assert!(!obj.contains_key("req_id"));
        assert!(!obj.contains_key("server_id"));
    }

    #[test]
    fn sync_record_omits_absent_last_fields() {
        let sync = SyncRecord::new("S".to_owned(), None, None);
        let value = serde_json::to_value(&sync).expect("serialize");
        let obj = value.as_object().expect("object");
        assert!(!obj.contains_key("last_req_id"));
        assert!(!obj.contains_key("last_id"));
        assert_eq!(obj["name"], "sync");
        assert_eq!(obj["version"], 1);
    }

    #[test]
    fn event_value_may_be_false_or_null() {
        let falsy = Event::new("flag", serde_json::json!(false));
        assert_eq!(falsy.value, serde_json::json!(false));
        let nullish = Event::new("flag", serde_json::Value::Null);
        assert_eq!(nullish.value, serde_json::Value::Null);
    }
}
