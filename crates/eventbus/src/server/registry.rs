// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Subscription registry: one live `messages` channel per `client_id`.
//!
//! Insertion order is preserved (the server's client list is reported in
//! registration order) and a newly registered client always lands at the
//! end, even when it displaces an older entry with the same id.

use indexmap::IndexMap;
use tokio::sync::mpsc;

use crate::transport::WireFrame;

/// A live subscription bound to one `client_id`.
///
/// `generation` distinguishes this registration from any later one that
/// reuses the same `client_id`, so a connection's own cleanup task never
/// removes a registry entry that has already been displaced.
#[derive(Clone)]
pub struct Subscription {
    pub client_id: String,
    pub version: u32,
    /// The `messages` call this subscription streams frames on; every
    /// [`WireFrame::Data`] written to `tx` must carry this id.
    pub call_id: u64,
    generation: u64,
    tx: mpsc::UnboundedSender<WireFrame>,
}

impl Subscription {
    /// Write an event as a `Data` frame on this subscription's `messages`
    /// call. Returns `false` if the writer task has already gone away.
    pub fn send_event(&self, payload: serde_json::Value) -> bool {
        self.tx.send(WireFrame::Data { call_id: self.call_id, payload }).is_ok()
    }

    /// End this subscription's `messages` call.
    pub fn end(&self) -> bool {
        self.tx.send(WireFrame::End { call_id: self.call_id }).is_ok()
    }
}

/// The server's subscription table. Callers guard this with a
/// `tokio::sync::RwLock`, held only across registry operations, never
/// across a network write.
#[derive(Default)]
pub struct Registry {
    subscriptions: IndexMap<String, Subscription>,
    next_generation: u64,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new subscription for `client_id`, evicting and returning
    /// any existing one first. The new entry is appended at the end of the
    /// client list regardless of where the evicted entry sat.
    pub fn register(
        &mut self,
        client_id: String,
        version: u32,
        call_id: u64,
        tx: mpsc::UnboundedSender<WireFrame>,
    ) -> (u64, Option<Subscription>) {
        self.next_generation += 1;
        let generation = self.next_generation;
        let evicted = self.subscriptions.shift_remove(&client_id);
        self.subscriptions.insert(
            client_id.clone(),
            Subscription { client_id, version, call_id, generation, tx },
        );
        (generation, evicted)
    }

    /// Remove `client_id`'s entry iff it is still the registration
    /// identified by `generation` (i.e. it hasn't already been displaced by
    /// a later `register` call for the same id).
    pub fn remove_if_same(&mut self, client_id: &str, generation: u64) -> Option<Subscription> {
        match self.subscriptions.get(client_id) {
            Some(existing) if existing.generation == generation => {
                self.subscriptions.shift_remove(client_id)
            }
            _ => None,
        }
    }

    /// A cloned snapshot of every live subscription, safe to iterate after
    /// releasing the lock that guards this registry.
    pub fn snapshot(&self) -> Vec<Subscription> {
        self.subscriptions.values().cloned().collect()
    }

    /// Remove every subscription, returning them so the caller can end
    /// each one's channel.
    pub fn clear(&mut self) -> Vec<Subscription> {
        std::mem::take(&mut self.subscriptions).into_values().collect()
    }

    /// Registered client ids, in registration order.
    pub fn client_ids(&self) -> Vec<String> {
        self.subscriptions.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.subscriptions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.subscriptions.is_empty()
    }
}

#[cfg(test)]
#[path = "registry_tests.rs"]
mod tests;
