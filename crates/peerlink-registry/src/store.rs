//! The registry store: username → (listen port, last seen).
//!
//! # Concurrency note
//!
//! Unlike a plain `HashMap` behind one big lock, the store is backed by a
//! sharded [`DashMap`]. Every operation touches a single key and is
//! atomic for that key, so relay handlers working on different users
//! never wait on each other. The sweep walks the shards one at a time
//! and removes each expired entry atomically, without a global lock.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use dashmap::DashMap;
use peerlink_protocol::PeerEntry;

/// What the relay knows about one registered user.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegistryEntry {
    /// Port the user's peer acceptor is bound to.
    pub listen_port: u16,
    /// Last time the user registered or sent a keep-alive.
    pub last_seen_at: Instant,
    /// Insertion order, used to order snapshots.
    seq: u64,
}

/// Thread-safe presence registry.
///
/// At most one entry exists per username. Registering an existing
/// username replaces its port and timestamp.
#[derive(Debug, Default)]
pub struct RegistryStore {
    entries: DashMap<String, RegistryEntry>,
    next_seq: AtomicU64,
}

impl RegistryStore {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `username` at `listen_port`, marking it seen now.
    pub fn upsert(&self, username: &str, listen_port: u16) {
        self.upsert_at(username, listen_port, Instant::now());
    }

    /// Registers `username` at `listen_port`, marking it seen at `now`.
    pub fn upsert_at(&self, username: &str, listen_port: u16, now: Instant) {
        let seq = self.next_seq.fetch_add(1, Ordering::Relaxed);
        let previous = self.entries.insert(
            username.to_string(),
            RegistryEntry {
                listen_port,
                last_seen_at: now,
                seq,
            },
        );
        if previous.is_some() {
            tracing::debug!(%username, listen_port, "registry entry replaced");
        }
    }

    /// Refreshes `username`'s timestamp to now.
    ///
    /// Returns `false` (and creates nothing) if the user is not
    /// registered. A late keep-alive racing a removal lands here.
    pub fn touch(&self, username: &str) -> bool {
        self.touch_at(username, Instant::now())
    }

    /// Refreshes `username`'s timestamp to `now`. See [`touch`](Self::touch).
    pub fn touch_at(&self, username: &str, now: Instant) -> bool {
        match self.entries.get_mut(username) {
            Some(mut entry) => {
                entry.last_seen_at = now;
                true
            }
            None => false,
        }
    }

    /// Removes `username`. Returns `true` if an entry was removed.
    pub fn remove(&self, username: &str) -> bool {
        self.entries.remove(username).is_some()
    }

    /// Returns every registered `(username, listen_port)` in insertion order.
    ///
    /// The order reflects the moment each entry was (re)registered, so it
    /// can change between calls as users come and go.
    pub fn snapshot(&self) -> Vec<PeerEntry> {
        let mut rows: Vec<(u64, PeerEntry)> = self
            .entries
            .iter()
            .map(|item| {
                (
                    item.value().seq,
                    PeerEntry {
                        username: item.key().clone(),
                        listen_port: item.value().listen_port,
                    },
                )
            })
            .collect();
        rows.sort_unstable_by_key(|(seq, _)| *seq);
        rows.into_iter().map(|(_, entry)| entry).collect()
    }

    /// Removes every entry with `now - last_seen_at > ttl` and returns
    /// the removed usernames.
    pub fn sweep_expired(&self, now: Instant, ttl: Duration) -> Vec<String> {
        let mut removed = Vec::new();
        self.entries.retain(|username, entry| {
            let idle = now.saturating_duration_since(entry.last_seen_at);
            if idle > ttl {
                removed.push(username.clone());
                false
            } else {
                true
            }
        });
        removed
    }

    /// Looks up a single entry.
    pub fn get(&self, username: &str) -> Option<RegistryEntry> {
        self.entries.get(username).map(|entry| *entry)
    }

    /// Returns `true` if `username` is registered.
    pub fn contains(&self, username: &str) -> bool {
        self.entries.contains_key(username)
    }

    /// Returns the number of registered users.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if nobody is registered.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

// =========================================================================
// Tests
// =========================================================================
