//! Presence registry for the Peerlink relay.
//!
//! The relay remembers, for every online user, which port their peer
//! acceptor listens on and when they last proved they were alive.
//! [`RegistryStore`] holds that mapping and is shared (behind an `Arc`)
//! by every relay connection handler and the expiry sweep.
//!
//! # Lifecycle of an entry
//!
//! ```text
//! NEW ──→ upsert() ──→ [registered] ──touch()──→ [registered]
//!                          │    │
//!              REMOVE ─────┘    └───── sweep_expired() after TTL
//!                 ▼                         ▼
//!             [absent]                  [absent]
//! ```

mod store;

pub use store::{RegistryEntry, RegistryStore};
