//! facegate-store — Persistent identity store.
//!
//! Identities are JSON documents in a SQLite table, one per registered
//! face. The read path transparently adapts the two persisted record
//! shapes (current single-`encoding` and legacy `face_encodings` list)
//! into the canonical [`facegate_core::Identity`] and skips anything that
//! matches neither.

mod record;
mod store;

pub use store::{IdentityStore, MemoryStore, SqliteStore, StoreError};
