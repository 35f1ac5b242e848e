//! Per-session transcript persistence.
//!
//! Each session is an append-only sequence of messages stored as a JSON
//! array in `sessions/<id>.log`, with a companion `<id>.summary` text blob.
//! Writes are whole-file replacements guarded by a per-session lock.

pub mod store;

pub use store::{SessionSummary, StoredMessage, TranscriptStore};
