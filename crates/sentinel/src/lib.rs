//! Sentinels: time, file, and hotkey triggers that inject synthetic turns
//! back into the orchestrator.
//!
//! The engine owns the watcher subsystems and the persisted definitions
//! (`sentinels.json`). When a sentinel fires it composes a descriptive
//! message and invokes the single registered callback on a background
//! task, so watchers never block.

pub mod engine;
pub mod hotkey;
pub mod model;

pub use engine::{SentinelCallback, SentinelEngine};
pub use hotkey::{HotkeyBackend, ManualHotkeyBackend};
pub use model::{SentinelDoc, SentinelKind, TimeUnit};
