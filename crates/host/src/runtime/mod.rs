//! Core runtime: the orchestrator loop, tool dispatch, and the
//! concurrency bridge between blocking tool work and async clients.

pub mod bridge;
pub mod cancel;
pub mod dispatch;
pub mod events;
pub mod prompt;
pub mod session_lock;
pub mod turn;

#[cfg(test)]
pub(crate) mod testutil;

pub use bridge::{cancel, install_sentinel_callback, submit_turn};
pub use events::HostEvent;
pub use turn::{run_turn, TurnInput};
