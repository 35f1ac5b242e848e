//! Per-session cancel token map.
//!
//! Exactly one token exists per session; it is reused across turns and
//! cleared at the start of each.

use std::collections::HashMap;

use parking_lot::Mutex;

use rh_domain::CancelToken;

#[derive(Default)]
pub struct CancelMap {
    tokens: Mutex<HashMap<String, CancelToken>>,
}

impl CancelMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fetch the session's token, creating it on first use, and clear it
    /// for the upcoming turn.
    pub fn prepare(&self, session: &str) -> CancelToken {
        let token = self
            .tokens
            .lock()
            .entry(session.to_owned())
            .or_default()
            .clone();
        token.clear();
        token
    }

    /// Signal cancellation for one session. Returns whether a token
    /// existed. Setting is idempotent.
    pub fn cancel(&self, session: &str) -> bool {
        match self.tokens.lock().get(session) {
            Some(token) => {
                token.cancel();
                true
            }
            None => false,
        }
    }

    /// Signal cancellation for every session.
    pub fn cancel_all(&self) {
        for token in self.tokens.lock().values() {
            token.cancel();
        }
    }
}
