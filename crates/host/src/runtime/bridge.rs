//! The concurrency bridge: client fan-out, turn submission with session
//! serialization, cancellation, and sentinel-driven autonomous turns.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::mpsc;

use rh_domain::{ChatMessage, RESERVED_SESSION};

use crate::state::AppState;

use super::events::HostEvent;
use super::session_lock::SessionBusy;
use super::turn::{run_turn, TurnInput};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Client hub
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Connected clients receiving broadcasts. A failed send disconnects
/// the client.
pub struct ClientHub {
    clients: Mutex<HashMap<u64, mpsc::UnboundedSender<serde_json::Value>>>,
    next_id: AtomicU64,
}

impl Default for ClientHub {
    fn default() -> Self {
        Self::new()
    }
}

impl ClientHub {
    pub fn new() -> Self {
        Self {
            clients: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(1),
        }
    }

    /// Register a subscriber; the receiver drains broadcast events.
    pub fn register(&self) -> (u64, mpsc::UnboundedReceiver<serde_json::Value>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.clients.lock().insert(id, tx);
        tracing::debug!(client_id = id, "client connected");
        (id, rx)
    }

    pub fn unregister(&self, client_id: u64) {
        self.clients.lock().remove(&client_id);
        tracing::debug!(client_id, "client disconnected");
    }

    /// Forward an event to every client, dropping the ones that fail.
    pub fn broadcast(&self, event: serde_json::Value) {
        let mut clients = self.clients.lock();
        clients.retain(|id, tx| {
            let alive = tx.send(event.clone()).is_ok();
            if !alive {
                tracing::debug!(client_id = id, "dropping dead client");
            }
            alive
        });
    }

    pub fn client_count(&self) -> usize {
        self.clients.lock().len()
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Turn submission
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Start a turn on a session. Rejects with [`SessionBusy`] while a prior
/// turn on the same session has not finished; different sessions run
/// fully concurrently.
pub fn submit_turn(
    state: &AppState,
    session_id: &str,
    user_text: &str,
) -> Result<mpsc::Receiver<HostEvent>, SessionBusy> {
    let permit = state.session_locks.try_acquire(session_id)?;
    let token = state.cancel_map.prepare(session_id);
    let input = TurnInput {
        session_id: session_id.to_owned(),
        user_text: user_text.to_owned(),
    };
    Ok(run_turn(state.clone(), input, token, Some(permit)))
}

/// Signal cancellation for one session, or for all when `session_id` is
/// `None`.
pub fn cancel(state: &AppState, session_id: Option<&str>) -> bool {
    match session_id {
        Some(session) => state.cancel_map.cancel(session),
        None => {
            state.cancel_map.cancel_all();
            true
        }
    }
}

/// Drain a turn's events into the broadcast hub, tagging each with the
/// session id. Returns the accumulated assistant text.
pub async fn pump_to_clients(
    state: &AppState,
    session_id: &str,
    mut rx: mpsc::Receiver<HostEvent>,
) -> String {
    let mut text = String::new();
    while let Some(event) = rx.recv().await {
        if let HostEvent::Delta { content } = &event {
            text.push_str(content);
        }
        state.clients.broadcast(event.tagged(session_id));
    }
    text
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Sentinel ingestion
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Wire the sentinel engine's callback into the bridge: every trigger
/// injects an alert into the reserved session and drives an autonomous
/// turn there.
pub fn install_sentinel_callback(state: AppState) {
    let engine = state.sentinels.clone();
    engine.set_callback(Arc::new(move |message| {
        let state = state.clone();
        tokio::spawn(async move {
            autonomous_reaction(state, message).await;
        });
    }));
}

/// Sentinel trigger handling: record the alert, run a synthetic user
/// turn on `resonance_main`, broadcast its events, and forward the
/// trimmed response to the notification sink.
pub async fn autonomous_reaction(state: AppState, trigger_message: String) {
    tracing::info!(message = %trigger_message, "autonomous reaction started");

    // 1. Record the alert in the main session's log.
    let timestamp = chrono::Utc::now().format("%Y-%m-%d %H:%M:%S");
    let alert = format!("[Sentinel Alert {timestamp}]: {trigger_message}");
    if let Err(e) = state
        .transcripts
        .append(RESERVED_SESSION, ChatMessage::system(&alert))
    {
        tracing::warn!(error = %e, "failed to record sentinel alert");
    }

    // 2. Tell connected clients a reaction is underway.
    state.clients.broadcast(serde_json::json!({
        "type": "sentinel_alert",
        "content": format!("Sentinel triggered. AI is responding to: {trigger_message}"),
        "session_id": RESERVED_SESSION,
    }));

    // 3. Drive the normal loop with a synthetic user turn.
    let prompt =
        format!("[System Alert]: {trigger_message}. Please check this and take necessary actions.");
    let rx = match submit_turn(&state, RESERVED_SESSION, &prompt) {
        Ok(rx) => rx,
        Err(SessionBusy) => {
            tracing::warn!("main session busy, sentinel reaction skipped");
            return;
        }
    };
    let response = pump_to_clients(&state, RESERVED_SESSION, rx).await;

    // 4. Surface the outcome as a notification.
    let clean = response.replace(['*', '#'], "");
    let trimmed = clean.trim();
    if !trimmed.is_empty() {
        let display: String = trimmed.chars().take(120).collect();
        state
            .notifier
            .notify("Resonance (Sentinel Response)", &display);
    }
}
