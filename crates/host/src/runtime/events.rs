//! The streaming event contract between the orchestrator and clients.

use serde::Serialize;

/// Events a turn yields to the bridge. The bridge tags each with the
/// session id before broadcast.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum HostEvent {
    /// Progress beacon.
    Status { content: String },
    /// Incremental assistant text.
    Delta { content: String },
    /// Raw tool result.
    Tool { name: String, content: String },
    /// Fatal transport failure; the turn aborts.
    Error { content: String },
    /// Terminal marker; exactly one per turn.
    Done,
}

impl HostEvent {
    /// Serialize with the session id attached, as broadcast to clients.
    pub fn tagged(&self, session_id: &str) -> serde_json::Value {
        let mut value = serde_json::to_value(self).unwrap_or_else(|_| serde_json::json!({}));
        if let Some(obj) = value.as_object_mut() {
            obj.insert(
                "session_id".to_owned(),
                serde_json::Value::String(session_id.to_owned()),
            );
        }
        value
    }
}
