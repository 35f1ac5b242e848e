//! Transcript store — the owning component for session logs and summaries.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use rh_domain::error::{Error, Result};
use rh_domain::{ChatMessage, Role, ToolCallRequest, RESERVED_SESSION};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Stored message
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// One persisted transcript entry. Ids are monotonic per session and
/// assigned by the store on append; the wire form strips them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredMessage {
    pub id: u64,
    pub timestamp: DateTime<Utc>,
    pub role: Role,
    #[serde(default)]
    pub content: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCallRequest>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl StoredMessage {
    /// Whether this message carries any tool calls.
    pub fn has_tool_calls(&self) -> bool {
        !self.tool_calls.is_empty()
    }

    /// Strip persistence-only fields, producing the LLM wire form.
    pub fn to_wire(&self) -> ChatMessage {
        ChatMessage {
            role: self.role,
            content: self.content.clone(),
            tool_calls: self.tool_calls.clone(),
            tool_call_id: self.tool_call_id.clone(),
            name: self.name.clone(),
        }
    }
}

/// Session listing entry for the dashboard/API.
#[derive(Debug, Clone, Serialize)]
pub struct SessionSummary {
    pub id: String,
    pub updated_at: DateTime<Utc>,
    pub message_count: usize,
    pub preview: String,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Transcript store
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Owns every session log under `base_dir`.
///
/// A log is a JSON array; a summary is a sibling plaintext file. Typical
/// logs stay well under 10 MB, so writes replace the whole file under a
/// per-session lock.
pub struct TranscriptStore {
    base_dir: PathBuf,
    locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl TranscriptStore {
    pub fn new(base_dir: &Path) -> Result<Self> {
        std::fs::create_dir_all(base_dir).map_err(Error::Io)?;
        Ok(Self {
            base_dir: base_dir.to_path_buf(),
            locks: Mutex::new(HashMap::new()),
        })
    }

    fn log_path(&self, session: &str) -> PathBuf {
        self.base_dir.join(format!("{session}.log"))
    }

    fn summary_path(&self, session: &str) -> PathBuf {
        self.base_dir.join(format!("{session}.summary"))
    }

    fn session_lock(&self, session: &str) -> Arc<Mutex<()>> {
        self.locks
            .lock()
            .entry(session.to_owned())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    fn read_log(&self, session: &str) -> Vec<StoredMessage> {
        let path = self.log_path(session);
        if !path.exists() {
            return Vec::new();
        }
        match std::fs::read_to_string(&path) {
            Ok(raw) => match serde_json::from_str::<Vec<StoredMessage>>(&raw) {
                Ok(messages) => messages,
                Err(e) => {
                    tracing::warn!(session, error = %e, "malformed session log, treating as empty");
                    Vec::new()
                }
            },
            Err(e) => {
                tracing::warn!(session, error = %e, "failed to read session log");
                Vec::new()
            }
        }
    }

    fn write_log(&self, session: &str, messages: &[StoredMessage]) -> Result<()> {
        let json = serde_json::to_string_pretty(messages)?;
        std::fs::write(self.log_path(session), json).map_err(Error::Io)
    }

    // ── Operations ─────────────────────────────────────────────────

    /// Atomic append: assigns the next monotonic id and a UTC timestamp.
    pub fn append(&self, session: &str, message: ChatMessage) -> Result<StoredMessage> {
        let lock = self.session_lock(session);
        let _guard = lock.lock();

        let mut log = self.read_log(session);
        let next_id = log.last().map_or(1, |m| m.id + 1);
        let stored = StoredMessage {
            id: next_id,
            timestamp: Utc::now(),
            role: message.role,
            content: message.content,
            tool_calls: message.tool_calls,
            tool_call_id: message.tool_call_id,
            name: message.name,
        };
        log.push(stored.clone());
        self.write_log(session, &log)?;
        Ok(stored)
    }

    /// Full ordered message sequence for a session.
    pub fn read(&self, session: &str) -> Vec<StoredMessage> {
        let lock = self.session_lock(session);
        let _guard = lock.lock();
        self.read_log(session)
    }

    pub fn load_summary(&self, session: &str) -> String {
        std::fs::read_to_string(self.summary_path(session))
            .map(|s| s.trim().to_owned())
            .unwrap_or_default()
    }

    pub fn save_summary(&self, session: &str, text: &str) -> Result<()> {
        std::fs::write(self.summary_path(session), text).map_err(Error::Io)
    }

    /// List every session with modification time, message count, and a
    /// short preview of the latest activity. Newest first.
    pub fn list_sessions(&self) -> Vec<SessionSummary> {
        let mut sessions = Vec::new();
        let entries = match std::fs::read_dir(&self.base_dir) {
            Ok(e) => e,
            Err(_) => return sessions,
        };

        for entry in entries.flatten() {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("log") {
                continue;
            }
            let Some(id) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };

            let updated_at = entry
                .metadata()
                .ok()
                .and_then(|m| m.modified().ok())
                .map(DateTime::<Utc>::from)
                .unwrap_or_else(Utc::now);

            let log = self.read_log(id);
            sessions.push(SessionSummary {
                id: id.to_owned(),
                updated_at,
                message_count: log.len(),
                preview: render_preview(&log),
            });
        }

        sessions.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        sessions
    }

    /// Rename a session's log and summary. Fails if the target is taken.
    pub fn rename(&self, session: &str, new_name: &str) -> Result<()> {
        if self.log_path(new_name).exists() {
            return Err(Error::AlreadyExists(new_name.to_owned()));
        }
        let lock = self.session_lock(session);
        let _guard = lock.lock();

        let old_log = self.log_path(session);
        if old_log.exists() {
            std::fs::rename(old_log, self.log_path(new_name)).map_err(Error::Io)?;
        }
        let old_summary = self.summary_path(session);
        if old_summary.exists() {
            std::fs::rename(old_summary, self.summary_path(new_name)).map_err(Error::Io)?;
        }
        Ok(())
    }

    /// Remove a session's log and summary. The reserved session is
    /// undeletable.
    pub fn delete(&self, session: &str) -> Result<bool> {
        if session == RESERVED_SESSION {
            return Err(Error::Forbidden(format!(
                "session '{RESERVED_SESSION}' is reserved and cannot be deleted"
            )));
        }
        let lock = self.session_lock(session);
        let _guard = lock.lock();

        let mut deleted = false;
        let log = self.log_path(session);
        if log.exists() {
            std::fs::remove_file(log).map_err(Error::Io)?;
            deleted = true;
        }
        let summary = self.summary_path(session);
        if summary.exists() {
            std::fs::remove_file(summary).map_err(Error::Io)?;
        }
        Ok(deleted)
    }

    /// Truncate the log and drop the summary, keeping the session itself.
    pub fn clear(&self, session: &str) -> Result<()> {
        let lock = self.session_lock(session);
        let _guard = lock.lock();

        self.write_log(session, &[])?;
        let summary = self.summary_path(session);
        if summary.exists() {
            std::fs::remove_file(summary).map_err(Error::Io)?;
        }
        Ok(())
    }
}

/// Last non-empty content, falling back to the latest tool-call name.
fn render_preview(log: &[StoredMessage]) -> String {
    let Some(last) = log.last() else {
        return String::new();
    };
    let text = if !last.content.trim().is_empty() {
        last.content.clone()
    } else if let Some(tc) = last.tool_calls.first() {
        format!("[Tool Call: {}]", tc.name)
    } else {
        String::new()
    };
    truncate_chars(&text, 50)
}

fn truncate_chars(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_owned()
    } else {
        s.chars().take(max).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> (tempfile::TempDir, TranscriptStore) {
        let tmp = tempfile::tempdir().unwrap();
        let store = TranscriptStore::new(&tmp.path().join("sessions")).unwrap();
        (tmp, store)
    }

    #[test]
    fn append_assigns_monotonic_ids() {
        let (_tmp, store) = store();
        let first = store.append("s1", ChatMessage::user("one")).unwrap();
        let second = store.append("s1", ChatMessage::assistant("two")).unwrap();
        assert_eq!(first.id, 1);
        assert_eq!(second.id, 2);
        assert!(second.timestamp >= first.timestamp);

        let log = store.read("s1");
        assert_eq!(log.len(), 2);
        assert_eq!(log[1].content, "two");
    }

    #[test]
    fn ids_continue_after_reload() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = tmp.path().join("sessions");
        {
            let store = TranscriptStore::new(&dir).unwrap();
            store.append("s1", ChatMessage::user("a")).unwrap();
        }
        let store = TranscriptStore::new(&dir).unwrap();
        let next = store.append("s1", ChatMessage::user("b")).unwrap();
        assert_eq!(next.id, 2);
    }

    #[test]
    fn summary_round_trip() {
        let (_tmp, store) = store();
        assert_eq!(store.load_summary("s1"), "");
        store.save_summary("s1", "the gist\n").unwrap();
        assert_eq!(store.load_summary("s1"), "the gist");
        // Overwrite semantics.
        store.save_summary("s1", "newer gist").unwrap();
        assert_eq!(store.load_summary("s1"), "newer gist");
    }

    #[test]
    fn list_sessions_carries_count_and_preview() {
        let (_tmp, store) = store();
        store.append("alpha", ChatMessage::user("hello there")).unwrap();
        store.append("alpha", ChatMessage::assistant("hi")).unwrap();

        let sessions = store.list_sessions();
        assert_eq!(sessions.len(), 1);
        assert_eq!(sessions[0].id, "alpha");
        assert_eq!(sessions[0].message_count, 2);
        assert_eq!(sessions[0].preview, "hi");
    }

    #[test]
    fn preview_falls_back_to_tool_call_name() {
        let (_tmp, store) = store();
        let call = ToolCallRequest {
            call_id: "c1".into(),
            name: "list_directory_files".into(),
            arguments: "{}".into(),
        };
        store
            .append("s1", ChatMessage::assistant_tool_calls("", vec![call]))
            .unwrap();

        let sessions = store.list_sessions();
        assert_eq!(sessions[0].preview, "[Tool Call: list_directory_files]");
    }

    #[test]
    fn rename_rejects_existing_target() {
        let (_tmp, store) = store();
        store.append("a", ChatMessage::user("x")).unwrap();
        store.append("b", ChatMessage::user("y")).unwrap();

        match store.rename("a", "b") {
            Err(Error::AlreadyExists(name)) => assert_eq!(name, "b"),
            other => panic!("expected AlreadyExists, got {other:?}"),
        }

        store.rename("a", "c").unwrap();
        assert!(store.read("a").is_empty());
        assert_eq!(store.read("c").len(), 1);
    }

    #[test]
    fn rename_moves_summary() {
        let (_tmp, store) = store();
        store.append("a", ChatMessage::user("x")).unwrap();
        store.save_summary("a", "sum").unwrap();
        store.rename("a", "b").unwrap();
        assert_eq!(store.load_summary("b"), "sum");
        assert_eq!(store.load_summary("a"), "");
    }

    #[test]
    fn delete_removes_log_and_summary() {
        let (_tmp, store) = store();
        store.append("doomed", ChatMessage::user("x")).unwrap();
        store.save_summary("doomed", "s").unwrap();

        assert!(store.delete("doomed").unwrap());
        assert!(store.read("doomed").is_empty());
        assert_eq!(store.load_summary("doomed"), "");
        // Second delete finds nothing.
        assert!(!store.delete("doomed").unwrap());
    }

    #[test]
    fn reserved_session_is_undeletable() {
        let (_tmp, store) = store();
        store.append(RESERVED_SESSION, ChatMessage::user("x")).unwrap();
        match store.delete(RESERVED_SESSION) {
            Err(Error::Forbidden(_)) => {}
            other => panic!("expected Forbidden, got {other:?}"),
        }
        assert_eq!(store.read(RESERVED_SESSION).len(), 1);
    }

    #[test]
    fn clear_truncates_but_keeps_session() {
        let (_tmp, store) = store();
        store.append("s1", ChatMessage::user("x")).unwrap();
        store.save_summary("s1", "s").unwrap();
        store.clear("s1").unwrap();
        assert!(store.read("s1").is_empty());
        assert_eq!(store.load_summary("s1"), "");
        // Session file still listed.
        assert_eq!(store.list_sessions().len(), 1);
    }

    #[test]
    fn malformed_log_reads_as_empty() {
        let (_tmp, store) = store();
        store.append("s1", ChatMessage::user("x")).unwrap();
        std::fs::write(store.log_path("s1"), "not json").unwrap();
        assert!(store.read("s1").is_empty());
    }

    #[test]
    fn wire_form_strips_persistence_fields() {
        let (_tmp, store) = store();
        let stored = store.append("s1", ChatMessage::user("hello")).unwrap();
        let wire = stored.to_wire();
        let json = serde_json::to_value(&wire).unwrap();
        assert!(json.get("id").is_none());
        assert!(json.get("timestamp").is_none());
        assert_eq!(json["content"], "hello");
    }
}
