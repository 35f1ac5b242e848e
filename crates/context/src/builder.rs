//! Sliding-window context builder over the transcript store.

use rh_domain::{ChatMessage, Role};
use rh_sessions::{StoredMessage, TranscriptStore};

use crate::sanitize::sanitize;

/// Build the message window the LLM will see for a turn.
///
/// Reads the full log, keeps conversational roles (system entries only
/// when they carry a Supervisor or Sentinel notice), takes the trailing
/// `window` messages, repairs tool-call chains, and strips persistence
/// fields.
pub fn build_context(store: &TranscriptStore, session: &str, window: usize) -> Vec<ChatMessage> {
    let log = store.read(session);

    let conversational: Vec<&StoredMessage> = log
        .iter()
        .filter(|m| match m.role {
            Role::System => {
                m.content.contains("Supervisor") || m.content.contains("Sentinel")
            }
            _ => true,
        })
        .collect();

    let start = conversational.len().saturating_sub(window);
    let slice: Vec<ChatMessage> = conversational[start..]
        .iter()
        .map(|m| m.to_wire())
        .collect();

    sanitize(&slice)
}

/// Render every message older than the trailing window as summarization
/// input, one `role: content` line each, with tool-call stubs.
pub fn messages_for_summary(store: &TranscriptStore, session: &str, window: usize) -> String {
    let log = store.read(session);
    if log.len() <= window {
        return String::new();
    }

    let mut block = String::new();
    for msg in &log[..log.len() - window] {
        let role = match msg.role {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
            Role::Tool => "tool",
        };
        let mut content = msg.content.clone();
        if let Some(tc) = msg.tool_calls.first() {
            content.push_str(&format!(" [Tool Call: {}]", tc.name));
        }
        block.push_str(&format!("{role}: {content}\n"));
    }
    block
}

#[cfg(test)]
mod tests {
    use super::*;
    use rh_domain::ToolCallRequest;

    fn store() -> (tempfile::TempDir, TranscriptStore) {
        let tmp = tempfile::tempdir().unwrap();
        let store = TranscriptStore::new(&tmp.path().join("sessions")).unwrap();
        (tmp, store)
    }

    #[test]
    fn window_keeps_only_trailing_messages() {
        let (_tmp, store) = store();
        for i in 0..6 {
            store.append("s", ChatMessage::user(format!("m{i}"))).unwrap();
        }
        let ctx = build_context(&store, "s", 3);
        assert_eq!(ctx.len(), 3);
        assert_eq!(ctx[0].content, "m3");
        assert_eq!(ctx[2].content, "m5");
    }

    #[test]
    fn plain_system_messages_are_filtered_out() {
        let (_tmp, store) = store();
        store.append("s", ChatMessage::system("internal log noise")).unwrap();
        store
            .append("s", ChatMessage::system("[Supervisor]: keep going"))
            .unwrap();
        store
            .append("s", ChatMessage::system("[Sentinel Alert 12:00]: heartbeat"))
            .unwrap();
        store.append("s", ChatMessage::user("hi")).unwrap();

        let ctx = build_context(&store, "s", 10);
        assert_eq!(ctx.len(), 3);
        assert!(ctx[0].content.contains("Supervisor"));
        assert!(ctx[1].content.contains("Sentinel"));
    }

    #[test]
    fn chain_split_by_window_boundary_is_repaired() {
        let (_tmp, store) = store();
        let call = ToolCallRequest {
            call_id: "c1".into(),
            name: "exec".into(),
            arguments: "{}".into(),
        };
        store.append("s", ChatMessage::user("go")).unwrap();
        store
            .append("s", ChatMessage::assistant_tool_calls("", vec![call]))
            .unwrap();
        // Crash: no tool response was ever written.

        let ctx = build_context(&store, "s", 10);
        assert_eq!(ctx.len(), 3);
        assert_eq!(ctx[2].role, Role::Tool);
        assert_eq!(ctx[2].tool_call_id.as_deref(), Some("c1"));
        assert!(ctx[2].content.contains("recovered"));
    }

    #[test]
    fn orphan_response_after_window_cut_is_dropped() {
        let (_tmp, store) = store();
        let call = ToolCallRequest {
            call_id: "c1".into(),
            name: "exec".into(),
            arguments: "{}".into(),
        };
        store
            .append("s", ChatMessage::assistant_tool_calls("", vec![call]))
            .unwrap();
        store
            .append("s", ChatMessage::tool_result("c1", "exec", "result"))
            .unwrap();
        store.append("s", ChatMessage::assistant("done")).unwrap();

        // Window of 2 cuts off the assistant request; the dangling tool
        // response must not survive.
        let ctx = build_context(&store, "s", 2);
        assert_eq!(ctx.len(), 1);
        assert_eq!(ctx[0].content, "done");
    }

    #[test]
    fn wire_messages_have_no_ids() {
        let (_tmp, store) = store();
        store.append("s", ChatMessage::user("x")).unwrap();
        let ctx = build_context(&store, "s", 5);
        let json = serde_json::to_value(&ctx[0]).unwrap();
        assert!(json.get("id").is_none());
        assert!(json.get("timestamp").is_none());
    }

    #[test]
    fn summary_input_covers_pre_window_messages_only() {
        let (_tmp, store) = store();
        for i in 0..5 {
            store.append("s", ChatMessage::user(format!("m{i}"))).unwrap();
        }
        let text = messages_for_summary(&store, "s", 2);
        assert!(text.contains("user: m0"));
        assert!(text.contains("user: m2"));
        assert!(!text.contains("m3"));
        assert!(!text.contains("m4"));
    }

    #[test]
    fn summary_input_renders_tool_call_stub() {
        let (_tmp, store) = store();
        let call = ToolCallRequest {
            call_id: "c1".into(),
            name: "browse_url".into(),
            arguments: "{}".into(),
        };
        store
            .append("s", ChatMessage::assistant_tool_calls("checking", vec![call]))
            .unwrap();
        store.append("s", ChatMessage::user("a")).unwrap();
        store.append("s", ChatMessage::user("b")).unwrap();

        let text = messages_for_summary(&store, "s", 2);
        assert!(text.contains("assistant: checking [Tool Call: browse_url]"));
    }

    #[test]
    fn summary_input_empty_when_log_fits_window() {
        let (_tmp, store) = store();
        store.append("s", ChatMessage::user("only")).unwrap();
        assert_eq!(messages_for_summary(&store, "s", 10), "");
    }
}
