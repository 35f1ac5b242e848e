//! Pure repair of tool-call chains in a message window.

use rh_domain::{ChatMessage, Role};

/// Payload of a synthesized tool response standing in for a result that
/// was lost to a crash or cancellation. The model treats it as an
/// ordinary (failed) tool outcome and re-plans.
pub const RECOVERY_NOTICE: &str = "Error: Tool execution was interrupted. System recovered.";

/// Repair a window slice so every assistant tool-call request is followed
/// by exactly one tool response per call id, in call order.
///
/// Rules, applied in a single forward pass:
/// - a tool message answering a pending call id is kept and closes it;
/// - a tool message with no pending call id is an orphan and is dropped;
/// - any non-tool message arriving while call ids are still pending forces
///   a synthesized response per remaining id before it;
/// - pending ids left at the end of the slice are synthesized too.
///
/// The function is deterministic and idempotent.
pub fn sanitize(messages: &[ChatMessage]) -> Vec<ChatMessage> {
    let mut out: Vec<ChatMessage> = Vec::with_capacity(messages.len());
    // Call ids (with tool names) that must be answered next, in order.
    let mut pending: Vec<(String, String)> = Vec::new();

    for msg in messages {
        match msg.role {
            Role::Tool => {
                let id = msg.tool_call_id.as_deref().unwrap_or("");
                if let Some(pos) = pending.iter().position(|(pid, _)| pid == id) {
                    pending.remove(pos);
                    out.push(msg.clone());
                }
                // Orphan tool message: drop it.
            }
            _ => {
                flush_pending(&mut pending, &mut out);
                out.push(msg.clone());
                if msg.has_tool_calls() {
                    pending = msg
                        .tool_calls
                        .iter()
                        .map(|tc| (tc.call_id.clone(), tc.name.clone()))
                        .collect();
                }
            }
        }
    }

    flush_pending(&mut pending, &mut out);
    out
}

fn flush_pending(pending: &mut Vec<(String, String)>, out: &mut Vec<ChatMessage>) {
    for (id, name) in pending.drain(..) {
        out.push(ChatMessage::tool_result(id, name, RECOVERY_NOTICE));
    }
}
