//! Turn execution: the ReAct loop, the supervisor self-check, and the
//! finalization work (summary refresh + async fact extraction).

use std::sync::Arc;

use futures_util::StreamExt;
use tokio::sync::{mpsc, OwnedSemaphorePermit};

use rh_context::{build_context, messages_for_summary};
use rh_domain::stream::StreamEvent;
use rh_domain::{CancelToken, ChatMessage, ToolCallRequest};
use rh_providers::{ChatRequest, LlmClient};
use rh_retrieval::RecordMetadata;

use crate::state::AppState;

use super::dispatch;
use super::events::HostEvent;
use super::prompt::{build_system_prompt, PromptInputs};

/// Bound on tool-calling iterations within one turn.
pub const MAX_TOOL_ITERATIONS: usize = 15;

/// Bound on supervisor-driven re-entries into the ReAct loop.
pub const MAX_SUPERVISOR_LOOPS: usize = 3;

/// Appended to every tool result echoed into the transcript.
const PLAN_REMINDER: &str = "[System: Check your plan. Update <plan> status in next response.]";

/// Summaries refresh whenever the log length crosses a multiple of this.
const SUMMARY_EVERY: usize = 10;

/// Input to one turn.
pub struct TurnInput {
    pub session_id: String,
    pub user_text: String,
}

/// Spawn a turn. Events arrive on the returned channel, terminated by
/// exactly one [`HostEvent::Done`]. The optional permit (session lock)
/// is held until the turn finishes.
pub fn run_turn(
    state: AppState,
    input: TurnInput,
    token: CancelToken,
    permit: Option<OwnedSemaphorePermit>,
) -> mpsc::Receiver<HostEvent> {
    let (tx, rx) = mpsc::channel::<HostEvent>(64);
    tokio::spawn(async move {
        let _permit = permit;
        run_turn_inner(state, input, &tx, token).await;
        let _ = tx.send(HostEvent::Done).await;
    });
    rx
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tool-call assembly
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Assembles streamed tool-call fragments keyed by slot index. The name
/// arrives once; argument text concatenates until the stream ends.
#[derive(Default)]
struct ToolCallAssembler {
    slots: std::collections::BTreeMap<u32, ToolCallRequest>,
}

impl ToolCallAssembler {
    fn start(&mut self, index: u32, call_id: String, name: String) {
        self.slots.insert(
            index,
            ToolCallRequest {
                call_id,
                name,
                arguments: String::new(),
            },
        );
    }

    fn append(&mut self, index: u32, delta: &str) {
        if let Some(slot) = self.slots.get_mut(&index) {
            slot.arguments.push_str(delta);
        }
        // A delta for a slot that never opened is dropped.
    }

    fn finish(self) -> Vec<ToolCallRequest> {
        self.slots.into_values().collect()
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// The turn loop
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

async fn run_turn_inner(
    state: AppState,
    input: TurnInput,
    tx: &mpsc::Sender<HostEvent>,
    token: CancelToken,
) {
    let session = input.session_id.as_str();

    let Some(llm) = state.llm.read().clone() else {
        send(tx, HostEvent::Error {
            content: "LLM client is not initialized. Check profiles.yaml.".into(),
        })
        .await;
        return;
    };
    let config = state.config.snapshot();
    let mem_cfg = config.system.memory.clone();

    // ── Enter ──────────────────────────────────────────────────────
    if let Err(e) = state
        .transcripts
        .append(session, ChatMessage::user(&input.user_text))
    {
        send(tx, HostEvent::Error {
            content: format!("Failed to persist user message: {e}"),
        })
        .await;
        return;
    }

    let memories = state
        .retrieval
        .search(&input.user_text, mem_cfg.retrieve_top_k, mem_cfg.rag_strategy)
        .await;

    let mut turn_log = format!("User Input: {}\n", input.user_text);
    let mut supervisor_loops = 0usize;

    // ── ReAct + Supervisor ─────────────────────────────────────────
    'supervised: loop {
        let mut generation_finished = false;

        for _ in 0..MAX_TOOL_ITERATIONS {
            if token.is_cancelled() {
                send_interrupted(tx).await;
                return;
            }

            // Rebuild the window every iteration: appends during the
            // previous iteration may have changed what sanitation keeps.
            let context = build_context(&state.transcripts, session, mem_cfg.window_size);
            let summary = state.transcripts.load_summary(session);
            let skill_index = state.skills.index();
            let user_profile = state.config.user_profile();
            let active_skill = state.active_skills.get(session).and_then(|name| {
                state
                    .skills
                    .load_context(&name)
                    .ok()
                    .map(|(sop, _)| (name, sop))
            });

            let system_prompt = build_system_prompt(&PromptInputs {
                user_profile: &user_profile,
                skill_index: &skill_index,
                active_skill: active_skill
                    .as_ref()
                    .map(|(name, sop)| (name.as_str(), sop.as_str())),
                memories: &memories,
                summary: &summary,
                mission_anchor: &input.user_text,
            });

            let mut messages = vec![ChatMessage::system(system_prompt)];
            messages.extend(context);

            let req = ChatRequest {
                messages,
                tools: dispatch::manifest(&state, session),
                temperature: None,
                max_tokens: None,
                json_mode: false,
                model: None,
            };

            let mut stream = match llm.chat_stream(&req).await {
                Ok(s) => s,
                Err(e) => {
                    send(tx, HostEvent::Error {
                        content: format!("LLM API Error: {e}"),
                    })
                    .await;
                    return;
                }
            };

            let mut text_buf = String::new();
            let mut assembler = ToolCallAssembler::default();
            let mut was_cancelled = false;

            while let Some(event) = stream.next().await {
                if token.is_cancelled() {
                    was_cancelled = true;
                    break;
                }
                match event {
                    Ok(StreamEvent::Token { text }) => {
                        send(tx, HostEvent::Delta {
                            content: text.clone(),
                        })
                        .await;
                        text_buf.push_str(&text);
                    }
                    Ok(StreamEvent::ToolCallStarted {
                        index,
                        call_id,
                        tool_name,
                    }) => assembler.start(index, call_id, tool_name),
                    Ok(StreamEvent::ToolCallDelta { index, delta }) => {
                        assembler.append(index, &delta)
                    }
                    Ok(StreamEvent::Done { .. }) => {}
                    Ok(StreamEvent::Error { message }) => {
                        send(tx, HostEvent::Error {
                            content: format!("Stream error: {message}"),
                        })
                        .await;
                        return;
                    }
                    Err(e) => {
                        send(tx, HostEvent::Error {
                            content: format!("Stream error: {e}"),
                        })
                        .await;
                        return;
                    }
                }
            }
            drop(stream);

            if was_cancelled {
                // Keep whatever was generated; the sanitizer copes with
                // the truncated state on the next turn.
                if !text_buf.is_empty() {
                    let _ = state
                        .transcripts
                        .append(session, ChatMessage::assistant(&text_buf));
                }
                send_interrupted(tx).await;
                return;
            }

            if !text_buf.is_empty() {
                turn_log.push_str(&format!("AI Thought: {text_buf}\n"));
            }

            let calls = assembler.finish();
            if calls.is_empty() {
                // Prose-only response ends the action loop.
                if !text_buf.is_empty() {
                    let _ = state
                        .transcripts
                        .append(session, ChatMessage::assistant(&text_buf));
                }
                generation_finished = true;
                break;
            }

            let _ = state.transcripts.append(
                session,
                ChatMessage::assistant_tool_calls(&text_buf, calls.clone()),
            );

            for call in &calls {
                if token.is_cancelled() {
                    send_interrupted(tx).await;
                    return;
                }
                send(tx, HostEvent::Status {
                    content: format!("Executing: {}...", call.name),
                })
                .await;

                let raw = dispatch::dispatch(&state, session, call, &token).await;
                send(tx, HostEvent::Tool {
                    name: call.name.clone(),
                    content: raw.clone(),
                })
                .await;
                turn_log.push_str(&format!("Tool {}: {raw}\n", call.name));

                let _ = state.transcripts.append(
                    session,
                    ChatMessage::tool_result(
                        &call.call_id,
                        &call.name,
                        format!("{raw}\n\n{PLAN_REMINDER}"),
                    ),
                );
            }
        }

        // ── Supervisor ─────────────────────────────────────────────
        if generation_finished && supervisor_loops < MAX_SUPERVISOR_LOOPS {
            match supervisor_check(
                llm.as_ref(),
                &state,
                session,
                &input.user_text,
                mem_cfg.window_size,
            )
            .await
            {
                Verdict::Incomplete(instruction) => {
                    supervisor_loops += 1;
                    let _ = state.transcripts.append(
                        session,
                        ChatMessage::system(format!(
                            "[Supervisor]: {instruction} Continue executing the plan immediately."
                        )),
                    );
                    send(tx, HostEvent::Status {
                        content: format!("Supervisor: {instruction} (auto-continuing)"),
                    })
                    .await;
                    continue 'supervised;
                }
                Verdict::Complete => break 'supervised,
            }
        }
        break 'supervised;
    }

    send(tx, HostEvent::Status {
        content: "Task reflection complete. Finishing.".into(),
    })
    .await;

    // ── Finalize ───────────────────────────────────────────────────
    refresh_summary_if_due(llm.as_ref(), &state, session, &mem_cfg).await;

    // Fact extraction is fire-and-forget: it must never delay the next
    // turn, never retry, and swallow its errors.
    let extract_state = state.clone();
    let extract_llm = llm.clone();
    let session_owned = session.to_owned();
    tokio::spawn(async move {
        extract_facts(extract_llm, extract_state, turn_log, session_owned).await;
    });
}

async fn send(tx: &mpsc::Sender<HostEvent>, event: HostEvent) {
    let _ = tx.send(event).await;
}

async fn send_interrupted(tx: &mpsc::Sender<HostEvent>) {
    send(tx, HostEvent::Status {
        content: "Task Interrupted.".into(),
    })
    .await;
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Supervisor
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

enum Verdict {
    Complete,
    Incomplete(String),
}

/// Ask the model whether the user's request is actually done. Transport
/// failures and unparsable verdicts count as COMPLETE so a flaky
/// endpoint cannot trap the host in an intervention loop.
async fn supervisor_check(
    llm: &dyn LlmClient,
    state: &AppState,
    session: &str,
    user_text: &str,
    window: usize,
) -> Verdict {
    let context = build_context(&state.transcripts, session, window);
    let tail_start = context.len().saturating_sub(5);
    let recent = serde_json::to_string(&context[tail_start..]).unwrap_or_default();

    let prompt = format!(
        "[SUPERVISOR PROTOCOL]\n\
         You are the Overwatch System. Verify whether the AI has completed the user's request \
         based on its plan.\n\n\
         Original Request: \"{user_text}\"\n\
         Recent History: {recent}\n\n\
         Checklist:\n\
         1. Did the AI output a `<plan>`?\n\
         2. Are all items in the plan marked as completed (e.g. [x])?\n\
         3. Were the deliverables actually generated/modified?\n\n\
         If the task is incomplete or the AI is stopping prematurely, output:\n\
         {{\"status\": \"INCOMPLETE\", \"instruction\": \"Briefly state what must be done next.\"}}\n\n\
         If the task is truly done or waiting for user input, output:\n\
         {{\"status\": \"COMPLETE\", \"instruction\": \"None\"}}\n\n\
         Response (JSON only):"
    );

    let req = ChatRequest {
        messages: vec![ChatMessage::user(prompt)],
        tools: Vec::new(),
        temperature: Some(0.1),
        max_tokens: None,
        json_mode: true,
        model: None,
    };

    let response = match llm.chat(&req).await {
        Ok(r) => r,
        Err(e) => {
            tracing::warn!(error = %e, "supervisor check failed, assuming complete");
            return Verdict::Complete;
        }
    };

    match serde_json::from_str::<serde_json::Value>(&response.content) {
        Ok(verdict) if verdict.get("status").and_then(|s| s.as_str()) == Some("INCOMPLETE") => {
            let instruction = verdict
                .get("instruction")
                .and_then(|i| i.as_str())
                .unwrap_or("Task incomplete.")
                .to_owned();
            tracing::info!(instruction = %instruction, "supervisor requested continuation");
            Verdict::Incomplete(instruction)
        }
        Ok(_) => Verdict::Complete,
        Err(e) => {
            tracing::warn!(error = %e, "unparsable supervisor verdict, assuming complete");
            Verdict::Complete
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Finalization
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Compact pre-window history into the summary blob every
/// [`SUMMARY_EVERY`] messages.
async fn refresh_summary_if_due(
    llm: &dyn LlmClient,
    state: &AppState,
    session: &str,
    mem_cfg: &crate::config::MemoryConfig,
) {
    if !mem_cfg.enable_summary {
        return;
    }
    let log_len = state.transcripts.read(session).len();
    if log_len == 0 || log_len % SUMMARY_EVERY != 0 {
        return;
    }
    let tail = messages_for_summary(&state.transcripts, session, mem_cfg.window_size);
    if tail.is_empty() {
        return;
    }
    let current = state.transcripts.load_summary(session);

    let prompt = format!(
        "You are a memory compressor.\n\n\
         Current Summary:\n{current}\n\n\
         New Conversation Log to Append:\n{tail}\n\n\
         Task: Update the summary to include the key information from the new log. \
         Keep it concise. Return ONLY the updated summary text."
    );
    let req = ChatRequest {
        messages: vec![ChatMessage::user(prompt)],
        tools: Vec::new(),
        temperature: Some(0.3),
        max_tokens: None,
        json_mode: false,
        model: None,
    };

    match llm.chat(&req).await {
        Ok(response) if !response.content.trim().is_empty() => {
            if let Err(e) = state.transcripts.save_summary(session, &response.content) {
                tracing::warn!(error = %e, "failed to save summary");
            } else {
                tracing::info!(session, chars = response.content.len(), "summary refreshed");
            }
        }
        Ok(_) => {}
        Err(e) => tracing::warn!(error = %e, "summary generation failed"),
    }
}

/// Distill permanent facts from the turn log into the retrieval store.
async fn extract_facts(
    llm: Arc<dyn LlmClient>,
    state: AppState,
    turn_log: String,
    session: String,
) {
    let prompt = format!(
        "You are a Memory Extractor. Analyze the following interaction turn (user input, AI \
         thoughts, and tool outputs).\n\
         Your goal is to extract NEW, PERMANENT facts about the user, their projects, or \
         technical solutions found.\n\n\
         [Interaction Turn Log]:\n{turn_log}\n\n\
         [Instructions]:\n\
         1. Focus on: project paths, user preferences, recurring technical issues/solutions, \
         specific facts.\n\
         2. Ignore: transient states, casual greetings, or \"OK\" messages.\n\
         3. If no permanent fact is found, output \"NO_INFO\".\n\
         4. If facts are found, output them as concise, independent statements.\n\n\
         [Output]:"
    );
    let req = ChatRequest {
        messages: vec![ChatMessage::user(prompt)],
        tools: Vec::new(),
        temperature: Some(0.1),
        max_tokens: Some(256),
        json_mode: false,
        model: None,
    };

    let extracted = match llm.chat(&req).await {
        Ok(response) => response.content.trim().to_owned(),
        Err(e) => {
            tracing::warn!(error = %e, "fact extraction failed");
            return;
        }
    };
    if extracted.is_empty() || extracted.contains("NO_INFO") {
        return;
    }

    let metadata = RecordMetadata::new("conversation_insight").with_extra("session", session);
    match state.retrieval.add(&extracted, metadata).await {
        Ok(id) => tracing::info!(id = %id, "extracted memory archived"),
        Err(e) => tracing::warn!(error = %e, "failed to archive extracted memory"),
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tests
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
