//! OpenAI-compatible chat-completions adapter.

use serde_json::Value;

use rh_domain::error::{Error, Result};
use rh_domain::stream::{BoxStream, StreamEvent};
use rh_domain::{ChatMessage, Role, ToolCallRequest, ToolDefinition};

use crate::sse;
use crate::traits::{ChatRequest, ChatResponse, LlmClient, ProviderProfile};

/// Per-request transport timeout.
const REQUEST_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(60);

/// Transport errors are retried this many times beyond the first attempt.
const MAX_RETRIES: usize = 2;

/// Adapter for any endpoint speaking the OpenAI chat-completions wire
/// format.
pub struct OpenAiCompatClient {
    base_url: String,
    api_key: String,
    default_model: String,
    default_temperature: f32,
    embedding_model: String,
    client: reqwest::Client,
}

impl OpenAiCompatClient {
    pub fn from_profile(profile: &ProviderProfile) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| Error::Network(e.to_string()))?;

        Ok(Self {
            base_url: profile.base_url.trim_end_matches('/').to_owned(),
            api_key: profile.api_key.clone(),
            default_model: profile.model.clone(),
            default_temperature: profile.temperature,
            embedding_model: profile.embedding_model.clone(),
            client,
        })
    }

    fn authed_post(&self, url: &str) -> reqwest::RequestBuilder {
        let mut builder = self
            .client
            .post(url)
            .header("Content-Type", "application/json");
        if !self.api_key.is_empty() {
            builder = builder.header("Authorization", format!("Bearer {}", self.api_key));
        }
        builder
    }

    fn build_chat_body(&self, req: &ChatRequest, stream: bool) -> Value {
        let messages: Vec<Value> = req.messages.iter().map(msg_to_openai).collect();
        let model = req.model.clone().unwrap_or_else(|| self.default_model.clone());

        let mut body = serde_json::json!({
            "model": model,
            "messages": messages,
            "stream": stream,
            "temperature": req.temperature.unwrap_or(self.default_temperature),
        });

        if !req.tools.is_empty() {
            let tools: Vec<Value> = req.tools.iter().map(tool_to_openai).collect();
            body["tools"] = Value::Array(tools);
            body["tool_choice"] = Value::String("auto".into());
        }
        if let Some(max) = req.max_tokens {
            body["max_tokens"] = serde_json::json!(max);
        }
        if req.json_mode {
            body["response_format"] = serde_json::json!({"type": "json_object"});
        }
        body
    }

    async fn post_with_retry(&self, url: &str, body: &Value) -> Result<reqwest::Response> {
        let mut last_err = None;
        for attempt in 0..=MAX_RETRIES {
            match self.authed_post(url).json(body).send().await {
                Ok(resp) => return Ok(resp),
                Err(e) => {
                    tracing::warn!(attempt, error = %e, "LLM request failed");
                    last_err = Some(e);
                }
            }
        }
        Err(Error::Network(
            last_err.map(|e| e.to_string()).unwrap_or_default(),
        ))
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Message serialization
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

fn role_to_str(role: Role) -> &'static str {
    match role {
        Role::System => "system",
        Role::User => "user",
        Role::Assistant => "assistant",
        Role::Tool => "tool",
    }
}

fn msg_to_openai(msg: &ChatMessage) -> Value {
    match msg.role {
        Role::Assistant if !msg.tool_calls.is_empty() => {
            let calls: Vec<Value> = msg
                .tool_calls
                .iter()
                .map(|tc| {
                    serde_json::json!({
                        "id": tc.call_id,
                        "type": "function",
                        "function": {
                            "name": tc.name,
                            "arguments": tc.arguments,
                        }
                    })
                })
                .collect();
            let content = if msg.content.is_empty() {
                Value::Null
            } else {
                Value::String(msg.content.clone())
            };
            serde_json::json!({
                "role": "assistant",
                "content": content,
                "tool_calls": calls,
            })
        }
        Role::Tool => serde_json::json!({
            "role": "tool",
            "tool_call_id": msg.tool_call_id.clone().unwrap_or_default(),
            "content": msg.content,
        }),
        _ => serde_json::json!({
            "role": role_to_str(msg.role),
            "content": msg.content,
        }),
    }
}

fn tool_to_openai(tool: &ToolDefinition) -> Value {
    serde_json::json!({
        "type": "function",
        "function": {
            "name": tool.name,
            "description": tool.description,
            "parameters": tool.parameters,
        }
    })
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Response parsing
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

fn parse_chat_response(body: &Value) -> Result<ChatResponse> {
    let choice = body
        .get("choices")
        .and_then(|c| c.as_array())
        .and_then(|a| a.first())
        .ok_or_else(|| Error::Provider {
            provider: "openai_compat".into(),
            message: "no choices in response".into(),
        })?;

    let message = choice.get("message").ok_or_else(|| Error::Provider {
        provider: "openai_compat".into(),
        message: "no message in choice".into(),
    })?;

    let content = message
        .get("content")
        .and_then(|v| v.as_str())
        .unwrap_or("")
        .to_owned();

    let tool_calls = message
        .get("tool_calls")
        .and_then(|v| v.as_array())
        .map(|arr| {
            arr.iter()
                .filter_map(|tc| {
                    let call_id = tc.get("id")?.as_str()?.to_owned();
                    let func = tc.get("function")?;
                    let name = func.get("name")?.as_str()?.to_owned();
                    let arguments = func
                        .get("arguments")
                        .and_then(|v| v.as_str())
                        .unwrap_or("{}")
                        .to_owned();
                    Some(ToolCallRequest {
                        call_id,
                        name,
                        arguments,
                    })
                })
                .collect()
        })
        .unwrap_or_default();

    let finish_reason = choice
        .get("finish_reason")
        .and_then(|v| v.as_str())
        .map(String::from);

    Ok(ChatResponse {
        content,
        tool_calls,
        finish_reason,
    })
}

/// Parse one SSE `data:` payload into stream events.
///
/// Tool-call fragments arrive as per-index deltas: the first fragment of
/// a slot carries `id` and `function.name`, later fragments append to
/// `function.arguments`.
fn parse_sse_data(data: &str) -> Vec<Result<StreamEvent>> {
    if data.trim() == "[DONE]" {
        return vec![Ok(StreamEvent::Done {
            finish_reason: Some("stop".into()),
        })];
    }

    let v: Value = match serde_json::from_str(data) {
        Ok(v) => v,
        Err(e) => return vec![Err(Error::Json(e))],
    };

    let Some(choice) = v
        .get("choices")
        .and_then(|c| c.as_array())
        .and_then(|a| a.first())
    else {
        return Vec::new();
    };

    let mut events = Vec::new();
    let delta = choice.get("delta").unwrap_or(&Value::Null);

    if let Some(tc_arr) = delta.get("tool_calls").and_then(|v| v.as_array()) {
        for tc in tc_arr {
            let index = tc.get("index").and_then(|v| v.as_u64()).unwrap_or(0) as u32;

            if let Some(id) = tc.get("id").and_then(|v| v.as_str()) {
                let name = tc
                    .get("function")
                    .and_then(|f| f.get("name"))
                    .and_then(|v| v.as_str())
                    .unwrap_or("");
                events.push(Ok(StreamEvent::ToolCallStarted {
                    index,
                    call_id: id.to_owned(),
                    tool_name: name.to_owned(),
                }));
            }

            if let Some(args) = tc
                .get("function")
                .and_then(|f| f.get("arguments"))
                .and_then(|v| v.as_str())
            {
                if !args.is_empty() {
                    events.push(Ok(StreamEvent::ToolCallDelta {
                        index,
                        delta: args.to_owned(),
                    }));
                }
            }
        }
    }

    if let Some(text) = delta.get("content").and_then(|v| v.as_str()) {
        if !text.is_empty() {
            events.push(Ok(StreamEvent::Token {
                text: text.to_owned(),
            }));
        }
    }

    if let Some(reason) = choice.get("finish_reason").and_then(|f| f.as_str()) {
        events.push(Ok(StreamEvent::Done {
            finish_reason: Some(reason.to_owned()),
        }));
    }

    events
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Trait implementation
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[async_trait::async_trait]
impl LlmClient for OpenAiCompatClient {
    async fn chat(&self, req: &ChatRequest) -> Result<ChatResponse> {
        let url = format!("{}/chat/completions", self.base_url);
        let body = self.build_chat_body(req, false);

        tracing::debug!(url = %url, "chat request");
        let resp = self.post_with_retry(&url, &body).await?;

        let status = resp.status();
        let text = resp
            .text()
            .await
            .map_err(|e| Error::Network(e.to_string()))?;
        if !status.is_success() {
            return Err(Error::Provider {
                provider: "openai_compat".into(),
                message: format!("HTTP {} - {}", status.as_u16(), text),
            });
        }

        let json: Value = serde_json::from_str(&text)?;
        parse_chat_response(&json)
    }

    async fn chat_stream(
        &self,
        req: &ChatRequest,
    ) -> Result<BoxStream<'static, Result<StreamEvent>>> {
        let url = format!("{}/chat/completions", self.base_url);
        let body = self.build_chat_body(req, true);

        tracing::debug!(url = %url, "chat stream request");
        let resp = self.post_with_retry(&url, &body).await?;

        let status = resp.status();
        if !status.is_success() {
            let text = resp
                .text()
                .await
                .map_err(|e| Error::Network(e.to_string()))?;
            return Err(Error::Provider {
                provider: "openai_compat".into(),
                message: format!("HTTP {} - {}", status.as_u16(), text),
            });
        }

        Ok(sse::sse_response_stream(resp, parse_sse_data))
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let url = format!("{}/embeddings", self.base_url);
        let body = serde_json::json!({
            "model": self.embedding_model,
            "input": texts,
        });

        let resp = self.post_with_retry(&url, &body).await?;
        let status = resp.status();
        let text = resp
            .text()
            .await
            .map_err(|e| Error::Network(e.to_string()))?;
        if !status.is_success() {
            return Err(Error::Provider {
                provider: "openai_compat".into(),
                message: format!("HTTP {} - {}", status.as_u16(), text),
            });
        }

        let json: Value = serde_json::from_str(&text)?;
        let data = json
            .get("data")
            .and_then(|d| d.as_array())
            .ok_or_else(|| Error::Provider {
                provider: "openai_compat".into(),
                message: "missing 'data' array in embeddings response".into(),
            })?;

        Ok(data
            .iter()
            .filter_map(|item| {
                let embedding = item.get("embedding")?.as_array()?;
                Some(
                    embedding
                        .iter()
                        .filter_map(|v| v.as_f64().map(|f| f as f32))
                        .collect(),
                )
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn assistant_tool_calls_serialize_with_raw_arguments() {
        let msg = ChatMessage::assistant_tool_calls(
            "",
            vec![ToolCallRequest {
                call_id: "c1".into(),
                name: "exec".into(),
                arguments: r#"{"command":"ls"}"#.into(),
            }],
        );
        let json = msg_to_openai(&msg);
        assert_eq!(json["role"], "assistant");
        assert!(json["content"].is_null());
        assert_eq!(json["tool_calls"][0]["id"], "c1");
        assert_eq!(
            json["tool_calls"][0]["function"]["arguments"],
            r#"{"command":"ls"}"#
        );
    }

    #[test]
    fn tool_result_serializes_with_call_id() {
        let msg = ChatMessage::tool_result("c1", "exec", "output");
        let json = msg_to_openai(&msg);
        assert_eq!(json["role"], "tool");
        assert_eq!(json["tool_call_id"], "c1");
        assert_eq!(json["content"], "output");
    }

    #[test]
    fn parse_full_response_with_tool_calls() {
        let body = serde_json::json!({
            "choices": [{
                "message": {
                    "content": null,
                    "tool_calls": [{
                        "id": "call_9",
                        "type": "function",
                        "function": {"name": "browse_url", "arguments": "{\"url\":\"x\"}"}
                    }]
                },
                "finish_reason": "tool_calls"
            }]
        });
        let parsed = parse_chat_response(&body).unwrap();
        assert_eq!(parsed.content, "");
        assert_eq!(parsed.tool_calls.len(), 1);
        assert_eq!(parsed.tool_calls[0].name, "browse_url");
        assert_eq!(parsed.finish_reason.as_deref(), Some("tool_calls"));
    }

    #[test]
    fn sse_content_delta_becomes_token() {
        let events =
            parse_sse_data(r#"{"choices":[{"delta":{"content":"Hel"}}]}"#);
        assert_eq!(events.len(), 1);
        match &events[0] {
            Ok(StreamEvent::Token { text }) => assert_eq!(text, "Hel"),
            other => panic!("unexpected event {other:?}"),
        }
    }

    #[test]
    fn sse_tool_call_start_carries_index_and_name() {
        let events = parse_sse_data(
            r#"{"choices":[{"delta":{"tool_calls":[{"index":0,"id":"c1","function":{"name":"exec","arguments":""}}]}}]}"#,
        );
        assert_eq!(events.len(), 1);
        match &events[0] {
            Ok(StreamEvent::ToolCallStarted {
                index,
                call_id,
                tool_name,
            }) => {
                assert_eq!(*index, 0);
                assert_eq!(call_id, "c1");
                assert_eq!(tool_name, "exec");
            }
            other => panic!("unexpected event {other:?}"),
        }
    }

    #[test]
    fn sse_argument_chunks_become_deltas() {
        let events = parse_sse_data(
            r#"{"choices":[{"delta":{"tool_calls":[{"index":0,"function":{"arguments":"{\"pa"}}]}}]}"#,
        );
        assert_eq!(events.len(), 1);
        match &events[0] {
            Ok(StreamEvent::ToolCallDelta { index, delta }) => {
                assert_eq!(*index, 0);
                assert_eq!(delta, "{\"pa");
            }
            other => panic!("unexpected event {other:?}"),
        }
    }

    #[test]
    fn sse_finish_reason_ends_stream() {
        let events = parse_sse_data(r#"{"choices":[{"delta":{},"finish_reason":"stop"}]}"#);
        assert!(matches!(
            events.last(),
            Some(Ok(StreamEvent::Done { finish_reason: Some(r) })) if r == "stop"
        ));
    }

    #[test]
    fn sse_done_sentinel() {
        let events = parse_sse_data("[DONE]");
        assert!(matches!(events[0], Ok(StreamEvent::Done { .. })));
    }

    #[test]
    fn json_mode_sets_response_format() {
        let client = OpenAiCompatClient::from_profile(&ProviderProfile {
            base_url: "http://localhost:1234/v1".into(),
            api_key: String::new(),
            model: "test".into(),
            temperature: 0.7,
            embedding_model: "embed".into(),
        })
        .unwrap();
        let req = ChatRequest {
            json_mode: true,
            ..Default::default()
        };
        let body = client.build_chat_body(&req, false);
        assert_eq!(body["response_format"]["type"], "json_object");
        assert!(body.get("tools").is_none());
    }

    #[test]
    fn tools_enable_auto_tool_choice() {
        let client = OpenAiCompatClient::from_profile(&ProviderProfile {
            base_url: "http://localhost:1234/v1/".into(),
            api_key: "k".into(),
            model: "test".into(),
            temperature: 0.2,
            embedding_model: "embed".into(),
        })
        .unwrap();
        let req = ChatRequest {
            tools: vec![ToolDefinition {
                name: "exec".into(),
                description: "run".into(),
                parameters: serde_json::json!({"type":"object"}),
            }],
            ..Default::default()
        };
        let body = client.build_chat_body(&req, true);
        assert_eq!(body["tool_choice"], "auto");
        assert_eq!(body["stream"], true);
        assert_eq!(body["tools"][0]["function"]["name"], "exec");
    }
}
