//! Anthropic Messages API adapter.
//!
//! Covers streaming and non-streaming calls, client tool use, provider-side
//! web search (`server_tool_use` / `web_search_tool_result` blocks), and
//! prompt-cache markers on cacheable system segments.

use std::collections::HashMap;

use crate::sse::SseFrame;
use crate::traits::{ChatRequest, ChatResponse, LlmProvider};
use crate::util::{from_reqwest, resolve_api_key, status_for_error_type};
use hb_domain::config::LlmConfig;
use hb_domain::error::{Error, Result};
use hb_domain::stream::{BoxStream, StopReason, StreamEvent, Usage, WebSource};
use hb_domain::tool::{ContentPart, Message, MessageContent, Role, SystemBlock, ToolCall, ToolDefinition};
use serde_json::{json, Value};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Constants
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

const ANTHROPIC_VERSION: &str = "2023-06-01";
const WEB_SEARCH_TOOL_TYPE: &str = "web_search_20250305";
pub const WEB_SEARCH_TOOL_NAME: &str = "web_search";

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Adapter struct
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// An LLM provider adapter for the Anthropic Messages API.
pub struct AnthropicProvider {
    id: String,
    base_url: String,
    api_key: String,
    default_model: String,
    default_max_tokens: u32,
    client: reqwest::Client,
}

impl AnthropicProvider {
    /// Create a new provider from the `[llm]` config section. The API key
    /// is read from the environment variable the config names.
    pub fn from_config(cfg: &LlmConfig) -> Result<Self> {
        let api_key = resolve_api_key(&cfg.api_key_env)?;
        Self::with_api_key(cfg, api_key)
    }

    pub fn with_api_key(cfg: &LlmConfig, api_key: String) -> Result<Self> {
        // Streams are bounded by the provider's own lifecycle, so only the
        // connect phase gets a timeout here; `chat` adds a per-request one.
        let client = reqwest::Client::builder()
            .connect_timeout(std::time::Duration::from_secs(15))
            .build()
            .map_err(from_reqwest)?;

        Ok(Self {
            id: "anthropic".into(),
            base_url: cfg.base_url.trim_end_matches('/').to_string(),
            api_key,
            default_model: cfg.model.clone(),
            default_max_tokens: cfg.max_tokens,
            client,
        })
    }

    // ── Internal helpers ───────────────────────────────────────────

    fn authed_post(&self, url: &str) -> reqwest::RequestBuilder {
        self.client
            .post(url)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .header("Content-Type", "application/json")
    }

    fn build_messages_body(&self, req: &ChatRequest, stream: bool) -> Value {
        let model = req
            .model
            .clone()
            .unwrap_or_else(|| self.default_model.clone());

        let api_messages: Vec<Value> = req.messages.iter().map(message_to_anthropic).collect();

        let mut body = json!({
            "model": model,
            "messages": api_messages,
            "stream": stream,
            "max_tokens": req.max_tokens.unwrap_or(self.default_max_tokens),
        });

        if !req.system.is_empty() {
            body["system"] = Value::Array(req.system.iter().map(system_to_anthropic).collect());
        }

        let mut tools: Vec<Value> = req.tools.iter().map(tool_to_anthropic).collect();
        // The catalog is identical on every round; mark its end so the
        // tool block joins the cached prefix.
        if let Some(last) = tools.last_mut() {
            last["cache_control"] = json!({ "type": "ephemeral" });
        }
        if let Some(max_uses) = req.web_search_max_uses.filter(|n| *n > 0) {
            tools.push(json!({
                "type": WEB_SEARCH_TOOL_TYPE,
                "name": WEB_SEARCH_TOOL_NAME,
                "max_uses": max_uses,
            }));
        }
        if !tools.is_empty() {
            body["tools"] = Value::Array(tools);
        }

        if let Some(temp) = req.temperature {
            body["temperature"] = json!(temp);
        }

        body
    }

    fn http_error(&self, status: reqwest::StatusCode, body: &str) -> Error {
        Error::Provider {
            provider: self.id.clone(),
            status: Some(status.as_u16()),
            message: format!("HTTP {} - {}", status.as_u16(), body),
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Message serialization helpers
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

fn system_to_anthropic(block: &SystemBlock) -> Value {
    let mut v = json!({ "type": "text", "text": block.text });
    if block.cacheable {
        v["cache_control"] = json!({ "type": "ephemeral" });
    }
    v
}

fn message_to_anthropic(msg: &Message) -> Value {
    let role = match msg.role {
        Role::User => "user",
        Role::Assistant => "assistant",
    };
    let content = match &msg.content {
        MessageContent::Text(t) => match msg.role {
            Role::User => Value::String(t.clone()),
            Role::Assistant => json!([{ "type": "text", "text": t }]),
        },
        MessageContent::Parts(parts) => {
            Value::Array(parts.iter().filter_map(part_to_anthropic).collect())
        }
    };
    json!({ "role": role, "content": content })
}

fn part_to_anthropic(part: &ContentPart) -> Option<Value> {
    match part {
        // Empty text blocks are rejected upstream.
        ContentPart::Text { text } if text.is_empty() => None,
        ContentPart::Text { text } => Some(json!({ "type": "text", "text": text })),
        ContentPart::ToolUse { id, name, input } => Some(json!({
            "type": "tool_use",
            "id": id,
            "name": name,
            "input": input,
        })),
        ContentPart::ToolResult {
            tool_use_id,
            content,
            is_error,
        } => Some(json!({
            "type": "tool_result",
            "tool_use_id": tool_use_id,
            "content": content,
            "is_error": is_error,
        })),
        ContentPart::ServerToolUse { id, name, input } => Some(json!({
            "type": "server_tool_use",
            "id": id,
            "name": name,
            "input": input,
        })),
        ContentPart::WebSearchToolResult {
            tool_use_id,
            content,
        } => Some(json!({
            "type": "web_search_tool_result",
            "tool_use_id": tool_use_id,
            "content": content,
        })),
    }
}

fn tool_to_anthropic(tool: &ToolDefinition) -> Value {
    json!({
        "name": tool.name,
        "description": tool.description,
        "input_schema": tool.parameters,
    })
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Response deserialization
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

fn parse_anthropic_response(body: &Value) -> Result<ChatResponse> {
    let empty = Vec::new();
    let content_arr = body
        .get("content")
        .and_then(|v| v.as_array())
        .unwrap_or(&empty);

    let mut text_parts: Vec<&str> = Vec::new();
    let mut tool_calls: Vec<ToolCall> = Vec::new();

    for block in content_arr {
        match str_field(block, "type") {
            "text" => {
                if let Some(t) = block.get("text").and_then(|v| v.as_str()) {
                    text_parts.push(t);
                }
            }
            "tool_use" => tool_calls.push(ToolCall {
                call_id: str_field(block, "id").to_string(),
                tool_name: str_field(block, "name").to_string(),
                arguments: block
                    .get("input")
                    .cloned()
                    .unwrap_or(Value::Object(Default::default())),
            }),
            _ => {}
        }
    }

    Ok(ChatResponse {
        content: text_parts.join(""),
        tool_calls,
        usage: body.get("usage").and_then(parse_anthropic_usage),
        model: body
            .get("model")
            .and_then(|v| v.as_str())
            .unwrap_or("unknown")
            .to_string(),
        stop_reason: body
            .get("stop_reason")
            .and_then(|v| v.as_str())
            .map(StopReason::parse),
    })
}

/// Input tokens include cache reads and writes: the ceiling is about how
/// much context the turn consumed, not what was billed.
fn parse_anthropic_usage(v: &Value) -> Option<Usage> {
    let field = |name: &str| v.get(name).and_then(|x| x.as_u64()).unwrap_or(0) as u32;
    let input = field("input_tokens")
        + field("cache_creation_input_tokens")
        + field("cache_read_input_tokens");
    let output = v.get("output_tokens")?.as_u64()? as u32;
    Some(Usage {
        input_tokens: input,
        output_tokens: output,
    })
}

fn str_field<'a>(v: &'a Value, key: &str) -> &'a str {
    v.get(key).and_then(|x| x.as_str()).unwrap_or("")
}

fn web_sources(content: &Value) -> Vec<WebSource> {
    content
        .as_array()
        .map(|items| {
            items
                .iter()
                .filter(|item| str_field(item, "type") == "web_search_result")
                .filter_map(|item| {
                    let url = item.get("url")?.as_str()?;
                    Some(WebSource {
                        url: url.to_string(),
                        title: str_field(item, "title").to_string(),
                    })
                })
                .collect()
        })
        .unwrap_or_default()
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Streaming SSE helpers
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug)]
enum OpenBlock {
    Tool { id: String, name: String, args: String },
    ServerTool { id: String, name: String, args: String },
}

/// Assembly state carried across frames of one streamed response.
#[derive(Debug, Default)]
pub(crate) struct StreamState {
    /// Open tool blocks by content-block index.
    blocks: HashMap<u64, OpenBlock>,
    usage: Option<Usage>,
    done_emitted: bool,
}

/// Parse one Anthropic SSE frame into zero or more stream events.
pub(crate) fn parse_anthropic_sse(
    frame: &SseFrame,
    provider: &str,
    state: &mut StreamState,
) -> Vec<Result<StreamEvent>> {
    let mut events = Vec::new();
    if frame.data.is_empty() {
        return events;
    }

    let v: Value = match serde_json::from_str(&frame.data) {
        Ok(v) => v,
        Err(e) => {
            events.push(Err(Error::Json(e)));
            return events;
        }
    };

    match str_field(&v, "type") {
        "message_start" => {
            if let Some(msg) = v.get("message") {
                state.usage = msg.get("usage").and_then(parse_anthropic_usage);
            }
        }

        "content_block_start" => {
            let idx = v.get("index").and_then(|v| v.as_u64()).unwrap_or(0);
            let Some(block) = v.get("content_block") else {
                return events;
            };
            match str_field(block, "type") {
                "text" => {
                    let text = str_field(block, "text");
                    if !text.is_empty() {
                        events.push(Ok(StreamEvent::Token { text: text.to_string() }));
                    }
                }
                "tool_use" => {
                    let id = str_field(block, "id").to_string();
                    let name = str_field(block, "name").to_string();
                    events.push(Ok(StreamEvent::ToolCallStarted {
                        call_id: id.clone(),
                        tool_name: name.clone(),
                    }));
                    state.blocks.insert(idx, OpenBlock::Tool { id, name, args: String::new() });
                }
                "server_tool_use" => {
                    state.blocks.insert(
                        idx,
                        OpenBlock::ServerTool {
                            id: str_field(block, "id").to_string(),
                            name: str_field(block, "name").to_string(),
                            args: String::new(),
                        },
                    );
                }
                "web_search_tool_result" => {
                    let raw = block.get("content").cloned().unwrap_or(Value::Null);
                    events.push(Ok(StreamEvent::WebSearchResults {
                        call_id: str_field(block, "tool_use_id").to_string(),
                        sources: web_sources(&raw),
                        raw,
                    }));
                }
                _ => {}
            }
        }

        "content_block_delta" => {
            let idx = v.get("index").and_then(|v| v.as_u64()).unwrap_or(0);
            let Some(delta) = v.get("delta") else {
                return events;
            };
            match str_field(delta, "type") {
                "text_delta" => {
                    let text = str_field(delta, "text");
                    if !text.is_empty() {
                        events.push(Ok(StreamEvent::Token { text: text.to_string() }));
                    }
                }
                "input_json_delta" => {
                    let partial = str_field(delta, "partial_json");
                    match state.blocks.get_mut(&idx) {
                        Some(OpenBlock::Tool { id, args, .. }) => {
                            args.push_str(partial);
                            events.push(Ok(StreamEvent::ToolCallDelta {
                                call_id: id.clone(),
                                delta: partial.to_string(),
                            }));
                        }
                        Some(OpenBlock::ServerTool { args, .. }) => args.push_str(partial),
                        None => {}
                    }
                }
                _ => {}
            }
        }

        "content_block_stop" => {
            let idx = v.get("index").and_then(|v| v.as_u64()).unwrap_or(0);
            match state.blocks.remove(&idx) {
                Some(OpenBlock::Tool { id, name, args }) => {
                    events.push(Ok(StreamEvent::ToolCallFinished {
                        call_id: id,
                        tool_name: name,
                        arguments: parse_args(&args),
                    }));
                }
                Some(OpenBlock::ServerTool { id, name, args }) => {
                    events.push(Ok(StreamEvent::ServerToolCall {
                        call_id: id,
                        tool_name: name,
                        arguments: parse_args(&args),
                    }));
                }
                None => {}
            }
        }

        "message_delta" => {
            if let Some(usage_val) = v.get("usage") {
                let u = state.usage.get_or_insert_with(Usage::default);
                if let Some(output) = usage_val.get("output_tokens").and_then(|v| v.as_u64()) {
                    u.output_tokens = output as u32;
                }
                if let Some(input) = usage_val.get("input_tokens").and_then(|v| v.as_u64()) {
                    u.input_tokens = u.input_tokens.max(input as u32);
                }
            }
            let stop_reason = v
                .get("delta")
                .and_then(|d| d.get("stop_reason"))
                .and_then(|v| v.as_str())
                .map(StopReason::parse);
            if stop_reason.is_some() {
                state.done_emitted = true;
                events.push(Ok(StreamEvent::Done {
                    usage: state.usage,
                    stop_reason,
                }));
            }
        }

        "message_stop" => {
            if !state.done_emitted {
                state.done_emitted = true;
                events.push(Ok(StreamEvent::Done {
                    usage: state.usage,
                    stop_reason: None,
                }));
            }
        }

        "error" => {
            let err = v.get("error");
            let kind = err.map(|e| str_field(e, "type")).unwrap_or("");
            let msg = err
                .map(|e| str_field(e, "message"))
                .filter(|m| !m.is_empty())
                .unwrap_or("unknown error");
            events.push(Err(Error::Provider {
                provider: provider.to_string(),
                status: status_for_error_type(kind),
                message: format!("{kind}: {msg}"),
            }));
        }

        _ => {
            // ping or unknown event types
        }
    }

    events
}

/// Tool input JSON that fails to parse becomes an empty object so the
/// call still runs (and its handler reports the missing fields).
fn parse_args(raw: &str) -> Value {
    if raw.trim().is_empty() {
        return Value::Object(Default::default());
    }
    serde_json::from_str(raw).unwrap_or_else(|e| {
        tracing::warn!(error = %e, "tool input did not parse; using empty object");
        Value::Object(Default::default())
    })
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Trait implementation
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[async_trait::async_trait]
impl LlmProvider for AnthropicProvider {
    async fn chat(&self, req: ChatRequest) -> Result<ChatResponse> {
        let url = format!("{}/v1/messages", self.base_url);
        let body = self.build_messages_body(&req, false);

        tracing::debug!(provider = %self.id, url = %url, "anthropic chat request");

        let resp = self
            .authed_post(&url)
            .timeout(std::time::Duration::from_secs(120))
            .json(&body)
            .send()
            .await
            .map_err(from_reqwest)?;

        let status = resp.status();
        let resp_text = resp.text().await.map_err(from_reqwest)?;

        if !status.is_success() {
            return Err(self.http_error(status, &resp_text));
        }

        let resp_json: Value = serde_json::from_str(&resp_text)?;
        parse_anthropic_response(&resp_json)
    }

    async fn chat_stream(
        &self,
        req: ChatRequest,
    ) -> Result<BoxStream<'static, Result<StreamEvent>>> {
        let url = format!("{}/v1/messages", self.base_url);
        let body = self.build_messages_body(&req, true);

        tracing::debug!(provider = %self.id, url = %url, "anthropic stream request");

        let resp = self
            .authed_post(&url)
            .json(&body)
            .send()
            .await
            .map_err(from_reqwest)?;

        let status = resp.status();
        if !status.is_success() {
            let err_text = resp.text().await.map_err(from_reqwest)?;
            return Err(self.http_error(status, &err_text));
        }

        let provider_id = self.id.clone();
        let mut state = StreamState::default();
        Ok(crate::sse::sse_response_stream(resp, move |frame| {
            parse_anthropic_sse(frame, &provider_id, &mut state)
        }))
    }

    fn provider_id(&self) -> &str {
        &self.id
    }

    fn default_model(&self) -> &str {
        &self.default_model
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tests
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sse::SseDecoder;

    fn provider() -> AnthropicProvider {
        AnthropicProvider::with_api_key(&LlmConfig::default(), "test-key".into()).unwrap()
    }

    fn run(frames_text: &str) -> Vec<Result<StreamEvent>> {
        let mut decoder = SseDecoder::new();
        let mut state = StreamState::default();
        let mut out = Vec::new();
        let mut frames = decoder.feed(frames_text.as_bytes());
        frames.extend(decoder.finish());
        for f in &frames {
            out.extend(parse_anthropic_sse(f, "anthropic", &mut state));
        }
        out
    }

    #[test]
    fn body_marks_cacheable_system_blocks_and_last_tool() {
        let p = provider();
        let req = ChatRequest {
            system: vec![
                SystemBlock { text: "rules".into(), cacheable: true },
                SystemBlock { text: "today".into(), cacheable: false },
            ],
            messages: vec![Message::user("hi")],
            tools: vec![
                ToolDefinition {
                    name: "a".into(),
                    description: "A".into(),
                    parameters: json!({"type": "object"}),
                },
                ToolDefinition {
                    name: "b".into(),
                    description: "B".into(),
                    parameters: json!({"type": "object"}),
                },
            ],
            web_search_max_uses: Some(3),
            ..Default::default()
        };
        let body = p.build_messages_body(&req, true);

        assert_eq!(body["system"][0]["cache_control"]["type"], "ephemeral");
        assert!(body["system"][1].get("cache_control").is_none());
        assert!(body["tools"][0].get("cache_control").is_none());
        assert_eq!(body["tools"][1]["cache_control"]["type"], "ephemeral");
        assert_eq!(body["tools"][2]["type"], WEB_SEARCH_TOOL_TYPE);
        assert_eq!(body["tools"][2]["max_uses"], 3);
        assert_eq!(body["max_tokens"], 4096);
        assert_eq!(body["stream"], true);
    }

    #[test]
    fn body_serializes_tool_results_in_order() {
        let p = provider();
        let req = ChatRequest {
            messages: vec![Message::tool_results(vec![
                ("t1".into(), "{\"ok\":1}".into(), false),
                ("t2".into(), "{\"error\":\"x\"}".into(), true),
            ])],
            ..Default::default()
        };
        let body = p.build_messages_body(&req, false);
        let content = &body["messages"][0]["content"];
        assert_eq!(body["messages"][0]["role"], "user");
        assert_eq!(content[0]["tool_use_id"], "t1");
        assert_eq!(content[1]["tool_use_id"], "t2");
        assert_eq!(content[1]["is_error"], true);
    }

    #[test]
    fn stream_text_tool_and_stop_reason() {
        let sse = concat!(
            "event: message_start\n",
            "data: {\"type\":\"message_start\",\"message\":{\"usage\":{\"input_tokens\":120,\"output_tokens\":1}}}\n\n",
            "event: content_block_start\n",
            "data: {\"type\":\"content_block_start\",\"index\":0,\"content_block\":{\"type\":\"text\",\"text\":\"\"}}\n\n",
            "event: content_block_delta\n",
            "data: {\"type\":\"content_block_delta\",\"index\":0,\"delta\":{\"type\":\"text_delta\",\"text\":\"Creating\"}}\n\n",
            "event: content_block_stop\n",
            "data: {\"type\":\"content_block_stop\",\"index\":0}\n\n",
            "event: content_block_start\n",
            "data: {\"type\":\"content_block_start\",\"index\":1,\"content_block\":{\"type\":\"tool_use\",\"id\":\"toolu_1\",\"name\":\"create_deal\",\"input\":{}}}\n\n",
            "event: content_block_delta\n",
            "data: {\"type\":\"content_block_delta\",\"index\":1,\"delta\":{\"type\":\"input_json_delta\",\"partial_json\":\"{\\\"property_address\\\":\"}}\n\n",
            "event: content_block_delta\n",
            "data: {\"type\":\"content_block_delta\",\"index\":1,\"delta\":{\"type\":\"input_json_delta\",\"partial_json\":\"\\\"123 Main St\\\"}\"}}\n\n",
            "event: content_block_stop\n",
            "data: {\"type\":\"content_block_stop\",\"index\":1}\n\n",
            "event: message_delta\n",
            "data: {\"type\":\"message_delta\",\"delta\":{\"stop_reason\":\"tool_use\"},\"usage\":{\"output_tokens\":40}}\n\n",
            "event: message_stop\n",
            "data: {\"type\":\"message_stop\"}\n\n",
        );
        let events: Vec<StreamEvent> = run(sse).into_iter().map(|e| e.unwrap()).collect();

        assert!(matches!(&events[0], StreamEvent::Token { text } if text == "Creating"));
        assert!(matches!(&events[1], StreamEvent::ToolCallStarted { tool_name, .. } if tool_name == "create_deal"));
        match &events[4] {
            StreamEvent::ToolCallFinished { call_id, arguments, .. } => {
                assert_eq!(call_id, "toolu_1");
                assert_eq!(arguments["property_address"], "123 Main St");
            }
            other => panic!("unexpected {other:?}"),
        }
        match events.last().unwrap() {
            StreamEvent::Done { usage, stop_reason } => {
                assert_eq!(*stop_reason, Some(StopReason::ToolUse));
                assert_eq!(usage.unwrap().total(), 160);
            }
            other => panic!("unexpected {other:?}"),
        }
        // message_stop after message_delta does not produce a second Done.
        assert_eq!(events.iter().filter(|e| matches!(e, StreamEvent::Done { .. })).count(), 1);
    }

    #[test]
    fn malformed_tool_json_becomes_empty_object() {
        let sse = concat!(
            "data: {\"type\":\"content_block_start\",\"index\":0,\"content_block\":{\"type\":\"tool_use\",\"id\":\"t\",\"name\":\"search_contacts\"}}\n\n",
            "data: {\"type\":\"content_block_delta\",\"index\":0,\"delta\":{\"type\":\"input_json_delta\",\"partial_json\":\"{\\\"query\\\": \\\"Jo\"}}\n\n",
            "data: {\"type\":\"content_block_stop\",\"index\":0}\n\n",
        );
        let events: Vec<StreamEvent> = run(sse).into_iter().map(|e| e.unwrap()).collect();
        match events.last().unwrap() {
            StreamEvent::ToolCallFinished { arguments, .. } => {
                assert_eq!(*arguments, json!({}));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn web_search_blocks_surface_sources() {
        let sse = concat!(
            "data: {\"type\":\"content_block_start\",\"index\":0,\"content_block\":{\"type\":\"server_tool_use\",\"id\":\"srv_1\",\"name\":\"web_search\",\"input\":{}}}\n\n",
            "data: {\"type\":\"content_block_delta\",\"index\":0,\"delta\":{\"type\":\"input_json_delta\",\"partial_json\":\"{\\\"query\\\":\\\"austin market\\\"}\"}}\n\n",
            "data: {\"type\":\"content_block_stop\",\"index\":0}\n\n",
            "data: {\"type\":\"content_block_start\",\"index\":1,\"content_block\":{\"type\":\"web_search_tool_result\",\"tool_use_id\":\"srv_1\",\"content\":[{\"type\":\"web_search_result\",\"url\":\"https://a.example\",\"title\":\"A\"},{\"type\":\"web_search_result\",\"url\":\"https://b.example\",\"title\":\"B\"}]}}\n\n",
            "data: {\"type\":\"content_block_stop\",\"index\":1}\n\n",
        );
        let events: Vec<StreamEvent> = run(sse).into_iter().map(|e| e.unwrap()).collect();
        assert!(matches!(&events[0], StreamEvent::ServerToolCall { arguments, .. } if arguments["query"] == "austin market"));
        match &events[1] {
            StreamEvent::WebSearchResults { call_id, sources, .. } => {
                assert_eq!(call_id, "srv_1");
                assert_eq!(sources.len(), 2);
                assert_eq!(sources[1].url, "https://b.example");
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn overloaded_error_frame_is_retryable() {
        let sse = "event: error\ndata: {\"type\":\"error\",\"error\":{\"type\":\"overloaded_error\",\"message\":\"Overloaded\"}}\n\n";
        let events = run(sse);
        let err = events.into_iter().next().unwrap().unwrap_err();
        assert!(err.is_retryable());
    }

    #[test]
    fn non_streaming_response_parses() {
        let body = json!({
            "model": "claude-haiku-4-5",
            "content": [{"type": "text", "text": "Listing on Main St"}],
            "stop_reason": "end_turn",
            "usage": {"input_tokens": 50, "output_tokens": 6}
        });
        let resp = parse_anthropic_response(&body).unwrap();
        assert_eq!(resp.content, "Listing on Main St");
        assert_eq!(resp.stop_reason, Some(StopReason::EndTurn));
        assert_eq!(resp.usage.unwrap().total(), 56);
    }
}
