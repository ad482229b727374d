//! Bidirectional translation between the OpenAI Chat Completions schema and
//! the upstream `generateContent` schema.
//!
//! Request bodies are assembled with `serde_json::json!` so absent caller
//! fields are never emitted and upstream defaults stay in effect. Responses
//! come back through the typed structures in [`crate::wire`].

use crate::wire::{self, GenerateContentResponse};
use relay_types::{
    AssistantMessage, ChatRequest, ChatResponse, Choice, ChunkChoice, ChunkDelta, FunctionCall,
    GatewayError, StreamChunk, ToolCall, Usage, to_inbound_model,
};
use serde_json::{Value, json};
use std::time::{SystemTime, UNIX_EPOCH};
use uuid::Uuid;

/// Substitute text when the upstream returns no candidates at all.
const BLOCKED_MESSAGE: &str = "I'm sorry, but I can't help with that request.";

/// Fallback name for tool responses whose message carries none.
const UNKNOWN_FUNCTION: &str = "unknown_function";

/// Harm categories pinned to `BLOCK_NONE`; the gateway delegates content
/// policy to its callers.
const SAFETY_CATEGORIES: [&str; 4] = [
    "HARM_CATEGORY_HATE_SPEECH",
    "HARM_CATEGORY_SEXUALLY_EXPLICIT",
    "HARM_CATEGORY_DANGEROUS_CONTENT",
    "HARM_CATEGORY_HARASSMENT",
];

fn random_hex() -> String {
    Uuid::new_v4().simple().to_string()
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or_default()
}

// ============================================================================
// Request translation
// ============================================================================

fn upstream_role(role: &str) -> &'static str {
    match role {
        "assistant" => "model",
        "tool" => "function",
        // "user", "system" (already folded), and anything unknown
        _ => "user",
    }
}

/// Parse a JSON-encoded argument string, falling back to an empty object.
fn parse_call_args(arguments: &str) -> Value {
    serde_json::from_str(arguments).unwrap_or_else(|e| {
        tracing::warn!(error = %e, "tool call arguments are not valid JSON, substituting {{}}");
        json!({})
    })
}

/// Parse a tool result body; non-JSON results are wrapped so the upstream
/// still receives an object.
fn parse_tool_response(content: &str) -> Value {
    serde_json::from_str(content).unwrap_or_else(|_| json!({ "result": content }))
}

/// Translate an inbound chat request into a `generateContent` body.
///
/// System messages are coalesced in order and folded into the first user
/// message's text (a synthetic user message is prepended when none exists).
/// Every emitted `contents` entry carries at least one part.
pub fn to_upstream_request(request: &ChatRequest) -> Result<Value, GatewayError> {
    let system_text = request
        .messages
        .iter()
        .filter(|m| m.role == "system")
        .map(|m| m.content.as_deref().unwrap_or_default())
        .collect::<Vec<_>>()
        .join("\n");

    let mut contents: Vec<Value> = Vec::new();
    let mut system_folded = system_text.is_empty();

    for message in &request.messages {
        if message.role == "system" {
            continue;
        }
        let role = upstream_role(&message.role);

        let mut text = message.content.clone().unwrap_or_default();
        if !system_folded && role == "user" {
            text = if text.is_empty() {
                system_text.clone()
            } else {
                format!("{system_text}\n\n{text}")
            };
            system_folded = true;
        }

        let mut parts: Vec<Value> = Vec::new();
        if !text.is_empty() {
            parts.push(json!({ "text": text }));
        }
        if let Some(calls) = &message.tool_calls {
            for call in calls {
                parts.push(json!({
                    "functionCall": {
                        "name": call.function.name,
                        "args": parse_call_args(&call.function.arguments)
                    }
                }));
            }
        }
        if message.role == "tool" {
            parts.push(json!({
                "functionResponse": {
                    "name": message.name.as_deref().unwrap_or(UNKNOWN_FUNCTION),
                    "response": parse_tool_response(message.content.as_deref().unwrap_or_default())
                }
            }));
        }
        if parts.is_empty() {
            parts.push(json!({ "text": "" }));
        }

        contents.push(json!({ "role": role, "parts": parts }));
    }

    // All-system (or empty) conversations still need a user turn.
    if !system_folded {
        contents.insert(0, json!({ "role": "user", "parts": [{ "text": system_text }] }));
    }

    let mut body = serde_json::Map::new();
    body.insert("contents".into(), json!(contents));

    let mut gen_config = serde_json::Map::new();
    if let Some(temperature) = request.temperature {
        gen_config.insert("temperature".into(), json!(temperature.clamp(0.0, 2.0)));
    }
    if let Some(top_p) = request.top_p {
        gen_config.insert("topP".into(), json!(top_p.clamp(0.0, 1.0)));
    }
    if let Some(max_tokens) = request.max_tokens {
        gen_config.insert("maxOutputTokens".into(), json!(max_tokens));
    }
    if let Some(stop) = &request.stop {
        gen_config.insert("stopSequences".into(), json!(stop.clone().into_vec()));
    }
    if !gen_config.is_empty() {
        body.insert("generationConfig".into(), Value::Object(gen_config));
    }

    let safety: Vec<Value> = SAFETY_CATEGORIES
        .iter()
        .map(|category| json!({ "category": category, "threshold": "BLOCK_NONE" }))
        .collect();
    body.insert("safetySettings".into(), json!(safety));

    if let Some(tools) = &request.tools {
        let declarations: Vec<Value> = tools
            .iter()
            .filter(|tool| tool.kind == "function")
            .filter_map(|tool| tool.function.as_ref())
            .map(|decl| {
                serde_json::to_value(decl)
                    .map_err(|e| GatewayError::FormatConversion(e.to_string()))
            })
            .collect::<Result<_, _>>()?;
        if !declarations.is_empty() {
            body.insert(
                "tools".into(),
                json!([{ "functionDeclarations": declarations }]),
            );
        }
    }

    Ok(Value::Object(body))
}

// ============================================================================
// Unary response translation
// ============================================================================

fn translate_tool_calls(candidate: &wire::Candidate) -> Vec<ToolCall> {
    candidate
        .function_calls()
        .into_iter()
        .filter_map(|call| {
            let name = call.name.clone().unwrap_or_default();
            if name.is_empty() {
                tracing::warn!("upstream function call with empty name, skipping");
                return None;
            }
            let args = call.args.clone().unwrap_or_else(|| json!({}));
            Some(ToolCall {
                id: format!("call_{}", random_hex()),
                kind: "function".to_string(),
                function: FunctionCall {
                    name,
                    arguments: args.to_string(),
                },
            })
        })
        .collect()
}

/// Translate a buffered upstream response into an OpenAI chat completion.
#[must_use]
pub fn to_chat_response(upstream: &GenerateContentResponse, requested_model: &str) -> ChatResponse {
    let mut choices: Vec<Choice> = Vec::new();

    if let Some(candidates) = &upstream.candidates {
        for (position, candidate) in candidates.iter().enumerate() {
            let text = candidate.joined_text();
            let tool_calls = translate_tool_calls(candidate);
            let content = if text.is_empty() && !tool_calls.is_empty() {
                None
            } else {
                Some(text)
            };
            choices.push(Choice {
                index: candidate.index.unwrap_or(position as u32),
                message: AssistantMessage {
                    role: "assistant".to_string(),
                    content,
                    tool_calls: (!tool_calls.is_empty()).then_some(tool_calls),
                },
                finish_reason: wire::openai_finish_reason(candidate.finish_reason.as_deref()),
            });
        }
    }

    if choices.is_empty() {
        choices.push(Choice {
            index: 0,
            message: AssistantMessage {
                role: "assistant".to_string(),
                content: Some(BLOCKED_MESSAGE.to_string()),
                tool_calls: None,
            },
            finish_reason: Some("content_filter".to_string()),
        });
    }

    ChatResponse {
        id: format!("chatcmpl-{}", random_hex()),
        object: "chat.completion".to_string(),
        created: unix_now(),
        model: to_inbound_model(requested_model).to_string(),
        choices,
        usage: upstream.usage_metadata.as_ref().map(|usage| Usage {
            prompt_tokens: usage.prompt_token_count,
            completion_tokens: usage.candidates_token_count,
            total_tokens: usage.total_token_count,
        }),
    }
}

// ============================================================================
// Streaming translation
// ============================================================================

/// Per-stream envelope state: every chunk of one response shares an id,
/// creation time, and model.
#[derive(Debug)]
pub struct StreamTranslator {
    id: String,
    created: u64,
    model: String,
}

impl StreamTranslator {
    #[must_use]
    pub fn new(requested_model: &str) -> Self {
        Self {
            id: format!("chatcmpl-{}", random_hex()),
            created: unix_now(),
            model: to_inbound_model(requested_model).to_string(),
        }
    }

    /// Translate one upstream `data:` payload into one downstream chunk.
    ///
    /// Returns `None` for unparseable events, which are logged and skipped
    /// without ending the stream.
    #[must_use]
    pub fn translate_event(&self, data: &str) -> Option<StreamChunk> {
        let parsed: GenerateContentResponse = match serde_json::from_str(data) {
            Ok(parsed) => parsed,
            Err(e) => {
                tracing::warn!(error = %e, "skipping unparseable upstream stream event");
                return None;
            }
        };

        let mut delta = ChunkDelta::default();
        let mut finish_reason = None;
        if let Some(first) = parsed.candidates.as_ref().and_then(|c| c.first()) {
            delta.content = Some(first.joined_text());
            finish_reason = wire::openai_finish_reason(first.finish_reason.as_deref());
        }

        Some(StreamChunk {
            id: self.id.clone(),
            object: "chat.completion.chunk".to_string(),
            created: self.created,
            model: self.model.clone(),
            choices: vec![ChunkChoice {
                index: 0,
                delta,
                finish_reason,
            }],
        })
    }
}
