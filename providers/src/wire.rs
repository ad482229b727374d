//! Typed structures for upstream `generateContent` responses.
//!
//! Request bodies are built with `serde_json::json!` in the translator;
//! responses deserialize here so parse errors happen at the serde boundary
//! instead of scattered through translation logic.

use serde::Deserialize;
use serde_json::Value;

/// One upstream response object. Streaming sends a complete object per SSE
/// event; the unary call returns exactly one.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateContentResponse {
    pub candidates: Option<Vec<Candidate>>,
    pub usage_metadata: Option<UsageMetadata>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Candidate {
    pub content: Option<Content>,
    pub finish_reason: Option<String>,
    pub index: Option<u32>,
}

impl Candidate {
    /// Concatenated text parts of this candidate.
    #[must_use]
    pub fn joined_text(&self) -> String {
        let mut text = String::new();
        if let Some(content) = &self.content
            && let Some(parts) = &content.parts
        {
            for part in parts {
                if let Some(piece) = &part.text {
                    text.push_str(piece);
                }
            }
        }
        text
    }

    /// Function-call parts of this candidate, in order.
    #[must_use]
    pub fn function_calls(&self) -> Vec<&FunctionCall> {
        let Some(parts) = self.content.as_ref().and_then(|c| c.parts.as_ref()) else {
            return Vec::new();
        };
        parts.iter().filter_map(|p| p.function_call.as_ref()).collect()
    }
}

#[derive(Debug, Deserialize)]
pub struct Content {
    pub parts: Option<Vec<Part>>,
    pub role: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Part {
    pub text: Option<String>,
    pub function_call: Option<FunctionCall>,
}

#[derive(Debug, Deserialize)]
pub struct FunctionCall {
    pub name: Option<String>,
    pub args: Option<Value>,
}

/// Token usage data returned by the upstream.
#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct UsageMetadata {
    #[serde(default)]
    pub prompt_token_count: u32,
    #[serde(default)]
    pub candidates_token_count: u32,
    #[serde(default)]
    pub total_token_count: u32,
}

/// Known upstream finish reasons.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FinishReason {
    Stop,
    MaxTokens,
    Safety,
    Recitation,
    Other,
    Unknown,
}

impl FinishReason {
    #[must_use]
    pub fn parse(s: &str) -> Self {
        match s {
            "STOP" => Self::Stop,
            "MAX_TOKENS" => Self::MaxTokens,
            "SAFETY" => Self::Safety,
            "RECITATION" => Self::Recitation,
            "OTHER" => Self::Other,
            _ => Self::Unknown,
        }
    }

    /// The OpenAI-side `finish_reason` string.
    #[must_use]
    pub fn as_openai(self) -> &'static str {
        match self {
            Self::Stop | Self::Other | Self::Unknown => "stop",
            Self::MaxTokens => "length",
            Self::Safety | Self::Recitation => "content_filter",
        }
    }
}

/// Map an optional upstream finish reason to the OpenAI-side string;
/// absent stays absent (`null` on the wire).
#[must_use]
pub fn openai_finish_reason(reason: Option<&str>) -> Option<String> {
    reason.map(|r| FinishReason::parse(r).as_openai().to_string())
}
