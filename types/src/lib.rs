//! Core domain types for Relay.
//!
//! This crate contains pure domain types with no IO, no async, and minimal
//! dependencies. Everything here can be used from any layer of the gateway.

mod chat;
mod error;
mod model;

pub use chat::{
    AssistantMessage, ChatMessage, ChatRequest, ChatResponse, Choice, ChunkChoice, ChunkDelta,
    FunctionCall, FunctionDeclaration, StopSequences, StreamChunk, ToolCall, ToolSpec, Usage,
};
pub use error::GatewayError;
pub use model::{DEFAULT_UPSTREAM_MODEL, to_inbound_model, to_upstream_model};

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

// ============================================================================
// Credential masking
// ============================================================================

/// Number of characters kept visible at each end of a masked credential.
const MASK_VISIBLE: usize = 7;

/// Mask a credential for logs and reports.
///
/// Keeps the first and last seven characters with bullets in between.
/// Credentials too short to safely reveal both ends are fully bulleted.
/// Internal identity always uses the full string; this is presentation only.
#[must_use]
pub fn mask_credential(credential: &str) -> String {
    let chars: Vec<char> = credential.chars().collect();
    if chars.len() <= MASK_VISIBLE * 2 {
        return "\u{2022}".repeat(chars.len().clamp(4, 8));
    }
    let head: String = chars[..MASK_VISIBLE].iter().collect();
    let tail: String = chars[chars.len() - MASK_VISIBLE..].iter().collect();
    format!("{head}\u{2022}\u{2022}\u{2022}\u{2022}\u{2022}\u{2022}{tail}")
}

// ============================================================================
// Selection policy
// ============================================================================

/// How the scheduler picks a credential from the eligible set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SelectionPolicy {
    /// Monotonic cursor over the registration-ordered eligible set.
    #[default]
    RoundRobin,
    /// Uniform over the eligible set.
    Random,
    /// Smallest in-flight count, ties broken by registration order.
    LeastInFlight,
}

#[derive(Debug, thiserror::Error)]
#[error("unknown selection policy {0:?} (expected round_robin, random, or least_in_flight)")]
pub struct ParsePolicyError(String);

impl SelectionPolicy {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::RoundRobin => "round_robin",
            Self::Random => "random",
            Self::LeastInFlight => "least_in_flight",
        }
    }
}

impl FromStr for SelectionPolicy {
    type Err = ParsePolicyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "round_robin" => Ok(Self::RoundRobin),
            "random" => Ok(Self::Random),
            "least_in_flight" => Ok(Self::LeastInFlight),
            other => Err(ParsePolicyError(other.to_string())),
        }
    }
}

impl fmt::Display for SelectionPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
