//! Batched credential validation.
//!
//! Probes run in arrival-order batches of ten; each verdict is flushed to
//! the SSE stream the moment its probe resolves, so a slow credential never
//! delays the verdicts of the rest of its batch.

use crate::auth;
use crate::error::ApiError;
use crate::state::AppState;
use axum::extract::State;
use axum::http::HeaderMap;
use axum::response::sse::{Event, Sse};
use axum::response::{IntoResponse, Response};
use futures_util::StreamExt;
use futures_util::stream::FuturesUnordered;
use relay_providers::{UpstreamClient, UpstreamError};
use relay_types::{DEFAULT_UPSTREAM_MODEL, GatewayError, mask_credential};
use serde::Serialize;
use std::convert::Infallible;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Upper bound on one validation request.
const MAX_BATCH: usize = 50;

/// Probes running concurrently; also the batch granularity.
const PROBE_CONCURRENCY: usize = 10;

/// Per-probe budget, independent of the chat-path timeout.
const PROBE_TIMEOUT: Duration = Duration::from_secs(15);

/// One per-credential verdict frame.
#[derive(Debug, Serialize)]
pub struct Verdict {
    pub key: String,
    pub status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(rename = "responseTime")]
    pub response_time_ms: u64,
}

/// POST `/verify`: stream one verdict per supplied credential, then `[DONE]`.
pub async fn verify_credentials(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Response, ApiError> {
    let credentials = auth::extract_credentials(&headers)?;
    if credentials.len() > MAX_BATCH {
        return Err(GatewayError::Validation(format!(
            "at most {MAX_BATCH} credentials per verification request"
        ))
        .into());
    }
    // Probes do not report into the health state machine, but the
    // credentials still join the registry on first appearance.
    state.scheduler.register(credentials.iter());

    let upstream = Arc::clone(&state.upstream);
    let stream = async_stream::stream! {
        for batch in credentials.chunks(PROBE_CONCURRENCY) {
            let mut probes: FuturesUnordered<_> = batch
                .iter()
                .cloned()
                .map(|credential| probe_credential(Arc::clone(&upstream), credential))
                .collect();
            while let Some(verdict) = probes.next().await {
                match serde_json::to_string(&verdict) {
                    Ok(payload) => yield Ok::<_, Infallible>(Event::default().data(payload)),
                    Err(error) => tracing::warn!(error = %error, "failed to serialize verdict"),
                }
            }
        }
        yield Ok(Event::default().data("[DONE]"));
    };

    Ok(Sse::new(stream).into_response())
}

async fn probe_credential(upstream: Arc<UpstreamClient>, credential: String) -> Verdict {
    let started = Instant::now();
    let outcome = upstream
        .probe(DEFAULT_UPSTREAM_MODEL, &credential, PROBE_TIMEOUT)
        .await;
    let response_time_ms = started.elapsed().as_millis() as u64;
    let key = mask_credential(&credential);

    match outcome {
        Ok(()) => Verdict {
            key,
            status: "GOOD",
            error: None,
            response_time_ms,
        },
        Err(error @ (UpstreamError::Timeout | UpstreamError::Network(_))) => {
            tracing::debug!(key = %key, error = %error, "credential probe errored");
            Verdict {
                key,
                status: "ERROR",
                error: Some(error.to_string()),
                response_time_ms,
            }
        }
        Err(error) => {
            tracing::debug!(key = %key, error = %error, "credential probe rejected");
            Verdict {
                key,
                status: "BAD",
                error: Some(error.to_string()),
                response_time_ms,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verdict_serializes_with_the_wire_field_names() {
        let verdict = Verdict {
            key: "AIzaSyB\u{2022}\u{2022}\u{2022}stuvwx".to_string(),
            status: "GOOD",
            error: None,
            response_time_ms: 42,
        };
        let value = serde_json::to_value(&verdict).unwrap();
        assert_eq!(value["status"], "GOOD");
        assert_eq!(value["responseTime"], 42);
        assert!(value.get("error").is_none());
    }
}
