//! Chat completion orchestration.
//!
//! One inbound request drives: validation, credential extraction and
//! registration, request translation, then a failover loop bounded by the
//! inbound credential list — a credential is never retried within the same
//! request. Streaming responses commit once upstream bytes flow; after that
//! point errors close the client stream early instead of failing over.

use crate::auth;
use crate::error::ApiError;
use crate::state::AppState;
use axum::Json;
use axum::body::Bytes;
use axum::extract::State;
use axum::http::HeaderMap;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use futures_util::StreamExt;
use relay_providers::sse;
use relay_providers::translate::{self, StreamTranslator};
use relay_scheduler::Lease;
use relay_types::{ChatRequest, GatewayError, to_upstream_model};
use serde_json::Value;
use std::convert::Infallible;
use std::time::Duration;

/// POST `/chat/completions` and `/v1/chat/completions`.
pub async fn chat_completions(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, ApiError> {
    let request = parse_request(&body)?;
    let credentials = auth::extract_credentials(&headers)?;
    state.scheduler.register(credentials.iter());

    let upstream_model = to_upstream_model(&request.model).to_string();
    let upstream_body = translate::to_upstream_request(&request)?;

    // Failover loop: each attempt removes its credential from the pool, so
    // the attempt budget is exactly the inbound credential count.
    let mut remaining = credentials.clone();
    loop {
        let lease = match state.scheduler.select(&remaining) {
            Ok(lease) => lease,
            Err(_) => {
                let error = if remaining.len() == credentials.len() {
                    GatewayError::NoCredentialAvailable
                } else {
                    GatewayError::ServiceUnavailable
                };
                return Err(error.into());
            }
        };
        remaining.retain(|c| c != lease.credential());
        let attempts_left = !remaining.is_empty();

        let outcome = if request.stream {
            stream_attempt(&state, &request, &upstream_model, &upstream_body, lease).await
        } else {
            unary_attempt(&state, &request, &upstream_model, &upstream_body, lease).await
        };

        match outcome {
            Ok(response) => return Ok(response),
            Err(error) => {
                if error.is_failover_eligible() && attempts_left {
                    tracing::warn!(
                        code = error.error_code(),
                        remaining = remaining.len(),
                        "attempt failed, failing over"
                    );
                    continue;
                }
                return Err(error.into());
            }
        }
    }
}

fn parse_request(body: &Bytes) -> Result<ChatRequest, GatewayError> {
    let value: Value = serde_json::from_slice(body)
        .map_err(|e| GatewayError::Validation(format!("invalid JSON body: {e}")))?;
    if !value.is_object() {
        return Err(GatewayError::Validation(
            "request body must be a JSON object".to_string(),
        ));
    }
    let has_messages = value
        .get("messages")
        .and_then(Value::as_array)
        .is_some_and(|messages| !messages.is_empty());
    if !has_messages {
        return Err(GatewayError::Validation(
            "`messages` must be a non-empty array".to_string(),
        ));
    }
    serde_json::from_value(value)
        .map_err(|e| GatewayError::Validation(format!("malformed chat request: {e}")))
}

async fn unary_attempt(
    state: &AppState,
    request: &ChatRequest,
    upstream_model: &str,
    upstream_body: &Value,
    lease: Lease,
) -> Result<Response, GatewayError> {
    match state
        .upstream
        .generate(upstream_model, upstream_body, lease.credential())
        .await
    {
        Ok(upstream) => {
            lease.succeed();
            let response = translate::to_chat_response(&upstream, &request.model);
            Ok(Json(response).into_response())
        }
        Err(error) => {
            lease.fail();
            Err(error.into())
        }
    }
}

async fn stream_attempt(
    state: &AppState,
    request: &ChatRequest,
    upstream_model: &str,
    upstream_body: &Value,
    lease: Lease,
) -> Result<Response, GatewayError> {
    match state
        .upstream
        .stream_generate(upstream_model, upstream_body, lease.credential())
        .await
    {
        Ok(upstream) => {
            let translator = StreamTranslator::new(&request.model);
            Ok(stream_response(upstream, translator, lease))
        }
        Err(error) => {
            lease.fail();
            Err(error.into())
        }
    }
}

/// Relay the upstream SSE byte stream as translated chunk events.
///
/// The lease settles inside the generator: clean completion records a
/// success and emits the `[DONE]` terminator; a mid-stream failure records a
/// failure and closes the stream early; a client disconnect drops the
/// generator and the unsettled lease records the failure on drop.
fn stream_response(
    upstream: reqwest::Response,
    translator: StreamTranslator,
    lease: Lease,
) -> Response {
    let stream = async_stream::stream! {
        let mut lease = Some(lease);
        let mut bytes = upstream.bytes_stream();
        let mut reader = sse::SseReader::new();

        while let Some(chunk) = bytes.next().await {
            let chunk = match chunk {
                Ok(chunk) => chunk,
                Err(error) => {
                    tracing::warn!(error = %error, "upstream stream failed mid-flight");
                    if let Some(lease) = lease.take() {
                        lease.fail();
                    }
                    return;
                }
            };

            reader.feed(&chunk);
            if reader.pending_bytes() > sse::MAX_EVENT_BUFFER_BYTES {
                tracing::warn!("upstream stream exceeded the event buffer limit");
                if let Some(lease) = lease.take() {
                    lease.fail();
                }
                return;
            }

            while let Some(data) = reader.take_data() {
                if data == "[DONE]" {
                    continue;
                }
                if let Some(chunk) = translator.translate_event(&data) {
                    match serde_json::to_string(&chunk) {
                        Ok(payload) => yield Ok::<_, Infallible>(Event::default().data(payload)),
                        Err(error) => {
                            tracing::warn!(error = %error, "failed to serialize stream chunk");
                        }
                    }
                }
            }
        }

        if let Some(lease) = lease.take() {
            lease.succeed();
        }
        yield Ok(Event::default().data("[DONE]"));
    };

    Sse::new(stream)
        .keep_alive(KeepAlive::new().interval(Duration::from_secs(15)))
        .into_response()
}
