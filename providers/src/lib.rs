//! Upstream Generative Language client with format translation.
//!
//! This crate handles HTTP communication with the upstream
//! `generateContent` endpoint family, including SSE streaming, typed error
//! classification, and the OpenAI-format translation layer.

mod retry;
pub mod sse;
pub mod translate;
pub mod wire;

pub use retry::RetryConfig;

use relay_types::GatewayError;
use serde_json::Value;
use std::sync::OnceLock;
use std::time::Duration;
use thiserror::Error;

// ============================================================================
// Shared HTTP Client
// ============================================================================

/// Connection-establishment timeout; per-call budgets are separate.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Byte budget when draining an error response body (32 KiB). Upstream
/// error documents are small; anything past this is noise.
const ERROR_BODY_CAP: usize = 32 * 1024;

static SHARED_CLIENT: OnceLock<reqwest::Client> = OnceLock::new();

/// Process-wide HTTP client for all upstream traffic.
///
/// Deliberately carries no total timeout of its own: each call enforces its
/// budget with `tokio::time::timeout`, which lets a streaming body outlive
/// the budget once its headers have arrived. Redirects are refused; the
/// upstream never issues them.
pub fn http_client() -> &'static reqwest::Client {
    SHARED_CLIENT.get_or_init(|| {
        reqwest::Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .expect("default client configuration is valid")
    })
}

/// Drain an error response body into a string, spending at most
/// [`ERROR_BODY_CAP`] bytes. Transport errors mid-read just end the text;
/// the status code already tells the caller what went wrong.
async fn read_error_body(mut response: reqwest::Response) -> String {
    let mut text = String::new();
    let mut budget = ERROR_BODY_CAP;
    while let Ok(Some(bytes)) = response.chunk().await {
        let keep = bytes.len().min(budget);
        text.push_str(&String::from_utf8_lossy(&bytes[..keep]));
        budget -= keep;
        if budget == 0 {
            text.push_str(" [truncated]");
            break;
        }
    }
    text
}

// ============================================================================
// Error classification
// ============================================================================

/// Typed failure of a single upstream call.
#[derive(Debug, Error)]
pub enum UpstreamError {
    #[error("upstream request timed out")]
    Timeout,

    #[error("network error: {0}")]
    Network(String),

    #[error("upstream returned status {code}")]
    Status { code: u16, body: String },

    /// 401/403: the credential itself was refused. Kept distinct from
    /// [`UpstreamError::Status`] because the orchestrator still fails over
    /// to other credentials on it.
    #[error("credential rejected by upstream (status {code})")]
    CredentialRejected { code: u16, body: String },

    #[error("failed to parse upstream response: {0}")]
    Parse(String),
}

impl UpstreamError {
    fn from_transport(error: &reqwest::Error) -> Self {
        if error.is_timeout() {
            Self::Timeout
        } else {
            Self::Network(error.to_string())
        }
    }

    fn from_status(code: u16, body: String) -> Self {
        match code {
            401 | 403 => Self::CredentialRejected { code, body },
            _ => Self::Status { code, body },
        }
    }

    /// Whether the unary retry loop may try again: timeouts, transport
    /// failures, and any status outside the non-retryable set
    /// {400, 401, 403, 404}.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Timeout | Self::Network(_) => true,
            Self::Status { code, .. } => !matches!(code, 400 | 404),
            Self::CredentialRejected { .. } | Self::Parse(_) => false,
        }
    }
}

impl From<UpstreamError> for GatewayError {
    fn from(error: UpstreamError) -> Self {
        match error {
            UpstreamError::Timeout => Self::Timeout,
            UpstreamError::Network(message) => Self::Network(message),
            UpstreamError::Status { code: 429, .. } => Self::RateLimited,
            UpstreamError::Status { code, body } => Self::UpstreamStatus { code, body },
            UpstreamError::CredentialRejected { code, .. } => Self::CredentialRejected { code },
            UpstreamError::Parse(message) => Self::Parse(message),
        }
    }
}

// ============================================================================
// Upstream client
// ============================================================================

/// Connection parameters for the upstream service.
#[derive(Debug, Clone)]
pub struct UpstreamConfig {
    pub base_url: String,
    pub api_version: String,
    /// Overall budget for one call; expiry cancels the outgoing request.
    pub timeout: Duration,
    pub retry: RetryConfig,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            base_url: "https://generativelanguage.googleapis.com".to_string(),
            api_version: "v1beta".to_string(),
            timeout: Duration::from_secs(30),
            retry: RetryConfig::default(),
        }
    }
}

/// Client for the `generateContent` endpoint family. One instance is shared
/// across all requests; the credential is supplied per call.
#[derive(Debug, Clone)]
pub struct UpstreamClient {
    config: UpstreamConfig,
}

impl UpstreamClient {
    #[must_use]
    pub fn new(config: UpstreamConfig) -> Self {
        Self { config }
    }

    fn endpoint(&self, model: &str, method: &str) -> String {
        format!(
            "{}/{}/models/{model}:{method}",
            self.config.base_url, self.config.api_version
        )
    }

    /// Unary call, fully buffered. Retries per the configured policy with
    /// linear backoff.
    pub async fn generate(
        &self,
        model: &str,
        body: &Value,
        credential: &str,
    ) -> Result<wire::GenerateContentResponse, UpstreamError> {
        let url = self.endpoint(model, "generateContent");
        let mut attempt = 0;
        loop {
            match self.generate_once(&url, body, credential, self.config.timeout).await {
                Ok(response) => return Ok(response),
                Err(error) if error.is_retryable() && attempt < self.config.retry.max_retries => {
                    let delay = self.config.retry.delay_for(attempt);
                    tracing::debug!(
                        attempt = attempt + 1,
                        delay_ms = delay.as_millis() as u64,
                        error = %error,
                        "retrying upstream call"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(error) => return Err(error),
            }
        }
    }

    /// Streaming call. Returns the raw response once upstream headers have
    /// arrived; callers consume `bytes_stream()` for the SSE payload.
    ///
    /// Never retries internally: by the time bytes flow the caller may have
    /// committed a response, so failover happens at the orchestrator level
    /// before this returns.
    pub async fn stream_generate(
        &self,
        model: &str,
        body: &Value,
        credential: &str,
    ) -> Result<reqwest::Response, UpstreamError> {
        let url = format!("{}?alt=sse", self.endpoint(model, "streamGenerateContent"));
        let send = http_client()
            .post(&url)
            .header("x-goog-api-key", credential)
            .header("content-type", "application/json")
            .json(body)
            .send();

        let response = match tokio::time::timeout(self.config.timeout, send).await {
            Ok(Ok(response)) => response,
            Ok(Err(error)) => return Err(UpstreamError::from_transport(&error)),
            Err(_) => return Err(UpstreamError::Timeout),
        };

        let status = response.status();
        if !status.is_success() {
            let body = read_error_body(response).await;
            return Err(UpstreamError::from_status(status.as_u16(), body));
        }
        Ok(response)
    }

    /// Minimal health probe with its own budget: succeeds iff the upstream
    /// answers 200 for a one-word generation.
    pub async fn probe(
        &self,
        model: &str,
        credential: &str,
        budget: Duration,
    ) -> Result<(), UpstreamError> {
        let url = self.endpoint(model, "generateContent");
        let body = serde_json::json!({
            "contents": [{"role": "user", "parts": [{"text": "Hello"}]}]
        });
        self.generate_once(&url, &body, credential, budget)
            .await
            .map(|_| ())
    }

    async fn generate_once(
        &self,
        url: &str,
        body: &Value,
        credential: &str,
        budget: Duration,
    ) -> Result<wire::GenerateContentResponse, UpstreamError> {
        let attempt = async {
            let response = http_client()
                .post(url)
                .header("x-goog-api-key", credential)
                .header("content-type", "application/json")
                .json(body)
                .send()
                .await
                .map_err(|e| UpstreamError::from_transport(&e))?;

            let status = response.status();
            if !status.is_success() {
                let body = read_error_body(response).await;
                return Err(UpstreamError::from_status(status.as_u16(), body));
            }

            let bytes = response
                .bytes()
                .await
                .map_err(|e| UpstreamError::Network(e.to_string()))?;
            serde_json::from_slice(&bytes).map_err(|e| UpstreamError::Parse(e.to_string()))
        };

        match tokio::time::timeout(budget, attempt).await {
            Ok(result) => result,
            Err(_) => Err(UpstreamError::Timeout),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_credential_rejections() {
        assert!(matches!(
            UpstreamError::from_status(401, String::new()),
            UpstreamError::CredentialRejected { code: 401, .. }
        ));
        assert!(matches!(
            UpstreamError::from_status(403, String::new()),
            UpstreamError::CredentialRejected { code: 403, .. }
        ));
        assert!(matches!(
            UpstreamError::from_status(500, String::new()),
            UpstreamError::Status { code: 500, .. }
        ));
    }

    #[test]
    fn retryability_follows_the_non_retryable_set() {
        assert!(UpstreamError::Timeout.is_retryable());
        assert!(UpstreamError::Network("reset".into()).is_retryable());
        assert!(
            UpstreamError::Status {
                code: 500,
                body: String::new()
            }
            .is_retryable()
        );
        assert!(
            UpstreamError::Status {
                code: 429,
                body: String::new()
            }
            .is_retryable()
        );

        assert!(
            !UpstreamError::Status {
                code: 400,
                body: String::new()
            }
            .is_retryable()
        );
        assert!(
            !UpstreamError::Status {
                code: 404,
                body: String::new()
            }
            .is_retryable()
        );
        assert!(
            !UpstreamError::CredentialRejected {
                code: 401,
                body: String::new()
            }
            .is_retryable()
        );
    }

    #[test]
    fn gateway_error_conversion_special_cases() {
        let err: GatewayError = UpstreamError::Status {
            code: 429,
            body: String::new(),
        }
        .into();
        assert!(matches!(err, GatewayError::RateLimited));

        let err: GatewayError = UpstreamError::CredentialRejected {
            code: 403,
            body: String::new(),
        }
        .into();
        assert!(matches!(err, GatewayError::CredentialRejected { code: 403 }));
    }

    #[test]
    fn endpoint_composition() {
        let client = UpstreamClient::new(UpstreamConfig {
            base_url: "https://upstream.test".into(),
            api_version: "v1beta".into(),
            ..UpstreamConfig::default()
        });
        assert_eq!(
            client.endpoint("gemini-2.0-flash", "generateContent"),
            "https://upstream.test/v1beta/models/gemini-2.0-flash:generateContent"
        );
    }
}
