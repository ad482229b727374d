//! Gateway error taxonomy with HTTP mapping.

use serde_json::Value;
use thiserror::Error;

/// Every failure the gateway can surface to a caller or recover from.
///
/// Handlers catch these at the top and emit a uniform JSON error document.
/// Only the request orchestrator performs local recovery, by failing over to
/// another credential when [`GatewayError::is_failover_eligible`] holds.
#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("{0}")]
    Validation(String),

    #[error(
        "missing credentials: supply `Authorization: Bearer <key>[,<key>...]` or `x-goog-api-key`"
    )]
    AuthMissing,

    #[error("no route for {0}")]
    NotFound(String),

    #[error("method not allowed")]
    MethodNotAllowed,

    #[error("upstream rate limit exceeded")]
    RateLimited,

    #[error("no credential available: every credential is cooling down")]
    NoCredentialAvailable,

    #[error("all credentials failed for this request")]
    ServiceUnavailable,

    #[error("upstream returned status {code}")]
    UpstreamStatus { code: u16, body: String },

    #[error("upstream request timed out")]
    Timeout,

    #[error("network error: {0}")]
    Network(String),

    #[error("failed to parse upstream response: {0}")]
    Parse(String),

    #[error("credential rejected by upstream (status {code})")]
    CredentialRejected { code: u16 },

    #[error("format conversion failed: {0}")]
    FormatConversion(String),
}

impl GatewayError {
    /// The HTTP status this error maps to when surfaced.
    ///
    /// `UpstreamStatus` mirrors the upstream code when it is a valid HTTP
    /// error status, falling back to 502 otherwise. `CredentialRejected`
    /// mirrors the rejecting status (401/403).
    #[must_use]
    pub fn http_status(&self) -> u16 {
        match self {
            Self::Validation(_) => 400,
            Self::AuthMissing => 401,
            Self::NotFound(_) => 404,
            Self::MethodNotAllowed => 405,
            Self::RateLimited => 429,
            Self::NoCredentialAvailable | Self::ServiceUnavailable => 503,
            Self::UpstreamStatus { code, .. } => {
                if (400..=599).contains(code) {
                    *code
                } else {
                    502
                }
            }
            Self::Timeout => 504,
            Self::Network(_) | Self::Parse(_) | Self::FormatConversion(_) => 500,
            Self::CredentialRejected { code } => *code,
        }
    }

    /// OpenAI-style `type` discriminator for the error document.
    #[must_use]
    pub fn error_type(&self) -> &'static str {
        match self {
            Self::Validation(_) | Self::FormatConversion(_) => "invalid_request_error",
            Self::AuthMissing | Self::CredentialRejected { .. } => "authentication_error",
            Self::NotFound(_) | Self::MethodNotAllowed => "not_found_error",
            Self::RateLimited => "rate_limit_error",
            Self::NoCredentialAvailable
            | Self::ServiceUnavailable
            | Self::UpstreamStatus { .. }
            | Self::Timeout
            | Self::Network(_)
            | Self::Parse(_) => "api_error",
        }
    }

    /// Stable machine-readable code for the error document.
    #[must_use]
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::Validation(_) => "validation_error",
            Self::AuthMissing => "auth_missing",
            Self::NotFound(_) => "not_found",
            Self::MethodNotAllowed => "method_not_allowed",
            Self::RateLimited => "rate_limited",
            Self::NoCredentialAvailable => "no_credential_available",
            Self::ServiceUnavailable => "service_unavailable",
            Self::UpstreamStatus { .. } => "upstream_error",
            Self::Timeout => "upstream_timeout",
            Self::Network(_) => "network_error",
            Self::Parse(_) => "upstream_parse_error",
            Self::CredentialRejected { .. } => "credential_rejected",
            Self::FormatConversion(_) => "format_conversion_failed",
        }
    }

    /// Whether the orchestrator may retry this failure with another
    /// credential within the same inbound request.
    #[must_use]
    pub fn is_failover_eligible(&self) -> bool {
        match self {
            Self::CredentialRejected { .. }
            | Self::Timeout
            | Self::Network(_)
            | Self::Parse(_)
            | Self::RateLimited => true,
            Self::UpstreamStatus { code, .. } => *code >= 500,
            _ => false,
        }
    }

    /// Optional structured details for the error document.
    ///
    /// Upstream error bodies are passed through when they are valid JSON.
    #[must_use]
    pub fn details(&self) -> Option<Value> {
        match self {
            Self::UpstreamStatus { body, .. } => serde_json::from_str(body).ok(),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_mapping_matches_taxonomy() {
        assert_eq!(GatewayError::Validation("x".into()).http_status(), 400);
        assert_eq!(GatewayError::AuthMissing.http_status(), 401);
        assert_eq!(GatewayError::NotFound("/x".into()).http_status(), 404);
        assert_eq!(GatewayError::MethodNotAllowed.http_status(), 405);
        assert_eq!(GatewayError::RateLimited.http_status(), 429);
        assert_eq!(GatewayError::NoCredentialAvailable.http_status(), 503);
        assert_eq!(GatewayError::ServiceUnavailable.http_status(), 503);
        assert_eq!(GatewayError::Timeout.http_status(), 504);
        assert_eq!(GatewayError::Network("x".into()).http_status(), 500);
        assert_eq!(GatewayError::Parse("x".into()).http_status(), 500);
        assert_eq!(GatewayError::FormatConversion("x".into()).http_status(), 500);
    }

    #[test]
    fn upstream_status_mirrors_valid_codes() {
        let err = GatewayError::UpstreamStatus {
            code: 503,
            body: String::new(),
        };
        assert_eq!(err.http_status(), 503);

        let err = GatewayError::UpstreamStatus {
            code: 200,
            body: String::new(),
        };
        assert_eq!(err.http_status(), 502);
    }

    #[test]
    fn credential_rejection_mirrors_upstream_code() {
        assert_eq!(
            GatewayError::CredentialRejected { code: 403 }.http_status(),
            403
        );
    }

    #[test]
    fn failover_eligibility() {
        assert!(GatewayError::CredentialRejected { code: 401 }.is_failover_eligible());
        assert!(GatewayError::Timeout.is_failover_eligible());
        assert!(GatewayError::Network("reset".into()).is_failover_eligible());
        assert!(GatewayError::RateLimited.is_failover_eligible());
        assert!(
            GatewayError::UpstreamStatus {
                code: 500,
                body: String::new()
            }
            .is_failover_eligible()
        );

        assert!(
            !GatewayError::UpstreamStatus {
                code: 400,
                body: String::new()
            }
            .is_failover_eligible()
        );
        assert!(!GatewayError::Validation("x".into()).is_failover_eligible());
        assert!(!GatewayError::AuthMissing.is_failover_eligible());
    }

    #[test]
    fn details_passes_through_json_bodies() {
        let err = GatewayError::UpstreamStatus {
            code: 429,
            body: r#"{"error":{"message":"quota"}}"#.into(),
        };
        let details = err.details().unwrap();
        assert_eq!(details["error"]["message"], "quota");

        let err = GatewayError::UpstreamStatus {
            code: 502,
            body: "<html>bad gateway</html>".into(),
        };
        assert!(err.details().is_none());
    }
}
