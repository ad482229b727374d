//! Uniform JSON error responses.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use relay_types::GatewayError;
use serde_json::json;

/// Handler-level error wrapper so [`GatewayError`] can flow out of axum
/// handlers with `?` and render as the uniform error document:
/// `{"error":{"message","type","code","details"?}}`.
#[derive(Debug)]
pub struct ApiError(pub GatewayError);

impl From<GatewayError> for ApiError {
    fn from(error: GatewayError) -> Self {
        Self(error)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let error = self.0;
        let status =
            StatusCode::from_u16(error.http_status()).unwrap_or(StatusCode::BAD_GATEWAY);
        if status.is_server_error() {
            tracing::error!(code = error.error_code(), "{error}");
        } else {
            tracing::debug!(code = error.error_code(), "{error}");
        }

        let mut doc = json!({
            "error": {
                "message": error.to_string(),
                "type": error.error_type(),
                "code": error.error_code(),
            }
        });
        if let Some(details) = error.details() {
            doc["error"]["details"] = details;
        }
        (status, Json(doc)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_the_uniform_document() {
        let response = ApiError(GatewayError::AuthMissing).into_response();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[test]
    fn mirrors_upstream_status_codes() {
        let response = ApiError(GatewayError::UpstreamStatus {
            code: 503,
            body: String::new(),
        })
        .into_response();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    }
}
