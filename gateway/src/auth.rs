//! Credential extraction from inbound headers.

use axum::http::HeaderMap;
use axum::http::header::AUTHORIZATION;
use relay_types::GatewayError;

/// Pull the credential list out of `Authorization: Bearer k1,k2` or
/// `x-goog-api-key: k1,k2`. `Authorization` wins when both are present.
/// Entries are trimmed, empties dropped, and duplicates removed preserving
/// first occurrence.
pub fn extract_credentials(headers: &HeaderMap) -> Result<Vec<String>, GatewayError> {
    let raw = headers
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .or_else(|| {
            headers
                .get("x-goog-api-key")
                .and_then(|value| value.to_str().ok())
        });

    let mut credentials: Vec<String> = Vec::new();
    if let Some(raw) = raw {
        for entry in raw.split(',') {
            let entry = entry.trim();
            if !entry.is_empty() && !credentials.iter().any(|c| c == entry) {
                credentials.push(entry.to_string());
            }
        }
    }

    if credentials.is_empty() {
        return Err(GatewayError::AuthMissing);
    }
    Ok(credentials)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn headers(pairs: &[(&'static str, &str)]) -> HeaderMap {
        let mut map = HeaderMap::new();
        for (name, value) in pairs {
            map.insert(*name, HeaderValue::from_str(value).unwrap());
        }
        map
    }

    #[test]
    fn parses_bearer_lists() {
        let creds =
            extract_credentials(&headers(&[("authorization", "Bearer k1, k2 ,k3")])).unwrap();
        assert_eq!(creds, vec!["k1", "k2", "k3"]);
    }

    #[test]
    fn parses_goog_api_key_header() {
        let creds = extract_credentials(&headers(&[("x-goog-api-key", "k1,k2")])).unwrap();
        assert_eq!(creds, vec!["k1", "k2"]);
    }

    #[test]
    fn authorization_takes_precedence() {
        let creds = extract_credentials(&headers(&[
            ("authorization", "Bearer a1"),
            ("x-goog-api-key", "b1"),
        ]))
        .unwrap();
        assert_eq!(creds, vec!["a1"]);
    }

    #[test]
    fn deduplicates_preserving_first_occurrence() {
        let creds =
            extract_credentials(&headers(&[("authorization", "Bearer k1,k2,k1, ,k2")])).unwrap();
        assert_eq!(creds, vec!["k1", "k2"]);
    }

    #[test]
    fn non_bearer_authorization_falls_through() {
        let creds = extract_credentials(&headers(&[
            ("authorization", "Basic dXNlcg=="),
            ("x-goog-api-key", "k1"),
        ]))
        .unwrap();
        assert_eq!(creds, vec!["k1"]);
    }

    #[test]
    fn missing_or_empty_headers_fail() {
        assert!(matches!(
            extract_credentials(&HeaderMap::new()),
            Err(GatewayError::AuthMissing)
        ));
        assert!(matches!(
            extract_credentials(&headers(&[("authorization", "Bearer , ,")])),
            Err(GatewayError::AuthMissing)
        ));
    }
}
