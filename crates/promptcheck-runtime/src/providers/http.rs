//! HTTP status and client error mapping shared by the network adapters.
//!
//! | Observation | DispatchError |
//! |-------------|---------------|
//! | 401, 403 | `Unauthorized` |
//! | 429 | `RateLimited`, hint from `retry-after` (seconds) |
//! | 408, 5xx | `Transport` |
//! | other non-success | `MalformedResponse` |
//! | client timeout | `Timeout` |
//! | connect / IO failure | `Transport` |
//! | undecodable success body | `MalformedResponse` |

use promptcheck_core::DispatchError;
use std::time::Duration;

const BODY_SNIPPET_CHARS: usize = 200;

/// Longest `retry-after` hint honored; larger values are clamped.
pub const MAX_RETRY_AFTER: Duration = Duration::from_secs(3600);

/// Map a non-success HTTP status to a dispatch error.
pub fn classify_status(status: u16, retry_after: Option<&str>, body: &str) -> DispatchError {
    match status {
        401 | 403 => DispatchError::Unauthorized,
        429 => DispatchError::rate_limited(parse_retry_after(retry_after)),
        408 | 500..=599 => {
            DispatchError::transport(format!("HTTP {}: {}", status, snippet(body)))
        }
        _ => DispatchError::malformed(format!("HTTP {}: {}", status, snippet(body))),
    }
}

/// `retry-after` as delta seconds, capped at [`MAX_RETRY_AFTER`]. HTTP
/// dates are ignored.
pub fn parse_retry_after(value: Option<&str>) -> Option<Duration> {
    value
        .and_then(|v| v.trim().parse::<u64>().ok())
        .map(|secs| Duration::from_secs(secs).min(MAX_RETRY_AFTER))
}

fn snippet(body: &str) -> String {
    let trimmed = body.trim();
    if trimmed.chars().count() <= BODY_SNIPPET_CHARS {
        trimmed.to_string()
    } else {
        let head: String = trimmed.chars().take(BODY_SNIPPET_CHARS).collect();
        format!("{}...", head)
    }
}

/// Build a client for one gateway.
#[cfg(any(feature = "anthropic", feature = "openai", feature = "local"))]
pub(crate) fn build_client() -> Result<reqwest::Client, super::ProviderError> {
    reqwest::Client::builder()
        .build()
        .map_err(|e| super::ProviderError::InvalidConfig(format!("HTTP client: {}", e)))
}

#[cfg(any(feature = "anthropic", feature = "openai", feature = "local"))]
pub(crate) fn map_send_error(error: reqwest::Error) -> DispatchError {
    if error.is_timeout() {
        DispatchError::Timeout
    } else if error.is_decode() {
        DispatchError::malformed(error.to_string())
    } else {
        DispatchError::transport(error.to_string())
    }
}

/// Check the status and decode a success body.
#[cfg(any(feature = "anthropic", feature = "openai", feature = "local"))]
pub(crate) async fn decode_response<T>(response: reqwest::Response) -> Result<T, DispatchError>
where
    T: serde::de::DeserializeOwned,
{
    let status = response.status();

    if !status.is_success() {
        let retry_after = response
            .headers()
            .get("retry-after")
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let body = response.text().await.unwrap_or_default();
        return Err(classify_status(status.as_u16(), retry_after.as_deref(), &body));
    }

    let bytes = response.bytes().await.map_err(map_send_error)?;
    serde_json::from_slice(&bytes)
        .map_err(|e| DispatchError::malformed(format!("Failed to parse response: {}", e)))
}

/// Setup URL check shared by the factories.
pub fn validate_base_url(url: &str) -> Result<(), super::ProviderError> {
    if url.starts_with("http://") || url.starts_with("https://") {
        Ok(())
    } else {
        Err(super::ProviderError::InvalidConfig(
            "base_url must start with http:// or https://".to_string(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_auth_statuses() {
        assert_eq!(classify_status(401, None, ""), DispatchError::Unauthorized);
        assert_eq!(classify_status(403, None, "forbidden"), DispatchError::Unauthorized);
    }

    #[test]
    fn test_rate_limit_with_hint() {
        assert_eq!(
            classify_status(429, Some("7"), ""),
            DispatchError::rate_limited(Some(Duration::from_secs(7)))
        );
        assert_eq!(
            classify_status(429, Some("Wed, 21 Oct 2015 07:28:00 GMT"), ""),
            DispatchError::rate_limited(None)
        );
    }

    #[test]
    fn test_huge_retry_after_clamped() {
        assert_eq!(parse_retry_after(Some("18446744073709551615")), Some(MAX_RETRY_AFTER));
        assert_eq!(parse_retry_after(Some("86400")), Some(MAX_RETRY_AFTER));
        assert_eq!(parse_retry_after(Some(" 30 ")), Some(Duration::from_secs(30)));
    }

    #[test]
    fn test_retryable_statuses_are_transport() {
        for status in [408, 500, 502, 503, 529] {
            let err = classify_status(status, None, "overloaded");
            assert!(matches!(err, DispatchError::Transport { .. }), "{}", status);
            assert!(err.is_retryable());
        }
    }

    #[test]
    fn test_other_statuses_are_malformed() {
        let err = classify_status(400, None, r#"{"error":"bad request"}"#);
        assert!(matches!(err, DispatchError::MalformedResponse { ref detail } if detail.contains("400")));
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_long_bodies_truncated() {
        let body = "x".repeat(1000);
        match classify_status(500, None, &body) {
            DispatchError::Transport { detail } => assert!(detail.len() < 300),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_validate_base_url() {
        assert!(validate_base_url("https://api.example.com").is_ok());
        assert!(validate_base_url("ftp://nope").is_err());
    }
}
