use crate::api::routes::AppState;
use crate::errors::AppError;
use crate::rate_limit::sliding_window::Decision;
use axum::{
    extract::{Request, State},
    http::{HeaderMap, HeaderName, HeaderValue},
    middleware::Next,
    response::Response,
};

/// Identifier used when the request carries no address headers
pub const UNKNOWN_IDENTIFIER: &str = "unknown-ip";

// Longest identifier kept as a store key
const MAX_IDENTIFIER_LEN: usize = 64;

/// Rate limiting middleware
pub async fn rate_limit_middleware(
    State(state): State<AppState>,
    headers: HeaderMap,
    request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let identifier = extract_identifier(&headers);

    let decision = state.limiter.check(&identifier).await?;

    if let Decision::Denied { retry_after } = decision {
        return Err(AppError::QuotaExceeded { retry_after });
    }

    let mut response = next.run(request).await;
    add_rate_limit_headers(
        response.headers_mut(),
        state.limiter.policy().max_requests,
        &decision,
    );

    Ok(response)
}

/// Extract the client address from request headers as a store-safe key
pub fn extract_identifier(headers: &HeaderMap) -> String {
    if let Some(forwarded_for) = headers.get("x-forwarded-for") {
        if let Ok(ip) = forwarded_for.to_str() {
            if let Some(first) = ip.split(',').next().map(str::trim).filter(|s| !s.is_empty()) {
                return sanitize_identifier(first);
            }
        }
    }

    if let Some(real_ip) = headers.get("x-real-ip") {
        if let Ok(ip) = real_ip.to_str() {
            let ip = ip.trim();
            if !ip.is_empty() {
                return sanitize_identifier(ip);
            }
        }
    }

    UNKNOWN_IDENTIFIER.to_string()
}

/// Replace separators that are unsafe in document ids and store keys
pub fn sanitize_identifier(raw: &str) -> String {
    let sanitized: String = raw
        .chars()
        .take(MAX_IDENTIFIER_LEN)
        .map(|c| match c {
            'a'..='z' | 'A'..='Z' | '0'..='9' | '-' => c,
            _ => '_',
        })
        .collect();

    if sanitized.is_empty() {
        UNKNOWN_IDENTIFIER.to_string()
    } else {
        sanitized
    }
}

/// Add rate limit headers to response
fn add_rate_limit_headers(headers: &mut HeaderMap, limit: u64, decision: &Decision) {
    if let Ok(value) = HeaderValue::from_str(&limit.to_string()) {
        headers.insert(HeaderName::from_static("x-ratelimit-limit"), value);
    }

    if let Ok(value) = HeaderValue::from_str(&decision.remaining().to_string()) {
        headers.insert(HeaderName::from_static("x-ratelimit-remaining"), value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_identifier_from_forwarded_for() {
        let mut headers = HeaderMap::new();
        headers.insert("x-forwarded-for", HeaderValue::from_static("192.168.1.1, 10.0.0.1"));

        let identifier = extract_identifier(&headers);
        assert_eq!(identifier, "192_168_1_1");
    }

    #[test]
    fn test_extract_identifier_from_real_ip() {
        let mut headers = HeaderMap::new();
        headers.insert("x-real-ip", HeaderValue::from_static("203.0.113.42"));

        let identifier = extract_identifier(&headers);
        assert_eq!(identifier, "203_0_113_42");
    }

    #[test]
    fn test_extract_identifier_default() {
        let headers = HeaderMap::new();
        let identifier = extract_identifier(&headers);
        assert_eq!(identifier, "unknown-ip");
    }

    #[test]
    fn test_blank_forwarded_for_falls_through() {
        let mut headers = HeaderMap::new();
        headers.insert("x-forwarded-for", HeaderValue::from_static(" "));
        headers.insert("x-real-ip", HeaderValue::from_static("10.1.2.3"));

        assert_eq!(extract_identifier(&headers), "10_1_2_3");
    }

    #[test]
    fn test_sanitize_ipv6_and_long_values() {
        assert_eq!(sanitize_identifier("2001:db8::1"), "2001_db8__1");

        let long = "a".repeat(200);
        assert_eq!(sanitize_identifier(&long).len(), MAX_IDENTIFIER_LEN);
    }
}
