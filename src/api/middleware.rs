use axum::{
    extract::{MatchedPath, Request, State},
    http::HeaderMap,
    middleware::Next,
    response::Response,
};
use sha2::{Digest, Sha256};
use std::time::Instant;

use crate::api::routes::AppState;
use crate::errors::{AppError, Result};
use crate::observability::MetricsRecorder;

pub const INTERNAL_KEY_HEADER: &str = "x-internal-api-key";

/// Pre-shared key for the `/internal` routes, kept only as its digest.
pub struct InternalKey {
    digest: [u8; 32],
}

impl InternalKey {
    pub fn new(shared_key: &str) -> Self {
        Self {
            digest: Sha256::digest(shared_key.as_bytes()).into(),
        }
    }

    /// Constant-time comparison of SHA-256 digests.
    pub fn matches(&self, presented: &str) -> bool {
        let presented: [u8; 32] = Sha256::digest(presented.as_bytes()).into();
        presented
            .iter()
            .zip(self.digest.iter())
            .fold(0u8, |acc, (a, b)| acc | (a ^ b))
            == 0
    }
}

/// Reject `/internal` calls without the shared key
pub async fn require_internal_key(
    State(state): State<AppState>,
    headers: HeaderMap,
    request: Request,
    next: Next,
) -> Result<Response> {
    let presented = headers
        .get(INTERNAL_KEY_HEADER)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();

    if presented.is_empty() || !state.internal_key.matches(presented) {
        tracing::warn!(path = %request.uri().path(), "Internal API call with missing or wrong key");
        return Err(AppError::Unauthorized);
    }

    Ok(next.run(request).await)
}

/// Count and time every request by its route template
pub async fn track_metrics(request: Request, next: Next) -> Response {
    let start = Instant::now();
    let method = request.method().to_string();
    let path = request
        .extensions()
        .get::<MatchedPath>()
        .map(|p| p.as_str().to_string())
        .unwrap_or_else(|| "unmatched".to_string());

    let response = next.run(request).await;

    MetricsRecorder::record_http_request(&method, &path, response.status().as_u16());
    MetricsRecorder::record_http_duration(&method, &path, start.elapsed().as_secs_f64());
    response
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_internal_key_matching() {
        let key = InternalKey::new("s3cret");
        assert!(key.matches("s3cret"));
        assert!(!key.matches("s3cre"));
        assert!(!key.matches(""));
    }
}
