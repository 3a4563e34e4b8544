//! Request correlation ids.
//!
//! Every request carries an `x-request-id`. An id supplied by an upstream
//! proxy is kept when it looks sane; otherwise a UUID v4 is minted. The id is
//! stored in request extensions, recorded on the tracing span, tagged on the
//! Sentry scope and echoed back on the response.

use axum::{extract::Request, http::HeaderValue, middleware::Next, response::Response};
use tracing::Span;
use uuid::Uuid;

/// The HTTP header name for request IDs.
pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// Upstream ids longer than this are replaced.
const MAX_REQUEST_ID_LEN: usize = 128;

/// The id assigned to the current request, available as an extension.
#[derive(Debug, Clone)]
pub struct RequestId(pub String);

fn accept_upstream_id(raw: &str) -> Option<String> {
    let raw = raw.trim();
    let ok = !raw.is_empty()
        && raw.len() <= MAX_REQUEST_ID_LEN
        && raw
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || matches!(b, b'-' | b'_' | b'.'));
    ok.then(|| raw.to_owned())
}

/// Middleware that ensures every request has a request id.
pub async fn request_id_middleware(mut request: Request, next: Next) -> Response {
    let request_id = request
        .headers()
        .get(REQUEST_ID_HEADER)
        .and_then(|h| h.to_str().ok())
        .and_then(accept_upstream_id)
        .unwrap_or_else(|| Uuid::new_v4().to_string());

    Span::current().record("request_id", &request_id);
    sentry::configure_scope(|scope| {
        scope.set_tag("request_id", &request_id);
    });

    request
        .extensions_mut()
        .insert(RequestId(request_id.clone()));

    let mut response = next.run(request).await;

    if let Ok(value) = HeaderValue::from_str(&request_id) {
        response.headers_mut().insert(REQUEST_ID_HEADER, value);
    }

    response
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_accepts_reasonable_upstream_id() {
        assert_eq!(
            accept_upstream_id("abc-123_x.y").as_deref(),
            Some("abc-123_x.y")
        );
    }

    #[test]
    fn test_rejects_garbage_upstream_id() {
        assert!(accept_upstream_id("").is_none());
        assert!(accept_upstream_id("has space").is_none());
        assert!(accept_upstream_id("<script>").is_none());
        assert!(accept_upstream_id(&"a".repeat(200)).is_none());
    }
}
