use axum::{extract::Request, middleware::Next, response::Response};
use tracing::Span;

pub async fn log_requests_middleware(request: Request, next: Next) -> Response {
    let method = request.method().clone();
    let uri = request.uri().clone();

    let has_authorization = request.headers().contains_key("authorization");
    let content_type = request
        .headers()
        .get("content-type")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("none");

    tracing::info!(
        method = %method,
        path = uri.path(),
        has_authorization = has_authorization,
        content_type = content_type,
        "Incoming HTTP request"
    );

    next.run(request).await
}

/// Span maker for the HTTP trace layer. Records method and path only; the
/// query string can carry access tokens on WebSocket upgrades and must not
/// end up in logs.
pub fn trace_span_for(request: &Request) -> Span {
    tracing::info_span!(
        "request",
        method = %request.method(),
        path = request.uri().path(),
    )
}
