//! Live reload script injection.
//!
//! Rewrites `text/html` responses so the page loads the client listener.

use std::sync::Arc;

use axum::body::{Body, HttpBody};
use axum::extract::{Request, State};
use axum::http::{HeaderMap, StatusCode, header};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};

use crate::live_reload::ReloadContext;

/// Largest HTML body that gets buffered for injection.
const MAX_INJECT_BYTES: usize = 16 * 1024 * 1024;

/// Middleware inserting the live reload snippet into HTML responses.
///
/// Only complete `200 OK` bodies are rewritten. Partial content, bodies of
/// unknown or excessive size and everything that is not HTML pass through.
pub(crate) async fn inject_script(
    State(context): State<Arc<ReloadContext>>,
    request: Request,
    next: Next,
) -> Response {
    let response = next.run(request).await;
    let snippet = context.script();

    if snippet.is_empty()
        || response.status() != StatusCode::OK
        || !is_injectable(response.headers())
        || !fits_in_buffer(response.headers(), response.body())
    {
        return response;
    }

    let (mut parts, body) = response.into_parts();
    let bytes = match axum::body::to_bytes(body, MAX_INJECT_BYTES).await {
        Ok(bytes) => bytes,
        Err(e) => {
            tracing::warn!(error = %e, "Failed to buffer HTML response for live reload injection");
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    };

    let body = match std::str::from_utf8(&bytes) {
        Ok(html) => Body::from(inject_into_html(html, snippet)),
        Err(_) => Body::from(bytes),
    };
    parts.headers.remove(header::CONTENT_LENGTH);

    Response::from_parts(parts, body)
}

/// Uncompressed HTML.
fn is_injectable(headers: &HeaderMap) -> bool {
    let is_html = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.starts_with("text/html"));

    let is_encoded = headers.contains_key(header::CONTENT_ENCODING);

    is_html && !is_encoded
}

/// Body with a known size that can be buffered in full.
///
/// File bodies report no size hint, so `Content-Length` is checked first.
fn fits_in_buffer(headers: &HeaderMap, body: &Body) -> bool {
    let declared = headers
        .get(header::CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<u64>().ok());

    declared
        .or_else(|| body.size_hint().upper())
        .is_some_and(|len| usize::try_from(len).is_ok_and(|len| len <= MAX_INJECT_BYTES))
}

/// Insert `snippet` before the last `</body>`, or append it when there is none.
pub(crate) fn inject_into_html(html: &str, snippet: &str) -> String {
    let mut out = String::with_capacity(html.len() + snippet.len());

    // ASCII lowercasing keeps byte offsets intact
    match html.to_ascii_lowercase().rfind("</body>") {
        Some(idx) => {
            out.push_str(&html[..idx]);
            out.push_str(snippet);
            out.push_str(&html[idx..]);
        }
        None => {
            out.push_str(html);
            out.push_str(snippet);
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::Router;
    use axum::http::{HeaderValue, StatusCode};
    use axum::routing::get;
    use tower::ServiceExt;

    use crate::mode::Mode;

    const SNIPPET: &str = "<script src=\"/lr.js\"></script>";

    #[test]
    fn test_inject_before_closing_body() {
        let html = "<html><body><p>hi</p></body></html>";
        assert_eq!(
            inject_into_html(html, SNIPPET),
            "<html><body><p>hi</p><script src=\"/lr.js\"></script></body></html>"
        );
    }

    #[test]
    fn test_inject_case_insensitive_last_body() {
        let html = "<BODY><pre></body></pre></BODY>";
        let out = inject_into_html(html, "X");
        assert_eq!(out, "<BODY><pre></body></pre>X</BODY>");
    }

    #[test]
    fn test_inject_appends_without_body() {
        assert_eq!(inject_into_html("<p>fragment</p>", "X"), "<p>fragment</p>X");
    }

    #[test]
    fn test_inject_preserves_multibyte_text() {
        let html = "<body>héllo wörld</body>";
        assert_eq!(inject_into_html(html, "X"), "<body>héllo wörldX</body>");
    }

    #[test]
    fn test_is_injectable() {
        let mut headers = HeaderMap::new();
        assert!(!is_injectable(&headers));

        headers.insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static("text/html; charset=utf-8"),
        );
        assert!(is_injectable(&headers));

        headers.insert(header::CONTENT_ENCODING, HeaderValue::from_static("gzip"));
        assert!(!is_injectable(&headers));
    }

    #[test]
    fn test_css_is_not_injectable() {
        let mut headers = HeaderMap::new();
        headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("text/css"));
        assert!(!is_injectable(&headers));
    }

    fn app(mode: Mode) -> Router {
        let context = Arc::new(ReloadContext::new(mode, "/__livereload"));
        Router::new()
            .route(
                "/",
                get(|| async { axum::response::Html("<html><body>page</body></html>") }),
            )
            .route("/data.json", get(|| async { "{\"body\":\"</body>\"}" }))
            .route(
                "/partial",
                get(|| async {
                    (
                        StatusCode::PARTIAL_CONTENT,
                        [(header::CONTENT_RANGE, "bytes 0-9/36")],
                        axum::response::Html("<html><bod"),
                    )
                }),
            )
            .route(
                "/streamed",
                get(|| async {
                    let chunks = tokio_stream::iter([
                        Ok::<_, std::io::Error>("<html><body>"),
                        Ok("streamed</body></html>"),
                    ]);
                    (
                        [(header::CONTENT_TYPE, "text/html; charset=utf-8")],
                        Body::from_stream(chunks),
                    )
                }),
            )
            .layer(axum::middleware::from_fn_with_state(context, inject_script))
    }

    #[test]
    fn test_fits_in_buffer() {
        let no_headers = HeaderMap::new();
        assert!(fits_in_buffer(&no_headers, &Body::from("<p>small</p>")));
        assert!(fits_in_buffer(&no_headers, &Body::empty()));

        let stream = || {
            Body::from_stream(tokio_stream::iter([Ok::<_, std::io::Error>(
                "<p>chunk</p>",
            )]))
        };
        assert!(!fits_in_buffer(&no_headers, &stream()));

        let mut sized = HeaderMap::new();
        sized.insert(header::CONTENT_LENGTH, HeaderValue::from_static("12"));
        assert!(fits_in_buffer(&sized, &stream()));

        let mut huge = HeaderMap::new();
        huge.insert(
            header::CONTENT_LENGTH,
            HeaderValue::from(MAX_INJECT_BYTES + 1),
        );
        assert!(!fits_in_buffer(&huge, &Body::from("<p>small</p>")));
    }

    async fn body_text(response: Response) -> String {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    #[tokio::test]
    async fn test_middleware_injects_into_html() {
        let response = app(Mode::Development)
            .oneshot(Request::builder().uri("/").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            body_text(response).await,
            "<html><body>page<script src=\"/__livereload/client.js\"></script>\n</body></html>"
        );
    }

    #[tokio::test]
    async fn test_middleware_leaves_other_content_alone() {
        let response = app(Mode::Development)
            .oneshot(
                Request::builder()
                    .uri("/data.json")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(body_text(response).await, "{\"body\":\"</body>\"}");
    }

    #[tokio::test]
    async fn test_middleware_noop_in_production() {
        let response = app(Mode::Production)
            .oneshot(Request::builder().uri("/").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(body_text(response).await, "<html><body>page</body></html>");
    }

    #[tokio::test]
    async fn test_middleware_leaves_partial_content_alone() {
        let response = app(Mode::Development)
            .oneshot(Request::builder().uri("/partial").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::PARTIAL_CONTENT);
        assert_eq!(response.headers()[header::CONTENT_RANGE], "bytes 0-9/36");
        assert_eq!(body_text(response).await, "<html><bod");
    }

    #[tokio::test]
    async fn test_middleware_passes_unsized_body_through() {
        let response = app(Mode::Development)
            .oneshot(Request::builder().uri("/streamed").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            body_text(response).await,
            "<html><body>streamed</body></html>"
        );
    }
}
