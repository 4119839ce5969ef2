//! The scrape endpoint.

use std::io;
use std::sync::Arc;

use axum::extract::State;
use axum::http::{header, HeaderMap, Method, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::any;
use axum::Router;
use flate2::write::GzEncoder;
use flate2::Compression;
use tracing::warn;

use crate::exporter::Exporter;

const CONTENT_TYPE_EXPOSITION: &str = "text/plain; version=0.0.4";

/// Builds a router serving the exposition under `/metrics`.
///
/// The handler itself is path-agnostic; mount `serve_metrics`
/// wherever the application muxer wants it.
pub fn router(exporter: Arc<Exporter>) -> Router {
    Router::new()
        .route("/metrics", any(serve_metrics))
        .with_state(exporter)
}

/// Serves the current exposition document.
///
/// GET and HEAD return 200; every other method is 405 with no body.
/// The response is gzip-compressed when any comma-separated
/// `Accept-Encoding` token starts with `gzip` after trimming
/// surrounding whitespace.
pub async fn serve_metrics(
    State(exporter): State<Arc<Exporter>>,
    method: Method,
    headers: HeaderMap,
) -> Response {
    if method != Method::GET && method != Method::HEAD {
        return StatusCode::METHOD_NOT_ALLOWED.into_response();
    }

    let gzip = headers
        .get(header::ACCEPT_ENCODING)
        .and_then(|value| value.to_str().ok())
        .is_some_and(accepts_gzip);

    match render_body(&exporter, gzip) {
        Ok(body) if gzip => (
            [
                (header::CONTENT_TYPE, CONTENT_TYPE_EXPOSITION),
                (header::CONTENT_ENCODING, "gzip"),
            ],
            body,
        )
            .into_response(),
        Ok(body) => ([(header::CONTENT_TYPE, CONTENT_TYPE_EXPOSITION)], body).into_response(),
        Err(error) => {
            warn!(%error, "failed to render exposition");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

fn render_body(exporter: &Exporter, gzip: bool) -> io::Result<Vec<u8>> {
    if gzip {
        let mut encoder = GzEncoder::new(Vec::with_capacity(1024), Compression::default());
        exporter.render_into(&mut encoder)?;
        encoder.finish()
    } else {
        let mut buf = Vec::with_capacity(4096);
        exporter.render_into(&mut buf)?;
        Ok(buf)
    }
}

fn accepts_gzip(accept: &str) -> bool {
    accept
        .split(',')
        .any(|coding| coding.trim().starts_with("gzip"))
}
