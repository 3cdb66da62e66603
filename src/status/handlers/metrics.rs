use axum::{
    extract::Extension,
    http::{HeaderMap, HeaderValue, StatusCode},
    response::IntoResponse,
};
use prometheus::{Encoder, Registry, TextEncoder};
use tracing::error;

pub async fn metrics(Extension(registry): Extension<Registry>) -> impl IntoResponse {
    let encoder = TextEncoder::new();
    let mut headers = HeaderMap::new();

    match HeaderValue::from_str(encoder.format_type()) {
        Ok(content_type) => {
            headers.insert("content-type", content_type);
        }
        Err(_) => {
            headers.insert(
                "content-type",
                HeaderValue::from_static("text/plain; charset=utf-8"),
            );
        }
    }

    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&registry.gather(), &mut buffer) {
        error!("Failed to encode metrics: {}", e);
        return (
            StatusCode::INTERNAL_SERVER_ERROR,
            headers,
            format!("Error encoding metrics: {e}"),
        );
    }

    match String::from_utf8(buffer) {
        Ok(body) => (StatusCode::OK, headers, body),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            headers,
            format!("Error encoding metrics: {e}"),
        ),
    }
}
