use crate::collectors::{Scraper, render};
use axum::{
    extract::Extension,
    http::{HeaderMap, HeaderValue, StatusCode},
    response::IntoResponse,
};
use prometheus::Registry;
use std::sync::Arc;
use tracing::{debug, error};

/// `/metrics`: the fixed target's samples plus the process-wide registry.
///
/// In scheduled mode this reads the cached snapshot and never blocks on an
/// in-flight scrape; before the first completed scrape only the process
/// registry is served. With no interval configured it scrapes
/// synchronously.
pub async fn metrics(
    Extension(scraper): Extension<Arc<Scraper>>,
    Extension(registry): Extension<Registry>,
) -> impl IntoResponse {
    let mut headers = HeaderMap::new();
    headers.insert(
        "content-type",
        HeaderValue::from_static("text/plain; charset=utf-8"),
    );

    let encoded = match scraper.collect().await {
        Some(result) => {
            debug!(
                succeeded = result.succeeded,
                failed = result.failed,
                "collected scrape result"
            );
            render::to_registry(&result.samples, &[])
                .and_then(|r| render::encode_text(&[registry.gather(), r.gather()]))
        }
        None => {
            debug!("no snapshot yet; serving process metrics only");
            render::encode_text(&[registry.gather()])
        }
    };

    match encoded {
        Ok(body) => (StatusCode::OK, headers, body),
        Err(e) => {
            error!("Failed to encode metrics: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                headers,
                format!("Error encoding metrics: {e}"),
            )
        }
    }
}
