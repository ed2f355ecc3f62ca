use crate::collectors::{Scraper, ScraperConfig, render};
use axum::{
    extract::{Extension, Query},
    http::{HeaderMap, HeaderValue, StatusCode},
    response::IntoResponse,
};
use prometheus::Registry;
use secrecy::SecretString;
use serde::Deserialize;
use tracing::{error, info};

#[derive(Debug, Deserialize)]
pub struct ScrapeParams {
    target: Option<String>,
}

/// `/scrape?target=<dsn>`: multi-target proxy mode.
///
/// Each request owns a private scraper and pool for the requested DSN;
/// concurrent requests for different targets never share connections, and
/// the pool is torn down before the response is returned. The target's
/// samples are wrapped with a `database_identifier` label and merged with
/// the process-wide (no-target) registry.
pub async fn scrape(
    Query(params): Query<ScrapeParams>,
    Extension(config): Extension<ScraperConfig>,
    Extension(registry): Extension<Registry>,
) -> impl IntoResponse {
    let mut headers = HeaderMap::new();
    headers.insert(
        "content-type",
        HeaderValue::from_static("text/plain; charset=utf-8"),
    );

    let Some(target) = params.target.filter(|t| !t.is_empty()) else {
        return (
            StatusCode::BAD_REQUEST,
            headers,
            "missing 'target' query parameter".to_string(),
        );
    };

    let target_config = config.for_target(SecretString::from(target));

    let scraper = match Scraper::new(&target_config) {
        Ok(scraper) => scraper,
        Err(e) => {
            error!("Failed to build exporter for target: {}", e);
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                headers,
                format!("Error building exporter for target: {e}"),
            );
        }
    };

    let identifier = scraper.target_host().unwrap_or_default().to_string();

    info!(target = %identifier, "scraping on-demand target");

    let result = scraper.scrape().await;

    let wrap = vec![("database_identifier".to_string(), identifier)];
    let encoded = render::to_registry(&result.samples, &wrap)
        .and_then(|r| render::encode_text(&[registry.gather(), r.gather()]));

    scraper.close().await;

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
