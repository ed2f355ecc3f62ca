mod health;
mod metrics;
mod scrape;

pub use health::health;
pub use metrics::metrics;
pub use scrape::scrape;

use axum::response::Html;

/// Landing page: points humans at the metrics path and documents the
/// multi-target proxy endpoint.
pub async fn index() -> Html<String> {
    Html(format!(
        "<html><head><title>pgquery_exporter {version}</title></head><body>\
         <h1>pgquery_exporter {version}</h1>\
         <p><a href='/metrics'>Metrics</a></p>\
         <p>To scrape an arbitrary target, request \
         <b>/scrape?target=postgresql://user@host:5432/db</b> with the DSN \
         of the PostgreSQL instance to scrape.</p>\
         </body></html>",
        version = env!("CARGO_PKG_VERSION"),
    ))
}
