use crate::collectors::{Scraper, ScraperConfig};
use anyhow::{Context, Result, anyhow};
use axum::{
    Extension, Router,
    body::Body,
    http::{HeaderName, HeaderValue, Request},
    middleware::{Next, from_fn},
    response::Response,
    routing::get,
};
use opentelemetry::global;
use opentelemetry::trace::{TraceContextExt, TraceId};
use opentelemetry_http::HeaderExtractor;
use prometheus::{IntGauge, Opts, Registry};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tower::ServiceBuilder;
use tower_http::{
    request_id::PropagateRequestIdLayer, set_header::SetRequestHeaderLayer, trace::TraceLayer,
};
use tracing::{Span, error, info, info_span};
use tracing_opentelemetry::OpenTelemetrySpanExt;
use ulid::Ulid;

mod handlers;
mod shutdown;

pub mod built_info {
    include!(concat!(env!("OUT_DIR"), "/built.rs"));
}

pub const GIT_COMMIT_HASH: &str = if let Some(hash) = built_info::GIT_COMMIT_HASH {
    hash
} else {
    ":-("
};

/// Process-wide registry merged into every exposition response: carries
/// the build-info metric and nothing target-specific.
fn process_registry() -> Result<Registry> {
    let registry = Registry::new();

    let build_info = IntGauge::with_opts(
        Opts::new(
            "pgquery_exporter_build_info",
            "Build information for this exporter binary.",
        )
        .const_label("version", env!("CARGO_PKG_VERSION"))
        .const_label("commit", GIT_COMMIT_HASH),
    )?;
    build_info.set(1);
    registry.register(Box::new(build_info))?;

    Ok(registry)
}

/// Build the exporter for the fixed target and serve HTTP until shutdown.
///
/// # Errors
///
/// Fails at startup when the metric definitions cannot be loaded, the DSN
/// does not parse, or the listen address is invalid. An unreachable
/// database is NOT a startup error; it shows up as `pgquery_up 0`.
pub async fn new(port: u16, listen: Option<String>, config: ScraperConfig) -> Result<()> {
    let scraper =
        Arc::new(Scraper::new(&config).context("failed to initialize the exporter")?);

    let registry = process_registry()?;

    let (stop_tx, stop_rx) = watch::channel(false);

    if scraper.is_scheduled() {
        tokio::spawn(
            Arc::clone(&scraper).run_scheduled_scrapes(config.scrape_interval, stop_rx),
        );
    } else {
        drop(stop_rx);
    }

    let trace_layer = TraceLayer::new_for_http()
        .make_span_with(make_span)
        .on_response(on_response);

    let app = Router::new()
        .route("/", get(handlers::index))
        .route("/metrics", get(handlers::metrics))
        .route("/scrape", get(handlers::scrape))
        .route("/health", get(handlers::health).options(handlers::health))
        .layer(
            ServiceBuilder::new()
                .layer(SetRequestHeaderLayer::if_not_present(
                    HeaderName::from_static("x-request-id"),
                    |_req: &_| HeaderValue::from_str(Ulid::new().to_string().as_str()).ok(),
                ))
                .layer(PropagateRequestIdLayer::new(HeaderName::from_static(
                    "x-request-id",
                )))
                .layer(trace_layer)
                .layer(from_fn(add_trace_headers))
                .layer(Extension(Arc::clone(&scraper)))
                .layer(Extension(registry))
                .layer(Extension(config)),
        );

    let (listener, bind_addr) = bind(port, listen).await?;

    println!(
        "{} {} - Listening on {bind_addr}\n\nLoaded metrics:\n{}",
        env!("CARGO_PKG_NAME"),
        env!("CARGO_PKG_VERSION"),
        format_list(&scraper.describe().iter().map(|(name, _)| name.clone()).collect::<Vec<_>>()),
    );

    if let Err(e) = axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(shutdown::shutdown_signal())
        .await
    {
        error!(error=%e, "server error");
    }

    info!("shutting down");

    let _ = stop_tx.send(true);
    scraper.close().await;

    Ok(())
}

async fn bind(port: u16, listen: Option<String>) -> Result<(TcpListener, String)> {
    match listen {
        Some(addr) => match addr.parse::<std::net::IpAddr>() {
            Ok(ip) => {
                let bind_addr = format!("{ip}:{port}");
                Ok((
                    TcpListener::bind(&bind_addr)
                        .await
                        .with_context(|| format!("Failed to bind to {bind_addr}"))?,
                    if ip.is_ipv6() {
                        format!("[{ip}]:{port}")
                    } else {
                        bind_addr
                    },
                ))
            }
            Err(_) => Err(anyhow!(
                "Invalid IP address: '{}'. Expected IPv4 (e.g., 0.0.0.0, 127.0.0.1) or IPv6 (e.g., ::, ::1)",
                addr
            )),
        },
        None => {
            // Auto: try IPv6 first, fall back to IPv4
            match TcpListener::bind(format!("::0:{port}")).await {
                Ok(l) => Ok((l, format!("[::]:{port}"))),
                Err(_) => Ok((
                    TcpListener::bind(format!("0.0.0.0:{port}")).await?,
                    format!("0.0.0.0:{port}"),
                )),
            }
        }
    }
}

// Helper to format a list of items with a leading dash and indentation for
// the start up message
fn format_list<T: std::fmt::Display>(items: &[T]) -> String {
    items
        .iter()
        .map(|i| format!("  - {i}"))
        .collect::<Vec<_>>()
        .join("\n")
}

fn make_span(request: &Request<Body>) -> Span {
    let parent_cx =
        global::get_text_map_propagator(|prop| prop.extract(&HeaderExtractor(request.headers())));

    let request_id = request
        .headers()
        .get("x-request-id")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("none");

    let user_agent = request
        .headers()
        .get("user-agent")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("unknown");

    let span = info_span!(
        "http.server.request",
        otel.kind = "server",
        http.method = request.method().as_str(),
        http.route = request.uri().path(),
        http.target = request.uri().to_string(),
        http.scheme = request.uri().scheme_str().unwrap_or("http"),
        http.user_agent = user_agent,
        request_id = request_id,
    );

    let _ = span.set_parent(parent_cx);

    span
}

fn on_response<B>(response: &axum::http::Response<B>, latency: Duration, span: &Span) {
    if response.status().is_server_error() {
        span.record("otel.status_code", "ERROR");
    } else {
        span.record("otel.status_code", "OK");
    }

    let cx = span.context();
    let trace_id = cx.span().span_context().trace_id();

    if trace_id == TraceId::INVALID {
        info!(
            parent: span,
            status = response.status().as_u16(),
            elapsed_ms = latency.as_millis() as u64,
            "request completed"
        );
    } else {
        info!(
            parent: span,
            status = response.status().as_u16(),
            elapsed_ms = latency.as_millis() as u64,
            trace_id = %trace_id,
            "request completed"
        );
    }
}

async fn add_trace_headers(req: Request<Body>, next: Next) -> Response {
    let mut res = next.run(req).await;

    let span = Span::current();
    let cx = span.context();
    let span_context = cx.span().span_context().clone();

    if span_context.is_valid()
        && let Ok(val) = HeaderValue::from_str(&span_context.trace_id().to_string())
    {
        res.headers_mut()
            .insert(HeaderName::from_static("x-trace-id"), val);
    }

    res
}
