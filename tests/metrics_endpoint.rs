//! End-to-end tests against a running exporter.
//!
//! These use an unreachable target DSN on purpose: the pool opens lazily,
//! so the server must come up, keep serving, and report `pgquery_up 0`
//! instead of failing the request.

use pgquery_exporter::collectors::ScraperConfig;
use pgquery_exporter::exporter;
use std::time::Duration;

mod common;

const SMALL_SET: &str = r#"
    [[metric]]
    name = "pg_connections"
    help = "Backends by state."
    kind = "gauge"
    query = "SELECT state, count(*) AS count FROM pg_stat_activity GROUP BY state"
    labels = ["state"]
    values = ["count"]
"#;

fn test_config(defs: &tempfile::NamedTempFile, interval: Duration) -> ScraperConfig {
    ScraperConfig {
        dsn: common::unreachable_dsn(),
        max_open_conns: 2,
        max_idle_conns: 0,
        query_timeout: Duration::from_secs(1),
        default_metrics: defs.path().to_path_buf(),
        custom_metrics: None,
        scrape_interval: interval,
    }
}

async fn spawn_exporter(
    port: u16,
    config: ScraperConfig,
) -> tokio::task::JoinHandle<anyhow::Result<()>> {
    let handle = tokio::spawn(async move { exporter::new(port, None, config).await });
    assert!(
        common::wait_for_server(port, 50).await,
        "server failed to start on port {port}"
    );
    handle
}

#[tokio::test]
async fn test_metrics_endpoint_serves_down_target() {
    let defs = common::write_definitions(SMALL_SET);
    let port = common::get_available_port();
    let handle = spawn_exporter(port, test_config(&defs, Duration::ZERO)).await;

    let response = reqwest::get(format!("{}/metrics", common::get_test_url(port)))
        .await
        .unwrap();

    assert_eq!(response.status(), 200);
    assert_eq!(
        response.headers().get("content-type").unwrap(),
        "text/plain; charset=utf-8"
    );

    let body = response.text().await.unwrap();

    assert!(body.contains("# HELP"));
    assert!(body.contains("# TYPE"));
    assert!(body.contains("pgquery_up 0"));
    assert!(body.contains("pgquery_scrape_errors_total 1"));
    assert!(body.contains("pgquery_scrape_duration_seconds"));
    assert!(body.contains("pgquery_exporter_build_info"));

    handle.abort();
}

#[tokio::test]
async fn test_landing_page_links_to_metrics() {
    let defs = common::write_definitions(SMALL_SET);
    let port = common::get_available_port();
    let handle = spawn_exporter(port, test_config(&defs, Duration::ZERO)).await;

    let response = reqwest::get(common::get_test_url(port)).await.unwrap();
    assert_eq!(response.status(), 200);

    let body = response.text().await.unwrap();
    assert!(body.contains("/metrics"));
    assert!(body.contains("/scrape?target="));

    handle.abort();
}

#[tokio::test]
async fn test_scrape_endpoint_requires_target() {
    let defs = common::write_definitions(SMALL_SET);
    let port = common::get_available_port();
    let handle = spawn_exporter(port, test_config(&defs, Duration::ZERO)).await;

    let response = reqwest::get(format!("{}/scrape", common::get_test_url(port)))
        .await
        .unwrap();

    assert_eq!(response.status(), 400);

    handle.abort();
}

#[tokio::test]
async fn test_scrape_endpoint_wraps_target_samples() {
    let defs = common::write_definitions(SMALL_SET);
    let port = common::get_available_port();
    let handle = spawn_exporter(port, test_config(&defs, Duration::ZERO)).await;

    let response = reqwest::get(format!(
        "{}/scrape?target=postgresql://probe@127.0.0.1:1/postgres",
        common::get_test_url(port)
    ))
    .await
    .unwrap();

    assert_eq!(response.status(), 200);

    let body = response.text().await.unwrap();
    assert!(body.contains("database_identifier=\"127.0.0.1:1\""));
    assert!(body.contains("pgquery_up{database_identifier=\"127.0.0.1:1\"} 0"));

    handle.abort();
}

#[tokio::test]
async fn test_concurrent_scrape_requests_stay_isolated() {
    let defs = common::write_definitions(SMALL_SET);
    let port = common::get_available_port();
    let handle = spawn_exporter(port, test_config(&defs, Duration::ZERO)).await;

    let url_a = format!(
        "{}/scrape?target=postgresql://probe@127.0.0.1:1/a",
        common::get_test_url(port)
    );
    let url_b = format!(
        "{}/scrape?target=postgresql://probe@127.0.0.2:1/b",
        common::get_test_url(port)
    );

    let (a, b) = tokio::join!(reqwest::get(url_a), reqwest::get(url_b));

    let body_a = a.unwrap().text().await.unwrap();
    let body_b = b.unwrap().text().await.unwrap();

    assert!(body_a.contains("database_identifier=\"127.0.0.1:1\""));
    assert!(!body_a.contains("database_identifier=\"127.0.0.2:1\""));

    assert!(body_b.contains("database_identifier=\"127.0.0.2:1\""));
    assert!(!body_b.contains("database_identifier=\"127.0.0.1:1\""));

    handle.abort();
}

#[tokio::test]
async fn test_health_reports_unreachable_database() {
    let defs = common::write_definitions(SMALL_SET);
    let port = common::get_available_port();
    let handle = spawn_exporter(port, test_config(&defs, Duration::ZERO)).await;

    let response = reqwest::get(format!("{}/health", common::get_test_url(port)))
        .await
        .unwrap();

    assert_eq!(response.status(), 503);

    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["database"], "error");
    assert_eq!(body["name"], "pgquery_exporter");

    handle.abort();
}

#[tokio::test]
async fn test_scheduled_mode_serves_snapshot_once_ready() {
    let defs = common::write_definitions(SMALL_SET);
    let port = common::get_available_port();
    let handle = spawn_exporter(port, test_config(&defs, Duration::from_secs(1))).await;

    // before the first pass completes the endpoint serves only the
    // process registry; afterwards the cached snapshot appears
    let mut saw_snapshot = false;
    for _ in 0..50 {
        let body = reqwest::get(format!("{}/metrics", common::get_test_url(port)))
            .await
            .unwrap()
            .text()
            .await
            .unwrap();

        assert!(body.contains("pgquery_exporter_build_info"));

        if body.contains("pgquery_up") {
            saw_snapshot = true;
            break;
        }

        tokio::time::sleep(Duration::from_millis(200)).await;
    }

    assert!(saw_snapshot, "snapshot never became ready");

    handle.abort();
}

#[tokio::test]
async fn test_startup_fails_on_missing_definitions() {
    let port = common::get_available_port();

    let config = ScraperConfig {
        dsn: common::unreachable_dsn(),
        max_open_conns: 2,
        max_idle_conns: 0,
        query_timeout: Duration::from_secs(1),
        default_metrics: "/nonexistent/metrics.toml".into(),
        custom_metrics: None,
        scrape_interval: Duration::ZERO,
    };

    let result = exporter::new(port, None, config).await;
    assert!(result.is_err());
}
