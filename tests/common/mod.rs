#![allow(dead_code)]

use secrecy::SecretString;
use std::env;
use std::io::Write;

/// DSN pointing at a port nothing listens on: pool opens lazily, every
/// query fails fast, the exporter must keep serving with `pgquery_up 0`.
pub fn unreachable_dsn() -> SecretString {
    SecretString::from("postgresql://scrape@127.0.0.1:1/postgres")
}

/// DSN of a live test database, if the environment provides one.
///
/// Database-dependent tests skip themselves when this is unset so the
/// suite passes on machines without PostgreSQL.
pub fn live_test_dsn() -> Option<SecretString> {
    env::var("PGQUERY_EXPORTER_TEST_DSN")
        .ok()
        .filter(|dsn| !dsn.is_empty())
        .map(SecretString::from)
}

/// Write a metric definition file and keep it alive for the test.
pub fn write_definitions(content: &str) -> tempfile::NamedTempFile {
    let mut file = tempfile::Builder::new()
        .suffix(".toml")
        .tempfile()
        .expect("create definitions tempfile");
    file.write_all(content.as_bytes())
        .expect("write definitions tempfile");
    file
}

/// Find an available port for testing (returns port > 1024)
pub fn get_available_port() -> u16 {
    use std::net::TcpListener;

    // Bind to port 0 lets the OS assign an available ephemeral port
    let listener = TcpListener::bind("127.0.0.1:0").expect("Failed to bind to random port");
    listener
        .local_addr()
        .expect("Failed to get local addr")
        .port()
}

/// Wait for the server to accept connections on the given port.
pub async fn wait_for_server(port: u16, max_attempts: u32) -> bool {
    use tokio::time::{Duration, sleep};

    for _ in 0..max_attempts {
        if tokio::net::TcpStream::connect(format!("localhost:{port}"))
            .await
            .is_ok()
        {
            return true;
        }

        sleep(Duration::from_millis(100)).await;
    }

    false
}

pub fn get_test_url(port: u16) -> String {
    format!("http://localhost:{port}")
}
