//! Connection pool construction for one target DSN.
//!
//! Pools are opened lazily: a malformed DSN fails here, but a live session
//! is only established by the first query, so an unreachable target shows
//! up as per-metric failures (and `up 0`) instead of a startup crash.

use crate::collectors::error::ScrapeError;
use secrecy::{ExposeSecret, SecretString};
use sqlx::postgres::{PgConnectOptions, PgPool, PgPoolOptions};
use std::str::FromStr;
use std::time::Duration;

/// Bounds for one pool; `max_idle` maps onto the pool's minimum resident
/// connection count, `max_open` onto its ceiling.
#[derive(Debug, Clone, Copy)]
pub struct PoolSettings {
    pub max_open: u32,
    pub max_idle: u32,
    pub acquire_timeout: Duration,
}

/// Open a bounded pool for the DSN. Fails only on an unparseable DSN.
pub fn open(dsn: &SecretString, settings: PoolSettings) -> Result<PgPool, ScrapeError> {
    let opts =
        PgConnectOptions::from_str(dsn.expose_secret()).map_err(ScrapeError::Connection)?;

    let pool = PgPoolOptions::new()
        .max_connections(settings.max_open.max(1))
        .min_connections(settings.max_idle.min(settings.max_open))
        .acquire_timeout(settings.acquire_timeout)
        .max_lifetime(Duration::from_secs(60 * 2))
        .test_before_acquire(true)
        .connect_lazy_with(opts);

    Ok(pool)
}

/// `host[:port]` of the target DSN, used for the target-identifying label
/// and for target filters. `None` when the DSN is not URL-shaped.
#[must_use]
pub fn target_host(dsn: &SecretString) -> Option<String> {
    let parsed = url::Url::parse(dsn.expose_secret()).ok()?;
    let host = parsed.host_str()?;

    Some(parsed.port().map_or_else(
        || host.to_string(),
        |port| format!("{host}:{port}"),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings() -> PoolSettings {
        PoolSettings {
            max_open: 5,
            max_idle: 1,
            acquire_timeout: Duration::from_secs(1),
        }
    }

    #[tokio::test]
    async fn test_open_is_lazy_for_unreachable_target() {
        // Nothing listens on this port; opening must still succeed.
        let dsn = SecretString::from("postgresql://scrape@127.0.0.1:1/postgres");
        assert!(open(&dsn, settings()).is_ok());
    }

    #[test]
    fn test_open_rejects_malformed_dsn() {
        let dsn = SecretString::from("not a dsn at all");
        assert!(matches!(
            open(&dsn, settings()),
            Err(ScrapeError::Connection(_))
        ));
    }

    #[test]
    fn test_target_host_with_port() {
        let dsn = SecretString::from("postgresql://user:pw@db.internal:6432/app");
        assert_eq!(target_host(&dsn), Some("db.internal:6432".to_string()));
    }

    #[test]
    fn test_target_host_without_port() {
        let dsn = SecretString::from("postgresql://user@db.internal/app");
        assert_eq!(target_host(&dsn), Some("db.internal".to_string()));
    }

    #[test]
    fn test_target_host_unparseable() {
        let dsn = SecretString::from("host=localhost user=postgres");
        assert_eq!(target_host(&dsn), None);
    }
}
