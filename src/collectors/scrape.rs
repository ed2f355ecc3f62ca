//! The scrape engine: one pass over the metric set against one target.
//!
//! Partial-failure policy: a broken query, a timeout, or an unacquirable
//! connection fails only its own descriptor; the pass continues and the
//! outcome is reported through meta-metrics. `scrape` never returns an
//! error to its caller.

use crate::collectors::definitions::{MetricKind, MetricSet};
use crate::collectors::error::ScrapeError;
use crate::collectors::mapper::{self, Sample};
use crate::collectors::query;
use crate::collectors::snapshot::SnapshotCache;
use crate::collectors::{definitions, i64_to_f64, pool, u64_to_f64};
use secrecy::SecretString;
use sqlx::PgPool;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

pub const META_UP: &str = "pgquery_up";
pub const META_SCRAPE_DURATION: &str = "pgquery_scrape_duration_seconds";
pub const META_SCRAPE_ERRORS: &str = "pgquery_scrape_errors_total";
pub const META_ROWS_SKIPPED: &str = "pgquery_scrape_rows_skipped_total";
pub const META_SCRAPES_TOTAL: &str = "pgquery_scrapes_total";

/// Everything needed to build one [`Scraper`]: the fixed process target in
/// scheduled mode, or a per-request target in on-demand mode.
#[derive(Debug, Clone)]
pub struct ScraperConfig {
    pub dsn: SecretString,
    pub max_open_conns: u32,
    pub max_idle_conns: u32,
    pub query_timeout: Duration,
    pub default_metrics: PathBuf,
    pub custom_metrics: Option<PathBuf>,
    /// Zero means scrape synchronously on every collect request.
    pub scrape_interval: Duration,
}

impl ScraperConfig {
    /// Same configuration pointed at a different target DSN; used by the
    /// on-demand handler to derive a per-request scraper.
    #[must_use]
    pub fn for_target(&self, dsn: SecretString) -> Self {
        Self {
            dsn,
            // an on-demand scraper serves exactly one request
            scrape_interval: Duration::ZERO,
            ..self.clone()
        }
    }
}

/// One descriptor's recorded failure within a pass.
#[derive(Debug, Clone)]
pub struct DescriptorFailure {
    pub descriptor: String,
    pub error: String,
}

/// Outcome of one full pass. Immutable once produced; the snapshot cache
/// replaces the previous value atomically.
#[derive(Debug, Default)]
pub struct ScrapeResult {
    pub samples: Vec<Sample>,
    pub succeeded: usize,
    pub failed: usize,
    pub rows_skipped: u64,
    pub duration: Duration,
    pub failures: Vec<DescriptorFailure>,
}

impl ScrapeResult {
    /// Target-up policy: at least one descriptor succeeded. Total failure
    /// of every descriptor signals target-down.
    #[must_use]
    pub fn up(&self) -> bool {
        self.succeeded > 0
    }
}

/// Binds one connection pool, one metric set and (in scheduled mode) the
/// snapshot cache. Lives for the process in scheduled mode, for a single
/// request in on-demand mode.
pub struct Scraper {
    pool: PgPool,
    metrics: MetricSet,
    query_timeout: Duration,
    scrape_interval: Duration,
    target_host: Option<String>,
    snapshot: SnapshotCache,
    scrapes_total: AtomicU64,
}

impl Scraper {
    /// Load the metric definitions and open the (lazy) pool.
    ///
    /// # Errors
    ///
    /// `ConfigError` when a definition file is unreadable, malformed or
    /// fails validation; `ConnectionError` when the DSN does not parse.
    pub fn new(config: &ScraperConfig) -> Result<Self, ScrapeError> {
        let metrics =
            definitions::load(&config.default_metrics, config.custom_metrics.as_deref())?;

        let pool = pool::open(
            &config.dsn,
            pool::PoolSettings {
                max_open: config.max_open_conns,
                max_idle: config.max_idle_conns,
                acquire_timeout: config.query_timeout,
            },
        )?;

        Ok(Self {
            pool,
            metrics,
            query_timeout: config.query_timeout,
            scrape_interval: config.scrape_interval,
            target_host: pool::target_host(&config.dsn),
            snapshot: SnapshotCache::default(),
            scrapes_total: AtomicU64::new(0),
        })
    }

    #[must_use]
    pub fn is_scheduled(&self) -> bool {
        !self.scrape_interval.is_zero()
    }

    #[must_use]
    pub fn target_host(&self) -> Option<&str> {
        self.target_host.as_deref()
    }

    /// (name, help) pairs of the enabled metrics, advertised before the
    /// first scrape.
    #[must_use]
    pub fn describe(&self) -> Vec<(String, String)> {
        self.metrics.describe()
    }

    /// One full pass over the active descriptors, in definition order.
    /// Each descriptor gets its own deadline derived from the global query
    /// timeout, so one slow query never cancels its siblings.
    pub async fn scrape(&self) -> ScrapeResult {
        let started = Instant::now();
        let mut result = ScrapeResult::default();

        for descriptor in self.metrics.active(self.target_host.as_deref()) {
            let deadline = descriptor.effective_timeout(self.query_timeout);

            let outcome = query::execute(&self.pool, descriptor, deadline)
                .await
                .and_then(|rows| mapper::map_rows(descriptor, &rows));

            match outcome {
                Ok(mapped) => {
                    debug!(
                        metric = %descriptor.name,
                        samples = mapped.samples.len(),
                        rows_skipped = mapped.rows_skipped,
                        "metric query succeeded"
                    );
                    result.succeeded += 1;
                    result.rows_skipped += mapped.rows_skipped;
                    result.samples.extend(mapped.samples);
                }
                Err(error) => {
                    warn!(metric = %descriptor.name, %error, "metric query failed");
                    result.failed += 1;
                    result.failures.push(DescriptorFailure {
                        descriptor: descriptor.name.clone(),
                        error: error.to_string(),
                    });
                }
            }
        }

        result.duration = started.elapsed();

        let scrapes = self.scrapes_total.fetch_add(1, Ordering::Relaxed) + 1;
        self.push_meta(&mut result, scrapes);

        result
    }

    fn push_meta(&self, result: &mut ScrapeResult, scrapes: u64) {
        let meta = |name: &str, help: &str, kind: MetricKind, value: f64| Sample {
            name: name.to_string(),
            help: help.to_string(),
            kind,
            label_names: Vec::new(),
            label_values: Vec::new(),
            value,
        };

        result.samples.push(meta(
            META_UP,
            "Whether the last scrape of the target succeeded for at least one metric query.",
            MetricKind::Gauge,
            if result.up() { 1.0 } else { 0.0 },
        ));
        result.samples.push(meta(
            META_SCRAPE_DURATION,
            "Duration of the last scrape in seconds.",
            MetricKind::Gauge,
            result.duration.as_secs_f64(),
        ));
        result.samples.push(meta(
            META_SCRAPE_ERRORS,
            "Number of metric queries that failed during the last scrape.",
            MetricKind::Counter,
            i64_to_f64(i64::try_from(result.failed).unwrap_or(i64::MAX)),
        ));
        result.samples.push(meta(
            META_ROWS_SKIPPED,
            "Number of result rows skipped during the last scrape because a value column could not be mapped.",
            MetricKind::Counter,
            u64_to_f64(result.rows_skipped),
        ));
        result.samples.push(meta(
            META_SCRAPES_TOTAL,
            "Total number of scrapes performed by this exporter instance.",
            MetricKind::Counter,
            u64_to_f64(scrapes),
        ));
    }

    /// The collect side of the exposition capability: the cached snapshot
    /// in scheduled mode (`None` before the first completed update), a
    /// fresh synchronous scrape otherwise.
    pub async fn collect(&self) -> Option<Arc<ScrapeResult>> {
        if self.is_scheduled() {
            self.snapshot.read()
        } else {
            Some(Arc::new(self.scrape().await))
        }
    }

    /// Background polling loop for scheduled mode. Publishes each pass to
    /// the snapshot cache; stops when the stop signal fires.
    pub async fn run_scheduled_scrapes(
        self: Arc<Self>,
        interval: Duration,
        mut stop: watch::Receiver<bool>,
    ) {
        if interval.is_zero() {
            return;
        }

        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!(interval = ?interval, "starting scheduled scrapes");

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let result = self.scrape().await;
                    debug!(
                        succeeded = result.succeeded,
                        failed = result.failed,
                        elapsed_ms = result.duration.as_millis() as u64,
                        "scheduled scrape completed"
                    );
                    self.snapshot.update(result);
                }
                _ = stop.changed() => {
                    info!("stopping scheduled scrapes");
                    break;
                }
            }
        }
    }

    /// Round-trip to the target, establishing a session if the lazy pool
    /// has none yet. Used by the health endpoint.
    ///
    /// # Errors
    ///
    /// Returns the driver error when no connection can be established.
    pub async fn ping(&self) -> Result<(), sqlx::Error> {
        use sqlx::Connection;

        let mut conn = self.pool.acquire().await?;
        conn.ping().await
    }

    /// Close the pool. Safe to call once per scraper; idempotent.
    pub async fn close(&self) {
        self.pool.close().await;
    }
}
