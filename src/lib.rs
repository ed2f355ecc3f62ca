//! Query-driven PostgreSQL metric exporter for Prometheus.
//!
//! Metrics are not hard-coded: a TOML or YAML definition file declares SQL
//! queries together with the label and value columns each one maps to, and
//! the scrape engine turns the result rows into Prometheus samples.
//!
//! Two modes of operation:
//! - scheduled: poll one fixed DSN on an interval and serve the cached
//!   snapshot from `/metrics`
//! - on-demand: `/scrape?target=<dsn>` builds a private exporter for the
//!   requested target, scrapes it synchronously and tears the pool down

pub mod cli;
pub mod collectors;
pub mod exporter;
