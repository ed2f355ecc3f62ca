//! Error taxonomy for the scrape engine.
//!
//! Config and connection problems propagate to the caller; everything else
//! is absorbed into the `ScrapeResult` so a single bad query or row never
//! fails a whole scrape.

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Failure to load or validate a metric definition file.
///
/// Fatal at process start in scheduled mode; in on-demand mode it maps to
/// a failed scrape response for that one request.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read metric definitions from {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse {path}: {message}")]
    Parse { path: PathBuf, message: String },

    #[error("invalid metric definition '{name}': {reason}")]
    Invalid { name: String, reason: String },
}

/// Per-descriptor and pool-level scrape failures.
#[derive(Debug, Error)]
pub enum ScrapeError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// The pool could not be established or a connection acquired.
    /// Downgrades `up` to 0, never crashes the process.
    #[error("database connection failed: {0}")]
    Connection(#[source] sqlx::Error),

    /// Driver-level failure for one descriptor's query (bad SQL,
    /// permission denied, severed connection). Non-fatal to the pass.
    #[error("query for '{descriptor}' failed: {source}")]
    Query {
        descriptor: String,
        #[source]
        source: sqlx::Error,
    },

    /// The descriptor's deadline fired. Non-fatal to the pass.
    #[error("query for '{descriptor}' timed out after {timeout:?}")]
    Timeout { descriptor: String, timeout: Duration },

    /// The result shape cannot be mapped (e.g. a declared value column is
    /// missing from the result set).
    #[error("cannot map rows for '{descriptor}': {reason}")]
    Mapping { descriptor: String, reason: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_error_display() {
        let err = ConfigError::Invalid {
            name: "sessions".to_string(),
            reason: "no value columns".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "invalid metric definition 'sessions': no value columns"
        );
    }

    #[test]
    fn test_timeout_error_display() {
        let err = ScrapeError::Timeout {
            descriptor: "slow_query".to_string(),
            timeout: Duration::from_secs(5),
        };
        assert!(err.to_string().contains("slow_query"));
        assert!(err.to_string().contains("5s"));
    }

    #[test]
    fn test_config_error_wraps_into_scrape_error() {
        let err: ScrapeError = ConfigError::Parse {
            path: PathBuf::from("metrics.toml"),
            message: "unexpected key".to_string(),
        }
        .into();
        assert!(err.to_string().contains("metrics.toml"));
    }
}
