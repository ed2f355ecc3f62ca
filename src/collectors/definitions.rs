//! Declarative metric definitions.
//!
//! A definition file (TOML `[[metric]]` tables or a YAML `metric:`
//! sequence, chosen by file extension) declares one record per metric:
//! the SQL query to run, which result columns become labels and which
//! become values, the metric kind, and optional per-metric overrides.
//!
//! Column names are folded to lowercase to match how PostgreSQL reports
//! unquoted identifiers.

use crate::collectors::error::ConfigError;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

#[allow(clippy::expect_used)]
static METRIC_NAME_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[a-zA-Z_:][a-zA-Z0-9_:]*$").expect("metric name regex"));

#[allow(clippy::expect_used)]
static COLUMN_NAME_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[a-zA-Z_][a-zA-Z0-9_]*$").expect("column name regex"));

/// Prometheus metric kind a descriptor produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MetricKind {
    Gauge,
    Counter,
}

impl std::fmt::Display for MetricKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Gauge => f.write_str("gauge"),
            Self::Counter => f.write_str("counter"),
        }
    }
}

/// One declarative query-to-metric mapping.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MetricDescriptor {
    pub name: String,
    pub help: String,
    pub kind: MetricKind,
    pub query: String,

    /// Result columns exposed as label values, in declared order.
    #[serde(default)]
    pub labels: Vec<String>,

    /// Result columns coerced to f64, each producing one metric series.
    pub values: Vec<String>,

    /// Per-metric query timeout override, in seconds. The effective
    /// deadline is the smaller of this and the global query timeout.
    #[serde(default)]
    pub timeout: Option<u64>,

    #[serde(default = "default_enabled")]
    pub enabled: bool,

    /// Optional regex matched against the target host; the metric only
    /// runs against targets it matches.
    #[serde(default)]
    pub target_filter: Option<String>,

    #[serde(skip)]
    target_re: Option<Regex>,
}

const fn default_enabled() -> bool {
    true
}

impl MetricDescriptor {
    /// Validate the record and normalize column names to lowercase.
    fn validate(mut self) -> Result<Self, ConfigError> {
        let invalid = |name: &str, reason: &str| ConfigError::Invalid {
            name: name.to_string(),
            reason: reason.to_string(),
        };

        if self.name.is_empty() {
            return Err(invalid("<unnamed>", "name must not be empty"));
        }

        if !METRIC_NAME_RE.is_match(&self.name) {
            return Err(invalid(&self.name, "name is not a valid metric name"));
        }

        if self.help.is_empty() {
            return Err(invalid(&self.name, "help must not be empty"));
        }

        if self.query.trim().is_empty() {
            return Err(invalid(&self.name, "query must not be empty"));
        }

        if self.values.is_empty() {
            return Err(invalid(&self.name, "at least one value column is required"));
        }

        self.labels = self.labels.iter().map(|c| c.to_lowercase()).collect();
        self.values = self.values.iter().map(|c| c.to_lowercase()).collect();

        for column in self.labels.iter().chain(self.values.iter()) {
            if !COLUMN_NAME_RE.is_match(column) {
                return Err(invalid(
                    &self.name,
                    &format!("'{column}' is not a valid column name"),
                ));
            }
        }

        if let Some(column) = self.values.iter().find(|v| self.labels.contains(*v)) {
            return Err(invalid(
                &self.name,
                &format!("column '{column}' is declared as both label and value"),
            ));
        }

        if self.timeout == Some(0) {
            return Err(invalid(&self.name, "timeout override must be at least 1s"));
        }

        if let Some(pattern) = &self.target_filter {
            self.target_re = Some(Regex::new(pattern).map_err(|e| {
                invalid(&self.name, &format!("target_filter does not compile: {e}"))
            })?);
        }

        Ok(self)
    }

    /// Deadline for this metric's query: the per-metric override capped by
    /// the global query timeout.
    pub fn effective_timeout(&self, global: Duration) -> Duration {
        self.timeout
            .map_or(global, |secs| global.min(Duration::from_secs(secs)))
    }

    /// Whether this metric runs against the given target host.
    pub fn applies_to(&self, target_host: Option<&str>) -> bool {
        match (&self.target_re, target_host) {
            (None, _) => true,
            (Some(re), Some(host)) => re.is_match(host),
            (Some(_), None) => false,
        }
    }

    /// Metric name for one of this descriptor's value columns: the bare
    /// descriptor name when it declares a single value column, suffixed
    /// with the column name otherwise.
    pub fn sample_name(&self, value_column: &str) -> String {
        if self.values.len() == 1 {
            self.name.clone()
        } else {
            format!("{}_{}", self.name, value_column)
        }
    }
}

/// Ordered, name-unique collection of metric descriptors.
///
/// Merging preserves first-seen order; a later definition with the same
/// name replaces the earlier one in place.
#[derive(Debug, Clone, Default)]
pub struct MetricSet {
    descriptors: Vec<MetricDescriptor>,
}

impl MetricSet {
    fn insert(&mut self, descriptor: MetricDescriptor) {
        match self.descriptors.iter_mut().find(|d| d.name == descriptor.name) {
            Some(existing) => *existing = descriptor,
            None => self.descriptors.push(descriptor),
        }
    }

    pub fn merge(&mut self, other: Self) {
        for descriptor in other.descriptors {
            self.insert(descriptor);
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.descriptors.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.descriptors.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &MetricDescriptor> {
        self.descriptors.iter()
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<&MetricDescriptor> {
        self.descriptors.iter().find(|d| d.name == name)
    }

    /// Descriptors that take part in a scrape of the given target:
    /// enabled, and not excluded by a target filter.
    pub fn active<'a>(
        &'a self,
        target_host: Option<&'a str>,
    ) -> impl Iterator<Item = &'a MetricDescriptor> {
        self.descriptors
            .iter()
            .filter(move |d| d.enabled && d.applies_to(target_host))
    }

    /// (name, help) pairs advertised before the first scrape.
    #[must_use]
    pub fn describe(&self) -> Vec<(String, String)> {
        self.descriptors
            .iter()
            .filter(|d| d.enabled)
            .map(|d| (d.name.clone(), d.help.clone()))
            .collect()
    }
}

#[derive(Debug, Deserialize)]
struct DefinitionFile {
    #[serde(default)]
    metric: Vec<MetricDescriptor>,
}

fn parse_document(path: &Path, content: &str) -> Result<Vec<MetricDescriptor>, ConfigError> {
    let parse_err = |message: String| ConfigError::Parse {
        path: path.to_path_buf(),
        message,
    };

    let is_yaml = path
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("yaml") || e.eq_ignore_ascii_case("yml"));

    let file: DefinitionFile = if is_yaml {
        serde_yaml::from_str(content).map_err(|e| parse_err(e.to_string()))?
    } else {
        toml::from_str(content).map_err(|e| parse_err(e.to_string()))?
    };

    file.metric.into_iter().map(MetricDescriptor::validate).collect()
}

fn load_file(path: &Path) -> Result<Vec<MetricDescriptor>, ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;

    parse_document(path, &content)
}

/// Load the default definition file and merge an optional custom file on
/// top of it. On a name collision the custom definition wins.
pub fn load(default_path: &Path, custom_path: Option<&Path>) -> Result<MetricSet, ConfigError> {
    let mut set = MetricSet::default();

    for descriptor in load_file(default_path)? {
        set.insert(descriptor);
    }

    if let Some(path) = custom_path {
        let mut custom = MetricSet::default();
        for descriptor in load_file(path)? {
            custom.insert(descriptor);
        }
        set.merge(custom);
    }

    Ok(set)
}
