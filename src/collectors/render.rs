//! Bridges scrape results to the Prometheus exposition boundary.
//!
//! Samples are loaded into a fresh `prometheus::Registry` per exposition,
//! so the encoder sees ordinary registered metrics. The text encoding
//! itself is the `prometheus` crate's.

use crate::collectors::definitions::MetricKind;
use crate::collectors::mapper::Sample;
use prometheus::proto::MetricFamily;
use prometheus::{CounterVec, GaugeVec, Opts, Registry, TextEncoder};
use tracing::debug;

/// Build a registry holding one metric family per distinct sample name.
///
/// `const_labels` are stamped onto every family; the on-demand handler
/// uses this to wrap a target's samples with its identifying label.
/// Samples whose label cardinality disagrees with their family's first
/// sample are dropped rather than failing the exposition.
pub fn to_registry(
    samples: &[Sample],
    const_labels: &[(String, String)],
) -> Result<Registry, prometheus::Error> {
    let registry = Registry::new();

    let mut groups: Vec<(&str, Vec<&Sample>)> = Vec::new();
    for sample in samples {
        match groups.iter_mut().find(|(name, _)| *name == sample.name) {
            Some((_, group)) => group.push(sample),
            None => groups.push((sample.name.as_str(), vec![sample])),
        }
    }

    for (name, group) in groups {
        let Some(first) = group.first() else { continue };

        let mut opts = Opts::new(name, first.help.clone());
        for (key, value) in const_labels {
            opts = opts.const_label(key.clone(), value.clone());
        }

        let label_names: Vec<&str> = first.label_names.iter().map(String::as_str).collect();

        match first.kind {
            MetricKind::Gauge => {
                let family = GaugeVec::new(opts, &label_names)?;
                registry.register(Box::new(family.clone()))?;

                for sample in &group {
                    let values: Vec<&str> =
                        sample.label_values.iter().map(String::as_str).collect();
                    match family.get_metric_with_label_values(&values) {
                        Ok(metric) => metric.set(sample.value),
                        Err(error) => {
                            debug!(metric = name, %error, "dropping unencodable sample");
                        }
                    }
                }
            }
            MetricKind::Counter => {
                let family = CounterVec::new(opts, &label_names)?;
                registry.register(Box::new(family.clone()))?;

                for sample in &group {
                    let values: Vec<&str> =
                        sample.label_values.iter().map(String::as_str).collect();
                    match family.get_metric_with_label_values(&values) {
                        // counters cannot go negative; clamp instead of
                        // panicking on a misdeclared kind
                        Ok(metric) => metric.inc_by(sample.value.max(0.0)),
                        Err(error) => {
                            debug!(metric = name, %error, "dropping unencodable sample");
                        }
                    }
                }
            }
        }
    }

    Ok(registry)
}

/// Encode several gathered family groups into one text-format body.
pub fn encode_text(groups: &[Vec<MetricFamily>]) -> Result<String, prometheus::Error> {
    let mut families: Vec<MetricFamily> = Vec::new();
    for group in groups {
        families.extend_from_slice(group);
    }

    TextEncoder::new().encode_to_string(&families)
}

/// Render samples straight to text, with optional constant labels.
pub fn render_text(
    samples: &[Sample],
    const_labels: &[(String, String)],
) -> Result<String, prometheus::Error> {
    let registry = to_registry(samples, const_labels)?;
    encode_text(&[registry.gather()])
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gauge(name: &str, labels: &[(&str, &str)], value: f64) -> Sample {
        Sample {
            name: name.to_string(),
            help: format!("{name} help."),
            kind: MetricKind::Gauge,
            label_names: labels.iter().map(|(k, _)| (*k).to_string()).collect(),
            label_values: labels.iter().map(|(_, v)| (*v).to_string()).collect(),
            value,
        }
    }

    fn counter(name: &str, labels: &[(&str, &str)], value: f64) -> Sample {
        Sample {
            kind: MetricKind::Counter,
            ..gauge(name, labels, value)
        }
    }

    #[test]
    fn test_gauge_sample_renders_expected_series() {
        let samples = vec![gauge(
            "tablespace_free_bytes",
            &[("name", "USERS")],
            1_048_576.0,
        )];

        let text = render_text(&samples, &[]).unwrap();

        assert!(text.contains("# HELP tablespace_free_bytes"));
        assert!(text.contains("# TYPE tablespace_free_bytes gauge"));
        assert!(text.contains("tablespace_free_bytes{name=\"USERS\"} 1048576"));
    }

    #[test]
    fn test_counter_sample_renders_counter_type() {
        let samples = vec![counter("jobs_done_total", &[], 42.0)];

        let text = render_text(&samples, &[]).unwrap();

        assert!(text.contains("# TYPE jobs_done_total counter"));
        assert!(text.contains("jobs_done_total 42"));
    }

    #[test]
    fn test_const_label_wraps_every_family() {
        let samples = vec![
            gauge("one", &[("state", "idle")], 1.0),
            counter("two_total", &[], 2.0),
        ];
        let wrap = vec![(
            "database_identifier".to_string(),
            "db.internal:5432".to_string(),
        )];

        let text = render_text(&samples, &wrap).unwrap();

        assert_eq!(text.matches("database_identifier=\"db.internal:5432\"").count(), 2);
        assert!(text.contains("state=\"idle\""));
    }

    #[test]
    fn test_duplicate_gauge_series_collapse_to_last_value() {
        let samples = vec![
            gauge("dup", &[("name", "USERS")], 1.0),
            gauge("dup", &[("name", "USERS")], 2.0),
        ];

        let text = render_text(&samples, &[]).unwrap();

        assert!(text.contains("dup{name=\"USERS\"} 2"));
        assert_eq!(text.matches("dup{name=\"USERS\"}").count(), 1);
    }

    #[test]
    fn test_no_samples_renders_empty_body() {
        let text = render_text(&[], &[]).unwrap();
        assert!(text.is_empty());
    }

    #[test]
    fn test_encode_text_merges_groups() {
        let one = to_registry(&[gauge("a", &[], 1.0)], &[]).unwrap();
        let two = to_registry(&[gauge("b", &[], 2.0)], &[]).unwrap();

        let text = encode_text(&[one.gather(), two.gather()]).unwrap();

        assert!(text.contains("a 1"));
        assert!(text.contains("b 2"));
    }

    #[test]
    fn test_negative_counter_value_is_clamped() {
        let samples = vec![counter("neg_total", &[], -5.0)];
        let text = render_text(&samples, &[]).unwrap();
        assert!(text.contains("neg_total 0"));
    }
}
