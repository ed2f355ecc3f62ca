//! Maps decoded result rows into metric samples.
//!
//! Label columns coerce to text in declared order; value columns coerce to
//! f64, one sample per value column per row. A row whose value cannot be
//! coerced (SQL NULL, non-numeric text) is skipped on its own; sibling
//! rows are unaffected.

use crate::collectors::definitions::{MetricDescriptor, MetricKind};
use crate::collectors::error::ScrapeError;
use crate::collectors::query::{CellValue, TableRow};
use tracing::debug;

/// One metric sample ready for exposition.
#[derive(Debug, Clone, PartialEq)]
pub struct Sample {
    pub name: String,
    pub help: String,
    pub kind: MetricKind,
    pub label_names: Vec<String>,
    pub label_values: Vec<String>,
    pub value: f64,
}

/// Mapper output for one descriptor.
#[derive(Debug, Default)]
pub struct MappedRows {
    pub samples: Vec<Sample>,
    pub rows_skipped: u64,
}

/// Map all rows of one descriptor's result set.
///
/// Zero rows is not an error and yields zero samples. A declared value
/// column missing from the result shape fails the whole descriptor; a
/// missing label column renders as an empty label value.
///
/// Duplicate label-value combinations pass through unchanged; collapsing
/// them is left to the exposition layer.
pub fn map_rows(
    descriptor: &MetricDescriptor,
    rows: &[TableRow],
) -> Result<MappedRows, ScrapeError> {
    let mut mapped = MappedRows::default();

    let Some(first) = rows.first() else {
        return Ok(mapped);
    };

    if let Some(column) = descriptor.values.iter().find(|v| !first.has_column(v)) {
        return Err(ScrapeError::Mapping {
            descriptor: descriptor.name.clone(),
            reason: format!("value column '{column}' is missing from the result set"),
        });
    }

    'row: for row in rows {
        let mut values = Vec::with_capacity(descriptor.values.len());

        for column in &descriptor.values {
            match row.get(column).and_then(CellValue::as_value) {
                Some(value) => values.push(value),
                None => {
                    debug!(
                        metric = %descriptor.name,
                        column = %column,
                        "skipping row with unmappable value column"
                    );
                    mapped.rows_skipped += 1;
                    continue 'row;
                }
            }
        }

        let label_values: Vec<String> = descriptor
            .labels
            .iter()
            .map(|column| row.get(column).map(CellValue::as_label).unwrap_or_default())
            .collect();

        for (column, value) in descriptor.values.iter().zip(values) {
            mapped.samples.push(Sample {
                name: descriptor.sample_name(column),
                help: descriptor.help.clone(),
                kind: descriptor.kind,
                label_names: descriptor.labels.clone(),
                label_values: label_values.clone(),
                value,
            });
        }
    }

    Ok(mapped)
}
