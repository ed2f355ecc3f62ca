//! Query execution and row decoding.
//!
//! The engine runs arbitrary user-declared SQL, so result columns have no
//! fixed schema. Each cell is decoded into a [`CellValue`] keyed by the
//! column name, giving the mapper explicit named-column access with
//! well-defined coercions instead of driver-specific dynamic types.

use crate::collectors::definitions::MetricDescriptor;
use crate::collectors::error::ScrapeError;
use crate::collectors::i64_to_f64;
use sqlx::postgres::{PgPool, PgRow};
use sqlx::types::BigDecimal;
use sqlx::{Column, Row, TypeInfo, ValueRef};
use std::time::Duration;
use tokio::time::timeout;
use tracing::info_span;
use tracing_futures::Instrument as _;

/// One decoded result cell.
#[derive(Debug, Clone, PartialEq)]
pub enum CellValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    /// A column type the decoder does not handle (arrays, ranges, ...).
    /// Carries the PostgreSQL type name for diagnostics.
    Unsupported(String),
}

impl CellValue {
    /// Coerce to a label value. NULL and undecodable cells become the
    /// empty string.
    #[must_use]
    pub fn as_label(&self) -> String {
        match self {
            Self::Null | Self::Unsupported(_) => String::new(),
            Self::Bool(b) => b.to_string(),
            Self::Int(i) => i.to_string(),
            Self::Float(f) => f.to_string(),
            Self::Text(s) => s.clone(),
        }
    }

    /// Coerce to a sample value. `None` means the owning row cannot be
    /// mapped: NULL, non-numeric text, or an unsupported column type.
    #[must_use]
    pub fn as_value(&self) -> Option<f64> {
        match self {
            Self::Null | Self::Unsupported(_) => None,
            Self::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
            Self::Int(i) => Some(i64_to_f64(*i)),
            Self::Float(f) => Some(*f),
            Self::Text(s) => s.trim().parse::<f64>().ok(),
        }
    }
}

/// One result row with lowercase column names in query order.
#[derive(Debug, Clone)]
pub struct TableRow {
    columns: Vec<String>,
    cells: Vec<CellValue>,
}

impl TableRow {
    #[must_use]
    pub fn new(columns: Vec<String>, cells: Vec<CellValue>) -> Self {
        Self { columns, cells }
    }

    /// Cell for a (lowercase) column name; the first match wins when a
    /// query yields duplicate column names.
    #[must_use]
    pub fn get(&self, column: &str) -> Option<&CellValue> {
        self.columns
            .iter()
            .position(|c| c == column)
            .and_then(|i| self.cells.get(i))
    }

    #[must_use]
    pub fn has_column(&self, column: &str) -> bool {
        self.columns.iter().any(|c| c == column)
    }
}

fn decode_cell(row: &PgRow, index: usize) -> CellValue {
    let Ok(raw) = row.try_get_raw(index) else {
        return CellValue::Unsupported("unreadable".to_string());
    };

    if raw.is_null() {
        return CellValue::Null;
    }

    let type_name = raw.type_info().name().to_string();

    match type_name.as_str() {
        "BOOL" => row
            .try_get::<bool, _>(index)
            .map_or_else(|_| CellValue::Unsupported(type_name), CellValue::Bool),
        "INT2" => row
            .try_get::<i16, _>(index)
            .map_or_else(|_| CellValue::Unsupported(type_name), |v| {
                CellValue::Int(i64::from(v))
            }),
        "INT4" => row
            .try_get::<i32, _>(index)
            .map_or_else(|_| CellValue::Unsupported(type_name), |v| {
                CellValue::Int(i64::from(v))
            }),
        "INT8" => row
            .try_get::<i64, _>(index)
            .map_or_else(|_| CellValue::Unsupported(type_name), CellValue::Int),
        "FLOAT4" => row
            .try_get::<f32, _>(index)
            .map_or_else(|_| CellValue::Unsupported(type_name), |v| {
                CellValue::Float(f64::from(v))
            }),
        "FLOAT8" => row
            .try_get::<f64, _>(index)
            .map_or_else(|_| CellValue::Unsupported(type_name), CellValue::Float),
        // NUMERIC has no lossless binary mapping; go through its decimal
        // rendering, which f64 parses.
        "NUMERIC" => row.try_get::<BigDecimal, _>(index).map_or_else(
            |_| CellValue::Unsupported(type_name),
            |v| {
                v.to_string()
                    .parse::<f64>()
                    .map_or(CellValue::Null, CellValue::Float)
            },
        ),
        "TEXT" | "VARCHAR" | "CHAR" | "NAME" => row
            .try_get::<String, _>(index)
            .map_or_else(|_| CellValue::Unsupported(type_name), CellValue::Text),
        _ => CellValue::Unsupported(type_name),
    }
}

fn decode_row(row: &PgRow) -> TableRow {
    let columns = row
        .columns()
        .iter()
        .map(|c| c.name().to_lowercase())
        .collect();

    let cells = (0..row.columns().len())
        .map(|i| decode_cell(row, i))
        .collect();

    TableRow::new(columns, cells)
}

/// Run one descriptor's query under the given deadline.
///
/// The pooled connection is acquired inside the deadline and released on
/// every exit path, including timeout (dropping the future returns it to
/// the pool).
pub async fn execute(
    pool: &PgPool,
    descriptor: &MetricDescriptor,
    deadline: Duration,
) -> Result<Vec<TableRow>, ScrapeError> {
    let run = async {
        let mut conn = pool.acquire().await.map_err(ScrapeError::Connection)?;

        let query_span = info_span!(
            "db.query",
            otel.kind = "client",
            db.system = "postgresql",
            db.statement = %descriptor.query,
            metric = %descriptor.name,
        );

        let rows = sqlx::query(&descriptor.query)
            // user-declared SQL; keep it out of the prepared-statement cache
            .persistent(false)
            .fetch_all(&mut *conn)
            .instrument(query_span)
            .await
            .map_err(|source| ScrapeError::Query {
                descriptor: descriptor.name.clone(),
                source,
            })?;

        Ok(rows.iter().map(decode_row).collect())
    };

    match timeout(deadline, run).await {
        Ok(result) => result,
        Err(_) => Err(ScrapeError::Timeout {
            descriptor: descriptor.name.clone(),
            timeout: deadline,
        }),
    }
}
