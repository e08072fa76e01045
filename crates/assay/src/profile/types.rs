//! Profile types.

use std::fmt::Write as _;

use serde::{Deserialize, Serialize};

use crate::report::Metric;

/// Inferred data type for a column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColumnType {
    /// Whole numbers (no decimal point).
    Integer,
    /// Floating-point numbers, possibly mixed with integers.
    Float,
    /// Boolean values (true/false).
    Boolean,
    /// Text/string values.
    Text,
    /// Numeric and non-numeric values together.
    Mixed,
    /// Every value is null.
    Empty,
}

impl ColumnType {
    /// Returns true if this type is numeric.
    pub fn is_numeric(&self) -> bool {
        matches!(self, ColumnType::Integer | ColumnType::Float)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ColumnType::Integer => "integer",
            ColumnType::Float => "float",
            ColumnType::Boolean => "boolean",
            ColumnType::Text => "text",
            ColumnType::Mixed => "mixed",
            ColumnType::Empty => "empty",
        }
    }
}

/// Statistics for numeric columns.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NumericSummary {
    pub min: f64,
    pub max: f64,
    pub mean: f64,
    pub sum: f64,
    /// Population standard deviation.
    pub std: f64,
}

/// Profile of a single column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnProfile {
    /// Column name.
    pub name: String,
    /// Inferred data type.
    pub inferred_type: ColumnType,
    /// Number of null/missing values.
    pub null_count: usize,
    /// Nulls divided by rows; 0 for an empty table.
    pub null_ratio: f64,
    /// Number of distinct non-null values.
    pub unique_count: usize,
    /// Present for integer and float columns with at least one value.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub numeric: Option<NumericSummary>,
}

/// Deterministic statistical summary of a table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Profile {
    pub row_count: usize,
    pub column_count: usize,
    pub columns: Vec<ColumnProfile>,
}

impl Profile {
    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }

    pub fn column(&self, name: &str) -> Option<&ColumnProfile> {
        self.columns.iter().find(|c| c.name == name)
    }

    /// Plain-text rendering of the profile. Identical profiles render to
    /// identical bytes.
    pub fn summary_text(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(
            out,
            "Rows: {}, Columns: {}",
            self.row_count, self.column_count
        );
        for col in &self.columns {
            let _ = write!(
                out,
                "- {} ({}): nulls {:.4}, unique {}",
                col.name,
                col.inferred_type.as_str(),
                col.null_ratio,
                col.unique_count
            );
            if let Some(ref n) = col.numeric {
                let _ = write!(
                    out,
                    ", min {:.4}, max {:.4}, mean {:.4}, sum {:.4}",
                    n.min, n.max, n.mean, n.sum
                );
            }
            out.push('\n');
        }
        out
    }

    /// Aggregates of numeric columns as named metrics.
    pub fn numeric_metrics(&self) -> Vec<Metric> {
        self.columns
            .iter()
            .filter_map(|c| c.numeric.as_ref().map(|n| (c.name.as_str(), n)))
            .flat_map(|(name, n)| {
                [
                    Metric::new(format!("{}.mean", name), n.mean),
                    Metric::new(format!("{}.sum", name), n.sum),
                    Metric::new(format!("{}.min", name), n.min),
                    Metric::new(format!("{}.max", name), n.max),
                ]
            })
            .collect()
    }
}
