//! Column profiling.

use std::collections::BTreeSet;

use crate::input::{Table, Value};

use super::types::{ColumnProfile, ColumnType, NumericSummary, Profile};

/// Single-pass numeric accumulator using Welford's algorithm.
#[derive(Debug, Clone)]
struct StreamingStats {
    count: usize,
    mean: f64,
    m2: f64,
    sum: f64,
    min: f64,
    max: f64,
}

impl StreamingStats {
    fn new() -> Self {
        Self {
            count: 0,
            mean: 0.0,
            m2: 0.0,
            sum: 0.0,
            min: f64::INFINITY,
            max: f64::NEG_INFINITY,
        }
    }

    fn add(&mut self, value: f64) {
        self.count += 1;
        self.sum += value;

        let delta = value - self.mean;
        self.mean += delta / self.count as f64;
        let delta2 = value - self.mean;
        self.m2 += delta * delta2;

        self.min = self.min.min(value);
        self.max = self.max.max(value);
    }

    fn finish(&self) -> Option<NumericSummary> {
        if self.count == 0 {
            return None;
        }
        let variance = if self.count < 2 {
            0.0
        } else {
            self.m2 / self.count as f64
        };
        Some(NumericSummary {
            min: self.min,
            max: self.max,
            mean: self.mean,
            sum: self.sum,
            std: variance.sqrt(),
        })
    }
}

/// Per-column value kind tally.
#[derive(Debug, Default)]
struct KindCounts {
    integer: usize,
    float: usize,
    boolean: usize,
    text: usize,
}

impl KindCounts {
    fn add(&mut self, value: &Value) {
        match value {
            Value::Integer(_) => self.integer += 1,
            Value::Float(_) => self.float += 1,
            Value::Boolean(_) => self.boolean += 1,
            Value::Text(_) => self.text += 1,
            Value::Null => {}
        }
    }

    fn infer(&self) -> ColumnType {
        let numeric = self.integer + self.float;
        let non_null = numeric + self.boolean + self.text;
        if non_null == 0 {
            ColumnType::Empty
        } else if self.integer == non_null {
            ColumnType::Integer
        } else if numeric == non_null {
            ColumnType::Float
        } else if self.boolean == non_null {
            ColumnType::Boolean
        } else if self.text == non_null {
            ColumnType::Text
        } else {
            ColumnType::Mixed
        }
    }
}

/// Computes [`Profile`]s. Stateless and deterministic.
#[derive(Debug, Clone, Copy, Default)]
pub struct Profiler;

impl Profiler {
    pub fn new() -> Self {
        Self
    }

    /// Profile every column of `table`, in column order.
    pub fn profile(&self, table: &Table) -> Profile {
        let row_count = table.row_count();
        let columns = table
            .columns
            .iter()
            .map(|name| self.profile_column(table, name, row_count))
            .collect();

        Profile {
            row_count,
            column_count: table.column_count(),
            columns,
        }
    }

    fn profile_column(&self, table: &Table, name: &str, row_count: usize) -> ColumnProfile {
        let mut kinds = KindCounts::default();
        let mut stats = StreamingStats::new();
        let mut distinct = BTreeSet::new();
        let mut null_count = 0;

        for value in table.column_values(name) {
            if value.is_null() {
                null_count += 1;
                continue;
            }
            kinds.add(value);
            if let Some(x) = value.as_f64() {
                stats.add(x);
            }
            distinct.insert(value.to_string());
        }

        let inferred_type = kinds.infer();
        let numeric = if inferred_type.is_numeric() {
            stats.finish()
        } else {
            None
        };

        ColumnProfile {
            name: name.to_string(),
            inferred_type,
            null_count,
            null_ratio: if row_count == 0 {
                0.0
            } else {
                null_count as f64 / row_count as f64
            },
            unique_count: distinct.len(),
            numeric,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PipelineConfig;
    use crate::input::{FileValidator, Upload};

    fn table(content: &str) -> Table {
        FileValidator::new(&PipelineConfig::default())
            .validate(&Upload::new("t.csv", content))
            .unwrap()
    }

    #[test]
    fn test_numeric_summary() {
        let profile = Profiler::new().profile(&table("units,price\n1,2.5\n2,3.5\n3,6\n"));

        assert_eq!(profile.row_count, 3);
        assert_eq!(profile.column_names(), vec!["units", "price"]);

        let units = profile.column("units").unwrap();
        assert_eq!(units.inferred_type, ColumnType::Integer);
        let n = units.numeric.as_ref().unwrap();
        assert_eq!(n.min, 1.0);
        assert_eq!(n.max, 3.0);
        assert_eq!(n.sum, 6.0);
        assert!((n.mean - 2.0).abs() < 1e-12);

        let price = profile.column("price").unwrap();
        assert_eq!(price.inferred_type, ColumnType::Float);
        assert_eq!(price.numeric.as_ref().unwrap().sum, 12.0);
    }

    #[test]
    fn test_type_inference_and_nulls() {
        let profile = Profiler::new().profile(&table(
            "name,flag,mixed,blank\nAlice,true,1,\nBob,false,x,NA\nNA,true,2,\n",
        ));

        let name = profile.column("name").unwrap();
        assert_eq!(name.inferred_type, ColumnType::Text);
        assert_eq!(name.null_count, 1);
        assert!((name.null_ratio - 1.0 / 3.0).abs() < 1e-12);

        assert_eq!(profile.column("flag").unwrap().inferred_type, ColumnType::Boolean);
        assert_eq!(profile.column("flag").unwrap().unique_count, 2);

        let mixed = profile.column("mixed").unwrap();
        assert_eq!(mixed.inferred_type, ColumnType::Mixed);
        assert!(mixed.numeric.is_none());

        let blank = profile.column("blank").unwrap();
        assert_eq!(blank.inferred_type, ColumnType::Empty);
        assert_eq!(blank.null_ratio, 1.0);
    }

    #[test]
    fn test_empty_table_profile() {
        let profile = Profiler::new().profile(&table("a,b\n"));
        assert_eq!(profile.row_count, 0);
        assert_eq!(profile.column_count, 2);
        for col in &profile.columns {
            assert_eq!(col.null_count, 0);
            assert_eq!(col.null_ratio, 0.0);
            assert_eq!(col.unique_count, 0);
            assert_eq!(col.inferred_type, ColumnType::Empty);
        }
        assert!(profile.numeric_metrics().is_empty());
    }

    #[test]
    fn test_summary_text_is_stable() {
        let t = table("region,units\nNorth,3\nSouth,4\n");
        let a = Profiler::new().profile(&t).summary_text();
        let b = Profiler::new().profile(&t).summary_text();
        assert_eq!(a, b);
        assert_eq!(
            a,
            "Rows: 2, Columns: 2\n\
             - region (text): nulls 0.0000, unique 2\n\
             - units (integer): nulls 0.0000, unique 2, min 3.0000, max 4.0000, mean 3.5000, sum 7.0000\n"
        );
    }

    #[test]
    fn test_numeric_metrics_names() {
        let profile = Profiler::new().profile(&table("units\n1\n3\n"));
        let names: Vec<String> = profile
            .numeric_metrics()
            .into_iter()
            .map(|m| m.name)
            .collect();
        assert_eq!(names, vec!["units.mean", "units.sum", "units.min", "units.max"]);
    }
}
