//! Uploaded payloads and the structured table parsed from them.

use std::fmt;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Raw upload as received from the caller.
#[derive(Debug, Clone)]
pub struct Upload {
    /// Declared file name. Informational apart from its extension.
    pub filename: String,
    /// File contents.
    pub bytes: Vec<u8>,
}

impl Upload {
    pub fn new(filename: impl Into<String>, bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            filename: filename.into(),
            bytes: bytes.into(),
        }
    }

    /// Declared size in bytes.
    pub fn size(&self) -> u64 {
        self.bytes.len() as u64
    }

    /// Content fingerprint used for deduplication.
    pub fn fingerprint(&self) -> String {
        fingerprint(&self.bytes)
    }

    /// Lowercase extension of the declared file name.
    pub fn extension(&self) -> Option<String> {
        let name = self.filename.rsplit(['/', '\\']).next().unwrap_or(&self.filename);
        let (stem, ext) = name.rsplit_once('.')?;
        if stem.is_empty() || ext.is_empty() {
            return None;
        }
        Some(ext.to_ascii_lowercase())
    }
}

/// SHA-256 fingerprint of raw bytes, formatted `sha256:<hex>`.
pub fn fingerprint(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("sha256:{:x}", hasher.finalize())
}

/// A typed cell value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Null,
    Boolean(bool),
    Integer(i64),
    Float(f64),
    Text(String),
}

impl Value {
    /// Type a raw cell.
    pub fn parse(raw: &str) -> Self {
        let trimmed = raw.trim();
        if is_null_value(trimmed) {
            return Value::Null;
        }
        if let Ok(i) = trimmed.parse::<i64>() {
            return Value::Integer(i);
        }
        if let Ok(f) = trimmed.parse::<f64>() {
            if f.is_finite() {
                return Value::Float(f);
            }
        }
        if trimmed.eq_ignore_ascii_case("true") {
            return Value::Boolean(true);
        }
        if trimmed.eq_ignore_ascii_case("false") {
            return Value::Boolean(false);
        }
        Value::Text(trimmed.to_string())
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Numeric view of integer and float cells.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Integer(i) => Some(*i as f64),
            Value::Float(f) => Some(*f),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "null"),
            Value::Boolean(b) => write!(f, "{}", b),
            Value::Integer(i) => write!(f, "{}", i),
            Value::Float(x) => write!(f, "{}", x),
            Value::Text(s) => write!(f, "{}", s),
        }
    }
}

/// Check if a value represents a missing/null value.
pub fn is_null_value(value: &str) -> bool {
    let trimmed = value.trim();
    trimmed.is_empty()
        || trimmed.eq_ignore_ascii_case("na")
        || trimmed.eq_ignore_ascii_case("n/a")
        || trimmed.eq_ignore_ascii_case("nan")
        || trimmed.eq_ignore_ascii_case("null")
        || trimmed.eq_ignore_ascii_case("none")
        || trimmed.eq_ignore_ascii_case("nil")
        || trimmed == "."
        || trimmed == "-"
}

/// One row: column name to typed value, in column order.
pub type Row = IndexMap<String, Value>;

/// Parsed tabular data.
#[derive(Debug, Clone, PartialEq)]
pub struct Table {
    /// Column names in file order.
    pub columns: Vec<String>,
    /// Rows in file order.
    pub rows: Vec<Row>,
    /// The delimiter used.
    pub delimiter: u8,
}

impl Table {
    pub fn new(columns: Vec<String>, rows: Vec<Row>, delimiter: u8) -> Self {
        Self {
            columns,
            rows,
            delimiter,
        }
    }

    /// Number of data rows (excluding header).
    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn column_count(&self) -> usize {
        self.columns.len()
    }

    /// All values of a column, in row order. Missing cells read as null.
    pub fn column_values<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a Value> + 'a {
        self.rows
            .iter()
            .map(move |row| row.get(name).unwrap_or(&Value::Null))
    }

    /// The first `n` rows.
    pub fn head(&self, n: usize) -> &[Row] {
        &self.rows[..n.min(self.rows.len())]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_null_value() {
        assert!(is_null_value(""));
        assert!(is_null_value("NA"));
        assert!(is_null_value("na"));
        assert!(is_null_value("N/A"));
        assert!(is_null_value("NaN"));
        assert!(is_null_value("null"));
        assert!(is_null_value("."));
        assert!(!is_null_value("value"));
        assert!(!is_null_value("0"));
    }

    #[test]
    fn test_value_typing() {
        assert_eq!(Value::parse(" 42 "), Value::Integer(42));
        assert_eq!(Value::parse("-3.5"), Value::Float(-3.5));
        assert_eq!(Value::parse("TRUE"), Value::Boolean(true));
        assert_eq!(Value::parse("inf"), Value::Text("inf".to_string()));
        assert_eq!(Value::parse("NA"), Value::Null);
        assert_eq!(Value::parse("Widget"), Value::Text("Widget".to_string()));
    }

    #[test]
    fn test_value_serializes_untagged() {
        let row: Row = [
            ("a".to_string(), Value::Integer(1)),
            ("b".to_string(), Value::Null),
            ("c".to_string(), Value::Text("x".to_string())),
        ]
        .into_iter()
        .collect();
        assert_eq!(
            serde_json::to_string(&row).unwrap(),
            r#"{"a":1,"b":null,"c":"x"}"#
        );
    }

    #[test]
    fn test_extension() {
        assert_eq!(Upload::new("sales.CSV", vec![]).extension().as_deref(), Some("csv"));
        assert_eq!(Upload::new("dir.v2/report", vec![]).extension(), None);
        assert_eq!(Upload::new(".hidden", vec![]).extension(), None);
        assert_eq!(Upload::new("archive.tar.tsv", vec![]).extension().as_deref(), Some("tsv"));
    }

    #[test]
    fn test_fingerprint_is_content_derived() {
        let a = Upload::new("a.csv", b"x,y\n1,2\n".to_vec());
        let b = Upload::new("b.csv", b"x,y\n1,2\n".to_vec());
        assert_eq!(a.fingerprint(), b.fingerprint());
        assert!(a.fingerprint().starts_with("sha256:"));
        assert_ne!(a.fingerprint(), fingerprint(b"x,y\n1,3\n"));
    }
}
