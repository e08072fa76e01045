//! Upload validation and delimited-text parsing.

use std::collections::{BTreeSet, HashSet};
use std::io::{BufRead, BufReader};

use indexmap::IndexMap;
use tracing::debug;

use crate::config::PipelineConfig;
use crate::error::ValidationError;

use super::table::{Row, Table, Upload, Value};

/// Delimiters to try when auto-detecting.
const DELIMITERS: &[u8] = &[b'\t', b',', b';', b'|'];

/// Checks upload constraints and parses the payload into a [`Table`].
#[derive(Debug, Clone)]
pub struct FileValidator {
    max_file_size: u64,
    allowed_extensions: BTreeSet<String>,
}

impl FileValidator {
    pub fn new(config: &PipelineConfig) -> Self {
        Self {
            max_file_size: config.max_file_size,
            allowed_extensions: config.allowed_extensions.clone(),
        }
    }

    /// Validate an upload and parse it.
    pub fn validate(&self, upload: &Upload) -> Result<Table, ValidationError> {
        let size = upload.size();
        if size > self.max_file_size {
            return Err(ValidationError::TooLarge {
                size,
                limit: self.max_file_size,
            });
        }

        let extension = upload
            .extension()
            .ok_or_else(|| ValidationError::MissingExtension(upload.filename.clone()))?;
        if !self.allowed_extensions.contains(&extension) {
            return Err(ValidationError::DisallowedExtension {
                extension,
                allowed: self
                    .allowed_extensions
                    .iter()
                    .cloned()
                    .collect::<Vec<_>>()
                    .join(", "),
            });
        }

        let delimiter = match extension.as_str() {
            "csv" => b',',
            "tsv" => b'\t',
            _ => detect_delimiter(&upload.bytes)?,
        };

        let table = parse_bytes(&upload.bytes, delimiter)?;
        debug!(
            filename = %upload.filename,
            rows = table.row_count(),
            columns = table.column_count(),
            "upload parsed"
        );
        Ok(table)
    }
}

/// Parse delimited bytes with a header row. Every data row must have exactly
/// as many fields as the header.
fn parse_bytes(bytes: &[u8], delimiter: u8) -> Result<Table, ValidationError> {
    if bytes.iter().all(|b| b.is_ascii_whitespace()) {
        return Err(ValidationError::EmptyFile);
    }

    let mut reader = csv::ReaderBuilder::new()
        .delimiter(delimiter)
        .has_headers(true)
        .flexible(false)
        .trim(csv::Trim::Headers)
        .from_reader(bytes);

    let headers: Vec<String> = reader
        .headers()
        .map_err(|e| malformed(0, &e))?
        .iter()
        .map(|s| s.trim_start_matches('\u{feff}').to_string())
        .collect();

    if headers.is_empty() || headers.iter().all(|h| h.is_empty()) {
        return Err(ValidationError::EmptyFile);
    }

    let mut seen = HashSet::with_capacity(headers.len());
    for header in &headers {
        if !seen.insert(header.as_str()) {
            return Err(ValidationError::DuplicateColumn(header.clone()));
        }
    }

    let mut rows = Vec::new();
    for (idx, result) in reader.records().enumerate() {
        let record = result.map_err(|e| malformed(idx as u64 + 1, &e))?;
        let row: Row = headers
            .iter()
            .zip(record.iter())
            .map(|(name, raw)| (name.clone(), Value::parse(raw)))
            .collect::<IndexMap<_, _>>();
        rows.push(row);
    }

    Ok(Table::new(headers, rows, delimiter))
}

fn malformed(row: u64, err: &csv::Error) -> ValidationError {
    let message = match err.kind() {
        csv::ErrorKind::UnequalLengths {
            expected_len, len, ..
        } => format!("expected {} fields, found {}", expected_len, len),
        csv::ErrorKind::Utf8 { .. } => "invalid UTF-8".to_string(),
        _ => err.to_string(),
    };
    ValidationError::Malformed { row, message }
}

/// Detect the delimiter by analyzing the first few lines.
fn detect_delimiter(bytes: &[u8]) -> Result<u8, ValidationError> {
    let reader = BufReader::new(bytes);
    let lines: Vec<String> = reader
        .lines()
        .take(10)
        .map_while(|l| l.ok())
        .filter(|l| !l.trim().is_empty())
        .collect();

    if lines.is_empty() {
        return Err(ValidationError::EmptyFile);
    }

    let mut best_delimiter = b',';
    let mut best_score = 0;

    for &delim in DELIMITERS {
        let counts: Vec<usize> = lines
            .iter()
            .map(|line| count_delimiter_in_line(line, delim))
            .collect();

        let first_count = counts[0];
        if first_count == 0 {
            continue;
        }

        // Consistent counts across lines beat a higher but ragged count.
        let consistent = counts.iter().all(|&c| c == first_count);
        let score = if consistent {
            first_count * 1000 + if delim == b'\t' { 100 } else { 0 }
        } else {
            first_count
        };

        if score > best_score {
            best_score = score;
            best_delimiter = delim;
        }
    }

    Ok(best_delimiter)
}

/// Count delimiter occurrences in a line, respecting quotes.
fn count_delimiter_in_line(line: &str, delimiter: u8) -> usize {
    let delim_char = delimiter as char;
    let mut count = 0;
    let mut in_quotes = false;

    for ch in line.chars() {
        match ch {
            '"' => in_quotes = !in_quotes,
            c if c == delim_char && !in_quotes => count += 1,
            _ => {}
        }
    }

    count
}

#[cfg(test)]
mod tests {
    use super::*;

    fn validator() -> FileValidator {
        FileValidator::new(
            &PipelineConfig::default()
                .with_max_file_size(1024)
                .with_allowed_extensions(["csv", "tsv", "txt"]),
        )
    }

    #[test]
    fn test_parse_csv() {
        let table = validator()
            .validate(&Upload::new("sales.csv", "region,units,price\nNorth,3,9.5\nSouth,,12\n"))
            .unwrap();

        assert_eq!(table.columns, vec!["region", "units", "price"]);
        assert_eq!(table.row_count(), 2);
        assert_eq!(table.rows[0]["units"], Value::Integer(3));
        assert_eq!(table.rows[1]["units"], Value::Null);
        assert_eq!(table.rows[0]["price"], Value::Float(9.5));
    }

    #[test]
    fn test_tsv_by_extension() {
        let table = validator()
            .validate(&Upload::new("data.tsv", "a\tb\n1\t2\n"))
            .unwrap();
        assert_eq!(table.delimiter, b'\t');
        assert_eq!(table.column_count(), 2);
    }

    #[test]
    fn test_detect_delimiter_for_other_extensions() {
        assert_eq!(detect_delimiter(b"a;b;c\n1;2;3\n4;5;6").unwrap(), b';');
        assert_eq!(detect_delimiter(b"a\tb\tc\n1\t2\t3").unwrap(), b'\t');
        let table = validator()
            .validate(&Upload::new("export.txt", "a|b\n1|2\n"))
            .unwrap();
        assert_eq!(table.delimiter, b'|');
    }

    #[test]
    fn test_too_large() {
        let err = validator()
            .validate(&Upload::new("big.csv", vec![b'a'; 2048]))
            .unwrap_err();
        assert_eq!(
            err,
            ValidationError::TooLarge {
                size: 2048,
                limit: 1024
            }
        );
    }

    #[test]
    fn test_disallowed_extension() {
        let err = validator()
            .validate(&Upload::new("report.xlsx", "a,b\n1,2\n"))
            .unwrap_err();
        assert!(matches!(err, ValidationError::DisallowedExtension { ref extension, .. } if extension == "xlsx"));

        let err = validator()
            .validate(&Upload::new("report", "a,b\n1,2\n"))
            .unwrap_err();
        assert!(matches!(err, ValidationError::MissingExtension(_)));
    }

    #[test]
    fn test_ragged_rows_rejected() {
        let err = validator()
            .validate(&Upload::new("bad.csv", "a,b\n1,2\n3\n"))
            .unwrap_err();
        assert!(matches!(err, ValidationError::Malformed { row: 2, .. }));
    }

    #[test]
    fn test_header_only_is_empty_table() {
        let table = validator().validate(&Upload::new("h.csv", "a,b\n")).unwrap();
        assert_eq!(table.row_count(), 0);
        assert_eq!(table.column_count(), 2);
    }

    #[test]
    fn test_empty_and_duplicate_headers() {
        assert_eq!(
            validator().validate(&Upload::new("e.csv", "")).unwrap_err(),
            ValidationError::EmptyFile
        );
        assert_eq!(
            validator().validate(&Upload::new("d.csv", "a,a\n1,2\n")).unwrap_err(),
            ValidationError::DuplicateColumn("a".to_string())
        );
    }

    #[test]
    fn test_invalid_utf8_rejected() {
        let err = validator()
            .validate(&Upload::new("bin.csv", vec![b'a', b',', b'b', b'\n', 0xff, b',', b'1', b'\n']))
            .unwrap_err();
        assert!(matches!(err, ValidationError::Malformed { .. }));
    }
}
