//! CSV / JSON ingest.
//!
//! Turns the text of a data file into a [`Dataset`]. CSV support is the
//! plain comma-split form (header row first, no quoting); JSON must be an
//! array of flat objects.

use std::path::Path;

use qi_core::error::{QiError, Result};
use qi_core::models::{Cell, Dataset, Row};
use serde_json::Value;
use tracing::{debug, warn};

/// Supported input encodings, chosen by file extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataFormat {
    Csv,
    Json,
}

impl DataFormat {
    /// Pick the format from a file name. Only `.csv` and `.json` (any case)
    /// are accepted.
    pub fn from_filename(filename: &str) -> Result<Self> {
        let lower = filename.to_lowercase();
        if lower.ends_with(".json") {
            Ok(DataFormat::Json)
        } else if lower.ends_with(".csv") {
            Ok(DataFormat::Csv)
        } else {
            Err(QiError::UnsupportedFormat(filename.to_string()))
        }
    }
}

// ── Public API ────────────────────────────────────────────────────────────────

/// Parse `content` according to the extension of `filename`.
///
/// Fails on an unsupported extension, malformed JSON, or when the result has
/// no rows.
pub fn parse_content(content: &str, filename: &str) -> Result<Dataset> {
    let dataset = match DataFormat::from_filename(filename)? {
        DataFormat::Csv => parse_csv(content),
        DataFormat::Json => parse_json(content)?,
    };

    if dataset.is_empty() {
        return Err(QiError::EmptyDataset(filename.to_string()));
    }

    debug!(
        rows = dataset.len(),
        columns = dataset.columns().len(),
        "parsed {}",
        filename
    );
    Ok(dataset)
}

/// Read and parse a data file from disk.
pub fn load_file(path: &Path) -> Result<Dataset> {
    let content = std::fs::read_to_string(path).map_err(|source| QiError::FileRead {
        path: path.to_path_buf(),
        source,
    })?;
    parse_content(&content, &path.to_string_lossy())
}

/// Parse comma-separated text. The first non-empty line is the header.
///
/// Short rows are padded with empty cells; extra trailing fields are
/// ignored. Each cell is trimmed and becomes a number when it parses as one.
pub fn parse_csv(content: &str) -> Dataset {
    let mut lines = content
        .trim()
        .lines()
        .map(|l| l.trim_end_matches('\r'));

    let Some(header_line) = lines.next() else {
        return Dataset::empty();
    };
    let headers: Vec<String> = header_line
        .split(',')
        .map(|h| h.trim().to_string())
        .collect();

    let rows: Vec<Row> = lines
        .filter(|line| !line.trim().is_empty())
        .map(|line| {
            let mut fields = line.split(',');
            headers
                .iter()
                .map(|h| (h.clone(), fields.next().map(Cell::parse).unwrap_or_default()))
                .collect()
        })
        .collect();

    Dataset::new(headers, rows)
}

/// Parse a JSON array of flat objects. Non-object elements are skipped with
/// a warning.
pub fn parse_json(content: &str) -> Result<Dataset> {
    let value: Value = serde_json::from_str(content)?;
    let Value::Array(items) = value else {
        return Err(QiError::InvalidShape(
            "expected a JSON array of objects".to_string(),
        ));
    };

    let mut records = Vec::with_capacity(items.len());
    for (index, item) in items.into_iter().enumerate() {
        match item {
            Value::Object(map) => records.push(map),
            other => warn!(index, "skipping non-object JSON element: {}", other),
        }
    }

    Ok(Dataset::from_records(&records))
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    // ── DataFormat ────────────────────────────────────────────────────────────

    #[test]
    fn test_format_from_filename() {
        assert_eq!(DataFormat::from_filename("qi-data.csv").unwrap(), DataFormat::Csv);
        assert_eq!(DataFormat::from_filename("QI.JSON").unwrap(), DataFormat::Json);
        assert!(matches!(
            DataFormat::from_filename("qi.xlsx"),
            Err(QiError::UnsupportedFormat(_))
        ));
    }

    // ── parse_csv ─────────────────────────────────────────────────────────────

    #[test]
    fn test_parse_csv_basic() {
        let ds = parse_csv("date, A ,unit\n2024-01-01,10,PICU\n2024-01-02,12.5,NICU\n");
        assert_eq!(ds.columns(), &["date".to_string(), "A".to_string(), "unit".to_string()]);
        assert_eq!(ds.len(), 2);
        assert_eq!(ds.cell(0, "date"), &Cell::Text("2024-01-01".into()));
        assert_eq!(ds.cell(1, "A"), &Cell::Number(12.5));
        assert_eq!(ds.cell(1, "unit"), &Cell::Text("NICU".into()));
    }

    #[test]
    fn test_parse_csv_crlf_and_blank_lines() {
        let ds = parse_csv("date,A\r\n2024-01-01,1\r\n\r\n2024-01-02,2\r\n");
        assert_eq!(ds.len(), 2);
        assert_eq!(ds.cell(1, "A"), &Cell::Number(2.0));
    }

    #[test]
    fn test_parse_csv_short_row_and_bad_numbers_degrade_per_cell() {
        let ds = parse_csv("date,A,B\n2024-01-01,n/a\n");
        assert_eq!(ds.cell(0, "A"), &Cell::Text("n/a".into()));
        assert_eq!(ds.cell(0, "B"), &Cell::Empty);
    }

    #[test]
    fn test_parse_csv_header_only() {
        let ds = parse_csv("date,A\n");
        assert!(ds.is_empty());
        assert_eq!(ds.columns().len(), 2);
    }

    // ── parse_json ────────────────────────────────────────────────────────────

    #[test]
    fn test_parse_json_array_of_objects() {
        let ds = parse_json(r#"[{"date":"2024-01-01","A":10},{"date":"2024-01-08","A":"12"}]"#)
            .unwrap();
        assert_eq!(ds.columns(), &["date".to_string(), "A".to_string()]);
        assert_eq!(ds.series("A"), vec![Some(10.0), Some(12.0)]);
    }

    #[test]
    fn test_parse_json_rejects_non_array() {
        let err = parse_json(r#"{"date":"2024-01-01"}"#).unwrap_err();
        assert!(matches!(err, QiError::InvalidShape(_)));
    }

    #[test]
    fn test_parse_json_malformed() {
        assert!(matches!(parse_json("[{"), Err(QiError::JsonParse(_))));
    }

    // ── parse_content ─────────────────────────────────────────────────────────

    #[test]
    fn test_parse_content_empty_is_error() {
        let err = parse_content("date,A\n", "empty.csv").unwrap_err();
        assert!(matches!(err, QiError::EmptyDataset(_)));

        let err = parse_content("[]", "empty.json").unwrap_err();
        assert!(matches!(err, QiError::EmptyDataset(_)));
    }

    #[test]
    fn test_parse_content_unsupported_extension() {
        let err = parse_content("date,A\n2024-01-01,1", "data.txt").unwrap_err();
        assert!(matches!(err, QiError::UnsupportedFormat(_)));
    }

    // ── load_file ─────────────────────────────────────────────────────────────

    #[test]
    fn test_load_file_reads_from_disk() {
        let tmp = TempDir::new().expect("tempdir");
        let path = tmp.path().join("qi-data.csv");
        std::fs::write(&path, "date,ABX_RATE\n2024-01-01,20\n").unwrap();

        let ds = load_file(&path).unwrap();
        assert_eq!(ds.series("ABX_RATE"), vec![Some(20.0)]);
    }

    #[test]
    fn test_load_file_missing() {
        let tmp = TempDir::new().expect("tempdir");
        let err = load_file(&tmp.path().join("nope.csv")).unwrap_err();
        assert!(matches!(err, QiError::FileRead { .. }));
    }
}
