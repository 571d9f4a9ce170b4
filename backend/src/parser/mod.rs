//! CSV ingestion with encoding and delimiter auto-detection.
//!
//! Turns uploaded bytes into a [`Dataset`]: ordered headers plus one JSON
//! object per record, every cell kept as a string. Quoted fields follow
//! RFC 4180 (handled by the `csv` crate).

use serde_json::Value;
use std::path::Path;

use crate::error::{CsvError, CsvResult};
use crate::models::{Dataset, SourceRow};

/// Result of parsing with metadata
#[derive(Debug, Clone)]
pub struct ParseResult {
    pub dataset: Dataset,
    /// Detected or used encoding
    pub encoding: String,
    /// Detected or used delimiter
    pub delimiter: char,
}

/// Detect the encoding of raw bytes using chardet
pub fn detect_encoding(bytes: &[u8]) -> String {
    let result = chardet::detect(bytes);
    let charset = result.0;

    match charset.to_lowercase().as_str() {
        "ascii" | "utf-8" | "utf8" | "" => "utf-8".to_string(),
        "iso-8859-1" | "iso-8859-15" | "latin-1" | "latin1" => "iso-8859-1".to_string(),
        "windows-1252" | "cp1252" => "windows-1252".to_string(),
        _ => charset,
    }
}

/// Decode bytes to string using the specified encoding
pub fn decode_content(bytes: &[u8], encoding: &str) -> CsvResult<String> {
    let text = match encoding.to_lowercase().as_str() {
        "iso-8859-1" | "latin-1" | "latin1" => encoding_rs::ISO_8859_15.decode(bytes).0.into_owned(),
        "windows-1252" | "cp1252" => encoding_rs::WINDOWS_1252.decode(bytes).0.into_owned(),
        "utf-16le" | "utf-16" => {
            let (text, _, had_errors) = encoding_rs::UTF_16LE.decode(bytes);
            if had_errors {
                return Err(CsvError::Encoding("invalid UTF-16 sequence".to_string()));
            }
            text.into_owned()
        }
        _ => String::from_utf8_lossy(bytes).into_owned(),
    };

    Ok(text.trim_start_matches('\u{feff}').to_string())
}

/// Detect the delimiter by counting occurrences in the first line
pub fn detect_delimiter(content: &str) -> char {
    let first_line = content.lines().next().unwrap_or("");

    let separators = [',', ';', '\t', '|'];
    let mut best_sep = ',';
    let mut best_count = 0;

    for &sep in &separators {
        let count = first_line.matches(sep).count();
        if count > best_count {
            best_count = count;
            best_sep = sep;
        }
    }

    best_sep
}

/// Parse CSV text with an explicit delimiter.
///
/// # Example
/// ```ignore
/// use datamend::parser::parse_str;
///
/// let dataset = parse_str("name,age\nAlice,30\nBob,25", ',').unwrap();
///
/// assert_eq!(dataset.headers, vec!["name", "age"]);
/// assert_eq!(dataset.rows[0]["age"], "30");
/// ```
pub fn parse_str(content: &str, delimiter: char) -> CsvResult<Dataset> {
    if content.trim().is_empty() {
        return Err(CsvError::EmptyFile);
    }

    let delimiter = u8::try_from(delimiter)
        .map_err(|_| CsvError::Parse { line: 1, message: format!("unsupported delimiter '{}'", delimiter) })?;

    let mut reader = csv::ReaderBuilder::new()
        .delimiter(delimiter)
        .flexible(true)
        .trim(csv::Trim::Headers)
        .from_reader(content.as_bytes());

    let headers: Vec<String> = reader
        .headers()
        .map_err(|e| parse_error(&e, 1))?
        .iter()
        .map(|h| h.to_string())
        .collect();

    if headers.iter().all(|h| h.is_empty()) {
        return Err(CsvError::NoHeaders);
    }

    let mut rows = Vec::new();
    for (idx, record) in reader.records().enumerate() {
        let record = record.map_err(|e| parse_error(&e, idx as u64 + 2))?;

        if record.iter().all(|cell| cell.trim().is_empty()) {
            continue;
        }

        let mut row = SourceRow::new();
        for (i, header) in headers.iter().enumerate() {
            let cell = record.get(i).unwrap_or("");
            row.insert(header.clone(), Value::String(cell.to_string()));
        }
        rows.push(row);
    }

    Ok(Dataset::new(headers, rows))
}

fn parse_error(err: &csv::Error, fallback_line: u64) -> CsvError {
    let line = err.position().map(|p| p.line()).unwrap_or(fallback_line);
    CsvError::Parse { line, message: err.to_string() }
}

/// Parse CSV bytes with auto-detection of encoding and delimiter.
pub fn parse_bytes_auto(bytes: &[u8]) -> CsvResult<ParseResult> {
    if bytes.is_empty() {
        return Err(CsvError::EmptyFile);
    }

    let encoding = detect_encoding(bytes);
    let content = decode_content(bytes, &encoding)?;
    let delimiter = detect_delimiter(&content);
    let dataset = parse_str(&content, delimiter)?;

    tracing::debug!(
        %encoding,
        delimiter = %delimiter,
        rows = dataset.len(),
        columns = dataset.headers.len(),
        "parsed csv"
    );

    Ok(ParseResult { dataset, encoding, delimiter })
}

/// Parse CSV file with auto-detection of encoding and delimiter.
pub fn parse_file_auto<P: AsRef<Path>>(path: P) -> CsvResult<ParseResult> {
    let bytes = std::fs::read(path.as_ref())?;
    parse_bytes_auto(&bytes)
}
