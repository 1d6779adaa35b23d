//! Delimited text reader with encoding and delimiter auto-detection.

use crate::error::{IngestError, IngestResult};
use crate::models::RawCell;

use super::{normalize_headers, RawTable, SourceFormat, SourceInfo};

/// Detect the encoding of raw bytes using chardet
pub fn detect_encoding(bytes: &[u8]) -> String {
    let result = chardet::detect(bytes);
    let charset = result.0;

    // Normalize charset names
    match charset.to_lowercase().as_str() {
        "" | "ascii" | "utf-8" | "utf8" | "utf-8-sig" => "utf-8".to_string(),
        "iso-8859-1" | "iso-8859-15" | "latin-1" | "latin1" => "iso-8859-1".to_string(),
        "windows-1252" | "cp1252" => "windows-1252".to_string(),
        other => other.to_string(),
    }
}

/// Decode bytes to a string using the given encoding label.
///
/// A leading UTF-8 byte order mark is dropped so it does not end up in the
/// first header name.
pub fn decode_content(bytes: &[u8], encoding: &str) -> IngestResult<String> {
    let bytes = bytes.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(bytes);

    let decoded = match encoding {
        "utf-8" => match std::str::from_utf8(bytes) {
            Ok(s) => s.to_string(),
            // chardet said UTF-8 but the bytes disagree: Latin-1 never fails
            Err(_) => encoding_rs::WINDOWS_1252.decode(bytes).0.into_owned(),
        },
        "iso-8859-1" => encoding_rs::ISO_8859_15.decode(bytes).0.into_owned(),
        "windows-1252" => encoding_rs::WINDOWS_1252.decode(bytes).0.into_owned(),
        label => match encoding_rs::Encoding::for_label(label.as_bytes()) {
            Some(enc) => enc.decode(bytes).0.into_owned(),
            // Fallback: UTF-8 with lossy conversion
            None => String::from_utf8_lossy(bytes).into_owned(),
        },
    };

    Ok(decoded)
}

/// Detect the delimiter by counting occurrences in the first line.
///
/// Comma wins ties and is used when no candidate appears at all.
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

/// Parse delimited text bytes with auto-detected encoding and delimiter.
pub fn parse_delimited(bytes: &[u8]) -> IngestResult<RawTable> {
    let encoding = detect_encoding(bytes);
    let content = decode_content(bytes, &encoding)?;
    if content.trim().is_empty() {
        return Err(IngestError::EmptyInput);
    }

    let delimiter = detect_delimiter(&content);
    parse_str(&content, delimiter, encoding)
}

/// Parse already-decoded text with an explicit delimiter.
///
/// Short rows are padded with empty cells and surplus cells are dropped.
/// Rows whose cells are all empty are skipped.
pub fn parse_str(content: &str, delimiter: char, encoding: String) -> IngestResult<RawTable> {
    let delimiter_byte = u8::try_from(delimiter)
        .map_err(|_| IngestError::Encoding(format!("delimiter '{}' is not ASCII", delimiter)))?;

    let mut reader = csv::ReaderBuilder::new()
        .delimiter(delimiter_byte)
        .has_headers(false)
        .flexible(true)
        .from_reader(content.as_bytes());

    let mut records = reader.records();

    let header_record = records
        .next()
        .ok_or(IngestError::EmptyInput)?
        .map_err(csv_error)?;
    let headers = normalize_headers(header_record.iter().map(str::to_string).collect())?;

    let mut rows = Vec::new();
    for record in records {
        let record = record.map_err(csv_error)?;
        if record.iter().all(str::is_empty) {
            continue;
        }

        let row: Vec<RawCell> = (0..headers.len())
            .map(|i| record.get(i).map(RawCell::text).unwrap_or(RawCell::Empty))
            .collect();
        rows.push(row);
    }

    let info = SourceInfo {
        format: SourceFormat::Csv,
        encoding: Some(encoding),
        delimiter: Some(delimiter),
        sheet: None,
        headers: headers.clone(),
        row_count: rows.len(),
    };

    Ok(RawTable { headers, rows, info })
}

fn csv_error(err: csv::Error) -> IngestError {
    let line = err.position().map(|p| p.line()).unwrap_or(0);
    IngestError::Csv {
        line,
        message: err.to_string(),
    }
}
