//! CSV record parser
//!
//! The first row is the header; its trimmed entries become the record keys
//! verbatim. Values are trimmed, empty lines skipped, and the column count
//! must match the header on every row. A parse failure rejects the whole
//! source since a resume watermark cannot be derived from a partial parse.

use std::collections::HashMap;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ParseError {
    #[error("unterminated quoted field")]
    UnterminatedQuote,

    #[error(transparent)]
    Csv(#[from] csv::Error),
}

/// One data row keyed by header name
///
/// When a header name repeats, the right-most column wins.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CsvRecord {
    fields: HashMap<String, String>,
}

impl CsvRecord {
    /// Build a record from `(header, value)` pairs; later pairs override earlier ones
    pub fn from_pairs<K, V, I>(pairs: I) -> Self
    where
        K: Into<String>,
        V: Into<String>,
        I: IntoIterator<Item = (K, V)>,
    {
        Self {
            fields: pairs
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }

    pub fn get(&self, header: &str) -> Option<&str> {
        self.fields.get(header).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

/// Parse CSV text into records, one per data row
pub fn parse_records(content: &str) -> Result<Vec<CsvRecord>, ParseError> {
    let content = content.strip_prefix('\u{feff}').unwrap_or(content);

    // The csv reader closes an open quote at EOF instead of failing
    if content.bytes().filter(|b| *b == b'"').count() % 2 != 0 {
        return Err(ParseError::UnterminatedQuote);
    }

    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(false)
        .trim(csv::Trim::All)
        .from_reader(content.as_bytes());

    let headers = reader.headers()?.clone();

    let mut records = Vec::new();
    for row in reader.records() {
        let row = row?;
        records.push(CsvRecord::from_pairs(headers.iter().zip(row.iter())));
    }

    Ok(records)
}
