//! Loading cleaned complaint records from disk

use std::fs;
use std::path::Path;
use tracing::info;

use crag_core::{Error, Record, Result};

/// Load records from a CSV export (`.csv`), a JSON array (`.json`) or a
/// JSON Lines file (anything else)
pub fn load_records(path: impl AsRef<Path>) -> Result<Vec<Record>> {
    let path = path.as_ref();
    if !path.exists() {
        return Err(Error::Configuration(format!(
            "Corpus file not found: {}",
            path.display()
        )));
    }

    let content = fs::read_to_string(path)?;
    let records = match path.extension().and_then(|ext| ext.to_str()) {
        Some("csv") => parse_csv(&content)?,
        Some("json") => serde_json::from_str::<Vec<Record>>(&content).map_err(|e| {
            Error::Serialization(format!("{}: {}", path.display(), e))
        })?,
        _ => parse_json_lines(&content)?,
    };

    info!(path = %path.display(), records = records.len(), "loaded corpus");
    Ok(records)
}

/// Parse a CSV table with a header row; columns other than the record
/// fields are ignored
pub fn parse_csv(content: &str) -> Result<Vec<Record>> {
    let mut reader = csv::Reader::from_reader(content.as_bytes());
    reader
        .deserialize::<Record>()
        .enumerate()
        .map(|(i, row)| row.map_err(|e| Error::Serialization(format!("row {}: {}", i + 1, e))))
        .collect()
}

/// Parse one record per non-blank line
pub fn parse_json_lines(content: &str) -> Result<Vec<Record>> {
    content
        .lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(i, line)| {
            serde_json::from_str::<Record>(line)
                .map_err(|e| Error::Serialization(format!("line {}: {}", i + 1, e)))
        })
        .collect()
}
