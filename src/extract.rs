use std::path::Path;

use tracing::info;

use crate::error::{EtlError, Result};
use crate::model::SourceRecord;

/// Reads the full source export into memory.
///
/// The upstream export is Latin-1 encoded, so the bytes are decoded before
/// they reach the CSV reader. The whole file is materialized at once; this
/// is a single-pass batch job, not a streaming one.
pub fn read_source(path: &Path) -> Result<Vec<SourceRecord>> {
    if !path.exists() {
        return Err(EtlError::Config(format!(
            "source file not found at {}",
            path.display()
        )));
    }

    let bytes = std::fs::read(path)?;
    let text = encoding_rs::mem::decode_latin1(&bytes);

    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_reader(text.as_bytes());

    let mut records = Vec::new();
    for row in reader.deserialize() {
        let record: SourceRecord = row?;
        records.push(record);
    }

    info!("Extracted {} raw rows from {}", records.len(), path.display());
    Ok(records)
}
