use super::log_record_set_info;
use crate::error::{EtlError, Result};
use crate::types::{Extractor, Record, RecordSet, Value};
use std::io::Read;
use std::path::PathBuf;
use tracing::{info, instrument};

/// Reads case data from a headed CSV file.
pub struct CsvExtractor {
    path: PathBuf,
}

impl CsvExtractor {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Parse headed CSV text. Headers and cells are trimmed; cells are typed
    /// with `Value::parse_cell`.
    pub fn parse<R: Read>(reader: R) -> Result<RecordSet> {
        let mut reader = csv::ReaderBuilder::new()
            .flexible(true)
            .trim(csv::Trim::All)
            .from_reader(reader);

        let headers: Vec<String> = reader.headers()?.iter().map(|h| h.to_string()).collect();
        let mut records = RecordSet::with_columns(headers.iter().cloned());

        for row in reader.records() {
            let row = row?;
            let record: Record = headers
                .iter()
                .enumerate()
                .map(|(i, h)| (h.clone(), row.get(i).map(Value::parse_cell).unwrap_or(Value::Null)))
                .collect();
            records.push_row(record);
        }
        Ok(records)
    }
}

#[async_trait::async_trait]
impl Extractor for CsvExtractor {
    fn source_name(&self) -> &str {
        "csv"
    }

    #[instrument(skip(self), fields(path = %self.path.display()))]
    async fn extract(&self) -> Result<RecordSet> {
        info!("Extracting data from CSV file: {}", self.path.display());
        if !self.path.exists() {
            return Err(EtlError::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("CSV file not found: {}", self.path.display()),
            )));
        }

        let content = tokio::fs::read(&self.path).await?;
        let records = Self::parse(content.as_slice())?;
        log_record_set_info(&records, "CSV data");
        info!("Successfully extracted {} records from CSV", records.len());
        Ok(records)
    }
}
