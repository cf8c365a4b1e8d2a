use super::{log_record_set_info, records_from_json};
use crate::error::{EtlError, Result};
use crate::types::{Extractor, RecordSet};
use std::path::PathBuf;
use tracing::{info, instrument};

/// Reads hospital resource data from a JSON file.
pub struct JsonExtractor {
    path: PathBuf,
}

impl JsonExtractor {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait::async_trait]
impl Extractor for JsonExtractor {
    fn source_name(&self) -> &str {
        "json"
    }

    #[instrument(skip(self), fields(path = %self.path.display()))]
    async fn extract(&self) -> Result<RecordSet> {
        info!("Extracting data from JSON file: {}", self.path.display());
        if !self.path.exists() {
            return Err(EtlError::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("JSON file not found: {}", self.path.display()),
            )));
        }

        let content = tokio::fs::read(&self.path).await?;
        let payload: serde_json::Value = serde_json::from_slice(&content)?;
        let records = records_from_json(&payload);
        log_record_set_info(&records, "JSON data");
        info!("Successfully extracted {} records from JSON", records.len());
        Ok(records)
    }
}
