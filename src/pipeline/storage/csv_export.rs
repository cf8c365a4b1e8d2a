use super::sqlite::SqliteLoader;
use crate::error::{EtlError, Result};
use crate::types::RecordSet;
use chrono::Local;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Where an export lands: a fixed file, or a timestamped file
/// `<prefix>_YYYYmmdd_HHMMSS.csv` inside a directory.
#[derive(Debug, Clone, PartialEq)]
pub enum ExportTarget {
    File(PathBuf),
    Timestamped { output_dir: PathBuf, prefix: String },
}

impl ExportTarget {
    pub fn timestamped(output_dir: impl Into<PathBuf>, prefix: impl Into<String>) -> Self {
        ExportTarget::Timestamped {
            output_dir: output_dir.into(),
            prefix: prefix.into(),
        }
    }

    fn resolve(&self) -> PathBuf {
        match self {
            ExportTarget::File(path) => path.clone(),
            ExportTarget::Timestamped { output_dir, prefix } => {
                let timestamp = Local::now().format("%Y%m%d_%H%M%S");
                output_dir.join(format!("{}_{}.csv", prefix, timestamp))
            }
        }
    }
}

fn write_csv(records: &RecordSet, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    let mut writer = csv::Writer::from_path(path)?;
    writer.write_record(records.columns())?;
    for i in 0..records.len() {
        let row = records
            .columns()
            .iter()
            .map(|c| records.get(i, c).render().unwrap_or_default());
        writer.write_record(row)?;
    }
    writer.flush()?;
    Ok(())
}

/// Write `records` as CSV and return the path written.
pub fn export_to_csv(records: &RecordSet, target: &ExportTarget) -> Result<PathBuf> {
    if records.is_empty() {
        return Err(EtlError::Export("Cannot export empty record set to CSV".into()));
    }
    let path = target.resolve();
    write_csv(records, &path)?;
    info!("Successfully exported {} rows to CSV: {}", records.len(), path.display());
    Ok(path)
}

/// Export the result of `query`. An empty result writes nothing and
/// returns `Ok(None)`.
pub fn export_query_to_csv(
    db: &SqliteLoader,
    query: &str,
    target: &ExportTarget,
) -> Result<Option<PathBuf>> {
    let records = db.query_records(query)?;
    if records.is_empty() {
        warn!("Query result is empty, no CSV exported");
        return Ok(None);
    }
    export_to_csv(&records, target).map(Some)
}
