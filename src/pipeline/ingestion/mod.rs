// Pipeline ingestion: extractors for flat files, JSON APIs and HTML tables

pub mod api_extractor;
pub mod csv_extractor;
pub mod json_extractor;
pub mod web_scraper;

pub use api_extractor::ApiExtractor;
pub use csv_extractor::CsvExtractor;
pub use json_extractor::JsonExtractor;
pub use web_scraper::WebTableExtractor;

use crate::observability::metrics;
use crate::types::{Extractor, Record, RecordSet, Value};
use serde_json::Value as Json;
use tracing::{debug, error, info};

/// Shape a JSON payload into records: a top-level array is one record per
/// element, an object carrying a `data` array yields those elements, and any
/// other object becomes a single flattened record.
pub fn records_from_json(payload: &Json) -> RecordSet {
    match payload {
        Json::Array(items) => records_from_items(items),
        Json::Object(map) => match map.get("data") {
            Some(Json::Array(items)) => records_from_items(items),
            _ => {
                let mut cells = Vec::new();
                flatten_into(&mut cells, None, payload);
                records_from_cells(vec![cells])
            }
        },
        other => records_from_cells(vec![vec![("value".to_string(), Value::from_json(other))]]),
    }
}

fn records_from_items(items: &[Json]) -> RecordSet {
    let rows = items
        .iter()
        .map(|item| match item {
            Json::Object(map) => map
                .iter()
                .map(|(k, v)| (k.clone(), Value::from_json(v)))
                .collect(),
            other => vec![("value".to_string(), Value::from_json(other))],
        })
        .collect();
    records_from_cells(rows)
}

/// Columns follow the key order of the payload, first-seen across rows.
fn records_from_cells(rows: Vec<Vec<(String, Value)>>) -> RecordSet {
    let mut records = RecordSet::new();
    for cells in rows {
        for (key, _) in &cells {
            records.add_column(key.as_str());
        }
        records.push_row(cells.into_iter().collect::<Record>());
    }
    records
}

/// Nested object keys are joined with `.`; arrays are kept as JSON text.
fn flatten_into(cells: &mut Vec<(String, Value)>, prefix: Option<&str>, value: &Json) {
    match value {
        Json::Object(map) => {
            for (key, nested) in map {
                let name = match prefix {
                    Some(p) => format!("{}.{}", p, key),
                    None => key.clone(),
                };
                flatten_into(cells, Some(&name), nested);
            }
        }
        other => {
            let name = prefix.unwrap_or("value").to_string();
            cells.push((name, Value::from_json(other)));
        }
    }
}

/// Debug summary of an extracted set.
pub fn log_record_set_info(records: &RecordSet, name: &str) {
    debug!(
        "{} shape: {} rows x {} columns",
        name,
        records.len(),
        records.columns().len()
    );
    debug!("{} columns: {:?}", name, records.columns());
    let missing: Vec<_> = records
        .null_counts()
        .into_iter()
        .filter(|(_, n)| *n > 0)
        .collect();
    if !missing.is_empty() {
        debug!("{} missing values: {:?}", name, missing);
    }
}

/// Run an extractor, converting any failure into an empty record set.
pub async fn extract_or_empty(extractor: &dyn Extractor) -> RecordSet {
    let source = extractor.source_name().to_string();
    match extractor.extract().await {
        Ok(records) => {
            info!("Extracted {} records from {}", records.len(), source);
            metrics::extract::records_extracted(&source, records.len());
            records
        }
        Err(e) => {
            error!("Error extracting data from {}: {}", source, e);
            metrics::extract::extract_error(&source);
            RecordSet::new()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::processing::quality_gate::{validate_dataset, ValidationRules};
    use serde_json::json;

    #[test]
    fn test_array_payload_is_one_record_per_element() {
        let records = records_from_json(&json!([
            {"region": "ny", "cases": 3},
            {"region": "ca", "rate": 1.5, "active": true}
        ]));
        assert_eq!(records.len(), 2);
        assert_eq!(records.columns(), &["region", "cases", "rate", "active"]);
        assert_eq!(records.get(1, "active"), &Value::from("true"));
        assert!(records.get(1, "cases").is_null());
    }

    #[test]
    fn test_data_envelope_is_unwrapped() {
        let records = records_from_json(&json!({
            "data": [{"id": 1}, {"id": 2}],
            "metadata": {"total_records": 2}
        }));
        assert_eq!(records.len(), 2);
        assert_eq!(records.columns(), &["id"]);
    }

    #[test]
    fn test_plain_object_is_flattened() {
        let records = records_from_json(&json!({
            "hospital": {"name": "General", "beds": {"total": 100, "occupied": 80}},
            "region": "ohio"
        }));
        assert_eq!(records.len(), 1);
        assert_eq!(records.get(0, "hospital.beds.total"), &Value::Int(100));
        assert_eq!(records.get(0, "hospital.name"), &Value::from("General"));
        assert_eq!(records.get(0, "region"), &Value::from("ohio"));
    }

    #[test]
    fn test_columns_keep_payload_key_order() {
        let records = records_from_json(&json!([
            {"state": null, "region": "ny", "cases": 1}
        ]));
        assert_eq!(records.columns(), &["state", "region", "cases"]);

        let flat = records_from_json(&json!({"zone": "east", "admissions": {"total": 4}}));
        assert_eq!(flat.columns(), &["zone", "admissions.total"]);

        // the location check picks the first matching column in source order
        let (passed, report) = validate_dataset(&records, &ValidationRules::default());
        assert!(!passed);
        assert_eq!(report.failures().next().unwrap().description, "Column 'state' has no null values");
    }

    #[test]
    fn test_empty_array_is_empty_set() {
        assert!(records_from_json(&json!([])).is_empty());
    }
}
