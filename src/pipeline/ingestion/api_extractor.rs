use super::{log_record_set_info, records_from_json};
use crate::constants::{CDC_COLUMN_RENAMES, CDC_HOST_MARKER};
use crate::error::{EtlError, Result};
use crate::types::{Extractor, RecordSet};
use serde_json::Value as Json;
use tracing::{debug, info, instrument};

/// Fetches vaccination data from an HTTP JSON endpoint.
pub struct ApiExtractor {
    client: reqwest::Client,
    url: String,
    params: Vec<(String, String)>,
    headers: Vec<(String, String)>,
}

fn is_cdc(url: &str) -> bool {
    url.contains(CDC_HOST_MARKER)
}

impl ApiExtractor {
    /// Extractor with the default query parameters and headers for `url`.
    pub fn new(url: impl Into<String>) -> Self {
        let url = url.into();
        let params = if is_cdc(&url) {
            vec![
                ("$limit".to_string(), "500".to_string()),
                ("$where".to_string(), "vaccination_status IS NOT NULL".to_string()),
            ]
        } else {
            Vec::new()
        };
        Self {
            client: reqwest::Client::new(),
            url,
            params,
            headers: vec![("Content-Type".to_string(), "application/json".to_string())],
        }
    }

    pub fn with_params(mut self, params: Vec<(String, String)>) -> Self {
        self.params = params;
        self
    }

    pub fn with_headers(mut self, headers: Vec<(String, String)>) -> Self {
        self.headers = headers;
        self
    }

    pub fn with_client(mut self, client: reqwest::Client) -> Self {
        self.client = client;
        self
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

/// Shape an API payload. Array payloads from CDC open-data endpoints get
/// their columns renamed to the local schema.
pub fn records_from_api_payload(url: &str, payload: &Json) -> RecordSet {
    let mut records = records_from_json(payload);
    if payload.is_array() && is_cdc(url) {
        for (from, to) in CDC_COLUMN_RENAMES {
            records.rename_column(from, to);
        }
        if !records.has_column("vaccination_status") && records.has_column("process_state") {
            debug!("Deriving vaccination_status from process_state");
            records.add_column("vaccination_status");
            for i in 0..records.len() {
                let status = records.get(i, "process_state").clone();
                records.set(i, "vaccination_status", status);
            }
        }
    }
    records
}

#[async_trait::async_trait]
impl Extractor for ApiExtractor {
    fn source_name(&self) -> &str {
        "api"
    }

    #[instrument(skip(self), fields(url = %self.url))]
    async fn extract(&self) -> Result<RecordSet> {
        info!("Extracting data from API: {}", self.url);

        let mut request = self.client.get(&self.url).query(&self.params);
        for (name, value) in &self.headers {
            request = request.header(name.as_str(), value.as_str());
        }
        let response = request.send().await?;

        let status = response.status();
        if status != reqwest::StatusCode::OK {
            return Err(EtlError::Api {
                status: status.as_u16(),
                url: self.url.clone(),
            });
        }

        let payload: Json = response.json().await?;
        let records = records_from_api_payload(&self.url, &payload);
        log_record_set_info(&records, "API data");
        info!("Successfully extracted {} records from API", records.len());
        Ok(records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Value;
    use serde_json::json;

    const CDC_URL: &str = "https://data.cdc.gov/resource/n8mc-b4w4.json";

    #[test]
    fn test_cdc_defaults() {
        let extractor = ApiExtractor::new(CDC_URL);
        assert_eq!(extractor.params.len(), 2);
        assert_eq!(extractor.params[0], ("$limit".to_string(), "500".to_string()));

        let plain = ApiExtractor::new("http://localhost:8000/covid/vaccinations");
        assert!(plain.params.is_empty());
        assert_eq!(plain.headers.len(), 1);
    }

    #[test]
    fn test_cdc_payload_is_renamed() {
        let payload = json!([
            {"case_month": "2021-01", "state_name": "NY", "sex": "Female", "process_state": "complete"}
        ]);
        let records = records_from_api_payload(CDC_URL, &payload);
        assert!(records.has_column("date"));
        assert!(records.has_column("region"));
        assert!(records.has_column("gender"));
        assert!(!records.has_column("case_month"));
        assert_eq!(records.get(0, "vaccination_status"), &Value::from("complete"));
    }

    #[test]
    fn test_other_hosts_are_untouched() {
        let payload = json!([{"case_month": "2021-01"}]);
        let records = records_from_api_payload("http://localhost/api", &payload);
        assert!(records.has_column("case_month"));
    }

    #[test]
    fn test_data_envelope_skips_cdc_renames() {
        let payload = json!({"data": [{"state_name": "TX"}]});
        let records = records_from_api_payload(CDC_URL, &payload);
        assert!(records.has_column("state_name"));
    }
}
