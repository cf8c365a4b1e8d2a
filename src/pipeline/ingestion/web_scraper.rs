use super::log_record_set_info;
use crate::error::{EtlError, Result};
use crate::types::{Extractor, Record, RecordSet, Value};
use once_cell::sync::Lazy;
use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use tracing::{info, instrument};

static THOUSANDS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^-?\d{1,3}(,\d{3})+(\.\d+)?$").expect("valid thousands regex"));

fn selector(css: &str) -> Result<Selector> {
    Selector::parse(css).map_err(|e| EtlError::Html(format!("invalid selector '{}': {:?}", css, e)))
}

fn cell_text(cell: ElementRef<'_>) -> String {
    cell.text().collect::<Vec<_>>().join(" ").split_whitespace().collect::<Vec<_>>().join(" ")
}

/// `" Total Cases "` → `"total_cases"`
pub fn clean_header(raw: &str) -> String {
    raw.trim().to_lowercase().replace(' ', "_")
}

/// Type a scraped cell. Numbers written with thousands separators are read
/// as numbers.
pub fn parse_table_cell(raw: &str) -> Value {
    let trimmed = raw.trim();
    if THOUSANDS.is_match(trimmed) {
        return Value::parse_cell(&trimmed.replace(',', ""));
    }
    Value::parse_cell(trimmed)
}

/// Extract `table[table_index]` from an HTML document. The header row is the
/// first row holding `th` cells, or the first row when there is none.
pub fn parse_html_table(html: &str, table_index: usize) -> Result<RecordSet> {
    let document = Html::parse_document(html);
    let table_sel = selector("table")?;
    let row_sel = selector("tr")?;
    let th_sel = selector("th")?;
    let cell_sel = selector("th, td")?;

    let tables: Vec<ElementRef<'_>> = document.select(&table_sel).collect();
    if tables.is_empty() {
        return Err(EtlError::Html("No tables found on web page".into()));
    }
    let table = tables.get(table_index).ok_or_else(|| {
        EtlError::Html(format!(
            "Table index {} out of range, only {} tables found",
            table_index,
            tables.len()
        ))
    })?;

    let rows: Vec<ElementRef<'_>> = table.select(&row_sel).collect();
    let header_pos = rows
        .iter()
        .position(|r| r.select(&th_sel).next().is_some())
        .unwrap_or(0);
    let Some(header_row) = rows.get(header_pos) else {
        return Ok(RecordSet::new());
    };

    let headers: Vec<String> = header_row
        .select(&cell_sel)
        .enumerate()
        .map(|(i, c)| {
            let name = clean_header(&cell_text(c));
            if name.is_empty() {
                format!("column_{}", i)
            } else {
                name
            }
        })
        .collect();

    let mut records = RecordSet::with_columns(headers.iter().cloned());
    for row in rows.iter().skip(header_pos + 1) {
        let cells: Vec<String> = row.select(&cell_sel).map(cell_text).collect();
        if cells.is_empty() {
            continue;
        }
        let record: Record = headers
            .iter()
            .enumerate()
            .map(|(i, h)| {
                let value = cells.get(i).map(|c| parse_table_cell(c)).unwrap_or(Value::Null);
                (h.clone(), value)
            })
            .collect();
        records.push_row(record);
    }
    Ok(records)
}

/// Scrapes one HTML table of statistics from a web page.
pub struct WebTableExtractor {
    client: reqwest::Client,
    url: String,
    table_index: usize,
}

impl WebTableExtractor {
    pub fn new(url: impl Into<String>, table_index: usize) -> Self {
        Self {
            client: reqwest::Client::new(),
            url: url.into(),
            table_index,
        }
    }
}

#[async_trait::async_trait]
impl Extractor for WebTableExtractor {
    fn source_name(&self) -> &str {
        "web"
    }

    #[instrument(skip(self), fields(url = %self.url, table_index = self.table_index))]
    async fn extract(&self) -> Result<RecordSet> {
        info!("Extracting data from web page: {}", self.url);

        let response = self.client.get(&self.url).send().await?;
        let status = response.status();
        if status != reqwest::StatusCode::OK {
            return Err(EtlError::Api {
                status: status.as_u16(),
                url: self.url.clone(),
            });
        }

        let body = response.text().await?;
        let records = parse_html_table(&body, self.table_index)?;
        log_record_set_info(&records, "Web data");
        info!("Successfully extracted {} records from web page", records.len());
        Ok(records)
    }
}
