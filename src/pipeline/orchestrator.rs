use crate::config::Config;
use crate::error::Result;
use crate::observability::metrics;
use crate::pipeline::ingestion::{
    extract_or_empty, ApiExtractor, CsvExtractor, JsonExtractor, WebTableExtractor,
};
use crate::pipeline::processing::calculator::create_calculated_fields;
use crate::pipeline::processing::missing::handle_missing_values;
use crate::pipeline::processing::normalize::{normalize_locations, standardize_dates};
use crate::pipeline::processing::quality_gate::{
    DefaultQualityGate, QualityAssessment, QualityDecision, QualityGate,
};
use crate::pipeline::storage::{
    default_table_definitions, export_to_csv, ExportTarget, SqliteLoader,
};
use crate::pipeline::tasks::{TaskRecord, TaskRunner};
use crate::types::RecordSet;
use chrono::{DateTime, Local};
use serde::Serialize;
use std::fmt;
use std::path::PathBuf;
use std::time::Instant;
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

/// The four datasets the pipeline moves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Dataset {
    Cases,
    Hospitals,
    Vaccinations,
    Web,
}

impl Dataset {
    pub fn label(self) -> &'static str {
        match self {
            Dataset::Cases => "Cases",
            Dataset::Hospitals => "Hospitals",
            Dataset::Vaccinations => "Vaccinations",
            Dataset::Web => "Web",
        }
    }

    pub fn table(self, config: &Config) -> &str {
        match self {
            Dataset::Cases => &config.database.cases_table,
            Dataset::Hospitals => &config.database.hospitals_table,
            Dataset::Vaccinations => &config.database.vaccinations_table,
            Dataset::Web => &config.database.web_table,
        }
    }
}

impl fmt::Display for Dataset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Sources and switches for one run. Built from the config, then overridden
/// from the command line.
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineOptions {
    pub csv_path: PathBuf,
    pub json_path: PathBuf,
    pub api_url: Option<String>,
    pub html_url: Option<String>,
    pub html_table_index: usize,
    pub export_csv: bool,
}

impl PipelineOptions {
    pub fn from_config(config: &Config) -> Self {
        Self {
            csv_path: config.paths.csv_path(),
            json_path: config.paths.json_path(),
            api_url: config.paths.api_url.clone(),
            html_url: config.paths.html_url.clone(),
            html_table_index: 0,
            export_csv: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", content = "detail", rename_all = "snake_case")]
pub enum LoadOutcome {
    Loaded { rows: usize },
    Quarantined,
    Failed(String),
    /// Nothing was extracted
    Skipped,
}

#[derive(Debug, Clone, Serialize)]
pub struct DatasetOutcome {
    pub dataset: Dataset,
    pub table: String,
    pub extracted_rows: usize,
    pub transformed_rows: usize,
    pub validation: Option<QualityAssessment>,
    pub load: LoadOutcome,
    pub export_path: Option<PathBuf>,
    #[serde(skip)]
    pub records: RecordSet,
}

#[derive(Debug, Serialize)]
pub struct PipelineResult {
    pub run_id: Uuid,
    pub started_at: DateTime<Local>,
    pub duration_secs: f64,
    pub datasets: Vec<DatasetOutcome>,
    pub tasks: Vec<TaskRecord>,
}

impl PipelineResult {
    pub fn dataset(&self, dataset: Dataset) -> Option<&DatasetOutcome> {
        self.datasets.iter().find(|d| d.dataset == dataset)
    }

    /// Every extracted dataset loaded.
    pub fn fully_loaded(&self) -> bool {
        self.datasets
            .iter()
            .all(|d| matches!(d.load, LoadOutcome::Loaded { .. } | LoadOutcome::Skipped))
    }
}

/// Dates, then locations, then missing values, then derived metrics. Each
/// stage falls back to its input on failure.
pub fn transform_dataset(
    tasks: &mut TaskRunner,
    dataset: Dataset,
    records: RecordSet,
    config: &Config,
) -> RecordSet {
    let label = dataset.label();
    let records = tasks.measure(&format!("Standardize Dates ({})", label), || {
        standardize_dates(&records, &config.fields.date_fields)
    });
    let records = tasks.measure(&format!("Normalize Locations ({})", label), || {
        normalize_locations(&records, &config.fields.location_fields, &config.alias_table)
    });
    let records = tasks.measure(&format!("Handle Missing Values ({})", label), || {
        handle_missing_values(&records, config.missing_values.strategy)
    });
    tasks.measure(&format!("Create Calculated Fields ({})", label), || {
        create_calculated_fields(&records)
    })
}

/// Extract, transform, validate and load every configured dataset.
#[instrument(skip(config, options), fields(run_id = tracing::field::Empty))]
pub async fn run_pipeline(config: &Config, options: &PipelineOptions) -> Result<PipelineResult> {
    let run_id = Uuid::new_v4();
    tracing::Span::current().record("run_id", tracing::field::display(run_id));
    info!("Starting COVID-19 ETL pipeline");
    let started_at = Local::now();
    let t_pipeline = Instant::now();
    let mut tasks = TaskRunner::new();

    // Extract
    info!("Starting extraction phase");
    let mut extracted: Vec<(Dataset, RecordSet)> = Vec::new();
    let cases = tasks
        .measure_async("Extract CSV", extract_or_empty(&CsvExtractor::new(&options.csv_path)))
        .await;
    extracted.push((Dataset::Cases, cases));
    let hospitals = tasks
        .measure_async("Extract JSON", extract_or_empty(&JsonExtractor::new(&options.json_path)))
        .await;
    extracted.push((Dataset::Hospitals, hospitals));
    if let Some(url) = &options.api_url {
        let vaccinations = tasks
            .measure_async("Extract API", extract_or_empty(&ApiExtractor::new(url.as_str())))
            .await;
        extracted.push((Dataset::Vaccinations, vaccinations));
    }
    if let Some(url) = &options.html_url {
        let web = tasks
            .measure_async(
                "Extract Web",
                extract_or_empty(&WebTableExtractor::new(url.as_str(), options.html_table_index)),
            )
            .await;
        extracted.push((Dataset::Web, web));
    }

    // Transform
    info!("Starting transformation phase");
    let mut outcomes: Vec<DatasetOutcome> = extracted
        .into_iter()
        .map(|(dataset, records)| {
            let extracted_rows = records.len();
            let records = if records.is_empty() {
                warn!("No {} data extracted, skipping", dataset);
                records
            } else {
                transform_dataset(&mut tasks, dataset, records, config)
            };
            DatasetOutcome {
                dataset,
                table: dataset.table(config).to_string(),
                extracted_rows,
                transformed_rows: records.len(),
                validation: None,
                load: LoadOutcome::Skipped,
                export_path: None,
                records,
            }
        })
        .collect();

    // Validate
    info!("Starting validation phase");
    let gate = DefaultQualityGate::with_rules(config.validation.clone());
    for outcome in outcomes.iter_mut().filter(|o| !o.records.is_empty()) {
        let assessment = tasks.measure(&format!("Validate {}", outcome.dataset), || {
            gate.assess(outcome.dataset.label(), &outcome.records)
        });
        outcome.validation = Some(assessment);
    }

    // Load
    info!("Starting loading phase");
    let mut loader = SqliteLoader::open(config.database_path())?;
    tasks.run("Create Database Schema", || {
        loader.create_database_schema(&default_table_definitions(&config.database))
    })?;

    for outcome in outcomes.iter_mut().filter(|o| !o.records.is_empty()) {
        let decision = outcome
            .validation
            .as_ref()
            .map(|a| a.decision)
            .unwrap_or(QualityDecision::Accept);
        if !decision.should_load() {
            warn!("{} data quarantined, not loading table {}", outcome.dataset, outcome.table);
            metrics::load::dataset_quarantined(outcome.dataset.label());
            outcome.load = LoadOutcome::Quarantined;
            continue;
        }

        let name = format!("Load {} to SQLite", outcome.dataset);
        let result = tasks.run(&name, || {
            loader.load(&outcome.records, &outcome.table, config.database.if_exists)
        });
        outcome.load = match result {
            Ok(rows) => {
                metrics::load::rows_loaded(&outcome.table, rows);
                LoadOutcome::Loaded { rows }
            }
            Err(e) => {
                metrics::load::load_error(&outcome.table);
                LoadOutcome::Failed(e.to_string())
            }
        };
    }

    // Export
    if options.export_csv {
        info!("Exporting data to CSV");
        for outcome in outcomes.iter_mut().filter(|o| !o.records.is_empty()) {
            let target = ExportTarget::File(
                config
                    .paths
                    .output_dir
                    .join(format!("{}.csv", outcome.table)),
            );
            let name = format!("Export {} to CSV", outcome.dataset);
            match tasks.run(&name, || export_to_csv(&outcome.records, &target)) {
                Ok(path) => outcome.export_path = Some(path),
                Err(e) => error!("Export of {} failed: {}", outcome.dataset, e),
            }
        }
    }

    let duration_secs = t_pipeline.elapsed().as_secs_f64();
    let result = PipelineResult {
        run_id,
        started_at,
        duration_secs,
        datasets: outcomes,
        tasks: tasks.into_records(),
    };
    metrics::tasks::pipeline_run(result.fully_loaded());
    info!(
        "COVID-19 ETL pipeline completed in {:.2} seconds",
        duration_secs
    );
    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::processing::quality_gate::validate_dataset;
    use crate::record;
    use crate::types::Value;
    use chrono::NaiveDate;

    #[test]
    fn test_transform_dataset_stage_order() {
        let config = Config::default();
        let records = RecordSet::from_rows(vec![
            record! { "date" => "01/05/2021", "region" => " NY ", "deaths" => 5i64, "confirmed_cases" => 100i64 },
            record! { "date" => "bad", "region" => Value::Null, "deaths" => Value::Null, "confirmed_cases" => 50i64 },
        ]);

        let mut tasks = TaskRunner::new();
        let out = transform_dataset(&mut tasks, Dataset::Cases, records, &config);

        assert_eq!(
            out.get(0, "date"),
            &Value::Date(NaiveDate::from_ymd_opt(2021, 1, 5).unwrap())
        );
        assert!(out.get(1, "date").is_null());
        assert_eq!(out.get(0, "region"), &Value::from("new york"));
        assert_eq!(out.get(1, "region"), &Value::from("Unknown"));
        assert_eq!(out.get(1, "deaths"), &Value::Int(0));
        assert_eq!(out.get(0, "case_fatality_rate"), &Value::Float(5.0));
        assert_eq!(out.get(1, "case_fatality_rate"), &Value::Float(0.0));
        assert_eq!(tasks.records().len(), 4);
    }

    #[test]
    fn test_unparseable_dates_stay_null_and_fail_validation() {
        let config = Config::default();
        let records = RecordSet::from_rows(vec![
            record! { "date" => "garbage", "cases" => 1i64 },
            record! { "date" => "n/a", "cases" => 2i64 },
        ]);

        let mut tasks = TaskRunner::new();
        let out = transform_dataset(&mut tasks, Dataset::Cases, records, &config);

        assert!(out.get(0, "date").is_null());
        assert!(out.get(1, "date").is_null());

        let (passed, report) = validate_dataset(&out, &config.validation);
        assert!(!passed);
        let failure = report
            .failures()
            .find(|r| r.description == "Column 'date' has no null values")
            .unwrap();
        assert_eq!(failure.detail, "2 null values found");
    }

    #[test]
    fn test_options_from_config() {
        let config = Config::default();
        let options = PipelineOptions::from_config(&config);
        assert_eq!(options.csv_path, PathBuf::from("data/cases.csv"));
        assert!(!options.export_csv);
        assert_eq!(Dataset::Web.table(&config), "web_statistics");
    }
}
