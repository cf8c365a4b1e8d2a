use anyhow::Result;
use covid_etl::config::Config;
use covid_etl::mock_api;
use covid_etl::pipeline::storage::SqliteLoader;
use covid_etl::pipeline::{run_pipeline, Dataset, LoadOutcome, PipelineOptions};
use covid_etl::Value;
use std::net::{SocketAddr, TcpListener};
use std::path::Path;
use tempfile::tempdir;

const CASES_CSV: &str = "\
date,region,confirmed_cases,deaths,recovered,total_tests,positive_tests
2021-01-05,NY,1000,20,500,10000,800
01/06/2021, ca ,2000,,900,0,150
2021-01-07,Texas,1500,30,700,12000,
";

const HOSPITALS_JSON: &str = r#"[
  {"hospital_name": "General", "location": "NY", "date": "2021-01-05", "total_beds": 200, "occupied_beds": 150},
  {"hospital_name": "Mercy", "location": "ohio", "date": "January 6, 2021", "total_beds": 100, "occupied_beds": null}
]"#;

fn start_mock_api() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(mock_api::serve(listener));
    addr
}

fn write_sources(dir: &Path, cases: &str) {
    std::fs::write(dir.join("cases.csv"), cases).unwrap();
    std::fs::write(dir.join("hospitals.json"), HOSPITALS_JSON).unwrap();
}

fn test_config(dir: &Path, extra: &str) -> Config {
    let toml = format!(
        "[paths]\ndata_dir = {:?}\noutput_dir = {:?}\n{}",
        dir.to_string_lossy(),
        dir.join("output").to_string_lossy(),
        extra
    );
    Config::from_toml_str(&toml).unwrap()
}

fn options(config: &Config, addr: SocketAddr) -> PipelineOptions {
    let mut options = PipelineOptions::from_config(config);
    options.api_url = Some(format!("http://{}/covid/vaccinations", addr));
    options.html_url = Some(format!("http://{}/covid/stats", addr));
    options
}

#[tokio::test]
async fn test_full_pipeline_against_mock_api() -> Result<()> {
    let addr = start_mock_api();
    let dir = tempdir()?;
    write_sources(dir.path(), CASES_CSV);
    let config = test_config(dir.path(), "");
    let mut options = options(&config, addr);
    options.export_csv = true;

    let result = run_pipeline(&config, &options).await?;
    assert!(result.fully_loaded());

    let cases = result.dataset(Dataset::Cases).unwrap();
    assert_eq!(cases.extracted_rows, 3);
    assert_eq!(cases.load, LoadOutcome::Loaded { rows: 3 });
    assert_eq!(cases.records.get(1, "region"), &Value::from("california"));
    assert_eq!(cases.records.get(1, "deaths"), &Value::Int(0));
    assert_eq!(cases.records.get(1, "positivity_rate"), &Value::Float(0.0));
    assert_eq!(cases.records.get(0, "positivity_rate"), &Value::Float(8.0));
    assert_eq!(cases.records.get(0, "case_fatality_rate"), &Value::Float(2.0));

    let hospitals = result.dataset(Dataset::Hospitals).unwrap();
    assert_eq!(hospitals.load, LoadOutcome::Loaded { rows: 2 });
    assert_eq!(hospitals.records.get(0, "hospital_utilization_rate"), &Value::Float(75.0));
    assert_eq!(hospitals.records.get(1, "location"), &Value::from("ohio"));

    let vaccinations = result.dataset(Dataset::Vaccinations).unwrap();
    assert_eq!(vaccinations.extracted_rows, 6);
    assert!(vaccinations.validation.as_ref().unwrap().passed());
    assert_eq!(vaccinations.records.get(0, "vaccination_rate"), &Value::Float(0.25));

    let web = result.dataset(Dataset::Web).unwrap();
    assert_eq!(web.load, LoadOutcome::Loaded { rows: 3 });
    assert_eq!(web.records.get(0, "region"), &Value::from("california"));
    assert_eq!(web.records.get(0, "total_cases"), &Value::Int(12_034_567));

    let db = SqliteLoader::open(config.database_path())?;
    let dates = db.query_records("SELECT date FROM covid_cases ORDER BY date")?;
    let dates: Vec<_> = dates.column_values("date").cloned().collect();
    assert_eq!(
        dates,
        vec![
            Value::from("2021-01-05"),
            Value::from("2021-01-06"),
            Value::from("2021-01-07")
        ]
    );
    assert_eq!(db.row_count("vaccinations")?, 6);

    let export = cases.export_path.as_ref().unwrap();
    assert!(export.ends_with("covid_cases.csv"));
    let exported = std::fs::read_to_string(export)?;
    assert!(exported.starts_with("date,region,confirmed_cases"));
    Ok(())
}

#[tokio::test]
async fn test_blocking_validation_quarantines_dataset() -> Result<()> {
    let addr = start_mock_api();
    let dir = tempdir()?;
    let bad_cases = "date,region,deaths\n2021-01-05,ny,-4\n";
    write_sources(dir.path(), bad_cases);
    let config = test_config(dir.path(), "[validation]\nblocking = true\n");

    let result = run_pipeline(&config, &options(&config, addr)).await?;

    let cases = result.dataset(Dataset::Cases).unwrap();
    assert_eq!(cases.load, LoadOutcome::Quarantined);
    let report = &cases.validation.as_ref().unwrap().report;
    assert_eq!(report.failures().next().unwrap().detail, "Range is -4 to -4");
    assert!(!result.fully_loaded());

    // schema table exists but nothing was written to it
    let db = SqliteLoader::open(config.database_path())?;
    assert_eq!(db.row_count("covid_cases")?, 0);
    assert_eq!(db.row_count("vaccinations")?, 6);
    Ok(())
}

#[tokio::test]
async fn test_failed_sources_become_empty_datasets() -> Result<()> {
    let addr = start_mock_api();
    let dir = tempdir()?;
    let config = test_config(dir.path(), "");
    let mut options = PipelineOptions::from_config(&config);
    options.api_url = Some(format!("http://{}/covid/unknown", addr));
    options.html_url = None;

    let result = run_pipeline(&config, &options).await?;

    assert_eq!(result.datasets.len(), 3);
    for outcome in &result.datasets {
        assert_eq!(outcome.extracted_rows, 0);
        assert_eq!(outcome.load, LoadOutcome::Skipped);
        assert!(outcome.validation.is_none());
    }
    Ok(())
}

#[tokio::test]
async fn test_mock_api_endpoints() -> Result<()> {
    let addr = start_mock_api();
    let client = reqwest::Client::new();

    let body: serde_json::Value = client
        .get(format!("http://{}/covid/vaccinations", addr))
        .send()
        .await?
        .json()
        .await?;
    assert_eq!(body["metadata"]["total_records"], 6);
    assert_eq!(body["metadata"]["source"], "Mock API");
    assert_eq!(body["data"].as_array().unwrap().len(), 6);

    let missing = client.get(format!("http://{}/nope", addr)).send().await?;
    assert_eq!(missing.status().as_u16(), 404);
    let err: serde_json::Value = missing.json().await?;
    assert_eq!(err["error"], "Endpoint not found");

    let page = client
        .get(format!("http://{}/covid/stats", addr))
        .send()
        .await?
        .text()
        .await?;
    assert!(page.contains("<table>"));
    Ok(())
}
