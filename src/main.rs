use anyhow::Context;
use clap::Parser;
use covid_etl::config::Config;
use covid_etl::observability::{self, metrics};
use covid_etl::pipeline::{run_pipeline, LoadOutcome, PipelineOptions, PipelineResult, Scheduler};
use std::path::PathBuf;
use tracing::{error, info};

#[derive(Parser)]
#[command(name = "covid_etl")]
#[command(about = "COVID-19 ETL pipeline: extract, clean, validate and load case, hospital and vaccination data")]
#[command(version)]
struct Cli {
    /// Path to CSV file with case data
    #[arg(long)]
    csv_path: Option<PathBuf>,

    /// Path to JSON file with hospital resource data
    #[arg(long)]
    json_path: Option<PathBuf>,

    /// URL for API endpoint with vaccination data
    #[arg(long)]
    api_url: Option<String>,

    /// URL for web page with COVID-19 statistics
    #[arg(long)]
    html_url: Option<String>,

    /// Export results to CSV files
    #[arg(long)]
    export_csv: bool,

    /// Run pipeline on schedule with specified interval in minutes (0 for one-time run)
    #[arg(long, default_value_t = 0)]
    schedule: u64,

    /// Config file (defaults to $COVID_ETL_CONFIG, then ./config.toml)
    #[arg(long)]
    config: Option<PathBuf>,
}

impl Cli {
    fn options(&self, config: &Config) -> PipelineOptions {
        let mut options = PipelineOptions::from_config(config);
        if let Some(path) = &self.csv_path {
            options.csv_path = path.clone();
        }
        if let Some(path) = &self.json_path {
            options.json_path = path.clone();
        }
        if let Some(url) = &self.api_url {
            options.api_url = Some(url.clone());
        }
        if let Some(url) = &self.html_url {
            options.html_url = Some(url.clone());
        }
        options.export_csv = self.export_csv;
        options
    }
}

fn print_summary(result: &PipelineResult) {
    println!("\n📊 Pipeline run {} ({:.2}s)", result.run_id, result.duration_secs);
    for outcome in &result.datasets {
        let validation = match &outcome.validation {
            Some(a) => format!(
                "{:?} ({}/{} expectations)",
                a.decision,
                a.report.passed_count(),
                a.report.len()
            ),
            None => "not validated".to_string(),
        };
        let load = match &outcome.load {
            LoadOutcome::Loaded { rows } => format!("{} rows in {}", rows, outcome.table),
            LoadOutcome::Quarantined => "quarantined".to_string(),
            LoadOutcome::Failed(e) => format!("failed: {}", e),
            LoadOutcome::Skipped => "skipped".to_string(),
        };
        println!(
            "   {:<13} extracted {:>5}  validation: {}  load: {}",
            outcome.dataset.label(),
            outcome.extracted_rows,
            validation,
            load
        );
        if let Some(path) = &outcome.export_path {
            println!("   {:<13} exported to {}", "", path.display());
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    let cli = Cli::parse();

    let config = Config::load(cli.config.as_deref()).context("Failed to load configuration")?;
    let _log_guard = observability::init_logging(&config.paths.log_dir);
    metrics::init();

    let options = cli.options(&config);

    if cli.schedule > 0 {
        let scheduler = Scheduler::new(cli.schedule);
        let handle = scheduler.handle();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("Received interrupt signal, shutting down...");
                handle.stop();
            }
        });

        info!("Running pipeline on schedule every {} minutes", cli.schedule);
        let (config, options) = (&config, &options);
        scheduler
            .start(move || async move {
                let result = run_pipeline(config, options).await;
                if let Ok(r) = &result {
                    print_summary(r);
                }
                result
            })
            .await;
    } else {
        info!("Running pipeline once");
        match run_pipeline(&config, &options).await {
            Ok(result) => {
                print_summary(&result);
                info!("Pipeline run complete");
            }
            Err(e) => {
                error!("Pipeline execution failed: {}", e);
                return Err(e).context("Pipeline execution failed");
            }
        }
    }

    Ok(())
}
