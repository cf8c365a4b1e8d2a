use anyhow::Result;
use clap::Parser;
use covid_etl::mock_api;

#[derive(Parser)]
#[command(name = "mock-api")]
#[command(about = "Local stand-in for the vaccination API and statistics page")]
#[command(version)]
struct Cli {
    /// Port to listen on
    #[arg(short, long, default_value = "8000")]
    port: u16,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("covid_etl=info")),
        )
        .init();

    let cli = Cli::parse();
    println!("Mock API server running at http://localhost:{}", cli.port);
    println!("  GET /covid/vaccinations");
    println!("  GET /covid/stats");
    mock_api::start_mock_api(cli.port).await
}
