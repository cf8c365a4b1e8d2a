use axum::{
    http::StatusCode,
    response::{Html, IntoResponse, Json},
    routing::get,
    Router,
};
use hyper::Server;
use serde::Serialize;
use serde_json::json;
use std::net::{SocketAddr, TcpListener};
use tracing::info;

#[derive(Debug, Clone, Serialize)]
pub struct VaccinationRow {
    pub date: &'static str,
    pub region: &'static str,
    pub total_vaccinations: i64,
    pub people_vaccinated: i64,
    pub people_fully_vaccinated: i64,
    pub population: i64,
}

const fn row(
    date: &'static str,
    region: &'static str,
    total_vaccinations: i64,
    people_vaccinated: i64,
    people_fully_vaccinated: i64,
    population: i64,
) -> VaccinationRow {
    VaccinationRow {
        date,
        region,
        total_vaccinations,
        people_vaccinated,
        people_fully_vaccinated,
        population,
    }
}

pub const VACCINATION_DATA: [VaccinationRow; 6] = [
    row("2023-01-15", "California", 100_000, 60_000, 40_000, 40_000_000),
    row("2023-01-15", "New York", 80_000, 50_000, 30_000, 20_000_000),
    row("2023-01-15", "Texas", 90_000, 55_000, 35_000, 30_000_000),
    row("2023-01-16", "California", 102_000, 61_000, 41_000, 40_000_000),
    row("2023-01-16", "New York", 82_000, 51_000, 31_000, 20_000_000),
    row("2023-01-16", "Texas", 92_000, 56_000, 36_000, 30_000_000),
];

const STATS_PAGE: &str = r#"<!DOCTYPE html>
<html lang="en">
  <head><meta charset="utf-8" /><title>COVID-19 Statistics</title></head>
  <body>
    <h1>COVID-19 Statistics by Region</h1>
    <table>
      <thead>
        <tr><th>Region</th><th>Report Date</th><th>Total Cases</th><th>Total Deaths</th><th>Positivity Rate</th></tr>
      </thead>
      <tbody>
        <tr><td>CA</td><td>2023-01-16</td><td>12,034,567</td><td>98,765</td><td>7.2</td></tr>
        <tr><td>NY</td><td>2023-01-16</td><td>6,543,210</td><td>75,432</td><td>6.8</td></tr>
        <tr><td>TX</td><td>2023-01-16</td><td>8,123,456</td><td>91,234</td><td>9.1</td></tr>
      </tbody>
    </table>
  </body>
</html>"#;

async fn vaccinations() -> impl IntoResponse {
    Json(json!({
        "data": VACCINATION_DATA,
        "metadata": {
            "total_records": VACCINATION_DATA.len(),
            "source": "Mock API"
        }
    }))
}

async fn stats() -> impl IntoResponse {
    Html(STATS_PAGE)
}

async fn not_found() -> impl IntoResponse {
    (
        StatusCode::NOT_FOUND,
        Json(json!({ "error": "Endpoint not found" })),
    )
}

/// Routes of the local stand-in for the vaccination API and stats page.
pub fn create_router() -> Router {
    Router::new()
        .route("/covid/vaccinations", get(vaccinations))
        .route("/covid/stats", get(stats))
        .fallback(not_found)
}

/// Serve on an already-bound listener.
pub async fn serve(listener: TcpListener) -> anyhow::Result<()> {
    listener.set_nonblocking(true)?;
    let addr = listener.local_addr()?;
    info!("Mock API server running at http://{}", addr);
    Server::from_tcp(listener)?
        .serve(create_router().into_make_service())
        .await?;
    Ok(())
}

/// Start the mock API server on the specified port
pub async fn start_mock_api(port: u16) -> anyhow::Result<()> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    serve(TcpListener::bind(addr)?).await
}
