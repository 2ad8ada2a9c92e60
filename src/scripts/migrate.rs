use anyhow::Context;
use env_logger::Builder;
use log::LevelFilter;
use pageforge::config::AppConfig;
use pageforge::seed;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file if it exists
    dotenvy::dotenv().ok();

    Builder::new()
        .filter_level(LevelFilter::Info)
        .filter_module("sqlx", LevelFilter::Warn)
        .parse_default_env()
        .init();

    let config = AppConfig::load().context("Failed to load configuration")?;

    log::info!("Connecting to PostgreSQL and applying schema...");
    let service = pageforge::connect(&config).await?;

    if std::env::var("LOAD_SEED_DATA").unwrap_or_default() == "true" {
        log::info!("Loading seed data...");
        let application = seed::load_seed_data(&service).await?;
        log::info!("Seed data loaded: application {}", application.id);
    }

    Ok(())
}
