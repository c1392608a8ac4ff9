use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;

use covid_athena::AthenaQueryService;
use covid_core::aws::load_sdk_config;
use covid_pipeline::{Pipeline, PipelineConfig};
use covid_storage::S3Backend;
use covid_warehouse::RedshiftDataService;

/// Extract the COVID-19 tables from Athena, reshape them into a star schema
/// and load it into Redshift.
#[derive(Parser, Debug)]
#[command(name = "covid-etl", about = "COVID-19 Athena to Redshift ETL")]
struct Cli {
    /// Env profile whose prefixed keys take precedence (e.g. PROD)
    #[arg(long, env = "COVID_PROFILE", default_value = "")]
    profile: String,

    /// Also stage the fact table instead of expecting it in place
    #[arg(long)]
    stage_fact_table: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    covid_core::load_dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let cli = Cli::parse();

    let mut config = PipelineConfig::from_env_profiled(&cli.profile.to_uppercase());
    if cli.stage_fact_table {
        config.staging.stage_fact_table = true;
    }
    config.log_summary();

    let sdk_config = load_sdk_config(&config.aws).await;
    let results_bucket = config
        .athena
        .results_bucket()
        .context("invalid Athena output location")?;
    let results = S3Backend::new(&config.aws, &results_bucket)
        .context("failed to open Athena results bucket")?;
    let staging = S3Backend::new(&config.aws, &config.staging.bucket)
        .context("failed to open staging bucket")?;

    let pipeline = Pipeline::from_config(
        &config,
        Arc::new(AthenaQueryService::new(&sdk_config)),
        Arc::new(RedshiftDataService::new(&sdk_config)),
        results.store_arc(),
        staging.store_arc(),
    );

    let summary = pipeline.run().await?;
    info!("Run summary:\n{}", serde_json::to_string_pretty(&summary)?);

    Ok(())
}
