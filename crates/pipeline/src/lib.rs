//! End-to-end COVID-19 ETL run: extract from Athena, derive the star schema,
//! stage it in S3 and load it into Redshift.

use std::sync::Arc;
use std::time::Instant;

use object_store::ObjectStore;
use serde::Serialize;
use tracing::info;

use covid_athena::{AthenaConfig, AthenaError, QueryService, TableLoader};
use covid_core::config::active_profile;
use covid_core::{AwsConfig, Table};
use covid_storage::{StagedArtifact, StagingConfig, StagingPublisher, StorageError};
use covid_transform::{transform, TransformError, SOURCE_TABLES};
use covid_warehouse::{
    StatementReport, StatementService, WarehouseConfig, WarehouseError, WarehouseLoader,
};

// ── Config ────────────────────────────────────────────────────

/// Every setting of one run.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Active env profile; empty means the unprefixed keys.
    pub profile: String,
    pub aws: AwsConfig,
    pub athena: AthenaConfig,
    pub staging: StagingConfig,
    pub warehouse: WarehouseConfig,
}

impl PipelineConfig {
    pub fn from_env() -> Self {
        Self::from_env_profiled(&active_profile())
    }

    pub fn from_env_profiled(profile: &str) -> Self {
        Self {
            profile: profile.to_string(),
            aws: AwsConfig::from_env_profiled(profile),
            athena: AthenaConfig::from_env_profiled(profile),
            staging: StagingConfig::from_env_profiled(profile),
            warehouse: WarehouseConfig::from_env_profiled(profile),
        }
    }

    pub fn profile_label(&self) -> &str {
        if self.profile.is_empty() { "default" } else { &self.profile }
    }

    /// Print a redacted summary for startup logs.
    pub fn log_summary(&self) {
        info!("Config loaded (profile: {}):", self.profile_label());
        info!(
            "  aws:        region={}, static_credentials={}",
            self.aws.region,
            self.aws.has_static_credentials()
        );
        info!(
            "  athena:     database={}, workgroup={}, output={}",
            self.athena.database, self.athena.workgroup, self.athena.output_location
        );
        info!(
            "  staging:    s3://{}/{} (fact table: {})",
            self.staging.bucket, self.staging.prefix, self.staging.stage_fact_table
        );
        info!(
            "  warehouse:  workgroup={}, database={}, transactional={}",
            self.warehouse.workgroup, self.warehouse.database, self.warehouse.transactional
        );
    }

    /// Config view with credentials left out.
    pub fn redacted_summary(&self) -> serde_json::Value {
        serde_json::json!({
            "profile": self.profile_label(),
            "aws": {
                "region": self.aws.region,
                "endpoint_url": self.aws.endpoint_url,
                "static_credentials": self.aws.has_static_credentials(),
            },
            "athena": {
                "database": self.athena.database,
                "catalog": self.athena.catalog,
                "workgroup": self.athena.workgroup,
                "output_location": self.athena.output_location,
                "encrypt_results": self.athena.encrypt_results,
                "poll": self.athena.poll,
            },
            "staging": self.staging,
            "warehouse": {
                "database": self.warehouse.database,
                "workgroup": self.warehouse.workgroup,
                "copy_region": self.warehouse.copy_region,
                "transactional": self.warehouse.transactional,
                "poll": self.warehouse.poll,
            },
        })
    }
}

// ── Errors ────────────────────────────────────────────────────

#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("extract failed: {0}")]
    Extract(#[from] AthenaError),

    #[error("transform failed: {0}")]
    Transform(#[from] TransformError),

    #[error("staging failed: {0}")]
    Staging(#[from] StorageError),

    #[error("warehouse load failed: {0}")]
    Warehouse(#[from] WarehouseError),
}

// ── Run ───────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TableSummary {
    pub name: String,
    pub rows: usize,
    pub columns: usize,
}

impl From<&Table> for TableSummary {
    fn from(table: &Table) -> Self {
        Self {
            name: table.name.clone(),
            rows: table.row_count(),
            columns: table.column_count(),
        }
    }
}

/// What a successful run did.
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub source_tables: Vec<TableSummary>,
    pub derived_tables: Vec<TableSummary>,
    pub staged: Vec<StagedArtifact>,
    pub statements: Vec<StatementReport>,
    pub elapsed_ms: u64,
}

/// The four stages wired together. Each stage runs to completion before the
/// next starts, and the first error ends the run.
pub struct Pipeline {
    extract: TableLoader,
    publisher: StagingPublisher,
    warehouse: WarehouseLoader,
}

impl Pipeline {
    pub fn new(extract: TableLoader, publisher: StagingPublisher, warehouse: WarehouseLoader) -> Self {
        Self {
            extract,
            publisher,
            warehouse,
        }
    }

    /// Build every stage from `config` over the given backends.
    ///
    /// `results` must be rooted at the Athena output bucket and `staging` at
    /// the staging bucket.
    pub fn from_config(
        config: &PipelineConfig,
        queries: Arc<dyn QueryService>,
        statements: Arc<dyn StatementService>,
        results: Arc<dyn ObjectStore>,
        staging: Arc<dyn ObjectStore>,
    ) -> Self {
        Self::new(
            TableLoader::new(queries, results, config.athena.clone()),
            StagingPublisher::new(staging.clone(), config.staging.clone()),
            WarehouseLoader::new(
                statements,
                staging,
                config.staging.clone(),
                config.warehouse.clone(),
            ),
        )
    }

    pub async fn run(&self) -> Result<RunSummary, PipelineError> {
        let start = Instant::now();

        let raw = self.extract.load_all(&SOURCE_TABLES).await?;
        let schema = transform(&raw)?;

        let to_stage: Vec<&Table> = if self.publisher.config().stage_fact_table {
            schema.tables().to_vec()
        } else {
            schema.dimensions().to_vec()
        };
        let staged = self.publisher.publish(&to_stage).await?;

        let statements = self.warehouse.load(&schema.tables()).await?;

        let summary = RunSummary {
            source_tables: raw.values().map(TableSummary::from).collect(),
            derived_tables: schema.tables().into_iter().map(TableSummary::from).collect(),
            staged,
            statements,
            elapsed_ms: start.elapsed().as_millis() as u64,
        };

        info!(
            sources = summary.source_tables.len(),
            staged = summary.staged.len(),
            statements = summary.statements.len(),
            elapsed_ms = summary.elapsed_ms,
            "Pipeline run complete"
        );
        Ok(summary)
    }
}
