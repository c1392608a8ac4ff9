//! Redshift Data API statement execution.
//!
//! [`StatementService`] is the seam the loader talks to: start a statement,
//! then describe it until it settles. [`RedshiftDataService`] implements it over
//! `aws-sdk-redshiftdata` against a serverless workgroup.

use async_trait::async_trait;
use aws_sdk_redshiftdata::error::DisplayErrorContext;
use aws_types::SdkConfig;
use tracing::info;

use covid_core::{OperationStatus, PollError};
use covid_storage::StorageError;

// ---------------------------------------------------------------------------
// Error
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum WarehouseError {
    /// The statement failed, the poll budget ran out, or describing it errored.
    #[error(transparent)]
    Poll(#[from] PollError),

    /// An AWS SDK error (stringified with its full context).
    #[error("AWS SDK error: {0}")]
    AwsSdk(String),

    /// A COPY would read a file that was never staged.
    #[error("staged file {uri} for table {table} does not exist")]
    MissingStagedArtifact { table: String, uri: String },

    #[error(transparent)]
    Storage(#[from] StorageError),
}

// ---------------------------------------------------------------------------
// Service contract
// ---------------------------------------------------------------------------

/// Result of describing a statement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatementStatus {
    /// Backend status label, e.g. `SUBMITTED`, `STARTED`, `FINISHED`, `FAILED`.
    pub status: String,
    /// Backend error text, set when the statement failed.
    pub error: Option<String>,
}

impl StatementStatus {
    pub fn new(status: impl Into<String>) -> Self {
        Self {
            status: status.into(),
            error: None,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            status: "FAILED".into(),
            error: Some(error.into()),
        }
    }

    /// `FINISHED` succeeds, `FAILED` and `ABORTED` are fatal, everything else
    /// keeps the poller waiting.
    pub fn to_operation_status(&self) -> OperationStatus {
        match self.status.as_str() {
            "FINISHED" => OperationStatus::Finished,
            "FAILED" => OperationStatus::Failed(format!(
                "Query execution failed: {}",
                self.error.as_deref().unwrap_or("unknown error")
            )),
            "ABORTED" => OperationStatus::Failed(format!(
                "Statement was aborted: {}",
                self.error.as_deref().unwrap_or("no reason given")
            )),
            other => OperationStatus::Pending(other.to_string()),
        }
    }
}

/// Asynchronous SQL statement backend.
#[async_trait]
pub trait StatementService: Send + Sync {
    /// Start one statement and return its id.
    async fn execute_statement(
        &self,
        database: &str,
        sql: &str,
        workgroup: &str,
    ) -> Result<String, WarehouseError>;

    /// Start several statements that the backend runs as one transaction.
    async fn execute_batch(
        &self,
        database: &str,
        sqls: &[String],
        workgroup: &str,
    ) -> Result<String, WarehouseError>;

    async fn describe_statement(&self, statement_id: &str)
        -> Result<StatementStatus, WarehouseError>;
}

// ---------------------------------------------------------------------------
// SDK implementation
// ---------------------------------------------------------------------------

/// [`StatementService`] backed by `aws-sdk-redshiftdata`.
pub struct RedshiftDataService {
    client: aws_sdk_redshiftdata::Client,
}

impl RedshiftDataService {
    pub fn new(sdk_config: &SdkConfig) -> Self {
        Self::from_client(aws_sdk_redshiftdata::Client::new(sdk_config))
    }

    pub fn from_client(client: aws_sdk_redshiftdata::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl StatementService for RedshiftDataService {
    async fn execute_statement(
        &self,
        database: &str,
        sql: &str,
        workgroup: &str,
    ) -> Result<String, WarehouseError> {
        let resp = self
            .client
            .execute_statement()
            .database(database)
            .sql(sql)
            .workgroup_name(workgroup)
            .send()
            .await
            .map_err(|e| WarehouseError::AwsSdk(DisplayErrorContext(&e).to_string()))?;

        let id = resp
            .id()
            .ok_or_else(|| WarehouseError::AwsSdk("No statement ID returned".into()))?
            .to_string();

        info!(statement_id = %id, workgroup = %workgroup, "Statement submitted");
        Ok(id)
    }

    async fn execute_batch(
        &self,
        database: &str,
        sqls: &[String],
        workgroup: &str,
    ) -> Result<String, WarehouseError> {
        let resp = self
            .client
            .batch_execute_statement()
            .database(database)
            .set_sqls(Some(sqls.to_vec()))
            .workgroup_name(workgroup)
            .send()
            .await
            .map_err(|e| WarehouseError::AwsSdk(DisplayErrorContext(&e).to_string()))?;

        let id = resp
            .id()
            .ok_or_else(|| WarehouseError::AwsSdk("No statement ID returned".into()))?
            .to_string();

        info!(
            statement_id = %id,
            statements = sqls.len(),
            workgroup = %workgroup,
            "Statement batch submitted"
        );
        Ok(id)
    }

    async fn describe_statement(
        &self,
        statement_id: &str,
    ) -> Result<StatementStatus, WarehouseError> {
        let resp = self
            .client
            .describe_statement()
            .id(statement_id)
            .send()
            .await
            .map_err(|e| WarehouseError::AwsSdk(DisplayErrorContext(&e).to_string()))?;

        Ok(StatementStatus {
            status: resp
                .status()
                .map(|s| s.as_str().to_string())
                .unwrap_or_else(|| "UNKNOWN".to_string()),
            error: resp.error().map(str::to_string),
        })
    }
}
