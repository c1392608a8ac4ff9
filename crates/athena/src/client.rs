//! AWS Athena query execution.
//!
//! [`QueryService`] is the seam the loader talks to: submit a query, then ask
//! for its status. [`AthenaQueryService`] implements it over the AWS SDK.
//! Result files are not fetched here; Athena writes them to the configured S3
//! output location and the loader reads them from object storage.

use async_trait::async_trait;
use aws_sdk_athena::error::DisplayErrorContext;
use aws_sdk_athena::types::{
    EncryptionConfiguration, EncryptionOption, QueryExecutionContext, QueryExecutionState,
    ResultConfiguration,
};
use aws_types::SdkConfig;
use tracing::{debug, info};

use covid_core::{OperationStatus, PollError, TableError};

// ---------------------------------------------------------------------------
// Error
// ---------------------------------------------------------------------------

/// Errors that can occur while extracting tables through Athena.
#[derive(Debug, thiserror::Error)]
pub enum AthenaError {
    /// Waiting for the query failed: backend failure, budget exhausted, or a
    /// status call error.
    #[error(transparent)]
    Poll(#[from] PollError),

    /// An AWS SDK error (stringified with its full context).
    #[error("AWS SDK error: {0}")]
    AwsSdk(String),

    /// Invalid Athena configuration.
    #[error("config error: {0}")]
    Config(String),

    /// Fetching the result file failed.
    #[error("result download failed: {0}")]
    Download(#[from] object_store::Error),

    /// The result file could not be turned into a table.
    #[error(transparent)]
    Table(#[from] TableError),
}

// ---------------------------------------------------------------------------
// Service contract
// ---------------------------------------------------------------------------

/// A single `SELECT` submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryRequest {
    pub sql: String,
    pub database: String,
    pub catalog: Option<String>,
    pub workgroup: String,
    pub output_location: String,
    pub encrypt_results: bool,
}

/// Asynchronous query backend.
#[async_trait]
pub trait QueryService: Send + Sync {
    /// Start a query and return its execution id.
    async fn submit_query(&self, request: &QueryRequest) -> Result<String, AthenaError>;

    /// Current status of a previously submitted query.
    ///
    /// Implementations map "still running" conditions to
    /// [`OperationStatus::Pending`] rather than returning an error.
    async fn query_status(&self, query_id: &str) -> Result<OperationStatus, AthenaError>;
}

/// True when a backend error message only means the query has not finished yet.
///
/// Athena reports an in-flight query to result calls with messages such as
/// "Query has not yet finished". Those are retried; every other error is fatal.
/// This is the only place that depends on the wording.
pub fn is_query_not_finished(message: &str) -> bool {
    message.contains("not finish") || message.contains("not yet finished")
}

/// Map an Athena execution state onto the poller's status.
pub fn status_from_state(state: &QueryExecutionState, reason: Option<&str>) -> OperationStatus {
    match state {
        QueryExecutionState::Succeeded => OperationStatus::Finished,
        QueryExecutionState::Failed => {
            OperationStatus::Failed(reason.unwrap_or("unknown").to_string())
        }
        QueryExecutionState::Cancelled => OperationStatus::Failed(format!(
            "query was cancelled: {}",
            reason.unwrap_or("no reason given")
        )),
        // Queued | Running | unknown future variant
        other => OperationStatus::Pending(other.as_str().to_string()),
    }
}

// ---------------------------------------------------------------------------
// SDK implementation
// ---------------------------------------------------------------------------

/// [`QueryService`] backed by `aws-sdk-athena`.
pub struct AthenaQueryService {
    athena_client: aws_sdk_athena::Client,
}

impl AthenaQueryService {
    pub fn new(sdk_config: &SdkConfig) -> Self {
        Self::from_client(aws_sdk_athena::Client::new(sdk_config))
    }

    pub fn from_client(athena_client: aws_sdk_athena::Client) -> Self {
        Self { athena_client }
    }
}

#[async_trait]
impl QueryService for AthenaQueryService {
    async fn submit_query(&self, request: &QueryRequest) -> Result<String, AthenaError> {
        info!(sql = %request.sql, database = %request.database, "Starting Athena query");

        let mut ctx = QueryExecutionContext::builder().database(&request.database);
        if let Some(catalog) = &request.catalog {
            ctx = ctx.catalog(catalog);
        }

        let encryption = if request.encrypt_results {
            Some(
                EncryptionConfiguration::builder()
                    .encryption_option(EncryptionOption::SseS3)
                    .build()
                    .map_err(|e| AthenaError::AwsSdk(e.to_string()))?,
            )
        } else {
            None
        };

        let start_resp = self
            .athena_client
            .start_query_execution()
            .query_string(&request.sql)
            .query_execution_context(ctx.build())
            .result_configuration(
                ResultConfiguration::builder()
                    .output_location(&request.output_location)
                    .set_encryption_configuration(encryption)
                    .build(),
            )
            .work_group(&request.workgroup)
            .send()
            .await
            .map_err(|e| AthenaError::AwsSdk(DisplayErrorContext(&e).to_string()))?;

        let query_id = start_resp
            .query_execution_id()
            .ok_or_else(|| AthenaError::AwsSdk("No query execution ID returned".into()))?
            .to_string();

        info!(query_id = %query_id, "Query execution started");
        Ok(query_id)
    }

    async fn query_status(&self, query_id: &str) -> Result<OperationStatus, AthenaError> {
        let resp = match self
            .athena_client
            .get_query_execution()
            .query_execution_id(query_id)
            .send()
            .await
        {
            Ok(resp) => resp,
            Err(e) => {
                let message = DisplayErrorContext(&e).to_string();
                if is_query_not_finished(&message) {
                    debug!(query_id = %query_id, message = %message, "Query not finished yet");
                    return Ok(OperationStatus::Pending("NOT_FINISHED".into()));
                }
                return Err(AthenaError::AwsSdk(message));
            }
        };

        let qe = resp
            .query_execution()
            .ok_or_else(|| AthenaError::AwsSdk("No query execution in response".into()))?;

        let status = qe.status();
        let state = status
            .and_then(|s| s.state())
            .cloned()
            .unwrap_or(QueryExecutionState::Queued);
        let reason = status.and_then(|s| s.state_change_reason());

        Ok(status_from_state(&state, reason))
    }
}

// ---------------------------------------------------------------------------
// Tests: status mapping only, no AWS calls
// ---------------------------------------------------------------------------
