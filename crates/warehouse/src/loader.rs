//! Create the star-schema tables in Redshift and bulk-load them from staging.

use std::sync::Arc;

use object_store::ObjectStore;
use serde::Serialize;
use tracing::{debug, info};

use covid_core::{OperationStatus, Poller, Table};
use covid_storage::{object_exists, StagingConfig};

use crate::client::{StatementService, WarehouseError};
use crate::config::WarehouseConfig;
use crate::ddl::{copy_statement, create_table_statement};

/// One completed statement (or batch, in transactional mode).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatementReport {
    /// Label used in logs, e.g. `factCovidSQL` or `dimDateCopy`.
    pub name: String,
    pub statement_id: String,
    pub polls: u32,
}

/// Runs the schema phase then the load phase against the warehouse.
///
/// Statements run one at a time in table order; each is polled to a terminal
/// state before the next is submitted. The first failure stops everything that
/// follows, and statements that already finished are left in place.
pub struct WarehouseLoader {
    service: Arc<dyn StatementService>,
    staging_store: Arc<dyn ObjectStore>,
    staging: StagingConfig,
    config: WarehouseConfig,
    poller: Poller,
}

impl WarehouseLoader {
    /// `staging_store` must be rooted at `staging.bucket`.
    pub fn new(
        service: Arc<dyn StatementService>,
        staging_store: Arc<dyn ObjectStore>,
        staging: StagingConfig,
        config: WarehouseConfig,
    ) -> Self {
        let poller = Poller::new(config.poll.clone());
        Self {
            service,
            staging_store,
            staging,
            config,
            poller,
        }
    }

    pub fn config(&self) -> &WarehouseConfig {
        &self.config
    }

    /// `(label, sql)` pairs of the schema phase.
    pub fn schema_statements(&self, tables: &[&Table]) -> Vec<(String, String)> {
        tables
            .iter()
            .map(|t| (format!("{}SQL", t.name), create_table_statement(t)))
            .collect()
    }

    /// `(label, sql)` pairs of the load phase.
    pub fn copy_statements(&self, tables: &[&Table]) -> Vec<(String, String)> {
        tables
            .iter()
            .map(|t| {
                let sql = copy_statement(
                    &t.name,
                    &self.staging.uri_for(&t.name),
                    &self.config.iam_role,
                    &self.config.copy_region,
                );
                (format!("{}Copy", t.name), sql)
            })
            .collect()
    }

    /// Issue one `CREATE TABLE` per table.
    pub async fn create_tables(
        &self,
        tables: &[&Table],
    ) -> Result<Vec<StatementReport>, WarehouseError> {
        let statements = self.schema_statements(tables);
        if self.config.transactional {
            return Ok(vec![self.run_batch("schema", statements).await?]);
        }

        let mut reports = Vec::with_capacity(statements.len());
        for (label, sql) in statements {
            reports.push(self.run(&label, &sql).await?);
        }
        Ok(reports)
    }

    /// Issue one `COPY` per table.
    ///
    /// Each table's staged file must exist before its COPY is sent. In
    /// transactional mode every file is checked before the batch goes out.
    pub async fn copy_tables(
        &self,
        tables: &[&Table],
    ) -> Result<Vec<StatementReport>, WarehouseError> {
        let statements = self.copy_statements(tables);
        if self.config.transactional {
            for table in tables {
                self.ensure_staged(&table.name).await?;
            }
            return Ok(vec![self.run_batch("load", statements).await?]);
        }

        let mut reports = Vec::with_capacity(statements.len());
        for (table, (label, sql)) in tables.iter().zip(statements) {
            self.ensure_staged(&table.name).await?;
            reports.push(self.run(&label, &sql).await?);
        }
        Ok(reports)
    }

    /// Schema phase for every table, then load phase for every table.
    pub async fn load(&self, tables: &[&Table]) -> Result<Vec<StatementReport>, WarehouseError> {
        let mut reports = self.create_tables(tables).await?;
        info!(tables = tables.len(), "Warehouse tables created");
        reports.extend(self.copy_tables(tables).await?);
        info!(tables = tables.len(), "Warehouse tables loaded");
        Ok(reports)
    }

    async fn ensure_staged(&self, table: &str) -> Result<(), WarehouseError> {
        let key = self.staging.key_for(table);
        if object_exists(self.staging_store.as_ref(), &key).await? {
            return Ok(());
        }
        Err(WarehouseError::MissingStagedArtifact {
            table: table.to_string(),
            uri: self.staging.uri_for(table),
        })
    }

    async fn run(&self, label: &str, sql: &str) -> Result<StatementReport, WarehouseError> {
        debug!(statement = %label, "{sql}");
        let id = self
            .service
            .execute_statement(&self.config.database, sql, &self.config.workgroup)
            .await?;
        self.wait(label, id).await
    }

    async fn run_batch(
        &self,
        label: &str,
        statements: Vec<(String, String)>,
    ) -> Result<StatementReport, WarehouseError> {
        let sqls: Vec<String> = statements.into_iter().map(|(_, sql)| sql).collect();
        let id = self
            .service
            .execute_batch(&self.config.database, &sqls, &self.config.workgroup)
            .await?;
        self.wait(label, id).await
    }

    async fn probe(&self, id: &str) -> Result<OperationStatus, WarehouseError> {
        Ok(self.service.describe_statement(id).await?.to_operation_status())
    }

    async fn wait(&self, label: &str, id: String) -> Result<StatementReport, WarehouseError> {
        let outcome = self
            .poller
            .await_completion(&id, || self.probe(&id))
            .await?;

        info!(
            statement = %label,
            statement_id = %id,
            polls = outcome.attempts,
            "{label} execution successful"
        );

        Ok(StatementReport {
            name: label.to_string(),
            statement_id: id,
            polls: outcome.attempts,
        })
    }
}
