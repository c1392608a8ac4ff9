//! Pull raw source tables out of Athena, one `SELECT *` at a time.

use std::sync::Arc;

use indexmap::IndexMap;
use object_store::path::Path;
use object_store::ObjectStore;
use tracing::{debug, info};

use covid_core::{Poller, Table};

use crate::client::{AthenaError, QueryRequest, QueryService};
use crate::config::AthenaConfig;

/// Source table whose real header arrives as its first data row.
pub const STATES_ABV: &str = "states_abv";

/// Loads raw tables by running one query per table name.
///
/// Strictly serial: each query is submitted, polled to completion and its
/// result file downloaded before the next one is submitted. The first error
/// aborts the whole load.
pub struct TableLoader {
    service: Arc<dyn QueryService>,
    results: Arc<dyn ObjectStore>,
    config: AthenaConfig,
    poller: Poller,
}

impl TableLoader {
    /// `results` must be an object store rooted at the output location's bucket.
    pub fn new(
        service: Arc<dyn QueryService>,
        results: Arc<dyn ObjectStore>,
        config: AthenaConfig,
    ) -> Self {
        let poller = Poller::new(config.poll.clone());
        Self {
            service,
            results,
            config,
            poller,
        }
    }

    pub fn config(&self) -> &AthenaConfig {
        &self.config
    }

    /// The query submitted for `table`.
    pub fn query_for(&self, table: &str) -> QueryRequest {
        QueryRequest {
            sql: format!("SELECT * FROM {table}"),
            database: self.config.database.clone(),
            catalog: self.config.catalog.clone(),
            workgroup: self.config.workgroup.clone(),
            output_location: self.config.output_location.clone(),
            encrypt_results: self.config.encrypt_results,
        }
    }

    /// Load every table in `names`, in order.
    pub async fn load_all(&self, names: &[&str]) -> Result<IndexMap<String, Table>, AthenaError> {
        let mut tables = IndexMap::with_capacity(names.len());
        for name in names {
            let table = self.load_table(name).await?;
            tables.insert(name.to_string(), table);
        }
        info!(tables = tables.len(), "All source tables loaded");
        Ok(tables)
    }

    /// Query, wait for, download and parse a single table.
    pub async fn load_table(&self, name: &str) -> Result<Table, AthenaError> {
        let request = self.query_for(name);
        let query_id = self.service.submit_query(&request).await?;

        let outcome = self
            .poller
            .await_completion(&query_id, || self.service.query_status(&query_id))
            .await?;

        let key = self.config.result_key(&query_id)?;
        let data = self
            .results
            .get(&Path::from(key.as_str()))
            .await?
            .bytes()
            .await?;

        let mut table = Table::from_csv_reader(name, data.as_ref())?;
        if name == STATES_ABV {
            table.promote_first_row_to_header()?;
        }

        info!(
            table = %name,
            query_id = %query_id,
            rows = table.row_count(),
            columns = table.column_count(),
            polls = outcome.attempts,
            "Loaded source table"
        );
        debug!("{}\n{}", name.to_uppercase(), table.head(5));

        Ok(table)
    }
}
