//! Stage derived tables as CSV objects for the warehouse bulk copy.

use std::sync::Arc;
use std::time::Instant;

use object_store::path::Path;
use object_store::ObjectStore;
use serde::{Deserialize, Serialize};
use tracing::info;

use covid_core::config::{active_profile, profiled_env_bool, profiled_env_or};
use covid_core::Table;

use crate::error::StorageError;

const DEFAULT_BUCKET: &str = "covid-19-ukhsa";
const DEFAULT_PREFIX: &str = "final-output";

/// Where staged files go.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StagingConfig {
    pub bucket: String,
    /// Key prefix without trailing slash.
    pub prefix: String,
    /// Also stage the fact table. Off by default: only dimensions are staged
    /// and the fact file is expected to be provided out of band.
    pub stage_fact_table: bool,
}

impl StagingConfig {
    pub fn from_env() -> Self {
        Self::from_env_profiled(&active_profile())
    }

    pub fn from_env_profiled(p: &str) -> Self {
        Self {
            bucket: profiled_env_or(p, "STAGING_BUCKET", DEFAULT_BUCKET),
            prefix: profiled_env_or(p, "STAGING_PREFIX", DEFAULT_PREFIX)
                .trim_matches('/')
                .to_string(),
            stage_fact_table: profiled_env_bool(p, "STAGE_FACT_TABLE", false),
        }
    }

    pub fn key_for(&self, table: &str) -> String {
        staged_key(&self.prefix, table)
    }

    /// `s3://` URI of a table's staged file, as referenced by COPY statements.
    pub fn uri_for(&self, table: &str) -> String {
        format!("s3://{}/{}", self.bucket, self.key_for(table))
    }
}

impl Default for StagingConfig {
    fn default() -> Self {
        Self {
            bucket: DEFAULT_BUCKET.to_string(),
            prefix: DEFAULT_PREFIX.to_string(),
            stage_fact_table: false,
        }
    }
}

/// Object key of a staged table: `<prefix>/<table>.csv`.
pub fn staged_key(prefix: &str, table: &str) -> String {
    if prefix.is_empty() {
        format!("{}.csv", table)
    } else {
        format!("{}/{}.csv", prefix, table)
    }
}

/// Whether an object exists. Only `NotFound` counts as absent; other errors propagate.
pub async fn object_exists(store: &dyn ObjectStore, key: &str) -> Result<bool, StorageError> {
    match store.head(&Path::from(key)).await {
        Ok(_) => Ok(true),
        Err(object_store::Error::NotFound { .. }) => Ok(false),
        Err(e) => Err(e.into()),
    }
}

/// One file written by [`StagingPublisher::publish`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StagedArtifact {
    pub table: String,
    pub key: String,
    pub rows: usize,
    pub bytes: usize,
}

/// Writes derived tables to object storage as comma-separated text.
///
/// Each file has a header row and a leading unnamed row-index column. Existing
/// objects are overwritten; nothing is ever deleted.
pub struct StagingPublisher {
    store: Arc<dyn ObjectStore>,
    config: StagingConfig,
}

impl StagingPublisher {
    /// `store` must be rooted at `config.bucket`.
    pub fn new(store: Arc<dyn ObjectStore>, config: StagingConfig) -> Self {
        Self { store, config }
    }

    pub fn config(&self) -> &StagingConfig {
        &self.config
    }

    /// Stage each table under `<prefix>/<table name>.csv`, in order.
    pub async fn publish(&self, tables: &[&Table]) -> Result<Vec<StagedArtifact>, StorageError> {
        let start = Instant::now();
        let mut staged = Vec::with_capacity(tables.len());

        for table in tables {
            let data = table.to_csv_bytes(true)?;
            let key = self.config.key_for(&table.name);
            let size = data.len();

            self.store
                .put(&Path::from(key.as_str()), bytes::Bytes::from(data).into())
                .await?;

            info!(
                table = %table.name,
                key = %key,
                rows = table.row_count(),
                bytes = size,
                "Staged table"
            );

            staged.push(StagedArtifact {
                table: table.name.clone(),
                key,
                rows: table.row_count(),
                bytes: size,
            });
        }

        info!(
            "Staging complete: {} files in {:.1}s",
            staged.len(),
            start.elapsed().as_secs_f64()
        );
        Ok(staged)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use covid_core::Value;
    use object_store::memory::InMemory;

    fn dim(name: &str) -> Table {
        Table::from_rows(
            name,
            vec!["fips".into(), "county".into()],
            vec![
                vec![Value::Integer(1001), Value::Text("Autauga".into())],
                vec![Value::Integer(1003), Value::Null],
            ],
        )
        .unwrap()
    }

    async fn read(store: &InMemory, key: &str) -> String {
        let data = store
            .get(&Path::from(key))
            .await
            .unwrap()
            .bytes()
            .await
            .unwrap();
        String::from_utf8(data.to_vec()).unwrap()
    }

    #[test]
    fn key_layout() {
        assert_eq!(staged_key("final-output", "dimDate"), "final-output/dimDate.csv");
        assert_eq!(staged_key("", "dimDate"), "dimDate.csv");

        let cfg = StagingConfig::default();
        assert_eq!(
            cfg.uri_for("factCovid"),
            "s3://covid-19-ukhsa/final-output/factCovid.csv"
        );
        assert!(!cfg.stage_fact_table);
    }

    #[tokio::test]
    async fn publishes_csv_with_index_and_header() {
        let store = Arc::new(InMemory::new());
        let publisher = StagingPublisher::new(store.clone(), StagingConfig::default());

        let region = dim("dimRegion");
        let hospital = dim("dimHospital");
        let staged = publisher.publish(&[&region, &hospital]).await.unwrap();

        assert_eq!(staged.len(), 2);
        assert_eq!(staged[0].key, "final-output/dimRegion.csv");
        assert_eq!(staged[0].rows, 2);
        assert_eq!(staged[1].table, "dimHospital");

        let body = read(&store, "final-output/dimRegion.csv").await;
        assert_eq!(body, ",fips,county\n0,1001,Autauga\n1,1003,\n");
        assert_eq!(staged[0].bytes, body.len());
    }

    #[tokio::test]
    async fn republish_overwrites() {
        let store = Arc::new(InMemory::new());
        let publisher = StagingPublisher::new(store.clone(), StagingConfig::default());

        publisher.publish(&[&dim("dimDate")]).await.unwrap();
        let smaller = dim("dimDate").head(1);
        publisher.publish(&[&smaller]).await.unwrap();

        let body = read(&store, "final-output/dimDate.csv").await;
        assert_eq!(body, ",fips,county\n0,1001,Autauga\n");
    }

    #[tokio::test]
    async fn existence_check() {
        let store = Arc::new(InMemory::new());
        let publisher = StagingPublisher::new(store.clone(), StagingConfig::default());
        publisher.publish(&[&dim("dimRegion")]).await.unwrap();

        assert!(object_exists(store.as_ref(), "final-output/dimRegion.csv").await.unwrap());
        assert!(!object_exists(store.as_ref(), "final-output/factCovid.csv").await.unwrap());
    }
}
