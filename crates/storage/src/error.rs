use thiserror::Error;

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("object store error: {0}")]
    ObjectStore(#[from] object_store::Error),

    #[error("table error: {0}")]
    Table(#[from] covid_core::TableError),

    #[error("not configured: {0}")]
    NotConfigured(String),
}
