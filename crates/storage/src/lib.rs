pub mod backend;
pub mod error;
pub mod staging;

pub use backend::S3Backend;
pub use error::StorageError;
pub use staging::{object_exists, staged_key, StagedArtifact, StagingConfig, StagingPublisher};
