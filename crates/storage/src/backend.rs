use std::sync::Arc;

use object_store::aws::AmazonS3Builder;
use object_store::ObjectStore;
use tracing::info;

use covid_core::AwsConfig;

use crate::error::StorageError;

/// S3 bucket wrapped as an [`ObjectStore`].
pub struct S3Backend {
    pub store: Arc<dyn ObjectStore>,
    pub bucket: String,
}

impl S3Backend {
    pub fn new(aws: &AwsConfig, bucket: &str) -> Result<Self, StorageError> {
        if bucket.is_empty() {
            return Err(StorageError::NotConfigured("S3 bucket name is empty".into()));
        }

        let mut builder = AmazonS3Builder::new().with_region(&aws.region);

        if let Some(ref key) = aws.access_key_id {
            builder = builder.with_access_key_id(key);
        }
        if let Some(ref secret) = aws.secret_access_key {
            builder = builder.with_secret_access_key(secret);
        }
        if let Some(ref token) = aws.session_token {
            builder = builder.with_token(token);
        }

        if let Some(endpoint_url) = aws.endpoint() {
            builder = builder
                .with_bucket_name(bucket)
                .with_endpoint(&endpoint_url)
                .with_allow_http(endpoint_url.starts_with("http://"));
        } else {
            builder = builder.with_url(format!("s3://{}", bucket));
        }

        let store = builder.build()?;

        info!("Storage: S3 backend s3://{} (region: {})", bucket, aws.region);

        Ok(Self {
            store: Arc::new(store),
            bucket: bucket.to_string(),
        })
    }

    /// Get an Arc-wrapped ObjectStore.
    pub fn store_arc(&self) -> Arc<dyn ObjectStore> {
        self.store.clone()
    }
}
