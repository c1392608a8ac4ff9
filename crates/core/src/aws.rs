//! Shared AWS SDK configuration for the Athena and Redshift Data clients.

use aws_config::{BehaviorVersion, Region};
use aws_credential_types::Credentials;
use aws_types::SdkConfig;
use tracing::info;

use crate::config::AwsConfig;

/// Build an [`SdkConfig`] from [`AwsConfig`].
///
/// Static credentials win over the default provider chain when both the key id
/// and secret are set. The endpoint override applies to every client built
/// from the returned config.
pub async fn load_sdk_config(aws: &AwsConfig) -> SdkConfig {
    let mut loader =
        aws_config::defaults(BehaviorVersion::latest()).region(Region::new(aws.region.clone()));

    if let (Some(key_id), Some(secret)) = (&aws.access_key_id, &aws.secret_access_key) {
        let creds = Credentials::new(
            key_id,
            secret,
            aws.session_token.clone(),
            None,
            "covid-etl-static",
        );
        loader = loader.credentials_provider(creds);
    }

    if let Some(endpoint) = aws.endpoint() {
        loader = loader.endpoint_url(endpoint);
    }

    let sdk_config = loader.load().await;

    info!(
        region = %aws.region,
        static_credentials = aws.has_static_credentials(),
        "AWS SDK config loaded"
    );

    sdk_config
}
