use serde::{Deserialize, Serialize};

use covid_core::config::{
    active_profile, profiled_env_bool, profiled_env_opt, profiled_env_or, DEFAULT_REGION,
};
use covid_core::PollPolicy;

const DEFAULT_DATABASE: &str = "dev";
const DEFAULT_WORKGROUP: &str = "ukhsa-redshift-cluster";
const DEFAULT_IAM_ROLE: &str = "arn:aws:iam::211125699284:role/redshift-s3-access";
const DEFAULT_POLL_INTERVAL_MS: u64 = 2000;

/// Redshift Serverless target of the load phase.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WarehouseConfig {
    pub database: String,
    pub workgroup: String,
    /// IAM role Redshift assumes to read staged files.
    pub iam_role: String,
    /// Region of the staging bucket, passed to COPY.
    pub copy_region: String,
    /// Submit each phase as one batch, which Redshift runs in a single transaction.
    pub transactional: bool,
    pub poll: PollPolicy,
}

impl WarehouseConfig {
    pub fn from_env() -> Self {
        Self::from_env_profiled(&active_profile())
    }

    /// `REDSHIFT_COPY_REGION` falls back to `AWS_REGION` before using the default.
    pub fn from_env_profiled(p: &str) -> Self {
        let copy_region = profiled_env_opt(p, "REDSHIFT_COPY_REGION")
            .or_else(|| profiled_env_opt(p, "AWS_REGION"))
            .unwrap_or_else(|| DEFAULT_REGION.to_string());

        Self {
            database: profiled_env_or(p, "REDSHIFT_DATABASE", DEFAULT_DATABASE),
            workgroup: profiled_env_or(p, "REDSHIFT_WORKGROUP", DEFAULT_WORKGROUP),
            iam_role: profiled_env_or(p, "REDSHIFT_IAM_ROLE", DEFAULT_IAM_ROLE),
            copy_region,
            transactional: profiled_env_bool(p, "REDSHIFT_TRANSACTIONAL", false),
            poll: PollPolicy::from_env_profiled(p, "REDSHIFT", DEFAULT_POLL_INTERVAL_MS),
        }
    }
}

impl Default for WarehouseConfig {
    fn default() -> Self {
        Self {
            database: DEFAULT_DATABASE.to_string(),
            workgroup: DEFAULT_WORKGROUP.to_string(),
            iam_role: DEFAULT_IAM_ROLE.to_string(),
            copy_region: DEFAULT_REGION.to_string(),
            transactional: false,
            poll: PollPolicy::fixed(std::time::Duration::from_millis(DEFAULT_POLL_INTERVAL_MS)),
        }
    }
}
