use serde::{Deserialize, Serialize};
use url::Url;

use covid_core::config::{
    active_profile, profiled_env_bool, profiled_env_opt, profiled_env_or,
};
use covid_core::PollPolicy;

use crate::client::AthenaError;

/// S3 location Athena writes query result files to.
const DEFAULT_OUTPUT_LOCATION: &str = "s3://covid-19-ukhsa/output/";

/// Glue database holding the raw COVID-19 tables.
const DEFAULT_DATABASE: &str = "covid-19";

const DEFAULT_POLL_INTERVAL_MS: u64 = 500;

// ── AthenaConfig ─────────────────────────────────────────────────

/// Configuration for the Athena extract step.
///
/// Reads from environment variables with optional profile prefix.
/// When `COVID_PROFILE=PROD`, checks `PROD_ATHENA_DATABASE` before `ATHENA_DATABASE`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AthenaConfig {
    /// Athena database (schema) the source tables live in.
    pub database: String,
    /// Data catalog. `None` uses the account default.
    pub catalog: Option<String>,
    /// Athena workgroup.
    pub workgroup: String,
    /// S3 prefix for query result files.
    pub output_location: String,
    /// Request SSE-S3 encryption of result files.
    pub encrypt_results: bool,
    /// Status polling for query executions.
    pub poll: PollPolicy,
}

impl AthenaConfig {
    pub fn from_env() -> Self {
        Self::from_env_profiled(&active_profile())
    }

    pub fn from_env_profiled(profile: &str) -> Self {
        Self {
            database: profiled_env_or(profile, "ATHENA_DATABASE", DEFAULT_DATABASE),
            catalog: profiled_env_opt(profile, "ATHENA_CATALOG"),
            workgroup: profiled_env_or(profile, "ATHENA_WORKGROUP", "primary"),
            output_location: profiled_env_or(
                profile,
                "ATHENA_OUTPUT_LOCATION",
                DEFAULT_OUTPUT_LOCATION,
            ),
            encrypt_results: profiled_env_bool(profile, "ATHENA_ENCRYPT_RESULTS", true),
            poll: PollPolicy::from_env_profiled(profile, "ATHENA", DEFAULT_POLL_INTERVAL_MS),
        }
    }

    fn output_url(&self) -> Result<Url, AthenaError> {
        let url = Url::parse(&self.output_location).map_err(|e| {
            AthenaError::Config(format!(
                "invalid output location {:?}: {e}",
                self.output_location
            ))
        })?;
        if url.scheme() != "s3" || url.host_str().map_or(true, str::is_empty) {
            return Err(AthenaError::Config(format!(
                "output location {:?} is not an s3://bucket/prefix URL",
                self.output_location
            )));
        }
        Ok(url)
    }

    /// Bucket part of the output location.
    pub fn results_bucket(&self) -> Result<String, AthenaError> {
        let url = self.output_url()?;
        Ok(url.host_str().unwrap_or_default().to_string())
    }

    /// Object key of the CSV file Athena writes for `query_id`:
    /// `<output prefix>/<query_id>.csv`.
    pub fn result_key(&self, query_id: &str) -> Result<String, AthenaError> {
        let url = self.output_url()?;
        let prefix = url.path().trim_matches('/');
        if prefix.is_empty() {
            Ok(format!("{query_id}.csv"))
        } else {
            Ok(format!("{prefix}/{query_id}.csv"))
        }
    }
}

impl Default for AthenaConfig {
    fn default() -> Self {
        Self {
            database: DEFAULT_DATABASE.to_string(),
            catalog: None,
            workgroup: "primary".to_string(),
            output_location: DEFAULT_OUTPUT_LOCATION.to_string(),
            encrypt_results: true,
            poll: PollPolicy::fixed(std::time::Duration::from_millis(DEFAULT_POLL_INTERVAL_MS)),
        }
    }
}

// ── Tests ────────────────────────────────────────────────────────
