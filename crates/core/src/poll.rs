//! Submit-then-poll protocol for asynchronous backend operations.
//!
//! Both Athena query executions and Redshift Data statements are started with
//! one call and then observed with repeated status checks until they reach a
//! terminal state. [`Poller`] owns that loop; callers supply a probe closure that
//! maps the backend's status into an [`OperationStatus`].

use std::fmt;
use std::future::Future;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tracing::{debug, error, warn};

use crate::config::{profiled_env_f64, profiled_env_u32, profiled_env_u64};
use crate::error::PollError;

/// Backend status of an operation, as seen by a single probe.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OperationStatus {
    /// Not terminal yet. Carries the backend's state label for logging.
    Pending(String),
    Finished,
    Failed(String),
}

impl OperationStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, OperationStatus::Pending(_))
    }
}

/// How often to poll and when to give up.
///
/// The default is a fixed interval with no attempt limit: the loop only ends
/// on a terminal status or process termination.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PollPolicy {
    /// Delay before the second probe.
    pub interval_ms: u64,
    /// Maximum number of probes. 0 = unbounded.
    pub max_attempts: u32,
    /// Multiplier applied to the delay after each pending probe. 1.0 = fixed.
    pub backoff_factor: f64,
    /// Upper bound on the delay when `backoff_factor > 1`.
    pub max_interval_ms: u64,
}

impl PollPolicy {
    /// Fixed-interval, unbounded polling.
    pub fn fixed(interval: Duration) -> Self {
        let ms = interval.as_millis() as u64;
        Self {
            interval_ms: ms,
            max_attempts: 0,
            backoff_factor: 1.0,
            max_interval_ms: ms,
        }
    }

    /// Read `{PREFIX}_POLL_INTERVAL_MS`, `{PREFIX}_POLL_MAX_ATTEMPTS`,
    /// `{PREFIX}_POLL_BACKOFF` and `{PREFIX}_POLL_MAX_INTERVAL_MS`.
    pub fn from_env_profiled(profile: &str, prefix: &str, default_interval_ms: u64) -> Self {
        let interval_ms = profiled_env_u64(
            profile,
            &format!("{prefix}_POLL_INTERVAL_MS"),
            default_interval_ms,
        );
        let backoff_factor = profiled_env_f64(profile, &format!("{prefix}_POLL_BACKOFF"), 1.0);

        Self {
            interval_ms,
            max_attempts: profiled_env_u32(profile, &format!("{prefix}_POLL_MAX_ATTEMPTS"), 0),
            backoff_factor: if backoff_factor < 1.0 { 1.0 } else { backoff_factor },
            max_interval_ms: profiled_env_u64(
                profile,
                &format!("{prefix}_POLL_MAX_INTERVAL_MS"),
                interval_ms.max(30_000),
            ),
        }
    }

    pub fn is_bounded(&self) -> bool {
        self.max_attempts > 0
    }

    fn next_delay(&self, current_ms: u64) -> u64 {
        if self.backoff_factor <= 1.0 {
            return current_ms;
        }
        let next = (current_ms as f64 * self.backoff_factor) as u64;
        next.min(self.max_interval_ms).max(current_ms)
    }
}

/// What a successful wait cost.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollOutcome {
    /// Number of status probes issued, including the terminal one.
    pub attempts: u32,
    pub elapsed: Duration,
}

/// Runs the polling loop for a single operation handle.
#[derive(Debug, Clone)]
pub struct Poller {
    policy: PollPolicy,
}

impl Poller {
    pub fn new(policy: PollPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> &PollPolicy {
        &self.policy
    }

    /// Probe until the operation reaches a terminal state.
    ///
    /// The first probe is issued immediately. `Failed` is returned as
    /// [`PollError::Failed`] with the backend's reason, without further probes.
    /// A probe error aborts the wait; callers that need to tolerate specific
    /// transient errors must map them to `Pending` inside the probe.
    pub async fn await_completion<F, Fut, E>(
        &self,
        handle: &str,
        mut probe: F,
    ) -> Result<PollOutcome, PollError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<OperationStatus, E>>,
        E: fmt::Display,
    {
        let start = Instant::now();
        let mut delay_ms = self.policy.interval_ms;
        let mut attempts: u32 = 0;

        loop {
            attempts += 1;

            let status = probe().await.map_err(|e| PollError::Probe {
                handle: handle.to_string(),
                message: e.to_string(),
            })?;

            match status {
                OperationStatus::Finished => {
                    debug!(
                        handle = %handle,
                        attempts,
                        elapsed_ms = start.elapsed().as_millis() as u64,
                        "Operation finished"
                    );
                    return Ok(PollOutcome {
                        attempts,
                        elapsed: start.elapsed(),
                    });
                }
                OperationStatus::Failed(reason) => {
                    error!(handle = %handle, reason = %reason, "Operation failed");
                    return Err(PollError::Failed {
                        handle: handle.to_string(),
                        reason,
                    });
                }
                OperationStatus::Pending(state) => {
                    debug!(
                        handle = %handle,
                        state = %state,
                        attempts,
                        elapsed_ms = start.elapsed().as_millis() as u64,
                        "Polling operation status"
                    );
                }
            }

            if self.policy.is_bounded() && attempts >= self.policy.max_attempts {
                warn!(handle = %handle, attempts, "Poll budget exhausted");
                return Err(PollError::Exhausted {
                    handle: handle.to_string(),
                    attempts,
                });
            }

            tokio::time::sleep(Duration::from_millis(delay_ms)).await;
            delay_ms = self.policy.next_delay(delay_ms);
        }
    }
}

impl Default for Poller {
    fn default() -> Self {
        Self::new(PollPolicy::fixed(Duration::from_millis(500)))
    }
}
