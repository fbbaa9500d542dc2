//! Pluggable retry policy for remote writes.
//!
//! The gateway performs at most one attempt per write unless configured
//! otherwise; what to do on failure is the caller's decision. The policy
//! sits at the gateway boundary so a deployment can opt into bounded
//! retries without touching any operation.

use std::future::Future;
use std::time::Duration;

use tracing::warn;

use cartera_remote::RemoteError;

/// How the gateway reacts when a remote write fails.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum RetryPolicy {
    /// At most one attempt; the failure propagates immediately.
    #[default]
    None,
    /// Up to `attempts` total tries with a fixed pause in between.
    Fixed { attempts: u32, delay: Duration },
}

impl RetryPolicy {
    /// Run a remote write under this policy.
    pub async fn run<T, F, Fut>(&self, mut op: F) -> Result<T, RemoteError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, RemoteError>>,
    {
        let (attempts, delay) = match self {
            RetryPolicy::None => (1, Duration::ZERO),
            RetryPolicy::Fixed { attempts, delay } => ((*attempts).max(1), *delay),
        };

        let mut attempt = 0u32;
        loop {
            attempt += 1;
            match op().await {
                Ok(value) => return Ok(value),
                Err(e) if attempt < attempts => {
                    warn!(error = %e, attempt, "remote write failed; retrying");
                    tokio::time::sleep(delay).await;
                }
                Err(e) => return Err(e),
            }
        }
    }
}
