//! Convergence primitives
//!
//! Every handler that polls a remote status or retries a remote call goes
//! through [`wait_for_status`] or [`retry`].

use crate::config::Timeouts;
use crate::error::{ProviderError, Result};
use std::future::Future;
use std::time::{Duration, Instant};

/// What to do when the describe call reports the resource as absent
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Absent {
    /// Absence is the goal (delete context)
    Succeed,
    /// Keep polling (create context, eventual consistency)
    Retry,
    /// Fail immediately with [`ProviderError::NotFound`]
    Fail,
}

#[derive(Debug, Clone, Copy)]
pub struct WaitOptions {
    pub timeout: Duration,
    pub interval: Duration,
    pub on_absent: Absent,
}

impl WaitOptions {
    /// Options with `timeout`, falling back to the configured default wait
    /// when it is zero.
    pub fn new(timeouts: &Timeouts, timeout: Duration) -> Self {
        let timeout = if timeout.is_zero() {
            timeouts.default_wait()
        } else {
            timeout
        };
        Self {
            timeout,
            interval: timeouts.poll_interval(),
            on_absent: Absent::Retry,
        }
    }

    pub fn on_absent(mut self, on_absent: Absent) -> Self {
        self.on_absent = on_absent;
        self
    }
}

/// Poll `describe` until the observed status equals `target`
/// (case-insensitive). `describe` returns `None` when the resource is not
/// found.
pub async fn wait_for_status<S, F, Fut>(
    kind: &str,
    id: &str,
    target: &str,
    options: WaitOptions,
    mut describe: F,
) -> Result<()>
where
    S: AsRef<str>,
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<Option<S>>>,
{
    let started = Instant::now();
    loop {
        let last = match describe().await? {
            Some(status) if status.as_ref().eq_ignore_ascii_case(target) => {
                tracing::debug!("{} {} reached status {}", kind, id, target);
                return Ok(());
            }
            Some(status) => status.as_ref().to_string(),
            None => match options.on_absent {
                Absent::Succeed => return Ok(()),
                Absent::Fail => return Err(ProviderError::not_found(kind, id)),
                Absent::Retry => "absent".to_string(),
            },
        };

        if started.elapsed() >= options.timeout {
            return Err(ProviderError::Timeout {
                what: format!("{} {} to become {}", kind, id, target),
                last,
                waited_secs: started.elapsed().as_secs(),
            });
        }

        tracing::debug!(
            "{} {} is {}, waiting for {} ({:?} elapsed)",
            kind,
            id,
            last,
            target,
            started.elapsed()
        );
        tokio::time::sleep(options.interval).await;
    }
}

/// Result of one attempt inside [`retry`]
#[derive(Debug)]
pub enum RetryOutcome<T> {
    Done(T),
    /// Try again after the interval; the reason is kept for the timeout error
    Again(String),
}

/// Run `op` until it returns [`RetryOutcome::Done`] or `timeout` elapses.
/// Errors returned by `op` are fatal and returned immediately; use
/// [`retry_on`] inside the closure to turn known transient errors into
/// [`RetryOutcome::Again`].
pub async fn retry<T, F, Fut>(
    what: &str,
    timeout: Duration,
    interval: Duration,
    mut op: F,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<RetryOutcome<T>>>,
{
    let started = Instant::now();
    let mut attempt = 0u32;
    loop {
        attempt += 1;
        let reason = match op().await? {
            RetryOutcome::Done(value) => return Ok(value),
            RetryOutcome::Again(reason) => reason,
        };

        if started.elapsed() >= timeout {
            return Err(ProviderError::Timeout {
                what: what.to_string(),
                last: reason,
                waited_secs: started.elapsed().as_secs(),
            });
        }

        tracing::debug!("{}: attempt {} not done yet: {}", what, attempt, reason);
        tokio::time::sleep(interval).await;
    }
}

/// Classify an error: remote errors matching `codes` become
/// [`RetryOutcome::Again`], everything else stays fatal.
pub fn retry_on<T>(err: ProviderError, codes: &[&str]) -> Result<RetryOutcome<T>> {
    if err.is_api_error(codes) {
        Ok(RetryOutcome::Again(err.to_string()))
    } else {
        Err(err)
    }
}
