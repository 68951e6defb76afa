//! Cancellable waiting: poll-until-ready, fixed retries and plain pauses.
//!
//! Every sleep races the run's cancellation token, so a cancelled run
//! surfaces [`Cancelled`] at the next suspension point instead of waiting out
//! the interval.

use std::future::Future;
use std::time::Duration;

use anyhow::Result;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::domain::error::{Cancelled, is_cancelled};

/// Deadline and interval for [`poll_until`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollSpec {
    pub deadline: Duration,
    pub interval: Duration,
}

impl PollSpec {
    #[must_use]
    pub fn secs(deadline: u64, interval: u64) -> Self {
        Self {
            deadline: Duration::from_secs(deadline),
            interval: Duration::from_secs(interval),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollOutcome<T> {
    Ready(T),
    TimedOut,
}

impl<T> PollOutcome<T> {
    pub fn ready(self) -> Option<T> {
        match self {
            Self::Ready(v) => Some(v),
            Self::TimedOut => None,
        }
    }
}

/// Sleep for `delay` unless `cancel` fires first.
///
/// # Errors
///
/// Returns [`Cancelled`] if the token fires before the delay elapses.
pub async fn pause(delay: Duration, cancel: &CancellationToken) -> Result<()> {
    if cancel.is_cancelled() {
        return Err(Cancelled.into());
    }
    if delay.is_zero() {
        tokio::task::yield_now().await;
        return Ok(());
    }
    tokio::select! {
        () = cancel.cancelled() => Err(Cancelled.into()),
        () = tokio::time::sleep(delay) => Ok(()),
    }
}

/// Call `check` every `spec.interval` until it yields a value or
/// `spec.deadline` passes.
///
/// `check` returns `Ok(Some(v))` when ready, `Ok(None)` to keep waiting and
/// `Err` to abort the poll. The check always runs at least once. The loop
/// never sleeps past the deadline and a check still running at
/// `deadline + interval` is abandoned, so a never-satisfied poll returns
/// within that bound however slow the check is.
///
/// # Errors
///
/// Propagates the first error from `check`, or [`Cancelled`].
pub async fn poll_until<T, F, Fut>(
    spec: PollSpec,
    cancel: &CancellationToken,
    mut check: F,
) -> Result<PollOutcome<T>>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<Option<T>>>,
{
    let started = Instant::now();
    let hard_stop = started + spec.deadline + spec.interval;
    loop {
        let result = tokio::select! {
            () = cancel.cancelled() => return Err(Cancelled.into()),
            () = tokio::time::sleep_until(hard_stop) => {
                tracing::debug!("check still running at the hard deadline, giving up");
                return Ok(PollOutcome::TimedOut);
            }
            r = check() => r,
        };
        if let Some(value) = result? {
            return Ok(PollOutcome::Ready(value));
        }
        let elapsed = started.elapsed();
        if elapsed >= spec.deadline {
            return Ok(PollOutcome::TimedOut);
        }
        pause(spec.interval.min(spec.deadline - elapsed), cancel).await?;
    }
}

/// Run `op` up to `attempts` times with a fixed `backoff` between attempts.
///
/// `op` receives the 1-based attempt number. Cancellation is never retried.
///
/// # Errors
///
/// Returns the last attempt's error once every attempt has failed.
pub async fn retry_fixed<T, F, Fut>(
    attempts: u32,
    backoff: Duration,
    cancel: &CancellationToken,
    mut op: F,
) -> Result<T>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let attempts = attempts.max(1);
    let mut attempt = 1;
    loop {
        let result = tokio::select! {
            () = cancel.cancelled() => return Err(Cancelled.into()),
            r = op(attempt) => r,
        };
        match result {
            Ok(value) => return Ok(value),
            Err(err) if is_cancelled(&err) || attempt >= attempts => return Err(err),
            Err(err) => {
                tracing::debug!(attempt, error = %err, "attempt failed, retrying");
                pause(backoff, cancel).await?;
                attempt += 1;
            }
        }
    }
}
