//! Timeout and retry wrapper for external calls.
//!
//! Every embedding request, store read or write, and language-model call
//! goes through [`call_with_retry`]: each attempt runs under
//! `tokio::time::timeout`, and failures the error type reports as
//! [`Transient`] are retried after a short fixed delay.

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

use tokio_retry::strategy::FixedInterval;
use tokio_retry::RetryIf;

use sentinel_core::error::Transient;

/// Delay between attempts.
pub const RETRY_BACKOFF: Duration = Duration::from_millis(250);

/// Run `op` with a per-attempt deadline, retrying transient failures up
/// to `max_retries` times.
///
/// An attempt that exceeds `timeout` fails with `E::timed_out`, which is
/// itself transient. Permanent errors are returned immediately.
pub async fn call_with_retry<T, E, F, Fut>(
    label: &str,
    timeout: Duration,
    max_retries: u32,
    mut op: F,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Transient + Display,
{
    let secs = timeout.as_secs().max(1);
    let strategy = FixedInterval::new(RETRY_BACKOFF).take(max_retries as usize);

    let attempt = || {
        let fut = op();
        async move {
            match tokio::time::timeout(timeout, fut).await {
                Ok(result) => result,
                Err(_) => Err(E::timed_out(secs)),
            }
        }
    };

    let should_retry = |e: &E| {
        let transient = e.is_transient();
        if transient {
            tracing::warn!(call = label, error = %e, "transient failure");
        }
        transient
    };

    RetryIf::spawn(strategy, attempt, should_retry).await
}
