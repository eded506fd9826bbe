//! Finite time budgets for network, storage and installation calls.

use std::future::Future;
use std::time::Duration;

use tokio::time;

use crate::Error;

/// Run `future` with a wall-clock budget.
///
/// The future is dropped when the budget runs out, which cancels any
/// in-flight I/O it owns.
///
/// # Errors
/// Returns the future's own error, or [`Error::Timeout`] converted into the
/// caller's error type when the budget is exceeded.
pub async fn with_deadline<T, E, F>(operation: &str, limit: Duration, future: F) -> Result<T, E>
where
    F: Future<Output = Result<T, E>>,
    E: From<Error>,
{
    time::timeout(limit, future).await.unwrap_or_else(|_elapsed| {
        Err(Error::Timeout {
            operation: operation.to_owned(),
            seconds: limit.as_secs(),
        }
        .into())
    })
}
