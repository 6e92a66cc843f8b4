use std::{fmt::Display, future::IntoFuture};

use conflux_core::error_to_string;
use tracing::debug;

/// Resolves to `None` when the task fails with an allow-listed error.
///
/// The error text from [`error_to_string`] must equal one of `allowed`
/// exactly; any other error is returned unchanged.
pub async fn ignore_error<F, T, E, S>(task: F, allowed: &[S]) -> Result<Option<T>, E>
where
    F: IntoFuture<Output = Result<T, E>>,
    E: Display + 'static,
    S: AsRef<str>,
{
    match task.await {
        Ok(value) => Ok(Some(value)),
        Err(err) => {
            let text = error_to_string(&err);
            if allowed.iter().any(|a| a.as_ref() == text) {
                debug!(error = %text, "ignoring allow-listed error");
                return Ok(None);
            }
            Err(err)
        }
    }
}
