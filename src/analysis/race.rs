use std::future::Future;
use std::time::Duration;

use tokio::time::timeout;
use tracing::warn;

use super::errors::RaceError;

/// Runs `operation` against a hard deadline.
///
/// The operation's own `Ok`/`Err` is passed through when it settles first.
/// When the deadline fires first the future is dropped right there: whatever it
/// was still waiting on is abandoned and its late completion is never observed.
/// No retries happen here.
pub async fn race<F, T, E>(operation: F, deadline: Duration) -> Result<T, RaceError<E>>
where
    F: Future<Output = Result<T, E>>,
{
    match timeout(deadline, operation).await {
        Ok(outcome) => outcome.map_err(RaceError::Failed),
        Err(_) => {
            warn!(deadline_ms = deadline.as_millis() as u64, "operation abandoned at deadline");
            Err(RaceError::Timeout(deadline))
        }
    }
}
