//! Deadlines for external capability calls.

use std::future::Future;
use std::time::Duration;

/// Runs `call`, turning an elapsed `limit` into the error built by `timed_out`.
///
/// The call future is dropped when the deadline passes, which cancels it.
pub async fn with_deadline<T, E, F>(
    limit: Duration,
    call: F,
    timed_out: impl FnOnce(Duration) -> E,
) -> Result<T, E>
where
    F: Future<Output = Result<T, E>>,
{
    tokio::time::timeout(limit, call)
        .await
        .unwrap_or_else(|_| Err(timed_out(limit)))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_deadline_elapses() {
        let result: Result<(), String> = with_deadline(
            Duration::from_secs(1),
            async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Ok(())
            },
            |limit| format!("timed out after {limit:?}"),
        )
        .await;

        assert_eq!(result.unwrap_err(), "timed out after 1s");
    }

    #[tokio::test]
    async fn test_deadline_passes_result_through() {
        let result: Result<u8, String> =
            with_deadline(Duration::from_secs(1), async { Err("boom".to_string()) }, |_| {
                "timeout".to_string()
            })
            .await;

        assert_eq!(result.unwrap_err(), "boom");
    }
}
