//! Call-site timeout guard for external requests.

use std::future::Future;
use std::time::Duration;

/// Awaits `call`, mapping an elapsed `limit` to the caller's timeout error.
pub(crate) async fn bounded<T, E, F>(
    limit: Duration,
    call: F,
    on_timeout: impl FnOnce(u64) -> E,
) -> Result<T, E>
where
    F: Future<Output = Result<T, E>>,
{
    match tokio::time::timeout(limit, call).await {
        Ok(result) => result,
        Err(_) => Err(on_timeout(limit.as_secs())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn hanging_call_times_out() {
        let result: Result<(), String> = bounded(
            Duration::from_secs(2),
            std::future::pending(),
            |secs| format!("timed out after {secs}s"),
        )
        .await;
        assert_eq!(result.unwrap_err(), "timed out after 2s");
    }

    #[tokio::test]
    async fn fast_call_passes_through() {
        let result: Result<u8, String> =
            bounded(Duration::from_secs(2), async { Ok(7) }, |_| String::new()).await;
        assert_eq!(result.unwrap(), 7);
    }
}
