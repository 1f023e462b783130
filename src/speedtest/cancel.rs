use std::future::Future;

use tokio_util::sync::CancellationToken;

use super::error::SampleError;

/// Await `fut` unless `token` fires first.
///
/// When the token wins, `fut` is dropped on the spot. For a reqwest future
/// that tears down the underlying connection, so signalling the token is
/// what actually aborts the in-flight request.
pub async fn guarded<F>(token: &CancellationToken, fut: F) -> Result<F::Output, SampleError>
where
    F: Future,
{
    if token.is_cancelled() {
        return Err(SampleError::aborted());
    }

    tokio::select! {
        biased;
        _ = token.cancelled() => Err(SampleError::aborted()),
        out = fut => Ok(out),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_passes_through_when_not_cancelled() {
        let token = CancellationToken::new();
        let out = guarded(&token, async { 7 }).await.unwrap();
        assert_eq!(out, 7);
    }

    #[tokio::test]
    async fn test_already_cancelled_never_polls() {
        let token = CancellationToken::new();
        token.cancel();
        let err = guarded(&token, async { panic!("must not be polled") })
            .await
            .unwrap_err();
        assert!(err.is_aborted());
    }

    #[tokio::test]
    async fn test_cancel_interrupts_pending_future() {
        let token = CancellationToken::new();
        let trigger = token.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            trigger.cancel();
        });

        let err = guarded(&token, tokio::time::sleep(Duration::from_secs(30)))
            .await
            .unwrap_err();
        assert!(err.is_aborted());
    }
}
