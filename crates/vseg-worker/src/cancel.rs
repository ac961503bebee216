//! Job cancellation helpers over a `watch<bool>` flag.

use std::future::Future;

use tokio::sync::watch;

use crate::error::{PipelineError, PipelineResult};

pub(crate) fn check_cancelled(cancel: &watch::Receiver<bool>) -> PipelineResult<()> {
    if *cancel.borrow() {
        Err(PipelineError::Cancelled)
    } else {
        Ok(())
    }
}

/// Resolves once the flag is set. Never resolves if the sender goes away
/// without setting it.
pub(crate) async fn cancelled(mut cancel: watch::Receiver<bool>) {
    let flagged = cancel.wait_for(|c| *c).await.map(|_| ()).is_ok();
    if !flagged {
        std::future::pending::<()>().await;
    }
}

/// Run `fut` unless the job is cancelled first; `None` on cancel.
pub(crate) async fn until_cancelled<F: Future>(
    cancel: Option<watch::Receiver<bool>>,
    fut: F,
) -> Option<F::Output> {
    match cancel {
        Some(cancel) => tokio::select! {
            output = fut => Some(output),
            _ = cancelled(cancel) => None,
        },
        None => Some(fut.await),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_until_cancelled_stops_slow_work() {
        let (tx, rx) = watch::channel(false);
        let slow = tokio::time::sleep(Duration::from_secs(30));

        let flip = async {
            tokio::time::sleep(Duration::from_millis(20)).await;
            tx.send(true).unwrap();
        };
        let (result, ()) = tokio::join!(until_cancelled(Some(rx), slow), flip);
        assert!(result.is_none());
    }

    #[tokio::test]
    async fn test_until_cancelled_passes_output_through() {
        let (_tx, rx) = watch::channel(false);
        assert_eq!(until_cancelled(Some(rx), async { 7 }).await, Some(7));
        assert_eq!(until_cancelled(None, async { 8 }).await, Some(8));
    }

    #[tokio::test]
    async fn test_already_cancelled() {
        let (_tx, rx) = watch::channel(true);
        assert!(check_cancelled(&rx).is_err());
        assert!(until_cancelled(Some(rx), std::future::pending::<()>()).await.is_none());
    }

    #[tokio::test]
    async fn test_dropped_sender_is_not_a_cancel() {
        let (tx, rx) = watch::channel(false);
        drop(tx);
        assert_eq!(until_cancelled(Some(rx), async { 1 }).await, Some(1));
    }
}
