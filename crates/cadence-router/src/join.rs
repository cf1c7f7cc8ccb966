//! Bounded waits over groups of futures

use futures::future::join_all;
use std::future::Future;
use std::time::Duration;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use crate::error::RouterError;

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinError {
    #[error("deadline of {0:?} elapsed")]
    Timeout(Duration),

    #[error("join cancelled")]
    Cancelled,
}

impl From<JoinError> for RouterError {
    fn from(err: JoinError) -> Self {
        match err {
            JoinError::Timeout(d) => RouterError::Timeout(d),
            JoinError::Cancelled => RouterError::Cancelled,
        }
    }
}

/// Await every future, giving up at `deadline` or when `cancel` fires.
///
/// Outputs come back in input order. Futures still running when the wait is
/// abandoned are dropped; spawned tasks behind them keep running.
pub async fn join_all_with_deadline<I, F>(
    futures: I,
    deadline: Duration,
    cancel: &CancellationToken,
) -> Result<Vec<F::Output>, JoinError>
where
    I: IntoIterator<Item = F>,
    F: Future,
{
    let all = join_all(futures);

    tokio::select! {
        _ = cancel.cancelled() => Err(JoinError::Cancelled),
        joined = tokio::time::timeout(deadline, all) => {
            joined.map_err(|_| JoinError::Timeout(deadline))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::future::BoxFuture;
    use futures::FutureExt;

    fn after(ms: u64, value: u32) -> BoxFuture<'static, u32> {
        async move {
            tokio::time::sleep(Duration::from_millis(ms)).await;
            value
        }
        .boxed()
    }

    #[tokio::test]
    async fn test_all_complete_in_order() {
        let token = CancellationToken::new();
        let out = join_all_with_deadline(
            vec![after(30, 1), after(5, 2), after(10, 3)],
            Duration::from_secs(1),
            &token,
        )
        .await
        .unwrap();
        assert_eq!(out, vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn test_empty_completes_immediately() {
        let token = CancellationToken::new();
        let out = join_all_with_deadline(
            Vec::<BoxFuture<'static, u32>>::new(),
            Duration::from_millis(1),
            &token,
        )
        .await
        .unwrap();
        assert!(out.is_empty());
    }

    #[tokio::test]
    async fn test_deadline() {
        let token = CancellationToken::new();
        let err = join_all_with_deadline(
            vec![after(5, 1), after(5_000, 2)],
            Duration::from_millis(50),
            &token,
        )
        .await
        .unwrap_err();
        assert_eq!(err, JoinError::Timeout(Duration::from_millis(50)));
    }

    #[tokio::test]
    async fn test_cancellation() {
        let token = CancellationToken::new();
        let trigger = token.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            trigger.cancel();
        });

        let err = join_all_with_deadline(vec![after(5_000, 1)], Duration::from_secs(10), &token)
            .await
            .unwrap_err();
        assert_eq!(err, JoinError::Cancelled);
        assert!(matches!(RouterError::from(err), RouterError::Cancelled));
    }
}
