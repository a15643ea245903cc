//! Delays execution until a set of upstream operations has completed.

use std::future::Future;
use std::pin::pin;

use futures_util::future::{BoxFuture, try_join_all};
use futures_util::{Stream, StreamExt};

use crate::error::RelayError;
use crate::transaction::TxOutcomeSubscription;

/// One upstream operation whose completion gates execution. Values produced
/// by the upstream are discarded; only completion or failure matters. The one
/// reserved kind is the previous transaction's outcome, whose boolean is
/// still available to callers through [`TxOutcomeSubscription::wait`].
pub struct Dependency {
    kind: DependencyKind,
}

enum DependencyKind {
    Completion(BoxFuture<'static, Result<(), RelayError>>),
    LastTxOutcome(TxOutcomeSubscription),
}

impl Dependency {
    /// Gate on a future that resolves once the upstream operation has fully
    /// completed (or failed).
    pub fn completion<F>(future: F) -> Self
    where
        F: Future<Output = Result<(), RelayError>> + Send + 'static,
    {
        Self {
            kind: DependencyKind::Completion(Box::pin(future)),
        }
    }

    /// Gate on a stream, draining and discarding its values. The dependency
    /// completes when the stream ends and fails on its first error.
    pub fn from_stream<S, T>(stream: S) -> Self
    where
        S: Stream<Item = Result<T, RelayError>> + Send + 'static,
        T: Send + 'static,
    {
        Self::completion(async move {
            let mut stream = pin!(stream);
            while let Some(item) = stream.next().await {
                item?;
            }
            Ok(())
        })
    }

    /// Gate on the commit/rollback outcome of a previous transaction. Both
    /// outcomes satisfy the gate; only a failed finalization is an error.
    #[must_use]
    pub fn last_tx_outcome(outcome: TxOutcomeSubscription) -> Self {
        Self {
            kind: DependencyKind::LastTxOutcome(outcome),
        }
    }

    async fn wait(self) -> Result<(), RelayError> {
        match self.kind {
            DependencyKind::Completion(future) => future.await,
            DependencyKind::LastTxOutcome(outcome) => outcome.wait().await.map(|_| ()),
        }
    }
}

impl std::fmt::Debug for Dependency {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let kind = match self.kind {
            DependencyKind::Completion(_) => "Completion",
            DependencyKind::LastTxOutcome(_) => "LastTxOutcome",
        };
        f.debug_tuple("Dependency").field(&kind).finish()
    }
}

/// Wait until every dependency has completed. Fails fast with
/// `DependencyFailure` on the first error without waiting for the rest; an
/// empty set is immediately satisfied.
///
/// # Errors
/// Returns `RelayError::DependencyFailure` wrapping the first upstream error.
pub async fn wait_all(dependencies: Vec<Dependency>) -> Result<(), RelayError> {
    if dependencies.is_empty() {
        return Ok(());
    }
    try_join_all(dependencies.into_iter().map(Dependency::wait))
        .await
        .map(|_| ())
        .map_err(|err| match err {
            already @ RelayError::DependencyFailure(_) => already,
            other => RelayError::DependencyFailure(other.to_string()),
        })
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::time::Duration;

    use futures_util::stream;

    use super::*;

    #[tokio::test]
    async fn empty_set_is_immediately_satisfied() {
        wait_all(Vec::new()).await.unwrap();
    }

    #[tokio::test]
    async fn waits_for_every_dependency() {
        let first = Arc::new(AtomicBool::new(false));
        let second = Arc::new(AtomicBool::new(false));
        let deps = vec![
            Dependency::completion({
                let first = Arc::clone(&first);
                async move {
                    tokio::time::sleep(Duration::from_millis(20)).await;
                    first.store(true, Ordering::SeqCst);
                    Ok(())
                }
            }),
            Dependency::completion({
                let second = Arc::clone(&second);
                async move {
                    tokio::time::sleep(Duration::from_millis(60)).await;
                    second.store(true, Ordering::SeqCst);
                    Ok(())
                }
            }),
        ];
        wait_all(deps).await.unwrap();
        assert!(first.load(Ordering::SeqCst));
        assert!(second.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn fails_fast_without_waiting_for_the_rest() {
        let deps = vec![
            Dependency::completion(async {
                Err(RelayError::Database {
                    code: None,
                    message: "upstream broke".into(),
                })
            }),
            // Never completes; wait_all must not block on it.
            Dependency::completion(futures_util::future::pending()),
        ];
        let err = wait_all(deps).await.unwrap_err();
        assert!(matches!(err, RelayError::DependencyFailure(_)));
    }

    #[tokio::test]
    async fn stream_values_are_discarded() {
        let dep = Dependency::from_stream(stream::iter(vec![
            Ok::<_, RelayError>(1),
            Ok(2),
            Ok(3),
        ]));
        wait_all(vec![dep]).await.unwrap();
    }

    #[tokio::test]
    async fn stream_error_fails_the_gate() {
        let dep = Dependency::from_stream(stream::iter(vec![
            Ok::<i64, RelayError>(1),
            Err(RelayError::Connection("gone".into())),
        ]));
        assert!(matches!(
            wait_all(vec![dep]).await,
            Err(RelayError::DependencyFailure(_))
        ));
    }
}
