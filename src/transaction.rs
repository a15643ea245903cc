//! Explicit transaction coordination.
//!
//! A [`Transaction`] owns one pooled connection for its whole lifetime,
//! serializes member statements onto it, and issues commit or rollback
//! exactly once, re-publishing the boolean outcome as a value dependents can
//! wait on (see [`crate::gate::Dependency::last_tx_outcome`]).

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex as StdMutex, PoisonError};

use tokio::sync::watch;
use tokio::sync::{Mutex as TokioMutex, OwnedMutexGuard};

use crate::connection::Connection;
use crate::error::RelayError;
use crate::pool::Pool;

/// Published state of a transaction's outcome channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TxOutcomeState {
    Pending,
    Committed,
    RolledBack,
    /// The physical commit/rollback call itself failed.
    Failed(String),
}

/// Subscription to a transaction's outcome, usable as a gate dependency or
/// inspected directly for the boolean commit result.
#[derive(Debug, Clone)]
pub struct TxOutcomeSubscription {
    receiver: watch::Receiver<TxOutcomeState>,
}

impl TxOutcomeSubscription {
    /// Wait until the transaction finalizes. `true` means committed, `false`
    /// rolled back.
    ///
    /// # Errors
    /// Returns `RelayError::TransactionFinalization` if the commit/rollback
    /// call failed, or `RelayError::Transaction` if the coordinator was
    /// dropped without publishing.
    pub async fn wait(mut self) -> Result<bool, RelayError> {
        loop {
            let state = self.receiver.borrow_and_update().clone();
            match state {
                TxOutcomeState::Pending => {
                    self.receiver.changed().await.map_err(|_| {
                        RelayError::Transaction(
                            "transaction dropped before publishing an outcome".into(),
                        )
                    })?;
                }
                TxOutcomeState::Committed => return Ok(true),
                TxOutcomeState::RolledBack => return Ok(false),
                TxOutcomeState::Failed(message) => {
                    return Err(RelayError::TransactionFinalization(message));
                }
            }
        }
    }
}

struct TxShared {
    /// Taken out exactly once, at finalization (or rollback-on-drop).
    conn: StdMutex<Option<Connection>>,
    in_flight: AtomicUsize,
    first_failure: StdMutex<Option<String>>,
    /// Serializes member statements on the transaction's connection.
    stmt_lock: Arc<TokioMutex<()>>,
}

impl TxShared {
    fn connection(&self) -> Option<Connection> {
        self.conn
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn take_connection(&self) -> Option<Connection> {
        self.conn
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
    }

    fn record_failure(&self, message: String) {
        let mut failure = self
            .first_failure
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if failure.is_none() {
            *failure = Some(message);
        }
    }

    fn first_failure(&self) -> Option<String> {
        self.first_failure
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn member_done(&self, failure: Option<String>) {
        if let Some(message) = failure {
            self.record_failure(message);
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Cheap handle handed to QuerySpecs running inside the transaction.
#[derive(Clone)]
pub struct TxHandle {
    shared: Arc<TxShared>,
}

impl TxHandle {
    /// Register a member statement; increments the in-flight count. The
    /// returned guard records success or failure back to the coordinator.
    pub(crate) fn register(&self) -> Result<TxMember, RelayError> {
        if self.shared.connection().is_none() {
            return Err(RelayError::Transaction(
                "cannot register a statement on a finalized transaction".into(),
            ));
        }
        self.shared.in_flight.fetch_add(1, Ordering::SeqCst);
        Ok(TxMember {
            shared: Arc::clone(&self.shared),
            done: false,
        })
    }

    /// The transaction's connection; member batches all run on it.
    pub(crate) fn connection(&self) -> Result<Connection, RelayError> {
        self.shared.connection().ok_or_else(|| {
            RelayError::Transaction("transaction already finalized".into())
        })
    }

    pub(crate) async fn lock_statements(&self) -> OwnedMutexGuard<()> {
        Arc::clone(&self.shared.stmt_lock).lock_owned().await
    }
}

impl std::fmt::Debug for TxHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TxHandle")
            .field("in_flight", &self.shared.in_flight.load(Ordering::SeqCst))
            .finish()
    }
}

/// Membership guard for one statement inside a transaction. Dropping it
/// without completing counts as a failure, which covers consumer cancellation
/// mid-stream.
pub(crate) struct TxMember {
    shared: Arc<TxShared>,
    done: bool,
}

impl TxMember {
    pub(crate) fn succeed(mut self) {
        self.done = true;
        self.shared.member_done(None);
    }

    pub(crate) fn fail(mut self, message: String) {
        self.done = true;
        self.shared.member_done(Some(message));
    }
}

impl Drop for TxMember {
    fn drop(&mut self) {
        if !self.done {
            self.shared
                .member_done(Some("statement cancelled before completion".into()));
        }
    }
}

/// An open transaction. State machine: `Open` while members run, then
/// [`Transaction::finalize`] commits (no failure recorded) or rolls back
/// (any failure), publishes the boolean outcome exactly once, and returns the
/// connection to the pool. Finalization consumes the value, so
/// double-finalization cannot compile.
pub struct Transaction {
    shared: Arc<TxShared>,
    outcome_tx: watch::Sender<TxOutcomeState>,
    outcome_rx: watch::Receiver<TxOutcomeState>,
    finalized: bool,
}

impl Transaction {
    /// Acquire a connection and open an explicit (non-auto-commit)
    /// transaction on it.
    ///
    /// # Errors
    /// Returns `RelayError::PoolExhausted` if no connection is available, or
    /// a database error if BEGIN is rejected.
    pub async fn begin(pool: &Pool) -> Result<Self, RelayError> {
        let conn = pool.acquire().await?;
        conn.execute_batch("BEGIN").await?;
        tracing::debug!("transaction opened");
        let (outcome_tx, outcome_rx) = watch::channel(TxOutcomeState::Pending);
        Ok(Self {
            shared: Arc::new(TxShared {
                conn: StdMutex::new(Some(conn)),
                in_flight: AtomicUsize::new(0),
                first_failure: StdMutex::new(None),
                stmt_lock: Arc::new(TokioMutex::new(())),
            }),
            outcome_tx,
            outcome_rx,
            finalized: false,
        })
    }

    /// Open a transaction only after a previous transaction's outcome has
    /// been published, serializing the two without holding two connections.
    ///
    /// # Errors
    /// Propagates a failed finalization of the previous transaction, plus
    /// anything [`Transaction::begin`] can return.
    pub async fn begin_after(
        pool: &Pool,
        previous: TxOutcomeSubscription,
    ) -> Result<Self, RelayError> {
        previous.wait().await?;
        Self::begin(pool).await
    }

    /// Handle for QuerySpecs that should run inside this transaction.
    #[must_use]
    pub fn handle(&self) -> TxHandle {
        TxHandle {
            shared: Arc::clone(&self.shared),
        }
    }

    /// Subscribe to the commit/rollback outcome.
    #[must_use]
    pub fn outcome(&self) -> TxOutcomeSubscription {
        TxOutcomeSubscription {
            receiver: self.outcome_rx.clone(),
        }
    }

    /// Commit or roll back, publish the boolean outcome, and release the
    /// connection. Commit happens only when no member recorded a failure.
    ///
    /// # Errors
    /// Returns `RelayError::Transaction` if members are still in flight (the
    /// transaction is then rolled back on drop), or
    /// `RelayError::TransactionFinalization` if the physical commit/rollback
    /// call fails; that error is also published to all outcome subscribers.
    pub async fn finalize(mut self) -> Result<bool, RelayError> {
        let in_flight = self.shared.in_flight.load(Ordering::SeqCst);
        if in_flight > 0 {
            return Err(RelayError::Transaction(format!(
                "finalize called with {in_flight} member operation(s) still in flight"
            )));
        }
        self.finalized = true;
        let Some(conn) = self.shared.take_connection() else {
            return Err(RelayError::Transaction(
                "transaction already finalized".into(),
            ));
        };
        let failure = self.shared.first_failure();
        let committing = failure.is_none();
        let sql = if committing { "COMMIT" } else { "ROLLBACK" };
        match conn.execute_batch(sql).await {
            Ok(()) => {
                // Publish before releasing the connection so dependents never
                // observe the outcome while the commit is still in doubt.
                let state = if committing {
                    TxOutcomeState::Committed
                } else {
                    TxOutcomeState::RolledBack
                };
                let _ = self.outcome_tx.send(state);
                if committing {
                    tracing::debug!("transaction committed");
                } else {
                    tracing::debug!(reason = failure.as_deref(), "transaction rolled back");
                }
                drop(conn);
                Ok(committing)
            }
            Err(err) => {
                let message = err.to_string();
                let _ = self
                    .outcome_tx
                    .send(TxOutcomeState::Failed(message.clone()));
                tracing::warn!(error = %message, "transaction finalization failed");
                drop(conn);
                Err(RelayError::TransactionFinalization(message))
            }
        }
    }
}

impl Drop for Transaction {
    fn drop(&mut self) {
        if self.finalized {
            return;
        }
        // Dropping an unfinalized transaction counts as failure. The outcome
        // is published only once the rollback has actually executed, same as
        // finalize: dependents must never observe it while the write lock is
        // still held.
        let Some(conn) = self.shared.take_connection() else {
            return;
        };
        let (detached, _) = watch::channel(TxOutcomeState::Pending);
        let outcome_tx = std::mem::replace(&mut self.outcome_tx, detached);
        tracing::warn!("transaction dropped without finalize; rolling back");
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move {
                    match conn.execute_batch("ROLLBACK").await {
                        Ok(()) => {
                            let _ = outcome_tx.send(TxOutcomeState::RolledBack);
                        }
                        Err(err) => {
                            let message = err.to_string();
                            tracing::warn!(error = %message, "rollback on drop failed");
                            let _ = outcome_tx.send(TxOutcomeState::Failed(message));
                        }
                    }
                });
            }
            // No runtime to await on; the worker channel still serializes the
            // rollback ahead of any later statement on this connection.
            Err(_) => {
                conn.fire_batch("ROLLBACK");
                let _ = outcome_tx.send(TxOutcomeState::RolledBack);
            }
        }
    }
}

impl std::fmt::Debug for Transaction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Transaction")
            .field("in_flight", &self.shared.in_flight.load(Ordering::SeqCst))
            .field("finalized", &self.finalized)
            .finish()
    }
}
