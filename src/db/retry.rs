/// Retrying Transaction Executor
///
/// Runs a unit of work inside a savepoint and restarts it when the database
/// reports a serialization conflict. The savepoint release is the real commit
/// point: it is the last statement that can still surface a retryable error,
/// whereas the final COMMIT cannot.
///
/// The unit of work may run many times. It must rebuild everything it needs on
/// each call and must not rely on state mutated by a previous failed attempt.

use std::borrow::Cow;
use std::panic::AssertUnwindSafe;

use futures::future::BoxFuture;
use futures::FutureExt;
use tokio::time::Instant;

use crate::db::tx::Tx;

// CockroachDB treats this savepoint name as the marker for its client-side
// retry protocol; on Postgres it is an ordinary savepoint.
const SAVEPOINT_SQL: &str = "SAVEPOINT cockroach_restart";
const RELEASE_SQL: &str = "RELEASE SAVEPOINT cockroach_restart";
const ROLLBACK_TO_SQL: &str = "ROLLBACK TO SAVEPOINT cockroach_restart";

pub const DEFAULT_MAX_RETRIES: u32 = 50;

/// Standard SQLSTATE serialization_failure.
const SERIALIZATION_FAILURE: &str = "40001";
/// Legacy CockroachDB retry code, no longer emitted server-side but still
/// honoured for older clusters.
const LEGACY_RETRY_ERROR: &str = "CR000";

/// Errors that may carry a SQLSTATE code.
pub trait SqlState {
    fn sql_state(&self) -> Option<Cow<'_, str>>;
}

impl SqlState for sqlx::Error {
    fn sql_state(&self) -> Option<Cow<'_, str>> {
        self.as_database_error().and_then(|db_err| db_err.code())
    }
}

/// Returns true when the error's SQLSTATE marks a conflict that clears on retry.
pub fn is_retryable<E: SqlState + ?Sized>(err: &E) -> bool {
    matches!(
        err.sql_state().as_deref(),
        Some(SERIALIZATION_FAILURE) | Some(LEGACY_RETRY_ERROR)
    )
}

/// Terminal outcomes of [`execute_in_tx`].
#[derive(Debug, thiserror::Error)]
pub enum TxError<E> {
    /// The unit of work (or a setup statement) failed with a non-retryable error.
    #[error(transparent)]
    Failed(E),
    /// Releasing the savepoint failed with a non-retryable error, so the work
    /// may or may not have been applied. Never retried.
    #[error("transaction commit is ambiguous: {0}")]
    AmbiguousCommit(E),
    /// Rolling back to the savepoint failed; the transaction state is unknown.
    #[error("restarting transaction failed: {restart}; retryable cause: {cause}")]
    TxnRestartFailed { restart: E, cause: E },
    #[error("retrying transaction exceeded {max_retries} retries: {cause}")]
    MaxRetriesExceeded { cause: E, max_retries: u32 },
    /// The caller's deadline fired before the transaction could finish.
    #[error("transaction cancelled: deadline exceeded")]
    Cancelled,
}

/// Retry bound and optional deadline for one logical transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryContext {
    max_retries: Option<u32>,
    deadline: Option<Instant>,
}

impl Default for RetryContext {
    fn default() -> Self {
        Self {
            max_retries: Some(DEFAULT_MAX_RETRIES),
            deadline: None,
        }
    }
}

impl RetryContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = Some(max_retries);
        self
    }

    /// Retry serialization conflicts for as long as they keep happening.
    pub fn unbounded(mut self) -> Self {
        self.max_retries = None;
        self
    }

    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }

    pub fn max_retries(&self) -> Option<u32> {
        self.max_retries
    }

    fn check_deadline(&self) -> Result<(), DeadlineExceeded> {
        match self.deadline {
            Some(deadline) if Instant::now() >= deadline => Err(DeadlineExceeded),
            _ => Ok(()),
        }
    }

    /// Runs one statement future under the deadline, if any.
    async fn bounded<F, T>(&self, fut: F) -> Result<T, DeadlineExceeded>
    where
        F: std::future::Future<Output = T>,
    {
        match self.deadline {
            Some(deadline) => tokio::time::timeout_at(deadline, fut)
                .await
                .map_err(|_| DeadlineExceeded),
            None => Ok(fut.await),
        }
    }
}

#[derive(Debug)]
struct DeadlineExceeded;

impl<E> From<DeadlineExceeded> for TxError<E> {
    fn from(_: DeadlineExceeded) -> Self {
        TxError::Cancelled
    }
}

/// Runs `work` inside `tx`, retrying on serialization conflicts.
///
/// No statement may have been executed on `tx` before the call: only what runs
/// inside `work` is replayed on retry. The handle is always released on exit:
/// committed after a successful savepoint release (commit errors are ignored,
/// the release already made the work durable), rolled back after any error,
/// and rolled back before a panic in `work` is resumed.
pub async fn execute_in_tx<T, F, R, E>(
    ctx: &RetryContext,
    mut tx: T,
    mut work: F,
) -> Result<R, TxError<E>>
where
    T: Tx,
    F: for<'t> FnMut(&'t mut T) -> BoxFuture<'t, Result<R, E>> + Send,
    R: Send,
    E: SqlState + From<T::Error> + std::error::Error + Send + 'static,
{
    let outcome = AssertUnwindSafe(run_attempts(ctx, &mut tx, &mut work))
        .catch_unwind()
        .await;

    match outcome {
        Ok(Ok(value)) => {
            if let Err(e) = tx.commit().await {
                tracing::debug!(error = %e, "Ignoring commit error after savepoint release");
            }
            Ok(value)
        }
        Ok(Err(err)) => {
            if let Err(e) = tx.rollback().await {
                tracing::debug!(error = %e, "Rollback after failed transaction also failed");
            }
            Err(err)
        }
        Err(panic) => {
            if let Err(e) = tx.rollback().await {
                tracing::error!(error = %e, "Rollback after panic in transaction failed");
            }
            std::panic::resume_unwind(panic)
        }
    }
}

async fn run_attempts<T, F, R, E>(
    ctx: &RetryContext,
    tx: &mut T,
    work: &mut F,
) -> Result<R, TxError<E>>
where
    T: Tx,
    F: for<'t> FnMut(&'t mut T) -> BoxFuture<'t, Result<R, E>> + Send,
    R: Send,
    E: SqlState + From<T::Error> + std::error::Error + Send + 'static,
{
    ctx.check_deadline()?;
    ctx.bounded(tx.exec(SAVEPOINT_SQL))
        .await?
        .map_err(|e| TxError::Failed(E::from(e)))?;

    let mut retry_count: u32 = 0;

    loop {
        ctx.check_deadline()?;

        let attempt = ctx.bounded(work(&mut *tx)).await?;
        let (err, release_failed) = match attempt {
            Ok(value) => match ctx.bounded(tx.exec(RELEASE_SQL)).await? {
                Ok(()) => return Ok(value),
                Err(e) => (E::from(e), true),
            },
            Err(e) => (e, false),
        };

        if !is_retryable(&err) {
            if release_failed {
                tracing::warn!(error = %err, "Savepoint release failed, commit outcome unknown");
                return Err(TxError::AmbiguousCommit(err));
            }
            return Err(TxError::Failed(err));
        }

        if let Err(restart) = ctx.bounded(tx.exec(ROLLBACK_TO_SQL)).await? {
            let restart = E::from(restart);
            tracing::error!(error = %restart, cause = %err, "Rollback to savepoint failed");
            return Err(TxError::TxnRestartFailed { restart, cause: err });
        }

        retry_count += 1;
        if let Some(max_retries) = ctx.max_retries {
            if retry_count > max_retries {
                tracing::warn!(max_retries, error = %err, "Transaction retries exhausted");
                return Err(TxError::MaxRetriesExceeded {
                    cause: err,
                    max_retries,
                });
            }
        }

        tracing::debug!(retry = retry_count, error = %err, "Retrying transaction after conflict");
    }
}
