/// Persistence layer
///
/// Every query, read or write, runs through the retrying transaction
/// executor on its own Postgres transaction.

mod retry;
mod revoked_token;
mod tx;
mod user_store;

pub use retry::{execute_in_tx, is_retryable, RetryContext, SqlState, TxError, DEFAULT_MAX_RETRIES};
pub use revoked_token::PgRevocationLedger;
pub use tx::{PgTx, Tx};
pub use user_store::PgUserStore;

use futures::future::BoxFuture;
use sqlx::PgPool;

/// Opens a transaction on `pool` and runs `work` in it with retries.
pub async fn run_in_tx<F, R>(
    pool: &PgPool,
    ctx: &RetryContext,
    work: F,
) -> Result<R, TxError<sqlx::Error>>
where
    F: for<'t> FnMut(&'t mut PgTx) -> BoxFuture<'t, Result<R, sqlx::Error>> + Send,
    R: Send,
{
    let tx = PgTx::begin(pool).await.map_err(TxError::Failed)?;
    execute_in_tx(ctx, tx, work).await
}
