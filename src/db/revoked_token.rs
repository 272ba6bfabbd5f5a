/// Postgres-backed revocation ledger, keyed by the raw token string.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::FutureExt;
use sqlx::PgPool;

use crate::db::{run_in_tx, RetryContext};
use crate::domain::RevocationLedger;
use crate::error::AppError;

// `expires_at` comes from the application clock; the margin absorbs skew
// against the database clock.
const PURGE_EXPIRED_SQL: &str =
    "DELETE FROM revoked_token WHERE expires_at < NOW() - INTERVAL '1 hour'";

#[derive(Clone)]
pub struct PgRevocationLedger {
    pool: PgPool,
    retry: RetryContext,
}

impl PgRevocationLedger {
    pub fn new(pool: PgPool) -> Self {
        Self::with_retry(pool, RetryContext::default())
    }

    pub fn with_retry(pool: PgPool, retry: RetryContext) -> Self {
        Self { pool, retry }
    }
}

#[async_trait]
impl RevocationLedger for PgRevocationLedger {
    async fn add_revoked_token(
        &self,
        token: &str,
        expires_at: Option<DateTime<Utc>>,
    ) -> Result<(), AppError> {
        let token = token.to_owned();

        run_in_tx(&self.pool, &self.retry, move |tx| {
            let token = token.clone();
            async move {
                // A second revocation of the same token is a no-op.
                sqlx::query(
                    "INSERT INTO revoked_token (token, revoked_at, expires_at) \
                     VALUES ($1, NOW(), $2) ON CONFLICT (token) DO NOTHING",
                )
                .bind(token)
                .bind(expires_at)
                .execute(tx.conn())
                .await
                .map(|_| ())
            }
            .boxed()
        })
        .await?;

        Ok(())
    }

    async fn is_revoked(&self, token: &str) -> Result<bool, AppError> {
        let token = token.to_owned();

        let revoked = run_in_tx(&self.pool, &self.retry, move |tx| {
            let token = token.clone();
            async move {
                sqlx::query_scalar::<_, bool>(
                    "SELECT EXISTS (SELECT 1 FROM revoked_token WHERE token = $1)",
                )
                .bind(token)
                .fetch_one(tx.conn())
                .await
            }
            .boxed()
        })
        .await?;

        Ok(revoked)
    }

    async fn purge_expired(&self) -> Result<u64, AppError> {
        let purged = run_in_tx(&self.pool, &self.retry, |tx| {
            async move {
                sqlx::query(PURGE_EXPIRED_SQL)
                    .execute(tx.conn())
                    .await
                    .map(|result| result.rows_affected())
            }
            .boxed()
        })
        .await?;

        tracing::info!(purged, "Purged expired revocation entries");
        Ok(purged)
    }
}
