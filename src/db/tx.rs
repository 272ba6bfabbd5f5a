/// Transaction handles the retry executor can drive.

use async_trait::async_trait;
use sqlx::{PgConnection, PgPool, Postgres, Transaction};

/// The statements the executor itself needs: raw exec for savepoint control,
/// then exactly one of commit or rollback to release the handle.
#[async_trait]
pub trait Tx: Send {
    type Error: std::error::Error + Send + Sync + 'static;

    async fn exec(&mut self, statement: &str) -> Result<(), Self::Error>;

    async fn commit(self) -> Result<(), Self::Error>;

    async fn rollback(self) -> Result<(), Self::Error>;
}

/// A Postgres transaction opened from the pool.
pub struct PgTx {
    inner: Transaction<'static, Postgres>,
}

impl PgTx {
    pub async fn begin(pool: &PgPool) -> Result<Self, sqlx::Error> {
        Ok(Self {
            inner: pool.begin().await?,
        })
    }

    /// Connection for the unit of work's own queries.
    pub fn conn(&mut self) -> &mut PgConnection {
        &mut self.inner
    }
}

#[async_trait]
impl Tx for PgTx {
    type Error = sqlx::Error;

    async fn exec(&mut self, statement: &str) -> Result<(), sqlx::Error> {
        sqlx::query(statement).execute(self.conn()).await?;
        Ok(())
    }

    async fn commit(self) -> Result<(), sqlx::Error> {
        self.inner.commit().await
    }

    async fn rollback(self) -> Result<(), sqlx::Error> {
        self.inner.rollback().await
    }
}
