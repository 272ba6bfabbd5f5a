/// Postgres-backed user store.

use async_trait::async_trait;
use futures::FutureExt;
use sqlx::{PgPool, Postgres, QueryBuilder};
use uuid::Uuid;

use crate::db::{run_in_tx, RetryContext};
use crate::domain::{NewUser, User, UserFilter, UserPatch, UserStore};
use crate::error::AppError;

const USER_COLUMNS: &str = "id, username, email, password, first_name, last_name, picture, \
                            active, deleted, deleted_at, created_at, updated_at";

#[derive(Clone)]
pub struct PgUserStore {
    pool: PgPool,
    retry: RetryContext,
}

impl PgUserStore {
    pub fn new(pool: PgPool) -> Self {
        Self::with_retry(pool, RetryContext::default())
    }

    pub fn with_retry(pool: PgPool, retry: RetryContext) -> Self {
        Self { pool, retry }
    }
}

#[async_trait]
impl UserStore for PgUserStore {
    async fn find_all(&self, filter: &UserFilter) -> Result<Vec<User>, AppError> {
        let filter = filter.clone();

        let users = run_in_tx(&self.pool, &self.retry, move |tx| {
            let filter = filter.clone();
            async move {
                let mut query = QueryBuilder::<Postgres>::new(format!(
                    r#"SELECT {} FROM "user" WHERE 1 = 1"#,
                    USER_COLUMNS
                ));
                if let Some(email) = filter.email {
                    query.push(" AND email = ").push_bind(email);
                }
                if let Some(first_name) = filter.first_name {
                    query.push(" AND first_name = ").push_bind(first_name);
                }
                if let Some(last_name) = filter.last_name {
                    query.push(" AND last_name = ").push_bind(last_name);
                }
                if let Some(active) = filter.active {
                    query.push(" AND active = ").push_bind(active);
                }
                if let Some(deleted) = filter.deleted {
                    query.push(" AND deleted = ").push_bind(deleted);
                }
                if let Some((start, end)) = filter.created_between {
                    if start < end {
                        query
                            .push(" AND created_at BETWEEN ")
                            .push_bind(start)
                            .push(" AND ")
                            .push_bind(end);
                    }
                }
                query.push(" ORDER BY id");

                query.build_query_as::<User>().fetch_all(tx.conn()).await
            }
            .boxed()
        })
        .await?;

        Ok(users)
    }

    #[tracing::instrument(name = "user_store.find_by_id", skip(self))]
    async fn find_by_id(&self, id: Uuid) -> Result<User, AppError> {
        let sql = format!(
            r#"SELECT {} FROM "user" WHERE id = $1 AND NOT deleted AND active"#,
            USER_COLUMNS
        );

        let user = run_in_tx(&self.pool, &self.retry, move |tx| {
            let sql = sql.clone();
            async move {
                sqlx::query_as::<_, User>(&sql)
                    .bind(id)
                    .fetch_optional(tx.conn())
                    .await
            }
            .boxed()
        })
        .await?;

        user.ok_or_else(|| AppError::not_found("User", format!("id={}", id)))
    }

    #[tracing::instrument(name = "user_store.find_by_username", skip(self))]
    async fn find_by_username(&self, username: &str) -> Result<User, AppError> {
        let sql = format!(
            r#"SELECT {} FROM "user" WHERE username = $1 AND NOT deleted AND active"#,
            USER_COLUMNS
        );
        let name = username.to_owned();

        let user = run_in_tx(&self.pool, &self.retry, move |tx| {
            let sql = sql.clone();
            let name = name.clone();
            async move {
                sqlx::query_as::<_, User>(&sql)
                    .bind(name)
                    .fetch_optional(tx.conn())
                    .await
            }
            .boxed()
        })
        .await?;

        user.ok_or_else(|| AppError::not_found("User", format!("username={}", username)))
    }

    #[tracing::instrument(name = "user_store.create", skip(self, user), fields(username = %user.username))]
    async fn create(&self, user: &NewUser) -> Result<User, AppError> {
        let sql = format!(
            r#"INSERT INTO "user" (username, email, password, first_name, last_name, picture)
               VALUES ($1, $2, $3, $4, $5, $6)
               RETURNING {}"#,
            USER_COLUMNS
        );
        let user = user.clone();

        let created = run_in_tx(&self.pool, &self.retry, move |tx| {
            let sql = sql.clone();
            let user = user.clone();
            async move {
                sqlx::query_as::<_, User>(&sql)
                    .bind(user.username)
                    .bind(user.email)
                    .bind(user.password.as_str())
                    .bind(user.first_name)
                    .bind(user.last_name)
                    .bind(user.picture)
                    .fetch_one(tx.conn())
                    .await
            }
            .boxed()
        })
        .await?;

        Ok(created)
    }

    #[tracing::instrument(name = "user_store.update", skip(self, patch))]
    async fn update(&self, id: Uuid, patch: &UserPatch) -> Result<User, AppError> {
        let patch = patch.clone().normalized();

        let updated = run_in_tx(&self.pool, &self.retry, move |tx| {
            let patch = patch.clone();
            async move {
                let mut query = QueryBuilder::<Postgres>::new(r#"UPDATE "user" SET "#);
                let mut fields = query.separated(", ");
                fields.push("updated_at = NOW()");
                if let Some(username) = patch.username {
                    fields.push("username = ").push_bind_unseparated(username);
                }
                if let Some(email) = patch.email {
                    fields.push("email = ").push_bind_unseparated(email);
                }
                if let Some(first_name) = patch.first_name {
                    fields.push("first_name = ").push_bind_unseparated(first_name);
                }
                if let Some(last_name) = patch.last_name {
                    fields.push("last_name = ").push_bind_unseparated(last_name);
                }
                if let Some(picture) = patch.picture {
                    fields.push("picture = ").push_bind_unseparated(picture);
                }
                query.push(" WHERE id = ").push_bind(id);
                query.push(format!(" RETURNING {}", USER_COLUMNS));

                query.build_query_as::<User>().fetch_optional(tx.conn()).await
            }
            .boxed()
        })
        .await?;

        updated.ok_or_else(|| AppError::not_found("User", format!("id={}", id)))
    }

    #[tracing::instrument(name = "user_store.soft_delete", skip(self))]
    async fn soft_delete(&self, id: Uuid) -> Result<(), AppError> {
        run_in_tx(&self.pool, &self.retry, move |tx| {
            async move {
                sqlx::query(r#"UPDATE "user" SET deleted = true, deleted_at = NOW() WHERE id = $1"#)
                    .bind(id)
                    .execute(tx.conn())
                    .await
                    .map(|_| ())
            }
            .boxed()
        })
        .await?;

        Ok(())
    }

    #[tracing::instrument(name = "user_store.delete", skip(self))]
    async fn delete(&self, id: Uuid) -> Result<(), AppError> {
        run_in_tx(&self.pool, &self.retry, move |tx| {
            async move {
                sqlx::query(r#"DELETE FROM "user" WHERE id = $1"#)
                    .bind(id)
                    .execute(tx.conn())
                    .await
                    .map(|_| ())
            }
            .boxed()
        })
        .await?;

        Ok(())
    }
}
