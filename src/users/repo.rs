use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use sqlx::PgPool;
use thiserror::Error;
use tokio::time::Instant;
use tracing::{debug, error};

use crate::users::repo_types::{NewUser, User};

#[derive(Debug, Error)]
pub enum RepoError {
    /// A unique constraint rejected the write; carries the constraint name when known.
    #[error("duplicate key: {0}")]
    DuplicateKey(String),
    #[error("record not found")]
    NotFound,
    #[error("deadline exceeded")]
    DeadlineExceeded,
    #[error("store error: {0}")]
    Store(#[source] sqlx::Error),
}

/// Deadline carried into every repository call.
#[derive(Debug, Clone, Copy)]
pub struct OpContext {
    deadline: Option<Instant>,
}

impl OpContext {
    pub fn background() -> Self {
        Self { deadline: None }
    }

    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            deadline: Some(Instant::now() + timeout),
        }
    }

    pub fn is_expired(&self) -> bool {
        self.deadline.is_some_and(|d| Instant::now() >= d)
    }

    /// Runs `fut` unless the deadline has passed, aborting it once the deadline hits.
    pub async fn run<T, F>(&self, fut: F) -> Result<T, RepoError>
    where
        F: Future<Output = Result<T, RepoError>>,
    {
        match self.deadline {
            None => fut.await,
            Some(_) if self.is_expired() => Err(RepoError::DeadlineExceeded),
            Some(deadline) => tokio::time::timeout_at(deadline, fut)
                .await
                .map_err(|_| RepoError::DeadlineExceeded)?,
        }
    }
}

/// Persistence boundary for users. The store is the only arbiter of uniqueness.
#[async_trait]
pub trait UserRepository: Send + Sync {
    async fn create(&self, ctx: &OpContext, user: NewUser) -> Result<User, RepoError>;

    async fn find_by_id(&self, ctx: &OpContext, id: u64) -> Result<User, RepoError>;

    /// Newest first.
    async fn list_ordered_by_id_desc(&self, ctx: &OpContext) -> Result<Vec<User>, RepoError>;

    /// Full-row update in place; bumps `updated_at`.
    async fn save(&self, ctx: &OpContext, user: &User) -> Result<User, RepoError>;

    async fn delete_by_id(&self, ctx: &OpContext, id: u64) -> Result<(), RepoError>;
}

#[derive(Debug, Clone)]
pub struct PgUserRepository {
    db: PgPool,
}

impl PgUserRepository {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }
}

// BIGSERIAL never hands out ids above i64::MAX, so such an id cannot name a row.
fn pg_id(id: u64) -> Result<i64, RepoError> {
    i64::try_from(id).map_err(|_| RepoError::NotFound)
}

fn map_sqlx_err(e: sqlx::Error) -> RepoError {
    if let sqlx::Error::Database(db_err) = &e {
        if db_err.is_unique_violation() {
            let constraint = db_err.constraint().unwrap_or("unique").to_string();
            debug!(%constraint, "unique violation");
            return RepoError::DuplicateKey(constraint);
        }
    }
    error!(error = %e, "user store error");
    RepoError::Store(e)
}

#[async_trait]
impl UserRepository for PgUserRepository {
    async fn create(&self, ctx: &OpContext, user: NewUser) -> Result<User, RepoError> {
        ctx.run(async {
            sqlx::query_as::<_, User>(
                r#"
                INSERT INTO users (username, password, email)
                VALUES ($1, $2, $3)
                RETURNING id, username, password, email, created_at, updated_at
                "#,
            )
            .bind(&user.username)
            .bind(&user.password_hash)
            .bind(&user.email)
            .fetch_one(&self.db)
            .await
            .map_err(map_sqlx_err)
        })
        .await
    }

    async fn find_by_id(&self, ctx: &OpContext, id: u64) -> Result<User, RepoError> {
        let id = pg_id(id)?;
        ctx.run(async {
            sqlx::query_as::<_, User>(
                r#"
                SELECT id, username, password, email, created_at, updated_at
                FROM users
                WHERE id = $1
                "#,
            )
            .bind(id)
            .fetch_optional(&self.db)
            .await
            .map_err(map_sqlx_err)?
            .ok_or(RepoError::NotFound)
        })
        .await
    }

    async fn list_ordered_by_id_desc(&self, ctx: &OpContext) -> Result<Vec<User>, RepoError> {
        ctx.run(async {
            sqlx::query_as::<_, User>(
                r#"
                SELECT id, username, password, email, created_at, updated_at
                FROM users
                ORDER BY id DESC
                "#,
            )
            .fetch_all(&self.db)
            .await
            .map_err(map_sqlx_err)
        })
        .await
    }

    async fn save(&self, ctx: &OpContext, user: &User) -> Result<User, RepoError> {
        let id = pg_id(user.id)?;
        ctx.run(async {
            sqlx::query_as::<_, User>(
                r#"
                UPDATE users
                   SET username = $2,
                       password = $3,
                       email = $4,
                       updated_at = GREATEST(now(), updated_at + INTERVAL '1 microsecond')
                 WHERE id = $1
                RETURNING id, username, password, email, created_at, updated_at
                "#,
            )
            .bind(id)
            .bind(&user.username)
            .bind(&user.password_hash)
            .bind(&user.email)
            .fetch_optional(&self.db)
            .await
            .map_err(map_sqlx_err)?
            .ok_or(RepoError::NotFound)
        })
        .await
    }

    async fn delete_by_id(&self, ctx: &OpContext, id: u64) -> Result<(), RepoError> {
        let id = pg_id(id)?;
        ctx.run(async {
            let result = sqlx::query("DELETE FROM users WHERE id = $1")
                .bind(id)
                .execute(&self.db)
                .await
                .map_err(map_sqlx_err)?;
            if result.rows_affected() == 0 {
                return Err(RepoError::NotFound);
            }
            Ok(())
        })
        .await
    }
}

#[cfg(test)]
pub mod memory {
    use super::*;
    use std::collections::BTreeMap;
    use std::sync::Arc;
    use time::OffsetDateTime;
    use tokio::sync::RwLock;

    #[derive(Debug, Default)]
    struct Table {
        rows: BTreeMap<u64, User>,
        next_id: u64,
    }

    impl Table {
        fn collision(&self, own_id: Option<u64>, username: &str, email: Option<&str>) -> Option<&'static str> {
            let others = self.rows.values().filter(|u| Some(u.id) != own_id);
            for other in others {
                if other.username == username {
                    return Some("users_username_key");
                }
                if email.is_some() && other.email.as_deref() == email {
                    return Some("users_email_key");
                }
            }
            None
        }
    }

    /// Mirrors the users table constraints in memory.
    #[derive(Debug, Default, Clone)]
    pub struct InMemoryUserRepository {
        table: Arc<RwLock<Table>>,
    }

    impl InMemoryUserRepository {
        pub fn new() -> Self {
            Self::default()
        }

        pub async fn len(&self) -> usize {
            self.table.read().await.rows.len()
        }

        pub async fn raw(&self, id: u64) -> Option<User> {
            self.table.read().await.rows.get(&id).cloned()
        }
    }

    #[async_trait]
    impl UserRepository for InMemoryUserRepository {
        async fn create(&self, ctx: &OpContext, user: NewUser) -> Result<User, RepoError> {
            ctx.run(async {
                let mut table = self.table.write().await;
                if let Some(key) = table.collision(None, &user.username, user.email.as_deref()) {
                    return Err(RepoError::DuplicateKey(key.to_string()));
                }
                table.next_id += 1;
                let now = OffsetDateTime::now_utc();
                let row = User {
                    id: table.next_id,
                    username: user.username,
                    password_hash: user.password_hash,
                    email: user.email,
                    created_at: now,
                    updated_at: now,
                };
                table.rows.insert(row.id, row.clone());
                Ok(row)
            })
            .await
        }

        async fn find_by_id(&self, ctx: &OpContext, id: u64) -> Result<User, RepoError> {
            ctx.run(async { self.raw(id).await.ok_or(RepoError::NotFound) })
                .await
        }

        async fn list_ordered_by_id_desc(&self, ctx: &OpContext) -> Result<Vec<User>, RepoError> {
            ctx.run(async {
                let table = self.table.read().await;
                Ok(table.rows.values().rev().cloned().collect())
            })
            .await
        }

        async fn save(&self, ctx: &OpContext, user: &User) -> Result<User, RepoError> {
            ctx.run(async {
                let mut table = self.table.write().await;
                let Some(existing) = table.rows.get(&user.id) else {
                    return Err(RepoError::NotFound);
                };
                let previous = existing.updated_at;
                if let Some(key) = table.collision(Some(user.id), &user.username, user.email.as_deref()) {
                    return Err(RepoError::DuplicateKey(key.to_string()));
                }
                let now = OffsetDateTime::now_utc();
                let mut row = user.clone();
                row.updated_at = if now > previous {
                    now
                } else {
                    previous + time::Duration::microseconds(1)
                };
                table.rows.insert(row.id, row.clone());
                Ok(row)
            })
            .await
        }

        async fn delete_by_id(&self, ctx: &OpContext, id: u64) -> Result<(), RepoError> {
            ctx.run(async {
                let mut table = self.table.write().await;
                table.rows.remove(&id).map(|_| ()).ok_or(RepoError::NotFound)
            })
            .await
        }
    }
}
