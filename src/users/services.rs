use std::sync::Arc;

use tracing::{debug, error, info, instrument, warn};

use crate::users::{
    dto::{CreateUserRequest, UpdateUserRequest, UserView},
    error::{ServiceError, ServiceResult},
    password::CredentialHasher,
    repo::{OpContext, RepoError, UserRepository},
    repo_types::NewUser,
};

/// User lifecycle rules on top of a repository and a credential hasher.
#[derive(Clone)]
pub struct UserService {
    repo: Arc<dyn UserRepository>,
    hasher: Arc<dyn CredentialHasher>,
}

impl UserService {
    pub fn new(repo: Arc<dyn UserRepository>, hasher: Arc<dyn CredentialHasher>) -> Self {
        Self { repo, hasher }
    }

    /// Argon2 is CPU-bound; keep it off the async workers.
    async fn hash_password(&self, plain: String) -> ServiceResult<String> {
        let hasher = Arc::clone(&self.hasher);
        let hashed = tokio::task::spawn_blocking(move || hasher.hash(&plain))
            .await
            .map_err(|e| {
                error!(error = %e, "password hashing task failed");
                ServiceError::Hashing(e.to_string())
            })??;
        Ok(hashed)
    }

    #[instrument(skip(self, ctx, req), fields(username = %req.username))]
    pub async fn create_user(
        &self,
        ctx: &OpContext,
        req: CreateUserRequest,
    ) -> ServiceResult<UserView> {
        if req.username.is_empty() || req.password.is_empty() {
            warn!("missing username or password");
            return Err(ServiceError::Validation(
                "username and password are required".into(),
            ));
        }

        let password_hash = self.hash_password(req.password).await?;
        let new_user = NewUser {
            username: req.username,
            password_hash,
            email: req.email,
        };

        let user = self.repo.create(ctx, new_user).await.map_err(|e| match e {
            RepoError::DuplicateKey(key) => {
                warn!(%key, "create rejected by unique constraint");
                ServiceError::Conflict("username or email already exists".into())
            }
            other => other.into(),
        })?;

        info!(user_id = user.id, "user created");
        Ok(user.into())
    }

    #[instrument(skip(self, ctx))]
    pub async fn get_user(&self, ctx: &OpContext, id: u64) -> ServiceResult<UserView> {
        let user = self.repo.find_by_id(ctx, id).await?;
        Ok(user.into())
    }

    #[instrument(skip(self, ctx))]
    pub async fn list_users(&self, ctx: &OpContext) -> ServiceResult<Vec<UserView>> {
        let users = self.repo.list_ordered_by_id_desc(ctx).await?;
        debug!(count = users.len(), "users listed");
        Ok(users.into_iter().map(UserView::from).collect())
    }

    #[instrument(skip(self, ctx, req), fields(user_id = req.id))]
    pub async fn update_user(
        &self,
        ctx: &OpContext,
        req: UpdateUserRequest,
    ) -> ServiceResult<UserView> {
        let mut user = self.repo.find_by_id(ctx, req.id).await.map_err(|e| match e {
            RepoError::NotFound => ServiceError::user_not_found(),
            other => other.into(),
        })?;

        if let Some(password) = req.password {
            user.password_hash = self.hash_password(password).await?;
            debug!("password replaced");
        }
        // Set-only: an absent email keeps the stored one; there is no clearing path.
        if let Some(email) = req.email {
            user.email = Some(email);
        }

        let user = self.repo.save(ctx, &user).await.map_err(|e| match e {
            RepoError::DuplicateKey(key) => {
                warn!(%key, "update rejected by unique constraint");
                ServiceError::Conflict("email already exists".into())
            }
            other => other.into(),
        })?;

        info!("user updated");
        Ok(user.into())
    }

    #[instrument(skip(self, ctx))]
    pub async fn delete_user(&self, ctx: &OpContext, id: u64) -> ServiceResult<()> {
        self.repo.delete_by_id(ctx, id).await?;
        info!("user deleted");
        Ok(())
    }
}
