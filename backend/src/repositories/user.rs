//! User persistence: identity lookup, provider linking, login metadata and
//! the denormalized session counter.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;

use super::RepositoryError;
use crate::models::user::{AuthProvider, NewUser, User};
use crate::types::UserId;

const USER_COLUMNS: &str = "id, email, name, avatar, google_id, github_id, linkedin_id, skills, \
     company, experience, is_active, last_login, login_count, active_session_count, \
     created_at, updated_at";

#[async_trait]
pub trait UserRepository: Send + Sync {
    async fn find_by_id(&self, id: UserId) -> Result<Option<User>, RepositoryError>;

    /// Single lookup matching the provider's id column OR the email. When
    /// both clauses match different users the provider-id match wins.
    async fn find_by_provider_or_email(
        &self,
        provider: AuthProvider,
        provider_id: &str,
        email: &str,
    ) -> Result<Option<User>, RepositoryError>;

    async fn create(&self, new_user: &NewUser) -> Result<User, RepositoryError>;

    async fn link_provider(
        &self,
        id: UserId,
        provider: AuthProvider,
        provider_id: &str,
    ) -> Result<User, RepositoryError>;

    /// Sets `last_login` and bumps the lifetime login count.
    async fn record_login(&self, id: UserId, at: DateTime<Utc>) -> Result<(), RepositoryError>;

    /// Adds `delta` to the session counter, flooring the result at zero.
    async fn adjust_session_count(&self, id: UserId, delta: i32) -> Result<(), RepositoryError>;

    async fn set_session_count(&self, id: UserId, count: i32) -> Result<(), RepositoryError>;

    async fn count(&self) -> Result<i64, RepositoryError>;
}

#[derive(Clone)]
pub struct PgUserRepository {
    pool: PgPool,
}

impl PgUserRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl UserRepository for PgUserRepository {
    async fn find_by_id(&self, id: UserId) -> Result<Option<User>, RepositoryError> {
        let user = sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(user)
    }

    async fn find_by_provider_or_email(
        &self,
        provider: AuthProvider,
        provider_id: &str,
        email: &str,
    ) -> Result<Option<User>, RepositoryError> {
        let column = provider.id_column();
        let user = sqlx::query_as::<_, User>(&format!(
            r#"
            SELECT {USER_COLUMNS}
            FROM users
            WHERE {column} = $1 OR email = $2
            ORDER BY ({column} = $1) DESC NULLS LAST, created_at ASC
            LIMIT 1
            "#
        ))
        .bind(provider_id)
        .bind(email)
        .fetch_optional(&self.pool)
        .await?;
        Ok(user)
    }

    async fn create(&self, new_user: &NewUser) -> Result<User, RepositoryError> {
        let column = new_user.provider.id_column();
        let now = Utc::now();
        let user = sqlx::query_as::<_, User>(&format!(
            r#"
            INSERT INTO users (id, email, name, avatar, {column}, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $6)
            RETURNING {USER_COLUMNS}
            "#
        ))
        .bind(UserId::new())
        .bind(&new_user.email)
        .bind(&new_user.name)
        .bind(&new_user.avatar)
        .bind(&new_user.provider_id)
        .bind(now)
        .fetch_one(&self.pool)
        .await?;
        Ok(user)
    }

    async fn link_provider(
        &self,
        id: UserId,
        provider: AuthProvider,
        provider_id: &str,
    ) -> Result<User, RepositoryError> {
        let column = provider.id_column();
        sqlx::query_as::<_, User>(&format!(
            r#"
            UPDATE users
            SET {column} = $1, updated_at = $2
            WHERE id = $3
            RETURNING {USER_COLUMNS}
            "#
        ))
        .bind(provider_id)
        .bind(Utc::now())
        .bind(id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or(RepositoryError::NotFound)
    }

    async fn record_login(&self, id: UserId, at: DateTime<Utc>) -> Result<(), RepositoryError> {
        sqlx::query(
            r#"
            UPDATE users
            SET last_login = $1, login_count = login_count + 1, updated_at = $1
            WHERE id = $2
            "#,
        )
        .bind(at)
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn adjust_session_count(&self, id: UserId, delta: i32) -> Result<(), RepositoryError> {
        sqlx::query(
            "UPDATE users SET active_session_count = GREATEST(active_session_count + $1, 0) \
             WHERE id = $2",
        )
        .bind(delta)
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn set_session_count(&self, id: UserId, count: i32) -> Result<(), RepositoryError> {
        sqlx::query("UPDATE users SET active_session_count = GREATEST($1, 0) WHERE id = $2")
            .bind(count)
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn count(&self) -> Result<i64, RepositoryError> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM users")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }
}
