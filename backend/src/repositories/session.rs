use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use super::RepositoryError;
use crate::models::session::{NewSession, Session};
use crate::types::{SessionId, UserId};

const SESSION_COLUMNS: &str = "id, user_id, refresh_token_hash, access_token_hash, provider, \
     user_agent, ip_address, is_active, last_used, expires_at, created_at, logged_out_at";

/// Session persistence. "Valid" means active and not yet expired; "stale"
/// means inactive or expired and therefore eligible for hard deletion.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SessionRepository: Send + Sync {
    async fn insert(&self, session: &NewSession) -> Result<Session, RepositoryError>;

    async fn find_valid_by_access_token_hash(
        &self,
        user_id: UserId,
        access_token_hash: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<Session>, RepositoryError>;

    async fn touch(&self, id: SessionId, at: DateTime<Utc>) -> Result<bool, RepositoryError>;

    /// Valid sessions of a user, most recently used first.
    async fn list_valid_for_user(
        &self,
        user_id: UserId,
        now: DateTime<Utc>,
    ) -> Result<Vec<Session>, RepositoryError>;

    async fn count_valid_for_user(
        &self,
        user_id: UserId,
        now: DateTime<Utc>,
    ) -> Result<i64, RepositoryError>;

    async fn deactivate(&self, ids: &[SessionId], at: DateTime<Utc>)
        -> Result<u64, RepositoryError>;

    /// Deactivates every active session of the user whose access token hash
    /// differs from `keep_access_token_hash`.
    async fn deactivate_all_except(
        &self,
        user_id: UserId,
        keep_access_token_hash: &str,
        at: DateTime<Utc>,
    ) -> Result<u64, RepositoryError>;

    /// Deletes the matching session and returns it.
    async fn delete_by_refresh_token_hash(
        &self,
        refresh_token_hash: &str,
    ) -> Result<Option<Session>, RepositoryError>;

    async fn delete_all_for_user(&self, user_id: UserId) -> Result<u64, RepositoryError>;

    async fn delete_stale_for_user(
        &self,
        user_id: UserId,
        now: DateTime<Utc>,
    ) -> Result<u64, RepositoryError>;

    async fn delete_stale(&self, now: DateTime<Utc>) -> Result<u64, RepositoryError>;
}

#[derive(Clone)]
pub struct PgSessionRepository {
    pool: PgPool,
}

impl PgSessionRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SessionRepository for PgSessionRepository {
    async fn insert(&self, session: &NewSession) -> Result<Session, RepositoryError> {
        let now = Utc::now();
        let created = sqlx::query_as::<_, Session>(&format!(
            r#"
            INSERT INTO sessions
                (id, user_id, refresh_token_hash, access_token_hash, provider,
                 user_agent, ip_address, is_active, last_used, expires_at, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, TRUE, $8, $9, $8)
            RETURNING {SESSION_COLUMNS}
            "#
        ))
        .bind(SessionId::new())
        .bind(session.user_id)
        .bind(&session.refresh_token_hash)
        .bind(&session.access_token_hash)
        .bind(session.provider)
        .bind(&session.device.user_agent)
        .bind(&session.device.ip_address)
        .bind(now)
        .bind(session.expires_at)
        .fetch_one(&self.pool)
        .await?;
        Ok(created)
    }

    async fn find_valid_by_access_token_hash(
        &self,
        user_id: UserId,
        access_token_hash: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<Session>, RepositoryError> {
        let session = sqlx::query_as::<_, Session>(&format!(
            r#"
            SELECT {SESSION_COLUMNS}
            FROM sessions
            WHERE user_id = $1 AND access_token_hash = $2 AND is_active AND expires_at > $3
            "#
        ))
        .bind(user_id)
        .bind(access_token_hash)
        .bind(now)
        .fetch_optional(&self.pool)
        .await?;
        Ok(session)
    }

    async fn touch(&self, id: SessionId, at: DateTime<Utc>) -> Result<bool, RepositoryError> {
        let result = sqlx::query("UPDATE sessions SET last_used = $1 WHERE id = $2")
            .bind(at)
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn list_valid_for_user(
        &self,
        user_id: UserId,
        now: DateTime<Utc>,
    ) -> Result<Vec<Session>, RepositoryError> {
        let sessions = sqlx::query_as::<_, Session>(&format!(
            r#"
            SELECT {SESSION_COLUMNS}
            FROM sessions
            WHERE user_id = $1 AND is_active AND expires_at > $2
            ORDER BY last_used DESC, created_at DESC, id DESC
            "#
        ))
        .bind(user_id)
        .bind(now)
        .fetch_all(&self.pool)
        .await?;
        Ok(sessions)
    }

    async fn count_valid_for_user(
        &self,
        user_id: UserId,
        now: DateTime<Utc>,
    ) -> Result<i64, RepositoryError> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM sessions WHERE user_id = $1 AND is_active AND expires_at > $2",
        )
        .bind(user_id)
        .bind(now)
        .fetch_one(&self.pool)
        .await?;
        Ok(count)
    }

    async fn deactivate(
        &self,
        ids: &[SessionId],
        at: DateTime<Utc>,
    ) -> Result<u64, RepositoryError> {
        if ids.is_empty() {
            return Ok(0);
        }
        let ids: Vec<Uuid> = ids.iter().map(|id| *id.as_uuid()).collect();
        let result = sqlx::query(
            r#"
            UPDATE sessions
            SET is_active = FALSE, logged_out_at = $1
            WHERE id = ANY($2) AND is_active
            "#,
        )
        .bind(at)
        .bind(&ids)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    async fn deactivate_all_except(
        &self,
        user_id: UserId,
        keep_access_token_hash: &str,
        at: DateTime<Utc>,
    ) -> Result<u64, RepositoryError> {
        let result = sqlx::query(
            r#"
            UPDATE sessions
            SET is_active = FALSE, logged_out_at = $1
            WHERE user_id = $2 AND is_active AND access_token_hash <> $3
            "#,
        )
        .bind(at)
        .bind(user_id)
        .bind(keep_access_token_hash)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    async fn delete_by_refresh_token_hash(
        &self,
        refresh_token_hash: &str,
    ) -> Result<Option<Session>, RepositoryError> {
        let deleted = sqlx::query_as::<_, Session>(&format!(
            "DELETE FROM sessions WHERE refresh_token_hash = $1 RETURNING {SESSION_COLUMNS}"
        ))
        .bind(refresh_token_hash)
        .fetch_optional(&self.pool)
        .await?;
        Ok(deleted)
    }

    async fn delete_all_for_user(&self, user_id: UserId) -> Result<u64, RepositoryError> {
        let result = sqlx::query("DELETE FROM sessions WHERE user_id = $1")
            .bind(user_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    async fn delete_stale_for_user(
        &self,
        user_id: UserId,
        now: DateTime<Utc>,
    ) -> Result<u64, RepositoryError> {
        let result = sqlx::query(
            "DELETE FROM sessions WHERE user_id = $1 AND (expires_at < $2 OR NOT is_active)",
        )
        .bind(user_id)
        .bind(now)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    async fn delete_stale(&self, now: DateTime<Utc>) -> Result<u64, RepositoryError> {
        let result = sqlx::query("DELETE FROM sessions WHERE expires_at < $1 OR NOT is_active")
            .bind(now)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}
