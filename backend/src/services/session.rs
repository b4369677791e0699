//! Session lifecycle: creation under the concurrent-session cap, gate
//! validation, the three logout variants and stale-session cleanup.
//!
//! The per-user `active_session_count` is maintained with writes separate
//! from the session rows. It is a cache; the rows are authoritative.

use std::sync::Arc;

use chrono::Utc;

use crate::error::AuthError;
use crate::models::session::{DeviceInfo, NewSession, Session, SessionResponse};
use crate::models::user::AuthProvider;
use crate::repositories::{SessionRepository, UserRepository};
use crate::types::{SessionId, UserId};
use crate::utils::jwt::{hash_token, TokenPair};

#[derive(Clone)]
pub struct SessionManager {
    users: Arc<dyn UserRepository>,
    sessions: Arc<dyn SessionRepository>,
    max_sessions: u32,
}

impl SessionManager {
    pub fn new(
        users: Arc<dyn UserRepository>,
        sessions: Arc<dyn SessionRepository>,
        max_sessions: u32,
    ) -> Self {
        Self {
            users,
            sessions,
            max_sessions: max_sessions.max(1),
        }
    }

    /// Persists a session for `tokens`, evicting the least recently used
    /// sessions first so the user stays within the cap.
    pub async fn create_session(
        &self,
        user_id: UserId,
        tokens: &TokenPair,
        provider: AuthProvider,
        device: DeviceInfo,
    ) -> Result<Session, AuthError> {
        if let Err(err) = self.cleanup_expired().await {
            tracing::warn!(error = %err, "Pre-login session cleanup failed");
        }
        self.enforce_cap(user_id).await?;

        let session = self
            .sessions
            .insert(&NewSession {
                user_id,
                refresh_token_hash: hash_token(&tokens.refresh_token),
                access_token_hash: hash_token(&tokens.access_token),
                provider,
                device,
                expires_at: tokens.refresh_expires_at,
            })
            .await?;
        self.users.adjust_session_count(user_id, 1).await?;

        tracing::info!(
            user_id = %user_id,
            session_id = %session.id,
            provider = %provider,
            "Session created"
        );
        Ok(session)
    }

    /// Deactivates every valid session beyond the `max - 1` most recently
    /// used ones. Returns the number evicted.
    pub async fn enforce_cap(&self, user_id: UserId) -> Result<u64, AuthError> {
        let now = Utc::now();
        let valid = self.sessions.count_valid_for_user(user_id, now).await?;
        if valid < i64::from(self.max_sessions) {
            return Ok(0);
        }
        let active = self.sessions.list_valid_for_user(user_id, now).await?;

        let keep = self.max_sessions as usize - 1;
        let evict: Vec<SessionId> = active.iter().skip(keep).map(|s| s.id).collect();
        let evicted = self.sessions.deactivate(&evict, now).await?;
        if evicted > 0 {
            self.users
                .adjust_session_count(user_id, -(evicted as i32))
                .await?;
            tracing::info!(user_id = %user_id, evicted, "Session cap reached, evicted oldest sessions");
        }
        Ok(evicted)
    }

    /// Resolves the session backing an access token and bumps its `last_used`.
    pub async fn validate_access(
        &self,
        user_id: UserId,
        access_token: &str,
    ) -> Result<Session, AuthError> {
        let now = Utc::now();
        let mut session = self
            .sessions
            .find_valid_by_access_token_hash(user_id, &hash_token(access_token), now)
            .await?
            .ok_or(AuthError::SessionInvalid)?;
        self.sessions.touch(session.id, now).await?;
        session.last_used = now;
        Ok(session)
    }

    /// Deletes the session owning `refresh_token`. Returns the number of
    /// rows removed, including the owner's purged stale sessions.
    pub async fn logout_current(&self, refresh_token: Option<&str>) -> Result<u64, AuthError> {
        let Some(refresh_token) = refresh_token.filter(|token| !token.is_empty()) else {
            return Ok(0);
        };

        let Some(session) = self
            .sessions
            .delete_by_refresh_token_hash(&hash_token(refresh_token))
            .await?
        else {
            return Ok(0);
        };

        let now = Utc::now();
        // Evicted sessions were already subtracted when they were deactivated.
        if session.is_valid_at(now) {
            self.users.adjust_session_count(session.user_id, -1).await?;
        }
        let purged = self
            .sessions
            .delete_stale_for_user(session.user_id, now)
            .await?;

        tracing::info!(
            user_id = %session.user_id,
            session_id = %session.id,
            purged,
            "Session logged out"
        );
        Ok(1 + purged)
    }

    /// Deactivates all of the user's sessions except the one bound to
    /// `current_access_token`.
    pub async fn logout_others(
        &self,
        user_id: UserId,
        current_access_token: &str,
    ) -> Result<u64, AuthError> {
        let invalidated = self
            .sessions
            .deactivate_all_except(user_id, &hash_token(current_access_token), Utc::now())
            .await?;
        self.users.set_session_count(user_id, 1).await?;
        tracing::info!(user_id = %user_id, invalidated, "Logged out other sessions");
        Ok(invalidated)
    }

    pub async fn logout_all(&self, user_id: UserId) -> Result<u64, AuthError> {
        let deleted = self.sessions.delete_all_for_user(user_id).await?;
        self.users.set_session_count(user_id, 0).await?;
        tracing::info!(user_id = %user_id, deleted, "Logged out all sessions");
        Ok(deleted)
    }

    /// Hard-deletes sessions that are expired or inactive.
    pub async fn cleanup_expired(&self) -> Result<u64, AuthError> {
        let deleted = self.sessions.delete_stale(Utc::now()).await?;
        if deleted > 0 {
            tracing::debug!(deleted, "Removed stale sessions");
        }
        Ok(deleted)
    }

    pub async fn list_sessions(
        &self,
        user_id: UserId,
        current_access_token: &str,
    ) -> Result<Vec<SessionResponse>, AuthError> {
        let current = hash_token(current_access_token);
        let sessions = self
            .sessions
            .list_valid_for_user(user_id, Utc::now())
            .await?;
        Ok(sessions
            .into_iter()
            .map(|session| SessionResponse::from_session(session, &current))
            .collect())
    }
}
