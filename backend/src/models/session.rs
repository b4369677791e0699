//! Models for tracking login sessions, one per authenticated device.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;

use crate::models::user::AuthProvider;
use crate::types::{SessionId, UserId};

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
/// Database representation of a login session.
pub struct Session {
    pub id: SessionId,
    pub user_id: UserId,
    /// SHA-256 digest of the refresh token. Unique across all sessions.
    pub refresh_token_hash: String,
    /// SHA-256 digest of the access token issued alongside the refresh token.
    pub access_token_hash: String,
    pub provider: AuthProvider,
    pub user_agent: Option<String>,
    pub ip_address: Option<String>,
    pub is_active: bool,
    pub last_used: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub logged_out_at: Option<DateTime<Utc>>,
}

impl Session {
    /// Active flag set and expiry still in the future.
    pub fn is_valid_at(&self, now: DateTime<Utc>) -> bool {
        self.is_active && self.expires_at > now
    }

    /// Eligible for hard deletion by cleanup.
    pub fn is_stale_at(&self, now: DateTime<Utc>) -> bool {
        !self.is_active || self.expires_at < now
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
/// Informational fingerprint of the client that created a session.
pub struct DeviceInfo {
    pub user_agent: Option<String>,
    pub ip_address: Option<String>,
}

#[derive(Debug, Clone)]
/// Payload for inserting a session.
pub struct NewSession {
    pub user_id: UserId,
    pub refresh_token_hash: String,
    pub access_token_hash: String,
    pub provider: AuthProvider,
    pub device: DeviceInfo,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct SessionResponse {
    #[schema(value_type = String)]
    pub id: SessionId,
    pub provider: AuthProvider,
    pub user_agent: Option<String>,
    pub ip_address: Option<String>,
    pub created_at: DateTime<Utc>,
    pub last_used: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub is_current: bool,
}

impl SessionResponse {
    pub fn from_session(session: Session, current_access_hash: &str) -> Self {
        let is_current = session.access_token_hash == current_access_hash;
        Self {
            id: session.id,
            provider: session.provider,
            user_agent: session.user_agent,
            ip_address: session.ip_address,
            created_at: session.created_at,
            last_used: session.last_used,
            expires_at: session.expires_at,
            is_current,
        }
    }
}
