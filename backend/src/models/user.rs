//! Models that represent users, their linked OAuth providers, and the
//! profile payload returned to clients.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::fmt;
use std::str::FromStr;
use utoipa::ToSchema;
use validator::Validate;

use crate::types::UserId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type, ToSchema)]
#[sqlx(type_name = "TEXT", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
/// External OAuth identity sources a user can sign in with.
pub enum AuthProvider {
    Google,
    Github,
    Linkedin,
}

impl AuthProvider {
    pub const ALL: [AuthProvider; 3] = [
        AuthProvider::Google,
        AuthProvider::Github,
        AuthProvider::Linkedin,
    ];

    /// Returns the lowercase name used in URLs, cookies and storage.
    pub fn as_str(&self) -> &'static str {
        match self {
            AuthProvider::Google => "google",
            AuthProvider::Github => "github",
            AuthProvider::Linkedin => "linkedin",
        }
    }

    /// Name of the user column holding this provider's account id.
    pub fn id_column(&self) -> &'static str {
        match self {
            AuthProvider::Google => "google_id",
            AuthProvider::Github => "github_id",
            AuthProvider::Linkedin => "linkedin_id",
        }
    }
}

impl fmt::Display for AuthProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unsupported provider: {0}")]
pub struct UnknownProvider(pub String);

impl FromStr for AuthProvider {
    type Err = UnknownProvider;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "google" => Ok(AuthProvider::Google),
            "github" => Ok(AuthProvider::Github),
            "linkedin" => Ok(AuthProvider::Linkedin),
            _ => Err(UnknownProvider(s.to_string())),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
/// Database representation of a platform user.
pub struct User {
    pub id: UserId,
    /// Always stored trimmed and lowercased.
    pub email: String,
    pub name: String,
    pub avatar: Option<String>,
    pub google_id: Option<String>,
    pub github_id: Option<String>,
    pub linkedin_id: Option<String>,
    pub skills: Vec<String>,
    pub company: Option<String>,
    pub experience: Option<String>,
    pub is_active: bool,
    pub last_login: Option<DateTime<Utc>>,
    /// Number of successful logins over the account's lifetime.
    pub login_count: i64,
    /// Best-effort cache of currently valid sessions. The session rows are
    /// the source of truth; this value may drift and is never negative.
    pub active_session_count: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl User {
    /// Returns the account id linked for `provider`, if any.
    pub fn provider_id(&self, provider: AuthProvider) -> Option<&str> {
        match provider {
            AuthProvider::Google => self.google_id.as_deref(),
            AuthProvider::Github => self.github_id.as_deref(),
            AuthProvider::Linkedin => self.linkedin_id.as_deref(),
        }
    }

    pub fn set_provider_id(&mut self, provider: AuthProvider, provider_id: impl Into<String>) {
        let slot = match provider {
            AuthProvider::Google => &mut self.google_id,
            AuthProvider::Github => &mut self.github_id,
            AuthProvider::Linkedin => &mut self.linkedin_id,
        };
        *slot = Some(provider_id.into());
    }

    /// Providers this account can currently sign in with.
    pub fn connected_providers(&self) -> Vec<AuthProvider> {
        AuthProvider::ALL
            .into_iter()
            .filter(|provider| self.provider_id(*provider).is_some())
            .collect()
    }
}

#[derive(Debug, Clone, Validate)]
/// Payload for inserting a user discovered through an OAuth login.
pub struct NewUser {
    #[validate(email, length(max = 254))]
    pub email: String,
    #[validate(length(min = 1, max = 100))]
    pub name: String,
    #[validate(url)]
    pub avatar: Option<String>,
    pub provider: AuthProvider,
    #[validate(length(min = 1, max = 255))]
    pub provider_id: String,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
/// Public view of a user. Provider account ids are never exposed.
pub struct UserResponse {
    #[schema(value_type = String)]
    pub id: UserId,
    pub email: String,
    pub name: String,
    pub avatar: Option<String>,
    pub skills: Vec<String>,
    pub company: Option<String>,
    pub experience: Option<String>,
    pub connected_providers: Vec<AuthProvider>,
    pub last_login: Option<DateTime<Utc>>,
    pub active_sessions: i32,
    pub created_at: DateTime<Utc>,
}

impl From<User> for UserResponse {
    fn from(user: User) -> Self {
        let connected_providers = user.connected_providers();
        Self {
            id: user.id,
            email: user.email,
            name: user.name,
            avatar: user.avatar,
            skills: user.skills,
            company: user.company,
            experience: user.experience,
            connected_providers,
            last_login: user.last_login,
            active_sessions: user.active_session_count,
            created_at: user.created_at,
        }
    }
}

#[cfg(test)]
pub(crate) fn sample_user() -> User {
    let now = Utc::now();
    User {
        id: UserId::new(),
        email: "a@x.com".into(),
        name: "Ada".into(),
        avatar: None,
        google_id: Some("g1".into()),
        github_id: None,
        linkedin_id: None,
        skills: vec!["rust".into()],
        company: Some("Acme".into()),
        experience: None,
        is_active: true,
        last_login: None,
        login_count: 0,
        active_session_count: 0,
        created_at: now,
        updated_at: now,
    }
}
