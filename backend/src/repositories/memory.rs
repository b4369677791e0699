//! In-process user and session stores guarded by Tokio mutexes.
//!
//! Suitable for tests and single-node development only; nothing is persisted.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;

use super::{RepositoryError, SessionRepository, UserRepository};
use crate::models::session::{NewSession, Session};
use crate::models::user::{AuthProvider, NewUser, User};
use crate::types::{SessionId, UserId};

#[derive(Debug, Clone, Default)]
pub struct InMemoryUserRepository {
    users: Arc<Mutex<HashMap<UserId, User>>>,
}

impl InMemoryUserRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn set_active(&self, id: UserId, is_active: bool) -> Result<(), RepositoryError> {
        let mut users = self.users.lock().await;
        let user = users.get_mut(&id).ok_or(RepositoryError::NotFound)?;
        user.is_active = is_active;
        Ok(())
    }
}

fn provider_taken(
    users: &HashMap<UserId, User>,
    provider: AuthProvider,
    provider_id: &str,
    except: Option<UserId>,
) -> bool {
    users
        .values()
        .any(|u| Some(u.id) != except && u.provider_id(provider) == Some(provider_id))
}

#[async_trait]
impl UserRepository for InMemoryUserRepository {
    async fn find_by_id(&self, id: UserId) -> Result<Option<User>, RepositoryError> {
        Ok(self.users.lock().await.get(&id).cloned())
    }

    async fn find_by_provider_or_email(
        &self,
        provider: AuthProvider,
        provider_id: &str,
        email: &str,
    ) -> Result<Option<User>, RepositoryError> {
        let users = self.users.lock().await;
        let by_provider = users
            .values()
            .find(|u| u.provider_id(provider) == Some(provider_id));
        let found = by_provider.or_else(|| users.values().find(|u| u.email == email));
        Ok(found.cloned())
    }

    async fn create(&self, new_user: &NewUser) -> Result<User, RepositoryError> {
        let mut users = self.users.lock().await;
        if users.values().any(|u| u.email == new_user.email) {
            return Err(RepositoryError::Duplicate("email"));
        }
        if provider_taken(&users, new_user.provider, &new_user.provider_id, None) {
            return Err(RepositoryError::Duplicate(new_user.provider.id_column()));
        }
        let now = Utc::now();
        let mut user = User {
            id: UserId::new(),
            email: new_user.email.clone(),
            name: new_user.name.clone(),
            avatar: new_user.avatar.clone(),
            google_id: None,
            github_id: None,
            linkedin_id: None,
            skills: Vec::new(),
            company: None,
            experience: None,
            is_active: true,
            last_login: None,
            login_count: 0,
            active_session_count: 0,
            created_at: now,
            updated_at: now,
        };
        user.set_provider_id(new_user.provider, new_user.provider_id.clone());
        users.insert(user.id, user.clone());
        Ok(user)
    }

    async fn link_provider(
        &self,
        id: UserId,
        provider: AuthProvider,
        provider_id: &str,
    ) -> Result<User, RepositoryError> {
        let mut users = self.users.lock().await;
        if provider_taken(&users, provider, provider_id, Some(id)) {
            return Err(RepositoryError::Duplicate(provider.id_column()));
        }
        let user = users.get_mut(&id).ok_or(RepositoryError::NotFound)?;
        user.set_provider_id(provider, provider_id);
        user.updated_at = Utc::now();
        Ok(user.clone())
    }

    async fn record_login(&self, id: UserId, at: DateTime<Utc>) -> Result<(), RepositoryError> {
        let mut users = self.users.lock().await;
        if let Some(user) = users.get_mut(&id) {
            user.last_login = Some(at);
            user.login_count += 1;
            user.updated_at = at;
        }
        Ok(())
    }

    async fn adjust_session_count(&self, id: UserId, delta: i32) -> Result<(), RepositoryError> {
        let mut users = self.users.lock().await;
        if let Some(user) = users.get_mut(&id) {
            user.active_session_count = (user.active_session_count + delta).max(0);
        }
        Ok(())
    }

    async fn set_session_count(&self, id: UserId, count: i32) -> Result<(), RepositoryError> {
        let mut users = self.users.lock().await;
        if let Some(user) = users.get_mut(&id) {
            user.active_session_count = count.max(0);
        }
        Ok(())
    }

    async fn count(&self) -> Result<i64, RepositoryError> {
        Ok(self.users.lock().await.len() as i64)
    }
}

#[derive(Debug, Clone, Default)]
pub struct InMemorySessionRepository {
    sessions: Arc<Mutex<HashMap<SessionId, Session>>>,
}

impl InMemorySessionRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every stored session regardless of state, oldest first.
    pub async fn all(&self) -> Vec<Session> {
        let mut sessions: Vec<Session> = self.sessions.lock().await.values().cloned().collect();
        sessions.sort_by_key(|s| s.created_at);
        sessions
    }

    pub async fn get(&self, id: SessionId) -> Option<Session> {
        self.sessions.lock().await.get(&id).cloned()
    }

    /// Overwrites a stored session, e.g. to backdate timestamps in tests.
    pub async fn replace(&self, session: Session) {
        self.sessions.lock().await.insert(session.id, session);
    }
}

#[async_trait]
impl SessionRepository for InMemorySessionRepository {
    async fn insert(&self, new_session: &NewSession) -> Result<Session, RepositoryError> {
        let mut sessions = self.sessions.lock().await;
        if sessions
            .values()
            .any(|s| s.refresh_token_hash == new_session.refresh_token_hash)
        {
            return Err(RepositoryError::Duplicate("refresh_token"));
        }
        let now = Utc::now();
        let session = Session {
            id: SessionId::new(),
            user_id: new_session.user_id,
            refresh_token_hash: new_session.refresh_token_hash.clone(),
            access_token_hash: new_session.access_token_hash.clone(),
            provider: new_session.provider,
            user_agent: new_session.device.user_agent.clone(),
            ip_address: new_session.device.ip_address.clone(),
            is_active: true,
            last_used: now,
            expires_at: new_session.expires_at,
            created_at: now,
            logged_out_at: None,
        };
        sessions.insert(session.id, session.clone());
        Ok(session)
    }

    async fn find_valid_by_access_token_hash(
        &self,
        user_id: UserId,
        access_token_hash: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<Session>, RepositoryError> {
        let sessions = self.sessions.lock().await;
        Ok(sessions
            .values()
            .find(|s| {
                s.user_id == user_id
                    && s.access_token_hash == access_token_hash
                    && s.is_valid_at(now)
            })
            .cloned())
    }

    async fn touch(&self, id: SessionId, at: DateTime<Utc>) -> Result<bool, RepositoryError> {
        let mut sessions = self.sessions.lock().await;
        Ok(sessions
            .get_mut(&id)
            .map(|session| session.last_used = at)
            .is_some())
    }

    async fn list_valid_for_user(
        &self,
        user_id: UserId,
        now: DateTime<Utc>,
    ) -> Result<Vec<Session>, RepositoryError> {
        let sessions = self.sessions.lock().await;
        let mut valid: Vec<Session> = sessions
            .values()
            .filter(|s| s.user_id == user_id && s.is_valid_at(now))
            .cloned()
            .collect();
        valid.sort_by(|a, b| {
            b.last_used
                .cmp(&a.last_used)
                .then(b.created_at.cmp(&a.created_at))
                .then(b.id.cmp(&a.id))
        });
        Ok(valid)
    }

    async fn count_valid_for_user(
        &self,
        user_id: UserId,
        now: DateTime<Utc>,
    ) -> Result<i64, RepositoryError> {
        let sessions = self.sessions.lock().await;
        Ok(sessions
            .values()
            .filter(|s| s.user_id == user_id && s.is_valid_at(now))
            .count() as i64)
    }

    async fn deactivate(
        &self,
        ids: &[SessionId],
        at: DateTime<Utc>,
    ) -> Result<u64, RepositoryError> {
        let mut sessions = self.sessions.lock().await;
        let mut changed = 0;
        for id in ids {
            if let Some(session) = sessions.get_mut(id).filter(|s| s.is_active) {
                session.is_active = false;
                session.logged_out_at = Some(at);
                changed += 1;
            }
        }
        Ok(changed)
    }

    async fn deactivate_all_except(
        &self,
        user_id: UserId,
        keep_access_token_hash: &str,
        at: DateTime<Utc>,
    ) -> Result<u64, RepositoryError> {
        let mut sessions = self.sessions.lock().await;
        let mut changed = 0;
        for session in sessions.values_mut().filter(|s| {
            s.user_id == user_id && s.is_active && s.access_token_hash != keep_access_token_hash
        }) {
            session.is_active = false;
            session.logged_out_at = Some(at);
            changed += 1;
        }
        Ok(changed)
    }

    async fn delete_by_refresh_token_hash(
        &self,
        refresh_token_hash: &str,
    ) -> Result<Option<Session>, RepositoryError> {
        let mut sessions = self.sessions.lock().await;
        let id = sessions
            .values()
            .find(|s| s.refresh_token_hash == refresh_token_hash)
            .map(|s| s.id);
        Ok(id.and_then(|id| sessions.remove(&id)))
    }

    async fn delete_all_for_user(&self, user_id: UserId) -> Result<u64, RepositoryError> {
        let mut sessions = self.sessions.lock().await;
        let before = sessions.len();
        sessions.retain(|_, s| s.user_id != user_id);
        Ok((before - sessions.len()) as u64)
    }

    async fn delete_stale_for_user(
        &self,
        user_id: UserId,
        now: DateTime<Utc>,
    ) -> Result<u64, RepositoryError> {
        let mut sessions = self.sessions.lock().await;
        let before = sessions.len();
        sessions.retain(|_, s| !(s.user_id == user_id && s.is_stale_at(now)));
        Ok((before - sessions.len()) as u64)
    }

    async fn delete_stale(&self, now: DateTime<Utc>) -> Result<u64, RepositoryError> {
        let mut sessions = self.sessions.lock().await;
        let before = sessions.len();
        sessions.retain(|_, s| !s.is_stale_at(now));
        Ok((before - sessions.len()) as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::session::DeviceInfo;
    use chrono::Duration;

    fn new_user(provider: AuthProvider, provider_id: &str, email: &str) -> NewUser {
        NewUser {
            email: email.into(),
            name: "Ada".into(),
            avatar: None,
            provider,
            provider_id: provider_id.into(),
        }
    }

    fn new_session(user_id: UserId, refresh: &str, expires_in: Duration) -> NewSession {
        NewSession {
            user_id,
            refresh_token_hash: refresh.into(),
            access_token_hash: format!("access-{refresh}"),
            provider: AuthProvider::Google,
            device: DeviceInfo::default(),
            expires_at: Utc::now() + expires_in,
        }
    }

    #[tokio::test]
    async fn create_rejects_duplicate_email() {
        let repo = InMemoryUserRepository::new();
        repo.create(&new_user(AuthProvider::Google, "g1", "a@x.com"))
            .await
            .expect("first create");
        let err = repo
            .create(&new_user(AuthProvider::Github, "gh1", "a@x.com"))
            .await
            .expect_err("duplicate email");
        assert!(matches!(err, RepositoryError::Duplicate("email")));
    }

    #[tokio::test]
    async fn provider_match_wins_over_email_match() {
        let repo = InMemoryUserRepository::new();
        let by_email = repo
            .create(&new_user(AuthProvider::Google, "g-other", "b@x.com"))
            .await
            .expect("create email user");
        let by_provider = repo
            .create(&new_user(AuthProvider::Github, "gh1", "c@x.com"))
            .await
            .expect("create provider user");

        let found = repo
            .find_by_provider_or_email(AuthProvider::Github, "gh1", "b@x.com")
            .await
            .expect("lookup")
            .expect("match");
        assert_eq!(found.id, by_provider.id);
        assert_ne!(found.id, by_email.id);
    }

    #[tokio::test]
    async fn session_counter_never_goes_negative() {
        let repo = InMemoryUserRepository::new();
        let user = repo
            .create(&new_user(AuthProvider::Google, "g1", "a@x.com"))
            .await
            .expect("create");
        repo.adjust_session_count(user.id, -3).await.expect("adjust");
        let user = repo.find_by_id(user.id).await.expect("find").expect("user");
        assert_eq!(user.active_session_count, 0);
    }

    #[tokio::test]
    async fn refresh_hash_must_be_unique() {
        let repo = InMemorySessionRepository::new();
        let user_id = UserId::new();
        repo.insert(&new_session(user_id, "r1", Duration::days(1)))
            .await
            .expect("insert");
        let err = repo
            .insert(&new_session(user_id, "r1", Duration::days(1)))
            .await
            .expect_err("duplicate refresh token");
        assert!(matches!(err, RepositoryError::Duplicate("refresh_token")));
    }

    #[tokio::test]
    async fn delete_stale_removes_expired_and_inactive_only() {
        let repo = InMemorySessionRepository::new();
        let user_id = UserId::new();
        let expired = repo
            .insert(&new_session(user_id, "r-expired", Duration::hours(-1)))
            .await
            .expect("insert expired");
        let inactive = repo
            .insert(&new_session(user_id, "r-inactive", Duration::days(1)))
            .await
            .expect("insert inactive");
        let live = repo
            .insert(&new_session(user_id, "r-live", Duration::days(1)))
            .await
            .expect("insert live");
        repo.deactivate(&[inactive.id], Utc::now())
            .await
            .expect("deactivate");

        let deleted = repo.delete_stale(Utc::now()).await.expect("delete stale");
        assert_eq!(deleted, 2);
        assert!(repo.get(expired.id).await.is_none());
        assert!(repo.get(inactive.id).await.is_none());
        assert!(repo.get(live.id).await.is_some());
    }
}
