use std::sync::Arc;

use crate::error::AuthError;
use crate::models::session::{DeviceInfo, Session};
use crate::models::user::User;
use crate::services::identity::IdentityResolver;
use crate::services::oauth::OAuthProvider;
use crate::services::session::SessionManager;
use crate::utils::jwt::{TokenIssuer, TokenPair};

#[derive(Debug)]
pub struct LoginOutcome {
    pub user: User,
    pub tokens: TokenPair,
    pub session: Session,
}

/// Drives an OAuth callback from authorization code to persisted session.
#[derive(Clone)]
pub struct LoginService {
    resolver: IdentityResolver,
    sessions: Arc<SessionManager>,
    issuer: Arc<TokenIssuer>,
}

impl LoginService {
    pub fn new(
        resolver: IdentityResolver,
        sessions: Arc<SessionManager>,
        issuer: Arc<TokenIssuer>,
    ) -> Self {
        Self {
            resolver,
            sessions,
            issuer,
        }
    }

    pub async fn complete_login(
        &self,
        provider: &dyn OAuthProvider,
        code: &str,
        device: DeviceInfo,
    ) -> Result<LoginOutcome, AuthError> {
        if code.trim().is_empty() {
            return Err(AuthError::MissingAuthorizationCode);
        }

        let profile = provider.fetch_profile(code).await?;
        let user = self.resolver.resolve(&profile).await?;
        if !user.is_active {
            return Err(AuthError::AccountDeactivated);
        }
        let user = self.resolver.record_login(&user).await?;

        let tokens = self.issuer.issue_pair(user.id)?;
        let session = self
            .sessions
            .create_session(user.id, &tokens, profile.provider, device)
            .await?;

        Ok(LoginOutcome {
            user,
            tokens,
            session,
        })
    }
}
