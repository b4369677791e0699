//! Find-or-create of unified user records from provider identities.

use std::sync::Arc;

use chrono::Utc;
use validator::Validate;

use crate::error::AuthError;
use crate::models::user::{NewUser, User};
use crate::repositories::UserRepository;
use crate::services::oauth::ProviderProfile;

#[derive(Clone)]
pub struct IdentityResolver {
    users: Arc<dyn UserRepository>,
}

impl IdentityResolver {
    pub fn new(users: Arc<dyn UserRepository>) -> Self {
        Self { users }
    }

    /// Resolves `profile` to a user, creating one or linking the provider id
    /// onto an email match.
    pub async fn resolve(&self, profile: &ProviderProfile) -> Result<User, AuthError> {
        let provider_id = profile.provider_id.trim();
        if provider_id.is_empty() {
            return Err(AuthError::InvalidInput("provider id is required".into()));
        }
        let email = profile.email.trim().to_lowercase();
        if email.is_empty() {
            return Err(AuthError::InvalidInput("email is required".into()));
        }

        let existing = self
            .users
            .find_by_provider_or_email(profile.provider, provider_id, &email)
            .await?;

        match existing {
            Some(user) if user.provider_id(profile.provider) == Some(provider_id) => Ok(user),
            Some(user) if user.provider_id(profile.provider).is_some() => {
                tracing::warn!(
                    user_id = %user.id,
                    provider = %profile.provider,
                    "Email already linked to a different provider account"
                );
                Err(AuthError::DuplicateIdentity(
                    profile.provider.id_column().to_string(),
                ))
            }
            Some(user) => {
                tracing::info!(
                    user_id = %user.id,
                    provider = %profile.provider,
                    "Linking provider to existing account"
                );
                Ok(self
                    .users
                    .link_provider(user.id, profile.provider, provider_id)
                    .await?)
            }
            None => {
                let new_user = NewUser {
                    email,
                    name: profile.name.trim().to_string(),
                    avatar: profile.avatar.clone().filter(|url| !url.trim().is_empty()),
                    provider: profile.provider,
                    provider_id: provider_id.to_string(),
                };
                new_user.validate()?;
                let user = self.users.create(&new_user).await?;
                tracing::info!(user_id = %user.id, provider = %profile.provider, "Created user");
                Ok(user)
            }
        }
    }

    /// Stamps `last_login` and bumps the login count, returning the fresh row.
    pub async fn record_login(&self, user: &User) -> Result<User, AuthError> {
        self.users.record_login(user.id, Utc::now()).await?;
        self.users
            .find_by_id(user.id)
            .await?
            .ok_or(AuthError::UnknownSubject)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::user::AuthProvider;
    use crate::repositories::InMemoryUserRepository;

    fn profile(provider: AuthProvider, id: &str, email: &str) -> ProviderProfile {
        ProviderProfile {
            provider,
            provider_id: id.into(),
            email: email.into(),
            name: "Ada".into(),
            avatar: None,
        }
    }

    fn resolver() -> (IdentityResolver, Arc<InMemoryUserRepository>) {
        let repo = Arc::new(InMemoryUserRepository::new());
        (IdentityResolver::new(repo.clone()), repo)
    }

    #[tokio::test]
    async fn new_identity_creates_exactly_one_user() {
        let (resolver, repo) = resolver();
        let user = resolver
            .resolve(&profile(AuthProvider::Google, "g1", "  A@X.com "))
            .await
            .expect("resolve");
        assert_eq!(user.google_id.as_deref(), Some("g1"));
        assert_eq!(user.email, "a@x.com");
        assert_eq!(repo.count().await.expect("count"), 1);

        let again = resolver
            .resolve(&profile(AuthProvider::Google, "g1", "a@x.com"))
            .await
            .expect("resolve again");
        assert_eq!(again.id, user.id);
        assert_eq!(repo.count().await.expect("count"), 1);
    }

    #[tokio::test]
    async fn email_match_under_other_provider_backfills() {
        let (resolver, repo) = resolver();
        let google = resolver
            .resolve(&profile(AuthProvider::Google, "g1", "a@x.com"))
            .await
            .expect("google");
        let github = resolver
            .resolve(&profile(AuthProvider::Github, "gh1", "A@x.com"))
            .await
            .expect("github");
        assert_eq!(github.id, google.id);
        assert_eq!(github.google_id.as_deref(), Some("g1"));
        assert_eq!(github.github_id.as_deref(), Some("gh1"));
        assert_eq!(repo.count().await.expect("count"), 1);
    }

    #[tokio::test]
    async fn email_match_never_replaces_an_existing_provider_link() {
        let (resolver, repo) = resolver();
        let first = resolver
            .resolve(&profile(AuthProvider::Github, "gh-old", "a@x.com"))
            .await
            .expect("first github account");

        let err = resolver
            .resolve(&profile(AuthProvider::Github, "gh-new", "a@x.com"))
            .await
            .expect_err("second github account");
        assert!(matches!(err, AuthError::DuplicateIdentity(_)));
        assert_eq!(err.redirect_code(), "email_exists");

        let stored = repo
            .find_by_id(first.id)
            .await
            .expect("find")
            .expect("user");
        assert_eq!(stored.github_id.as_deref(), Some("gh-old"));
        assert_eq!(repo.count().await.expect("count"), 1);
    }

    #[tokio::test]
    async fn missing_fields_are_invalid_input() {
        let (resolver, _) = resolver();
        let err = resolver
            .resolve(&profile(AuthProvider::Github, "", "a@x.com"))
            .await
            .expect_err("no id");
        assert!(matches!(err, AuthError::InvalidInput(_)));

        let err = resolver
            .resolve(&profile(AuthProvider::Github, "gh1", "   "))
            .await
            .expect_err("no email");
        assert!(matches!(err, AuthError::InvalidInput(_)));
    }

    #[tokio::test]
    async fn schema_violation_is_validation_failure() {
        let (resolver, repo) = resolver();
        let err = resolver
            .resolve(&profile(AuthProvider::Google, "g1", "not-an-email"))
            .await
            .expect_err("bad email");
        assert!(matches!(err, AuthError::ValidationFailure(_)));
        assert_eq!(repo.count().await.expect("count"), 0);
    }

    #[tokio::test]
    async fn record_login_bumps_metadata() {
        let (resolver, _) = resolver();
        let user = resolver
            .resolve(&profile(AuthProvider::Linkedin, "li1", "a@x.com"))
            .await
            .expect("resolve");
        let user = resolver.record_login(&user).await.expect("record");
        assert_eq!(user.login_count, 1);
        assert!(user.last_login.is_some());
    }
}
