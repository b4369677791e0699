use async_trait::async_trait;
use serde_json::Value;

use super::{fallback_name, string_field, OAuthClient, OAuthProvider, ProviderProfile};
use crate::error::AuthError;
use crate::models::user::AuthProvider;

const AUTH_URL: &str = "https://github.com/login/oauth/authorize";
const TOKEN_URL: &str = "https://github.com/login/oauth/access_token";
const USER_URL: &str = "https://api.github.com/user";
const EMAILS_URL: &str = "https://api.github.com/user/emails";
const SCOPES: [&str; 2] = ["read:user", "user:email"];
const NOREPLY_DOMAIN: &str = "users.noreply.github.com";

pub struct GithubProvider {
    client: OAuthClient,
}

impl GithubProvider {
    pub fn new(client: OAuthClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl OAuthProvider for GithubProvider {
    fn kind(&self) -> AuthProvider {
        AuthProvider::Github
    }

    fn authorization_url(&self, state: &str) -> Result<String, AuthError> {
        self.client
            .build_auth_url(AUTH_URL, &SCOPES, state, &[("allow_signup", "true")])
    }

    async fn fetch_profile(&self, code: &str) -> Result<ProviderProfile, AuthError> {
        let token = self.client.exchange_code(TOKEN_URL, code).await?;
        let user = self.client.get_json(USER_URL, &token).await?;

        // Private emails only show up on the dedicated endpoint.
        let primary = if string_field(&user, "email").is_none() {
            match self.client.get_json(EMAILS_URL, &token).await {
                Ok(emails) => primary_verified_email(&emails),
                Err(err) => {
                    tracing::debug!(error = %err, "GitHub email lookup failed");
                    None
                }
            }
        } else {
            None
        };

        Ok(normalize(&user, primary))
    }
}

/// Maps `/user`, preferring its public email, then `primary_email`, then a
/// noreply placeholder derived from the login.
pub fn normalize(user: &Value, primary_email: Option<String>) -> ProviderProfile {
    let login = string_field(user, "login").unwrap_or_default();
    let email = string_field(user, "email")
        .or(primary_email)
        .unwrap_or_else(|| placeholder_email(&login));
    let name = string_field(user, "name")
        .or_else(|| (!login.is_empty()).then(|| login.clone()))
        .unwrap_or_else(|| fallback_name(&email));

    ProviderProfile {
        provider: AuthProvider::Github,
        provider_id: string_field(user, "id").unwrap_or_default(),
        email,
        name,
        avatar: string_field(user, "avatar_url"),
    }
}

fn placeholder_email(login: &str) -> String {
    if login.is_empty() {
        String::new()
    } else {
        format!("{login}@{NOREPLY_DOMAIN}")
    }
}

fn primary_verified_email(emails: &Value) -> Option<String> {
    emails.as_array()?.iter().find_map(|entry| {
        let primary = entry["primary"].as_bool().unwrap_or(false);
        let verified = entry["verified"].as_bool().unwrap_or(false);
        if primary && verified {
            string_field(entry, "email")
        } else {
            None
        }
    })
}
