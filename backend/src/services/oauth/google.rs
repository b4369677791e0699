use async_trait::async_trait;
use serde_json::Value;

use super::{fallback_name, string_field, OAuthClient, OAuthProvider, ProviderProfile};
use crate::error::AuthError;
use crate::models::user::AuthProvider;

const AUTH_URL: &str = "https://accounts.google.com/o/oauth2/v2/auth";
const TOKEN_URL: &str = "https://oauth2.googleapis.com/token";
const USER_INFO_URL: &str = "https://www.googleapis.com/oauth2/v2/userinfo";
const SCOPES: [&str; 3] = ["openid", "email", "profile"];

pub struct GoogleProvider {
    client: OAuthClient,
}

impl GoogleProvider {
    pub fn new(client: OAuthClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl OAuthProvider for GoogleProvider {
    fn kind(&self) -> AuthProvider {
        AuthProvider::Google
    }

    fn authorization_url(&self, state: &str) -> Result<String, AuthError> {
        self.client.build_auth_url(
            AUTH_URL,
            &SCOPES,
            state,
            &[("access_type", "online"), ("prompt", "select_account")],
        )
    }

    async fn fetch_profile(&self, code: &str) -> Result<ProviderProfile, AuthError> {
        let token = self.client.exchange_code(TOKEN_URL, code).await?;
        let info = self.client.get_json(USER_INFO_URL, &token).await?;
        Ok(normalize(&info))
    }
}

/// Maps the v2 userinfo payload (`id`, `email`, `name`, `picture`).
pub fn normalize(info: &Value) -> ProviderProfile {
    let email = string_field(info, "email").unwrap_or_default();
    let name = string_field(info, "name").unwrap_or_else(|| fallback_name(&email));
    ProviderProfile {
        provider: AuthProvider::Google,
        provider_id: string_field(info, "id")
            .or_else(|| string_field(info, "sub"))
            .unwrap_or_default(),
        email,
        name,
        avatar: string_field(info, "picture"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn normalizes_userinfo_payload() {
        let profile = normalize(&json!({
            "id": "1078",
            "email": "Ada@Example.com",
            "verified_email": true,
            "name": "Ada Lovelace",
            "picture": "https://lh3.googleusercontent.com/a/photo"
        }));
        assert_eq!(profile.provider, AuthProvider::Google);
        assert_eq!(profile.provider_id, "1078");
        assert_eq!(profile.email, "Ada@Example.com");
        assert_eq!(profile.name, "Ada Lovelace");
        assert_eq!(
            profile.avatar.as_deref(),
            Some("https://lh3.googleusercontent.com/a/photo")
        );
    }

    #[test]
    fn missing_name_falls_back_to_email_local_part() {
        let profile = normalize(&json!({ "sub": "g-9", "email": "grace@navy.mil" }));
        assert_eq!(profile.provider_id, "g-9");
        assert_eq!(profile.name, "grace");
        assert!(profile.avatar.is_none());
    }
}
