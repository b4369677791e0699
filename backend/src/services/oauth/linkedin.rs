use async_trait::async_trait;
use serde_json::Value;

use super::{fallback_name, string_field, OAuthClient, OAuthProvider, ProviderProfile};
use crate::error::AuthError;
use crate::models::user::AuthProvider;

const AUTH_URL: &str = "https://www.linkedin.com/oauth/v2/authorization";
const TOKEN_URL: &str = "https://www.linkedin.com/oauth/v2/accessToken";
const PROFILE_URL: &str = "https://api.linkedin.com/v2/me?projection=(id,localizedFirstName,localizedLastName,profilePicture(displayImage~:playableStreams))";
const EMAIL_URL: &str =
    "https://api.linkedin.com/v2/emailAddress?q=members&projection=(elements*(handle~))";
const SCOPES: [&str; 2] = ["r_liteprofile", "r_emailaddress"];

pub struct LinkedinProvider {
    client: OAuthClient,
}

impl LinkedinProvider {
    pub fn new(client: OAuthClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl OAuthProvider for LinkedinProvider {
    fn kind(&self) -> AuthProvider {
        AuthProvider::Linkedin
    }

    fn authorization_url(&self, state: &str) -> Result<String, AuthError> {
        self.client.build_auth_url(AUTH_URL, &SCOPES, state, &[])
    }

    async fn fetch_profile(&self, code: &str) -> Result<ProviderProfile, AuthError> {
        let token = self.client.exchange_code(TOKEN_URL, code).await?;
        let profile = self.client.get_json(PROFILE_URL, &token).await?;
        let email = self.client.get_json(EMAIL_URL, &token).await?;
        normalize(&profile, &email)
    }
}

/// Combines the lite profile with the separate email-address lookup.
pub fn normalize(profile: &Value, email_response: &Value) -> Result<ProviderProfile, AuthError> {
    let email = email_response["elements"]
        .as_array()
        .and_then(|elements| elements.first())
        .and_then(|element| string_field(&element["handle~"], "emailAddress"))
        .ok_or(AuthError::EmailUnavailable)?;

    let full_name = [
        string_field(profile, "localizedFirstName"),
        string_field(profile, "localizedLastName"),
    ]
    .into_iter()
    .flatten()
    .collect::<Vec<_>>()
    .join(" ");
    let name = if full_name.is_empty() {
        fallback_name(&email)
    } else {
        full_name
    };

    Ok(ProviderProfile {
        provider: AuthProvider::Linkedin,
        provider_id: string_field(profile, "id").unwrap_or_default(),
        email,
        name,
        avatar: picture_url(profile),
    })
}

/// Largest rendition is listed last.
fn picture_url(profile: &Value) -> Option<String> {
    profile["profilePicture"]["displayImage~"]["elements"]
        .as_array()?
        .last()?["identifiers"]
        .as_array()?
        .first()
        .and_then(|identifier| string_field(identifier, "identifier"))
}
