//! OAuth 2.0 authorization-code adapters for the supported identity providers.
//!
//! Each provider normalizes its own profile payload into a [`ProviderProfile`];
//! the HTTP plumbing shared by all of them lives in [`OAuthClient`].

pub mod github;
pub mod google;
pub mod linkedin;

pub use github::GithubProvider;
pub use google::GoogleProvider;
pub use linkedin::LinkedinProvider;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::ACCEPT;
use reqwest::Client;
use serde::Deserialize;
use serde_json::Value;
use url::Url;

use crate::config::{Config, ProviderCredentials};
use crate::error::AuthError;
use crate::models::user::AuthProvider;

const HTTP_TIMEOUT: Duration = Duration::from_secs(10);
const USER_AGENT: &str = concat!("interview-reader-backend/", env!("CARGO_PKG_VERSION"));

/// Identity reported by a provider after a successful code exchange.
///
/// `provider_id` and `email` are left empty when the provider omits them;
/// the identity resolver rejects such profiles.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderProfile {
    pub provider: AuthProvider,
    pub provider_id: String,
    pub email: String,
    pub name: String,
    pub avatar: Option<String>,
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait OAuthProvider: Send + Sync {
    fn kind(&self) -> AuthProvider;

    /// Provider consent page URL carrying `state`.
    fn authorization_url(&self, state: &str) -> Result<String, AuthError>;

    /// Exchanges an authorization code and fetches the caller's profile.
    async fn fetch_profile(&self, code: &str) -> Result<ProviderProfile, AuthError>;
}

/// Closed set of configured providers keyed by kind.
#[derive(Clone, Default)]
pub struct ProviderRegistry {
    providers: HashMap<AuthProvider, Arc<dyn OAuthProvider>>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_config(config: &Config, http: Client) -> Self {
        let client = |kind: AuthProvider| {
            OAuthClient::new(http.clone(), config.provider_credentials(kind).clone())
        };
        Self::new()
            .with(Arc::new(GoogleProvider::new(client(AuthProvider::Google))))
            .with(Arc::new(GithubProvider::new(client(AuthProvider::Github))))
            .with(Arc::new(LinkedinProvider::new(client(AuthProvider::Linkedin))))
    }

    /// Registers `provider`, replacing any adapter of the same kind.
    pub fn with(mut self, provider: Arc<dyn OAuthProvider>) -> Self {
        self.providers.insert(provider.kind(), provider);
        self
    }

    pub fn get(&self, kind: AuthProvider) -> Option<Arc<dyn OAuthProvider>> {
        self.providers.get(&kind).cloned()
    }
}

impl std::fmt::Debug for ProviderRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut kinds: Vec<&str> = self.providers.keys().map(AuthProvider::as_str).collect();
        kinds.sort_unstable();
        f.debug_struct("ProviderRegistry")
            .field("providers", &kinds)
            .finish()
    }
}

/// Builds the outbound HTTP client shared by every provider adapter.
pub fn build_http_client() -> reqwest::Result<Client> {
    Client::builder()
        .timeout(HTTP_TIMEOUT)
        .user_agent(USER_AGENT)
        .build()
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: Option<String>,
    error: Option<String>,
    error_description: Option<String>,
}

/// Authorization-code plumbing for one provider's client credentials.
pub struct OAuthClient {
    http: Client,
    credentials: ProviderCredentials,
}

impl OAuthClient {
    pub fn new(http: Client, credentials: ProviderCredentials) -> Self {
        Self { http, credentials }
    }

    pub fn build_auth_url(
        &self,
        endpoint: &str,
        scopes: &[&str],
        state: &str,
        extra: &[(&str, &str)],
    ) -> Result<String, AuthError> {
        let mut url = Url::parse(endpoint)
            .map_err(|e| AuthError::InvalidInput(format!("invalid authorization endpoint: {e}")))?;
        {
            let mut query = url.query_pairs_mut();
            query
                .append_pair("client_id", &self.credentials.client_id)
                .append_pair("redirect_uri", &self.credentials.redirect_uri)
                .append_pair("response_type", "code")
                .append_pair("scope", &scopes.join(" "))
                .append_pair("state", state);
            for (key, value) in extra {
                query.append_pair(key, value);
            }
        }
        Ok(url.to_string())
    }

    /// Trades an authorization code for the provider's access token.
    pub async fn exchange_code(&self, token_url: &str, code: &str) -> Result<String, AuthError> {
        let params = [
            ("grant_type", "authorization_code"),
            ("code", code),
            ("redirect_uri", self.credentials.redirect_uri.as_str()),
            ("client_id", self.credentials.client_id.as_str()),
            ("client_secret", self.credentials.client_secret.as_str()),
        ];

        let response = self
            .http
            .post(token_url)
            .header(ACCEPT, "application/json")
            .form(&params)
            .send()
            .await
            .map_err(|e| AuthError::ProviderExchangeFailed(format!("token request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AuthError::ProviderExchangeFailed(format!(
                "token endpoint returned {status}: {body}"
            )));
        }

        let token: TokenResponse = response.json().await.map_err(|e| {
            AuthError::ProviderExchangeFailed(format!("unreadable token response: {e}"))
        })?;
        parse_token_response(token)
    }

    pub async fn get_json(&self, url: &str, access_token: &str) -> Result<Value, AuthError> {
        let response = self
            .http
            .get(url)
            .bearer_auth(access_token)
            .header(ACCEPT, "application/json")
            .send()
            .await
            .map_err(|e| AuthError::ProviderExchangeFailed(format!("request to {url} failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AuthError::ProviderExchangeFailed(format!(
                "{url} returned {status}: {body}"
            )));
        }

        response.json().await.map_err(|e| {
            AuthError::ProviderExchangeFailed(format!("unreadable response from {url}: {e}"))
        })
    }
}

fn parse_token_response(token: TokenResponse) -> Result<String, AuthError> {
    if let Some(error) = token.error {
        let description = token.error_description.unwrap_or_default();
        return Err(AuthError::ProviderExchangeFailed(format!(
            "provider rejected code: {error} {description}"
        )));
    }
    token
        .access_token
        .filter(|value| !value.is_empty())
        .ok_or_else(|| AuthError::ProviderExchangeFailed("token response had no access_token".into()))
}

/// Reads a string field, accepting numeric ids as well.
pub(crate) fn string_field(value: &Value, key: &str) -> Option<String> {
    match &value[key] {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Display name fallback: the local part of the email, then a generic label.
pub(crate) fn fallback_name(email: &str) -> String {
    email
        .split('@')
        .next()
        .filter(|local| !local.is_empty())
        .unwrap_or("InterviewReader user")
        .to_string()
}
