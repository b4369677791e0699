#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use axum::{
    body::Body,
    http::{header, Request, Response, StatusCode},
    Router,
};
use interview_reader_backend::{
    app::build_router,
    config::Config,
    error::AuthError,
    models::user::AuthProvider,
    repositories::{InMemorySessionRepository, InMemoryUserRepository},
    services::{OAuthProvider, ProviderProfile, ProviderRegistry},
    state::AppState,
    utils::cookies::{ACCESS_COOKIE_NAME, REFRESH_COOKIE_NAME},
};
use serde_json::Value;
use tower::ServiceExt;

pub const CLIENT_URL: &str = "http://localhost:5173";
pub const TEST_STATE: &str = "test-oauth-state";

pub fn test_env() -> HashMap<String, String> {
    let mut vars = HashMap::new();
    vars.insert("DATABASE_URL".to_string(), "memory://".to_string());
    vars.insert(
        "JWT_ACCESS_SECRET".to_string(),
        "integration-access-secret-0123456789abcdef".to_string(),
    );
    vars.insert(
        "JWT_REFRESH_SECRET".to_string(),
        "integration-refresh-secret-0123456789abcdef".to_string(),
    );
    vars.insert("CLIENT_URL".to_string(), CLIENT_URL.to_string());
    vars.insert("RATE_LIMIT_ENABLED".to_string(), "false".to_string());
    for provider in ["google", "github", "linkedin"] {
        let prefix = provider.to_ascii_uppercase();
        vars.insert(format!("{prefix}_CLIENT_ID"), format!("{provider}-client"));
        vars.insert(
            format!("{prefix}_CLIENT_SECRET"),
            format!("{provider}-secret-value"),
        );
        vars.insert(
            format!("{prefix}_REDIRECT_URI"),
            format!("http://localhost:3000/auth/{provider}/callback"),
        );
    }
    vars
}

pub fn config_from(vars: &HashMap<String, String>) -> Config {
    Config::from_lookup(|key| vars.get(key).cloned()).expect("test config")
}

pub fn test_config() -> Config {
    config_from(&test_env())
}

/// Provider double that answers known authorization codes with fixed profiles.
pub struct FakeProvider {
    kind: AuthProvider,
    profiles: HashMap<String, Result<ProviderProfile, String>>,
}

impl FakeProvider {
    pub fn new(kind: AuthProvider) -> Self {
        Self {
            kind,
            profiles: HashMap::new(),
        }
    }

    pub fn with_profile(mut self, code: &str, provider_id: &str, email: &str) -> Self {
        self.profiles.insert(
            code.to_string(),
            Ok(ProviderProfile {
                provider: self.kind,
                provider_id: provider_id.to_string(),
                email: email.to_string(),
                name: "Ada Lovelace".to_string(),
                avatar: Some("https://cdn.test/ada.png".to_string()),
            }),
        );
        self
    }

    pub fn with_failure(mut self, code: &str, reason: &str) -> Self {
        self.profiles
            .insert(code.to_string(), Err(reason.to_string()));
        self
    }
}

#[async_trait]
impl OAuthProvider for FakeProvider {
    fn kind(&self) -> AuthProvider {
        self.kind
    }

    fn authorization_url(&self, state: &str) -> Result<String, AuthError> {
        Ok(format!(
            "https://provider.test/{}/authorize?response_type=code&state={state}",
            self.kind.as_str()
        ))
    }

    async fn fetch_profile(&self, code: &str) -> Result<ProviderProfile, AuthError> {
        match self.profiles.get(code) {
            Some(Ok(profile)) => Ok(profile.clone()),
            Some(Err(reason)) if reason == "no_email" => Err(AuthError::EmailUnavailable),
            Some(Err(reason)) => Err(AuthError::ProviderExchangeFailed(reason.clone())),
            None => Err(AuthError::ProviderExchangeFailed(format!(
                "unknown code {code}"
            ))),
        }
    }
}

pub struct TestApp {
    pub router: Router,
    pub state: AppState,
    pub users: Arc<InMemoryUserRepository>,
    pub sessions: Arc<InMemorySessionRepository>,
}

pub struct LoginCookies {
    pub access_token: String,
    pub refresh_token: String,
}

impl TestApp {
    pub fn new(providers: Vec<FakeProvider>) -> Self {
        Self::with_config(test_config(), providers)
    }

    pub fn with_config(config: Config, providers: Vec<FakeProvider>) -> Self {
        let registry = providers
            .into_iter()
            .fold(ProviderRegistry::new(), |registry, provider| {
                registry.with(Arc::new(provider))
            });
        let users = Arc::new(InMemoryUserRepository::new());
        let sessions = Arc::new(InMemorySessionRepository::new());
        let state = AppState::new(config, users.clone(), sessions.clone(), registry);
        let router = build_router(state.clone()).expect("build router");
        Self {
            router,
            state,
            users,
            sessions,
        }
    }

    pub async fn send(&self, request: Request<Body>) -> Response<Body> {
        self.router
            .clone()
            .oneshot(request)
            .await
            .expect("router call")
    }

    /// Drives a callback with a matching state cookie.
    pub async fn callback(&self, provider: &str, code: &str) -> Response<Body> {
        let request = Request::builder()
            .uri(format!(
                "/auth/{provider}/callback?code={code}&state={TEST_STATE}"
            ))
            .header(header::COOKIE, format!("oauthState={TEST_STATE}"))
            .header(header::USER_AGENT, "integration-test")
            .body(Body::empty())
            .expect("callback request");
        self.send(request).await
    }

    pub async fn login(&self, provider: &str, code: &str) -> LoginCookies {
        let response = self.callback(provider, code).await;
        assert_eq!(response.status(), StatusCode::FOUND);
        assert!(
            location(&response).contains("login=success"),
            "login failed: {}",
            location(&response)
        );
        LoginCookies {
            access_token: cookie_value(&response, ACCESS_COOKIE_NAME).expect("access cookie"),
            refresh_token: cookie_value(&response, REFRESH_COOKIE_NAME).expect("refresh cookie"),
        }
    }
}

pub fn bearer_get(uri: &str, token: &str) -> Request<Body> {
    Request::builder()
        .uri(uri)
        .header(header::AUTHORIZATION, format!("Bearer {token}"))
        .body(Body::empty())
        .expect("bearer request")
}

pub fn bearer_post(uri: &str, token: &str) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::AUTHORIZATION, format!("Bearer {token}"))
        .body(Body::empty())
        .expect("bearer request")
}

pub fn location(response: &Response<Body>) -> String {
    response
        .headers()
        .get(header::LOCATION)
        .and_then(|value| value.to_str().ok())
        .unwrap_or_default()
        .to_string()
}

pub fn set_cookies(response: &Response<Body>) -> Vec<String> {
    response
        .headers()
        .get_all(header::SET_COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .map(str::to_string)
        .collect()
}

/// Value of the last `Set-Cookie` for `name`; empty values count as cleared.
pub fn cookie_value(response: &Response<Body>, name: &str) -> Option<String> {
    set_cookies(response)
        .iter()
        .rev()
        .find_map(|cookie| {
            let pair = cookie.split(';').next()?;
            let (key, value) = pair.split_once('=')?;
            (key == name).then(|| value.to_string())
        })
        .filter(|value| !value.is_empty())
}

pub async fn body_json(response: Response<Body>) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("read body");
    serde_json::from_slice(&bytes).expect("json body")
}
