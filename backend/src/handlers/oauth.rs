//! Browser-facing OAuth redirect and callback endpoints.
//!
//! Failures never surface as error bodies: the browser is always sent back
//! to the client application with one of a closed set of `error` codes.

use std::convert::Infallible;
use std::net::SocketAddr;

use axum::{
    extract::{ConnectInfo, FromRequestParts, Path, Query, State},
    http::{
        header::{LOCATION, SET_COOKIE, USER_AGENT},
        request::Parts,
        HeaderMap, HeaderValue, StatusCode,
    },
    response::{IntoResponse, Response},
};
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use rand::RngCore;
use serde::Deserialize;
use subtle::ConstantTimeEq;
use utoipa::IntoParams;

use crate::{
    error::AuthError,
    models::{session::DeviceInfo, user::AuthProvider},
    state::AppState,
    utils::cookies::{
        build_auth_cookie, build_clear_cookie, cookie_from_headers, max_age, ACCESS_COOKIE_NAME,
        COOKIE_PATH, OAUTH_STATE_COOKIE_NAME, OAUTH_STATE_MAX_AGE, REFRESH_COOKIE_NAME,
    },
};

const STATE_BYTES: usize = 32;
const FORWARDED_FOR: &str = "x-forwarded-for";

#[derive(Debug, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct CallbackQuery {
    pub code: Option<String>,
    pub state: Option<String>,
    /// Set by the provider when the user denied consent or the request was invalid.
    pub error: Option<String>,
    pub error_description: Option<String>,
}

/// Client fingerprint recorded on new sessions.
pub struct ClientDevice(pub DeviceInfo);

impl<S> FromRequestParts<S> for ClientDevice
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let user_agent = parts
            .headers
            .get(USER_AGENT)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string);
        let forwarded = parts
            .headers
            .get(FORWARDED_FOR)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.split(',').next())
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .map(str::to_string);
        let ip_address = forwarded.or_else(|| {
            parts
                .extensions
                .get::<ConnectInfo<SocketAddr>>()
                .map(|ConnectInfo(addr)| addr.ip().to_string())
        });

        Ok(ClientDevice(DeviceInfo {
            user_agent,
            ip_address,
        }))
    }
}

/// `GET /auth/{provider}`
pub async fn begin_auth(State(state): State<AppState>, Path(provider): Path<String>) -> Response {
    let client_url = state.config.client_url.clone();
    let Some(adapter) = provider
        .parse::<AuthProvider>()
        .ok()
        .and_then(|kind| state.providers.get(kind))
    else {
        tracing::warn!(provider = %provider, "OAuth requested for unknown provider");
        return found(&format!("{client_url}?error=invalid_request"), Vec::new());
    };

    let csrf_state = generate_state();
    match adapter.authorization_url(&csrf_state) {
        Ok(url) => {
            let cookie = build_auth_cookie(
                OAUTH_STATE_COOKIE_NAME,
                &csrf_state,
                OAUTH_STATE_MAX_AGE,
                COOKIE_PATH,
                state.cookie_options(),
            );
            found(&url, vec![cookie])
        }
        Err(err) => {
            let kind = adapter.kind();
            tracing::error!(provider = kind.as_str(), error = %err, "Failed to build authorization URL");
            failure_redirect(&client_url, Some(kind), err.redirect_code(), Vec::new())
        }
    }
}

/// `GET /auth/{provider}/callback`
pub async fn handle_callback(
    State(state): State<AppState>,
    Path(provider): Path<String>,
    Query(query): Query<CallbackQuery>,
    ClientDevice(device): ClientDevice,
    headers: HeaderMap,
) -> Response {
    let client_url = state.config.client_url.clone();
    let options = state.cookie_options();
    let clear_state = build_clear_cookie(OAUTH_STATE_COOKIE_NAME, COOKIE_PATH, options);

    let Ok(kind) = provider.parse::<AuthProvider>() else {
        tracing::warn!(provider = %provider, "OAuth callback for unknown provider");
        return found(&format!("{client_url}?error=invalid_request"), vec![clear_state]);
    };

    if let Some(error) = query.error.as_deref() {
        tracing::warn!(
            provider = kind.as_str(),
            error,
            description = query.error_description.as_deref().unwrap_or_default(),
            "Provider reported an OAuth error"
        );
        return failure_redirect(&client_url, Some(kind), "oauth_failed", vec![clear_state]);
    }

    let Some(code) = query.code.as_deref().filter(|code| !code.trim().is_empty()) else {
        let err = AuthError::MissingAuthorizationCode;
        tracing::warn!(provider = kind.as_str(), error = %err, "OAuth callback rejected");
        return failure_redirect(&client_url, Some(kind), err.redirect_code(), vec![clear_state]);
    };

    let expected_state = cookie_from_headers(&headers, OAUTH_STATE_COOKIE_NAME);
    if !state_matches(expected_state.as_deref(), query.state.as_deref()) {
        tracing::warn!(provider = kind.as_str(), "OAuth state mismatch");
        return failure_redirect(&client_url, Some(kind), "invalid_request", vec![clear_state]);
    }

    let Some(adapter) = state.providers.get(kind) else {
        tracing::error!(provider = kind.as_str(), "No adapter registered for provider");
        return failure_redirect(&client_url, Some(kind), "invalid_request", vec![clear_state]);
    };

    match state.login.complete_login(adapter.as_ref(), code, device).await {
        Ok(outcome) => {
            tracing::info!(
                user_id = %outcome.user.id,
                provider = kind.as_str(),
                session_id = %outcome.session.id,
                "OAuth login succeeded"
            );
            let cookies = vec![
                build_auth_cookie(
                    ACCESS_COOKIE_NAME,
                    &outcome.tokens.access_token,
                    max_age(state.issuer.access_ttl()),
                    COOKIE_PATH,
                    options,
                ),
                build_auth_cookie(
                    REFRESH_COOKIE_NAME,
                    &outcome.tokens.refresh_token,
                    max_age(state.issuer.refresh_ttl()),
                    COOKIE_PATH,
                    options,
                ),
                clear_state,
            ];
            found(
                &format!(
                    "{client_url}/dashboard?login=success&provider={}",
                    kind.as_str()
                ),
                cookies,
            )
        }
        Err(err) => {
            let redirect_code = err.redirect_code();
            match &err {
                AuthError::Storage(_) | AuthError::Signing(_) => {
                    tracing::error!(provider = kind.as_str(), error = %err, redirect_code, "OAuth login failed")
                }
                _ => tracing::warn!(provider = kind.as_str(), error = %err, redirect_code, "OAuth login failed"),
            }
            failure_redirect(&client_url, Some(kind), redirect_code, vec![clear_state])
        }
    }
}

fn generate_state() -> String {
    let mut bytes = [0u8; STATE_BYTES];
    rand::thread_rng().fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

fn state_matches(expected: Option<&str>, received: Option<&str>) -> bool {
    match (expected, received) {
        (Some(expected), Some(received)) => {
            !expected.is_empty() && bool::from(expected.as_bytes().ct_eq(received.as_bytes()))
        }
        _ => false,
    }
}

fn failure_redirect(
    client_url: &str,
    provider: Option<AuthProvider>,
    code: &str,
    cookies: Vec<String>,
) -> Response {
    let location = match provider {
        Some(provider) => format!("{client_url}?error={code}&provider={}", provider.as_str()),
        None => format!("{client_url}?error={code}"),
    };
    found(&location, cookies)
}

/// 302 with any number of `Set-Cookie` headers.
fn found(location: &str, cookies: Vec<String>) -> Response {
    let mut headers = HeaderMap::new();
    match HeaderValue::from_str(location) {
        Ok(value) => {
            headers.insert(LOCATION, value);
        }
        Err(err) => {
            tracing::error!(error = %err, "Redirect location is not a valid header value");
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    }
    for cookie in cookies {
        if let Ok(value) = HeaderValue::from_str(&cookie) {
            headers.append(SET_COOKIE, value);
        }
    }
    (StatusCode::FOUND, headers).into_response()
}
