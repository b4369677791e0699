use axum::{
    extract::{Extension, State},
    http::{header::SET_COOKIE, HeaderMap, HeaderValue},
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::{
    models::user::User,
    state::AppState,
    utils::cookies::{
        build_clear_cookie, cookie_from_headers, CookieOptions, ACCESS_COOKIE_NAME, COOKIE_PATH,
        REFRESH_COOKIE_NAME,
    },
};

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct LogoutResponse {
    pub success: bool,
    pub message: String,
    pub sessions_deleted: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub warnings: Option<Vec<String>>,
}

/// `POST /auth/logout`: ends the session identified by the refresh cookie.
/// Always answers 200 and clears both auth cookies.
pub async fn logout(State(state): State<AppState>, headers: HeaderMap) -> Response {
    let refresh_token = cookie_from_headers(&headers, REFRESH_COOKIE_NAME);

    let body = match state
        .session_manager
        .logout_current(refresh_token.as_deref())
        .await
    {
        Ok(deleted) => LogoutResponse {
            success: true,
            message: "Logged out successfully".into(),
            sessions_deleted: deleted,
            warnings: None,
        },
        Err(err) => {
            tracing::warn!(error = %err, "Logout cleanup failed; cookies cleared anyway");
            LogoutResponse {
                success: true,
                message: "Logged out".into(),
                sessions_deleted: 0,
                warnings: Some(vec!["Session cleanup could not be completed".into()]),
            }
        }
    };

    with_cleared_cookies(state.cookie_options(), Json(body))
}

/// `POST /auth/logout-all`: removes every session of the caller.
pub async fn logout_all(State(state): State<AppState>, Extension(user): Extension<User>) -> Response {
    let body = match state.session_manager.logout_all(user.id).await {
        Ok(deleted) => LogoutResponse {
            success: true,
            message: "Logged out from all devices".into(),
            sessions_deleted: deleted,
            warnings: None,
        },
        Err(err) => {
            tracing::warn!(user_id = %user.id, error = %err, "Logout-all failed; cookies cleared anyway");
            LogoutResponse {
                success: true,
                message: "Logged out".into(),
                sessions_deleted: 0,
                warnings: Some(vec!["Sessions on other devices could not be removed".into()]),
            }
        }
    };

    with_cleared_cookies(state.cookie_options(), Json(body))
}

fn with_cleared_cookies(options: CookieOptions, body: impl IntoResponse) -> Response {
    let mut response = body.into_response();
    for name in [ACCESS_COOKIE_NAME, REFRESH_COOKIE_NAME] {
        if let Ok(value) = HeaderValue::from_str(&build_clear_cookie(name, COOKIE_PATH, options)) {
            response.headers_mut().append(SET_COOKIE, value);
        }
    }
    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::test_config;
    use crate::models::user::{AuthProvider, NewUser};
    use crate::repositories::{
        session::MockSessionRepository, InMemoryUserRepository, RepositoryError, UserRepository,
    };
    use crate::services::ProviderRegistry;
    use crate::utils::cookies::SameSite;
    use axum::http::{header::COOKIE, StatusCode};
    use std::sync::Arc;

    fn unavailable() -> RepositoryError {
        RepositoryError::Database(sqlx::Error::PoolTimedOut)
    }

    async fn state_with_broken_session_store() -> (AppState, User) {
        let mut sessions = MockSessionRepository::new();
        sessions
            .expect_delete_by_refresh_token_hash()
            .returning(|_| Err(unavailable()));
        sessions
            .expect_delete_all_for_user()
            .returning(|_| Err(unavailable()));

        let users = Arc::new(InMemoryUserRepository::new());
        let user = users
            .create(&NewUser {
                email: "a@x.com".into(),
                name: "Ada".into(),
                avatar: None,
                provider: AuthProvider::Google,
                provider_id: "g1".into(),
            })
            .await
            .expect("create user");
        let state = AppState::new(
            test_config(),
            users,
            Arc::new(sessions),
            ProviderRegistry::new(),
        );
        (state, user)
    }

    async fn assert_degraded(response: Response) {
        assert_eq!(response.status(), StatusCode::OK);
        let cookies: Vec<String> = response
            .headers()
            .get_all(SET_COOKIE)
            .iter()
            .filter_map(|value| value.to_str().ok())
            .map(str::to_string)
            .collect();
        assert!(cookies.iter().any(|c| c.starts_with("accessToken=;")));
        assert!(cookies.iter().any(|c| c.starts_with("refreshToken=;")));

        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("read body");
        let body: serde_json::Value = serde_json::from_slice(&bytes).expect("json body");
        assert_eq!(body["success"], true);
        assert_eq!(body["sessions_deleted"], 0);
        let warnings = body["warnings"].as_array().expect("warnings");
        assert!(!warnings.is_empty());
    }

    #[tokio::test]
    async fn logout_degrades_to_warnings_when_store_fails() {
        let (state, _) = state_with_broken_session_store().await;
        let mut headers = HeaderMap::new();
        headers.insert(COOKIE, HeaderValue::from_static("refreshToken=r-token"));

        assert_degraded(logout(State(state), headers).await).await;
    }

    #[tokio::test]
    async fn logout_all_degrades_to_warnings_when_store_fails() {
        let (state, user) = state_with_broken_session_store().await;

        assert_degraded(logout_all(State(state), Extension(user)).await).await;
    }

    #[test]
    fn both_auth_cookies_are_cleared() {
        let response = with_cleared_cookies(
            CookieOptions {
                secure: true,
                same_site: SameSite::None,
            },
            "ok",
        );
        let cookies: Vec<_> = response
            .headers()
            .get_all(SET_COOKIE)
            .iter()
            .filter_map(|value| value.to_str().ok())
            .collect();
        assert_eq!(cookies.len(), 2);
        assert!(cookies[0].starts_with("accessToken=; Path=/; Max-Age=0"));
        assert!(cookies[1].starts_with("refreshToken=; Path=/; Max-Age=0"));
        assert!(cookies.iter().all(|c| c.ends_with("SameSite=None; Secure")));
    }

    #[test]
    fn warnings_are_omitted_when_empty() {
        let body = serde_json::to_value(LogoutResponse {
            success: true,
            message: "Logged out successfully".into(),
            sessions_deleted: 0,
            warnings: None,
        })
        .expect("serialize");
        assert!(body.get("warnings").is_none());
        assert_eq!(body["sessions_deleted"], 0);
    }
}
