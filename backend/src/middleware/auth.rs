use axum::{
    extract::{Request, State},
    http::{header, HeaderMap},
    middleware::Next,
    response::Response,
};

use crate::{
    error::{AppError, AuthError},
    models::user::User,
    state::AppState,
    types::SessionId,
    utils::{
        cookies::{cookie_from_headers, ACCESS_COOKIE_NAME},
        jwt::{Claims, TokenKind},
    },
};

/// Identity details attached to authenticated requests next to the [`User`].
#[derive(Debug, Clone)]
pub struct AuthContext {
    pub claims: Claims,
    pub access_token: String,
    /// Present when session validation is enabled.
    pub session_id: Option<SessionId>,
}

pub async fn auth(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let (user, context) = authenticate_request(&state, request.headers())
        .await
        .map_err(|err| {
            tracing::debug!(error = %err, uri = %request.uri(), "Rejected unauthenticated request");
            AppError::from(err)
        })?;
    request.extensions_mut().insert(user);
    request.extensions_mut().insert(context);
    Ok(next.run(request).await)
}

/// Same checks as [`auth`], but lets the request through anonymously on
/// any failure.
pub async fn optional_auth(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Response {
    match authenticate_request(&state, request.headers()).await {
        Ok((user, context)) => {
            request.extensions_mut().insert(user);
            request.extensions_mut().insert(context);
        }
        Err(err) => tracing::trace!(error = %err, "Proceeding without authentication"),
    }
    next.run(request).await
}

pub async fn authenticate_request(
    state: &AppState,
    headers: &HeaderMap,
) -> Result<(User, AuthContext), AuthError> {
    let token = extract_access_token(headers).ok_or(AuthError::NoCredential)?;
    let claims = state.issuer.verify(&token, TokenKind::Access)?;

    let user = state
        .users
        .find_by_id(claims.sub)
        .await?
        .ok_or(AuthError::UnknownSubject)?;
    if !user.is_active {
        return Err(AuthError::AccountDeactivated);
    }

    let session_id = if state.config.session_validation_enabled {
        let session = state
            .session_manager
            .validate_access(user.id, &token)
            .await?;
        Some(session.id)
    } else {
        None
    };

    Ok((
        user,
        AuthContext {
            claims,
            access_token: token,
            session_id,
        },
    ))
}

/// The `accessToken` cookie wins over an `Authorization: Bearer` header.
pub fn extract_access_token(headers: &HeaderMap) -> Option<String> {
    cookie_from_headers(headers, ACCESS_COOKIE_NAME).or_else(|| {
        headers
            .get(header::AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .and_then(parse_bearer_token)
            .filter(|token| !token.is_empty())
            .map(str::to_string)
    })
}

fn parse_bearer_token(header: &str) -> Option<&str> {
    if let Some(rest) = header.strip_prefix("Bearer ") {
        return Some(rest.trim());
    }
    if let Some(space_idx) = header.find(' ') {
        let (scheme, rest) = header.split_at(space_idx);
        if scheme.eq_ignore_ascii_case("bearer") {
            return Some(rest.trim());
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn parse_bearer_token_accepts_any_case() {
        assert_eq!(parse_bearer_token("Bearer abc"), Some("abc"));
        assert_eq!(parse_bearer_token("bearer abc"), Some("abc"));
        assert_eq!(parse_bearer_token("BEARER   abc "), Some("abc"));
        assert_eq!(parse_bearer_token("Basic abc"), None);
        assert_eq!(parse_bearer_token("abc"), None);
    }

    #[test]
    fn cookie_takes_precedence_over_header() {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::AUTHORIZATION,
            HeaderValue::from_static("Bearer from-header"),
        );
        assert_eq!(
            extract_access_token(&headers).as_deref(),
            Some("from-header")
        );

        headers.insert(
            header::COOKIE,
            HeaderValue::from_static("accessToken=from-cookie"),
        );
        assert_eq!(
            extract_access_token(&headers).as_deref(),
            Some("from-cookie")
        );
    }

    #[test]
    fn empty_bearer_is_no_credential() {
        let mut headers = HeaderMap::new();
        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Bearer "));
        assert!(extract_access_token(&headers).is_none());
    }
}
