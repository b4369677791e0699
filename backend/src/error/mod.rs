use axum::{
    extract::{Request, State},
    http::{header::CONTENT_LENGTH, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use serde_json::Value;
use utoipa::ToSchema;

use crate::repositories::RepositoryError;

#[derive(Debug, Serialize, ToSchema)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
}

/// Failures of the login, token and session subsystem.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("an account already exists for {0}")]
    DuplicateIdentity(String),
    #[error("validation failed: {}", .0.join(", "))]
    ValidationFailure(Vec<String>),
    #[error("credential has expired")]
    CredentialExpired,
    #[error("credential is malformed or has an invalid signature")]
    CredentialMalformed,
    #[error("credential is of the wrong kind")]
    CredentialWrongKind,
    #[error("no credential was presented")]
    NoCredential,
    #[error("credential subject does not exist")]
    UnknownSubject,
    #[error("account is deactivated")]
    AccountDeactivated,
    #[error("session is no longer valid")]
    SessionInvalid,
    #[error("provider exchange failed: {0}")]
    ProviderExchangeFailed(String),
    #[error("authorization code is missing")]
    MissingAuthorizationCode,
    #[error("provider returned no usable email address")]
    EmailUnavailable,
    #[error("token signing failed: {0}")]
    Signing(#[source] jsonwebtoken::errors::Error),
    #[error("storage failure: {0}")]
    Storage(#[source] sqlx::Error),
}

impl AuthError {
    /// Closed set of codes the OAuth callback may put in its error redirect.
    pub fn redirect_code(&self) -> &'static str {
        match self {
            AuthError::MissingAuthorizationCode => "no_code",
            AuthError::InvalidInput(_) => "invalid_request",
            AuthError::DuplicateIdentity(_) => "email_exists",
            AuthError::ValidationFailure(_) => "validation_failed",
            AuthError::CredentialExpired
            | AuthError::CredentialMalformed
            | AuthError::CredentialWrongKind
            | AuthError::NoCredential
            | AuthError::UnknownSubject
            | AuthError::AccountDeactivated
            | AuthError::SessionInvalid => "unauthorized",
            AuthError::ProviderExchangeFailed(_)
            | AuthError::EmailUnavailable
            | AuthError::Signing(_)
            | AuthError::Storage(_) => "oauth_failed",
        }
    }
}

impl From<RepositoryError> for AuthError {
    fn from(err: RepositoryError) -> Self {
        match err {
            RepositoryError::Duplicate(field) => AuthError::DuplicateIdentity(field.to_string()),
            RepositoryError::NotFound => AuthError::UnknownSubject,
            RepositoryError::Database(err) => AuthError::Storage(err),
        }
    }
}

impl From<validator::ValidationErrors> for AuthError {
    fn from(errors: validator::ValidationErrors) -> Self {
        AuthError::ValidationFailure(validation_messages(&errors))
    }
}

#[derive(Debug)]
pub enum AppError {
    NotFound(String),
    Unauthorized(String),
    Forbidden(String),
    Conflict(String),
    BadRequest(String),
    InternalServerError(anyhow::Error),
    Validation(Vec<String>),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_message, code, details) = match self {
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg, "NOT_FOUND".to_string(), None),
            AppError::Unauthorized(msg) => (
                StatusCode::UNAUTHORIZED,
                msg,
                "UNAUTHORIZED".to_string(),
                None,
            ),
            AppError::Forbidden(msg) => (StatusCode::FORBIDDEN, msg, "FORBIDDEN".to_string(), None),
            AppError::Conflict(msg) => (StatusCode::CONFLICT, msg, "CONFLICT".to_string(), None),
            AppError::BadRequest(msg) => (
                StatusCode::BAD_REQUEST,
                msg,
                "BAD_REQUEST".to_string(),
                None,
            ),
            AppError::InternalServerError(err) => {
                tracing::error!("Internal server error: {:?}", err);
                let mut response = internal_error_body(None).into_response();
                response
                    .extensions_mut()
                    .insert(InternalErrorDetail(format!("{err:#}")));
                return response;
            }
            AppError::Validation(errors) => (
                StatusCode::BAD_REQUEST,
                "Validation failed".to_string(),
                "VALIDATION_ERROR".to_string(),
                Some(serde_json::json!({ "errors": errors })),
            ),
        };

        let body = Json(ErrorResponse {
            error: error_message,
            code,
            details,
        });

        (status, body).into_response()
    }
}

/// Rendered cause of a 500, carried as a response extension. Only
/// [`expose_internal_details`] copies it into the body.
#[derive(Debug, Clone)]
pub struct InternalErrorDetail(pub String);

fn internal_error_body(details: Option<Value>) -> (StatusCode, Json<ErrorResponse>) {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(ErrorResponse {
            error: "Internal server error".to_string(),
            code: "INTERNAL_SERVER_ERROR".to_string(),
            details,
        }),
    )
}

/// Adds `details.debug` to internal error responses when `expose` is set.
/// The router enables it outside production mode.
pub async fn expose_internal_details(
    State(expose): State<bool>,
    request: Request,
    next: Next,
) -> Response {
    let mut response = next.run(request).await;
    let Some(InternalErrorDetail(detail)) =
        response.extensions_mut().remove::<InternalErrorDetail>()
    else {
        return response;
    };
    if !expose {
        return response;
    }

    let (mut parts, _) = response.into_parts();
    parts.headers.remove(CONTENT_LENGTH);
    let body = internal_error_body(Some(serde_json::json!({ "debug": detail })))
        .into_response()
        .into_body();
    Response::from_parts(parts, body)
}

impl From<AuthError> for AppError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::InvalidInput(msg) => AppError::BadRequest(msg),
            AuthError::DuplicateIdentity(field) => {
                AppError::Conflict(format!("An account already exists for {field}"))
            }
            AuthError::ValidationFailure(errors) => AppError::Validation(errors),
            AuthError::CredentialExpired => AppError::Unauthorized("Token has expired".into()),
            AuthError::CredentialMalformed => AppError::Unauthorized("Invalid token".into()),
            AuthError::CredentialWrongKind => {
                AppError::Unauthorized("Invalid token type".into())
            }
            AuthError::NoCredential => AppError::Unauthorized("Authentication required".into()),
            AuthError::UnknownSubject => AppError::Unauthorized("User not found".into()),
            AuthError::AccountDeactivated => {
                AppError::Forbidden("Account is deactivated".into())
            }
            AuthError::SessionInvalid => {
                AppError::Unauthorized("Session expired or logged out".into())
            }
            AuthError::MissingAuthorizationCode => {
                AppError::BadRequest("Authorization code is required".into())
            }
            err @ (AuthError::ProviderExchangeFailed(_)
            | AuthError::EmailUnavailable
            | AuthError::Signing(_)
            | AuthError::Storage(_)) => AppError::InternalServerError(err.into()),
        }
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        AppError::InternalServerError(err)
    }
}

impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => AppError::NotFound("Resource not found".to_string()),
            _ => AppError::InternalServerError(err.into()),
        }
    }
}

impl From<RepositoryError> for AppError {
    fn from(err: RepositoryError) -> Self {
        AuthError::from(err).into()
    }
}

impl From<validator::ValidationErrors> for AppError {
    fn from(errors: validator::ValidationErrors) -> Self {
        AppError::Validation(validation_messages(&errors))
    }
}

fn validation_messages(errors: &validator::ValidationErrors) -> Vec<String> {
    errors
        .field_errors()
        .into_iter()
        .flat_map(|(field, errs)| {
            errs.iter().map(move |e| {
                let code = e.code.as_ref();
                format!("{}: {}", field, code)
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn response_json(response: Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("read body");
        serde_json::from_slice(&bytes).expect("json")
    }

    #[tokio::test]
    async fn app_error_into_response_maps_status_and_body() {
        let response = AppError::BadRequest("bad".to_string()).into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let json = response_json(response).await;
        assert_eq!(json["error"], "bad");
        assert_eq!(json["code"], "BAD_REQUEST");

        let response = AppError::Unauthorized("nope".to_string()).into_response();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        let json = response_json(response).await;
        assert_eq!(json["error"], "nope");
        assert_eq!(json["code"], "UNAUTHORIZED");

        let response = AppError::Forbidden("denied".to_string()).into_response();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        let json = response_json(response).await;
        assert_eq!(json["code"], "FORBIDDEN");
    }

    #[tokio::test]
    async fn app_error_validation_includes_details() {
        let response = AppError::Validation(vec!["field: invalid".to_string()]).into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let json = response_json(response).await;
        assert_eq!(json["error"], "Validation failed");
        assert_eq!(json["code"], "VALIDATION_ERROR");
        assert_eq!(json["details"]["errors"][0], "field: invalid");
    }

    #[tokio::test]
    async fn app_error_internal_maps_to_generic_message() {
        let response = AppError::InternalServerError(anyhow::anyhow!("boom")).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert!(response.extensions().get::<InternalErrorDetail>().is_some());
        let json = response_json(response).await;
        assert_eq!(json["error"], "Internal server error");
        assert_eq!(json["code"], "INTERNAL_SERVER_ERROR");
        assert!(json["details"].is_null());
    }

    async fn failing_route(expose: bool) -> Response {
        use axum::{body::Body, middleware::from_fn_with_state, routing::get, Router};
        use tower::ServiceExt;

        let app = Router::new()
            .route(
                "/",
                get(|| async { AppError::InternalServerError(anyhow::anyhow!("boom")) }),
            )
            .layer(from_fn_with_state(expose, expose_internal_details));
        app.oneshot(
            axum::http::Request::builder()
                .uri("/")
                .body(Body::empty())
                .expect("request"),
        )
        .await
        .expect("response")
    }

    #[tokio::test]
    async fn internal_details_are_exposed_only_when_enabled() {
        let response = failing_route(true).await;
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let json = response_json(response).await;
        assert_eq!(json["code"], "INTERNAL_SERVER_ERROR");
        assert_eq!(json["details"]["debug"], "boom");

        let response = failing_route(false).await;
        assert!(response.extensions().get::<InternalErrorDetail>().is_none());
        let json = response_json(response).await;
        assert_eq!(json["error"], "Internal server error");
        assert!(json["details"].is_null());
    }

    #[tokio::test]
    async fn credential_errors_map_to_unauthorized() {
        for err in [
            AuthError::CredentialExpired,
            AuthError::CredentialMalformed,
            AuthError::CredentialWrongKind,
            AuthError::NoCredential,
            AuthError::UnknownSubject,
            AuthError::SessionInvalid,
        ] {
            let response = AppError::from(err).into_response();
            assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        }
        let response = AppError::from(AuthError::AccountDeactivated).into_response();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
    }

    #[test]
    fn redirect_codes_cover_the_closed_set() {
        assert_eq!(AuthError::MissingAuthorizationCode.redirect_code(), "no_code");
        assert_eq!(
            AuthError::DuplicateIdentity("email".into()).redirect_code(),
            "email_exists"
        );
        assert_eq!(
            AuthError::ValidationFailure(vec![]).redirect_code(),
            "validation_failed"
        );
        assert_eq!(
            AuthError::InvalidInput("email".into()).redirect_code(),
            "invalid_request"
        );
        assert_eq!(AuthError::EmailUnavailable.redirect_code(), "oauth_failed");
        assert_eq!(AuthError::AccountDeactivated.redirect_code(), "unauthorized");
    }

    #[test]
    fn repository_duplicate_becomes_duplicate_identity() {
        let err = AuthError::from(RepositoryError::Duplicate("email"));
        assert!(matches!(err, AuthError::DuplicateIdentity(field) if field == "email"));
    }
}
