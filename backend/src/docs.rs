#![allow(dead_code)] // OpenAPI doc stubs are only referenced by utoipa macros.

use crate::{
    error::ErrorResponse,
    handlers::{
        auth::LogoutResponse, health::HealthResponse, oauth::CallbackQuery,
        user::LogoutOthersResponse,
    },
    models::{
        session::SessionResponse,
        user::{AuthProvider, UserResponse},
    },
};
use utoipa::{
    openapi::security::{ApiKey, ApiKeyValue, Http, HttpAuthScheme, SecurityScheme},
    Modify, OpenApi,
};

#[derive(OpenApi)]
#[openapi(
    paths(
        begin_auth_doc,
        callback_doc,
        logout_doc,
        logout_all_doc,
        profile_doc,
        logout_all_others_doc,
        sessions_doc,
        health_doc
    ),
    components(
        schemas(
            AuthProvider,
            UserResponse,
            SessionResponse,
            LogoutResponse,
            LogoutOthersResponse,
            HealthResponse,
            ErrorResponse
        )
    ),
    modifiers(&SecuritySchemes),
    tags(
        (name = "Auth", description = "OAuth sign-in and logout"),
        (name = "User", description = "Profile and session management"),
        (name = "System", description = "Liveness")
    ),
    security(("BearerAuth" = []), ("CookieAuth" = []))
)]
pub struct ApiDoc;

struct SecuritySchemes;

impl Modify for SecuritySchemes {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        let components = openapi.components.get_or_insert_default();

        let mut bearer = Http::new(HttpAuthScheme::Bearer);
        bearer.bearer_format = Some("JWT".to_string());
        components.add_security_scheme("BearerAuth", SecurityScheme::Http(bearer));

        components.add_security_scheme(
            "CookieAuth",
            SecurityScheme::ApiKey(ApiKey::Cookie(ApiKeyValue::new("accessToken"))),
        );
    }
}

#[utoipa::path(
    get,
    path = "/auth/{provider}",
    params(("provider" = AuthProvider, Path, description = "google, github or linkedin")),
    responses(
        (status = 302, description = "Redirect to the provider consent page; sets the oauthState cookie")
    ),
    tag = "Auth",
    security(())
)]
fn begin_auth_doc() {}

#[utoipa::path(
    get,
    path = "/auth/{provider}/callback",
    params(
        ("provider" = AuthProvider, Path, description = "google, github or linkedin"),
        CallbackQuery
    ),
    responses(
        (status = 302, description = "Redirect to the client dashboard with auth cookies, or back to the client with an error code")
    ),
    tag = "Auth",
    security(())
)]
fn callback_doc() {}

#[utoipa::path(
    post,
    path = "/auth/logout",
    responses((status = 200, description = "Current session ended; cookies cleared", body = LogoutResponse)),
    tag = "Auth",
    security(())
)]
fn logout_doc() {}

#[utoipa::path(
    post,
    path = "/auth/logout-all",
    responses(
        (status = 200, description = "All sessions removed; cookies cleared", body = LogoutResponse),
        (status = 401, description = "Missing or invalid access token", body = ErrorResponse)
    ),
    tag = "Auth"
)]
fn logout_all_doc() {}

#[utoipa::path(
    get,
    path = "/api/v1/user/profile",
    responses(
        (status = 200, description = "Signed-in user", body = UserResponse),
        (status = 401, description = "Missing or invalid access token", body = ErrorResponse),
        (status = 403, description = "Account deactivated", body = ErrorResponse)
    ),
    tag = "User"
)]
fn profile_doc() {}

#[utoipa::path(
    post,
    path = "/api/v1/user/logout-all-others",
    responses(
        (status = 200, description = "Other sessions invalidated", body = LogoutOthersResponse),
        (status = 401, description = "Missing or invalid access token", body = ErrorResponse)
    ),
    tag = "User"
)]
fn logout_all_others_doc() {}

#[utoipa::path(
    get,
    path = "/api/v1/user/sessions",
    responses(
        (status = 200, description = "Active sessions of the caller", body = [SessionResponse]),
        (status = 401, description = "Missing or invalid access token", body = ErrorResponse)
    ),
    tag = "User"
)]
fn sessions_doc() {}

#[utoipa::path(
    get,
    path = "/health",
    responses((status = 200, body = HealthResponse)),
    tag = "System",
    security(())
)]
fn health_doc() {}
