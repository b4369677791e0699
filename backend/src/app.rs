use axum::{
    http::{
        header::{AUTHORIZATION, CONTENT_TYPE},
        HeaderName, HeaderValue, Method,
    },
    middleware::{from_fn, from_fn_with_state},
    routing::{get, post},
    Router,
};
use std::time::Duration;
use tower::ServiceBuilder;
use tower_http::{
    cors::{AllowOrigin, CorsLayer},
    trace::TraceLayer,
};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::{
    config::Config,
    docs::ApiDoc,
    error::expose_internal_details,
    handlers,
    middleware::{
        auth::auth, logging::log_error_responses, rate_limit::create_auth_rate_limiter,
        request_id::{request_id, REQUEST_ID_HEADER},
    },
    state::AppState,
};

pub const OPENAPI_JSON_PATH: &str = "/api/docs/openapi.json";

/// Assembles every route with its middleware stack.
pub fn build_router(state: AppState) -> anyhow::Result<Router> {
    let require_auth = from_fn_with_state(state.clone(), auth);

    let mut auth_routes = Router::new()
        .route("/auth/logout-all", post(handlers::logout_all))
        .route_layer(require_auth.clone())
        .route("/auth/logout", post(handlers::logout))
        .route("/auth/{provider}", get(handlers::begin_auth))
        .route("/auth/{provider}/callback", get(handlers::handle_callback));
    if state.config.rate_limit_enabled {
        auth_routes = auth_routes.route_layer(create_auth_rate_limiter(&state.config)?);
    }

    let user_routes = Router::new()
        .route("/api/v1/user/profile", get(handlers::profile))
        .route(
            "/api/v1/user/logout-all-others",
            post(handlers::logout_all_others),
        )
        .route("/api/v1/user/sessions", get(handlers::list_sessions))
        .route_layer(require_auth);

    let cors = cors_layer(&state.config);
    let expose_internal = !state.config.production_mode;

    let app = Router::new()
        .route("/health", get(handlers::health))
        .merge(auth_routes)
        .merge(user_routes)
        .with_state(state)
        .merge(SwaggerUi::new("/api/docs").url(OPENAPI_JSON_PATH, ApiDoc::openapi()))
        .layer(
            ServiceBuilder::new()
                .layer(from_fn(request_id))
                .layer(TraceLayer::new_for_http())
                .layer(cors)
                .layer(from_fn(log_error_responses))
                .layer(from_fn_with_state(expose_internal, expose_internal_details)),
        );

    Ok(app)
}

fn cors_layer(config: &Config) -> CorsLayer {
    let origins: Vec<HeaderValue> = config
        .cors_allow_origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!(origin = %origin, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();
    let request_id_header = HeaderName::from_static(REQUEST_ID_HEADER);

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([AUTHORIZATION, CONTENT_TYPE, request_id_header.clone()])
        .expose_headers([request_id_header])
        .allow_credentials(true)
        .max_age(Duration::from_secs(24 * 60 * 60))
}
