use anyhow::Context;
use axum::body::Body;
use axum::http::{header::CONTENT_TYPE, HeaderValue, Response, StatusCode};
use governor::middleware::StateInformationMiddleware;
use std::sync::Arc;
use std::time::Duration;
use tower_governor::{
    governor::GovernorConfigBuilder, key_extractor::PeerIpKeyExtractor, GovernorError,
    GovernorLayer,
};

use crate::config::Config;

pub type AuthRateLimitLayer = GovernorLayer<PeerIpKeyExtractor, StateInformationMiddleware, Body>;

/// Per-IP limiter for the `/auth/*` routes. Requires the server to be
/// started with `into_make_service_with_connect_info::<SocketAddr>()`.
pub fn create_auth_rate_limiter(config: &Config) -> anyhow::Result<AuthRateLimitLayer> {
    ip_rate_limiter(
        config.rate_limit_ip_max_requests,
        config.rate_limit_ip_window_seconds,
    )
}

fn ip_rate_limiter(max_requests: u32, window_seconds: u64) -> anyhow::Result<AuthRateLimitLayer> {
    let burst_size = max_requests.max(1);
    let window_seconds = window_seconds.max(1);
    let governor_conf = GovernorConfigBuilder::default()
        .period(Duration::from_secs(window_seconds))
        .burst_size(burst_size)
        .key_extractor(PeerIpKeyExtractor)
        .use_headers()
        .finish()
        .with_context(|| {
            format!("Invalid auth rate limit: {burst_size} requests per {window_seconds}s")
        })?;

    Ok(GovernorLayer::new(Arc::new(governor_conf)).error_handler(rate_limit_error_handler))
}

fn rate_limit_error_handler(error: GovernorError) -> Response<Body> {
    match error {
        GovernorError::TooManyRequests { wait_time, headers } => {
            tracing::warn!(wait_time, "Auth rate limit exceeded");
            let mut response = json_error_response(
                StatusCode::TOO_MANY_REQUESTS,
                "Too many requests. Please try again later.",
                "RATE_LIMITED",
                Some(wait_time),
            );
            if let Some(headers) = headers {
                response.headers_mut().extend(headers);
            }
            response
        }
        GovernorError::UnableToExtractKey => {
            tracing::error!("Rate limiter could not determine the client address");
            json_error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                "Unable to determine request identity.",
                "RATE_LIMIT_KEY_ERROR",
                None,
            )
        }
        GovernorError::Other { code, msg, headers } => {
            let mut response = json_error_response(
                code,
                &msg.unwrap_or_else(|| "Rate limit error".to_string()),
                "RATE_LIMIT_ERROR",
                None,
            );
            if let Some(headers) = headers {
                response.headers_mut().extend(headers);
            }
            response
        }
    }
}

/// Mirrors the `{error, code, details?}` shape of [`crate::error::ErrorResponse`].
fn json_error_response(
    status: StatusCode,
    message: &str,
    code: &str,
    retry_after: Option<u64>,
) -> Response<Body> {
    let mut body = serde_json::json!({
        "error": message,
        "code": code,
    });
    if let Some(retry_after) = retry_after {
        body["details"] = serde_json::json!({ "retry_after": retry_after });
    }

    let mut response = Response::new(Body::from(body.to_string()));
    *response.status_mut() = status;
    response
        .headers_mut()
        .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    if let Some(retry_after) = retry_after {
        if let Ok(value) = HeaderValue::from_str(&retry_after.to_string()) {
            response.headers_mut().insert("retry-after", value);
        }
    }
    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::to_bytes;
    use axum::extract::ConnectInfo;
    use axum::{routing::get, Router};
    use std::net::SocketAddr;
    use tower::ServiceExt;

    fn request_from(addr: &str) -> axum::http::Request<Body> {
        let mut request = axum::http::Request::builder()
            .uri("/auth/google")
            .body(Body::empty())
            .expect("build request");
        let addr: SocketAddr = addr.parse().expect("socket addr");
        request.extensions_mut().insert(ConnectInfo(addr));
        request
    }

    #[test]
    fn zero_values_are_clamped() {
        assert!(ip_rate_limiter(0, 0).is_ok());
    }

    #[tokio::test]
    async fn second_request_from_same_ip_is_limited() {
        let app = Router::new()
            .route("/auth/google", get(|| async { "ok" }))
            .route_layer(ip_rate_limiter(1, 60).expect("limiter"));

        let first = app
            .clone()
            .oneshot(request_from("10.0.0.1:4000"))
            .await
            .expect("first");
        assert_eq!(first.status(), StatusCode::OK);

        let second = app
            .clone()
            .oneshot(request_from("10.0.0.1:4001"))
            .await
            .expect("second");
        assert_eq!(second.status(), StatusCode::TOO_MANY_REQUESTS);
        assert!(second.headers().get("retry-after").is_some());
        let body = to_bytes(second.into_body(), usize::MAX)
            .await
            .expect("read body");
        let json: serde_json::Value = serde_json::from_slice(&body).expect("json body");
        assert_eq!(json["code"], "RATE_LIMITED");

        let other_ip = app
            .oneshot(request_from("10.0.0.2:4000"))
            .await
            .expect("other ip");
        assert_eq!(other_ip.status(), StatusCode::OK);
    }

    #[test]
    fn missing_peer_address_is_a_server_error() {
        let response = rate_limit_error_handler(GovernorError::UnableToExtractKey);
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(
            response.headers().get(CONTENT_TYPE),
            Some(&HeaderValue::from_static("application/json"))
        );
    }

    #[test]
    fn other_errors_keep_their_headers() {
        let mut headers = axum::http::HeaderMap::new();
        headers.insert("x-custom", HeaderValue::from_static("value"));
        let response = rate_limit_error_handler(GovernorError::Other {
            code: StatusCode::BAD_REQUEST,
            msg: Some("error with headers".to_string()),
            headers: Some(headers),
        });
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert!(response.headers().get("x-custom").is_some());
    }
}
