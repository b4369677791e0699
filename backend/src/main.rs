use std::net::SocketAddr;
use std::sync::Arc;

use tokio::sync::watch;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use interview_reader_backend::{
    app::build_router,
    config::Config,
    db::connection::create_pool,
    services::{oauth::build_http_client, ProviderRegistry, SessionCleanupTask},
    state::AppState,
};

fn mask_secret(s: &str) -> String {
    if s.is_empty() {
        return "<empty>".into();
    }
    let prefix = s.chars().take(4).collect::<String>();
    format!("{}*** (len={})", prefix, s.len())
}

fn mask_database_url(url: &str) -> String {
    match url::Url::parse(url) {
        Ok(mut parsed) if parsed.password().is_some() => {
            let _ = parsed.set_password(Some("***"));
            parsed.to_string()
        }
        _ => url.to_string(),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "interview_reader_backend=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::load()?;
    tracing::info!(
        database_url = %mask_database_url(&config.database_url),
        jwt_access_secret = %mask_secret(&config.jwt_access_secret),
        jwt_refresh_secret = %mask_secret(&config.jwt_refresh_secret),
        access_token_expiration_hours = config.access_token_expiration_hours,
        refresh_token_expiration_days = config.refresh_token_expiration_days,
        max_concurrent_sessions = config.max_concurrent_sessions,
        client_url = %config.client_url,
        google_client_secret = %mask_secret(&config.google.client_secret),
        github_client_secret = %mask_secret(&config.github.client_secret),
        linkedin_client_secret = %mask_secret(&config.linkedin.client_secret),
        production_mode = config.production_mode,
        "Loaded configuration from environment/.env"
    );

    let providers = ProviderRegistry::from_config(&config, build_http_client()?);
    let state = if config.uses_in_memory_store() {
        tracing::warn!("Using in-memory storage; users and sessions are lost on restart");
        AppState::in_memory(config.clone(), providers)
    } else {
        let pool = create_pool(&config.database_url).await?;
        AppState::with_pool(config.clone(), pool, providers)
    };

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let cleanup = SessionCleanupTask::new(
        Arc::clone(&state.session_manager),
        config.session_cleanup_interval(),
    )
    .spawn(shutdown_rx);

    let app = build_router(state)?;

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    tracing::info!("Server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    let _ = shutdown_tx.send(true);
    if let Err(err) = cleanup.await {
        tracing::error!(error = %err, "Session cleanup task ended abnormally");
    }
    tracing::info!("Server stopped");

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %err, "Failed to listen for Ctrl+C");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(err) => tracing::error!(error = %err, "Failed to listen for SIGTERM"),
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    tracing::info!("Shutdown signal received");
}
