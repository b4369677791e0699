//! One-shot removal of expired and inactive sessions, for external schedulers.

use std::sync::Arc;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use interview_reader_backend::{
    config::Config,
    db::connection::create_pool,
    repositories::{PgSessionRepository, PgUserRepository},
    services::{SessionCleanupTask, SessionManager},
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "interview_reader_backend=info,session_cleanup=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::load()?;
    if config.uses_in_memory_store() {
        anyhow::bail!("session_cleanup requires a Postgres DATABASE_URL");
    }
    let pool = create_pool(&config.database_url).await?;

    let manager = Arc::new(SessionManager::new(
        Arc::new(PgUserRepository::new(pool.clone())),
        Arc::new(PgSessionRepository::new(pool.clone())),
        config.max_concurrent_sessions,
    ));
    let deleted = SessionCleanupTask::new(
        manager,
        config.session_cleanup_interval(),
    )
    .run_once()
    .await?;
    tracing::info!(deleted, "Deleted stale sessions");

    sqlx::query("VACUUM (ANALYZE) sessions")
        .execute(&pool)
        .await?;

    Ok(())
}
