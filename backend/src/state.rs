use std::sync::Arc;

use crate::config::Config;
use crate::db::connection::DbPool;
use crate::repositories::{
    InMemorySessionRepository, InMemoryUserRepository, PgSessionRepository, PgUserRepository,
    SessionRepository, UserRepository,
};
use crate::services::{IdentityResolver, LoginService, ProviderRegistry, SessionManager};
use crate::utils::cookies::CookieOptions;
use crate::utils::jwt::TokenIssuer;

#[derive(Clone)]
pub struct AppState {
    pub config: Config,
    pub users: Arc<dyn UserRepository>,
    pub sessions: Arc<dyn SessionRepository>,
    pub issuer: Arc<TokenIssuer>,
    pub providers: ProviderRegistry,
    pub session_manager: Arc<SessionManager>,
    pub login: LoginService,
}

impl AppState {
    pub fn new(
        config: Config,
        users: Arc<dyn UserRepository>,
        sessions: Arc<dyn SessionRepository>,
        providers: ProviderRegistry,
    ) -> Self {
        let issuer = Arc::new(TokenIssuer::from_config(&config));
        let session_manager = Arc::new(SessionManager::new(
            users.clone(),
            sessions.clone(),
            config.max_concurrent_sessions,
        ));
        let login = LoginService::new(
            IdentityResolver::new(users.clone()),
            session_manager.clone(),
            issuer.clone(),
        );

        Self {
            config,
            users,
            sessions,
            issuer,
            providers,
            session_manager,
            login,
        }
    }

    /// State backed by Postgres repositories.
    pub fn with_pool(config: Config, pool: DbPool, providers: ProviderRegistry) -> Self {
        Self::new(
            config,
            Arc::new(PgUserRepository::new(pool.clone())),
            Arc::new(PgSessionRepository::new(pool)),
            providers,
        )
    }

    /// State backed by process-local repositories; nothing survives a restart.
    pub fn in_memory(config: Config, providers: ProviderRegistry) -> Self {
        Self::new(
            config,
            Arc::new(InMemoryUserRepository::new()),
            Arc::new(InMemorySessionRepository::new()),
            providers,
        )
    }

    pub fn cookie_options(&self) -> CookieOptions {
        CookieOptions {
            secure: self.config.cookie_secure,
            same_site: self.config.cookie_same_site,
        }
    }
}
