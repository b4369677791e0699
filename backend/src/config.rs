use anyhow::{anyhow, bail, Context};
use std::env;
use std::str::FromStr;
use std::time::Duration;

use crate::models::user::AuthProvider;
use crate::utils::cookies::SameSite;

const MIN_SECRET_LENGTH: usize = 32;
const PLACEHOLDER_MARKERS: [&str; 6] = [
    "your-",
    "change-me",
    "changeme",
    "placeholder",
    "example",
    "xxx",
];

#[derive(Debug, Clone)]
pub struct ProviderCredentials {
    pub client_id: String,
    pub client_secret: String,
    pub redirect_uri: String,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub jwt_access_secret: String,
    pub jwt_refresh_secret: String,
    pub jwt_issuer: String,
    pub jwt_audience: String,
    pub access_token_expiration_hours: u64,
    pub refresh_token_expiration_days: u64,
    pub max_concurrent_sessions: u32,
    pub session_validation_enabled: bool,
    pub session_cleanup_interval_minutes: u64,
    /// Frontend origin that OAuth callbacks redirect back to.
    pub client_url: String,
    pub google: ProviderCredentials,
    pub github: ProviderCredentials,
    pub linkedin: ProviderCredentials,
    pub cookie_secure: bool,
    pub cookie_same_site: SameSite,
    pub cors_allow_origins: Vec<String>,
    pub rate_limit_enabled: bool,
    pub rate_limit_ip_max_requests: u32,
    pub rate_limit_ip_window_seconds: u64,
    pub production_mode: bool,
    pub port: u16,
}

impl Config {
    pub fn load() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds and validates the configuration from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let vars = Vars { lookup };

        let production_mode = vars.parse_or("PRODUCTION_MODE", false, parse_bool)?;
        let client_url = vars
            .required("CLIENT_URL")?
            .trim_end_matches('/')
            .to_string();

        let cookie_secure = vars.parse_or("COOKIE_SECURE", production_mode, parse_bool)?;
        let default_same_site = if production_mode {
            SameSite::None
        } else {
            SameSite::Lax
        };
        let cookie_same_site =
            vars.parse_or("COOKIE_SAME_SITE", default_same_site, parse_same_site)?;

        let cors_allow_origins = vars
            .optional("CORS_ALLOW_ORIGINS")
            .map(|raw| {
                raw.split(',')
                    .map(|origin| origin.trim().trim_end_matches('/').to_string())
                    .filter(|origin| !origin.is_empty())
                    .collect::<Vec<_>>()
            })
            .filter(|origins| !origins.is_empty())
            .unwrap_or_else(|| vec![client_url.clone()]);

        Ok(Config {
            database_url: vars.required("DATABASE_URL")?,
            jwt_access_secret: vars.secret("JWT_ACCESS_SECRET")?,
            jwt_refresh_secret: vars.secret("JWT_REFRESH_SECRET")?,
            jwt_issuer: vars
                .optional("JWT_ISSUER")
                .unwrap_or_else(|| "interview-reader".to_string()),
            jwt_audience: vars
                .optional("JWT_AUDIENCE")
                .unwrap_or_else(|| "interview-reader-web".to_string()),
            access_token_expiration_hours: vars.parse_or(
                "ACCESS_TOKEN_EXPIRATION_HOURS",
                24,
                parse_positive,
            )?,
            refresh_token_expiration_days: vars.parse_or(
                "REFRESH_TOKEN_EXPIRATION_DAYS",
                10,
                parse_positive,
            )?,
            max_concurrent_sessions: vars.parse_or(
                "MAX_CONCURRENT_SESSIONS",
                3,
                parse_positive,
            )?,
            session_validation_enabled: vars.parse_or(
                "SESSION_VALIDATION_ENABLED",
                true,
                parse_bool,
            )?,
            session_cleanup_interval_minutes: vars.parse_or(
                "SESSION_CLEANUP_INTERVAL_MINUTES",
                60,
                parse_positive,
            )?,
            client_url,
            google: vars.provider(AuthProvider::Google)?,
            github: vars.provider(AuthProvider::Github)?,
            linkedin: vars.provider(AuthProvider::Linkedin)?,
            cookie_secure,
            cookie_same_site,
            cors_allow_origins,
            rate_limit_enabled: vars.parse_or("RATE_LIMIT_ENABLED", true, parse_bool)?,
            rate_limit_ip_max_requests: vars.parse_or(
                "RATE_LIMIT_IP_MAX_REQUESTS",
                20,
                parse_positive,
            )?,
            rate_limit_ip_window_seconds: vars.parse_or(
                "RATE_LIMIT_IP_WINDOW_SECONDS",
                60,
                parse_positive,
            )?,
            production_mode,
            port: vars.parse_or("PORT", 3000, parse_positive)?,
        })
    }

    pub fn provider_credentials(&self, provider: AuthProvider) -> &ProviderCredentials {
        match provider {
            AuthProvider::Google => &self.google,
            AuthProvider::Github => &self.github,
            AuthProvider::Linkedin => &self.linkedin,
        }
    }

    pub fn session_cleanup_interval(&self) -> Duration {
        Duration::from_secs(self.session_cleanup_interval_minutes.saturating_mul(60))
    }

    pub fn uses_in_memory_store(&self) -> bool {
        self.database_url.starts_with("memory://")
    }
}

struct Vars<F> {
    lookup: F,
}

impl<F> Vars<F>
where
    F: Fn(&str) -> Option<String>,
{
    fn optional(&self, key: &str) -> Option<String> {
        (self.lookup)(key)
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
    }

    fn required(&self, key: &str) -> anyhow::Result<String> {
        self.optional(key)
            .ok_or_else(|| anyhow!("Missing required environment variable {key}"))
    }

    /// A required value that must not be a template leftover.
    fn credential(&self, key: &str) -> anyhow::Result<String> {
        let value = self.required(key)?;
        if is_placeholder(&value) {
            bail!("{key} still holds a placeholder value");
        }
        Ok(value)
    }

    fn secret(&self, key: &str) -> anyhow::Result<String> {
        let value = self.credential(key)?;
        if value.chars().count() < MIN_SECRET_LENGTH {
            bail!("{key} must be at least {MIN_SECRET_LENGTH} characters");
        }
        Ok(value)
    }

    fn provider(&self, provider: AuthProvider) -> anyhow::Result<ProviderCredentials> {
        let prefix = provider.as_str().to_ascii_uppercase();
        Ok(ProviderCredentials {
            client_id: self.credential(&format!("{prefix}_CLIENT_ID"))?,
            client_secret: self.credential(&format!("{prefix}_CLIENT_SECRET"))?,
            redirect_uri: self.required(&format!("{prefix}_REDIRECT_URI"))?,
        })
    }

    fn parse_or<T>(
        &self,
        key: &str,
        default: T,
        parse: fn(&str) -> anyhow::Result<T>,
    ) -> anyhow::Result<T> {
        match self.optional(key) {
            Some(raw) => parse(&raw).with_context(|| format!("Invalid {key} value: {raw}")),
            None => Ok(default),
        }
    }
}

fn is_placeholder(value: &str) -> bool {
    let lowered = value.to_ascii_lowercase();
    PLACEHOLDER_MARKERS
        .iter()
        .any(|marker| lowered.contains(marker))
}

fn parse_bool(raw: &str) -> anyhow::Result<bool> {
    match raw.to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Ok(true),
        "false" | "0" | "no" | "off" => Ok(false),
        _ => Err(anyhow!("expected a boolean")),
    }
}

fn parse_positive<T>(raw: &str) -> anyhow::Result<T>
where
    T: FromStr + PartialOrd + Default,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    let value: T = raw.parse()?;
    if value <= T::default() {
        bail!("expected a positive number");
    }
    Ok(value)
}

fn parse_same_site(raw: &str) -> anyhow::Result<SameSite> {
    match raw.to_ascii_lowercase().as_str() {
        "lax" => Ok(SameSite::Lax),
        "strict" => Ok(SameSite::Strict),
        "none" => Ok(SameSite::None),
        _ => Err(anyhow!("expected Lax, Strict or None")),
    }
}

/// Development configuration for unit tests elsewhere in the crate.
#[cfg(test)]
pub(crate) fn test_config() -> Config {
    let vars = tests::base_env();
    Config::from_lookup(|key| vars.get(key).cloned()).expect("test config")
}
